//! The dispatch loop that owns the session.
//!
//! Every mutation (join, move, reset, AI move, disconnect, grace expiry)
//! arrives as a [`HubCommand`] on one channel and is handled to completion
//! before the next command is taken. Deferred work is a spawned sleep that
//! posts a command back into the same channel, so the loop never waits on a
//! timer.

use crate::broadcast::{ConnectionId, OutboundSender, Outbox};
use crate::config::ServerConfig;
use crate::error::{SessionError, SessionErrorKind};
use crate::protocol::{ClientMessage, GameSnapshot, ServerMessage, Winner};
use crate::registry::{Departure, PlayerRegistry};
use crate::session::{MoveOutcome, PlayerKind, Session, SessionId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strictly_grid::{EXACT_SEARCH_SIZE, MIN_BOARD_SIZE, Symbol, select_move};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

/// A unit of work for the hub.
#[derive(Debug)]
pub enum HubCommand {
    /// A socket opened.
    Connected {
        /// New connection.
        connection: ConnectionId,
        /// Queue drained by the socket's writer.
        outbound: OutboundSender,
    },
    /// A text frame arrived.
    Inbound {
        /// Sender.
        connection: ConnectionId,
        /// Raw frame text.
        text: String,
    },
    /// A socket closed.
    Disconnected {
        /// Closed connection.
        connection: ConnectionId,
    },
    /// The computer's thinking delay elapsed.
    AiMove {
        /// Session the move was scheduled for.
        session: SessionId,
        /// Round the move was scheduled for.
        epoch: u64,
    },
    /// A grace timer fired.
    GraceExpired {
        /// Vacated slot.
        symbol: Symbol,
        /// Timer id recorded in the slot.
        timer: u64,
    },
    /// Read the current state.
    Snapshot {
        /// Receives the snapshot, `None` when no session exists.
        reply: oneshot::Sender<Option<GameSnapshot>>,
    },
}

/// Cloneable handle used by transport code to reach the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
    next_connection: Arc<AtomicU64>,
}

impl HubHandle {
    /// Allocates a connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Posts a raw command. Returns false once the hub has stopped.
    pub fn send(&self, command: HubCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Announces a new socket.
    pub fn connected(&self, connection: ConnectionId, outbound: OutboundSender) -> bool {
        self.send(HubCommand::Connected {
            connection,
            outbound,
        })
    }

    /// Forwards a text frame.
    pub fn inbound(&self, connection: ConnectionId, text: impl Into<String>) -> bool {
        self.send(HubCommand::Inbound {
            connection,
            text: text.into(),
        })
    }

    /// Announces a closed socket.
    pub fn disconnected(&self, connection: ConnectionId) -> bool {
        self.send(HubCommand::Disconnected { connection })
    }

    /// Current snapshot, `None` when no session exists or the hub stopped.
    pub async fn snapshot(&self) -> Option<GameSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.send(HubCommand::Snapshot { reply }) {
            return None;
        }
        rx.await.ok().flatten()
    }
}

/// Schedules commands to be posted back to the hub after a delay.
#[derive(Debug, Clone)]
struct Deferred {
    tx: mpsc::WeakUnboundedSender<HubCommand>,
}

impl Deferred {
    fn schedule(&self, delay: Duration, command: HubCommand) -> AbortHandle {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(command);
            }
        })
        .abort_handle()
    }
}

/// Single owner of the session and everything bound to it.
#[derive(Debug)]
pub struct GameHub {
    config: ServerConfig,
    session: Option<Session>,
    registry: PlayerRegistry,
    outbox: Outbox,
    deferred: Deferred,
    rng: StdRng,
    rx: mpsc::UnboundedReceiver<HubCommand>,
}

impl GameHub {
    /// Creates a hub and the handle that feeds it.
    pub fn new(config: ServerConfig) -> (Self, HubHandle) {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Creates a hub with a fixed move-selection RNG.
    pub fn with_rng(config: ServerConfig, rng: StdRng) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = PlayerRegistry::new(*config.disconnect_policy(), config.grace_period());
        let hub = Self {
            config,
            session: None,
            registry,
            outbox: Outbox::new(),
            deferred: Deferred { tx: tx.downgrade() },
            rng,
            rx,
        };
        let handle = HubHandle {
            tx,
            next_connection: Arc::new(AtomicU64::new(0)),
        };
        (hub, handle)
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Processes commands until every handle is dropped.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!("Game hub started");
        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }
        info!("Game hub stopped");
    }

    /// Applies one command to completion.
    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connected {
                connection,
                outbound,
            } => self.outbox.attach(connection, outbound),
            HubCommand::Inbound { connection, text } => self.on_inbound(connection, &text),
            HubCommand::Disconnected { connection } => self.on_disconnected(connection),
            HubCommand::AiMove { session, epoch } => self.on_ai_move(&session, epoch),
            HubCommand::GraceExpired { symbol, timer } => self.on_grace_expired(symbol, timer),
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.as_ref().map(Session::snapshot));
            }
        }
    }

    #[instrument(skip(self, text))]
    fn on_inbound(&mut self, connection: ConnectionId, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                return;
            }
        };
        debug!(?message, "Dispatching");

        let result = match message {
            ClientMessage::Join { name, size } => self.join(connection, &name, size),
            ClientMessage::StartGameAi { name, size } => self.start_ai_game(connection, &name, size),
            ClientMessage::Reconnect { player_id } => self.reconnect(connection, &player_id),
            ClientMessage::Move { index } => self.play(connection, index),
            ClientMessage::Reset => self.reset(connection),
        };

        if let Err(e) = result {
            if e.kind.is_reported() {
                warn!(error = %e, "Request rejected");
                self.outbox.send(connection, ServerMessage::error(&e));
                if e.kind == SessionErrorKind::SessionFull {
                    self.outbox.close(connection);
                }
            } else {
                debug!(error = %e, "Request ignored");
            }
        }
    }

    fn join(
        &mut self,
        connection: ConnectionId,
        name: &str,
        size: Option<usize>,
    ) -> Result<(), SessionError> {
        if let Some(session) = &self.session {
            if session.symbol_for_connection(connection).is_some() {
                debug!("Connection already holds a slot");
                return Ok(());
            }
            if *session.ai_game() {
                return Err(SessionError::new(SessionErrorKind::SessionFull));
            }
        }

        let session = match &mut self.session {
            Some(session) => session,
            empty @ None => {
                let size = size.unwrap_or(*self.config.default_board_size());
                if !self.config.allows_board_size(size) {
                    return Err(SessionError::new(SessionErrorKind::UnsupportedConfiguration(
                        format!(
                            "Board size {} is not offered ({}..={})",
                            size,
                            MIN_BOARD_SIZE,
                            self.config.max_board_size()
                        ),
                    )));
                }
                empty.insert(Session::new(size, false)?)
            }
        };

        let (symbol, player_id) = self.registry.join(session, connection, name)?;
        self.outbox
            .send(connection, ServerMessage::AssignIdentity { symbol, player_id });
        self.broadcast_update();
        Ok(())
    }

    fn start_ai_game(
        &mut self,
        connection: ConnectionId,
        name: &str,
        size: usize,
    ) -> Result<(), SessionError> {
        if let Some(session) = &self.session {
            if session.symbol_for_connection(connection).is_some() {
                debug!("Connection already holds a slot");
                return Ok(());
            }
            return Err(SessionError::new(SessionErrorKind::SessionFull));
        }
        let offered = size == EXACT_SEARCH_SIZE
            || (*self.config.ai_any_size() && self.config.allows_board_size(size));
        if !offered {
            return Err(SessionError::new(SessionErrorKind::UnsupportedConfiguration(
                format!("AI games are only offered on {0}x{0} boards", EXACT_SEARCH_SIZE),
            )));
        }

        let mut session = Session::new(size, true)?;
        let (symbol, player_id) = self.registry.join(&mut session, connection, name)?;
        session.join(self.config.ai_name().clone(), PlayerKind::Ai, None)?;
        info!(session_id = %session.id(), size, "Started game against the computer");
        self.session = Some(session);

        self.outbox
            .send(connection, ServerMessage::AssignIdentity { symbol, player_id });
        self.broadcast_update();
        Ok(())
    }

    fn reconnect(&mut self, connection: ConnectionId, token: &str) -> Result<(), SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::new(SessionErrorKind::UnknownIdentity));
        };
        let resumed = self.registry.reconnect(session, connection, token)?;
        if let Some(previous) = resumed.superseded {
            self.outbox.close(previous);
        }
        self.outbox.send(
            connection,
            ServerMessage::AssignIdentity {
                symbol: resumed.symbol,
                player_id: resumed.player_id,
            },
        );
        self.broadcast_update();
        Ok(())
    }

    fn play(&mut self, connection: ConnectionId, index: usize) -> Result<(), SessionError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SessionError::new(SessionErrorKind::IllegalAction))?;
        let symbol = session
            .symbol_for_connection(connection)
            .ok_or_else(|| SessionError::new(SessionErrorKind::IllegalAction))?;

        let outcome = session.apply_move(symbol, index);
        if outcome == MoveOutcome::Ignored {
            return Err(SessionError::new(SessionErrorKind::IllegalAction));
        }
        self.after_move(outcome);
        Ok(())
    }

    fn reset(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SessionError::new(SessionErrorKind::IllegalAction))?;
        if session.symbol_for_connection(connection).is_none() || !session.reset() {
            return Err(SessionError::new(SessionErrorKind::IllegalAction));
        }
        self.broadcast_update();
        self.schedule_ai_if_due();
        Ok(())
    }

    /// Broadcasts the result of an applied move and hands the turn on.
    fn after_move(&mut self, outcome: MoveOutcome) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let game_state = session.snapshot();
        let message = match outcome {
            MoveOutcome::Ignored => return,
            MoveOutcome::Continued => ServerMessage::Update { game_state },
            MoveOutcome::Won(line) => ServerMessage::GameOver {
                winner_symbol: Winner::Symbol(line.symbol),
                game_state,
                winning_line_id: Some(line.id()),
                winning_line: Some(line.cells),
            },
            MoveOutcome::Drawn => ServerMessage::GameOver {
                winner_symbol: Winner::Draw,
                game_state,
                winning_line: None,
                winning_line_id: None,
            },
        };
        self.outbox.broadcast(session, &message);
        self.schedule_ai_if_due();
    }

    fn schedule_ai_if_due(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if *session.active() && session.ai_symbol() == Some(*session.to_move()) {
            debug!(session_id = %session.id(), epoch = *session.epoch(), "Scheduling AI move");
            self.deferred.schedule(
                self.config.ai_think_delay(),
                HubCommand::AiMove {
                    session: session.id().clone(),
                    epoch: *session.epoch(),
                },
            );
        }
    }

    #[instrument(skip(self))]
    fn on_ai_move(&mut self, session_id: &str, epoch: u64) {
        let Some(session) = self.session.as_mut() else {
            debug!("Discarding AI move, no session");
            return;
        };
        let Some(ai) = session.ai_symbol() else {
            return;
        };
        let current = session.id() == session_id && *session.epoch() == epoch;
        if !current || !*session.active() || *session.to_move() != ai {
            debug!("Discarding stale AI move");
            return;
        }

        let Some(index) = select_move(session.board(), *session.win_condition(), ai, &mut self.rng)
        else {
            warn!("AI found no legal move");
            return;
        };
        let outcome = session.apply_move(ai, index);
        self.after_move(outcome);
    }

    #[instrument(skip(self))]
    fn on_disconnected(&mut self, connection: ConnectionId) {
        self.outbox.detach(connection);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let deferred = &self.deferred;
        let departure = self
            .registry
            .disconnect(session, connection, |symbol, timer, delay| {
                Some(deferred.schedule(delay, HubCommand::GraceExpired { symbol, timer }))
            });

        match departure {
            Departure::Unbound => {}
            Departure::Pending { symbol, .. } => {
                let grace_seconds = self.registry.grace_period().as_secs();
                let message = ServerMessage::OpponentDisconnected {
                    message: format!(
                        "Player {} disconnected. Waiting {} seconds for them to return.",
                        symbol, grace_seconds
                    ),
                    grace_seconds,
                    game_state: session.snapshot(),
                };
                self.outbox.broadcast(session, &message);
            }
            Departure::Terminated { symbol } => {
                let message = ServerMessage::OpponentLeft {
                    message: format!("Player {} left the game.", symbol),
                };
                self.outbox.broadcast(session, &message);
                self.end_session();
            }
        }
    }

    #[instrument(skip(self))]
    fn on_grace_expired(&mut self, symbol: Symbol, timer: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !self.registry.grace_expired(session, symbol, timer) {
            return;
        }
        let message = ServerMessage::GameEnded {
            message: format!("Player {} did not return in time. The game has ended.", symbol),
        };
        self.outbox.broadcast(session, &message);
        self.end_session();
    }

    /// Destroys the session, cancelling its timers and dropping all bindings.
    fn end_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.registry.teardown(&mut session);
            info!(session_id = %session.id(), "Session destroyed");
        }
    }

    fn broadcast_update(&self) {
        if let Some(session) = self.session.as_ref() {
            let message = ServerMessage::Update {
                game_state: session.snapshot(),
            };
            self.outbox.broadcast(session, &message);
        }
    }
}
