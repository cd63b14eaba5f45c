//! The match aggregate: board, turn, slots and scores.

use crate::broadcast::ConnectionId;
use crate::error::{SessionError, SessionErrorKind};
use crate::invariants::{InvariantSet, SessionInvariants};
use crate::protocol::{GameSnapshot, PlayerInfo, PlayersInfo, Scores};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use strictly_grid::{Board, Outcome, Symbol, WinningLine, evaluate, win_condition_for};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument, warn};

/// Unique identifier for a session.
pub type SessionId = String;

/// Identity token issued to a slot at join.
pub type PlayerId = String;

/// Type of player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    /// Human player on a connection.
    Human,
    /// Computer opponent.
    Ai,
}

/// A scheduled grace-period expiry for a disconnected slot.
#[derive(Debug)]
pub struct GraceTimer {
    id: u64,
    handle: Option<AbortHandle>,
}

impl GraceTimer {
    /// Wraps a scheduled expiry.
    pub fn new(id: u64, handle: Option<AbortHandle>) -> Self {
        Self { id, handle }
    }

    /// Timer id carried by the expiry command.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops the scheduled expiry.
    pub fn cancel(self) {
        debug!(timer = self.id, "Cancelling grace timer");
        if let Some(handle) = self.handle {
            handle.abort();
        }
    }
}

/// A participant's reservation within the session.
#[derive(Debug, Getters)]
pub struct PlayerSlot {
    /// Stable identity token.
    id: PlayerId,
    /// Display name.
    name: String,
    /// Symbol for the lifetime of the session.
    symbol: Symbol,
    /// Human or computer.
    kind: PlayerKind,
    /// Live connection, if any.
    connection: Option<ConnectionId>,
    #[getter(skip)]
    pending_disconnect: Option<GraceTimer>,
}

impl PlayerSlot {
    /// Whether the slot counts as present. The computer always is.
    pub fn is_connected(&self) -> bool {
        self.kind == PlayerKind::Ai || self.connection.is_some()
    }

    /// Whether a grace timer is running for this slot.
    pub fn has_pending_disconnect(&self) -> bool {
        self.pending_disconnect.is_some()
    }

    fn info(&self) -> PlayerInfo {
        PlayerInfo::new(
            self.name.clone(),
            self.is_connected(),
            self.id.clone(),
            self.kind,
        )
    }
}

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundResult {
    /// A symbol completed a run.
    Won(Symbol),
    /// Full board, no run.
    Draw,
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fewer than two slots filled.
    AwaitingPlayers,
    /// Moves are being accepted.
    Active,
    /// The round is over; a reset starts the next one.
    Terminal(RoundResult),
}

/// What a move attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Rejected without any state change.
    Ignored,
    /// Placed; the other symbol is on turn.
    Continued,
    /// Placed and completed a run.
    Won(WinningLine),
    /// Placed and filled the board.
    Drawn,
}

/// A game session with two slots.
#[derive(Debug, Getters)]
pub struct Session {
    /// Session ID.
    id: SessionId,
    /// Board edge.
    size: usize,
    /// Run length needed to win.
    win_condition: usize,
    /// The board.
    board: Board,
    #[getter(skip)]
    slots: [Option<PlayerSlot>; 2],
    /// Symbol on turn.
    to_move: Symbol,
    /// Whether moves are being accepted.
    active: bool,
    /// Cumulative wins.
    scores: Scores,
    /// Most recent move.
    last_move: Option<usize>,
    /// Single-player match against the computer.
    ai_game: bool,
    /// Bumped on every reset; stale deferred work compares against it.
    epoch: u64,
    #[getter(skip)]
    result: Option<RoundResult>,
}

impl Session {
    /// Creates an empty session awaiting players.
    #[instrument]
    pub fn new(size: usize, ai_game: bool) -> Result<Self, SessionError> {
        let board = Board::new(size)?;
        let id = uuid::Uuid::new_v4().to_string();
        info!(session_id = %id, size, ai_game, "Creating new game session");
        Ok(Self {
            id,
            size,
            win_condition: win_condition_for(size),
            board,
            slots: [None, None],
            to_move: Symbol::First,
            active: false,
            scores: Scores::default(),
            last_move: None,
            ai_game,
            epoch: 0,
            result: None,
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        if self.active {
            Phase::Active
        } else if let Some(result) = self.result {
            Phase::Terminal(result)
        } else {
            Phase::AwaitingPlayers
        }
    }

    /// Whether both slots are filled.
    pub fn is_full_house(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Symbol played by the computer, if this is a single-player match.
    pub fn ai_symbol(&self) -> Option<Symbol> {
        self.ai_game.then_some(Symbol::Second)
    }

    /// Slot holding `symbol`.
    pub fn slot(&self, symbol: Symbol) -> Option<&PlayerSlot> {
        self.slots[symbol.index()].as_ref()
    }

    /// All filled slots.
    pub fn slots(&self) -> impl Iterator<Item = &PlayerSlot> {
        self.slots.iter().flatten()
    }

    /// Symbol whose slot is bound to `connection`.
    pub fn symbol_for_connection(&self, connection: ConnectionId) -> Option<Symbol> {
        self.slots()
            .find(|slot| slot.connection == Some(connection))
            .map(|slot| slot.symbol)
    }

    /// Symbol whose slot was issued `token`.
    pub fn symbol_for_token(&self, token: &str) -> Option<Symbol> {
        self.slots()
            .find(|slot| slot.kind == PlayerKind::Human && slot.id == token)
            .map(|slot| slot.symbol)
    }

    /// Fills the next free slot (First, then Second) and issues a token.
    ///
    /// The session becomes active once both slots are filled.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn join(
        &mut self,
        name: String,
        kind: PlayerKind,
        connection: Option<ConnectionId>,
    ) -> Result<(Symbol, PlayerId), SessionError> {
        let symbol = match self.slots.iter().position(Option::is_none) {
            Some(0) => Symbol::First,
            Some(_) => Symbol::Second,
            None => {
                warn!(%name, "Session already has 2 players");
                return Err(SessionError::new(SessionErrorKind::SessionFull));
            }
        };

        let id = uuid::Uuid::new_v4().to_string();
        info!(%name, %symbol, ?kind, "Registering player");
        self.slots[symbol.index()] = Some(PlayerSlot {
            id: id.clone(),
            name,
            symbol,
            kind,
            connection,
            pending_disconnect: None,
        });

        if self.is_full_house() && self.result.is_none() && !self.active {
            info!("Both slots filled, match is active");
            self.active = true;
        }
        self.verify();
        Ok((symbol, id))
    }

    /// Applies a move for `symbol` at `index`.
    ///
    /// Out-of-turn moves, moves on an inactive session and moves on
    /// occupied or missing cells are ignored without any state change.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn apply_move(&mut self, symbol: Symbol, index: usize) -> MoveOutcome {
        if !self.active {
            debug!("Move on inactive session ignored");
            return MoveOutcome::Ignored;
        }
        if symbol != self.to_move {
            debug!(to_move = %self.to_move, "Out-of-turn move ignored");
            return MoveOutcome::Ignored;
        }
        if let Err(e) = self.board.place(index, symbol) {
            debug!(error = %e, "Illegal placement ignored");
            return MoveOutcome::Ignored;
        }
        self.last_move = Some(index);

        let outcome = match evaluate(&self.board, self.win_condition) {
            Outcome::Win(line) => {
                match line.symbol {
                    Symbol::First => self.scores.first += 1,
                    Symbol::Second => self.scores.second += 1,
                }
                self.active = false;
                self.result = Some(RoundResult::Won(line.symbol));
                info!(winner = %line.symbol, line = %line.id(), "Round won");
                MoveOutcome::Won(line)
            }
            Outcome::Draw => {
                self.active = false;
                self.result = Some(RoundResult::Draw);
                info!("Round drawn");
                MoveOutcome::Drawn
            }
            Outcome::InProgress => {
                self.to_move = symbol.opponent();
                MoveOutcome::Continued
            }
        };

        debug!(board = %self.board.render(), "Board after move");
        self.verify();
        outcome
    }

    /// Starts a new round, keeping scores and slots.
    ///
    /// Returns false (and changes nothing) unless both slots are filled.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn reset(&mut self) -> bool {
        if !self.is_full_house() {
            debug!("Reset ignored, waiting for players");
            return false;
        }
        self.board = match Board::new(self.size) {
            Ok(board) => board,
            Err(e) => {
                error!(error = %e, "Could not rebuild board");
                return false;
            }
        };
        self.to_move = Symbol::First;
        self.active = true;
        self.last_move = None;
        self.result = None;
        self.epoch += 1;
        info!(epoch = self.epoch, "Round reset");
        self.verify();
        true
    }

    /// Binds `symbol`'s slot to `connection`, returning any pending timer
    /// and the previously bound connection.
    pub(crate) fn attach(
        &mut self,
        symbol: Symbol,
        connection: ConnectionId,
    ) -> (Option<GraceTimer>, Option<ConnectionId>) {
        match self.slots[symbol.index()].as_mut() {
            Some(slot) => {
                let previous = slot.connection.replace(connection);
                (slot.pending_disconnect.take(), previous)
            }
            None => (None, None),
        }
    }

    /// Clears the connection of `symbol`'s slot.
    pub(crate) fn detach(&mut self, symbol: Symbol) -> Option<ConnectionId> {
        self.slots[symbol.index()]
            .as_mut()
            .and_then(|slot| slot.connection.take())
    }

    /// Records a running grace timer, returning one it displaced.
    pub(crate) fn set_grace_timer(&mut self, symbol: Symbol, timer: GraceTimer) -> Option<GraceTimer> {
        match self.slots[symbol.index()].as_mut() {
            Some(slot) => slot.pending_disconnect.replace(timer),
            None => Some(timer),
        }
    }

    /// Takes the grace timer of `symbol`'s slot if its id is `timer`.
    pub(crate) fn take_grace_timer(&mut self, symbol: Symbol, timer: u64) -> Option<GraceTimer> {
        let slot = self.slots[symbol.index()].as_mut()?;
        if slot.pending_disconnect.as_ref().map(GraceTimer::id) == Some(timer) {
            slot.pending_disconnect.take()
        } else {
            None
        }
    }

    /// Takes every pending grace timer, for teardown.
    pub(crate) fn take_all_grace_timers(&mut self) -> Vec<GraceTimer> {
        self.slots
            .iter_mut()
            .flatten()
            .filter_map(|slot| slot.pending_disconnect.take())
            .collect()
    }

    /// Current state for clients.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            size: self.size,
            win_condition: self.win_condition,
            board: self.board.cells().iter().map(|cell| cell.symbol()).collect(),
            current_player: self.to_move,
            game_active: self.active,
            scores: self.scores,
            players_info: PlayersInfo {
                first: self.slot(Symbol::First).map(PlayerSlot::info),
                second: self.slot(Symbol::Second).map(PlayerSlot::info),
            },
            last_move_index: self.last_move,
            is_ai_game: self.ai_game,
        }
    }

    fn verify(&self) {
        if let Err(violations) = SessionInvariants::check_all(self) {
            for violation in &violations {
                error!(session_id = %self.id, violation = %violation.description, "Invariant violated");
            }
            debug_assert!(violations.is_empty(), "session invariants violated");
        }
    }
}
