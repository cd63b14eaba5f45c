//! Maps connections to slot identities and runs the reconnect grace window.

use crate::broadcast::ConnectionId;
use crate::config::DisconnectPolicy;
use crate::error::{SessionError, SessionErrorKind};
use crate::session::{GraceTimer, PlayerId, PlayerKind, Session};
use derive_getters::Getters;
use std::time::Duration;
use strictly_grid::Symbol;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

/// Result of a successful reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconnected {
    /// Symbol of the resumed slot.
    pub symbol: Symbol,
    /// The slot's unchanged identity token.
    pub player_id: PlayerId,
    /// Connection previously bound to the slot, now superseded.
    pub superseded: Option<ConnectionId>,
}

/// What a dropped connection did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The connection held no slot.
    Unbound,
    /// The slot is held open until the grace timer fires.
    Pending {
        /// Symbol of the vacated slot.
        symbol: Symbol,
        /// Id of the scheduled expiry.
        timer: u64,
    },
    /// The match ends now.
    Terminated {
        /// Symbol of the vacated slot.
        symbol: Symbol,
    },
}

/// Identity bookkeeping for the active session.
#[derive(Debug, Getters)]
pub struct PlayerRegistry {
    /// Disconnect handling.
    policy: DisconnectPolicy,
    /// How long a vacated slot is held.
    grace_period: Duration,
    #[getter(skip)]
    next_timer_id: u64,
}

impl PlayerRegistry {
    /// Creates a registry for the given policy.
    pub fn new(policy: DisconnectPolicy, grace_period: Duration) -> Self {
        Self {
            policy,
            grace_period,
            next_timer_id: 0,
        }
    }

    /// Takes the next free slot for a human on `connection`.
    ///
    /// An empty name is replaced with `Player X` / `Player O`.
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    pub fn join(
        &self,
        session: &mut Session,
        connection: ConnectionId,
        name: &str,
    ) -> Result<(Symbol, PlayerId), SessionError> {
        let symbol = if session.slot(Symbol::First).is_none() {
            Symbol::First
        } else {
            Symbol::Second
        };
        let name = display_name(name, symbol);
        session.join(name, PlayerKind::Human, Some(connection))
    }

    /// Rebinds the slot issued `token` to `connection` and cancels its
    /// pending grace timer.
    #[instrument(skip(self, session, token), fields(session_id = %session.id()))]
    pub fn reconnect(
        &self,
        session: &mut Session,
        connection: ConnectionId,
        token: &str,
    ) -> Result<Reconnected, SessionError> {
        let Some(symbol) = session.symbol_for_token(token) else {
            warn!("Reconnect with unknown identity");
            return Err(SessionError::new(SessionErrorKind::UnknownIdentity));
        };
        if let Some(held) = session.symbol_for_connection(connection) {
            if held != symbol {
                warn!(%held, %symbol, "Connection already holds the other slot");
                return Err(SessionError::new(SessionErrorKind::IllegalAction));
            }
        }

        let (timer, superseded) = session.attach(symbol, connection);
        if let Some(timer) = timer {
            timer.cancel();
        }
        info!(%symbol, ?superseded, "Player reconnected");
        Ok(Reconnected {
            symbol,
            player_id: token.to_string(),
            superseded: superseded.filter(|previous| *previous != connection),
        })
    }

    /// Unbinds `connection` from its slot and applies the disconnect policy.
    ///
    /// Under [`DisconnectPolicy::Grace`], `schedule` is called with a fresh
    /// timer id and returns a handle that aborts the pending expiry.
    #[instrument(skip(self, session, schedule), fields(session_id = %session.id()))]
    pub fn disconnect<F>(
        &mut self,
        session: &mut Session,
        connection: ConnectionId,
        schedule: F,
    ) -> Departure
    where
        F: FnOnce(Symbol, u64, Duration) -> Option<AbortHandle>,
    {
        let Some(symbol) = session.symbol_for_connection(connection) else {
            debug!("Connection held no slot");
            return Departure::Unbound;
        };
        session.detach(symbol);

        match self.policy {
            DisconnectPolicy::Immediate => {
                info!(%symbol, "Player left, ending match");
                Departure::Terminated { symbol }
            }
            DisconnectPolicy::Grace => {
                self.next_timer_id += 1;
                let timer = self.next_timer_id;
                let handle = schedule(symbol, timer, self.grace_period);
                if let Some(displaced) = session.set_grace_timer(symbol, GraceTimer::new(timer, handle)) {
                    displaced.cancel();
                }
                info!(%symbol, timer, grace_secs = self.grace_period.as_secs(), "Player disconnected, holding slot");
                Departure::Pending { symbol, timer }
            }
        }
    }

    /// Consumes a fired grace timer. Returns true if it was still the
    /// slot's live timer and the session must now end.
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    pub fn grace_expired(&self, session: &mut Session, symbol: Symbol, timer: u64) -> bool {
        match session.take_grace_timer(symbol, timer) {
            Some(_) => {
                info!("Grace period expired");
                true
            }
            None => {
                debug!("Stale grace timer ignored");
                false
            }
        }
    }

    /// Cancels every pending timer of a session being destroyed.
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    pub fn teardown(&self, session: &mut Session) {
        for timer in session.take_all_grace_timers() {
            timer.cancel();
        }
    }
}

fn display_name(name: &str, symbol: Symbol) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        format!("Player {}", symbol)
    } else {
        trimmed.to_string()
    }
}
