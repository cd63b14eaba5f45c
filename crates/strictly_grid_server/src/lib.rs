//! Authoritative game-session core for real-time N x N grid matches.
//!
//! A single [`GameHub`] task owns the one active [`Session`]. Transport code
//! feeds it [`HubCommand`]s through a [`HubHandle`]; the hub validates and
//! applies each request, evaluates the board and fans the resulting
//! [`ServerMessage`]s out to every bound connection through the [`Outbox`].
//!
//! # Architecture
//!
//! - [`session`] - board, turn, slots and scores for the match
//! - [`registry`] - identity tokens, reconnects and the grace window
//! - [`broadcast`] - per-connection outbound queues
//! - [`protocol`] - JSON envelopes in both directions
//! - [`hub`] - the serialized dispatch loop and deferred work
//! - [`transport`] - axum router with the WebSocket endpoint

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod error;
pub mod hub;
pub mod invariants;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use broadcast::{ConnectionId, Outbound, OutboundSender, Outbox};
pub use config::{ConfigError, DisconnectPolicy, ServerConfig};
pub use error::{SessionError, SessionErrorKind};
pub use hub::{GameHub, HubCommand, HubHandle};
pub use invariants::{Invariant, InvariantSet, InvariantViolation, SessionInvariants};
pub use protocol::{ClientMessage, GameSnapshot, PlayerInfo, PlayersInfo, Scores, ServerMessage, Winner};
pub use registry::{Departure, PlayerRegistry, Reconnected};
pub use session::{
    GraceTimer, MoveOutcome, Phase, PlayerId, PlayerKind, PlayerSlot, RoundResult, Session,
    SessionId,
};
pub use transport::router;
