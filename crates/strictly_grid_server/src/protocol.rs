//! Wire protocol: JSON envelopes `{ "type": ..., "payload": {...} }`.

use crate::error::{SessionError, SessionErrorKind};
use crate::session::{PlayerId, PlayerKind};
use derive_new::new;
use serde::{Deserialize, Serialize};
use strictly_grid::{EXACT_SEARCH_SIZE, Symbol};
use tracing::instrument;

/// A request from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Take a slot in the two-player match.
    Join {
        /// Display name.
        name: String,
        /// Board edge, honored only when the join creates the session.
        size: Option<usize>,
    },
    /// Start a single-player match against the computer.
    StartGameAi {
        /// Display name.
        name: String,
        /// Board edge.
        size: usize,
    },
    /// Resume a slot after a dropped connection.
    Reconnect {
        /// Identity token issued at join.
        player_id: PlayerId,
    },
    /// Claim a cell.
    Move {
        /// Row-major cell index.
        index: usize,
    },
    /// Request a rematch.
    Reset,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JoinPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: Option<usize>,
}

fn default_ai_size() -> usize {
    EXACT_SEARCH_SIZE
}

#[derive(Debug, Deserialize)]
struct StartGameAiPayload {
    #[serde(default)]
    name: String,
    #[serde(default = "default_ai_size")]
    size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReconnectPayload {
    player_id: String,
}

#[derive(Debug, Deserialize)]
struct MovePayload {
    index: usize,
}

impl ClientMessage {
    /// Parses a text frame.
    ///
    /// A missing or null payload is accepted for `reset` only.
    #[instrument(skip(text), fields(len = text.len()))]
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let payload = envelope.payload;

        let message = match envelope.kind.as_str() {
            "join" => {
                let JoinPayload { name, size } = serde_json::from_value(payload)?;
                ClientMessage::Join { name, size }
            }
            "startGameAI" => {
                let StartGameAiPayload { name, size } = serde_json::from_value(payload)?;
                ClientMessage::StartGameAi { name, size }
            }
            "reconnect" => {
                let ReconnectPayload { player_id } = serde_json::from_value(payload)?;
                ClientMessage::Reconnect { player_id }
            }
            "move" => {
                let MovePayload { index } = serde_json::from_value(payload)?;
                ClientMessage::Move { index }
            }
            "reset" => ClientMessage::Reset,
            other => {
                return Err(SessionError::new(SessionErrorKind::MalformedMessage(format!(
                    "unknown message type {:?}",
                    other
                ))));
            }
        };
        Ok(message)
    }
}

/// A notification pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Sent to the joining (or reconnecting) client only.
    AssignIdentity {
        /// The client's symbol.
        symbol: Symbol,
        /// Token to present when reconnecting.
        player_id: PlayerId,
    },
    /// Non-terminal state change.
    Update {
        /// Current state.
        game_state: GameSnapshot,
    },
    /// The round ended.
    GameOver {
        /// Winning symbol, or draw.
        winner_symbol: Winner,
        /// Final state.
        game_state: GameSnapshot,
        /// Cells of the winning run.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winning_line: Option<Vec<usize>>,
        /// Identifier of the winning run, e.g. `diag-0`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winning_line_id: Option<String>,
    },
    /// The other participant dropped and may come back.
    OpponentDisconnected {
        /// Human-readable notice.
        message: String,
        /// Seconds left for the reconnect.
        grace_seconds: u64,
        /// Current state.
        game_state: GameSnapshot,
    },
    /// The other participant left and the match is over.
    OpponentLeft {
        /// Human-readable notice.
        message: String,
    },
    /// The grace period ran out and the match was torn down.
    GameEnded {
        /// Human-readable notice.
        message: String,
    },
    /// A request was rejected.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Builds an `error` reply from a rejection.
    pub fn error(err: &SessionError) -> Self {
        ServerMessage::Error {
            message: err.client_message(),
        }
    }

    /// Wire name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::AssignIdentity { .. } => "assignIdentity",
            ServerMessage::Update { .. } => "update",
            ServerMessage::GameOver { .. } => "gameOver",
            ServerMessage::OpponentDisconnected { .. } => "opponentDisconnected",
            ServerMessage::OpponentLeft { .. } => "opponentLeft",
            ServerMessage::GameEnded { .. } => "gameEnded",
            ServerMessage::Error { .. } => "error",
        }
    }
}

/// Result of a finished round as shown on the wire: `"X"`, `"O"` or `"draw"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    /// Board filled with no run.
    #[serde(rename = "draw")]
    Draw,
    /// A symbol won.
    #[serde(untagged)]
    Symbol(Symbol),
}

/// Win counters keyed by symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    /// Wins by First.
    #[serde(rename = "X")]
    pub first: u32,
    /// Wins by Second.
    #[serde(rename = "O")]
    pub second: u32,
}

impl Scores {
    /// Wins recorded for `symbol`.
    pub fn get(&self, symbol: Symbol) -> u32 {
        match symbol {
            Symbol::First => self.first,
            Symbol::Second => self.second,
        }
    }
}

/// Public view of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct PlayerInfo {
    /// Display name.
    pub name: String,
    /// Whether the slot currently has a live connection.
    pub connected: bool,
    /// Identity token of the slot.
    pub id: PlayerId,
    /// Human or computer.
    pub kind: PlayerKind,
}

/// Participants keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersInfo {
    /// Slot holding First.
    #[serde(rename = "X")]
    pub first: Option<PlayerInfo>,
    /// Slot holding Second.
    #[serde(rename = "O")]
    pub second: Option<PlayerInfo>,
}

impl PlayersInfo {
    /// Slot view for `symbol`.
    pub fn get(&self, symbol: Symbol) -> Option<&PlayerInfo> {
        match symbol {
            Symbol::First => self.first.as_ref(),
            Symbol::Second => self.second.as_ref(),
        }
    }
}

/// Full session state as consumed by rendering clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Board edge.
    pub size: usize,
    /// Run length needed to win.
    pub win_condition: usize,
    /// Cells in row-major order, `null` when empty.
    pub board: Vec<Option<Symbol>>,
    /// Symbol to move.
    pub current_player: Symbol,
    /// Whether moves are being accepted.
    pub game_active: bool,
    /// Cumulative wins.
    pub scores: Scores,
    /// Slot views.
    pub players_info: PlayersInfo,
    /// Most recent move, cleared on reset.
    pub last_move_index: Option<usize>,
    /// Single-player match against the computer.
    #[serde(rename = "isAIGame")]
    pub is_ai_game: bool,
}
