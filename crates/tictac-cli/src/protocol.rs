//! Client request protocol
//!
//! Each text frame from a client is one JSON request tagged by `op`, with an
//! optional numeric `id` echoed back in the reply:
//!
//! ```json
//! {"id": 3, "op": "move", "session_id": 12, "board": [...], "next_turn": "O"}
//! ```
//!
//! Replies are `{"id", "ok", "data"}` or `{"id", "ok": false, "error"}`.
//! Server pushed events use the `{"event", "data"}` shape of `ServerEvent`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tictac_core::{
    Board, GameError, GameOutcome, GameSession, Identity, Mark, SessionId, SessionView, UserId,
    UserStats,
};
use tictac_runtime::UserPresence;

pub const BAD_REQUEST: &str = "bad_request";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ClientRequest {
    Authenticate {
        token: String,
    },
    JoinGame {
        session_id: SessionId,
    },
    LeaveRoom {
        session_id: SessionId,
    },
    Challenge {
        opponent_id: UserId,
    },
    Sessions,
    Accept {
        session_id: SessionId,
    },
    Reject {
        session_id: SessionId,
    },
    Move {
        session_id: SessionId,
        board: Board,
        next_turn: Mark,
        #[serde(default)]
        winner_id: Option<UserId>,
    },
    Session {
        session_id: SessionId,
    },
    RequestRematch {
        session_id: SessionId,
    },
    AcceptRematch {
        session_id: SessionId,
    },
    RejectRematch {
        session_id: SessionId,
    },
    LeaveGame {
        session_id: SessionId,
    },
    Stats,
    ResetStats,
    Result {
        outcome: GameOutcome,
    },
    Presence,
}

impl ClientRequest {
    /// Operations that may run before the connection has authenticated
    pub fn is_anonymous(&self) -> bool {
        matches!(
            self,
            ClientRequest::Authenticate { .. }
                | ClientRequest::JoinGame { .. }
                | ClientRequest::LeaveRoom { .. }
        )
    }
}

/// Parse one text frame into its request id and request
///
/// The id is recovered even when the request itself is malformed so the
/// error reply can still be correlated.
pub fn parse_frame(text: &str) -> (Option<u64>, Result<ClientRequest, String>) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return (None, Err(format!("Malformed JSON: {}", e))),
    };
    let id = value.get("id").and_then(Value::as_u64);
    let request = serde_json::from_value(value).map_err(|e| format!("Invalid request: {}", e));
    (id, request)
}

// ----------------------------------------------------------------------------
// Replies
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReplyData {
    Identity(Identity),
    Session(GameSession),
    View(SessionView),
    Views(Vec<SessionView>),
    Stats(UserStats),
    Presence(Vec<UserPresence>),
    Joined { session_id: SessionId, joined: bool },
    Ack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ReplyData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    pub fn success(id: Option<u64>, data: ReplyData) -> Self {
        Self {
            id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(id: Option<u64>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            data: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Internal failures are reported without their detail
    pub fn from_error(id: Option<u64>, error: &GameError) -> Self {
        Self::failure(id, error.code(), error.client_message())
    }
}
