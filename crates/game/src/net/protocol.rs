use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PORT: u16 = 3000;

/// Opaque in-game action payload. The relay forwards it without looking inside.
pub type Action = serde_json::Map<String, Value>;

const CLIENT_MESSAGE_TYPES: &[&str] = &["set_nickname", "game_action"];
const SERVER_MESSAGE_TYPES: &[&str] = &["nickname_response", "game_update", "error"];

/// Milliseconds since the Unix epoch, the timestamp carried by every message.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid message format: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SetNickname {
        #[serde(default)]
        nickname: String,
        #[serde(default)]
        timestamp: u64,
    },
    GameAction {
        action: Action,
        #[serde(default)]
        timestamp: u64,
    },
}

impl ClientMessage {
    pub fn set_nickname(nickname: impl Into<String>) -> Self {
        Self::SetNickname {
            nickname: nickname.into(),
            timestamp: now_ms(),
        }
    }

    pub fn game_action(action: Action) -> Self {
        Self::GameAction {
            action,
            timestamp: now_ms(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetNickname { .. } => "set_nickname",
            Self::GameAction { .. } => "game_action",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_tagged(data, CLIENT_MESSAGE_TYPES)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicknameResponse {
    pub success: bool,
    pub message: String,
    pub nickname: Option<String>,
    #[serde(rename = "playerId")]
    pub player_id: Option<String>,
    #[serde(default)]
    pub timestamp: u64,
}

impl NicknameResponse {
    pub fn accepted(message: impl Into<String>, nickname: &str, player_id: &str) -> Self {
        Self {
            success: true,
            message: message.into(),
            nickname: Some(nickname.to_string()),
            player_id: Some(player_id.to_string()),
            timestamp: now_ms(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            message: reason.into(),
            nickname: None,
            player_id: None,
            timestamp: now_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameUpdate {
    #[serde(rename = "fromPlayer")]
    pub from_player: String,
    pub action: Action,
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    NicknameResponse(NicknameResponse),
    GameUpdate(GameUpdate),
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            message: message.into(),
            timestamp: now_ms(),
        })
    }

    pub fn game_update(from_player: &str, action: Action) -> Self {
        Self::GameUpdate(GameUpdate {
            from_player: from_player.to_string(),
            action,
            timestamp: now_ms(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NicknameResponse(_) => "nickname_response",
            Self::GameUpdate(_) => "game_update",
            Self::Error(_) => "error",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_tagged(data, SERVER_MESSAGE_TYPES)
    }
}

// Parsing goes through `Value` first so an unrecognised `type` can be told
// apart from a payload that is not JSON at all.
fn decode_tagged<T: serde::de::DeserializeOwned>(
    data: &[u8],
    known: &[&str],
) -> Result<T, ProtocolError> {
    let value: Value = serde_json::from_slice(data).map_err(ProtocolError::Malformed)?;

    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    if !known.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(ProtocolError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_nickname_wire_shape() {
        let msg = ClientMessage::SetNickname {
            nickname: "bomber42".into(),
            timestamp: 17,
        };
        let value: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "set_nickname", "nickname": "bomber42", "timestamp": 17})
        );
    }

    #[test]
    fn test_nickname_response_uses_camel_case() {
        let msg = ServerMessage::NicknameResponse(NicknameResponse {
            success: true,
            message: "ok".into(),
            nickname: Some("Alice".into()),
            player_id: Some("player_abc_1".into()),
            timestamp: 5,
        });
        let value: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "nickname_response");
        assert_eq!(value["playerId"], "player_abc_1");
        assert_eq!(value["nickname"], "Alice");
    }

    #[test]
    fn test_rejection_carries_nulls() {
        let msg = ServerMessage::NicknameResponse(NicknameResponse::rejected("nope"));
        let value: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["nickname"].is_null());
        assert!(value["playerId"].is_null());
    }

    #[test]
    fn test_game_update_field_names() {
        let mut action = Action::new();
        action.insert("type".into(), json!("place_bomb"));
        let msg = ServerMessage::game_update("player_a", action);
        let value: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["fromPlayer"], "player_a");
        assert_eq!(value["action"]["type"], "place_bomb");
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = ClientMessage::decode(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_reports_unknown_type() {
        let err = ClientMessage::decode(br#"{"type":"fly","timestamp":1}"#).unwrap_err();
        match err {
            ProtocolError::UnknownType(kind) => assert_eq!(kind, "fly"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = ServerMessage::decode(br#"{"type":"set_nickname"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(_)));
    }

    #[test]
    fn test_missing_nickname_decodes_empty() {
        let msg = ClientMessage::decode(br#"{"type":"set_nickname"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SetNickname {
                nickname: String::new(),
                timestamp: 0
            }
        );
    }

    #[test]
    fn test_game_action_requires_object() {
        let err = ClientMessage::decode(br#"{"type":"game_action","action":3}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_inbound_error() {
        let msg = ServerMessage::decode(br#"{"type":"error","message":"x","timestamp":9}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Error(ErrorMessage {
                message: "x".into(),
                timestamp: 9
            })
        );
    }
}
