//! Message protocol definitions
//!
//! Every frame on the wire, in both directions, is a flat JSON object with
//! `action`, `content`, `sender` and `chat_id` string fields. Inbound frames
//! are decoded into a typed [`Action`].

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::types::{ChatId, ClientId};

/// Action tag for a relayed text message
pub const ACTION_SEND_TEXT: &str = "send_text";
/// Action tag for a relayed binary message
pub const ACTION_SEND_BINARY: &str = "send_binary";
/// Action tag for joining a chat
pub const ACTION_JOIN_CHAT: &str = "join_chat";
/// Action tag for leaving a chat
pub const ACTION_LEAVE_CHAT: &str = "leave_chat";
/// Action tag for creating a chat
pub const ACTION_CREATE_CHAT: &str = "create_chat";
/// Action tag for server → client error reports
pub const ACTION_ERROR: &str = "error";

/// Sender name used for server-generated notices
pub const SYSTEM_SENDER: &str = "system";

/// Wire frame
///
/// Missing fields decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub chat_id: String,
}

impl Frame {
    /// Parse a frame from a JSON text payload
    pub fn from_json(text: &str) -> Result<Self, ChatError> {
        serde_json::from_str(text).map_err(|e| ChatError::Protocol(e.to_string()))
    }

    /// Parse a frame from a JSON binary payload
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ChatError> {
        serde_json::from_slice(bytes).map_err(|e| ChatError::Protocol(e.to_string()))
    }

    /// Error report sent back to the connection that triggered `err`
    pub fn error(chat_id: &str, err: &ChatError) -> Self {
        Self {
            action: ACTION_ERROR.to_string(),
            content: err.to_string(),
            sender: String::new(),
            chat_id: chat_id.to_string(),
        }
    }

    /// Server notice that `client_id` left `chat_id`
    pub fn left_notice(chat_id: &ChatId, client_id: &ClientId) -> Self {
        Self {
            action: ACTION_SEND_TEXT.to_string(),
            content: format!("{} left chat", client_id),
            sender: SYSTEM_SENDER.to_string(),
            chat_id: chat_id.to_string(),
        }
    }
}

/// Payload kind of a relayed message
///
/// The core never interprets the content; the kind is only echoed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Binary,
}

impl PayloadKind {
    pub fn action(self) -> &'static str {
        match self {
            PayloadKind::Text => ACTION_SEND_TEXT,
            PayloadKind::Binary => ACTION_SEND_BINARY,
        }
    }
}

/// Decoded client intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    JoinChat {
        chat_id: ChatId,
        sender: ClientId,
    },
    LeaveChat {
        chat_id: ChatId,
        sender: ClientId,
    },
    SendMessage {
        chat_id: ChatId,
        sender: ClientId,
        kind: PayloadKind,
        content: String,
    },
    /// `content` carries the display name; empty means "use the chat id"
    CreateChat {
        chat_id: ChatId,
        sender: ClientId,
        name: String,
    },
    /// Unrecognized action tag, ignored by the router
    Unknown { action: String },
}

impl Action {
    /// Decode a frame into an action
    ///
    /// Fails with `ChatError::Protocol` when a known action lacks its
    /// `chat_id` or `sender`.
    pub fn decode(frame: Frame) -> Result<Self, ChatError> {
        let Frame {
            action,
            content,
            sender,
            chat_id,
        } = frame;

        let known = matches!(
            action.as_str(),
            ACTION_JOIN_CHAT
                | ACTION_LEAVE_CHAT
                | ACTION_CREATE_CHAT
                | ACTION_SEND_TEXT
                | ACTION_SEND_BINARY
        );
        if !known {
            return Ok(Action::Unknown { action });
        }
        let kind = action.as_str();

        if chat_id.is_empty() {
            return Err(ChatError::Protocol(format!("{} without chat_id", kind)));
        }
        if sender.is_empty() {
            return Err(ChatError::Protocol(format!("{} without sender", kind)));
        }

        let chat_id = ChatId(chat_id);
        let sender = ClientId(sender);

        let decoded = match kind {
            ACTION_JOIN_CHAT => Action::JoinChat { chat_id, sender },
            ACTION_LEAVE_CHAT => Action::LeaveChat { chat_id, sender },
            ACTION_CREATE_CHAT => {
                let name = if content.is_empty() {
                    chat_id.to_string()
                } else {
                    content
                };
                Action::CreateChat {
                    chat_id,
                    sender,
                    name,
                }
            }
            ACTION_SEND_BINARY => Action::SendMessage {
                chat_id,
                sender,
                kind: PayloadKind::Binary,
                content,
            },
            _ => Action::SendMessage {
                chat_id,
                sender,
                kind: PayloadKind::Text,
                content,
            },
        };
        Ok(decoded)
    }

    /// Chat id the action refers to, empty for unknown actions
    pub fn chat_id(&self) -> &str {
        match self {
            Action::JoinChat { chat_id, .. }
            | Action::LeaveChat { chat_id, .. }
            | Action::SendMessage { chat_id, .. }
            | Action::CreateChat { chat_id, .. } => chat_id.as_str(),
            Action::Unknown { .. } => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Result<Action, ChatError> {
        Action::decode(Frame::from_json(json)?)
    }

    #[test]
    fn test_decode_send_text() {
        let action =
            decode(r#"{"action":"send_text","content":"hi","sender":"A","chat_id":"r1"}"#).unwrap();
        assert_eq!(
            action,
            Action::SendMessage {
                chat_id: ChatId::new("r1"),
                sender: ClientId::new("A"),
                kind: PayloadKind::Text,
                content: "hi".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_send_binary_keeps_kind() {
        let action =
            decode(r#"{"action":"send_binary","content":"AAEC","sender":"A","chat_id":"r1"}"#)
                .unwrap();
        match action {
            Action::SendMessage { kind, content, .. } => {
                assert_eq!(kind, PayloadKind::Binary);
                assert_eq!(content, "AAEC");
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_action_is_accepted() {
        let action = decode(r#"{"action":"wave","sender":"A","chat_id":"r1"}"#).unwrap();
        assert_eq!(
            action,
            Action::Unknown {
                action: "wave".to_string()
            }
        );

        // Unknown actions need no ids at all
        let action = decode(r#"{"action":"ping"}"#).unwrap();
        assert!(matches!(action, Action::Unknown { .. }));
    }

    #[test]
    fn test_decode_create_chat_name_fallback() {
        let named =
            decode(r#"{"action":"create_chat","content":"General","sender":"A","chat_id":"r2"}"#)
                .unwrap();
        let unnamed = decode(r#"{"action":"create_chat","sender":"A","chat_id":"r2"}"#).unwrap();

        match (named, unnamed) {
            (Action::CreateChat { name: a, .. }, Action::CreateChat { name: b, .. }) => {
                assert_eq!(a, "General");
                assert_eq!(b, "r2");
            }
            other => panic!("Wrong variants: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = decode(r#"{"action": "join_chat", "#).unwrap_err();
        assert!(err.is_fatal());

        let err = decode(r#"{"action": 5}"#).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_decode_rejects_missing_ids() {
        let err = decode(r#"{"action":"join_chat","sender":"A"}"#).unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));

        let err = decode(r#"{"action":"leave_chat","chat_id":"r1"}"#).unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));
    }

    #[test]
    fn test_frame_serializes_wire_fields() {
        let frame = Frame::left_notice(&ChatId::new("r4"), &ClientId::new("A"));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"action\":\"send_text\""));
        assert!(json.contains("\"content\":\"A left chat\""));
        assert!(json.contains("\"sender\":\"system\""));
        assert!(json.contains("\"chat_id\":\"r4\""));
    }

    #[test]
    fn test_error_frame() {
        let frame = Frame::error("r2", &ChatError::AlreadyExists(ChatId::new("r2")));
        assert_eq!(frame.action, ACTION_ERROR);
        assert_eq!(frame.content, "chat r2 already exists");
        assert!(frame.sender.is_empty());
    }
}
