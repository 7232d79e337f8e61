//! Client → Server messages

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Presence action tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceAction {
    Join,
    Leave,
    Heartbeat,
}

impl PresenceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceAction::Join => "join",
            PresenceAction::Leave => "leave",
            PresenceAction::Heartbeat => "heartbeat",
        }
    }

    /// Whether the action must carry a `userEmail`.
    pub fn requires_email(&self) -> bool {
        !matches!(self, PresenceAction::Leave)
    }
}

impl fmt::Display for PresenceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action tag is not one of join/leave/heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown presence action: {}", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for PresenceAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join" => Ok(PresenceAction::Join),
            "leave" => Ok(PresenceAction::Leave),
            "heartbeat" => Ok(PresenceAction::Heartbeat),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Body of `POST /api/presence`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRequest {
    pub action: PresenceAction,
    pub stream_id: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// Body of `POST /api/emails`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEmailRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_wire_tags() {
        assert_eq!("join".parse::<PresenceAction>(), Ok(PresenceAction::Join));
        assert_eq!("leave".parse::<PresenceAction>(), Ok(PresenceAction::Leave));
        assert_eq!(
            "heartbeat".parse::<PresenceAction>(),
            Ok(PresenceAction::Heartbeat)
        );
        assert_eq!(
            "JOIN".parse::<PresenceAction>(),
            Err(UnknownAction("JOIN".into()))
        );
    }

    #[test]
    fn presence_request_serializes_camel_case() {
        let req = PresenceRequest {
            action: PresenceAction::Heartbeat,
            stream_id: "s1".into(),
            user_id: "u1".into(),
            session_id: "t1".into(),
            user_email: Some("a@x.com".into()),
        };
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json["action"], "heartbeat");
        assert_eq!(json["streamId"], "s1");
        assert_eq!(json["userEmail"], "a@x.com");
    }

    #[test]
    fn leave_request_omits_missing_email() {
        let req = PresenceRequest {
            action: PresenceAction::Leave,
            stream_id: "s1".into(),
            user_id: "u1".into(),
            session_id: "t1".into(),
            user_email: None,
        };
        let json = serde_json::to_value(&req).expect("serialize");
        assert!(json.get("userEmail").is_none());
        assert!(!PresenceAction::Leave.requires_email());
    }
}
