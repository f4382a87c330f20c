//! The queue wire format: a `Ready{op_id}` record.

use serde::{Deserialize, Serialize};

use voyage_core::constants::READY_MESSAGE_VERSION;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadyMessage {
    #[serde(rename = "messageEnum")]
    pub message_enum: String,
    pub version: u32,
    #[serde(rename = "flightId")]
    pub flight_id: String,
}

impl ReadyMessage {
    pub fn ready(flight_id: impl Into<String>) -> Self {
        Self {
            message_enum: "READY".to_string(),
            version: READY_MESSAGE_VERSION,
            flight_id: flight_id.into(),
        }
    }

    /// `false` means the adapter should nack: unknown enum or an
    /// incompatible major version.
    pub fn is_supported(&self) -> bool {
        self.message_enum == "READY" && self.version == READY_MESSAGE_VERSION
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ReadyMessage serializes")
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = ReadyMessage::ready("op-1");
        let raw = msg.to_json();
        let parsed = ReadyMessage::from_json(&raw).expect("parses");
        assert_eq!(msg, parsed);
        assert!(parsed.is_supported());
    }

    #[test]
    fn rejects_unknown_enum_or_version() {
        let unknown_enum = ReadyMessage { message_enum: "OTHER".into(), version: 1, flight_id: "x".into() };
        assert!(!unknown_enum.is_supported());

        let bad_version = ReadyMessage { message_enum: "READY".into(), version: 99, flight_id: "x".into() };
        assert!(!bad_version.is_supported());
    }
}
