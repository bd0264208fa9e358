use serde::{Deserialize, Serialize};

use larder_store::MergeableContent;

/// Frames exchanged over a store's sync socket, in both directions.
///
/// Both peers apply `Content` and `Changes` with the same merge primitive,
/// so the protocol is symmetric: the server is just the one replica that
/// never goes away.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SyncMessage {
    /// Ask the peer for its full mergeable content.
    GetContent,

    /// Full mergeable content, sent in reply to `GetContent`
    Content { content: MergeableContent },

    /// A merge delta, or the sender's full state after a handshake
    Changes { content: MergeableContent },
}

impl SyncMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetContent => "GetContent",
            Self::Content { .. } => "Content",
            Self::Changes { .. } => "Changes",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub loaded_stores: usize,
}

#[cfg(test)]
mod tests {
    use larder_store::{CellValue, MergeableCell, Stamp};

    use super::*;

    #[test]
    fn tagged_wire_format() {
        assert_eq!(SyncMessage::GetContent.to_json().unwrap(), r#"{"type":"GetContent"}"#);

        let mut content = MergeableContent::default();
        content.insert_value(
            "name",
            MergeableCell::new(Stamp::new(1, 0, "r"), Some(CellValue::from("Groceries"))),
        );
        let json = SyncMessage::Changes { content }.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"Changes","data":{"content":"#));

        match serde_json::from_str::<SyncMessage>(&json).unwrap() {
            SyncMessage::Changes { content } => assert_eq!(content.cell_count(), 1),
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn rejects_unknown_frames() {
        assert!(serde_json::from_str::<SyncMessage>(r#"{"type":"Purge"}"#).is_err());
    }
}
