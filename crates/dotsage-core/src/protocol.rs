// Events exchanged between the ledger, the LLM client and their consumers.

use serde::{Deserialize, Serialize};

use crate::question::Category;

/// Emitted after a successful ledger write. Serialized as the JSON frames
/// sent over the event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    QuestionAsked {
        id: u32,
        author: String,
        category: Category,
    },
    #[serde(rename_all = "camelCase")]
    QuestionVoted { id: u32, is_up: bool },
}

/// Streaming output of one LLM completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmEvent {
    /// A fragment of generated text.
    Token { text: String },
    /// The completion finished; `full_text` is every token concatenated.
    Complete {
        full_text: String,
        input_tokens: u32,
        output_tokens: u32,
    },
    /// The completion failed or the client is not configured.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_event_json_is_tagged() {
        let asked = LedgerEvent::QuestionAsked {
            id: 3,
            author: "5Grw".to_string(),
            category: Category::Docs,
        };
        let v = serde_json::to_value(&asked).unwrap();
        assert_eq!(v["type"], "questionAsked");
        assert_eq!(v["id"], 3);
        assert_eq!(v["category"], "Docs");

        let voted = LedgerEvent::QuestionVoted { id: 3, is_up: false };
        let v = serde_json::to_value(&voted).unwrap();
        assert_eq!(v["type"], "questionVoted");
        assert_eq!(v["isUp"], false);
    }

    #[test]
    fn ledger_event_parses_back() {
        let json = r#"{"type":"questionVoted","id":9,"isUp":true}"#;
        let event: LedgerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, LedgerEvent::QuestionVoted { id: 9, is_up: true });
    }
}
