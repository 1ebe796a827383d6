use ledgerscan_llm::{ChatGateway, ChatMessage};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::cache::ResponseCache;
use crate::error::{LedgerError, Result, SchemaError};
use crate::fingerprint::fingerprint_text;
use crate::prompt::query_prompt;
use crate::record::RecordTable;
use crate::schema;
use crate::store::Namespace;

const SCHEMA_TARGET: &str = "query answer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    #[serde(alias = "answer")]
    pub answer_text: String,
    #[serde(default)]
    pub answer_numeric: Option<f64>,
    #[serde(default, deserialize_with = "nullable_rows")]
    pub rows: Vec<Map<String, Value>>,
}

impl QueryAnswer {
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }
}

fn nullable_rows<'de, D>(deserializer: D) -> std::result::Result<Vec<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Map<String, Value>>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Cache key of a question against a table: both texts hashed back to back.
///
/// Reordering rows changes the table text and therefore the key.
pub fn query_key(table_text: &str, question: &str) -> String {
    fingerprint_text(&[table_text, question])
}

pub fn decode_answer(raw: &str) -> Result<QueryAnswer> {
    let object = schema::parse_object(SCHEMA_TARGET, raw)?;
    if !object.contains_key("answer_text") && !object.contains_key("answer") {
        return Err(SchemaError::missing_key(SCHEMA_TARGET, "answer_text").into());
    }
    schema::decode(SCHEMA_TARGET, object)
}

/// Answers `question` over the whole table.
///
/// Every row and column goes into the prompt, income rows first; a table
/// too large for the model's context fails at the endpoint.
pub fn ask(
    gateway: &dyn ChatGateway,
    cache: &ResponseCache,
    table: &RecordTable,
    question: &str,
    max_tokens: u32,
) -> Result<QueryAnswer> {
    if question.trim().is_empty() {
        return Err(LedgerError::InvalidInput("question is empty".to_string()));
    }
    let table_text = table.grouped().to_text();
    let key = query_key(&table_text, question);
    info!(rows = table.len(), key = %key, "answering question");
    cache.get_or_compute(Namespace::Queries, &key, || {
        let messages = [ChatMessage::user(query_prompt(&table_text, question))];
        let raw = gateway.complete(&messages, max_tokens)?;
        decode_answer(&raw)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;
    use crate::record::TransactionType;
    use crate::test_support::{memory_cache, ScriptedGateway};
    use ledgerscan_llm::MessageContent;

    fn table() -> RecordTable {
        RecordTable::from_records(vec![
            record(Some(TransactionType::Income), Some(100.0), "a.png"),
            record(Some(TransactionType::Expense), Some(40.0), "b.png"),
        ])
    }

    #[test]
    fn decode_accepts_answer_alias_and_null_rows() {
        let answer = decode_answer(r#"{"answer": "two", "rows": null}"#).unwrap();
        assert_eq!(answer.answer_text, "two");
        assert!(!answer.has_rows());
        assert_eq!(answer.answer_numeric, None);
    }

    #[test]
    fn decode_requires_answer_text() {
        let err = decode_answer(r#"{"rows": []}"#).unwrap_err();
        assert!(matches!(err, LedgerError::Schema(_)));
        let err = decode_answer(r#"{"answer_text": "x", "rows": "none"}"#).unwrap_err();
        assert!(matches!(err, LedgerError::Schema(_)));
    }

    #[test]
    fn prompt_embeds_full_table_then_question() {
        let gateway = ScriptedGateway::with_replies([
            r#"{"answer_text": "one expense", "answer_numeric": 40, "rows": [{"source_document": "b.png"}]}"#,
        ]);
        let (_, cache) = memory_cache();
        let answer = ask(&gateway, &cache, &table(), "كم عدد المصروفات؟", 2000).unwrap();
        assert_eq!(answer.answer_numeric, Some(40.0));
        assert_eq!(answer.rows[0]["source_document"], "b.png");
        let request = gateway.request(0);
        let MessageContent::Text(prompt) = &request[0].content else {
            panic!("expected a text prompt");
        };
        let table_at = prompt.find("a.png").unwrap();
        let question_at = prompt.find("كم عدد المصروفات؟").unwrap();
        assert!(prompt.contains("b.png"));
        assert!(table_at < question_at);
    }

    #[test]
    fn income_rows_lead_the_prompt() {
        let gateway = ScriptedGateway::with_replies([r#"{"answer_text": "ok"}"#]);
        let (_, cache) = memory_cache();
        let table = RecordTable::from_records(vec![
            record(Some(TransactionType::Expense), Some(40.0), "b.png"),
            record(Some(TransactionType::Income), Some(100.0), "a.png"),
        ]);
        ask(&gateway, &cache, &table, "total?", 2000).unwrap();
        let request = gateway.request(0);
        let MessageContent::Text(prompt) = &request[0].content else {
            panic!("expected a text prompt");
        };
        assert!(prompt.find("a.png").unwrap() < prompt.find("b.png").unwrap());
    }

    #[test]
    fn repeated_question_is_served_from_cache() {
        let gateway = ScriptedGateway::with_replies([r#"{"answer_text": "ok"}"#]);
        let (_, cache) = memory_cache();
        let first = ask(&gateway, &cache, &table(), "total?", 2000).unwrap();
        let second = ask(&gateway, &cache, &table(), "total?", 2000).unwrap();
        assert_eq!(first, second);
        assert_eq!(gateway.calls(), 1);
    }

    #[test]
    fn empty_question_is_rejected_without_a_call() {
        let gateway = ScriptedGateway::default();
        let (_, cache) = memory_cache();
        let err = ask(&gateway, &cache, &table(), "   ", 2000).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(gateway.calls(), 0);
    }
}
