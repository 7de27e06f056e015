//! Streaming bulk response parser.
//!
//! The acknowledgement body is scanned once, front to back. Only `items[]`
//! is retained, and from each item only `_id`, `result`, `status` and
//! `error.type`; every other value is skipped without being built.
//!
//! Items are recorded as soon as their closing brace is read, so a body that
//! is cut off mid-way still yields every item that was complete before the
//! cut.

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::bitset::DocBitSet;

/// Per-item fields read from the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    /// Action name the item answers (`index`, `delete`, ...).
    pub action: String,
    pub id: Option<String>,
    pub result: Option<String>,
    pub status: Option<u16>,
    pub error_type: Option<String>,
}

#[derive(Deserialize)]
struct ItemBody {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    error: Option<ItemError>,
}

#[derive(Deserialize)]
struct ItemError {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

impl<'de> Deserialize<'de> for BulkItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ItemVisitor;

        impl<'de> Visitor<'de> for ItemVisitor {
            type Value = BulkItem;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a single-action bulk item")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<BulkItem, A::Error> {
                let action: String = map
                    .next_key()?
                    .ok_or_else(|| <A::Error as de::Error>::custom("empty bulk item"))?;
                let body: ItemBody = map.next_value()?;
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}

                Ok(BulkItem {
                    action,
                    id: body.id,
                    result: body.result,
                    status: body.status,
                    error_type: body.error.and_then(|e| e.error_type),
                })
            }
        }

        deserializer.deserialize_map(ItemVisitor)
    }
}

#[derive(Deserialize)]
#[serde(field_identifier, rename_all = "lowercase")]
enum ResponseField {
    Items,
    Errors,
    #[serde(other)]
    Other,
}

/// Top-level response object; pushes items into the borrowed vector.
struct ResponseSeed<'a> {
    items: &'a mut Vec<BulkItem>,
}

impl<'de> DeserializeSeed<'de> for ResponseSeed<'_> {
    type Value = Option<bool>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for ResponseSeed<'_> {
    type Value = Option<bool>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a bulk response object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Option<bool>, A::Error> {
        let items = self.items;
        let mut errors = None;
        while let Some(field) = map.next_key::<ResponseField>()? {
            match field {
                ResponseField::Items => map.next_value_seed(ItemsSeed {
                    items: &mut *items,
                })?,
                ResponseField::Errors => errors = map.next_value::<Option<bool>>()?,
                ResponseField::Other => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(errors)
    }
}

struct ItemsSeed<'a> {
    items: &'a mut Vec<BulkItem>,
}

impl<'de> DeserializeSeed<'de> for ItemsSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ItemsSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of bulk items")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(item) = seq.next_element::<BulkItem>()? {
            self.items.push(item);
        }
        Ok(())
    }
}

/// Parser configured with the error types that count as success.
///
/// Allowlisted error types are treated as successful writes. This conflates
/// an idempotent transport retry (e.g. a version conflict on a document that
/// was already written) with the document actually being correct on the
/// target; callers that need the distinction must inspect
/// [`ParsedBulkResponse::items`].
#[derive(Debug, Clone, Default)]
pub struct BulkResponseParser {
    allowlist: HashSet<String>,
}

impl BulkResponseParser {
    pub fn new<I, S>(allowlist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowlist: allowlist.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a response body. Never fails; see [`ParsedBulkResponse::is_complete`].
    pub fn parse(&self, body: &[u8]) -> ParsedBulkResponse {
        let mut items = Vec::new();
        let mut deserializer = serde_json::Deserializer::from_slice(body);
        let outcome = ResponseSeed { items: &mut items }
            .deserialize(&mut deserializer)
            .and_then(|errors| deserializer.end().map(|_| errors));

        let (errors, complete) = match outcome {
            Ok(errors) => (errors, true),
            Err(err) if err.is_eof() => {
                warn!(parsed = items.len(), "bulk response truncated, keeping parsed items");
                (None, false)
            }
            Err(err) => {
                warn!(error = %err, parsed = items.len(), "malformed bulk response, keeping parsed items");
                (None, false)
            }
        };

        let successes = items
            .iter()
            .map(|item| self.is_success(item))
            .collect::<Vec<_>>();

        ParsedBulkResponse {
            items,
            successes,
            errors,
            complete,
        }
    }

    fn is_success(&self, item: &BulkItem) -> bool {
        item.id.is_some()
            && (item.result.is_some()
                || item
                    .error_type
                    .as_ref()
                    .is_some_and(|t| self.allowlist.contains(t)))
    }
}

/// Outcome of parsing one bulk response.
#[derive(Debug, Clone)]
pub struct ParsedBulkResponse {
    items: Vec<BulkItem>,
    successes: Vec<bool>,
    errors: Option<bool>,
    complete: bool,
}

impl ParsedBulkResponse {
    /// Items parsed, in response order.
    pub fn items(&self) -> &[BulkItem] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Whether the whole body parsed cleanly.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Top-level `errors` flag, when the body carried one.
    pub fn errors_flag(&self) -> Option<bool> {
        self.errors
    }

    /// Ids of successful items (including allowlisted failures), in order.
    pub fn find_success_docs(&self) -> Vec<&str> {
        self.items
            .iter()
            .zip(&self.successes)
            .filter(|(_, ok)| **ok)
            .filter_map(|(item, _)| item.id.as_deref())
            .collect()
    }

    /// Positions of true failures among the parsed items.
    pub fn failed_positions(&self) -> DocBitSet {
        DocBitSet::from_ordinals(
            self.items.len(),
            self.successes
                .iter()
                .enumerate()
                .filter(|(_, ok)| !**ok)
                .map(|(pos, _)| pos),
        )
    }

    /// Failed positions out of `submitted` operations.
    ///
    /// Positions past the last parsed item were never acknowledged and are
    /// reported as failed.
    pub fn failed_positions_of(&self, submitted: usize) -> DocBitSet {
        let mut failed = self.failed_positions().resized(submitted);
        failed.flip(self.items.len(), submitted);
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "took": 30,
        "errors": true,
        "items": [
            {"index": {"_index": "logs", "_id": "a", "result": "created", "status": 201, "_shards": {"total": 2}}},
            {"index": {"_index": "logs", "_id": "b", "status": 429, "error": {"type": "es_rejected_execution_exception", "reason": "queue full"}}},
            {"delete": {"_index": "logs", "_id": "c", "result": "not_found", "status": 404}},
            {"index": {"_index": "logs", "_id": "d", "status": 409, "error": {"type": "version_conflict_engine_exception"}}},
            {"index": {"_index": "logs", "_id": null, "status": 400, "error": {"type": "mapper_parsing_exception"}}}
        ]
    }"#;

    fn parser() -> BulkResponseParser {
        BulkResponseParser::new(["version_conflict_engine_exception"])
    }

    #[test]
    fn test_parse_full_response() {
        let parsed = parser().parse(RESPONSE.as_bytes());
        assert!(parsed.is_complete());
        assert_eq!(parsed.errors_flag(), Some(true));
        assert_eq!(parsed.item_count(), 5);
        assert_eq!(parsed.find_success_docs(), vec!["a", "c", "d"]);

        let failed = parsed.failed_positions();
        assert_eq!(failed.len(), 5);
        assert_eq!(failed.ones().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(
            failed.cardinality() + parsed.find_success_docs().len(),
            parsed.item_count()
        );
    }

    #[test]
    fn test_item_fields() {
        let parsed = parser().parse(RESPONSE.as_bytes());
        let item = &parsed.items()[1];
        assert_eq!(item.action, "index");
        assert_eq!(item.id.as_deref(), Some("b"));
        assert_eq!(item.status, Some(429));
        assert_eq!(item.error_type.as_deref(), Some("es_rejected_execution_exception"));
        assert!(item.result.is_none());
    }

    #[test]
    fn test_without_allowlist_conflicts_fail() {
        let parsed = BulkResponseParser::default().parse(RESPONSE.as_bytes());
        assert_eq!(parsed.failed_positions().ones().collect::<Vec<_>>(), vec![1, 3, 4]);
    }

    #[test]
    fn test_duplicate_ids_tracked_by_position() {
        let body = r#"{"items": [
            {"index": {"_id": "x", "result": "created"}},
            {"index": {"_id": "x", "error": {"type": "boom"}}},
            {"index": {"_id": "x", "result": "updated"}}
        ]}"#;
        let parsed = BulkResponseParser::default().parse(body.as_bytes());
        assert_eq!(parsed.find_success_docs(), vec!["x", "x"]);
        assert_eq!(parsed.failed_positions().ones().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_every_prefix_yields_subset_of_successes() {
        let full = parser().parse(RESPONSE.as_bytes());
        let expected = full.find_success_docs();

        for cut in 1..RESPONSE.len() {
            let parsed = parser().parse(&RESPONSE.as_bytes()[..cut]);
            let got = parsed.find_success_docs();
            assert!(got.len() <= expected.len(), "cut at {}", cut);
            assert_eq!(&expected[..got.len()], &got[..], "cut at {}", cut);
        }
    }

    #[test]
    fn test_truncated_keeps_complete_items() {
        let cut = RESPONSE.find(r#"{"delete""#).unwrap() + 5;
        let parsed = parser().parse(&RESPONSE.as_bytes()[..cut]);
        assert!(!parsed.is_complete());
        assert_eq!(parsed.item_count(), 2);
        assert_eq!(parsed.find_success_docs(), vec!["a"]);
    }

    #[test]
    fn test_unacknowledged_positions_count_as_failed() {
        let cut = RESPONSE.find(r#"{"delete""#).unwrap();
        let parsed = parser().parse(&RESPONSE.as_bytes()[..cut]);
        let failed = parsed.failed_positions_of(5);
        assert_eq!(failed.ones().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_malformed_body_is_not_fatal() {
        let parsed = parser().parse(b"<html>bad gateway</html>");
        assert!(!parsed.is_complete());
        assert_eq!(parsed.item_count(), 0);
        assert!(parsed.failed_positions().is_empty());
    }

    #[test]
    fn test_trailing_garbage_marks_incomplete() {
        let body = format!("{} trailing", RESPONSE);
        let parsed = parser().parse(body.as_bytes());
        assert!(!parsed.is_complete());
        assert_eq!(parsed.item_count(), 5);
    }
}
