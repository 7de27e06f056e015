//! Bulk wire codec.
//!
//! A bulk request body is a sequence of UTF-8 lines. Each operation emits one
//! action line (`{"index":{...}}` or `{"delete":{...}}`); an index operation
//! that includes its document follows it with the raw document JSON on the
//! next line. Every line, including the last, ends with `\n`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::change::{ChangeKind, DocumentChange};
use crate::Error;

/// Schema version written into every [`BulkOperationSpec`].
pub const BULK_SCHEMA_VERSION: u32 = 1;

/// Target coordinates of a single bulk action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationMeta {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
}

impl OperationMeta {
    pub fn new(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            doc_type: None,
            routing: None,
        }
    }
}

/// Index (create or overwrite) action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOp {
    pub schema_version: u32,
    pub meta: OperationMeta,
    pub include_document: bool,
    pub document: Option<Bytes>,
}

/// Delete action. Never carries a body line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOp {
    pub schema_version: u32,
    pub meta: OperationMeta,
}

/// One encoded write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOperationSpec {
    Index(IndexOp),
    Delete(DeleteOp),
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum ActionLineRef<'a> {
    Index(&'a OperationMeta),
    Delete(&'a OperationMeta),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ActionLine {
    Index(OperationMeta),
    Delete(OperationMeta),
}

impl BulkOperationSpec {
    /// Index action that inlines `document`.
    pub fn index(meta: OperationMeta, document: impl Into<Bytes>) -> Self {
        BulkOperationSpec::Index(IndexOp {
            schema_version: BULK_SCHEMA_VERSION,
            meta,
            include_document: true,
            document: Some(document.into()),
        })
    }

    pub fn delete(meta: OperationMeta) -> Self {
        BulkOperationSpec::Delete(DeleteOp {
            schema_version: BULK_SCHEMA_VERSION,
            meta,
        })
    }

    /// Build the bulk action for `change`, addressed to `target_index`.
    pub fn from_change(change: &DocumentChange, target_index: &str) -> Self {
        let meta = OperationMeta {
            index: target_index.to_string(),
            id: change.id().to_string(),
            doc_type: change.doc_type().map(str::to_string),
            routing: change.routing().map(str::to_string),
        };
        match change.kind() {
            ChangeKind::Index => BulkOperationSpec::Index(IndexOp {
                schema_version: BULK_SCHEMA_VERSION,
                meta,
                include_document: true,
                document: change.source().cloned(),
            }),
            ChangeKind::Delete => BulkOperationSpec::delete(meta),
        }
    }

    pub fn meta(&self) -> &OperationMeta {
        match self {
            BulkOperationSpec::Index(op) => &op.meta,
            BulkOperationSpec::Delete(op) => &op.meta,
        }
    }

    pub fn schema_version(&self) -> u32 {
        match self {
            BulkOperationSpec::Index(op) => op.schema_version,
            BulkOperationSpec::Delete(op) => op.schema_version,
        }
    }

    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            BulkOperationSpec::Index(_) => "index",
            BulkOperationSpec::Delete(_) => "delete",
        }
    }

    /// Append this operation's lines to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let version = self.schema_version();
        if version != BULK_SCHEMA_VERSION {
            return Err(Error::VersionMismatch {
                expected: BULK_SCHEMA_VERSION,
                actual: version,
            });
        }

        match self {
            BulkOperationSpec::Index(op) => {
                serde_json::to_writer(&mut *buf, &ActionLineRef::Index(&op.meta))?;
                buf.push(b'\n');
                if op.include_document {
                    let document = op.document.as_ref().ok_or_else(|| {
                        Error::InvalidMessage(format!(
                            "index action for '{}' includes a document but has none",
                            op.meta.id
                        ))
                    })?;
                    write_document_line(buf, document)?;
                }
            }
            BulkOperationSpec::Delete(op) => {
                serde_json::to_writer(&mut *buf, &ActionLineRef::Delete(&op.meta))?;
                buf.push(b'\n');
            }
        }
        Ok(())
    }
}

/// Documents must occupy exactly one line; multi-line JSON is compacted.
fn write_document_line(buf: &mut Vec<u8>, document: &[u8]) -> Result<(), Error> {
    if document.contains(&b'\n') {
        let value: serde_json::Value = serde_json::from_slice(document)?;
        serde_json::to_writer(&mut *buf, &value)?;
    } else {
        buf.extend_from_slice(document);
    }
    buf.push(b'\n');
    Ok(())
}

/// Encode `specs` into one bulk request body.
pub fn encode_bulk(specs: &[BulkOperationSpec]) -> Result<Bytes, Error> {
    let mut buf = Vec::with_capacity(specs.len() * 128);
    for spec in specs {
        spec.encode_into(&mut buf)?;
    }
    Ok(Bytes::from(buf))
}

/// Decode a bulk request body back into operations.
///
/// A line directly after an index action is taken as that action's document
/// unless it is itself a well-formed action line. Index actions may omit
/// their document, so a document that happens to look like an action line
/// (`{"delete":{"_index":..,"_id":..}}`) decodes as an extra operation. Use
/// [`decode_inline_bulk`] for bodies built from [`DocumentChange`]s, where
/// every index action carries its document.
pub fn decode_bulk(body: &[u8]) -> Result<Vec<BulkOperationSpec>, Error> {
    let mut specs = Vec::new();
    for (line_no, line) in body.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        if let Ok(action) = serde_json::from_slice::<ActionLine>(line) {
            specs.push(match action {
                ActionLine::Index(meta) => BulkOperationSpec::Index(IndexOp {
                    schema_version: BULK_SCHEMA_VERSION,
                    meta,
                    include_document: false,
                    document: None,
                }),
                ActionLine::Delete(meta) => BulkOperationSpec::delete(meta),
            });
            continue;
        }

        match specs.last_mut() {
            Some(BulkOperationSpec::Index(op)) if op.document.is_none() => {
                op.include_document = true;
                op.document = Some(Bytes::copy_from_slice(line));
            }
            _ => {
                return Err(Error::InvalidMessage(format!(
                    "line {} is neither an action nor an index document",
                    line_no + 1
                )))
            }
        }
    }
    Ok(specs)
}

/// Decode a bulk request body in which every index action is followed by
/// its document line.
///
/// This is the layout [`BulkOperationSpec::from_change`] always encodes, so
/// document contents never affect how lines are paired.
pub fn decode_inline_bulk(body: &[u8]) -> Result<Vec<BulkOperationSpec>, Error> {
    let mut specs = Vec::new();
    let mut lines = body.split(|b| *b == b'\n').enumerate();
    while let Some((line_no, line)) = lines.next() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let action = serde_json::from_slice::<ActionLine>(line).map_err(|e| {
            Error::InvalidMessage(format!("line {} is not an action: {}", line_no + 1, e))
        })?;
        specs.push(match action {
            ActionLine::Index(meta) => match lines.next() {
                Some((_, document)) if !document.is_empty() => {
                    BulkOperationSpec::index(meta, Bytes::copy_from_slice(document))
                }
                _ => {
                    return Err(Error::InvalidMessage(format!(
                        "index action on line {} has no document",
                        line_no + 1
                    )))
                }
            },
            ActionLine::Delete(meta) => BulkOperationSpec::delete(meta),
        });
    }
    Ok(specs)
}
