//! Migration pipelines.
//!
//! [`DocumentMigrator`] streams document changes from a source into a sink in
//! bounded batches; [`MetadataMigrator`] writes templates and index metadata
//! ahead of any documents. [`run_until_shutdown`] drives a cursor stream and
//! stops it cleanly when asked.

mod batch;
mod config;
mod documents;
mod metadata;
mod shutdown;

pub use batch::{batch_changes, Batch, BatchAccumulator, BatchLimits};
pub use config::{IndexFilter, MigrationConfig};
pub use documents::{CursorStream, DocumentMigrator};
pub use metadata::{MetadataMigrator, MetadataReport, TemplateKind};
pub use shutdown::{run_until_shutdown, MigrationOutcome};
