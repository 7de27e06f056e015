//! Command-line arguments and the run configuration built from them.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use shardshift_client::BulkSinkConfig;
use shardshift_core::{DeltaConfig, IndexFilter, MigrationConfig};

/// Default maximum documents per bulk request.
pub const DEFAULT_MAX_DOCS: usize = 1000;

/// Default maximum bulk request size in megabytes.
pub const DEFAULT_MAX_MB: u64 = 10;

/// shardshift: migrate search cluster snapshots
#[derive(Parser, Debug)]
#[command(name = "shardshift")]
#[command(version, about = "Migrate documents and metadata between search cluster snapshots")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the documents that changed between two snapshots as bulk files.
    Delta(DeltaArgs),

    /// Write a snapshot's templates and index definitions.
    Metadata(MetadataArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only migrate these indices (repeatable).
    #[arg(long = "index")]
    pub indices: Vec<String>,

    /// Also migrate indices whose name starts with a dot.
    #[arg(long)]
    pub include_system_indices: bool,
}

impl FilterArgs {
    fn into_filter(self) -> IndexFilter {
        let filter = IndexFilter::new().with_system_indices(self.include_system_indices);
        if self.indices.is_empty() {
            filter
        } else {
            filter.with_allowlist(self.indices)
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeltaArgs {
    /// Manifest of the previous snapshot. Omit for a full copy.
    #[arg(long)]
    pub previous: Option<PathBuf>,

    /// Manifest of the current snapshot.
    #[arg(long)]
    pub current: PathBuf,

    /// Output directory for bulk files.
    #[arg(short, long)]
    pub out: PathBuf,

    /// Checkpoint directory; reruns resume each shard where it stopped.
    #[arg(long)]
    pub checkpoints: Option<PathBuf>,

    /// Maximum documents per bulk request.
    #[arg(long, default_value_t = DEFAULT_MAX_DOCS)]
    pub max_docs: usize,

    /// Maximum bulk request size in megabytes.
    #[arg(long, default_value_t = DEFAULT_MAX_MB)]
    pub max_mb: u64,

    /// Shards of one index migrated concurrently.
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Blocking segment read workers.
    #[arg(long, default_value_t = 4)]
    pub read_workers: usize,

    /// Bulk item error types counted as success (repeatable).
    #[arg(long = "allow-error")]
    pub allowlisted_errors: Vec<String>,

    /// Resubmissions of failed bulk positions.
    #[arg(long, default_value_t = 3)]
    pub resubmits: u32,

    /// Print Prometheus metrics when done.
    #[arg(long)]
    pub print_metrics: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug, Clone)]
pub struct MetadataArgs {
    /// Manifest of the snapshot.
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Output directory.
    #[arg(short, long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Everything a `delta` run needs.
#[derive(Debug, Clone)]
pub struct DeltaRunConfig {
    pub previous: Option<PathBuf>,
    pub current: PathBuf,
    pub out: PathBuf,
    pub checkpoints: Option<PathBuf>,
    pub migration: MigrationConfig,
    pub delta: DeltaConfig,
    pub sink: BulkSinkConfig,
    pub filter: IndexFilter,
    pub print_metrics: bool,
}

impl DeltaArgs {
    /// Convert command-line arguments to the run configuration.
    pub fn into_config(self) -> DeltaRunConfig {
        let migration = MigrationConfig::new()
            .with_max_docs_per_batch(self.max_docs)
            .with_max_bytes_per_batch(self.max_mb.saturating_mul(1024 * 1024))
            .with_max_concurrent_shards(self.concurrency);
        let delta = DeltaConfig::new().with_read_workers(self.read_workers);
        let sink = BulkSinkConfig::new()
            .with_allowlisted_error_types(self.allowlisted_errors)
            .with_max_resubmit_attempts(self.resubmits)
            .with_resubmit_backoff(Duration::from_millis(100));

        DeltaRunConfig {
            previous: self.previous,
            current: self.current,
            out: self.out,
            checkpoints: self.checkpoints,
            migration,
            delta,
            sink,
            filter: self.filter.into_filter(),
            print_metrics: self.print_metrics,
        }
    }
}

impl MetadataArgs {
    pub fn index_filter(&self) -> IndexFilter {
        self.filter.clone().into_filter()
    }
}
