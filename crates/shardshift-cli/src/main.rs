//! shardshift command-line tool.
//!
//! Runs the document and metadata pipelines between manifest snapshots,
//! writing the target side to a directory of bulk files.

mod config;
mod target;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardshift_client::{BulkDocumentSink, ClusterMetadataSink};
use shardshift_core::{
    new_shared_registry, run_until_shutdown, CursorStore, DeltaEngine, DocumentMigrator,
    ManifestSnapshot, MetadataMigrator, SnapshotSource,
};

use config::{Cli, Command, DeltaArgs, MetadataArgs};
use target::FileTarget;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardshift=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Delta(args) => run_delta(args).await,
        Command::Metadata(args) => run_metadata(args).await,
    }
}

async fn run_delta(args: DeltaArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config();
    tracing::info!(
        previous = ?config.previous,
        current = %config.current.display(),
        out = %config.out.display(),
        "configuration loaded"
    );

    let current = Arc::new(ManifestSnapshot::load(&config.current)?);
    let metrics = new_shared_registry();
    let engine = Arc::new(DeltaEngine::new(config.delta)?.with_metrics(metrics.clone()));

    let mut source = SnapshotSource::new(current.clone(), engine);
    if let Some(path) = &config.previous {
        let previous = Arc::new(ManifestSnapshot::load(path)?);
        source = source.with_previous(previous.name().to_string(), previous);
    }

    let target = Arc::new(FileTarget::create(&config.out).await?);
    let sink = BulkDocumentSink::new(target, config.sink.clone()).with_metrics(metrics.clone());

    let mut migrator = DocumentMigrator::new(
        current,
        Arc::new(source),
        Arc::new(sink),
        config.migration.clone(),
    )?
    .with_filter(config.filter.clone())
    .with_metrics(metrics.clone());

    let checkpoints = match &config.checkpoints {
        Some(path) => {
            let store = CursorStore::open_path(path)?;
            tracing::info!(path = %path.display(), shards = store.len(), "checkpoints opened");
            migrator = migrator.with_checkpoints(store.clone());
            Some(store)
        }
        None => None,
    };

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    let outcome = run_until_shutdown(migrator.migrate_all(), shutdown_rx, |cursor| {
        tracing::info!(
            shard = %cursor.shard_id,
            offset = cursor.last_doc_offset,
            docs = cursor.docs_in_batch,
            "batch acknowledged"
        );
    })
    .await;

    if let Some(store) = &checkpoints {
        store.flush()?;
    }
    if config.print_metrics {
        println!("{}", metrics.to_prometheus());
    }

    tracing::info!(
        batches = outcome.completed.len(),
        docs = outcome.docs_written(),
        shards = outcome.latest_per_shard().len(),
        cancelled = outcome.cancelled,
        "delta migration finished"
    );

    match outcome.failures.into_iter().next() {
        Some(failure) => Err(failure.into()),
        None => Ok(()),
    }
}

async fn run_metadata(args: MetadataArgs) -> Result<(), Box<dyn std::error::Error>> {
    let filter = args.index_filter();
    let snapshot = Arc::new(ManifestSnapshot::load(&args.snapshot)?);
    let target = Arc::new(FileTarget::create(&args.out).await?);
    tracing::info!(
        snapshot = %snapshot.name(),
        out = %target.root().display(),
        "migrating metadata"
    );

    let report = MetadataMigrator::new(snapshot, Arc::new(ClusterMetadataSink::new(target)))
        .with_filter(filter)
        .migrate()
        .await?;

    for (index, result) in &report.indices {
        match result {
            Ok(status) => println!("{}: {:?}", index, status),
            Err(e) => println!("{}: failed: {}", index, e.inner()),
        }
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} index(es) failed", report.failed_indices().len()).into())
    }
}
