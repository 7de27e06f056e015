//! Metadata migration: templates first, then index metadata in listed order.

use std::sync::Arc;

use serde_json::Value;
use shardshift_proto::IndexMetadataSnapshot;
use tracing::{error, info};

use super::config::IndexFilter;
use crate::error::{Error, PipelineError, Result};
use crate::ports::{
    CreationStatus, IdentityTransformer, MetadataSink, MetadataTransformer, SnapshotReader,
};

/// Kind of a global template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Legacy,
    Component,
    Index,
}

/// Result of migrating global and index metadata.
#[derive(Debug, Default)]
pub struct MetadataReport {
    /// Templates in the order they were written.
    pub templates: Vec<(TemplateKind, String, CreationStatus)>,
    /// One entry per selected index, in listed order.
    pub indices: Vec<(String, std::result::Result<CreationStatus, PipelineError>)>,
}

impl MetadataReport {
    pub fn created_indices(&self) -> Vec<&str> {
        self.indices
            .iter()
            .filter(|(_, r)| matches!(r, Ok(CreationStatus::Created)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn failed_indices(&self) -> Vec<&str> {
        self.indices
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.indices.iter().all(|(_, r)| r.is_ok())
    }
}

/// Writes global metadata, then each index's metadata.
pub struct MetadataMigrator {
    reader: Arc<dyn SnapshotReader>,
    sink: Arc<dyn MetadataSink>,
    transformer: Arc<dyn MetadataTransformer>,
    filter: IndexFilter,
}

impl MetadataMigrator {
    pub fn new(reader: Arc<dyn SnapshotReader>, sink: Arc<dyn MetadataSink>) -> Self {
        Self {
            reader,
            sink,
            transformer: Arc::new(IdentityTransformer),
            filter: IndexFilter::default(),
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn MetadataTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_filter(mut self, filter: IndexFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Migrate everything.
    ///
    /// A global metadata failure aborts before any index is touched. Index
    /// failures are reported in the [`MetadataReport`] and do not stop the
    /// remaining indices.
    pub async fn migrate(&self) -> std::result::Result<MetadataReport, PipelineError> {
        let mut report = MetadataReport::default();
        let indices = self
            .migrate_global(&mut report)
            .await
            .map_err(|source| PipelineError::GlobalMetadata { source })?;

        for index in self.filter.apply(indices) {
            let result = self
                .migrate_index(&index)
                .await
                .map_err(|source| PipelineError::index(index.clone(), source));
            if let Err(e) = &result {
                error!(index = %index, error = %e.inner(), "index metadata migration failed");
            }
            report.indices.push((index, result));
        }

        info!(
            templates = report.templates.len(),
            indices = report.indices.len(),
            failed = report.failed_indices().len(),
            "metadata migration finished"
        );
        Ok(report)
    }

    /// Write templates and return the indices to migrate.
    async fn migrate_global(&self, report: &mut MetadataReport) -> Result<Vec<String>> {
        let global = self.reader.read_global_metadata().await?;
        let global = self.transformer.transform_global(global)?;

        for (name, body) in &global.legacy_templates {
            let status = self.put_template(TemplateKind::Legacy, name, body).await?;
            report.templates.push((TemplateKind::Legacy, name.clone(), status));
        }
        for (name, body) in &global.component_templates {
            let status = self.put_template(TemplateKind::Component, name, body).await?;
            report.templates.push((TemplateKind::Component, name.clone(), status));
        }
        for (name, body) in &global.index_templates {
            let status = self.put_template(TemplateKind::Index, name, body).await?;
            report.templates.push((TemplateKind::Index, name.clone(), status));
        }

        if global.indices.is_empty() {
            self.reader.list_indices().await
        } else {
            Ok(global.indices)
        }
    }

    async fn put_template(
        &self,
        kind: TemplateKind,
        name: &str,
        body: &Value,
    ) -> Result<CreationStatus> {
        match kind {
            TemplateKind::Legacy => self.sink.create_legacy_template(name, body).await,
            TemplateKind::Component => self.sink.create_component_template(name, body).await,
            TemplateKind::Index => self.sink.create_index_template(name, body).await,
        }
    }

    async fn migrate_index(&self, index: &str) -> Result<CreationStatus> {
        let metadata = self.reader.read_index_metadata(index).await?;
        let metadata: IndexMetadataSnapshot = self.transformer.transform_index(metadata)?;
        if metadata.number_of_shards == 0 {
            return Err(Error::Source(format!(
                "index '{}' reports zero shards",
                index
            )));
        }
        let status = self.sink.create_index(&metadata).await?;
        info!(index = %index, target = %metadata.name, ?status, "index metadata migrated");
        Ok(status)
    }
}
