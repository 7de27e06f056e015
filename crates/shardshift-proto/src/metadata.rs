//! Index and global metadata snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Metadata for one index as read from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadataSnapshot {
    pub name: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    #[serde(default)]
    pub mappings: Value,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub aliases: Value,
}

impl IndexMetadataSnapshot {
    pub fn new(name: impl Into<String>, number_of_shards: u32, number_of_replicas: u32) -> Self {
        Self {
            name: name.into(),
            number_of_shards,
            number_of_replicas,
            mappings: Value::Null,
            settings: Value::Null,
            aliases: Value::Null,
        }
    }

    pub fn with_mappings(mut self, mappings: Value) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_aliases(mut self, aliases: Value) -> Self {
        self.aliases = aliases;
        self
    }

    /// Body of the index-creation request for the target.
    ///
    /// Shard and replica counts are written under `settings.index` unless the
    /// settings already carry them.
    pub fn creation_body(&self) -> Value {
        let mut settings = match &self.settings {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let index = settings
            .entry("index")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(index) = index {
            index
                .entry("number_of_shards")
                .or_insert_with(|| json!(self.number_of_shards));
            index
                .entry("number_of_replicas")
                .or_insert_with(|| json!(self.number_of_replicas));
        }

        let mut body = Map::new();
        body.insert("settings".to_string(), Value::Object(settings));
        if !self.mappings.is_null() {
            body.insert("mappings".to_string(), self.mappings.clone());
        }
        if !self.aliases.is_null() {
            body.insert("aliases".to_string(), self.aliases.clone());
        }
        Value::Object(body)
    }
}

/// Cluster-wide template metadata plus the indices it applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetadataSnapshot {
    #[serde(default)]
    pub legacy_templates: BTreeMap<String, Value>,
    #[serde(default)]
    pub component_templates: BTreeMap<String, Value>,
    #[serde(default)]
    pub index_templates: BTreeMap<String, Value>,
    #[serde(default)]
    pub indices: Vec<String>,
}

impl GlobalMetadataSnapshot {
    /// Total number of templates across all collections.
    pub fn template_count(&self) -> usize {
        self.legacy_templates.len() + self.component_templates.len() + self.index_templates.len()
    }
}
