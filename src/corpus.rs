//! Command corpus index: the versioned catalog of CLI commands, each paired
//! with its embedding vector.
//!
//! Built once at startup and read-only afterwards. A corpus refresh (new CLI
//! release) builds a whole new index and publishes it through [`SharedIndex`]
//! so concurrent readers never observe a partially built catalog.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use crate::embedder::Embedder;
use crate::error::{McpError, Result};

/// The command catalog compiled into the binary.
pub const BUILTIN_TABLE: &str = include_str!("../data/command_table.json");

/// Declared access level of an operation, from the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub fn is_mutating(self) -> bool {
        matches!(self, AccessLevel::Write)
    }
}

/// Value shape of a CLI parameter, from the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    List,
    Structure,
    Timestamp,
}

/// One named parameter of a CLI operation.
///
/// Names are stored in the API's PascalCase form; the CLI flag is derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
}

impl ParamSpec {
    /// The kebab-case flag the CLI expects, e.g. `InstanceIds` -> `--instance-ids`.
    pub fn cli_flag(&self) -> String {
        format!("--{}", self.name.to_case(Case::Kebab))
    }
}

/// Structured representation of one CLI operation. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub service: String,
    pub operation: String,
    pub description: String,
    pub access: AccessLevel,
    pub parameters: Vec<ParamSpec>,
}

impl CommandSpec {
    /// The invocable command template, e.g. `aws ec2 describe-instances`.
    pub fn cli_template(&self) -> String {
        format!("aws {} {}", self.service, self.operation)
    }

    pub fn required_parameters(&self) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.cli_flag())
            .collect()
    }

    pub fn find_parameter(&self, cli_flag: &str) -> Option<&ParamSpec> {
        let name = cli_flag.trim_start_matches("--");
        self.parameters
            .iter()
            .find(|p| p.name.to_case(Case::Kebab) == name)
    }

    /// Text fed to the embedder for this command. Hyphens are split so the
    /// operation and parameter words land in the same buckets as query words.
    pub fn embedding_text(&self) -> String {
        let mut text = format!(
            "{} {} {}",
            self.service,
            self.operation.replace('-', " "),
            self.description
        );
        for param in &self.parameters {
            text.push(' ');
            text.push_str(&param.name.to_case(Case::Kebab).replace('-', " "));
        }
        text
    }
}

/// On-disk shape of the command table.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandTable {
    pub version: String,
    pub commands: Vec<CommandSpec>,
}

/// A command spec paired with its embedding.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub spec: CommandSpec,
    pub embedding: Vec<f32>,
}

/// The complete catalog, embedded and keyed for O(1) lookup.
#[derive(Debug)]
pub struct CorpusIndex {
    version: String,
    entries: Vec<CorpusEntry>,
    by_key: HashMap<(String, String), usize>,
}

impl CorpusIndex {
    /// Builds an index from command-table JSON, embedding every entry.
    pub fn build(table_json: &str, embedder: &Embedder) -> Result<Self> {
        let table: CommandTable = serde_json::from_str(table_json)
            .map_err(|e| McpError::CorpusBuild(format!("malformed command table: {e}")))?;
        if table.commands.is_empty() {
            return Err(McpError::CorpusBuild("command table is empty".to_string()));
        }

        let mut entries = Vec::with_capacity(table.commands.len());
        let mut by_key = HashMap::with_capacity(table.commands.len());
        for spec in table.commands {
            if spec.service.is_empty() || spec.operation.is_empty() {
                return Err(McpError::CorpusBuild(
                    "command table entry with empty service or operation".to_string(),
                ));
            }
            let key = (spec.service.clone(), spec.operation.clone());
            if by_key.contains_key(&key) {
                return Err(McpError::CorpusBuild(format!(
                    "duplicate command table entry '{} {}'",
                    key.0, key.1
                )));
            }
            let embedding = embedder
                .embed(&spec.embedding_text())
                .map_err(|e| McpError::CorpusBuild(format!("embedding '{} {}': {e}", key.0, key.1)))?;
            by_key.insert(key, entries.len());
            entries.push(CorpusEntry { spec, embedding });
        }

        Ok(Self {
            version: table.version,
            entries,
            by_key,
        })
    }

    /// Builds the index from the compiled-in command table.
    pub fn build_builtin(embedder: &Embedder) -> Result<Self> {
        Self::build(BUILTIN_TABLE, embedder)
    }

    #[cfg(test)]
    pub(crate) fn empty_for_tests() -> Self {
        Self {
            version: "test".to_string(),
            entries: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn lookup(&self, service: &str, operation: &str) -> Option<&CommandSpec> {
        self.by_key
            .get(&(service.to_string(), operation.to_string()))
            .map(|&i| &self.entries[i].spec)
    }

    /// All entries, in table (insertion) order.
    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle publishing the current index to concurrent readers.
///
/// `replace` swaps a fully built index in one atomic store; in-place mutation
/// of a published index is not possible.
#[derive(Debug)]
pub struct SharedIndex {
    inner: RwLock<Arc<CorpusIndex>>,
}

impl SharedIndex {
    pub fn new(index: CorpusIndex) -> Self {
        Self {
            inner: RwLock::new(Arc::new(index)),
        }
    }

    pub fn load(&self) -> Arc<CorpusIndex> {
        self.inner.read().expect("corpus lock poisoned").clone()
    }

    pub fn replace(&self, index: CorpusIndex) {
        *self.inner.write().expect("corpus lock poisoned") = Arc::new(index);
    }
}
