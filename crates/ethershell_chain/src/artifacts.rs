//! Compiler artifacts: where each contract's ABI and bytecode live, and how
//! to read them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use async_trait::async_trait;
use ethershell_core::{CompilerConfig, read_json, write_json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::abi::parse_abi;
use crate::error::{ChainError, Result};

const ABI_SUFFIX: &str = ".abi.json";

/// Artifact file locations for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPaths {
    pub abi: PathBuf,
    pub bytecode: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PathBuf>,
}

/// Output of one compiled contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub name: String,
    pub paths: ArtifactPaths,
}

/// The compiler collaborator. Implementations write artifact files under
/// `build_dir` and report where they put them.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        source: &Path,
        build_dir: &Path,
        names: &[String],
        config: &CompilerConfig,
    ) -> Result<Vec<CompiledArtifact>>;
}

/// `artifacts.json`: contract name → artifact paths.
#[derive(Debug, Clone)]
pub struct ArtifactIndex {
    path: PathBuf,
    entries: BTreeMap<String, ArtifactPaths>,
}

impl ArtifactIndex {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, entries })
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactPaths> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn register(&mut self, name: &str, paths: ArtifactPaths) -> Result<()> {
        self.entries.insert(name.to_string(), paths);
        self.save()
    }

    pub fn record_compilation(&mut self, artifacts: Vec<CompiledArtifact>) -> Result<()> {
        for artifact in artifacts {
            debug!(name = %artifact.name, "artifact recorded");
            self.entries.insert(artifact.name, artifact.paths);
        }
        self.save()
    }

    /// Register every contract found under `build_dir`, laid out as
    /// `abis/<Name>.abi.json`, `bytecode/<Name>.bin` and optionally
    /// `metadata/<Name>.metadata.json`. Returns the registered names.
    pub fn scan_build_dir(&mut self, build_dir: &Path) -> Result<Vec<String>> {
        let abi_dir = build_dir.join("abis");
        if !abi_dir.is_dir() {
            return Err(ChainError::Validation(format!(
                "{} has no abis/ directory",
                build_dir.display()
            )));
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&abi_dir)? {
            let abi = entry?.path();
            let Some(name) = abi
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(ABI_SUFFIX))
            else {
                continue;
            };
            let bytecode = build_dir.join("bytecode").join(format!("{name}.bin"));
            if !bytecode.is_file() {
                debug!(name, "skipping contract without bytecode");
                continue;
            }
            let metadata = build_dir
                .join("metadata")
                .join(format!("{name}.metadata.json"));
            let paths = ArtifactPaths {
                abi: abi.clone(),
                bytecode,
                metadata: metadata.is_file().then_some(metadata),
            };
            self.entries.insert(name.to_string(), paths);
            found.push(name.to_string());
        }
        found.sort();
        self.save()?;
        info!(dir = %build_dir.display(), count = found.len(), "build directory scanned");
        Ok(found)
    }

    fn save(&self) -> Result<()> {
        write_json(&self.path, &self.entries, false)?;
        Ok(())
    }
}

pub fn load_abi(path: &Path) -> Result<JsonAbi> {
    let text = fs::read_to_string(path)?;
    parse_abi(&text)
}

/// Read deployable bytecode. The file may contain raw hex, a JSON string, or
/// a solc-style object with an `object` (or `bytecode`) field.
pub fn load_bytecode(path: &Path) -> Result<Bytes> {
    let text = fs::read_to_string(path)?;
    let text = text.trim();
    let hex_text = if text.starts_with('"') || text.starts_with('{') {
        let value: Value = serde_json::from_str(text)?;
        extract_hex(&value).ok_or_else(|| {
            ChainError::Validation(format!("{} holds no bytecode", path.display()))
        })?
    } else {
        text.to_string()
    };

    let digits = hex_text.strip_prefix("0x").unwrap_or(&hex_text);
    if digits.is_empty() {
        return Err(ChainError::Validation(format!(
            "{} holds empty bytecode",
            path.display()
        )));
    }
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| ChainError::Validation(format!("{} is not hex: {e}", path.display())))
}

fn extract_hex(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("object")
            .or_else(|| map.get("bytecode"))
            .and_then(extract_hex),
        _ => None,
    }
}
