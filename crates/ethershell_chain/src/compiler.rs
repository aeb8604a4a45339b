//! The `solc` command-line compiler as the [`Compiler`] collaborator.
//!
//! Sources are compiled with `--combined-json abi,bin,metadata` and the
//! output is split into the build layout [`ArtifactIndex::scan_build_dir`]
//! reads: `abis/<Name>.abi.json`, `bytecode/<Name>.bin`,
//! `metadata/<Name>.metadata.json`.
//!
//! [`ArtifactIndex::scan_build_dir`]: crate::artifacts::ArtifactIndex::scan_build_dir

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ethershell_core::CompilerConfig;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactPaths, CompiledArtifact, Compiler};
use crate::error::{ChainError, Result};

const SOLC_ENV: &str = "ETHERSHELL_SOLC";

pub struct SolcCompiler {
    solc_path: String,
}

impl SolcCompiler {
    pub fn new(solc_path: impl Into<String>) -> Self {
        Self {
            solc_path: solc_path.into(),
        }
    }

    /// `$ETHERSHELL_SOLC`, or `solc` from the PATH.
    pub fn from_env() -> Self {
        match std::env::var(SOLC_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::new(path),
            _ => Self::new("solc"),
        }
    }

    async fn run_solc(&self, args: &[String]) -> Result<String> {
        let output = tokio::process::Command::new(&self.solc_path)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                ChainError::Validation(format!("failed to execute {}: {e}", self.solc_path))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChainError::Validation(format!(
                "solc failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Compiler for SolcCompiler {
    async fn compile(
        &self,
        source: &Path,
        build_dir: &Path,
        names: &[String],
        config: &CompilerConfig,
    ) -> Result<Vec<CompiledArtifact>> {
        let sources = collect_sources(source)?;
        let args = solc_arguments(&sources, config);
        debug!(solc = %self.solc_path, ?args, "compiling");
        let output = self.run_solc(&args).await?;
        let artifacts = write_artifacts(&output, build_dir, names)?;
        info!(
            source = %source.display(),
            build_dir = %build_dir.display(),
            count = artifacts.len(),
            "contracts compiled"
        );
        Ok(artifacts)
    }
}

/// `source` itself when it is a file, otherwise every `.sol` file below it.
fn collect_sources(source: &Path) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    if !source.is_dir() {
        return Err(ChainError::Validation(format!(
            "{} is not a file or directory",
            source.display()
        )));
    }

    let mut found = Vec::new();
    let mut pending = vec![source.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "sol") {
                found.push(path);
            }
        }
    }
    if found.is_empty() {
        return Err(ChainError::Validation(format!(
            "no .sol files under {}",
            source.display()
        )));
    }
    found.sort();
    Ok(found)
}

fn solc_arguments(sources: &[PathBuf], config: &CompilerConfig) -> Vec<String> {
    let mut args = vec!["--combined-json".to_string(), "abi,bin,metadata".to_string()];
    if config.optimizer {
        args.push("--optimize".into());
        args.push("--optimize-runs".into());
        args.push(config.optimizer_runs.to_string());
    }
    if config.via_ir {
        args.push("--via-ir".into());
    }
    args.extend(sources.iter().map(|p| p.display().to_string()));
    args
}

/// Split `solc --combined-json` output into artifact files. With `names`
/// empty every contract with bytecode is written; otherwise each name must
/// be present.
pub(crate) fn write_artifacts(
    output: &str,
    build_dir: &Path,
    names: &[String],
) -> Result<Vec<CompiledArtifact>> {
    let document: Value = serde_json::from_str(output)?;
    if let Some(version) = document.get("version").and_then(Value::as_str) {
        debug!(version, "solc output");
    }
    let contracts = document
        .get("contracts")
        .and_then(Value::as_object)
        .ok_or_else(|| ChainError::Validation("solc output has no contracts".into()))?;

    for name in names {
        let known = contracts
            .keys()
            .any(|key| contract_name(key) == name.as_str());
        if !known {
            return Err(ChainError::Validation(format!(
                "contract `{name}` is not in the compiled sources"
            )));
        }
    }

    for dir in ["abis", "bytecode", "metadata"] {
        fs::create_dir_all(build_dir.join(dir))?;
    }

    let mut artifacts = Vec::new();
    for (key, contract) in contracts {
        let name = contract_name(key);
        if !names.is_empty() && !names.iter().any(|n| n == name) {
            continue;
        }
        let bytecode = contract.get("bin").and_then(Value::as_str).unwrap_or_default();
        if bytecode.is_empty() {
            debug!(name, "no bytecode (interface or abstract contract)");
            continue;
        }
        if artifacts.iter().any(|a: &CompiledArtifact| a.name == name) {
            warn!(name, source = key.as_str(), "duplicate contract name, keeping the first");
            continue;
        }

        // Older solc releases embed the ABI as a JSON string.
        let abi = match contract.get("abi") {
            Some(Value::String(text)) => serde_json::from_str(text)?,
            Some(other) => other.clone(),
            None => Value::Array(Vec::new()),
        };
        let paths = ArtifactPaths {
            abi: build_dir.join("abis").join(format!("{name}.abi.json")),
            bytecode: build_dir.join("bytecode").join(format!("{name}.bin")),
            metadata: contract
                .get("metadata")
                .and_then(Value::as_str)
                .map(|_| build_dir.join("metadata").join(format!("{name}.metadata.json"))),
        };
        fs::write(&paths.abi, serde_json::to_string_pretty(&abi)?)?;
        fs::write(&paths.bytecode, bytecode)?;
        if let (Some(path), Some(metadata)) = (
            &paths.metadata,
            contract.get("metadata").and_then(Value::as_str),
        ) {
            fs::write(path, metadata)?;
        }

        artifacts.push(CompiledArtifact {
            name: name.to_string(),
            paths,
        });
    }
    Ok(artifacts)
}

/// `contracts/Token.sol:Token` → `Token`.
fn contract_name(key: &str) -> &str {
    key.rsplit(':').next().unwrap_or(key)
}
