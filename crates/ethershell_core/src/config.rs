use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

/// JSON-RPC endpoint used when nothing else has been configured.
pub const DEFAULT_PROVIDER_URL: &str = "http://127.0.0.1:8545";

const HOME_ENV: &str = "ETHERSHELL_HOME";
const DEFAULT_HOME_DIR: &str = "./ethershell";

// ---------------------------------------------------------------------------
// ShellHome
// ---------------------------------------------------------------------------

/// Location of every file the shell persists.
///
/// The layout under the base directory is:
///
/// ```text
/// <base>/config.json     provider endpoint, default wallet, compiler settings
/// <base>/wallets.json    the account registry
/// <base>/artifacts.json  contract name -> compiler artifact paths
/// <base>/logs/           rolling log files
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellHome {
    base: PathBuf,
}

impl ShellHome {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `$ETHERSHELL_HOME` if set, otherwise `./ethershell` relative to the
    /// working directory (state is project-local, like a build folder).
    pub fn from_env() -> Self {
        match std::env::var(HOME_ENV) {
            Ok(dir) if !dir.trim().is_empty() => Self::new(dir),
            _ => Self::new(DEFAULT_HOME_DIR),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn wallets_path(&self) -> PathBuf {
        self.base.join("wallets.json")
    }

    pub fn artifacts_path(&self) -> PathBuf {
        self.base.join("artifacts.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    /// Ensures all required directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.base.clone(), self.logs_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

impl Default for ShellHome {
    fn default() -> Self {
        Self::new(DEFAULT_HOME_DIR)
    }
}

// ---------------------------------------------------------------------------
// Settings sections
// ---------------------------------------------------------------------------

/// Compiler section of `config.json`, passed to the compiler on every build.
/// `version` is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    pub version: String,
    pub optimizer: bool,
    pub optimizer_runs: u32,
    #[serde(rename = "viaIR")]
    pub via_ir: bool,
    pub compile_path: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            optimizer: false,
            optimizer_runs: 200,
            via_ir: false,
            compile_path: "./build".into(),
        }
    }
}

/// Timeouts applied to every network round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkSettings {
    pub request_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl NetworkSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON file helpers
// ---------------------------------------------------------------------------

/// Read a JSON document. Returns `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Write a JSON document in full, pretty-printed. With `owner_only` the file
/// is restricted to the current user on Unix (0o600 = rw-------).
pub fn write_json<T: Serialize>(path: &Path, value: &T, owner_only: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if owner_only {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }
    }
    #[cfg(not(unix))]
    let _ = owner_only;

    info!(path = %path.display(), "document written");
    Ok(())
}

/// Validate that a URL is well-formed and uses HTTP or HTTPS.
pub fn validate_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            (scheme == "http" || scheme == "https") && parsed.host().is_some()
        }
        Err(_) => false,
    }
}
