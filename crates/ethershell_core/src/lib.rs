pub mod config;
pub mod logging;

pub use config::{
    CompilerConfig, DEFAULT_PROVIDER_URL, NetworkSettings, ShellHome, read_json, validate_url,
    write_json,
};
