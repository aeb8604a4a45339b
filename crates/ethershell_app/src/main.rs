mod commands;

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use ethershell_chain::{HttpConnector, Shell};
use ethershell_core::{ShellHome, logging};

use commands::Output;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PROMPT: &str = "EtherShell> ";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let home = ShellHome::from_env();
    home.ensure_dirs()?;
    let _log_guard = logging::init_logging(&home)?;
    info!("EtherShell v{VERSION} starting in {}", home.base_dir().display());

    let mut shell = Shell::open(&home, Arc::new(HttpConnector))?;
    println!("EtherShell v{VERSION}. Type `help` for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{PROMPT}");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e.user_message());
                continue;
            }
        };

        match commands::execute(&mut shell, command).await {
            Ok(Output::Exit) => break,
            Ok(output) => render(&output),
            Err(e) => {
                error!("command `{}` failed: {e}", line.trim());
                println!("{}", e.user_message());
            }
        }
    }

    if let Err(e) = shell.flush() {
        warn!("Failed to save accounts on exit: {e}");
    }
    info!("EtherShell exiting");
    Ok(())
}

fn render(output: &Output) {
    match output {
        Output::Value(value) => println!("{}", pretty(value)),
        Output::Warned { warning, value } => {
            println!("{}", pretty(value));
            println!("{warning}");
        }
        Output::Message(message) => println!("{message}"),
        Output::Exit => {}
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
