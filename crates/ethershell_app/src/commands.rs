//! Line commands understood by the shell: tokenizing, parsing into
//! [`Command`]s, and running them against a [`Shell`].

use std::path::PathBuf;

use ethershell_chain::{
    AccountSelector, AccountView, AttachRequest, ChainError, ContractLookup, DEFAULT_HD_COUNT,
    DeployRequest, Result, Shell, SolcCompiler,
};
use serde_json::{Value, json};

const DEFAULT_SOURCE_DIR: &str = "./contracts";
const DEFAULT_OPTIMIZER_RUNS: u32 = 200;

/// Name, usage and one-line description of a command, for `help`.
pub struct CommandInfo {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo { name: "addWallet", usage: "addWallet <key | [keys]>", description: "Import one or more private keys" },
    CommandInfo { name: "addHDWallet", usage: "addHDWallet \"<phrase>\" [count=10]", description: "Import accounts derived from a mnemonic" },
    CommandInfo { name: "newWallet", usage: "newWallet [count=1]", description: "Generate random accounts" },
    CommandInfo { name: "newHDWallet", usage: "newHDWallet [count=10]", description: "Generate a mnemonic and derive accounts" },
    CommandInfo { name: "removeWallet", usage: "removeWallet [index | address | [indices] | \"<phrase>\"]", description: "Remove accounts; no argument removes all" },
    CommandInfo { name: "connectWallet", usage: "connectWallet", description: "Register accounts held by the node" },
    CommandInfo { name: "wallets", usage: "wallets", description: "List imported, generated and node accounts" },
    CommandInfo { name: "allWallets", usage: "allWallets", description: "List every account" },
    CommandInfo { name: "hdWallets", usage: "hdWallets", description: "List mnemonic-derived accounts" },
    CommandInfo { name: "walletInfo", usage: "walletInfo <index | address | [indices] | \"<phrase>\">", description: "Fetch balance and nonce" },
    CommandInfo { name: "changeDefWallet", usage: "changeDefWallet <index | address | key>", description: "Change the default account" },
    CommandInfo { name: "defWallet", usage: "defWallet", description: "Show the default account" },
    CommandInfo { name: "configInfo", usage: "configInfo", description: "Show config.json" },
    CommandInfo { name: "chain", usage: "chain <url>", description: "Switch the JSON-RPC endpoint" },
    CommandInfo { name: "chainInfo", usage: "chainInfo", description: "Show the current network" },
    CommandInfo { name: "defaultChain", usage: "defaultChain", description: "Show the default endpoint" },
    CommandInfo { name: "build", usage: "build [source=./contracts] [[names]]", description: "Compile contracts with solc and register the artifacts" },
    CommandInfo { name: "compInfo", usage: "compInfo", description: "Show compiler options" },
    CommandInfo { name: "compOpts", usage: "compOpts <optimizer> <viaIR> [runs=200]", description: "Set compiler options" },
    CommandInfo { name: "loadBuild", usage: "loadBuild [dir]", description: "Register compiled artifacts from a build directory" },
    CommandInfo { name: "deploy", usage: "deploy <name> [[args]] [account] [rpcUrl] [abiPath] [bytecodePath]", description: "Deploy a contract" },
    CommandInfo { name: "addContract", usage: "addContract <name> <address> [account] [abiPath] [rpcUrl]", description: "Attach to a deployed contract" },
    CommandInfo { name: "contracts", usage: "contracts [index | address | name]", description: "List contracts with balances" },
    CommandInfo { name: "call", usage: "call <contract> <method> [args...] [{options}]", description: "Call a contract method" },
    CommandInfo { name: "help", usage: "help", description: "Show this list" },
    CommandInfo { name: "exit", usage: "exit", description: "Leave the shell" },
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddWallet(Vec<String>),
    AddHdWallet { phrase: String, count: u32 },
    NewWallet(u32),
    NewHdWallet(u32),
    RemoveWallet(AccountSelector),
    ConnectWallet,
    ListWallets(AccountView),
    WalletInfo(AccountSelector),
    ChangeDefWallet(AccountSelector),
    DefWallet,
    ConfigInfo,
    Chain(String),
    ChainInfo,
    DefaultChain,
    Build {
        source: PathBuf,
        names: Vec<String>,
    },
    CompInfo,
    CompOpts {
        optimizer: bool,
        via_ir: bool,
        runs: u32,
    },
    LoadBuild(Option<PathBuf>),
    Deploy(DeployArgs),
    AddContract(AttachArgs),
    Contracts(Option<ContractLookup>),
    Call {
        contract: ContractLookup,
        method: String,
        args: Vec<Value>,
    },
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployArgs {
    pub name: String,
    pub constructor_args: Vec<Value>,
    pub account: Option<AccountSelector>,
    pub rpc_url: Option<String>,
    pub abi_path: Option<PathBuf>,
    pub bytecode_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachArgs {
    pub name: String,
    pub address: String,
    pub account: Option<AccountSelector>,
    pub abi_path: Option<PathBuf>,
    pub rpc_url: Option<String>,
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Value(Value),
    /// A value printed together with the development-only warning.
    Warned { warning: &'static str, value: Value },
    Message(String),
    Exit,
}

// ---------------------------------------------------------------------------
// Tokenizing
// ---------------------------------------------------------------------------

/// Split a line on whitespace, keeping quoted strings and bracketed JSON
/// together.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '[' | '{' => {
                    depth += 1;
                    current.push(ch);
                }
                ']' | '}' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        ChainError::Validation(format!("unbalanced `{ch}` in input"))
                    })?;
                    current.push(ch);
                }
                c if c.is_whitespace() && depth == 0 => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(ChainError::Validation("unterminated quote or bracket".into()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// A token as JSON when it parses, otherwise as a string with any single
/// quotes removed. Integer literals wider than 64 bits become strings so no
/// digit is lost to `f64`.
pub fn token_value(token: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(&quote_wide_integers(token)) {
        return value;
    }
    let unquoted = token
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(token);
    Value::String(unquoted.to_string())
}

fn quote_wide_integers(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let mut out = String::with_capacity(token.len() + 2);
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }

        let after_word = i > 0 && (chars[i - 1].is_ascii_alphanumeric() || chars[i - 1] == '.');
        let starts_number = c.is_ascii_digit()
            || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit));
        if !starts_number || after_word {
            out.push(c);
            i += 1;
            continue;
        }

        let start = i;
        i += 1;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '+' | '-')) {
            i += 1;
        }
        let literal: String = chars[start..i].iter().collect();
        let digits = literal.strip_prefix('-').unwrap_or(&literal);
        let wide = digits.chars().all(|d| d.is_ascii_digit())
            && literal.parse::<i64>().is_err()
            && literal.parse::<u64>().is_err();
        if wide {
            out.push('"');
            out.push_str(&literal);
            out.push('"');
        } else {
            out.push_str(&literal);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let tokens = tokenize(line)?;
    let Some((name, rest)) = tokens.split_first() else {
        return Ok(None);
    };
    let args: Vec<Value> = rest.iter().map(|t| token_value(t)).collect();
    let arg = |i: usize| args.get(i).filter(|v| !v.is_null());

    let command = match name.as_str() {
        "addWallet" => Command::AddWallet(keys_arg(required(arg(0), "a private key")?)?),
        "addHDWallet" => Command::AddHdWallet {
            phrase: text(required(arg(0), "a mnemonic phrase")?),
            count: count_arg(arg(1), DEFAULT_HD_COUNT)?,
        },
        "newWallet" => Command::NewWallet(count_arg(arg(0), 1)?),
        "newHDWallet" => Command::NewHdWallet(count_arg(arg(0), DEFAULT_HD_COUNT)?),
        "removeWallet" => Command::RemoveWallet(match arg(0) {
            Some(value) => selector(value)?,
            None => AccountSelector::All,
        }),
        "connectWallet" => Command::ConnectWallet,
        "wallets" => Command::ListWallets(AccountView::Flat),
        "allWallets" => Command::ListWallets(AccountView::All),
        "hdWallets" => Command::ListWallets(AccountView::Hd),
        "walletInfo" => Command::WalletInfo(selector(required(arg(0), "an account")?)?),
        "changeDefWallet" => {
            Command::ChangeDefWallet(selector(required(arg(0), "an account")?)?)
        }
        "defWallet" => Command::DefWallet,
        "configInfo" => Command::ConfigInfo,
        "chain" => Command::Chain(text(required(arg(0), "an endpoint URL")?)),
        "chainInfo" => Command::ChainInfo,
        "defaultChain" => Command::DefaultChain,
        "build" => Command::Build {
            source: PathBuf::from(arg(0).map(text).unwrap_or_else(|| DEFAULT_SOURCE_DIR.into())),
            names: arg(1).map(keys_arg).transpose()?.unwrap_or_default(),
        },
        "compInfo" => Command::CompInfo,
        "compOpts" => Command::CompOpts {
            optimizer: flag_arg(required(arg(0), "the optimizer flag")?)?,
            via_ir: flag_arg(required(arg(1), "the viaIR flag")?)?,
            runs: count_arg(arg(2), DEFAULT_OPTIMIZER_RUNS)?,
        },
        "loadBuild" => Command::LoadBuild(arg(0).map(|v| PathBuf::from(text(v)))),
        "deploy" => Command::Deploy(DeployArgs {
            name: text(required(arg(0), "a contract name")?),
            constructor_args: match arg(1) {
                Some(Value::Array(items)) => items.clone(),
                Some(other) => vec![other.clone()],
                None => Vec::new(),
            },
            account: arg(2).map(selector).transpose()?,
            rpc_url: arg(3).map(text),
            abi_path: arg(4).map(|v| PathBuf::from(text(v))),
            bytecode_path: arg(5).map(|v| PathBuf::from(text(v))),
        }),
        "addContract" => Command::AddContract(AttachArgs {
            name: text(required(arg(0), "a contract name")?),
            address: arg(1).map(text).unwrap_or_default(),
            account: arg(2).map(selector).transpose()?,
            abi_path: arg(3).map(|v| PathBuf::from(text(v))),
            rpc_url: arg(4).map(text),
        }),
        "contracts" => Command::Contracts(arg(0).map(lookup).transpose()?),
        "call" => Command::Call {
            contract: lookup(required(arg(0), "a contract")?)?,
            method: text(required(arg(1), "a method name")?),
            args: args.iter().skip(2).cloned().collect(),
        },
        "help" | ".help" => Command::Help,
        "exit" | "quit" | ".exit" => Command::Exit,
        other => {
            return Err(ChainError::Validation(format!(
                "unknown command `{other}`; type `help` for a list"
            )));
        }
    };
    Ok(Some(command))
}

fn required<'a>(value: Option<&'a Value>, what: &str) -> Result<&'a Value> {
    value.ok_or_else(|| ChainError::Validation(format!("Empty input is NOT valid: expected {what}")))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn keys_arg(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => Ok(items.iter().map(text).collect()),
        other => Ok(vec![text(other)]),
    }
}

fn count_arg(value: Option<&Value>, default: u32) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ChainError::Validation(format!("`{v}` is not a valid count"))),
    }
}

fn flag_arg(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| ChainError::Validation(format!("`{value}` is not true or false")))
}

fn selector(value: &Value) -> Result<AccountSelector> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .map(AccountSelector::Index)
            .ok_or_else(|| ChainError::Validation(format!("`{n}` is not an account index"))),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| ChainError::Validation(format!("`{item}` is not an account index")))
            })
            .collect::<Result<Vec<_>>>()
            .map(AccountSelector::Indices),
        Value::String(s) => s.parse(),
        other => Err(ChainError::Validation(format!("`{other}` does not select an account"))),
    }
}

fn lookup(value: &Value) -> Result<ContractLookup> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .map(ContractLookup::Index)
            .ok_or_else(|| ChainError::Validation(format!("`{n}` is not a contract index"))),
        other => text(other).parse(),
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub async fn execute(shell: &mut Shell, command: Command) -> Result<Output> {
    let output = match command {
        Command::AddWallet(keys) => warned(shell.registry_mut().add_from_keys(&keys)?)?,
        Command::AddHdWallet { phrase, count } => {
            warned(shell.registry_mut().add_from_mnemonic(&phrase, count)?)?
        }
        Command::NewWallet(count) => warned(shell.registry_mut().create_random(count)?)?,
        Command::NewHdWallet(count) => warned(shell.registry_mut().create_random_hd(count)?)?,
        Command::RemoveWallet(selector) => {
            let removed = shell.registry_mut().remove(&selector)?;
            Output::Message(format!("{} account(s) removed", removed.len()))
        }
        Command::ConnectWallet => warned(shell.connect_node_accounts().await?)?,
        Command::ListWallets(view) => {
            let listing = shell.registry().list(view);
            Output::Warned {
                warning: listing.warning,
                value: to_json(&listing.accounts)?,
            }
        }
        Command::WalletInfo(selector) => Output::Value(to_json(&shell.account_info(&selector).await?)?),
        Command::ChangeDefWallet(selector) => match shell.registry_mut().set_default(&selector)? {
            Some(record) => Output::Value(to_json(&record)?),
            None => Output::Message("no matching account; default unchanged".into()),
        },
        Command::DefWallet => match shell.registry().default_account() {
            Some(record) => Output::Value(to_json(record)?),
            None => Output::Message("no default account".into()),
        },
        Command::ConfigInfo => Output::Value(to_json(&shell.config_info()?)?),
        Command::Chain(url) => Output::Value(to_json(&shell.set_provider(&url).await?)?),
        Command::ChainInfo => Output::Value(to_json(&shell.network_info().await?)?),
        Command::DefaultChain => Output::Value(json!(Shell::default_provider_url())),
        Command::Build { source, names } => {
            let compiled = shell.compile(&SolcCompiler::from_env(), &source, &names).await?;
            Output::Value(json!(compiled))
        }
        Command::CompInfo => Output::Value(to_json(shell.compiler_config())?),
        Command::CompOpts {
            optimizer,
            via_ir,
            runs,
        } => Output::Value(to_json(&shell.set_compiler_options(optimizer, via_ir, runs)?)?),
        Command::LoadBuild(dir) => {
            let names = shell.scan_build_dir(dir.as_deref())?;
            Output::Value(json!(names))
        }
        Command::Deploy(args) => {
            let summary = shell
                .deploy(DeployRequest {
                    name: args.name,
                    constructor_args: args.constructor_args,
                    account: args.account,
                    rpc_url: args.rpc_url,
                    abi_path: args.abi_path,
                    bytecode_path: args.bytecode_path,
                })
                .await?;
            Output::Value(to_json(&summary)?)
        }
        Command::AddContract(args) => {
            let summary = shell
                .attach(AttachRequest {
                    name: args.name,
                    address: args.address,
                    account: args.account,
                    abi_path: args.abi_path,
                    rpc_url: args.rpc_url,
                })
                .await?;
            Output::Value(to_json(&summary)?)
        }
        Command::Contracts(None) => Output::Value(to_json(&shell.contract_summaries().await?)?),
        Command::Contracts(Some(lookup)) => {
            let handle = shell.contracts().require(&lookup)?;
            let mut summary = handle.summary();
            summary.balance = Some(handle.balance().await?);
            Output::Value(to_json(&summary)?)
        }
        Command::Call {
            contract,
            method,
            args,
        } => Output::Value(shell.invoke(&contract, &method, args).await?.to_json()),
        Command::Help => Output::Message(help_text()),
        Command::Exit => Output::Exit,
    };
    Ok(output)
}

fn warned<T: serde::Serialize>(records: T) -> Result<Output> {
    Ok(Output::Warned {
        warning: ethershell_chain::UNSAFE_WARNING,
        value: to_json(&records)?,
    })
}

pub fn help_text() -> String {
    let width = COMMANDS.iter().map(|c| c.usage.len()).max().unwrap_or(0);
    COMMANDS
        .iter()
        .map(|c| format!("  {:<width$}  {}", c.usage, c.description))
        .collect::<Vec<_>>()
        .join("\n")
}
