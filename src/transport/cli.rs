//! CLI transport for direct terminal interaction

use crate::agent::{ConversationContext, OrchestratorConfig, ToolCallLog, ToolOrchestrator};
use crate::config::{env_file, Config};
use crate::llm;
use crate::mcp::{self, ToolBackend};
use crate::wallet::{self, AuthSession, SigningIdentity};
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

/// `.env` key holding the wallet private key
pub const WALLET_KEY_VAR: &str = "WALLET_PRIVATE_KEY";

/// Flags accepted by `moreright chat`
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub server_url: Option<String>,
    pub debug: bool,
}

/// Entry in the interactive wallet menu shown at chat startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletChoice {
    Create,
    Import,
    AddressOnly,
    Skip,
}

impl WalletChoice {
    /// Anything unrecognized skips wallet setup
    pub fn parse(input: &str) -> Self {
        match input.trim() {
            "1" => WalletChoice::Create,
            "2" => WalletChoice::Import,
            "3" => WalletChoice::AddressOnly,
            _ => WalletChoice::Skip,
        }
    }
}

/// `y` or `yes`, any case
pub fn is_affirmative(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Run interactive chat mode
pub async fn run_chat(mut config: Config, options: ChatOptions) -> Result<()> {
    if let Some(url) = options.server_url {
        config.mcp.server_url = url;
    }
    let debug = options.debug || config.agent.debug;

    let provider = llm::create_provider(
        &config.llm,
        options.provider.as_deref(),
        options.model.as_deref(),
    )?;

    println!("{}", "MoreRight Forum Assistant".bold().cyan());
    println!("Connecting to {}...", config.mcp.server_url);

    let client = mcp::connect(&config.mcp)
        .await
        .context("Failed to connect to the forum tool server")?;
    let info = client.server_info();
    tracing::info!(server = %info.name, version = %info.version, "Connected to tool server");
    let backend: Arc<dyn ToolBackend> = Arc::new(client);

    let auth = establish_session(backend.as_ref()).await?;

    let orchestrator = ToolOrchestrator::new(provider.clone(), backend)
        .with_config(OrchestratorConfig::from(&config.agent));
    let mut context =
        ConversationContext::new().with_max_messages(config.agent.max_history_turns);

    println!(
        "Using {} ({})",
        provider.name().green(),
        provider.model()
    );
    println!("Type 'exit' or 'quit' to exit, 'clear' to clear history");
    println!("\n{} Hi! How can I help with the moreright forum?", "Assistant:".bold());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("\n{} ", "You:".bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            // EOF
            println!();
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" => {
                println!("\n{} Goodbye!", "Assistant:".bold());
                break;
            }
            "clear" => {
                context.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let echo = |entry: &ToolCallLog| {
            if !debug {
                return;
            }
            let label = format!("[Tool {}]", entry.tool);
            if entry.is_error {
                println!("\n{} -> {}", label.red(), entry.result_preview);
            } else {
                println!("\n{} -> {}", label.dimmed(), entry.result_preview);
            }
        };

        match orchestrator
            .run_turn_with(&mut context, &auth, input, echo)
            .await
        {
            Ok(response) => {
                if !response.text.trim().is_empty() {
                    println!("\n{} {}", "Assistant:".bold(), response.text);
                }
                if response.hit_round_limit {
                    println!(
                        "{}",
                        format!("(Stopped after {} tool rounds)", response.rounds).yellow()
                    );
                } else if debug && response.tool_calls_made > 0 {
                    println!("(Used {} tool calls)", response.tool_calls_made);
                }
            }
            Err(e) => {
                eprintln!("\n{} {:#}", "Error communicating with the LLM:".red(), e);
            }
        }
    }

    Ok(())
}

/// Build the session's wallet state
///
/// A configured `WALLET_PRIVATE_KEY` is verified automatically; otherwise the
/// user picks from the wallet menu.
async fn establish_session(backend: &dyn ToolBackend) -> Result<AuthSession> {
    let configured = std::env::var(WALLET_KEY_VAR)
        .ok()
        .filter(|key| !key.trim().is_empty());

    let Some(private_key) = configured else {
        return wallet_menu(backend).await;
    };

    let identity = match SigningIdentity::from_hex(&private_key) {
        Ok(identity) => identity,
        Err(e) => {
            eprintln!("{} {}", "Invalid WALLET_PRIVATE_KEY:".red(), e);
            println!("Continuing without wallet authentication.");
            return Ok(AuthSession::anonymous());
        }
    };

    println!("\nUsing saved wallet: {}", identity.address().green());
    println!("Verifying wallet...");
    let session = AuthSession::establish(backend, identity).await;
    if session.is_verified() {
        println!("{}", "Wallet verified successfully!".green());
    } else {
        println!("{}", "Wallet verification failed. Check your private key.".yellow());
        println!("Continuing without wallet authentication.");
    }
    Ok(session)
}

async fn wallet_menu(backend: &dyn ToolBackend) -> Result<AuthSession> {
    println!("\n{}", "Wallet setup".bold());
    println!("Choose one:");
    println!("  1. Create new wallet (ephemeral)");
    println!("  2. Import private key");
    println!("  3. Enter wallet address only (read-only)");
    println!("  4. Skip");

    let choice = WalletChoice::parse(&prompt("\nYour choice: ")?);

    let identity = match choice {
        WalletChoice::Create => {
            let identity = SigningIdentity::generate();
            println!("\nCreated wallet: {}", identity.address().green());
            identity
        }
        WalletChoice::Import => {
            let key = prompt("Paste private key (hex): ")?;
            match SigningIdentity::from_hex(&key) {
                Ok(identity) => {
                    println!("\nLoaded wallet: {}", identity.address().green());
                    identity
                }
                Err(e) => {
                    eprintln!("{} {}", "Could not load wallet:".red(), e);
                    return Ok(AuthSession::anonymous());
                }
            }
        }
        WalletChoice::AddressOnly => {
            let address = prompt("Enter wallet address (0x...): ")?;
            return match wallet::parse_address(&address) {
                Ok(address) => {
                    println!("\nUsing read-only wallet: {}", address);
                    Ok(AuthSession::address_only(address))
                }
                Err(e) => {
                    eprintln!("{} {}", "Ignoring address:".red(), e);
                    Ok(AuthSession::anonymous())
                }
            };
        }
        WalletChoice::Skip => {
            println!("\nSkipping wallet setup.");
            return Ok(AuthSession::anonymous());
        }
    };

    let session = AuthSession::establish(backend, identity.clone()).await;
    if !session.is_verified() {
        println!(
            "{}",
            "Wallet verification failed. You can restart and try again.".yellow()
        );
        return Ok(session);
    }

    println!("{}", "Wallet verified successfully!".green());
    if is_affirmative(&prompt("\nSave this wallet to .env file for future use? (y/n): ")?) {
        save_wallet(&env_file::default_path(), &identity);
    }
    Ok(session)
}

/// Persist the key, printing it instead if the write fails
fn save_wallet(path: &Path, identity: &SigningIdentity) {
    match env_file::upsert(path, WALLET_KEY_VAR, &identity.private_key_hex()) {
        Ok(()) => {
            println!("{}", "Wallet saved to .env file.".green());
            println!("Address: {}", identity.address());
            println!("Next time, it will be loaded automatically.");
        }
        Err(e) => {
            eprintln!("{} {:#}", "Failed to save wallet:".red(), e);
            println!("Please note your private key: {}", identity.private_key_hex());
        }
    }
}

/// Interactive `.env` setup
///
/// Keys already present in the file are left alone.
pub async fn run_setup() -> Result<()> {
    let path = env_file::default_path();
    let existing = env_file::read(&path)?;
    let has = |key: &str| existing.get(key).is_some_and(|v| !v.trim().is_empty());

    println!("{}", "=== MoreRight Setup ===".bold().cyan());

    for (key, label, url) in [
        ("ANTHROPIC_API_KEY", "Anthropic API Key", "https://console.anthropic.com"),
        ("OPENAI_API_KEY", "OpenAI API Key", "https://platform.openai.com"),
    ] {
        if has(key) {
            println!("{} {}", "✓".green(), format!("{} already set", label));
            continue;
        }
        println!("\n{}", label.bold());
        println!("  1. Get your key from {}", url);
        println!("  2. Paste it below (or press Enter to skip)");
        let value = prompt("API Key: ")?;
        if !value.is_empty() {
            env_file::upsert(&path, key, &value)?;
        }
    }

    if has(WALLET_KEY_VAR) {
        println!("{} Wallet already set", "✓".green());
    } else {
        println!("\n{}", "Wallet Setup".bold());
        println!("  1. Create new wallet");
        println!("  2. Import existing private key");
        println!("  3. Skip wallet setup");

        match prompt("\nYour choice (1-3): ")?.as_str() {
            "1" => {
                let identity = SigningIdentity::generate();
                env_file::upsert(&path, WALLET_KEY_VAR, &identity.private_key_hex())?;
                println!("\nCreated new wallet: {}", identity.address().green());
            }
            "2" => {
                let key = prompt("\nPaste your private key (hex): ")?;
                let identity =
                    SigningIdentity::from_hex(&key).context("Invalid private key")?;
                env_file::upsert(&path, WALLET_KEY_VAR, &identity.private_key_hex())?;
                println!("\nImported wallet: {}", identity.address().green());
            }
            _ => println!("\nSkipping wallet setup. You can add it later in the .env file."),
        }
    }

    println!("\n{}", "Environment setup complete!".green());
    println!("Configuration saved to {}", path.display());
    Ok(())
}

/// Create a wallet and print its address
pub async fn run_wallet_new(save: bool) -> Result<()> {
    let identity = SigningIdentity::generate();
    println!("Address:     {}", identity.address().green());

    if save {
        let path = env_file::default_path();
        env_file::upsert(&path, WALLET_KEY_VAR, &identity.private_key_hex())?;
        println!("Private key saved to {}", path.display());
    } else {
        println!("Private key: {}", identity.private_key_hex());
        println!("{}", "Keep this key secret. Use --save to store it in .env.".yellow());
    }
    Ok(())
}

/// Print the address of the configured wallet
pub async fn run_wallet_address() -> Result<()> {
    let key = std::env::var(WALLET_KEY_VAR)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .context("WALLET_PRIVATE_KEY is not set (run `moreright wallet new --save`)")?;
    let identity = SigningIdentity::from_hex(&key)?;
    println!("{}", identity.address());
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_choice_parse() {
        assert_eq!(WalletChoice::parse("1"), WalletChoice::Create);
        assert_eq!(WalletChoice::parse(" 2 "), WalletChoice::Import);
        assert_eq!(WalletChoice::parse("3"), WalletChoice::AddressOnly);
        assert_eq!(WalletChoice::parse("4"), WalletChoice::Skip);
        assert_eq!(WalletChoice::parse("banana"), WalletChoice::Skip);
    }

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_save_wallet_writes_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let identity = SigningIdentity::generate();

        save_wallet(&path, &identity);

        let vars = env_file::read(&path).unwrap();
        assert_eq!(vars.get(WALLET_KEY_VAR), Some(&identity.private_key_hex()));
    }
}
