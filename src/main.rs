use anyhow::Result;
use clap::{Parser, Subcommand};
use moreright_assistant::config::{parse_flag, Config};
use moreright_assistant::transport::cli::{self, ChatOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "moreright")]
#[command(
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), env!("MORERIGHT_VERSION_SUFFIX")),
    about = "MoreRight - AI assistant for the moreright forum",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the forum assistant (default)
    Chat(ChatArgs),

    /// Interactive .env setup for API keys and wallet
    Setup,

    /// Wallet utilities
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
}

#[derive(clap::Args, Default)]
struct ChatArgs {
    /// LLM provider to use (claude, openai)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use (e.g., claude-3-5-sonnet-20241022, gpt-4-turbo)
    #[arg(short, long)]
    model: Option<String>,

    /// MCP server SSE endpoint
    #[arg(long)]
    server_url: Option<String>,

    /// Print every tool result
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a new wallet
    New {
        /// Store the private key in .env
        #[arg(long)]
        save: bool,
    },

    /// Show the address of WALLET_PRIVATE_KEY
    Address,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Missing .env is fine
    dotenvy::dotenv().ok();

    // Initialize logging
    let debug_env = std::env::var("DEBUG").is_ok_and(|v| parse_flag(&v));
    let filter = if cli.verbose || debug_env {
        "moreright_assistant=debug,moreright=debug"
    } else {
        "moreright_assistant=warn,moreright=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command.unwrap_or(Commands::Chat(ChatArgs::default())) {
        Commands::Chat(args) => {
            let config = Config::load_with_env()?;
            cli::run_chat(
                config,
                ChatOptions {
                    provider: args.provider,
                    model: args.model,
                    server_url: args.server_url,
                    debug: args.debug,
                },
            )
            .await?;
        }
        Commands::Setup => {
            cli::run_setup().await?;
        }
        Commands::Wallet { command } => match command {
            WalletCommands::New { save } => cli::run_wallet_new(save).await?,
            WalletCommands::Address => cli::run_wallet_address().await?,
        },
    }

    Ok(())
}
