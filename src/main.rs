use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use rewardledger::core::intake::RawRewardRequest;
use rewardledger::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Record a stock reward for a user
    Reward {
        /// User receiving the units
        #[arg(long)]
        user: String,
        /// Stock symbol, e.g. TCS.NS
        #[arg(long)]
        symbol: String,
        /// Number of units, fractional allowed
        #[arg(long)]
        quantity: String,
        /// When the reward was granted (RFC 3339 or local date/time)
        #[arg(long)]
        at: String,
        /// Origin of the reward
        #[arg(long)]
        source: Option<String>,
        /// Idempotency key; replays with the same key are not recorded twice
        #[arg(long)]
        key: Option<String>,
    },
    /// Show current holdings and their value
    Portfolio { user: String },
    /// Show rewards granted today
    Today { user: String },
    /// Show per-day value of past rewards
    History { user: String },
    /// Show today's units per symbol and the portfolio value
    Stats { user: String },
    /// Show the ledger entries of one reward
    Ledger { reward_id: String },
    /// Fetch fresh prices for every active stock once
    Refresh,
    /// Keep refreshing prices until interrupted
    Watch,
}

impl From<Commands> for rewardledger::AppCommand {
    fn from(cmd: Commands) -> rewardledger::AppCommand {
        use rewardledger::AppCommand;
        match cmd {
            Commands::Reward {
                user,
                symbol,
                quantity,
                at,
                source,
                key,
            } => AppCommand::Reward(RawRewardRequest {
                user_id: Some(user),
                stock_symbol: Some(symbol),
                quantity: Some(serde_json::Value::String(quantity)),
                rewarded_at: Some(at),
                source,
                idempotency_key: key,
            }),
            Commands::Portfolio { user } => AppCommand::Portfolio { user_id: user },
            Commands::Today { user } => AppCommand::Today { user_id: user },
            Commands::History { user } => AppCommand::History { user_id: user },
            Commands::Stats { user } => AppCommand::Stats { user_id: user },
            Commands::Ledger { reward_id } => AppCommand::Ledger { reward_id },
            Commands::Refresh => AppCommand::Refresh,
            Commands::Watch => AppCommand::Watch,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => rewardledger::cli::setup::setup_at_path(path),
            None => rewardledger::cli::setup::setup(),
        },
        Some(cmd) => rewardledger::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
