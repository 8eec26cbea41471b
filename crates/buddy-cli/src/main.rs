mod commands;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

use buddy_core::BuddyConfig;

#[derive(Parser)]
#[command(name = "buddy")]
#[command(about = "Browsing activity reports with content screening", long_about = None)]
struct Cli {
    /// Config file (defaults to <data dir>/browse-buddy/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay recorded page events (one JSON object per line) and save the report
    Replay {
        /// JSON Lines file of events
        events: PathBuf,
        /// Directory for the report (overrides report.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the report as a base64 data URL instead of saving it
        #[arg(long)]
        data_url: bool,
    },
    /// Analyze one page with the configured classifier and save the report
    #[command(group(ArgGroup::new("content").required(true).args(["text", "file"])))]
    Analyze {
        /// Page URL
        #[arg(long)]
        url: String,
        /// Page text
        #[arg(long)]
        text: Option<String>,
        /// Read the page text from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Directory for the report (overrides report.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Give up after this many failed attempts
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the default config file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = BuddyConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            events,
            output,
            data_url,
        } => commands::replay::replay_command(&config, &events, output, data_url).await,
        Commands::Analyze {
            url,
            text,
            file,
            output,
            max_attempts,
        } => {
            let text = commands::helpers::read_page_text(text, file.as_deref())?;
            commands::analyze::analyze_command(&config, &url, text, output, max_attempts).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show_config(&config),
            ConfigAction::Path => commands::config::show_config_path(cli.config.as_deref()),
        },
    }
}
