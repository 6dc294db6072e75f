use std::path::PathBuf;

use chronicle_cli::{CliContext, commands, logging, repl, server};
use chronicle_core::AppConfigExt;
use chronicle_core::config::AppConfig;
use chronicle_types::{LearnMoreLink, TimelineEntry, Voice};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chronicle", version, about = "Narrated AI history timeline")]
struct Cli {
    /// Debug logging for chronicle crates (same as DEBUG_LOGGING=1)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on, overrides server.bind_address
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Interactive narration session
    Narrate {
        #[arg(short, long)]
        voice: Option<Voice>,
    },
    /// Print the timeline in display order
    List,
    /// Print the stored document as JSON
    Export,
    /// Replace the stored document with a JSON file
    Import {
        path: PathBuf,
        /// Editing password, defaults to the configured one
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Add one entry
    CreateEntry {
        year: String,
        title: String,
        details: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        quote: Option<String>,
        /// Person or concept involved, repeatable
        #[arg(long = "player")]
        players: Vec<String>,
        /// Learn-more link as text=url, repeatable
        #[arg(long = "link", value_parser = commands::parse_link)]
        links: Vec<LearnMoreLink>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Pre-generate narration audio into the asset directory
    GenerateAudio {
        /// Voices to render, defaults to speech.generated_voices
        #[arg(long = "voice")]
        voices: Vec<Voice>,
    },
    /// Show the effective configuration
    Config {
        /// Only print the config file location
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.debug);
    let config = AppConfig::load();

    if let Commands::Config { path } = cli.command {
        return commands::show_config(&config, path);
    }

    let ctx = CliContext::new(config)?;
    match cli.command {
        Commands::Serve { bind } => server::serve(&ctx, bind).await,
        Commands::Narrate { voice } => repl::run(ctx, voice).await,
        Commands::List => commands::list(&ctx).await,
        Commands::Export => commands::export(&ctx).await,
        Commands::Import { path, password } => commands::import(&ctx, &path, password).await,
        Commands::CreateEntry {
            year,
            title,
            details,
            id,
            icon,
            quote,
            players,
            links,
            password,
        } => {
            let entry = TimelineEntry {
                id: id.unwrap_or_default(),
                year,
                title,
                icon: icon.unwrap_or_default(),
                players_concepts: players,
                details,
                quote,
                learn_more_links: links,
            };
            commands::create_entry(&ctx, entry, password).await
        }
        Commands::GenerateAudio { voices } => commands::generate_audio(&ctx, voices).await,
        Commands::Config { .. } => Ok(()),
    }
}
