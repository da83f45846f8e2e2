use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use thread_relay::assistant::OpenAiClient;
use thread_relay::integrations::{CommandTranscript, TranscriptSource};
use thread_relay::intent::{AuditLog, IntentClassifier};
use thread_relay::store::ConversationStore;
use thread_relay::{Config, Daemon};

/// thread-relay - chat bot on one shared assistant thread
#[derive(Parser)]
#[command(name = "thread-relay", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/thread-relay/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Webhook server port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored conversation handle
    ShowThread,
    /// Run the intent classifier once on a message
    Classify {
        /// Message text
        text: String,
    },
    /// Run the transcript tool once on a video URL
    Transcript {
        /// Video URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = match cli.verbose {
        0 => "info,thread_relay=info",
        1 => "info,thread_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command {
        Some(Command::ShowThread) => show_thread(&config),
        Some(Command::Classify { text }) => classify(&config, &text).await,
        Some(Command::Transcript { url }) => transcript(&config, &url).await,
        None => {
            tracing::info!(
                persona = %config.persona,
                port = config.port,
                data_dir = %config.data_dir.display(),
                "starting thread-relay"
            );
            tracing::debug!(?config, "loaded configuration");
            Daemon::new(config).run().await?;
            Ok(())
        }
    }
}

fn show_thread(config: &Config) -> anyhow::Result<()> {
    let store = ConversationStore::in_dir(&config.data_dir);
    match store.load()? {
        Some(thread_id) => println!("{thread_id}"),
        None => println!("no stored thread at {}", store.path().display()),
    }
    Ok(())
}

async fn classify(config: &Config, text: &str) -> anyhow::Result<()> {
    let client = OpenAiClient::with_base_url(
        config.require_api_key()?,
        config.assistant.base_url.clone(),
    )?;
    let classifier = IntentClassifier::new(
        Arc::new(client),
        config.assistant.intent_model.clone(),
        config.persona.clone(),
        AuditLog::in_dir(&config.data_dir),
    );

    let decision = classifier.classify(text).await;
    println!(
        "{} (raw: {:?})",
        if decision.should_respond { "ja" } else { "nee" },
        decision.raw
    );
    Ok(())
}

async fn transcript(config: &Config, url: &str) -> anyhow::Result<()> {
    let source = CommandTranscript::from_command_line(&config.transcript_command)?
        .with_timeout(config.transcript_timeout);
    let text = source.transcript(url).await?;
    println!("{text}");
    Ok(())
}
