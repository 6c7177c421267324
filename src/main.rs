use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hearsay_core::ClientConfig;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hearsay", about = "Speech and text recognition query client")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interpret a text utterance
    Text {
        /// The utterance to interpret
        query: String,

        /// Service access token
        #[arg(short, long)]
        token: String,
    },

    /// Record an utterance from the microphone and interpret it
    Voice {
        /// Service access token
        #[arg(short, long)]
        token: String,
    },

    /// List capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        ClientConfig::load_from_file(&cli.config)
            .with_context(|| format!("failed to load config from {:?}", cli.config))?
    } else {
        ClientConfig::default()
    };

    let env_filter =
        EnvFilter::try_new(&config.general.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    match cli.command {
        Command::Text { query, token } => run_text(&config, &query, &token).await,
        Command::Voice { token } => run_voice(&config, &token).await,
        Command::Devices => run_devices(),
    }
}

async fn run_text(config: &ClientConfig, query: &str, token: &str) -> Result<()> {
    let session = hearsay_client::Session::connect(config)?;

    let body = session
        .text_query(query, token)
        .await
        .context("text query failed")?;
    println!("{body}");

    session.close().await;
    Ok(())
}

async fn run_voice(config: &ClientConfig, token: &str) -> Result<()> {
    let device_manager = hearsay_audio::DeviceManager::new();

    tracing::info!("using input device: {}", config.audio.device_name);
    let device = device_manager
        .get_input_device(&config.audio.device_name)
        .with_context(|| format!("failed to get input device: {}", config.audio.device_name))?;

    let (_capture, handle, audio) = hearsay_audio::CaptureNode::open(&device, &config.audio)
        .context("failed to open capture")?;

    let session = hearsay_client::Session::connect(config)?;
    let pending = session.submit_voice_query(audio, token)?;

    if config.audio.auto_end {
        tracing::info!("listening — pause to finish, or press Ctrl-C to send now");
    } else {
        tracing::info!("listening — press Ctrl-C to send");
    }

    let wait = pending.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("stopping capture");
            handle.stop();
            wait.await
        }
    };

    let body = result.context("voice query failed")?;
    if handle.is_failed() {
        tracing::warn!("capture device failed; the result covers a truncated utterance");
    }
    println!("{body}");

    session.close().await;
    Ok(())
}

fn run_devices() -> Result<()> {
    let device_manager = hearsay_audio::DeviceManager::new();
    let devices = device_manager
        .list_input_devices()
        .context("failed to enumerate input devices")?;

    if devices.is_empty() {
        println!("no input devices found");
        return Ok(());
    }
    for (name, _) in devices {
        println!("{name}");
    }
    Ok(())
}
