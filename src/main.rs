use bytes::Bytes;
use cdcstream::{
    config::{Config, ConfigLoader, ConfigValidator, LogFormat},
    error::{CdcStreamError, Result},
    models::TopicSchema,
    source::{
        pubsub::{
            AvroPayloadDecoder, Capture, EventParser, LoggingHandler, MemoryTransport,
            PubSubClient, SessionOutcome, StaticSessionProvider,
        },
        RawEvent,
    },
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "cdcstream",
    version = env!("CARGO_PKG_VERSION"),
    about = "Subscribe to change-data-capture topics and decode their events",
    long_about = None
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CDCSTREAM_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CDCSTREAM_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to the configured topic and log every event
    Run {
        /// Recorded stream to replay instead of a live endpoint
        #[arg(long)]
        capture: PathBuf,

        /// Override pubsub.event_receive_limit
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },
    /// Decode a single event and print it as JSON
    Decode {
        /// Avro schema of the topic
        #[arg(long)]
        schema: PathBuf,

        /// Hex-encoded Avro payload
        #[arg(long)]
        payload: String,

        /// Hex-encoded 8-byte replay token
        #[arg(long)]
        replay_id: String,
    },
    /// Validate configuration
    Validate,
    /// Generate sample configuration
    GenerateSample,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateSample => {
            println!("{}", ConfigLoader::generate_sample());
            Ok(())
        }
        Commands::Version => {
            print_version_info();
            Ok(())
        }
        Commands::Decode {
            schema,
            payload,
            replay_id,
        } => {
            init_tracing(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text);
            decode_one(&schema, &payload, &replay_id)
        }
        Commands::Validate => {
            let config = load_config(cli.config.as_deref())?;
            init_tracing(
                cli.log_level.as_deref().unwrap_or(&config.logging.level),
                config.logging.format,
            );
            info!("Validating configuration...");
            validate_config(&config)?;
            info!("Configuration is valid");
            Ok(())
        }
        Commands::Run { capture, count } => {
            let config = load_config(cli.config.as_deref())?;
            init_tracing(
                cli.log_level.as_deref().unwrap_or(&config.logging.level),
                config.logging.format,
            );
            info!("cdcstream v{}", env!("CARGO_PKG_VERSION"));
            validate_config(&config)?;
            run_subscription(config, &capture, count).await
        }
    }
}

fn init_tracing(log_level: &str, format: LogFormat) {
    use tracing_subscriber::fmt::time::ChronoLocal;

    let filter = format!("cdcstream={},warn", log_level);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string());

    let registry = tracing_subscriber::registry().with(filter_layer);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_timer(timer))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_timer(timer))
            .init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(timer)
                    .with_target(false)
                    .with_thread_names(true),
            )
            .init(),
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

fn validate_config(config: &Config) -> Result<()> {
    let report = ConfigValidator::new(config.clone()).validate();
    report.print();

    if !report.is_valid() {
        return Err(CdcStreamError::Validation(
            "Configuration validation failed. See errors above.".to_string(),
        ));
    }

    info!("  Application: {}", config.app.name);
    info!("  Instance ID: {}", config.app.instance_id);
    info!(
        "  Topic: {} via {}",
        config.pubsub.topic_name, config.pubsub.endpoint
    );
    Ok(())
}

async fn run_subscription(config: Config, capture: &Path, count: Option<u32>) -> Result<()> {
    let capture = Capture::from_file(capture)?;
    if capture.topic != config.pubsub.topic_name {
        warn!(
            "Capture was recorded from {}, not the configured {}",
            capture.topic, config.pubsub.topic_name
        );
    }
    let connector = MemoryTransport::from_capture(&capture)?;
    let provider = StaticSessionProvider::from_config(&config.auth);

    let mut client =
        PubSubClient::connect(&provider, &connector, &config.pubsub, &config.retry).await?;

    let count = count.unwrap_or(config.pubsub.event_receive_limit);
    let result = subscribe_and_drain(
        &client,
        &capture.topic,
        count,
        config.pubsub.stall_timeout_secs,
    )
    .await;

    client.disconnect().await?;
    let received = result?;
    info!("Received {} events", received);
    Ok(())
}

async fn subscribe_and_drain(
    client: &PubSubClient,
    topic: &str,
    count: u32,
    stall_timeout_secs: Option<u64>,
) -> Result<u32> {
    let schema = Arc::new(client.retrieve_topic_schema(topic).await?);
    let session = client.subscribe(topic, schema, count)?;
    let handle = session.handle();

    if let Some(secs) = stall_timeout_secs {
        let watchdog = handle.clone();
        tokio::spawn(async move {
            watchdog.cancel_on_stall(Duration::from_secs(secs)).await;
        });
    }

    let interrupt = handle.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                interrupt.cancel();
            }
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    });

    let mut handler = LoggingHandler::new();
    let outcome = session.run(&mut handler).await;
    if let SessionOutcome::Cancelled { received } = &outcome {
        warn!("Subscription cancelled after {} events", received);
    }
    outcome.into_result()
}

fn decode_one(schema_path: &Path, payload: &str, replay_id: &str) -> Result<()> {
    let schema_json = std::fs::read_to_string(schema_path)?;
    let schema = Arc::new(TopicSchema::parse(&schema_json)?);
    let decoder = Arc::new(AvroPayloadDecoder::new(&schema_json)?);
    let parser = EventParser::new(schema, decoder);

    let raw = RawEvent {
        replay_id: Bytes::from(parse_hex("replay id", replay_id)?),
        payload: Bytes::from(parse_hex("payload", payload)?),
        ..Default::default()
    };
    let event = parser.parse(&raw)?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

fn parse_hex(what: &str, value: &str) -> Result<Vec<u8>> {
    let digits = value.trim().trim_start_matches("0x");
    hex::decode(digits)
        .map_err(|e| CdcStreamError::Validation(format!("Invalid {} hex: {}", what, e)))
}

fn print_version_info() {
    println!("cdcstream v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Change-data-capture event decoding and credit-based subscription streaming");
    println!("License: MIT");
}
