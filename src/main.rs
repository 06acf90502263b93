use registry_match::config::{LoggingSettings, Settings};
use registry_match::core::{Matcher, NameMatcher, ScoringPolicy};
use registry_match::models::{ListingRecord, MatchResult};
use registry_match::services::{OpenAiAssistant, ProxyGateway, RegistrySearchResolver};
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true);

    match settings.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "compact" => subscriber.compact().init(),
        _ => subscriber.init(),
    }
}

fn usage_error(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.into())
}

fn read_listings(path: &str) -> io::Result<Vec<ListingRecord>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_results(path: Option<&str>, results: &[Vec<MatchResult>]) -> io::Result<()> {
    let sink: Box<dyn Write> = match path {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);

    for result in results.iter().flatten() {
        serde_json::to_writer(&mut writer, result).map_err(io::Error::other)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

#[tokio::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        io::Error::other(e)
    })?;

    init_logging(&settings.logging);

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .ok_or_else(|| usage_error("usage: registry-match <listings.json> [output.jsonl]"))?;
    let output = args.next();

    let listings = read_listings(&input)?;
    info!(listings = listings.len(), input = %input, "Loaded listings");

    let gateway = Arc::new(ProxyGateway::new(&settings.gateway).map_err(|e| {
        error!(error = %e, "Failed to configure gateway");
        io::Error::other(e)
    })?);
    let assistant = Arc::new(OpenAiAssistant::new(&settings.assistant).map_err(|e| {
        error!(error = %e, "Failed to configure ranking assistant");
        io::Error::other(e)
    })?);

    let config = settings.matching_config();
    let matcher = Arc::new(Matcher::new(
        RegistrySearchResolver::new(gateway.clone(), &settings.registry),
        NameMatcher::new(
            assistant,
            settings.assistant.model.clone(),
            settings.assistant.temperature,
            Duration::from_secs(settings.assistant.timeout_secs),
            config.prefilter_size,
        ),
        ScoringPolicy::new(config),
        settings.registry.search_limit,
    ));

    info!(?config, concurrency = settings.batch.concurrency, "Matcher initialized");

    let session = gateway.acquire().map_err(|e| {
        error!(error = %e, "Failed to open gateway session");
        io::Error::other(e)
    })?;
    let results = matcher.match_batch(listings, settings.batch.concurrency).await;
    drop(session);

    let accepted = results
        .iter()
        .filter(|matches| matches.first().is_some_and(|m| m.is_accepted))
        .count();
    info!(listings = results.len(), accepted, "Matching complete");

    write_results(output.as_deref(), &results)
}
