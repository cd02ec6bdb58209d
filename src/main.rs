//! # Hotsearch Impact
//!
//! Captures the Weibo hot-search list, classifies each topic into a market
//! sector by keyword matching, and measures how the sector's leading listed
//! companies traded in calendar windows around the topic.
//!
//! ## Usage
//!
//! ```sh
//! hotsearch_impact -o ./data
//! hotsearch_impact --topic "新能源汽车销量创新高" --at "2024-01-15 10:00:00"
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: Retry across endpoints with jitter and rotating identities
//! 2. **Extraction**: Ranked items from the HTML page or the JSON side-bar API
//! 3. **Classification**: Keyword overlap against the sector tables
//! 4. **Analysis**: Daily closes before and after each impactful topic (4 at a time by default)
//! 5. **Output**: JSON files and a text report in a per-run directory
//!
//! Descriptive statistics only; nothing here infers causality.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analyzer;
mod classifier;
mod cli;
mod config;
mod error;
mod events;
mod extract;
mod fetch;
mod models;
mod outputs;
mod pipeline;
mod prices;
mod reference;
mod utils;

use analyzer::ImpactAnalyzer;
use classifier::TopicClassifier;
use cli::{Cli, PriceSource, TransportKind};
use config::CrawlConfig;
use events::{EventSink, TracingSink};
use extract::{DocumentKind, Extractor};
use fetch::{AnyTransport, FetchSettings, Fetcher, browser::BrowserTransport, http::HttpTransport};
use outputs::{json, report, run_dir};
use pipeline::{Pipeline, SourceOptions};
use prices::{AnyPriceProvider, fixture::FixtureProvider, yahoo::YahooChartProvider};
use reference::ReferenceData;
use utils::ensure_writable_dir;

fn load_config(path: Option<&str>) -> Result<CrawlConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => CrawlConfig::load(path)?,
        None => CrawlConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn build_transport(kind: TransportKind, config: &CrawlConfig) -> Result<AnyTransport, Box<dyn Error>> {
    let transport = match kind {
        TransportKind::Http => AnyTransport::Http(HttpTransport::new(config.timeout())?),
        TransportKind::Browser => AnyTransport::Browser(BrowserTransport::new(
            &config.webdriver_url,
            Duration::from_millis(config.browser_settle_min_ms),
            Duration::from_millis(config.browser_settle_max_ms),
            config.timeout(),
        )?
        .headless(config.browser_headless)),
    };
    Ok(transport)
}

fn build_prices(args: &Cli, config: &CrawlConfig) -> Result<AnyPriceProvider, Box<dyn Error>> {
    let provider = match (args.prices, args.price_fixture.as_deref()) {
        (PriceSource::Yahoo, _) => AnyPriceProvider::Yahoo(YahooChartProvider::new(config.timeout())?),
        (PriceSource::Fixture, Some(path)) => {
            AnyPriceProvider::Fixture(FixtureProvider::from_json_file(path)?)
        }
        (PriceSource::Fixture, None) => return Err("--prices fixture needs --price-fixture".into()),
    };
    Ok(provider)
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("hotsearch_impact starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Config and reference tables ----
    let config = load_config(args.config.as_deref())?;
    let loaded;
    let reference: &ReferenceData = match args.reference.as_deref() {
        Some(path) => {
            loaded = ReferenceData::from_yaml_file(path)?;
            &loaded
        }
        None => ReferenceData::builtin(),
    };
    info!(
        sectors = reference.sectors().len(),
        securities = reference.securities().len(),
        "Reference data ready"
    );

    // ---- Wire the pipeline ----
    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
    let fetcher = Fetcher::new(
        build_transport(args.transport, &config)?,
        FetchSettings::from_config(&config),
        Arc::clone(&sink),
    );
    let extractor = Extractor::new(&config.site_origin, config.max_items, Arc::clone(&sink))?;
    let analyzer = ImpactAnalyzer::new(reference, build_prices(&args, &config)?, Arc::clone(&sink));
    let endpoints = match args.source {
        DocumentKind::Html => config.endpoints_html.clone(),
        DocumentKind::Json => config.endpoints_json.clone(),
    };
    let pipeline = Pipeline::new(
        fetcher,
        extractor,
        TopicClassifier::new(reference),
        analyzer,
        SourceOptions {
            endpoints,
            kind: args.source,
            concurrency: config.concurrency,
        },
        sink,
    );

    // ---- Run ----
    let run_report = match args.topic.as_deref() {
        Some(topic) => {
            let at = args.at.unwrap_or_else(|| Local::now().naive_local());
            pipeline
                .analyze_single_topic(topic, at, args.days_before, args.days_after)
                .await
        }
        None => match pipeline
            .run(args.max_topics, args.days_before, args.days_after)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                error!(
                    reason = e.reason(),
                    attempts = e.attempts(),
                    error = %e,
                    "Run failed; nothing to analyse"
                );
                return Err(e.into());
            }
        },
    };

    let summary = &run_report.summary;
    info!(
        topics = summary.total_topics_analyzed,
        impactful = summary.impactful_topics,
        impact_rate = summary.impact_rate,
        price_analyses = summary.price_analyses_count,
        failures = run_report.failures.len(),
        "Analysis finished"
    );

    // ---- Outputs ----
    let dir = run_dir(&args.output_dir, Local::now().naive_local());
    json::write_report(&run_report, &dir).await?;
    report::write_text_report(&run_report, &dir).await?;
    info!(path = %dir.display(), "Outputs written");

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
