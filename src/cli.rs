//! Command-line interface definitions.
//!
//! All options have defaults, so a bare invocation fetches the JSON side-bar
//! list over plain HTTP and prices from Yahoo. Output and config paths can
//! also come from the environment.

use crate::extract::DocumentKind;
use chrono::NaiveDateTime;
use clap::{Parser, ValueEnum};

/// How documents are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Plain HTTPS requests.
    Http,
    /// A headless browser driven through a WebDriver endpoint.
    Browser,
}

/// Where daily prices come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriceSource {
    Yahoo,
    /// A local JSON file given with `--price-fixture`.
    Fixture,
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("expected YYYY-MM-DD HH:MM:SS: {e}"))
}

/// Capture hot-search topics and measure how sector leaders traded around them.
///
/// # Examples
///
/// ```sh
/// # Full run over the top 10 topics
/// hotsearch_impact -o ./data
///
/// # Scrape the HTML page through a local chromedriver
/// hotsearch_impact -o ./data --source html --transport browser
///
/// # Analyse a single headline offline
/// hotsearch_impact --topic "新能源汽车销量创新高" --at "2024-01-15 10:00:00" \
///     --prices fixture --price-fixture prices.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory that receives one sub-directory per run
    #[arg(short, long, env = "HOTSEARCH_OUTPUT_DIR", default_value = "./data")]
    pub output_dir: String,

    /// Optional path to a crawl config YAML file
    #[arg(short, long, env = "HOTSEARCH_CONFIG")]
    pub config: Option<String>,

    /// Optional YAML file replacing the built-in sector and security tables
    #[arg(long)]
    pub reference: Option<String>,

    /// Number of captured topics to classify and analyse
    #[arg(long, default_value_t = 10)]
    pub max_topics: usize,

    /// Calendar days of prices before the topic
    #[arg(long, default_value_t = 30)]
    pub days_before: u32,

    /// Calendar days of prices after the topic
    #[arg(long, default_value_t = 30)]
    pub days_after: u32,

    /// Hot-search document to fetch
    #[arg(long, value_enum, default_value_t = DocumentKind::Json)]
    pub source: DocumentKind,

    #[arg(long, value_enum, default_value_t = TransportKind::Http)]
    pub transport: TransportKind,

    #[arg(long, value_enum, default_value_t = PriceSource::Yahoo)]
    pub prices: PriceSource,

    /// JSON price series used with `--prices fixture`
    #[arg(long, required_if_eq("prices", "fixture"))]
    pub price_fixture: Option<String>,

    /// Analyse this headline instead of fetching the hot-search list
    #[arg(long)]
    pub topic: Option<String>,

    /// Timestamp of `--topic` (YYYY-MM-DD HH:MM:SS); defaults to now
    #[arg(long, value_parser = parse_timestamp, requires = "topic")]
    pub at: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["hotsearch_impact"]);

        assert_eq!(cli.max_topics, 10);
        assert_eq!(cli.days_before, 30);
        assert_eq!(cli.days_after, 30);
        assert_eq!(cli.source, DocumentKind::Json);
        assert_eq!(cli.transport, TransportKind::Http);
        assert_eq!(cli.prices, PriceSource::Yahoo);
        assert!(cli.topic.is_none());
    }

    #[test]
    fn test_cli_full_run_flags() {
        let cli = Cli::parse_from([
            "hotsearch_impact",
            "-o",
            "/tmp/out",
            "--source",
            "html",
            "--transport",
            "browser",
            "--max-topics",
            "5",
            "--days-after",
            "7",
        ]);

        assert_eq!(cli.output_dir, "/tmp/out");
        assert_eq!(cli.source, DocumentKind::Html);
        assert_eq!(cli.transport, TransportKind::Browser);
        assert_eq!(cli.max_topics, 5);
        assert_eq!(cli.days_after, 7);
    }

    #[test]
    fn test_cli_single_topic() {
        let cli = Cli::parse_from([
            "hotsearch_impact",
            "--topic",
            "AI芯片突破",
            "--at",
            "2024-01-15 10:00:00",
            "--prices",
            "fixture",
            "--price-fixture",
            "prices.json",
        ]);

        assert_eq!(cli.topic.as_deref(), Some("AI芯片突破"));
        assert_eq!(cli.at, parse_timestamp("2024-01-15 10:00:00").ok());
        assert_eq!(cli.prices, PriceSource::Fixture);
        assert_eq!(cli.price_fixture.as_deref(), Some("prices.json"));
    }

    #[test]
    fn test_cli_rejects_bad_input() {
        assert!(Cli::try_parse_from(["hotsearch_impact", "--at", "2024-01-15 10:00:00"]).is_err());
        assert!(Cli::try_parse_from(["hotsearch_impact", "--topic", "x", "--at", "yesterday"]).is_err());
        assert!(Cli::try_parse_from(["hotsearch_impact", "--prices", "fixture"]).is_err());
        assert!(Cli::try_parse_from(["hotsearch_impact", "--source", "xml"]).is_err());
    }
}
