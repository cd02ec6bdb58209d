//! Daily bars from the Yahoo Finance chart API.
//!
//! Reference symbols use exchange suffixes as they are quoted domestically
//! (`600519.SH`, `00700.HK`). Yahoo spells Shanghai as `.SS` and Hong Kong
//! codes with four digits, so symbols are rewritten before each request.

use super::PriceProvider;
use crate::error::PriceError;
use crate::models::PriceBar;
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

static SHANGHAI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{6})\.SH$").expect("static regex"));
static HONG_KONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0(\d{4})\.HK$").expect("static regex"));

/// Yahoo's spelling of a reference symbol.
pub fn yahoo_symbol(symbol: &str) -> String {
    let symbol = symbol.trim().to_uppercase();
    if let Some(caps) = SHANGHAI.captures(&symbol) {
        return format!("{}.SS", &caps[1]);
    }
    if let Some(caps) = HONG_KONG.captures(&symbol) {
        return format!("{}.HK", &caps[1]);
    }
    symbol
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Decode a chart response into bars, skipping sessions without a close.
///
/// Timestamps are shifted by the exchange's GMT offset so each bar carries
/// its local trading date.
fn parse_chart(symbol: &str, body: &str) -> Result<Vec<PriceBar>, PriceError> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| PriceError::Decode(e.to_string()))?;

    if let Some(error) = response.chart.error {
        if error.code.as_deref() == Some("Not Found") {
            return Ok(Vec::new());
        }
        return Err(PriceError::Decode(format!(
            "{symbol}: {}",
            error.description.unwrap_or_else(|| "unknown chart error".into())
        )));
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let offset = result.meta.map(|m| m.gmtoffset).unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(close) = at(&quote.close, i) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts + offset, 0).map(|d| d.date_naive()) else {
            continue;
        };
        bars.push(PriceBar {
            date,
            open: at(&quote.open, i).unwrap_or(close),
            high: at(&quote.high, i).unwrap_or(close),
            low: at(&quote.low, i).unwrap_or(close),
            close,
            volume: at(&quote.volume, i).unwrap_or_default(),
        });
    }
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    Ok(bars)
}

/// Chart API client.
#[derive(Debug, Clone)]
pub struct YahooChartProvider {
    client: Client,
    rate_limit_wait: Duration,
}

impl YahooChartProvider {
    pub fn new(timeout: Duration) -> Result<Self, PriceError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            rate_limit_wait: Duration::from_secs(5),
        })
    }
}

impl PriceProvider for YahooChartProvider {
    #[instrument(level = "info", skip_all, fields(%symbol, %start, %end))]
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PriceError> {
        let remote = yahoo_symbol(symbol);
        let period1 = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp());
        let period2 = end
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc().timestamp());
        let (Some(period1), Some(period2)) = (period1, period2) else {
            return Ok(Vec::new());
        };
        let url = format!("{CHART_URL}/{}", urlencoding::encode(&remote));

        for attempt in 1..=MAX_RATE_LIMIT_RETRIES {
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("period1", period1.to_string()),
                    ("period2", period2.to_string()),
                    ("interval", "1d".to_string()),
                ])
                .send()
                .await?;

            let status = response.status();
            if status.as_u16() == 429 {
                warn!(%remote, attempt, wait = ?self.rate_limit_wait, "Yahoo rate limited; waiting");
                tokio::time::sleep(self.rate_limit_wait).await;
                continue;
            }
            let body = response.text().await?;
            if status.as_u16() == 404 {
                debug!(%remote, "Symbol unknown to Yahoo");
                return Ok(Vec::new());
            }
            if !status.is_success() {
                return Err(PriceError::Status {
                    symbol: remote,
                    status: status.as_u16(),
                });
            }

            let bars = parse_chart(&remote, &body)?
                .into_iter()
                .filter(|b| b.date >= start && b.date <= end)
                .collect::<Vec<_>>();
            debug!(%remote, bars = bars.len(), "Fetched daily bars");
            return Ok(bars);
        }

        Err(PriceError::Status {
            symbol: remote,
            status: 429,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(yahoo_symbol("600519.SH"), "600519.SS");
        assert_eq!(yahoo_symbol("002594.SZ"), "002594.SZ");
        assert_eq!(yahoo_symbol("00700.HK"), "0700.HK");
        assert_eq!(yahoo_symbol("09988.HK"), "9988.HK");
        assert_eq!(yahoo_symbol("tsla"), "TSLA");
    }

    #[test]
    fn test_parse_chart_skips_missing_closes() {
        // 09:30 at UTC+8 on 15, 16 and 17 January 2024
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":28800},
            "timestamp":[1705282200,1705368600,1705455000],
            "indicators":{"quote":[{
                "open":[100.0,null,101.0],
                "high":[103.0,null,104.0],
                "low":[99.0,null,100.0],
                "close":[102.0,null,103.5],
                "volume":[1000,null,1200]
            }]}
        }],"error":null}}"#;

        let bars = parse_chart("0700.HK", body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(bars[0].close, 102.0);
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
        assert_eq!(bars[1].volume, 1200.0);
    }

    #[test]
    fn test_not_found_is_empty_series() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(parse_chart("XXXX", body).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            parse_chart("TSLA", "<html>"),
            Err(PriceError::Decode(_))
        ));
    }
}
