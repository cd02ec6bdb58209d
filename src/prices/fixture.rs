//! Fixed price series for offline runs.
//!
//! The JSON file maps reference symbols to bars:
//!
//! ```json
//! {
//!   "00700.HK": [
//!     {"date": "2024-01-12", "open": 99.5, "high": 101.0, "low": 98.7, "close": 100.0},
//!     {"date": "2024-01-16", "open": 114.0, "high": 116.2, "low": 113.1, "close": 115.0}
//!   ]
//! }
//! ```
//!
//! `volume` is optional. Symbols missing from the file have no data.

use super::PriceProvider;
use crate::error::PriceError;
use crate::models::PriceBar;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    series: HashMap<String, Vec<PriceBar>>,
}

impl FixtureProvider {
    pub fn new(series: HashMap<String, Vec<PriceBar>>) -> Self {
        let series = series
            .into_iter()
            .map(|(symbol, mut bars)| {
                bars.sort_by_key(|b| b.date);
                (symbol.trim().to_uppercase(), bars)
            })
            .collect();
        Self { series }
    }

    pub fn from_json(raw: &str) -> Result<Self, PriceError> {
        let series: HashMap<String, Vec<PriceBar>> =
            serde_json::from_str(raw).map_err(|e| PriceError::Fixture(e.to_string()))?;
        Ok(Self::new(series))
    }

    #[instrument(level = "info", skip_all, fields(path = %path))]
    pub fn from_json_file(path: &str) -> Result<Self, PriceError> {
        let raw = fs::read_to_string(path).map_err(|e| PriceError::Fixture(format!("{path}: {e}")))?;
        let provider = Self::from_json(&raw)?;
        info!(symbols = provider.series.len(), "Loaded price fixture");
        Ok(provider)
    }
}

impl PriceProvider for FixtureProvider {
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PriceError> {
        let bars = self
            .series
            .get(&symbol.trim().to_uppercase())
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(bars)
    }
}
