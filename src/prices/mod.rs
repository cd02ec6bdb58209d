//! Historical price data providers.
//!
//! The analyzer only needs daily bars for a symbol over a date range. Where
//! they come from is behind [`PriceProvider`]:
//!
//! | Provider | Module | Notes |
//! |----------|--------|-------|
//! | Yahoo chart API | [`yahoo`] | Live daily bars; symbols mapped to Yahoo suffixes |
//! | Fixture | [`fixture`] | In-memory or JSON-file bars for offline runs and tests |
//!
//! An empty series is a valid answer. The analyzer turns it into an
//! insufficient-data outcome rather than an error.

pub mod fixture;
pub mod yahoo;

use crate::error::PriceError;
use crate::models::PriceBar;
use chrono::NaiveDate;
use fixture::FixtureProvider;
use yahoo::YahooChartProvider;

/// Source of daily bars.
pub trait PriceProvider {
    /// Bars for `symbol` dated within `start..=end`, oldest first.
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PriceError>;
}

/// Provider chosen at runtime from the command line.
#[derive(Debug)]
pub enum AnyPriceProvider {
    Yahoo(YahooChartProvider),
    Fixture(FixtureProvider),
}

impl PriceProvider for AnyPriceProvider {
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PriceError> {
        match self {
            AnyPriceProvider::Yahoo(p) => p.daily_bars(symbol, start, end).await,
            AnyPriceProvider::Fixture(p) => p.daily_bars(symbol, start, end).await,
        }
    }
}
