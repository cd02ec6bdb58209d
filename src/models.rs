//! Data models shared by every pipeline stage.
//!
//! This module defines the records that flow from capture to reporting:
//! - [`TrendingItem`]: one ranked topic as captured from the hot-search list
//! - [`ClassificationResult`]: the sector assigned to a topic plus its candidates
//! - [`PriceBar`]: a daily OHLC observation returned by a price provider
//! - [`PriceWindowStats`] / [`SecurityOutcome`]: before/after statistics for one security
//! - [`AnalysisOutcome`]: everything measured (or not) for one impactful topic
//! - [`RunReport`] / [`RunSummary`]: the aggregate handed to output writers
//!
//! Field names are part of the output contract: writers serialize these structs
//! as-is, so renaming a field changes the files produced by a run.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sector name used when no keyword of any sector matches a topic.
pub const UNCLASSIFIED_SECTOR: &str = "unclassified";

/// Confidence a topic must exceed (strictly) to be considered impactful.
pub const MATERIAL_IMPACT_THRESHOLD: f64 = 0.3;

/// One ranked topic from a single capture batch.
///
/// Items are created once per fetch and never mutated afterwards. `rank` is
/// unique within the batch it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingItem {
    /// 1-based position at capture time.
    pub rank: u32,
    /// Trimmed, non-empty topic text.
    pub title: String,
    /// Absolute URL of the topic's search page, when one was found.
    pub link: Option<String>,
    /// Popularity metric as shown by the source. Not guaranteed to be numeric.
    pub heat_value: Option<String>,
    /// When the item was extracted (not when the topic was published).
    pub captured_at: NaiveDateTime,
}

/// Sector assignment for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub topic: String,
    pub timestamp: NaiveDateTime,
    /// Winning sector, or [`UNCLASSIFIED_SECTOR`].
    pub sector: String,
    /// Fraction of the winning sector's vocabulary found in the topic, in `[0, 1]`.
    pub confidence: f64,
    pub related_securities: Vec<String>,
    pub sector_leaders: Vec<String>,
    pub has_material_impact: bool,
}

/// A single daily price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Lowest and highest close on each side of the topic timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowExtrema {
    pub min_before: f64,
    pub max_before: f64,
    pub min_after: f64,
    pub max_after: f64,
}

/// Number of trading observations on each side of the topic timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounts {
    pub before: usize,
    pub after: usize,
}

/// Descriptive close-price statistics for one security around one topic.
///
/// Only built when both windows hold at least one observation, so every
/// field is a finite number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceWindowStats {
    pub security_name: String,
    pub symbol: String,
    pub avg_price_before: f64,
    pub avg_price_after: f64,
    /// `(avg_after - avg_before) / avg_before * 100`.
    pub pct_change: f64,
    /// Coefficient of variation of the close, in percent.
    pub volatility_before: f64,
    pub volatility_after: f64,
    pub extrema: WindowExtrema,
    pub sample_counts: SampleCounts,
}

/// Why a security could not be measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsufficientReason {
    /// The provider returned no usable observations.
    NoSeries,
    /// No observation on or before the topic date.
    EmptyBeforeWindow,
    /// No observation after the topic date.
    EmptyAfterWindow,
    /// The provider call itself failed.
    ProviderError { message: String },
}

impl InsufficientReason {
    /// Stable reason code used in logs and reports.
    pub fn code(&self) -> &'static str {
        match self {
            InsufficientReason::NoSeries => "no_series",
            InsufficientReason::EmptyBeforeWindow => "empty_before_window",
            InsufficientReason::EmptyAfterWindow => "empty_after_window",
            InsufficientReason::ProviderError { .. } => "provider_error",
        }
    }
}

/// Result of measuring one security: either statistics or an explicit gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SecurityOutcome {
    Measured(PriceWindowStats),
    InsufficientData {
        security_name: String,
        symbol: String,
        reason: InsufficientReason,
    },
}

impl SecurityOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            SecurityOutcome::Measured(stats) => &stats.symbol,
            SecurityOutcome::InsufficientData { symbol, .. } => symbol,
        }
    }

    pub fn stats(&self) -> Option<&PriceWindowStats> {
        match self {
            SecurityOutcome::Measured(stats) => Some(stats),
            SecurityOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Price statistics for every resolvable leader of a topic's sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub topic: String,
    pub timestamp: NaiveDateTime,
    pub sector: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub securities: Vec<SecurityOutcome>,
    /// Leader names that had no known symbol.
    pub unresolved: Vec<String>,
}

impl ImpactAnalysis {
    pub fn measured(&self) -> impl Iterator<Item = &PriceWindowStats> {
        self.securities.iter().filter_map(SecurityOutcome::stats)
    }
}

/// What the impact analyzer produced for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// The topic's sector has no leaders to look at.
    NoLeaders { topic: String, sector: String },
    /// Leaders exist but none maps to a tradable symbol.
    NoResolvableSymbols {
        topic: String,
        sector: String,
        unresolved: Vec<String>,
    },
    Analyzed(ImpactAnalysis),
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> Option<&ImpactAnalysis> {
        match self {
            AnalysisOutcome::Analyzed(analysis) => Some(analysis),
            _ => None,
        }
    }
}

/// A topic whose processing failed; the rest of the run carried on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicFailure {
    pub topic: String,
    pub stage: String,
    pub reason: String,
}

/// Headline numbers for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub analysis_time: NaiveDateTime,
    pub total_topics_analyzed: usize,
    pub impactful_topics: usize,
    /// Percentage of analysed topics flagged impactful, two decimals.
    pub impact_rate: f64,
    pub sector_distribution: BTreeMap<String, usize>,
    /// Topics with at least one measured security.
    pub price_analyses_count: usize,
    pub days_before: u32,
    pub days_after: u32,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub captured: Vec<TrendingItem>,
    pub classifications: Vec<ClassificationResult>,
    pub impacts: Vec<AnalysisOutcome>,
    pub failures: Vec<TopicFailure>,
    pub summary: RunSummary,
}
