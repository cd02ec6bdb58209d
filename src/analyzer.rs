//! Before/after price statistics for the leaders of a topic's sector.
//!
//! For a classified topic the analyzer:
//! 1. resolves every sector leader to a symbol, dropping unknown names
//! 2. requests daily bars over `[date - days_before, date + days_after]`
//! 3. splits each series at the topic date (bars dated on that day count as "before")
//! 4. computes means, percentage change, coefficient of variation and extrema
//!
//! A security with an empty side yields an explicit insufficient-data
//! outcome. Nothing here judges whether the topic caused anything.

use crate::error::AnalysisError;
use crate::events::{EventSink, PipelineEvent};
use crate::models::{
    AnalysisOutcome, ClassificationResult, ImpactAnalysis, InsufficientReason, PriceBar,
    PriceWindowStats, SampleCounts, SecurityOutcome, WindowExtrema,
};
use crate::prices::PriceProvider;
use crate::reference::ReferenceData;
use chrono::{Days, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub struct ImpactAnalyzer<'a, P> {
    reference: &'a ReferenceData,
    provider: P,
    sink: Arc<dyn EventSink>,
}

impl<'a, P: PriceProvider> ImpactAnalyzer<'a, P> {
    pub fn new(reference: &'a ReferenceData, provider: P, sink: Arc<dyn EventSink>) -> Self {
        Self {
            reference,
            provider,
            sink,
        }
    }

    /// Measure every resolvable leader of the topic's sector.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::WindowOutOfRange`] when the window cannot be
    /// represented as calendar dates. Provider failures are not errors; they
    /// become insufficient-data outcomes for the affected security.
    #[instrument(level = "info", skip_all, fields(topic = %classification.topic, sector = %classification.sector))]
    pub async fn analyze(
        &self,
        classification: &ClassificationResult,
        days_before: u32,
        days_after: u32,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let topic = &classification.topic;
        let sector = &classification.sector;

        if classification.sector_leaders.is_empty() {
            debug!("Sector has no leaders");
            return Ok(AnalysisOutcome::NoLeaders {
                topic: topic.clone(),
                sector: sector.clone(),
            });
        }

        let mut unresolved = Vec::new();
        let mut resolved = Vec::new();
        for name in &classification.sector_leaders {
            match self.reference.resolve(name) {
                Some(security) => resolved.push((name.as_str(), security.symbol.as_str())),
                None => {
                    self.sink.emit(PipelineEvent::SecurityUnresolved {
                        topic: topic.clone(),
                        name: name.clone(),
                    });
                    unresolved.push(name.clone());
                }
            }
        }
        let resolved: Vec<_> = resolved.into_iter().unique_by(|(_, symbol)| *symbol).collect();

        if resolved.is_empty() {
            return Ok(AnalysisOutcome::NoResolvableSymbols {
                topic: topic.clone(),
                sector: sector.clone(),
                unresolved,
            });
        }

        let (window_start, window_end) =
            analysis_window(classification.timestamp, days_before, days_after)?;
        let topic_date = classification.timestamp.date();

        let mut securities = Vec::with_capacity(resolved.len());
        for (name, symbol) in resolved {
            let outcome = match self.provider.daily_bars(symbol, window_start, window_end).await {
                Ok(bars) => compute_window_stats(name, symbol, &bars, topic_date),
                Err(e) => SecurityOutcome::InsufficientData {
                    security_name: name.to_string(),
                    symbol: symbol.to_string(),
                    reason: InsufficientReason::ProviderError {
                        message: e.to_string(),
                    },
                },
            };
            if let SecurityOutcome::InsufficientData { reason, .. } = &outcome {
                self.sink.emit(PipelineEvent::InsufficientData {
                    topic: topic.clone(),
                    symbol: outcome.symbol().to_string(),
                    reason: reason.code(),
                });
            }
            securities.push(outcome);
        }

        let measured = securities.iter().filter(|s| s.stats().is_some()).count();
        info!(
            securities = securities.len(),
            measured,
            %window_start,
            %window_end,
            "Analyzed price windows"
        );

        Ok(AnalysisOutcome::Analyzed(ImpactAnalysis {
            topic: topic.clone(),
            timestamp: classification.timestamp,
            sector: sector.clone(),
            window_start,
            window_end,
            securities,
            unresolved,
        }))
    }
}

/// Calendar-date window around a timestamp, both ends inclusive.
pub fn analysis_window(
    timestamp: NaiveDateTime,
    days_before: u32,
    days_after: u32,
) -> Result<(NaiveDate, NaiveDate), AnalysisError> {
    let date = timestamp.date();
    let out_of_range = || AnalysisError::WindowOutOfRange {
        timestamp,
        days_before,
        days_after,
    };
    let start = date
        .checked_sub_days(Days::new(days_before.into()))
        .ok_or_else(out_of_range)?;
    let end = date
        .checked_add_days(Days::new(days_after.into()))
        .ok_or_else(out_of_range)?;
    Ok((start, end))
}

/// Split `bars` at `topic_date` and describe each side.
///
/// Bars with a non-finite or non-positive close are ignored.
pub fn compute_window_stats(
    security_name: &str,
    symbol: &str,
    bars: &[PriceBar],
    topic_date: NaiveDate,
) -> SecurityOutcome {
    let insufficient = |reason| SecurityOutcome::InsufficientData {
        security_name: security_name.to_string(),
        symbol: symbol.to_string(),
        reason,
    };

    let usable: Vec<&PriceBar> = bars
        .iter()
        .filter(|b| b.close.is_finite() && b.close > 0.0)
        .collect();
    if usable.is_empty() {
        return insufficient(InsufficientReason::NoSeries);
    }

    let (before, after): (Vec<f64>, Vec<f64>) = usable.iter().fold(
        (Vec::new(), Vec::new()),
        |(mut before, mut after), bar| {
            if bar.date <= topic_date {
                before.push(bar.close);
            } else {
                after.push(bar.close);
            }
            (before, after)
        },
    );
    if before.is_empty() {
        return insufficient(InsufficientReason::EmptyBeforeWindow);
    }
    if after.is_empty() {
        return insufficient(InsufficientReason::EmptyAfterWindow);
    }

    let avg_before = mean(&before);
    let avg_after = mean(&after);
    let (min_before, max_before) = extrema(&before);
    let (min_after, max_after) = extrema(&after);

    SecurityOutcome::Measured(PriceWindowStats {
        security_name: security_name.to_string(),
        symbol: symbol.to_string(),
        avg_price_before: avg_before,
        avg_price_after: avg_after,
        pct_change: (avg_after - avg_before) / avg_before * 100.0,
        volatility_before: coefficient_of_variation(&before),
        volatility_after: coefficient_of_variation(&after),
        extrema: WindowExtrema {
            min_before,
            max_before,
            min_after,
            max_after,
        },
        sample_counts: SampleCounts {
            before: before.len(),
            after: after.len(),
        },
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1). Zero for fewer than two values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    variance.sqrt()
}

/// Standard deviation over mean, in percent.
fn coefficient_of_variation(values: &[f64]) -> f64 {
    sample_std(values) / mean(values) * 100.0
}

fn extrema(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}
