//! Plain-text run report.

use crate::models::{AnalysisOutcome, InsufficientReason, RunReport, SecurityOutcome};
use std::error::Error;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

fn names_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Render `report` as human-readable text. Numbers are rounded to two decimals.
pub fn render(report: &RunReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    let _ = writeln!(out, "Hot-search market impact report");
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out);
    let _ = writeln!(out, "Analysis time:        {}", summary.analysis_time.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Topics analysed:      {}", summary.total_topics_analyzed);
    let _ = writeln!(out, "Impactful topics:     {}", summary.impactful_topics);
    let _ = writeln!(out, "Impact rate:          {:.2}%", summary.impact_rate);
    let _ = writeln!(out, "Price analyses:       {}", summary.price_analyses_count);
    let _ = writeln!(
        out,
        "Window:               {} days before / {} days after",
        summary.days_before, summary.days_after
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Sector distribution:");
    let _ = writeln!(out, "{}", "-".repeat(20));
    for (sector, count) in &summary.sector_distribution {
        let _ = writeln!(out, "{sector}: {count} topic(s)");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Classifications:");
    let _ = writeln!(out, "{}", "-".repeat(20));
    for (i, c) in report.classifications.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, c.topic);
        let _ = writeln!(out, "   Sector:     {}", c.sector);
        let _ = writeln!(out, "   Confidence: {:.2}", c.confidence);
        let _ = writeln!(out, "   Impactful:  {}", if c.has_material_impact { "yes" } else { "no" });
        let _ = writeln!(out, "   Leaders:    {}", names_or_none(&c.sector_leaders));
    }

    if !report.impacts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Price windows:");
        let _ = writeln!(out, "{}", "-".repeat(20));
        for (i, impact) in report.impacts.iter().enumerate() {
            match impact {
                AnalysisOutcome::NoLeaders { topic, sector } => {
                    let _ = writeln!(out, "{}. {topic} [{sector}]: sector has no leaders", i + 1);
                }
                AnalysisOutcome::NoResolvableSymbols {
                    topic,
                    sector,
                    unresolved,
                } => {
                    let _ = writeln!(
                        out,
                        "{}. {topic} [{sector}]: no known symbol for {}",
                        i + 1,
                        unresolved.join(", ")
                    );
                }
                AnalysisOutcome::Analyzed(analysis) => {
                    let _ = writeln!(
                        out,
                        "{}. {} [{}] {} to {}",
                        i + 1,
                        analysis.topic,
                        analysis.sector,
                        analysis.window_start,
                        analysis.window_end
                    );
                    for security in &analysis.securities {
                        render_security(&mut out, security);
                    }
                }
            }
        }
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed topics:");
        let _ = writeln!(out, "{}", "-".repeat(20));
        for f in &report.failures {
            let _ = writeln!(out, "{} ({}): {}", f.topic, f.stage, f.reason);
        }
    }
    out
}

fn render_security(out: &mut String, security: &SecurityOutcome) {
    match security {
        SecurityOutcome::Measured(s) => {
            let _ = writeln!(out, "   {} ({}):", s.security_name, s.symbol);
            let _ = writeln!(out, "     Change:     {:+.2}%", s.pct_change);
            let _ = writeln!(
                out,
                "     Avg close:  {:.2} -> {:.2}",
                s.avg_price_before, s.avg_price_after
            );
            let _ = writeln!(
                out,
                "     Volatility: {:.2}% -> {:.2}%",
                s.volatility_before, s.volatility_after
            );
            let _ = writeln!(
                out,
                "     Range:      {:.2}..{:.2} -> {:.2}..{:.2}",
                s.extrema.min_before, s.extrema.max_before, s.extrema.min_after, s.extrema.max_after
            );
            let _ = writeln!(
                out,
                "     Samples:    {} before, {} after",
                s.sample_counts.before, s.sample_counts.after
            );
        }
        SecurityOutcome::InsufficientData {
            security_name,
            symbol,
            reason,
        } => {
            let detail = match reason {
                InsufficientReason::ProviderError { message } => format!("provider error: {message}"),
                other => other.code().replace('_', " "),
            };
            let _ = writeln!(out, "   {security_name} ({symbol}): insufficient data, {detail}");
        }
    }
}

/// Write `analysis_report.txt` into `dir`.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_text_report(report: &RunReport, dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(dir).await?;
    let path = dir.join("analysis_report.txt");
    fs::write(&path, render(report)).await?;
    info!(path = %path.display(), "Wrote text report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ClassificationResult, ImpactAnalysis, PriceWindowStats, RunSummary, SampleCounts,
        WindowExtrema,
    };
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::BTreeMap;

    fn report() -> RunReport {
        let at = NaiveDateTime::parse_from_str("2024-01-15 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        RunReport {
            captured: Vec::new(),
            classifications: vec![ClassificationResult {
                topic: "AI芯片突破".into(),
                timestamp: at,
                sector: "科技".into(),
                confidence: 0.5,
                related_securities: vec!["腾讯".into()],
                sector_leaders: vec!["腾讯".into()],
                has_material_impact: true,
            }],
            impacts: vec![AnalysisOutcome::Analyzed(ImpactAnalysis {
                topic: "AI芯片突破".into(),
                timestamp: at,
                sector: "科技".into(),
                window_start: NaiveDate::from_ymd_opt(2023, 12, 16).unwrap(),
                window_end: NaiveDate::from_ymd_opt(2024, 2, 14).unwrap(),
                securities: vec![
                    SecurityOutcome::Measured(PriceWindowStats {
                        security_name: "腾讯".into(),
                        symbol: "00700.HK".into(),
                        avg_price_before: 100.25,
                        avg_price_after: 116.25,
                        pct_change: 15.960099750623442,
                        volatility_before: 1.7036,
                        volatility_after: 2.9,
                        extrema: WindowExtrema {
                            min_before: 98.0,
                            max_before: 102.0,
                            min_after: 112.0,
                            max_after: 120.0,
                        },
                        sample_counts: SampleCounts { before: 4, after: 4 },
                    }),
                    SecurityOutcome::InsufficientData {
                        security_name: "百度".into(),
                        symbol: "09888.HK".into(),
                        reason: InsufficientReason::EmptyAfterWindow,
                    },
                ],
                unresolved: Vec::new(),
            })],
            failures: Vec::new(),
            summary: RunSummary {
                analysis_time: at,
                total_topics_analyzed: 1,
                impactful_topics: 1,
                impact_rate: 100.0,
                sector_distribution: BTreeMap::from([("科技".to_string(), 1)]),
                price_analyses_count: 1,
                days_before: 30,
                days_after: 30,
            },
        }
    }

    #[test]
    fn test_render_contains_rounded_statistics() {
        let text = render(&report());
        assert!(text.contains("Impact rate:          100.00%"));
        assert!(text.contains("科技: 1 topic(s)"));
        assert!(text.contains("Change:     +15.96%"));
        assert!(text.contains("Avg close:  100.25 -> 116.25"));
        assert!(text.contains("百度 (09888.HK): insufficient data, empty after window"));
        assert!(!text.contains("Failed topics"));
    }

    #[tokio::test]
    async fn test_write_text_report() {
        let dir = std::env::temp_dir().join(format!("hotsearch_report_{}", std::process::id()));
        let path = write_text_report(&report(), &dir).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("Hot-search market impact report"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
