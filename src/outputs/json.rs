//! JSON output for a run.
//!
//! Each part of the [`RunReport`] goes to its own pretty-printed file so that
//! downstream tools can pick up only what they need. Field names follow the
//! model structs exactly.

use crate::models::RunReport;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

async fn write_json<T: Serialize + ?Sized>(
    dir: &Path,
    name: &str,
    value: &T,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON file");
    Ok(path)
}

/// Write the JSON files for `report` into `dir`, creating it if needed.
///
/// # Returns
///
/// The paths written, in write order.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_report(report: &RunReport, dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(dir).await {
        error!(error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let mut written = Vec::new();
    if !report.captured.is_empty() {
        written.push(write_json(dir, "hot_searches.json", &report.captured).await?);
    }
    written.push(write_json(dir, "classifications.json", &report.classifications).await?);
    if !report.impacts.is_empty() {
        written.push(write_json(dir, "price_analyses.json", &report.impacts).await?);
    }
    if !report.failures.is_empty() {
        written.push(write_json(dir, "failures.json", &report.failures).await?);
    }
    written.push(write_json(dir, "summary_report.json", &report.summary).await?);

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationResult, RunSummary};
    use chrono::NaiveDateTime;
    use std::collections::BTreeMap;

    fn report() -> RunReport {
        let at = NaiveDateTime::parse_from_str("2024-01-15 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        RunReport {
            captured: Vec::new(),
            classifications: vec![ClassificationResult {
                topic: "今天天气不错".into(),
                timestamp: at,
                sector: "unclassified".into(),
                confidence: 0.0,
                related_securities: Vec::new(),
                sector_leaders: Vec::new(),
                has_material_impact: false,
            }],
            impacts: Vec::new(),
            failures: Vec::new(),
            summary: RunSummary {
                analysis_time: at,
                total_topics_analyzed: 1,
                impactful_topics: 0,
                impact_rate: 0.0,
                sector_distribution: BTreeMap::from([("unclassified".to_string(), 1)]),
                price_analyses_count: 0,
                days_before: 30,
                days_after: 30,
            },
        }
    }

    #[tokio::test]
    async fn test_write_report_skips_empty_parts() {
        let dir = std::env::temp_dir().join(format!("hotsearch_json_{}", std::process::id()));
        let written = write_report(&report(), &dir).await.unwrap();

        let names: Vec<_> = written
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["classifications.json", "summary_report.json"]);

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("summary_report.json")).unwrap())
                .unwrap();
        assert_eq!(summary["sector_distribution"]["unclassified"], 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
