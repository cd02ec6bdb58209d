//! Lexical topic classification.
//!
//! A topic is scored against every sector by counting how many distinct
//! keywords of that sector occur in the title (case-insensitive substring
//! match). The highest count wins and equal counts go to the sector that was
//! registered first. Confidence is the share of the winner's vocabulary that
//! matched, so sectors with long keyword lists need more hits to look
//! confident. No semantics are involved.

use crate::models::{ClassificationResult, MATERIAL_IMPACT_THRESHOLD, UNCLASSIFIED_SECTOR};
use crate::reference::ReferenceData;
use chrono::NaiveDateTime;
use tracing::debug;

/// Keyword classifier over a read-only reference dataset.
#[derive(Debug, Clone, Copy)]
pub struct TopicClassifier<'a> {
    reference: &'a ReferenceData,
}

impl<'a> TopicClassifier<'a> {
    pub fn new(reference: &'a ReferenceData) -> Self {
        Self { reference }
    }

    /// Best-matching sector and confidence for a title.
    ///
    /// Returns [`UNCLASSIFIED_SECTOR`] with confidence `0.0` when nothing matches.
    pub fn classify(&self, title: &str) -> (String, f64) {
        let title_lower = title.to_lowercase();
        let mut best: Option<(&str, usize, usize)> = None;

        for profile in self.reference.sectors() {
            let count = profile
                .keywords
                .iter()
                .filter(|k| title_lower.contains(&k.to_lowercase()))
                .count();
            if count == 0 {
                continue;
            }
            // strictly greater: earlier sectors keep ties
            if best.is_none_or(|(_, best_count, _)| count > best_count) {
                best = Some((&profile.sector_name, count, profile.keywords.len()));
            }
        }

        match best {
            Some((sector, count, vocabulary)) => {
                let confidence = (count as f64 / vocabulary as f64).min(1.0);
                debug!(%title, %sector, count, vocabulary, confidence, "Classified topic");
                (sector.to_string(), confidence)
            }
            None => (UNCLASSIFIED_SECTOR.to_string(), 0.0),
        }
    }

    /// Full classification record for a topic observed at `timestamp`.
    pub fn classify_topic(&self, topic: &str, timestamp: NaiveDateTime) -> ClassificationResult {
        let (sector, confidence) = self.classify(topic);
        let sector_leaders = self.reference.leaders(&sector).to_vec();
        let related_securities = sector_leaders.clone();
        let has_material_impact =
            confidence > MATERIAL_IMPACT_THRESHOLD && !related_securities.is_empty();

        ClassificationResult {
            topic: topic.to_string(),
            timestamp,
            sector,
            confidence,
            related_securities,
            sector_leaders,
            has_material_impact,
        }
    }
}
