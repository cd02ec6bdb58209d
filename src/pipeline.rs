//! One run: fetch, extract, classify, analyze, aggregate.
//!
//! ```text
//! FETCH -> EXTRACT -> CLASSIFY x N -> ANALYZE x M impactful -> AGGREGATE
//! ```
//!
//! Fetch and extraction failures end the run with a single [`PipelineError`].
//! Anything that goes wrong for one topic after that is recorded as a
//! [`TopicFailure`] and the remaining topics carry on. The pipeline adds no
//! retries of its own.
//!
//! Impactful topics are analysed through a bounded, order-preserving stream,
//! so results come back in rank order and are collected by this task alone.

use crate::analyzer::ImpactAnalyzer;
use crate::classifier::TopicClassifier;
use crate::error::PipelineError;
use crate::events::{EventSink, PipelineEvent};
use crate::extract::{DocumentKind, Extractor};
use crate::fetch::{Fetcher, Transport};
use crate::models::{
    AnalysisOutcome, ClassificationResult, RunReport, RunSummary, TopicFailure, TrendingItem,
};
use crate::prices::PriceProvider;
use chrono::{Local, NaiveDateTime};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Where to fetch from and how hard to work.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub endpoints: Vec<String>,
    pub kind: DocumentKind,
    /// Topics analysed at the same time; at least one.
    pub concurrency: usize,
}

pub struct Pipeline<'a, T, P> {
    fetcher: Fetcher<T>,
    extractor: Extractor,
    classifier: TopicClassifier<'a>,
    analyzer: ImpactAnalyzer<'a, P>,
    source: SourceOptions,
    sink: Arc<dyn EventSink>,
}

impl<'a, T: Transport, P: PriceProvider> Pipeline<'a, T, P> {
    pub fn new(
        fetcher: Fetcher<T>,
        extractor: Extractor,
        classifier: TopicClassifier<'a>,
        analyzer: ImpactAnalyzer<'a, P>,
        source: SourceOptions,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            classifier,
            analyzer,
            source,
            sink,
        }
    }

    /// Run the whole chain for the top `max_topics` items.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Fetch`] when every fetch attempt failed, and
    /// [`PipelineError::EmptyExtraction`] when the document held no items.
    #[instrument(level = "info", skip(self))]
    pub async fn run(
        &self,
        max_topics: usize,
        days_before: u32,
        days_after: u32,
    ) -> Result<RunReport, PipelineError> {
        let document = self
            .fetcher
            .fetch(&self.source.endpoints, self.source.kind)
            .await?;

        let captured = self.extractor.extract(&document);
        if captured.is_empty() {
            return Err(PipelineError::EmptyExtraction {
                endpoint: document.endpoint,
                attempts: document.attempts,
            });
        }
        info!(
            captured = captured.len(),
            endpoint = %document.endpoint,
            attempts = document.attempts,
            "Captured trending topics"
        );

        let topics: Vec<(String, NaiveDateTime)> = captured
            .iter()
            .take(max_topics)
            .map(|item: &TrendingItem| (item.title.clone(), item.captured_at))
            .collect();
        let mut report = self.process(topics, days_before, days_after).await;
        report.captured = captured;
        Ok(report)
    }

    /// Classify one free-text topic and analyse it if it is impactful.
    ///
    /// Nothing is fetched; the report's `captured` list stays empty.
    #[instrument(level = "info", skip_all, fields(%title, %timestamp))]
    pub async fn analyze_single_topic(
        &self,
        title: &str,
        timestamp: NaiveDateTime,
        days_before: u32,
        days_after: u32,
    ) -> RunReport {
        self.process(vec![(title.to_string(), timestamp)], days_before, days_after)
            .await
    }

    async fn process(
        &self,
        topics: Vec<(String, NaiveDateTime)>,
        days_before: u32,
        days_after: u32,
    ) -> RunReport {
        let classifications: Vec<ClassificationResult> = topics
            .iter()
            .map(|(title, timestamp)| {
                let result = self.classifier.classify_topic(title, *timestamp);
                self.sink.emit(PipelineEvent::TopicClassified {
                    topic: result.topic.clone(),
                    sector: result.sector.clone(),
                    confidence: result.confidence,
                    impactful: result.has_material_impact,
                });
                result
            })
            .collect();

        let impactful: Vec<&ClassificationResult> = classifications
            .iter()
            .filter(|c| c.has_material_impact)
            .collect();
        info!(
            classified = classifications.len(),
            impactful = impactful.len(),
            "Classification complete"
        );

        let results = stream::iter(impactful.iter().copied())
            .map(|c| async move { (c, self.analyzer.analyze(c, days_before, days_after).await) })
            .buffered(self.source.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut impacts = Vec::new();
        let mut failures = Vec::new();
        for (classification, result) in results {
            match result {
                Ok(outcome) => impacts.push(outcome),
                Err(e) => {
                    self.sink.emit(PipelineEvent::TopicFailed {
                        topic: classification.topic.clone(),
                        stage: "analyze",
                        reason: e.to_string(),
                    });
                    failures.push(TopicFailure {
                        topic: classification.topic.clone(),
                        stage: "analyze".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let summary = summarize(&classifications, &impacts, days_before, days_after);
        info!(
            total = summary.total_topics_analyzed,
            impactful = summary.impactful_topics,
            impact_rate = summary.impact_rate,
            price_analyses = summary.price_analyses_count,
            failures = failures.len(),
            "Run complete"
        );

        RunReport {
            captured: Vec::new(),
            classifications,
            impacts,
            failures,
            summary,
        }
    }
}

/// Headline numbers for a set of classifications and their analyses.
pub fn summarize(
    classifications: &[ClassificationResult],
    impacts: &[AnalysisOutcome],
    days_before: u32,
    days_after: u32,
) -> RunSummary {
    let total = classifications.len();
    let impactful = classifications
        .iter()
        .filter(|c| c.has_material_impact)
        .count();
    let impact_rate = if total == 0 {
        0.0
    } else {
        (impactful as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
    };

    let mut sector_distribution = BTreeMap::new();
    for c in classifications {
        *sector_distribution.entry(c.sector.clone()).or_insert(0) += 1;
    }

    let price_analyses_count = impacts
        .iter()
        .filter_map(AnalysisOutcome::analysis)
        .filter(|a| a.measured().next().is_some())
        .count();

    RunSummary {
        analysis_time: Local::now().naive_local(),
        total_topics_analyzed: total,
        impactful_topics: impactful,
        impact_rate,
        sector_distribution,
        price_analyses_count,
        days_before,
        days_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::events::MemorySink;
    use crate::fetch::{FetchSettings, RequestIdentity, TransportResponse};
    use crate::models::PriceBar;
    use crate::prices::fixture::FixtureProvider;
    use crate::reference::{ReferenceData, SectorProfile, SecurityRef};
    use chrono::{Days, NaiveDate};
    use std::collections::HashMap;
    use std::time::Duration;

    /// Answers every request with the same status and body.
    struct StaticTransport {
        status: u16,
        body: String,
    }

    impl Transport for StaticTransport {
        async fn get(
            &self,
            _url: &str,
            _identity: &RequestIdentity,
        ) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn reference() -> ReferenceData {
        ReferenceData::new(
            vec![SectorProfile {
                sector_name: "科技".into(),
                keywords: vec!["AI".into(), "芯片".into()],
                leaders: vec!["腾讯".into()],
            }],
            vec![SecurityRef {
                display_name: "腾讯".into(),
                symbol: "00700.HK".into(),
                sector: "科技".into(),
                sub_sector: None,
            }],
        )
    }

    fn bars_around(day: NaiveDate) -> Vec<PriceBar> {
        (1..=5u64)
            .flat_map(|offset| {
                [
                    (day.checked_sub_days(Days::new(offset)), 100.0),
                    (day.checked_add_days(Days::new(offset)), 110.0),
                ]
            })
            .filter_map(|(date, close)| {
                date.map(|date| PriceBar {
                    date,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 0.0,
                })
            })
            .collect()
    }

    fn settings() -> FetchSettings {
        FetchSettings {
            max_attempts: 2,
            jitter_min: Duration::from_millis(1),
            jitter_max: Duration::from_millis(2),
            max_backoff: Duration::from_millis(2),
            min_body_bytes: 10,
            request_timeout: Duration::from_secs(1),
            user_agents: vec!["agent".into()],
            referer: "https://s.weibo.com/".into(),
        }
    }

    fn pipeline<'a>(
        reference: &'a ReferenceData,
        status: u16,
        body: &str,
        bars: Vec<PriceBar>,
        sink: Arc<MemorySink>,
    ) -> Pipeline<'a, StaticTransport, FixtureProvider> {
        let transport = StaticTransport {
            status,
            body: body.to_string(),
        };
        let provider = FixtureProvider::new(HashMap::from([("00700.HK".to_string(), bars)]));
        Pipeline::new(
            Fetcher::new(transport, settings(), sink.clone()),
            Extractor::new("https://s.weibo.com", 50, sink.clone()).unwrap(),
            TopicClassifier::new(reference),
            ImpactAnalyzer::new(reference, provider, sink.clone()),
            SourceOptions {
                endpoints: vec!["https://weibo.com/ajax/side/hotSearch".into()],
                kind: DocumentKind::Json,
                concurrency: 2,
            },
            sink,
        )
    }

    const HOT_SEARCH: &str = r#"{"ok":1,"data":{"realtime":[
        {"word":"AI芯片突破","num":300,"realpos":1},
        {"word":"今天天气不错","num":200,"realpos":2},
        {"word":"AI聊天机器人","num":100,"realpos":3}
    ]}}"#;

    #[tokio::test]
    async fn test_run_end_to_end() {
        let reference = reference();
        let sink = Arc::new(MemorySink::default());
        let today = Local::now().date_naive();
        let pipeline = pipeline(&reference, 200, HOT_SEARCH, bars_around(today), sink.clone());

        let report = pipeline.run(10, 30, 30).await.unwrap();

        assert_eq!(report.captured.len(), 3);
        assert_eq!(report.classifications.len(), 3);
        assert_eq!(report.impacts.len(), 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.impacts[0].analysis().unwrap().topic, "AI芯片突破");
        assert_eq!(report.impacts[1].analysis().unwrap().topic, "AI聊天机器人");

        let summary = &report.summary;
        assert_eq!(summary.total_topics_analyzed, 3);
        assert_eq!(summary.impactful_topics, 2);
        assert_eq!(summary.impact_rate, 66.67);
        assert_eq!(summary.price_analyses_count, 2);
        assert_eq!(summary.sector_distribution.get("科技"), Some(&2));
        assert_eq!(summary.sector_distribution.get("unclassified"), Some(&1));

        let classified = sink
            .kinds()
            .into_iter()
            .filter(|k| *k == "classify.completed")
            .count();
        assert_eq!(classified, 3);
    }

    #[tokio::test]
    async fn test_max_topics_bounds_classification() {
        let reference = reference();
        let sink = Arc::new(MemorySink::default());
        let pipeline = pipeline(&reference, 200, HOT_SEARCH, Vec::new(), sink);

        let report = pipeline.run(1, 30, 30).await.unwrap();
        assert_eq!(report.captured.len(), 3);
        assert_eq!(report.classifications.len(), 1);
        assert_eq!(report.summary.impact_rate, 100.0);
        // no bars at all: analysed, but nothing measured
        assert_eq!(report.summary.price_analyses_count, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_single_top_level_error() {
        let reference = reference();
        let sink = Arc::new(MemorySink::default());
        let pipeline = pipeline(&reference, 503, "", Vec::new(), sink.clone());

        let err = pipeline.run(10, 30, 30).await.unwrap_err();
        assert_eq!(err.reason(), "http_status");
        assert_eq!(err.attempts(), 2);
        assert!(!sink.kinds().contains(&"classify.completed"));
    }

    #[tokio::test]
    async fn test_empty_extraction_halts_run() {
        let reference = reference();
        let sink = Arc::new(MemorySink::default());
        let pipeline = pipeline(
            &reference,
            200,
            r#"{"ok":1,"data":{"realtime":[]}}"#,
            Vec::new(),
            sink,
        );

        let err = pipeline.run(10, 30, 30).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyExtraction { .. }));
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test]
    async fn test_single_topic_analysis() {
        let reference = reference();
        let sink = Arc::new(MemorySink::default());
        let ts = NaiveDateTime::parse_from_str("2024-01-15 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let pipeline = pipeline(&reference, 200, "", bars_around(ts.date()), sink);

        let report = pipeline.analyze_single_topic("AI芯片突破", ts, 30, 30).await;

        assert!(report.captured.is_empty());
        assert_eq!(report.classifications.len(), 1);
        let analysis = report.impacts[0].analysis().unwrap();
        let stats = analysis.measured().next().unwrap();
        assert_eq!(stats.sample_counts.before, 5);
        assert_eq!(stats.sample_counts.after, 5);
        assert!((stats.pct_change - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_scoped_to_topic() {
        let reference = reference();
        let sink = Arc::new(MemorySink::default());
        let pipeline = pipeline(&reference, 200, "", Vec::new(), sink.clone());

        let report = pipeline
            .analyze_single_topic("AI芯片突破", NaiveDateTime::MAX, 30, 30)
            .await;

        assert!(report.impacts.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, "analyze");
        assert!(sink.kinds().contains(&"topic.failed"));
    }

    #[tokio::test]
    async fn test_price_analyses_count_topics_not_securities() {
        let reference = ReferenceData::new(
            vec![SectorProfile {
                sector_name: "科技".into(),
                keywords: vec!["AI".into(), "芯片".into()],
                leaders: vec!["腾讯".into(), "阿里巴巴".into()],
            }],
            vec![
                SecurityRef {
                    display_name: "腾讯".into(),
                    symbol: "00700.HK".into(),
                    sector: "科技".into(),
                    sub_sector: None,
                },
                SecurityRef {
                    display_name: "阿里巴巴".into(),
                    symbol: "09988.HK".into(),
                    sector: "科技".into(),
                    sub_sector: None,
                },
            ],
        );
        let ts = NaiveDateTime::parse_from_str("2024-01-15 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let provider = FixtureProvider::new(HashMap::from([
            ("00700.HK".to_string(), bars_around(ts.date())),
            ("09988.HK".to_string(), bars_around(ts.date())),
        ]));
        let sink = Arc::new(MemorySink::default());
        let transport = StaticTransport {
            status: 200,
            body: String::new(),
        };
        let pipeline = Pipeline::new(
            Fetcher::new(transport, settings(), sink.clone()),
            Extractor::new("https://s.weibo.com", 50, sink.clone()).unwrap(),
            TopicClassifier::new(&reference),
            ImpactAnalyzer::new(&reference, provider, sink.clone()),
            SourceOptions {
                endpoints: vec!["https://weibo.com/ajax/side/hotSearch".into()],
                kind: DocumentKind::Json,
                concurrency: 2,
            },
            sink,
        );

        let report = pipeline.analyze_single_topic("AI芯片突破", ts, 30, 30).await;

        assert_eq!(report.impacts[0].analysis().unwrap().measured().count(), 2);
        assert_eq!(report.summary.price_analyses_count, 1);
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = summarize(&[], &[], 30, 30);
        assert_eq!(summary.total_topics_analyzed, 0);
        assert_eq!(summary.impact_rate, 0.0);
        assert!(summary.sector_distribution.is_empty());
    }
}
