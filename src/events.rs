//! Structured pipeline events and the sinks that receive them.
//!
//! Every component reports what it did through an injected [`EventSink`]
//! rather than through module-level loggers. The production sink,
//! [`TracingSink`], turns each event into a `tracing` record carrying an
//! `event_kind` field, so the usual subscriber setup in `main` decides where
//! it ends up. Tests swap in a recording sink to assert on what happened.
//!
//! # Events
//!
//! | Event Kind | Emitted by | Description |
//! |------------|------------|-------------|
//! | `fetch.attempt` | fetcher | One request attempt with its delay and outcome |
//! | `fetch.failed` | fetcher | All attempts used; carries the failure reason |
//! | `extract.strategy_matched` | extraction | First strategy with matches |
//! | `extract.empty` | extraction | No strategy or list produced items |
//! | `extract.item_skipped` | extraction | One malformed item was dropped |
//! | `classify.completed` | pipeline | Sector and confidence for a topic |
//! | `analyze.unresolved_security` | analyzer | Leader name without a symbol |
//! | `analyze.insufficient_data` | analyzer | One security could not be measured |
//! | `topic.failed` | pipeline | Per-topic failure; the run continues |

use std::time::Duration;
use tracing::{debug, info, warn};

/// How one fetch attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success { bytes: usize },
    Transport { message: String },
    HttpStatus { status: u16 },
    Blocked { bytes: usize },
}

impl AttemptOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            AttemptOutcome::Success { .. } => "success",
            AttemptOutcome::Transport { .. } => "transport",
            AttemptOutcome::HttpStatus { .. } => "http_status",
            AttemptOutcome::Blocked { .. } => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    FetchAttempt {
        attempt: u32,
        max_attempts: u32,
        endpoint: String,
        identity: usize,
        delay: Duration,
        outcome: AttemptOutcome,
    },
    FetchFailed {
        reason: &'static str,
        attempts: u32,
    },
    StrategyMatched {
        strategy: &'static str,
        matches: usize,
    },
    ExtractionEmpty {
        document: &'static str,
    },
    ItemSkipped {
        list: &'static str,
        index: usize,
        reason: String,
    },
    TopicClassified {
        topic: String,
        sector: String,
        confidence: f64,
        impactful: bool,
    },
    SecurityUnresolved {
        topic: String,
        name: String,
    },
    InsufficientData {
        topic: String,
        symbol: String,
        reason: &'static str,
    },
    TopicFailed {
        topic: String,
        stage: &'static str,
        reason: String,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::FetchAttempt { .. } => "fetch.attempt",
            PipelineEvent::FetchFailed { .. } => "fetch.failed",
            PipelineEvent::StrategyMatched { .. } => "extract.strategy_matched",
            PipelineEvent::ExtractionEmpty { .. } => "extract.empty",
            PipelineEvent::ItemSkipped { .. } => "extract.item_skipped",
            PipelineEvent::TopicClassified { .. } => "classify.completed",
            PipelineEvent::SecurityUnresolved { .. } => "analyze.unresolved_security",
            PipelineEvent::InsufficientData { .. } => "analyze.insufficient_data",
            PipelineEvent::TopicFailed { .. } => "topic.failed",
        }
    }
}

/// Receiver for pipeline events. Shared across workers, so it must be thread-safe.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PipelineEvent) {
        let event_kind = event.kind();
        match event {
            PipelineEvent::FetchAttempt {
                attempt,
                max_attempts,
                endpoint,
                identity,
                delay,
                outcome,
            } => match outcome {
                AttemptOutcome::Success { bytes } => info!(
                    event_kind,
                    attempt,
                    max = max_attempts,
                    %endpoint,
                    identity,
                    delay_ms = delay.as_millis() as u64,
                    bytes,
                    "Fetch attempt succeeded"
                ),
                other => warn!(
                    event_kind,
                    attempt,
                    max = max_attempts,
                    %endpoint,
                    identity,
                    delay_ms = delay.as_millis() as u64,
                    outcome = other.code(),
                    detail = ?other,
                    "Fetch attempt failed"
                ),
            },
            PipelineEvent::FetchFailed { reason, attempts } => {
                warn!(event_kind, reason, attempts, "Fetch exhausted attempts")
            }
            PipelineEvent::StrategyMatched { strategy, matches } => {
                info!(event_kind, strategy, matches, "Extraction strategy matched")
            }
            PipelineEvent::ExtractionEmpty { document } => warn!(
                event_kind,
                document, "No trending items found; selectors may need updating"
            ),
            PipelineEvent::ItemSkipped {
                list,
                index,
                reason,
            } => warn!(event_kind, list, index, %reason, "Skipping malformed item"),
            PipelineEvent::TopicClassified {
                topic,
                sector,
                confidence,
                impactful,
            } => info!(
                event_kind,
                %topic,
                %sector,
                confidence,
                impactful,
                "Topic classified"
            ),
            PipelineEvent::SecurityUnresolved { topic, name } => {
                warn!(event_kind, %topic, %name, "Leader has no known symbol; dropping")
            }
            PipelineEvent::InsufficientData {
                topic,
                symbol,
                reason,
            } => debug!(event_kind, %topic, %symbol, reason, "Insufficient price data"),
            PipelineEvent::TopicFailed {
                topic,
                stage,
                reason,
            } => warn!(event_kind, %topic, stage, %reason, "Topic failed; continuing"),
        }
    }
}

/// Sink that keeps every event in memory, for assertions in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(PipelineEvent::kind).collect()
    }
}

#[cfg(test)]
impl EventSink for MemorySink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        let event = PipelineEvent::FetchFailed {
            reason: "transport",
            attempts: 3,
        };
        assert_eq!(event.kind(), "fetch.failed");
        assert_eq!(
            AttemptOutcome::Blocked { bytes: 10 }.code(),
            "blocked"
        );
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::default();
        sink.emit(PipelineEvent::StrategyMatched {
            strategy: "table_rows",
            matches: 51,
        });
        sink.emit(PipelineEvent::ExtractionEmpty { document: "json" });

        assert_eq!(
            sink.kinds(),
            vec!["extract.strategy_matched", "extract.empty"]
        );
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        let sink = TracingSink;
        sink.emit(PipelineEvent::TopicFailed {
            topic: "x".into(),
            stage: "analyze",
            reason: "window".into(),
        });
        sink.emit(PipelineEvent::FetchAttempt {
            attempt: 1,
            max_attempts: 3,
            endpoint: "http://127.0.0.1:9".into(),
            identity: 0,
            delay: Duration::from_millis(5),
            outcome: AttemptOutcome::Transport {
                message: "refused".into(),
            },
        });
    }
}
