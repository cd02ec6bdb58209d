//! Turning raw documents into ranked [`TrendingItem`]s.
//!
//! Two document kinds are understood:
//!
//! | Kind | Module | Where items come from |
//! |------|--------|-----------------------|
//! | HTML | [`html`] | Ordered fallback strategies over the hot-search page |
//! | JSON | [`json`] | `data.realtime` and `data.hotgovs` of the side-bar API, or a flat `data` list |
//!
//! Both produce [`Candidate`]s, which are normalized here: titles are
//! trimmed, relative links resolved against the site origin, ranks taken from
//! the source or from position, and every item is stamped with the capture
//! time. Only the first `max_items` well-formed items are kept.
//!
//! A candidate that cannot be normalized is skipped with an
//! `extract.item_skipped` event. An empty result is not an error; the
//! orchestrator decides what it means for the run.

pub mod html;
pub mod json;

use crate::error::{ConfigError, ItemError};
use crate::events::{EventSink, PipelineEvent};
use crate::fetch::RawDocument;
use crate::models::TrendingItem;
use crate::utils::truncate_for_log;
use chrono::{Local, NaiveDateTime};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

/// Format of a fetched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Html,
    Json,
}

impl DocumentKind {
    /// `Accept` header sent when requesting this kind of document.
    pub fn accept_header(self) -> &'static str {
        match self {
            DocumentKind::Html => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
            }
            DocumentKind::Json => "application/json, text/plain, */*",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Html => "html",
            DocumentKind::Json => "json",
        }
    }
}

/// Fields pulled out of one matched element or entry, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub title: String,
    /// Link as found in the source; may be relative.
    pub link: Option<String>,
    pub heat_value: Option<String>,
    /// Rank given explicitly by the source, if any.
    pub rank: Option<u32>,
}

/// One matched element together with where it came from.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Strategy or list that produced the match.
    pub source: &'static str,
    /// 0-based position within that source.
    pub index: usize,
    pub parsed: Result<RawItem, ItemError>,
}

/// Normalizes candidates from either document kind.
pub struct Extractor {
    site_origin: Url,
    max_items: usize,
    sink: Arc<dyn EventSink>,
}

impl Extractor {
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `site_origin` is not an absolute URL.
    pub fn new(
        site_origin: &str,
        max_items: usize,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        let site_origin = Url::parse(site_origin)
            .map_err(|e| ConfigError::Invalid(format!("site_origin {site_origin}: {e}")))?;
        Ok(Self {
            site_origin,
            max_items,
            sink,
        })
    }

    /// Extract items from a fetched document.
    pub fn extract(&self, document: &RawDocument) -> Vec<TrendingItem> {
        self.extract_body(&document.body, document.kind)
    }

    /// Extract items from a document body of the given kind.
    ///
    /// Always returns a fresh sequence; the same body can be extracted again.
    #[instrument(level = "info", skip_all, fields(kind = kind.as_str(), bytes = body.len()))]
    pub fn extract_body(&self, body: &str, kind: DocumentKind) -> Vec<TrendingItem> {
        let candidates = match kind {
            DocumentKind::Html => html::candidates(body, self.sink.as_ref()),
            DocumentKind::Json => json::candidates(body, &self.site_origin),
        };

        let items = self.normalize(candidates, Local::now().naive_local());
        if items.is_empty() {
            debug!(preview = %truncate_for_log(body, 300), "Document held no usable items");
            self.sink.emit(PipelineEvent::ExtractionEmpty {
                document: kind.as_str(),
            });
        } else {
            info!(count = items.len(), "Extracted trending items");
        }
        items
    }

    fn normalize(&self, candidates: Vec<Candidate>, captured_at: NaiveDateTime) -> Vec<TrendingItem> {
        let mut items = Vec::new();
        for candidate in candidates {
            if items.len() >= self.max_items {
                break;
            }
            let raw = candidate.parsed.and_then(|raw| {
                let title = raw.title.trim();
                if title.is_empty() {
                    Err(ItemError::EmptyTitle)
                } else {
                    Ok(RawItem {
                        title: title.to_string(),
                        ..raw
                    })
                }
            });
            match raw {
                Ok(raw) => items.push(TrendingItem {
                    rank: raw.rank.unwrap_or(candidate.index as u32 + 1),
                    title: raw.title,
                    link: raw.link.as_deref().and_then(|href| self.resolve_link(href)),
                    heat_value: raw
                        .heat_value
                        .map(|h| h.trim().to_string())
                        .filter(|h| !h.is_empty()),
                    captured_at,
                }),
                Err(reason) => self.sink.emit(PipelineEvent::ItemSkipped {
                    list: candidate.source,
                    index: candidate.index,
                    reason: reason.to_string(),
                }),
            }
        }

        if !ranks_are_consistent(&items) {
            debug!(count = items.len(), "Source ranks collide or go backwards; renumbering by position");
            for (i, item) in items.iter_mut().enumerate() {
                item.rank = i as u32 + 1;
            }
        }
        items
    }

    /// Absolute http(s) URL for `href`, resolved against the site origin.
    fn resolve_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let resolved = self.site_origin.join(href).ok()?;
        matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
    }
}

/// Ranks must be positive, unique and follow capture order.
fn ranks_are_consistent(items: &[TrendingItem]) -> bool {
    items.first().is_none_or(|first| first.rank > 0)
        && items.iter().tuple_windows().all(|(a, b)| a.rank < b.rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;

    pub(crate) fn extractor(max_items: usize) -> (Extractor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let extractor = Extractor::new("https://s.weibo.com", max_items, sink.clone()).unwrap();
        (extractor, sink)
    }

    fn candidate(index: usize, title: &str, rank: Option<u32>) -> Candidate {
        Candidate {
            source: "test",
            index,
            parsed: Ok(RawItem {
                title: title.to_string(),
                rank,
                ..RawItem::default()
            }),
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-01-15 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_titles_are_trimmed_and_empty_ones_skipped() {
        let (extractor, sink) = extractor(50);
        let items = extractor.normalize(
            vec![
                candidate(0, "  新能源汽车销量创新高 \n", None),
                candidate(1, "   ", None),
                candidate(2, "房地产政策调整", None),
            ],
            now(),
        );

        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["新能源汽车销量创新高", "房地产政策调整"]);
        assert_eq!(items[1].rank, 3);
        assert!(items.iter().all(|i| i.captured_at == now()));
        assert_eq!(sink.kinds(), vec!["extract.item_skipped"]);
    }

    #[test]
    fn test_duplicate_ranks_are_renumbered() {
        let (extractor, _) = extractor(50);
        let items = extractor.normalize(
            vec![
                candidate(0, "a", Some(1)),
                candidate(1, "b", Some(2)),
                candidate(0, "c", Some(1)),
            ],
            now(),
        );
        let ranks: Vec<_> = items.iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_explicit_ranks_kept_when_consistent() {
        let (extractor, _) = extractor(50);
        let items = extractor.normalize(
            vec![candidate(0, "a", Some(2)), candidate(1, "b", Some(5))],
            now(),
        );
        let ranks: Vec<_> = items.iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![2, 5]);
    }

    #[test]
    fn test_cap_applies_to_well_formed_items() {
        let (extractor, _) = extractor(50);
        let candidates = (0..80).map(|i| candidate(i, &format!("话题{i}"), None)).collect();
        let items = extractor.normalize(candidates, now());
        assert_eq!(items.len(), 50);
        assert_eq!(items.last().map(|i| i.rank), Some(50));
    }

    #[test]
    fn test_link_resolution() {
        let (extractor, _) = extractor(50);
        assert_eq!(
            extractor.resolve_link("/weibo?q=%23AI%23").as_deref(),
            Some("https://s.weibo.com/weibo?q=%23AI%23")
        );
        assert_eq!(
            extractor.resolve_link("https://weibo.com/x").as_deref(),
            Some("https://weibo.com/x")
        );
        assert_eq!(extractor.resolve_link("javascript:void(0);"), None);
        assert_eq!(extractor.resolve_link(""), None);
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        let sink = Arc::new(MemorySink::default());
        assert!(Extractor::new("not a url", 50, sink).is_err());
    }

    #[test]
    fn test_accept_headers_differ_by_kind() {
        assert!(DocumentKind::Html.accept_header().starts_with("text/html"));
        assert!(DocumentKind::Json.accept_header().starts_with("application/json"));
    }
}
