//! HTML hot-search page extraction.
//!
//! The page layout drifts, so extraction tries an ordered list of strategies
//! and keeps the first one that matches anything. Earlier strategies are more
//! specific to the known layout; later ones are generic fallbacks.
//!
//! | Strategy | Selector | Item shape |
//! |----------|----------|------------|
//! | `table_rows` | `tbody tr` | row |
//! | `ranked_rows` | `tr[data-rank]` | row |
//! | `topic_cells` | `.td-02 a` | anchor |
//! | `search_anchors` | `a[href*="/weibo?q="]` | anchor |
//! | `hot_list_items` | `.hot-list li, .hot-item` | list item |
//! | `generic_rows` | `table tr` | row |
//!
//! A row contributes its first anchor as title and link, the numeric rank
//! cell (`td.td-01` or a `data-rank` attribute) as rank, and the heat span.

use super::{Candidate, RawItem};
use crate::error::ItemError;
use crate::events::{EventSink, PipelineEvent};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

type Strategy = fn(&Html) -> Vec<Candidate>;

/// Strategies in order of preference.
pub const STRATEGIES: &[(&'static str, Strategy)] = &[
    ("table_rows", table_rows),
    ("ranked_rows", ranked_rows),
    ("topic_cells", topic_cells),
    ("search_anchors", search_anchors),
    ("hot_list_items", hot_list_items),
    ("generic_rows", generic_rows),
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

static TBODY_ROW: Lazy<Selector> = Lazy::new(|| selector("tbody tr"));
static RANKED_ROW: Lazy<Selector> = Lazy::new(|| selector("tr[data-rank]"));
static TOPIC_CELL_ANCHOR: Lazy<Selector> = Lazy::new(|| selector(".td-02 a"));
static SEARCH_ANCHOR: Lazy<Selector> = Lazy::new(|| selector(r#"a[href*="/weibo?q="]"#));
static HOT_LIST_ITEM: Lazy<Selector> = Lazy::new(|| selector(".hot-list li, .hot-item"));
static TABLE_ROW: Lazy<Selector> = Lazy::new(|| selector("table tr"));

static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static RANK_CELL: Lazy<Selector> = Lazy::new(|| selector("td.td-01"));
static HEAT: Lazy<Selector> = Lazy::new(|| selector("td.td-02 > span, span.td-03, td.td-03"));

/// Candidates from the first strategy that matches at least one element.
pub fn candidates(body: &str, sink: &dyn EventSink) -> Vec<Candidate> {
    let document = Html::parse_document(body);
    for (name, strategy) in STRATEGIES {
        let found = strategy(&document);
        if found.is_empty() {
            debug!(strategy = name, "Strategy matched nothing");
            continue;
        }
        sink.emit(PipelineEvent::StrategyMatched {
            strategy: *name,
            matches: found.len(),
        });
        return found;
    }
    Vec::new()
}

fn table_rows(document: &Html) -> Vec<Candidate> {
    collect(document, &TBODY_ROW, "table_rows", row_item)
}

fn ranked_rows(document: &Html) -> Vec<Candidate> {
    collect(document, &RANKED_ROW, "ranked_rows", row_item)
}

fn topic_cells(document: &Html) -> Vec<Candidate> {
    collect(document, &TOPIC_CELL_ANCHOR, "topic_cells", anchor_item)
}

fn search_anchors(document: &Html) -> Vec<Candidate> {
    collect(document, &SEARCH_ANCHOR, "search_anchors", anchor_item)
}

fn hot_list_items(document: &Html) -> Vec<Candidate> {
    collect(document, &HOT_LIST_ITEM, "hot_list_items", list_item)
}

fn generic_rows(document: &Html) -> Vec<Candidate> {
    collect(document, &TABLE_ROW, "generic_rows", row_item)
}

fn collect(
    document: &Html,
    selector: &Selector,
    source: &'static str,
    shape: fn(ElementRef) -> Result<RawItem, ItemError>,
) -> Vec<Candidate> {
    document
        .select(selector)
        .enumerate()
        .map(|(index, element)| Candidate {
            source,
            index,
            parsed: shape(element),
        })
        .collect()
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn row_item(row: ElementRef) -> Result<RawItem, ItemError> {
    let anchor = row.select(&ANCHOR).next().ok_or(ItemError::MissingTitle)?;
    let rank = row
        .value()
        .attr("data-rank")
        .and_then(|r| r.trim().parse().ok())
        .or_else(|| {
            row.select(&RANK_CELL)
                .next()
                .and_then(|cell| text_of(cell).parse().ok())
        })
        .filter(|r: &u32| *r > 0);

    Ok(RawItem {
        title: text_of(anchor),
        link: anchor.value().attr("href").map(str::to_string),
        heat_value: row.select(&HEAT).next().map(text_of),
        rank,
    })
}

fn anchor_item(anchor: ElementRef) -> Result<RawItem, ItemError> {
    Ok(RawItem {
        title: text_of(anchor),
        link: anchor.value().attr("href").map(str::to_string),
        ..RawItem::default()
    })
}

fn list_item(item: ElementRef) -> Result<RawItem, ItemError> {
    match item.select(&ANCHOR).next() {
        Some(anchor) => anchor_item(anchor),
        None => Ok(RawItem {
            title: text_of(item),
            ..RawItem::default()
        }),
    }
}
