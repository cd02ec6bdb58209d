//! Side-bar hot-search API extraction.
//!
//! The API wraps two lists in a `data` envelope:
//!
//! ```json
//! {"ok": 1, "data": {
//!   "realtime": [{"word": "...", "num": 123, "realpos": 1, "word_scheme": "#...#"}],
//!   "hotgovs":  [{"word": "...", "pos": 1}]
//! }}
//! ```
//!
//! A missing or non-list sub-list counts as zero items. Government entries
//! carry no popularity number, so their heat is the label `政府`.
//!
//! The backup endpoints (`statuses/hot_band`, the mobile container API) may
//! instead answer with a flat list, ranked by position:
//!
//! ```json
//! {"ok": 1, "data": [{"word": "...", "url": "...", "hot": 123}, {"title": "..."}]}
//! ```

use super::{Candidate, RawItem};
use crate::error::ItemError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

const GOVERNMENT_HEAT: &str = "政府";

#[derive(Debug, Deserialize)]
struct RealtimeEntry {
    word: Option<String>,
    note: Option<String>,
    num: Option<Value>,
    word_scheme: Option<String>,
    realpos: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GovernmentEntry {
    word: Option<String>,
    name: Option<String>,
    word_scheme: Option<String>,
    pos: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    word: Option<String>,
    title: Option<String>,
    url: Option<String>,
    hot: Option<Value>,
}

/// Candidates from `data.realtime` followed by `data.hotgovs`, or from a
/// flat `data` list.
pub fn candidates(body: &str, site_origin: &Url) -> Vec<Candidate> {
    let root: Value = match serde_json::from_str(body) {
        Ok(root) => root,
        Err(e) => {
            warn!(error = %e, "Response is not JSON");
            return Vec::new();
        }
    };

    if let Some(flat) = root.pointer("/data").and_then(Value::as_array) {
        debug!(entries = flat.len(), "Found flat hot-search list");
        return flat
            .iter()
            .enumerate()
            .map(|(index, entry)| Candidate {
                source: "data",
                index,
                parsed: flat_item(entry, site_origin),
            })
            .collect();
    }

    let realtime = list(&root, "/data/realtime");
    let hotgovs = list(&root, "/data/hotgovs");
    debug!(realtime = realtime.len(), hotgovs = hotgovs.len(), "Found hot-search lists");

    let realtime = realtime.iter().enumerate().map(|(index, entry)| Candidate {
        source: "realtime",
        index,
        parsed: realtime_item(entry, site_origin),
    });
    let hotgovs = hotgovs.iter().enumerate().map(|(index, entry)| Candidate {
        source: "hotgovs",
        index,
        parsed: government_item(entry, site_origin),
    });
    realtime.chain(hotgovs).collect()
}

fn list<'a>(root: &'a Value, pointer: &str) -> &'a [Value] {
    root.pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn realtime_item(entry: &Value, site_origin: &Url) -> Result<RawItem, ItemError> {
    let entry: RealtimeEntry =
        serde_json::from_value(entry.clone()).map_err(|e| ItemError::Malformed(e.to_string()))?;
    let title = entry.word.or(entry.note).ok_or(ItemError::MissingTitle)?;
    let heat_value = entry.num.map(heat_text);

    Ok(RawItem {
        link: Some(search_link(site_origin, entry.word_scheme.as_deref(), &title)),
        heat_value,
        rank: entry.realpos.filter(|r| *r > 0),
        title,
    })
}

fn government_item(entry: &Value, site_origin: &Url) -> Result<RawItem, ItemError> {
    let entry: GovernmentEntry =
        serde_json::from_value(entry.clone()).map_err(|e| ItemError::Malformed(e.to_string()))?;
    let title = entry.word.or(entry.name).ok_or(ItemError::MissingTitle)?;

    Ok(RawItem {
        link: Some(search_link(site_origin, entry.word_scheme.as_deref(), &title)),
        heat_value: Some(GOVERNMENT_HEAT.to_string()),
        rank: entry.pos.filter(|r| *r > 0),
        title,
    })
}

fn flat_item(entry: &Value, site_origin: &Url) -> Result<RawItem, ItemError> {
    let entry: FlatEntry =
        serde_json::from_value(entry.clone()).map_err(|e| ItemError::Malformed(e.to_string()))?;
    let title = entry.word.or(entry.title).ok_or(ItemError::MissingTitle)?;
    let link = entry
        .url
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| search_link(site_origin, None, &title));

    Ok(RawItem {
        link: Some(link),
        heat_value: entry.hot.map(heat_text),
        rank: None,
        title,
    })
}

fn heat_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Topic search page, `{origin}/weibo?q=<scheme>`. The scheme defaults to `#title#`.
fn search_link(site_origin: &Url, word_scheme: Option<&str>, title: &str) -> String {
    let scheme = match word_scheme {
        Some(scheme) if !scheme.trim().is_empty() => scheme.to_string(),
        _ => format!("#{}#", title.trim()),
    };
    format!(
        "{}/weibo?q={}",
        site_origin.as_str().trim_end_matches('/'),
        urlencoding::encode(&scheme)
    )
}
