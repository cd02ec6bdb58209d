//! Output writers for a finished run.
//!
//! # Submodules
//!
//! - [`json`]: Serializes the [`RunReport`](crate::models::RunReport) parts to JSON files
//! - [`report`]: Renders a plain-text summary for reading
//!
//! # Output Structure
//!
//! Every run gets its own directory, named after the local time it finished:
//!
//! ```text
//! output_dir/
//! └── 2024-01-15_103000/
//!     ├── hot_searches.json      # captured items (fetch runs only)
//!     ├── classifications.json
//!     ├── price_analyses.json    # only when something was analysed
//!     ├── failures.json          # only when a topic failed
//!     ├── summary_report.json
//!     └── analysis_report.txt
//! ```

pub mod json;
pub mod report;

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Directory for the run that finished at `finished_at`.
pub fn run_dir(output_dir: &str, finished_at: NaiveDateTime) -> PathBuf {
    Path::new(output_dir).join(finished_at.format("%Y-%m-%d_%H%M%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_dir_is_timestamped() {
        let at = NaiveDateTime::parse_from_str("2024-01-15 10:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            run_dir("/tmp/out", at),
            PathBuf::from("/tmp/out/2024-01-15_103000")
        );
    }
}
