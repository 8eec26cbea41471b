//! Helper utility functions for CLI commands

use anyhow::{bail, Context, Result};
use buddy_core::{
    AggregationStore, BuddyConfig, EventHandler, FileDownloadSink, ReportGenerator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{Table, Tabled};

const URL_COLUMN_WIDTH: usize = 60;
const DETAILS_COLUMN_WIDTH: usize = 50;

/// Truncate to `max_chars` characters (not bytes), marking the cut with `...`
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Page text from `--text` or `--file`
pub fn read_page_text(text: Option<String>, file: Option<&Path>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page text from {}", path.display())),
        (None, None) => bail!("Either --text or --file is required"),
    }
}

/// Report directory: `--output` wins over the config file
pub fn report_dir(config: &BuddyConfig, output: Option<PathBuf>) -> Result<PathBuf> {
    match output {
        Some(dir) => Ok(dir),
        None => config.output_dir(),
    }
}

/// Event handler saving reports into `dir`
pub fn build_handler(config: &BuddyConfig, dir: &Path) -> Result<EventHandler> {
    let generator = ReportGenerator::new(
        config.renderer()?,
        Arc::new(FileDownloadSink::new(dir)),
    )
    .with_prompt_for_location(config.report.prompt_for_location);
    Ok(EventHandler::new(generator))
}

#[derive(Tabled)]
struct VisitRow {
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Visits")]
    visits: u32,
    #[tabled(rename = "Time (minutes)")]
    minutes: String,
}

#[derive(Tabled)]
struct AnalysisRow {
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Type")]
    content_type: String,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "Harmful")]
    harmful: &'static str,
    #[tabled(rename = "Details")]
    details: String,
}

/// Print the visit and analysis ledgers as tables
pub fn print_summary(store: &AggregationStore) {
    let snapshot = store.snapshot();

    let visits: Vec<VisitRow> = snapshot
        .visits
        .iter()
        .map(|v| VisitRow {
            url: truncate_str(&v.url, URL_COLUMN_WIDTH),
            visits: v.visit_count,
            minutes: format!("{:.2}", v.total_minutes()),
        })
        .collect();
    println!("\nWebsites ({}):", visits.len());
    println!("{}", Table::new(visits));

    if snapshot.analyses.is_empty() {
        println!("\nNo content analyses recorded.");
        return;
    }

    let analyses: Vec<AnalysisRow> = snapshot
        .analyses
        .iter()
        .map(|a| AnalysisRow {
            url: truncate_str(&a.url, URL_COLUMN_WIDTH),
            content_type: a.content_type.to_string(),
            risk: a.risk_level.to_string(),
            harmful: if a.harmful_content { "Yes" } else { "No" },
            details: truncate_str(&a.details, DETAILS_COLUMN_WIDTH),
        })
        .collect();
    println!("\nContent analyses ({}):", analyses.len());
    println!("{}", Table::new(analyses));
    println!("Warnings: {}", snapshot.warnings.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_short() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_str_exact() {
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_str_long() {
        assert_eq!(truncate_str("hello world", 5), "hello...");
    }

    #[test]
    fn test_read_page_text_prefers_inline_text() {
        let text = read_page_text(Some(String::from("inline")), None).unwrap();
        assert_eq!(text, "inline");
    }

    #[test]
    fn test_read_page_text_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        std::fs::write(&path, "from file").unwrap();

        assert_eq!(read_page_text(None, Some(&path)).unwrap(), "from file");
        assert!(read_page_text(None, Some(&dir.path().join("missing.txt"))).is_err());
        assert!(read_page_text(None, None).is_err());
    }

    #[test]
    fn test_report_dir_override() {
        let config = BuddyConfig::default();
        let dir = report_dir(&config, Some(PathBuf::from("/tmp/out"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/out"));
    }
}
