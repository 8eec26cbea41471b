//! CSV rendering of the aggregation ledgers and delivery to a download sink.

pub mod sink;


use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{BuddyError, Result};
use crate::store::StoreSnapshot;

pub use sink::{DownloadId, DownloadSink, FileDownloadSink};

pub const REPORT_FILE_PREFIX: &str = "browseBuddy_report_";

/// en-US `toLocaleString` shape, e.g. `5/1/2024, 9:05:00 AM`
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

const WEBSITE_SECTION: &str = "Website Activity Report";
const WEBSITE_HEADER: [&str; 5] = [
    "URL",
    "First Visit",
    "Last Visit",
    "Total Time (minutes)",
    "Number of Visits",
];
const ANALYSES_SECTION: &str = "Content Analyses";
const ANALYSES_HEADER: [&str; 6] = [
    "Timestamp",
    "URL",
    "Type",
    "Risk Level",
    "Harmful Content",
    "Details",
];
const WARNINGS_SECTION: &str = "Content Warnings";
const WARNINGS_HEADER: [&str; 5] = ["Timestamp", "URL", "Type", "Risk Level", "Details"];

/// A rendered report, ready for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReport {
    pub filename: String,
    pub content: String,
}

impl CsvReport {
    /// `data:` URL carrying the document base64-encoded
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:text/csv;base64,{}", STANDARD.encode(&self.content))
    }
}

/// `browseBuddy_report_YYYY-MM-DD.csv`
#[must_use]
pub fn report_filename(date: NaiveDate) -> String {
    format!("{REPORT_FILE_PREFIX}{}.csv", date.format("%Y-%m-%d"))
}

/// Quote a field containing a double quote, comma or line break, doubling
/// inner quotes
#[must_use]
pub fn escape_csv(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

/// Reject strftime strings chrono cannot render
///
/// # Errors
///
/// Returns `BuddyError::Config` naming the bad format
pub fn validate_timestamp_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(BuddyError::Config(format!(
            "Invalid timestamp format: {format}"
        )));
    }
    Ok(())
}

/// Timezone report timestamps are shown in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTimezone {
    Local,
    Fixed(FixedOffset),
}

/// Turns a store snapshot into CSV rows
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    timestamp_format: String,
    timezone: ReportTimezone,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            timezone: ReportTimezone::Local,
        }
    }
}

impl ReportRenderer {
    /// Renderer using `timestamp_format` in the local timezone
    ///
    /// # Errors
    ///
    /// Returns an error if the format is not a valid strftime string
    pub fn new(timestamp_format: &str) -> Result<Self> {
        validate_timestamp_format(timestamp_format)?;
        Ok(Self {
            timestamp_format: timestamp_format.to_string(),
            timezone: ReportTimezone::Local,
        })
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: ReportTimezone) -> Self {
        self.timezone = timezone;
        self
    }

    fn format_timestamp(&self, timestamp: &DateTime<Utc>) -> String {
        match self.timezone {
            ReportTimezone::Local => timestamp
                .with_timezone(&Local)
                .format(&self.timestamp_format)
                .to_string(),
            ReportTimezone::Fixed(offset) => timestamp
                .with_timezone(&offset)
                .format(&self.timestamp_format)
                .to_string(),
        }
    }

    /// All report rows, sections separated by an empty row. The warnings
    /// section is omitted when there are no warnings.
    #[must_use]
    pub fn rows(&self, snapshot: StoreSnapshot<'_>) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = Vec::with_capacity(
            snapshot.visits.len() + snapshot.analyses.len() + snapshot.warnings.len() + 8,
        );

        rows.push(vec![WEBSITE_SECTION.to_string()]);
        rows.push(header(&WEBSITE_HEADER));
        for visit in snapshot.visits {
            rows.push(vec![
                visit.url.clone(),
                self.format_timestamp(&visit.first_visit),
                self.format_timestamp(&visit.last_visit),
                format!("{:.2}", visit.total_minutes()),
                visit.visit_count.to_string(),
            ]);
        }

        rows.push(Vec::new());

        rows.push(vec![ANALYSES_SECTION.to_string()]);
        rows.push(header(&ANALYSES_HEADER));
        for analysis in snapshot.analyses {
            rows.push(vec![
                self.format_timestamp(&analysis.timestamp),
                analysis.url.clone(),
                analysis.content_type.to_string(),
                analysis.risk_level.to_string(),
                String::from(if analysis.harmful_content { "Yes" } else { "No" }),
                analysis.details.clone(),
            ]);
        }

        rows.push(Vec::new());

        if !snapshot.warnings.is_empty() {
            rows.push(vec![WARNINGS_SECTION.to_string()]);
            rows.push(header(&WARNINGS_HEADER));
            for warning in snapshot.warnings {
                rows.push(vec![
                    self.format_timestamp(&warning.timestamp),
                    warning.url.clone(),
                    warning.content_type.to_string(),
                    warning.risk_level.to_string(),
                    warning.details.clone(),
                ]);
            }
        }

        rows
    }

    /// Render the full document, named after `date`
    #[must_use]
    pub fn render(&self, snapshot: StoreSnapshot<'_>, date: NaiveDate) -> CsvReport {
        let content = self
            .rows(snapshot)
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| escape_csv(cell))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("\n");

        CsvReport {
            filename: report_filename(date),
            content,
        }
    }
}

fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(ToString::to_string).collect()
}

/// Result of a delivered report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    pub filename: String,
    pub download_id: DownloadId,
}

/// Held while a report is being produced; dropping it re-enables requests
/// on every exit path.
struct ReportGuard {
    busy: Arc<AtomicBool>,
}

impl ReportGuard {
    fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { busy: busy.clone() })
    }
}

impl Drop for ReportGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Renders reports and hands them to a [`DownloadSink`]
pub struct ReportGenerator {
    renderer: ReportRenderer,
    sink: Arc<dyn DownloadSink>,
    prompt_for_location: bool,
    busy: Arc<AtomicBool>,
}

impl ReportGenerator {
    #[must_use]
    pub fn new(renderer: ReportRenderer, sink: Arc<dyn DownloadSink>) -> Self {
        Self {
            renderer,
            sink,
            prompt_for_location: true,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_prompt_for_location(mut self, prompt: bool) -> Self {
        self.prompt_for_location = prompt;
        self
    }

    #[must_use]
    pub fn renderer(&self) -> &ReportRenderer {
        &self.renderer
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Render today's report and save it through the sink
    ///
    /// # Errors
    ///
    /// `ReportBusy` while another report is in flight, `Download` when the
    /// sink fails. The store is never modified.
    pub async fn generate_and_save(&self, snapshot: StoreSnapshot<'_>) -> Result<ReportOutcome> {
        let _guard = ReportGuard::acquire(&self.busy).ok_or(BuddyError::ReportBusy)?;

        log::info!(
            "Generating report with {} websites, {} analyses, {} warnings",
            snapshot.visits.len(),
            snapshot.analyses.len(),
            snapshot.warnings.len()
        );

        let report = self.renderer.render(snapshot, Utc::now().date_naive());
        self.save(&report).await
    }

    /// Save an already rendered report
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Download` when the sink fails
    pub async fn save(&self, report: &CsvReport) -> Result<ReportOutcome> {
        match self
            .sink
            .save(
                report.content.as_bytes(),
                &report.filename,
                self.prompt_for_location,
            )
            .await
        {
            Ok(download_id) => {
                log::info!("Report {} saved (download {download_id})", report.filename);
                Ok(ReportOutcome {
                    filename: report.filename.clone(),
                    download_id,
                })
            }
            Err(e) => {
                log::error!("Download failed: {e:#}");
                Err(BuddyError::Download(format!("{e:#}")))
            }
        }
    }
}
