pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{get_data_dir, BuddyConfig, MonitorConfig, ReportConfig};
pub use error::{BuddyError, Result};
pub use events::{Event, EventHandler, EventResponse, EventSender};
pub use models::{ContentAnalysis, ContentType, ContentWarning, RiskLevel, WebsiteVisit};
pub use report::{
    CsvReport, DownloadId, DownloadSink, FileDownloadSink, ReportGenerator, ReportOutcome,
    ReportRenderer, ReportTimezone,
};
pub use scheduler::{
    AnalysisScheduler, MonitorExit, PageContent, PageMonitor, SchedulerState, TickOutcome,
    Visibility,
};
pub use session::{AnalyzerSession, SessionStatus};
pub use store::{AggregationStore, StoreSnapshot};
