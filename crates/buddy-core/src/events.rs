//! Inbound page events and the handler task that owns the aggregation store.

use anyhow::{Context, Result};
use buddy_ai::AnalysisPayload;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::BuddyError;
use crate::report::ReportGenerator;
use crate::store::AggregationStore;

/// URL recorded when an event carries none
pub const UNKNOWN_URL: &str = "unknown";

/// Tab status that counts as a finished navigation
pub const TAB_STATUS_COMPLETE: &str = "complete";

const EVENT_CHANNEL_CAPACITY: usize = 64;

const KNOWN_TYPES: [&str; 6] = [
    "PAGE_VISIT",
    "UPDATE_SCREEN_TIME",
    "ADD_CONTENT_ANALYSIS",
    "GENERATE_REPORT",
    "TAB_UPDATED",
    "TAB_ACTIVATED",
];

fn unknown_url() -> String {
    UNKNOWN_URL.to_string()
}

fn url_or_unknown<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(unknown_url))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenTimeData {
    #[serde(default)]
    pub duration: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    #[serde(default)]
    pub analysis: Option<AnalysisPayload>,
}

/// A message from the page or tab layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "PAGE_VISIT")]
    PageVisit {
        #[serde(default = "unknown_url", deserialize_with = "url_or_unknown")]
        url: String,
    },
    #[serde(rename = "UPDATE_SCREEN_TIME")]
    ScreenTimeTick {
        #[serde(default = "unknown_url", deserialize_with = "url_or_unknown")]
        url: String,
        #[serde(default)]
        data: Option<ScreenTimeData>,
    },
    #[serde(rename = "ADD_CONTENT_ANALYSIS")]
    ContentAnalysisResult {
        #[serde(default = "unknown_url", deserialize_with = "url_or_unknown")]
        url: String,
        #[serde(default)]
        data: Option<AnalysisData>,
    },
    #[serde(rename = "GENERATE_REPORT")]
    GenerateReportRequest,
    /// Navigation state change; only a finished load counts as a visit
    #[serde(rename = "TAB_UPDATED")]
    TabUpdated {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
    #[serde(rename = "TAB_ACTIVATED")]
    TabActivated {
        #[serde(default)]
        url: Option<String>,
    },
}

impl Event {
    /// Analysis result event for `url`
    #[must_use]
    pub fn analysis(url: impl Into<String>, payload: AnalysisPayload) -> Self {
        Self::ContentAnalysisResult {
            url: url.into(),
            data: Some(AnalysisData {
                analysis: Some(payload),
            }),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PageVisit { .. } => "PAGE_VISIT",
            Self::ScreenTimeTick { .. } => "UPDATE_SCREEN_TIME",
            Self::ContentAnalysisResult { .. } => "ADD_CONTENT_ANALYSIS",
            Self::GenerateReportRequest => "GENERATE_REPORT",
            Self::TabUpdated { .. } => "TAB_UPDATED",
            Self::TabActivated { .. } => "TAB_ACTIVATED",
        }
    }
}

/// Answer to every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl EventResponse {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
            filename: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            filename: None,
        }
    }
}

/// Milliseconds from a screen-time payload, if it is a non-negative number
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn duration_ms(data: Option<&ScreenTimeData>) -> Option<u64> {
    let duration = data?.duration.as_f64()?;
    (duration.is_finite() && duration >= 0.0).then(|| duration.round() as u64)
}

/// Single owner of the aggregation store. Events are applied one at a time,
/// so the ledgers need no locking.
pub struct EventHandler {
    store: AggregationStore,
    reports: ReportGenerator,
}

impl EventHandler {
    #[must_use]
    pub fn new(reports: ReportGenerator) -> Self {
        Self {
            store: AggregationStore::new(),
            reports,
        }
    }

    #[must_use]
    pub fn store(&self) -> &AggregationStore {
        &self.store
    }

    pub async fn handle(&mut self, event: Event) -> EventResponse {
        log::debug!("Received event {}", event.kind());

        match event {
            Event::PageVisit { url } => {
                self.store.record_visit(&url);
                EventResponse::ok()
            }
            Event::ScreenTimeTick { url, data } => match duration_ms(data.as_ref()) {
                Some(ms) => {
                    self.store.add_screen_time(&url, ms);
                    EventResponse::ok()
                }
                None => {
                    log::warn!("Invalid screen time data for {url}: {data:?}");
                    EventResponse::failure(BuddyError::InvalidInput(String::from(
                        "Invalid duration",
                    )))
                }
            },
            Event::ContentAnalysisResult { url, data } => {
                let payload = data.and_then(|d| d.analysis);
                self.store.record_analysis(payload.as_ref(), &url);
                EventResponse::ok()
            }
            Event::GenerateReportRequest => {
                match self.reports.generate_and_save(self.store.snapshot()).await {
                    Ok(outcome) => EventResponse {
                        filename: Some(outcome.filename),
                        ..EventResponse::ok()
                    },
                    Err(e) => {
                        log::error!("Report generation failed: {e}");
                        EventResponse::failure(e)
                    }
                }
            }
            Event::TabUpdated { url, status } => {
                if let Some(url) = url.filter(|u| !u.is_empty()) {
                    if status.as_deref() == Some(TAB_STATUS_COMPLETE) {
                        self.store.record_visit(&url);
                    }
                }
                EventResponse::ok()
            }
            Event::TabActivated { url } => {
                if let Some(url) = url.filter(|u| !u.is_empty()) {
                    self.store.record_visit(&url);
                }
                EventResponse::ok()
            }
        }
    }

    /// Decode a raw JSON message and handle it
    pub async fn handle_value(&mut self, value: Value) -> EventResponse {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            log::warn!("Unknown message type: {kind:?}");
            return EventResponse::failure("Unknown message type");
        }

        match serde_json::from_value::<Event>(value) {
            Ok(event) => self.handle(event).await,
            Err(e) => {
                log::warn!("Malformed {kind} event: {e}");
                EventResponse::failure(BuddyError::MalformedInput(e.to_string()))
            }
        }
    }

    /// Drain `rx` until every sender is dropped, then hand the handler back
    pub async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) -> Self {
        log::debug!("Event handler started");
        while let Some(Envelope { event, respond_to }) = rx.recv().await {
            let response = self.handle(event).await;
            if respond_to.send(response).is_err() {
                log::debug!("Event sender went away before the response");
            }
        }
        log::debug!("Event handler stopped");
        self
    }
}

/// An event plus the channel its response goes back on
pub struct Envelope {
    pub event: Event,
    pub respond_to: oneshot::Sender<EventResponse>,
}

/// Cloneable handle for submitting events to a running [`EventHandler`]
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Envelope>,
}

impl EventSender {
    /// Submit `event` and wait for its response
    ///
    /// # Errors
    ///
    /// Fails when the handler task has stopped
    pub async fn send(&self, event: Event) -> Result<EventResponse> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send(Envelope { event, respond_to })
            .await
            .map_err(|_| anyhow::anyhow!("event handler is not running"))?;
        response
            .await
            .context("event handler dropped the response")
    }
}

/// Run `handler` on its own task
#[must_use]
pub fn spawn(handler: EventHandler) -> (EventSender, JoinHandle<EventHandler>) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let task = tokio::spawn(handler.run(rx));
    (EventSender { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::null_handler as handler;
    use serde_json::json;

    #[test]
    fn test_decode_wire_names() {
        let event: Event = serde_json::from_value(json!({
            "type": "UPDATE_SCREEN_TIME",
            "url": "https://a.test",
            "data": { "duration": 1500 }
        }))
        .unwrap();
        assert_eq!(
            event,
            Event::ScreenTimeTick {
                url: String::from("https://a.test"),
                data: Some(ScreenTimeData {
                    duration: json!(1500)
                }),
            }
        );

        let event: Event = serde_json::from_value(json!({ "type": "GENERATE_REPORT" })).unwrap();
        assert_eq!(event, Event::GenerateReportRequest);
    }

    #[test]
    fn test_missing_url_defaults_to_unknown() {
        let event: Event = serde_json::from_value(json!({ "type": "PAGE_VISIT" })).unwrap();
        assert_eq!(
            event,
            Event::PageVisit {
                url: String::from(UNKNOWN_URL)
            }
        );

        let event: Event =
            serde_json::from_value(json!({ "type": "PAGE_VISIT", "url": null })).unwrap();
        assert_eq!(event.kind(), "PAGE_VISIT");
    }

    #[test]
    fn test_duration_validation() {
        let data = |v: Value| ScreenTimeData { duration: v };
        assert_eq!(duration_ms(Some(&data(json!(250)))), Some(250));
        assert_eq!(duration_ms(Some(&data(json!(1.6)))), Some(2));
        assert_eq!(duration_ms(Some(&data(json!(-1)))), None);
        assert_eq!(duration_ms(Some(&data(json!("100")))), None);
        assert_eq!(duration_ms(Some(&data(Value::Null))), None);
        assert_eq!(duration_ms(None), None);
    }

    #[tokio::test]
    async fn test_visit_then_screen_time() {
        let mut handler = handler();
        let response = handler
            .handle_value(json!({ "type": "PAGE_VISIT", "url": "https://a.test" }))
            .await;
        assert!(response.success);
        let response = handler
            .handle_value(json!({
                "type": "UPDATE_SCREEN_TIME",
                "url": "https://a.test",
                "data": { "duration": 60000 }
            }))
            .await;
        assert!(response.success);
        assert_eq!(
            handler.store().visit("https://a.test").unwrap().total_time_ms,
            60_000
        );
    }

    #[tokio::test]
    async fn test_invalid_duration_is_rejected() {
        let mut handler = handler();
        let response = handler
            .handle_value(json!({
                "type": "UPDATE_SCREEN_TIME",
                "url": "https://a.test",
                "data": { "duration": "soon" }
            }))
            .await;
        assert_eq!(response, EventResponse::failure("Invalid duration"));
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let mut handler = handler();
        let response = handler.handle_value(json!({ "type": "PING" })).await;
        assert_eq!(response.error.as_deref(), Some("Unknown message type"));

        let response = handler.handle_value(json!({ "url": "https://a.test" })).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_malformed_known_event() {
        let mut handler = handler();
        let response = handler
            .handle_value(json!({ "type": "PAGE_VISIT", "url": 42 }))
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("Malformed input"));
        assert!(handler.store().is_empty());
    }

    #[tokio::test]
    async fn test_empty_analysis_is_acknowledged_but_dropped() {
        let mut handler = handler();
        let response = handler
            .handle_value(json!({ "type": "ADD_CONTENT_ANALYSIS", "url": "https://a.test" }))
            .await;
        assert!(response.success);
        assert!(handler.store().snapshot().analyses.is_empty());
    }

    #[tokio::test]
    async fn test_mistyped_analysis_fields_still_record() {
        let mut handler = handler();
        let response = handler
            .handle_value(json!({
                "type": "ADD_CONTENT_ANALYSIS",
                "url": "https://a.test",
                "data": { "analysis": {
                    "type": "cyberbullying",
                    "riskLevel": 3,
                    "harmfulContent": "true"
                } }
            }))
            .await;
        assert!(response.success);

        let snapshot = handler.store().snapshot();
        assert_eq!(snapshot.analyses.len(), 1);
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.analyses[0].content_type, crate::ContentType::Cyberbullying);
        assert_eq!(snapshot.analyses[0].risk_level, crate::RiskLevel::Unknown);
        assert!(snapshot.analyses[0].harmful_content);
    }

    #[tokio::test]
    async fn test_tab_events() {
        let mut handler = handler();
        handler
            .handle(Event::TabUpdated {
                url: Some(String::from("https://a.test")),
                status: Some(String::from("loading")),
            })
            .await;
        assert!(handler.store().is_empty());

        handler
            .handle(Event::TabUpdated {
                url: Some(String::from("https://a.test")),
                status: Some(String::from(TAB_STATUS_COMPLETE)),
            })
            .await;
        handler
            .handle(Event::TabActivated {
                url: Some(String::from("https://a.test")),
            })
            .await;
        handler.handle(Event::TabActivated { url: None }).await;
        assert_eq!(handler.store().visit("https://a.test").unwrap().visit_count, 2);
    }

    #[tokio::test]
    async fn test_spawned_handler_round_trip() {
        let (sender, task) = spawn(handler());

        sender
            .send(Event::PageVisit {
                url: String::from("https://a.test"),
            })
            .await
            .unwrap();
        sender
            .send(Event::analysis(
                "https://a.test",
                AnalysisPayload {
                    content_type: Some(String::from("cyberbullying")),
                    risk_level: Some(String::from("high")),
                    details: Some(String::from("insults")),
                    harmful_content: Some(true),
                },
            ))
            .await
            .unwrap();
        let response = sender.send(Event::GenerateReportRequest).await.unwrap();
        assert!(response.success);
        assert!(response.filename.unwrap().starts_with("browseBuddy_report_"));

        drop(sender);
        let handler = task.await.unwrap();
        assert_eq!(handler.store().snapshot().warnings.len(), 1);
    }
}
