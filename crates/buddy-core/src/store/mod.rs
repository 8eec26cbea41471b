
use buddy_ai::AnalysisPayload;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::{ContentAnalysis, ContentType, ContentWarning, RiskLevel, WebsiteVisit};

/// Longest `details` text kept per analysis, in characters
pub const MAX_DETAILS_CHARS: usize = 1000;

/// Read-only view of every ledger, each in insertion order
#[derive(Debug, Clone, Copy)]
pub struct StoreSnapshot<'a> {
    pub visits: &'a [WebsiteVisit],
    pub analyses: &'a [ContentAnalysis],
    pub warnings: &'a [ContentWarning],
}

/// In-memory ledgers of visits, screen time, analyses and warnings.
///
/// Nothing in here fails: bad input is dropped with a log line.
#[derive(Debug, Default)]
pub struct AggregationStore {
    visits: Vec<WebsiteVisit>,
    visit_index: HashMap<String, usize>,
    analyses: Vec<ContentAnalysis>,
    warnings: Vec<ContentWarning>,
}

impl AggregationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a visit to `url` now
    pub fn record_visit(&mut self, url: &str) -> &WebsiteVisit {
        self.record_visit_at(url, Utc::now())
    }

    /// Count a visit to `url` at `now`. Repeated calls always increment;
    /// callers that want a single count per navigation must dedupe.
    pub fn record_visit_at(&mut self, url: &str, now: DateTime<Utc>) -> &WebsiteVisit {
        let key = normalize_url(url);

        let index = if let Some(&index) = self.visit_index.get(&key) {
            let visit = &mut self.visits[index];
            visit.last_visit = now.max(visit.first_visit);
            visit.visit_count = visit.visit_count.saturating_add(1);
            log::debug!("Visit #{} to {key}", visit.visit_count);
            index
        } else {
            log::debug!("First visit to {key}");
            let index = self.visits.len();
            self.visits.push(WebsiteVisit::new(key.clone(), now));
            self.visit_index.insert(key, index);
            index
        };

        &self.visits[index]
    }

    /// Add screen time to a known URL. Returns false, without creating a
    /// record, when the URL has never been visited.
    pub fn add_screen_time(&mut self, url: &str, duration_ms: u64) -> bool {
        let key = normalize_url(url);
        match self.visit_index.get(&key) {
            Some(&index) => {
                let visit = &mut self.visits[index];
                visit.total_time_ms = visit.total_time_ms.saturating_add(duration_ms);
                log::debug!(
                    "Screen time for {key}: +{duration_ms}ms (total {}ms)",
                    visit.total_time_ms
                );
                true
            }
            None => {
                log::debug!("Ignoring screen time for unvisited URL {key}");
                false
            }
        }
    }

    /// Append an analysis built from a classifier payload
    pub fn record_analysis(
        &mut self,
        payload: Option<&AnalysisPayload>,
        url: &str,
    ) -> Option<&ContentAnalysis> {
        self.record_analysis_at(payload, url, Utc::now())
    }

    /// Append an analysis, mirroring it into the warnings ledger when it is
    /// flagged harmful. A missing or empty payload is dropped.
    pub fn record_analysis_at(
        &mut self,
        payload: Option<&AnalysisPayload>,
        url: &str,
        now: DateTime<Utc>,
    ) -> Option<&ContentAnalysis> {
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            log::warn!("Empty analysis received for {url}, dropping it");
            return None;
        };

        let analysis = ContentAnalysis {
            url: normalize_url(url),
            timestamp: now,
            content_type: ContentType::from_label(payload.content_type.as_deref()),
            risk_level: RiskLevel::from_label(payload.risk_level.as_deref()),
            details: payload
                .details
                .as_deref()
                .map(sanitize_details)
                .unwrap_or_default(),
            harmful_content: payload.harmful_content.unwrap_or(false),
        };

        log::info!(
            "Recorded analysis for {}: {} / {} (harmful: {})",
            analysis.url,
            analysis.content_type,
            analysis.risk_level,
            analysis.harmful_content
        );

        if analysis.harmful_content {
            self.warnings.push(ContentWarning::from(&analysis));
        }
        self.analyses.push(analysis);
        self.analyses.last()
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot<'_> {
        StoreSnapshot {
            visits: &self.visits,
            analyses: &self.analyses,
            warnings: &self.warnings,
        }
    }

    /// Look up the visit record for `url` (normalized the same way as writes)
    #[must_use]
    pub fn visit(&self, url: &str) -> Option<&WebsiteVisit> {
        self.visit_index
            .get(&normalize_url(url))
            .map(|&index| &self.visits[index])
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visits.is_empty() && self.analyses.is_empty()
    }
}

/// Ledger key for a URL: parsed absolute URLs lose their fragment and get the
/// canonical serialization, anything else is kept as trimmed text.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

fn line_breaks() -> &'static Regex {
    static LINE_BREAKS: OnceLock<Regex> = OnceLock::new();
    LINE_BREAKS.get_or_init(|| Regex::new(r"[\r\n]+").expect("line break pattern is valid"))
}

/// Make free text safe for a single CSV cell: line breaks become one space,
/// commas become semicolons, and the result is capped at
/// [`MAX_DETAILS_CHARS`] characters.
#[must_use]
pub fn sanitize_details(details: &str) -> String {
    line_breaks()
        .replace_all(details, " ")
        .replace(',', ";")
        .chars()
        .take(MAX_DETAILS_CHARS)
        .collect()
}
