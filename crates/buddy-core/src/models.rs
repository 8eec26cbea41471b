use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-URL visit and screen time record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteVisit {
    pub url: String,
    pub first_visit: DateTime<Utc>,
    pub last_visit: DateTime<Utc>,
    pub total_time_ms: u64,
    pub visit_count: u32,
}

impl WebsiteVisit {
    #[must_use]
    pub fn new(url: String, now: DateTime<Utc>) -> Self {
        Self {
            url,
            first_visit: now,
            last_visit: now,
            total_time_ms: 0,
            visit_count: 1,
        }
    }

    /// Total screen time in minutes
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_minutes(&self) -> f64 {
        self.total_time_ms as f64 / 60_000.0
    }
}

/// Kind of content the classifier flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    HarmfulContent,
    Cyberbullying,
    Unknown,
}

impl ContentType {
    /// Map a free-form label; anything unrecognized is `Unknown`
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_lowercase()).as_deref() {
            Some("harmful-content") => Self::HarmfulContent,
            Some("cyberbullying") => Self::Cyberbullying,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HarmfulContent => "harmful-content",
            Self::Cyberbullying => "cyberbullying",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    High,
    Unknown,
}

impl RiskLevel {
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classifier verdict for a page, appended and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub content_type: ContentType,
    pub risk_level: RiskLevel,
    /// Sanitized: single line, no commas, at most 1000 characters
    pub details: String,
    pub harmful_content: bool,
}

/// Mirror of a harmful [`ContentAnalysis`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentWarning {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub content_type: ContentType,
    pub risk_level: RiskLevel,
    pub details: String,
}

impl From<&ContentAnalysis> for ContentWarning {
    fn from(analysis: &ContentAnalysis) -> Self {
        Self {
            url: analysis.url.clone(),
            timestamp: analysis.timestamp,
            content_type: analysis.content_type,
            risk_level: analysis.risk_level,
            details: analysis.details.clone(),
        }
    }
}
