use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Free-form classification payload as it travels between the page and the
/// aggregation side. Every field is optional and decoded leniently: a field
/// of the wrong type is dropped with a warning, never failing the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub risk_level: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub details: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub harmful_content: Option<bool>,
}

/// Labels must be strings; anything else becomes unset
fn lenient_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(label) => Some(label),
        other => {
            log::warn!("Ignoring non-text analysis label: {other}");
            None
        }
    })
}

/// Free text; numbers and booleans keep their textual form
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            log::warn!("Ignoring structured analysis details: {other}");
            None
        }
    })
}

/// Harmful flag from a boolean, a number (non-zero is set) or a string
fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::Bool(flag) => Some(flag),
        Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "" | "false" | "no" | "0" => Some(false),
            "true" | "yes" | "1" => Some(true),
            other => {
                log::warn!("Treating harmful flag {other:?} as set");
                Some(true)
            }
        },
        other => {
            log::warn!("Ignoring non-scalar harmful flag: {other}");
            None
        }
    })
}

impl AnalysisPayload {
    /// True when the payload carries no information at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        is_blank(self.content_type.as_deref())
            && is_blank(self.risk_level.as_deref())
            && is_blank(self.details.as_deref())
            && self.harmful_content.is_none()
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

/// Turn a raw model response into a payload by keyword inspection.
///
/// - harmful when the response mentions "harmful" or "inappropriate"
/// - type is "cyberbullying" when mentioned, otherwise "harmful-content"
/// - risk is "high" when mentioned, otherwise "low"
#[must_use]
pub fn parse_verdict(response: &str) -> AnalysisPayload {
    let lower = response.to_lowercase();

    let harmful = lower.contains("harmful") || lower.contains("inappropriate");
    let content_type = if lower.contains("cyberbullying") {
        "cyberbullying"
    } else {
        "harmful-content"
    };
    let risk_level = if lower.contains("high") { "high" } else { "low" };

    AnalysisPayload {
        content_type: Some(content_type.to_string()),
        risk_level: Some(risk_level.to_string()),
        details: Some(response.to_string()),
        harmful_content: Some(harmful),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict_harmful_high() {
        let payload = parse_verdict("Type: Harmful content. Risk level: HIGH.");
        assert_eq!(payload.content_type.as_deref(), Some("harmful-content"));
        assert_eq!(payload.risk_level.as_deref(), Some("high"));
        assert_eq!(payload.harmful_content, Some(true));
        assert_eq!(
            payload.details.as_deref(),
            Some("Type: Harmful content. Risk level: HIGH.")
        );
    }

    #[test]
    fn test_parse_verdict_cyberbullying() {
        let payload = parse_verdict("Possible cyberbullying, inappropriate language. Risk: low");
        assert_eq!(payload.content_type.as_deref(), Some("cyberbullying"));
        assert_eq!(payload.risk_level.as_deref(), Some("low"));
        assert_eq!(payload.harmful_content, Some(true));
    }

    #[test]
    fn test_parse_verdict_benign() {
        let payload = parse_verdict("The headlines are about gardening. Risk level: low.");
        assert_eq!(payload.harmful_content, Some(false));
        assert_eq!(payload.risk_level.as_deref(), Some("low"));
    }

    #[test]
    fn test_payload_wire_names() {
        let payload: AnalysisPayload = serde_json::from_str(
            r#"{"type":"cyberbullying","riskLevel":"high","harmfulContent":true}"#,
        )
        .unwrap();
        assert_eq!(payload.content_type.as_deref(), Some("cyberbullying"));
        assert_eq!(payload.risk_level.as_deref(), Some("high"));
        assert_eq!(payload.harmful_content, Some(true));
        assert!(payload.details.is_none());
    }

    #[test]
    fn test_payload_mistyped_fields_are_lenient() {
        let payload: AnalysisPayload = serde_json::from_str(
            r#"{"type":7,"riskLevel":["high"],"harmfulContent":"true","details":42}"#,
        )
        .unwrap();
        assert!(payload.content_type.is_none());
        assert!(payload.risk_level.is_none());
        assert_eq!(payload.harmful_content, Some(true));
        assert_eq!(payload.details.as_deref(), Some("42"));
    }

    #[test]
    fn test_harmful_flag_from_strings_and_numbers() {
        let flag = |raw: &str| {
            serde_json::from_str::<AnalysisPayload>(&format!(r#"{{"harmfulContent":{raw}}}"#))
                .unwrap()
                .harmful_content
        };
        assert_eq!(flag("\"false\""), Some(false));
        assert_eq!(flag("\"YES\""), Some(true));
        assert_eq!(flag("\"flagged\""), Some(true));
        assert_eq!(flag("0"), Some(false));
        assert_eq!(flag("1"), Some(true));
        assert_eq!(flag("null"), None);
        assert_eq!(flag("{}"), None);
    }

    #[test]
    fn test_payload_is_empty() {
        assert!(AnalysisPayload::default().is_empty());
        let blank = AnalysisPayload {
            details: Some(String::from("  ")),
            ..AnalysisPayload::default()
        };
        assert!(blank.is_empty());
        let flagged = AnalysisPayload {
            harmful_content: Some(false),
            ..AnalysisPayload::default()
        };
        assert!(!flagged.is_empty());
    }
}
