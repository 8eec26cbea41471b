//! Configuration command handlers

use anyhow::Result;
use buddy_core::BuddyConfig;
use std::path::Path;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn mask_key(key: &str) -> String {
    format!("{}***", key.chars().take(8).collect::<String>())
}

fn setting_rows(config: &BuddyConfig) -> Vec<SettingRow> {
    let classifier = &config.classifier;
    let row = |key, value: String| SettingRow { key, value };

    vec![
        row("classifier.provider", classifier.provider.to_string()),
        row("classifier.model", classifier.effective_model().to_string()),
        row("classifier.base_url", classifier.effective_base_url().to_string()),
        row(
            "classifier.api_key",
            classifier
                .effective_api_key()
                .map_or_else(|| String::from("(not set)"), |k| mask_key(&k)),
        ),
        row(
            "classifier.max_tokens",
            classifier.effective_max_tokens().to_string(),
        ),
        row(
            "classifier.request_timeout_secs",
            classifier.request_timeout_secs.to_string(),
        ),
        row(
            "classifier.system_prompt",
            if classifier.system_prompt.is_some() {
                String::from("(custom)")
            } else {
                String::from("(default)")
            },
        ),
        row(
            "monitor.poll_interval_secs",
            config.monitor.poll_interval_secs.to_string(),
        ),
        row("monitor.cooldown_secs", config.monitor.cooldown_secs.to_string()),
        row(
            "report.output_dir",
            config
                .output_dir()
                .map_or_else(|e| format!("(unavailable: {e})"), |d| d.display().to_string()),
        ),
        row("report.timestamp_format", config.report.timestamp_format.clone()),
        row(
            "report.prompt_for_location",
            config.report.prompt_for_location.to_string(),
        ),
    ]
}

pub fn show_config(config: &BuddyConfig) -> Result<()> {
    println!("{}", Table::new(setting_rows(config)));
    Ok(())
}

pub fn show_config_path(explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => BuddyConfig::default_path()?,
    };
    let state = if path.exists() { "" } else { " (not created)" };
    println!("{}{state}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijkl"), "sk-abcde***");
        assert_eq!(mask_key("short"), "short***");
    }

    #[test]
    fn test_setting_rows_use_effective_values() {
        let mut config = BuddyConfig::default();
        config.classifier.api_key = Some(String::from("sk-1234567890"));

        let rows = setting_rows(&config);
        let value = |key: &str| {
            rows.iter()
                .find(|r| r.key == key)
                .map(|r| r.value.clone())
                .unwrap()
        };
        assert_eq!(value("classifier.provider"), "ollama");
        assert_eq!(value("classifier.model"), "llama3.2");
        assert_eq!(value("classifier.api_key"), "sk-12345***");
        assert_eq!(value("monitor.cooldown_secs"), "30");
    }
}
