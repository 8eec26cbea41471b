use anyhow::{bail, Context, Result};
use buddy_core::{BuddyConfig, Event, EventHandler};
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::helpers::{build_handler, print_summary, report_dir};

/// Feed each non-blank line of `contents` to the handler. Returns how many
/// events were handled and how many were rejected.
async fn replay_lines(handler: &mut EventHandler, contents: &str) -> Result<(usize, usize)> {
    let mut handled = 0;
    let mut rejected = 0;

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("Line {} is not valid JSON", index + 1))?;
        let response = handler.handle_value(value).await;
        handled += 1;
        if !response.success {
            rejected += 1;
            log::warn!(
                "Line {} rejected: {}",
                index + 1,
                response.error.unwrap_or_default()
            );
        }
    }

    Ok((handled, rejected))
}

pub async fn replay_command(
    config: &BuddyConfig,
    events: &Path,
    output: Option<PathBuf>,
    data_url: bool,
) -> Result<()> {
    let contents = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("Failed to read {}", events.display()))?;

    let dir = report_dir(config, output)?;
    let mut handler = build_handler(config, &dir)?;

    let (handled, rejected) = replay_lines(&mut handler, &contents).await?;
    println!("Replayed {handled} events ({rejected} rejected)");
    print_summary(handler.store());

    if data_url {
        let report = config
            .renderer()?
            .render(handler.store().snapshot(), Utc::now().date_naive());
        println!("\n{}", report.to_data_url());
        return Ok(());
    }

    let response = handler.handle(Event::GenerateReportRequest).await;
    match (response.success, response.filename) {
        (true, Some(filename)) => {
            println!("\nReport saved to {}", dir.join(filename).display());
            Ok(())
        }
        _ => bail!(
            "Report generation failed: {}",
            response.error.unwrap_or_default()
        ),
    }
}
