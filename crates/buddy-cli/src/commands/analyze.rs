use anyhow::{bail, Context, Result};
use buddy_ai::{create_provider, ClassifierProvider};
use buddy_core::events::{self, ScreenTimeData};
use buddy_core::{
    AnalysisScheduler, AnalyzerSession, BuddyConfig, Event, MonitorExit, PageMonitor, Visibility,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use super::helpers::{build_handler, print_summary, report_dir};

pub async fn analyze_command(
    config: &BuddyConfig,
    url: &str,
    text: String,
    output: Option<PathBuf>,
    max_attempts: u32,
) -> Result<()> {
    let provider: Arc<dyn ClassifierProvider> = Arc::from(create_provider(&config.classifier)?);
    println!(
        "Analyzing {url} with {} ({})",
        provider.model_name(),
        config.classifier.provider
    );

    let session = AnalyzerSession::new(provider, config.classifier.effective_system_prompt());
    let scheduler = Arc::new(AnalysisScheduler::new(session, config.monitor.cooldown()));

    let dir = report_dir(config, output)?;
    let (sender, handler_task) = events::spawn(build_handler(config, &dir)?);
    sender
        .send(Event::PageVisit {
            url: url.to_string(),
        })
        .await?;

    let started = Instant::now();
    let (_visible, visibility) = watch::channel(Visibility::Visible);
    let monitor = PageMonitor::new(scheduler.clone(), url)
        .with_poll_interval(config.monitor.poll_interval())
        .with_max_failures(max_attempts.max(1));

    let exit = tokio::select! {
        exit = monitor.run(&text, visibility, &sender) => exit,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl-C, stopping analysis...");
            scheduler.stop();
            MonitorExit::Stopped
        }
    };
    scheduler.session().shutdown().await;

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    sender
        .send(Event::ScreenTimeTick {
            url: url.to_string(),
            data: Some(ScreenTimeData {
                duration: serde_json::json!(elapsed_ms),
            }),
        })
        .await?;

    let report = sender.send(Event::GenerateReportRequest).await?;
    drop(sender);
    let handler = handler_task.await.context("Event handler task failed")?;
    print_summary(handler.store());

    match exit {
        MonitorExit::Analyzed => println!("\nAnalysis complete."),
        MonitorExit::GaveUp => println!("\nAnalysis failed after {max_attempts} attempts."),
        MonitorExit::Stopped => println!("\nAnalysis stopped."),
    }

    match (report.success, report.filename) {
        (true, Some(filename)) => {
            println!("Report saved to {}", dir.join(filename).display());
            Ok(())
        }
        _ => bail!(
            "Report generation failed: {}",
            report.error.unwrap_or_default()
        ),
    }
}
