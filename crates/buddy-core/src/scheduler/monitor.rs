use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::{AnalysisScheduler, TickOutcome};
use crate::events::{Event, EventSender};

/// How often a visible page is re-checked
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Source of the page text handed to the classifier
pub trait PageContent: Send + Sync {
    fn text(&self) -> String;
}

impl PageContent for String {
    fn text(&self) -> String {
        self.clone()
    }
}

/// Why the monitor loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The page's analysis succeeded and was forwarded
    Analyzed,
    /// Page hidden, unloaded or the scheduler was stopped
    Stopped,
    /// Too many failed attempts in a row
    GaveUp,
}

/// Polls one page and feeds verdicts into the event handler
pub struct PageMonitor {
    scheduler: Arc<AnalysisScheduler>,
    url: String,
    poll_interval: Duration,
    max_failures: Option<u32>,
}

impl PageMonitor {
    #[must_use]
    pub fn new(scheduler: Arc<AnalysisScheduler>, url: impl Into<String>) -> Self {
        Self {
            scheduler,
            url: url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_failures: None,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Give up after this many consecutive failed attempts
    #[must_use]
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = Some(max_failures);
        self
    }

    /// Tick the scheduler every poll interval while the page is visible.
    ///
    /// Returns once the page has been analyzed, the page goes away or the
    /// failure limit is reached. A hidden page or a closed visibility
    /// channel stops the scheduler.
    pub async fn run(
        &self,
        page: &dyn PageContent,
        mut visibility: watch::Receiver<Visibility>,
        events: &EventSender,
    ) -> MonitorExit {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failures = 0u32;

        log::info!("Monitoring {} every {:?}", self.url, self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = visibility.changed() => {
                    if changed.is_err() {
                        log::debug!("Page for {} went away", self.url);
                        self.scheduler.stop();
                        return MonitorExit::Stopped;
                    }
                }
            }

            if *visibility.borrow() == Visibility::Hidden {
                log::debug!("Page {} hidden, stopping analysis", self.url);
                self.scheduler.stop();
                return MonitorExit::Stopped;
            }

            match self.scheduler.tick(&page.text()).await {
                TickOutcome::Analyzed(payload) => {
                    match events.send(Event::analysis(&self.url, payload)).await {
                        Ok(response) if !response.success => {
                            log::warn!("Analysis for {} was rejected: {:?}", self.url, response.error);
                        }
                        Ok(_) => {}
                        Err(e) => log::error!("Could not forward analysis for {}: {e:#}", self.url),
                    }
                    return MonitorExit::Analyzed;
                }
                TickOutcome::Stopped => return MonitorExit::Stopped,
                TickOutcome::AlreadyAnalyzed => return MonitorExit::Analyzed,
                TickOutcome::Failed(e) => {
                    failures += 1;
                    log::debug!("Attempt {failures} for {} failed: {e}", self.url);
                    if self.max_failures.is_some_and(|max| failures >= max) {
                        log::warn!("Giving up on {} after {failures} failed attempts", self.url);
                        return MonitorExit::GaveUp;
                    }
                }
                TickOutcome::Busy | TickOutcome::CoolingDown { .. } | TickOutcome::NoContent => {}
            }
        }
    }
}
