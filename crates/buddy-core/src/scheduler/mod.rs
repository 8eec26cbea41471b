//! Per-page analysis scheduling: cooldown, single-shot policy and the
//! classifier session lifecycle.

pub mod monitor;


use buddy_ai::{parse_verdict, AnalysisPayload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::BuddyError;
use crate::session::{AnalyzerSession, SessionStatus};

pub use monitor::{MonitorExit, PageContent, PageMonitor, Visibility, DEFAULT_POLL_INTERVAL};

/// Minimum time between two analysis attempts for one page
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Where a page's analysis currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No classifier session yet
    Idle,
    /// Waiting for the classifier session to open
    SessionInitializing,
    /// Eligible for an analysis attempt
    Ready,
    /// A classify call is in flight
    Analyzing,
    /// The page was analyzed; waiting out the cooldown window
    Cooldown,
    /// The page's single analysis is used up
    Exhausted,
}

/// What a scheduler tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// The scheduler was stopped; nothing was attempted
    Stopped,
    /// The page already had its one successful analysis
    AlreadyAnalyzed,
    /// Another attempt is still running
    Busy,
    /// Too soon after the previous analysis
    CoolingDown { remaining: Duration },
    /// No text to analyze
    NoContent,
    /// Classification succeeded
    Analyzed(AnalysisPayload),
    /// Session setup or classification failed; the page stays eligible
    Failed(BuddyError),
}

#[derive(Debug)]
struct PageState {
    state: SchedulerState,
    last_analysis: Option<Instant>,
    has_analyzed: bool,
    in_flight: bool,
}

/// Decides when a page may be analyzed and drives its classifier session.
///
/// One scheduler belongs to one page. It analyzes the page at most once per
/// page life: after the first success every tick reports
/// [`TickOutcome::AlreadyAnalyzed`] until [`AnalysisScheduler::reset`].
pub struct AnalysisScheduler {
    session: AnalyzerSession,
    cooldown: Duration,
    valid: AtomicBool,
    page: Mutex<PageState>,
}

impl AnalysisScheduler {
    #[must_use]
    pub fn new(session: AnalyzerSession, cooldown: Duration) -> Self {
        Self {
            session,
            cooldown,
            valid: AtomicBool::new(true),
            page: Mutex::new(PageState {
                state: SchedulerState::Idle,
                last_analysis: None,
                has_analyzed: false,
                in_flight: false,
            }),
        }
    }

    fn page(&self) -> MutexGuard<'_, PageState> {
        self.page.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SchedulerState) {
        self.page().state = state;
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.page().state
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn has_analyzed(&self) -> bool {
        self.page().has_analyzed
    }

    #[must_use]
    pub fn session(&self) -> &AnalyzerSession {
        &self.session
    }

    /// Open the classifier session ahead of the first tick
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Initialization` when the session cannot be created
    pub async fn prepare(&self) -> Result<(), BuddyError> {
        self.set_state(SchedulerState::SessionInitializing);
        let result = self.session.ensure_ready().await;
        self.set_state(if result.is_ok() {
            SchedulerState::Ready
        } else {
            SchedulerState::Idle
        });
        result.map(|_| ())
    }

    /// Run one scheduling step with the page text as of now
    pub async fn tick(&self, text: &str) -> TickOutcome {
        self.tick_at(text, Instant::now()).await
    }

    /// Run one scheduling step at `now`
    pub async fn tick_at(&self, text: &str, now: Instant) -> TickOutcome {
        if !self.is_valid() {
            return TickOutcome::Stopped;
        }

        {
            let mut page = self.page();
            if page.has_analyzed {
                page.state = SchedulerState::Exhausted;
                return TickOutcome::AlreadyAnalyzed;
            }
            if page.in_flight {
                return TickOutcome::Busy;
            }
            if let Some(last) = page.last_analysis {
                let elapsed = now.saturating_duration_since(last);
                if elapsed <= self.cooldown {
                    return TickOutcome::CoolingDown {
                        remaining: self.cooldown - elapsed,
                    };
                }
            }
            if text.trim().is_empty() {
                return TickOutcome::NoContent;
            }
            page.in_flight = true;
        }

        if self.session.status() != SessionStatus::Ready {
            self.set_state(SchedulerState::SessionInitializing);
        }
        if let Err(e) = self.session.ensure_ready().await {
            let mut page = self.page();
            page.in_flight = false;
            page.state = SchedulerState::Idle;
            return TickOutcome::Failed(e);
        }
        if !self.is_valid() {
            self.page().in_flight = false;
            return TickOutcome::Stopped;
        }

        if self
            .session
            .budget()
            .await
            .is_some_and(|budget| budget.is_critical())
        {
            log::info!("Classifier session near its token limit, renewing before analysis");
            self.set_state(SchedulerState::SessionInitializing);
            if let Err(e) = self.session.renew().await {
                let mut page = self.page();
                page.in_flight = false;
                page.state = SchedulerState::Idle;
                return TickOutcome::Failed(e);
            }
            if !self.is_valid() {
                self.page().in_flight = false;
                return TickOutcome::Stopped;
            }
        }

        self.set_state(SchedulerState::Analyzing);
        let result = self.session.classify(text).await;

        let mut page = self.page();
        page.in_flight = false;

        if !self.is_valid() {
            log::debug!("Scheduler stopped during analysis, discarding result");
            return TickOutcome::Stopped;
        }

        match result {
            Ok(response) => {
                let payload = parse_verdict(&response);
                page.has_analyzed = true;
                page.last_analysis = Some(now);
                page.state = SchedulerState::Cooldown;
                log::info!("Analysis complete, no further attempts for this page");
                TickOutcome::Analyzed(payload)
            }
            Err(e) => {
                page.state = match self.session.status() {
                    SessionStatus::Ready => SchedulerState::Ready,
                    SessionStatus::Idle | SessionStatus::Initializing => SchedulerState::Idle,
                };
                log::warn!("Analysis attempt failed: {e}");
                TickOutcome::Failed(e)
            }
        }
    }

    /// Stop scheduling for good (page unload or hidden). Takes effect
    /// immediately, including for an attempt already in flight.
    pub fn stop(&self) {
        if self.valid.swap(false, Ordering::SeqCst) {
            log::debug!("Analysis scheduler stopped");
        }
    }

    /// Re-arm for a new page life: clears the single-shot flag and cooldown
    pub fn reset(&self) {
        let mut page = self.page();
        page.has_analyzed = false;
        page.last_analysis = None;
        page.state = match self.session.status() {
            SessionStatus::Ready => SchedulerState::Ready,
            SessionStatus::Idle | SessionStatus::Initializing => SchedulerState::Idle,
        };
        self.valid.store(true, Ordering::SeqCst);
        log::debug!("Analysis scheduler reset");
    }
}
