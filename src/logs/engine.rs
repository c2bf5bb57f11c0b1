//! Retrieval state machine.
//!
//! The engine never touches the network or a clock itself. Every entry point
//! takes the current time where it matters and returns the [`Command`]s the
//! driver has to carry out; network completions come back through
//! [`RetrievalEngine::complete`]. Each issued request is tagged with the
//! generation counter at issue time and a completion is only applied while
//! that generation is still current.
//!
//! ```text
//!   Idle ──text edit──▶ Debouncing ──quiet period──▶ InFlight ──▶ Settled
//!     │                     ▲  │                        │
//!     └──discrete change────┼──┴────────────────────────▶ (cancel + reissue)
//!                           └── text edit while InFlight cancels it
//! ```

use log::{debug, info, warn};
use std::time::Instant;

use crate::api::query::{LogPage, LogQuery, PAGE_SIZE};
use crate::logs::window::{LogWindow, WindowSnapshot};
use crate::models::config::RetrievalTiming;
use crate::models::filter::FilterState;
use crate::utils::error::AppResult;

/// Whether a request replaces the window or extends it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Refresh,
    LoadMore,
}

/// A query the driver has to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub generation: u64,
    pub kind: FetchKind,
    pub query: LogQuery,
}

/// Side effects requested by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch(FetchRequest),
    /// Abort the request issued under `generation`
    Cancel { generation: u64 },
}

/// Lifecycle of the current logical query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Debouncing { deadline: Instant },
    InFlight { generation: u64, kind: FetchKind },
    Settled,
    Cancelled,
}

/// What happened to a completed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The window changed
    Applied,
    /// A newer request superseded this one
    Stale,
    Cancelled,
    /// Transport or status failure; window left as it was
    Failed,
}

pub struct RetrievalEngine {
    filter: FilterState,
    window: LogWindow,
    phase: Phase,
    generation: u64,
    timing: RetrievalTiming,
    page_size: usize,
    next_poll_at: Option<Instant>,
}

impl RetrievalEngine {
    pub fn new(filter: FilterState, timing: RetrievalTiming) -> Self {
        Self {
            filter,
            window: LogWindow::new(),
            phase: Phase::Idle,
            generation: 0,
            timing,
            page_size: PAGE_SIZE,
            next_poll_at: None,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn window(&self) -> &LogWindow {
        &self.window
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.window.snapshot()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A request is out or about to go out
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Debouncing { .. } | Phase::InFlight { .. })
    }

    /// Initial load
    pub fn start(&mut self, now: Instant) -> Vec<Command> {
        self.refresh(now)
    }

    /// Take a new filter state. Text edits are debounced; set and toggle
    /// changes query right away.
    pub fn set_filter(&mut self, filter: FilterState, now: Instant) -> Vec<Command> {
        let text_changed = filter.text_differs(&self.filter);
        let discrete_changed = filter.discrete_differs(&self.filter);
        self.filter = filter;

        if discrete_changed {
            return self.refresh(now);
        }

        if text_changed {
            let commands = self.invalidate_in_flight();
            let deadline = now + self.timing.debounce;
            if matches!(self.phase, Phase::Debouncing { .. }) {
                debug!("Search edited again, debounce restarted");
            }
            self.phase = Phase::Debouncing { deadline };
            return commands;
        }

        Vec::new()
    }

    /// Query the first page again and replace the window when it arrives
    pub fn refresh(&mut self, now: Instant) -> Vec<Command> {
        let mut commands = self.invalidate_in_flight();

        self.generation += 1;
        let generation = self.generation;
        self.phase = Phase::InFlight {
            generation,
            kind: FetchKind::Refresh,
        };
        self.next_poll_at = Some(now + self.timing.poll_interval);

        commands.push(Command::Fetch(FetchRequest {
            generation,
            kind: FetchKind::Refresh,
            query: LogQuery::page(&self.filter, 0, self.page_size),
        }));
        commands
    }

    /// Ask for the next page. Does nothing while a request is pending, when
    /// the backend reported nothing more, or when the loaded rows came from
    /// a different filter than the current one.
    pub fn load_more(&mut self) -> Vec<Command> {
        if self.is_busy() {
            debug!("Ignoring load-more while a request is pending");
            return Vec::new();
        }
        if !self.window.has_more() {
            return Vec::new();
        }
        if !self.window.built_for(&self.filter) {
            debug!("Ignoring load-more, window predates the current filter");
            return Vec::new();
        }

        self.generation += 1;
        let generation = self.generation;
        self.phase = Phase::InFlight {
            generation,
            kind: FetchKind::LoadMore,
        };

        vec![Command::Fetch(FetchRequest {
            generation,
            kind: FetchKind::LoadMore,
            query: LogQuery::page(&self.filter, self.window.next_offset(), self.page_size),
        })]
    }

    /// The backend logs were wiped: drop the window and reload at once
    pub fn hard_reset(&mut self, now: Instant) -> Vec<Command> {
        info!("Hard reset, clearing {} loaded records", self.window.len());
        self.window.clear();
        self.refresh(now)
    }

    /// Abort whatever is pending without issuing anything new
    pub fn cancel(&mut self) -> Vec<Command> {
        let commands = self.invalidate_in_flight();
        if self.is_busy() {
            self.phase = Phase::Cancelled;
        }
        commands
    }

    /// Advance timers: fire an expired debounce, or re-poll a window thinner
    /// than one page
    pub fn tick(&mut self, now: Instant) -> Vec<Command> {
        if let Phase::Debouncing { deadline } = self.phase {
            if now >= deadline {
                debug!("Debounce settled, querying");
                return self.refresh(now);
            }
            return Vec::new();
        }

        let poll_due = match self.next_poll_at {
            Some(at) => now >= at,
            None => {
                self.next_poll_at = Some(now + self.timing.poll_interval);
                false
            }
        };
        if !poll_due {
            return Vec::new();
        }

        self.next_poll_at = Some(now + self.timing.poll_interval);
        if matches!(self.phase, Phase::Idle | Phase::Settled) {
            if self.window.len() < self.page_size {
                debug!("Window holds {} records, re-polling", self.window.len());
                return self.refresh(now);
            }
            if !self.window.built_for(&self.filter) {
                debug!("Window predates the current filter, re-polling");
                return self.refresh(now);
            }
        }

        Vec::new()
    }

    /// Feed back the outcome of the request issued under `generation`
    pub fn complete(&mut self, generation: u64, result: AppResult<LogPage>) -> Completion {
        let kind = match self.phase {
            Phase::InFlight { generation: pending, kind } if pending == generation && generation == self.generation => kind,
            _ => {
                debug!(
                    "Discarding stale response for generation {} (current {})",
                    generation, self.generation
                );
                return Completion::Stale;
            }
        };

        match result {
            Ok(page) => {
                match kind {
                    FetchKind::Refresh => self.window.replace(page, generation, &self.filter),
                    FetchKind::LoadMore => {
                        let added = self.window.append(page, generation);
                        debug!("Appended {} records, window now {}", added, self.window.len());
                    }
                }
                self.phase = Phase::Settled;
                Completion::Applied
            }
            Err(e) if e.is_cancellation() => {
                debug!("Request {} was cancelled", generation);
                self.phase = Phase::Cancelled;
                Completion::Cancelled
            }
            Err(e) => {
                warn!("Failed to fetch logs: {}", e);
                self.phase = Phase::Settled;
                Completion::Failed
            }
        }
    }

    /// Cancel the pending request, if any, and make sure its response can
    /// no longer be applied
    fn invalidate_in_flight(&mut self) -> Vec<Command> {
        match self.phase {
            Phase::InFlight { generation, .. } => {
                debug!("Superseding in-flight request {}", generation);
                self.generation += 1;
                vec![Command::Cancel { generation }]
            }
            _ => Vec::new(),
        }
    }
}
