use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::api::client::LogBackend;
use crate::api::query::LogPage;
use crate::filter::store::FilterStore;
use crate::logs::engine::{Command, Completion, RetrievalEngine};
use crate::logs::window::WindowSnapshot;
use crate::models::config::RetrievalTiming;
use crate::models::filter::{FilterPatch, FilterState};
use crate::utils::error::AppResult;

/// Capacity of the snapshot channel; slow subscribers skip ahead
const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Operator and external events fed into a running session
#[derive(Debug)]
pub enum SessionEvent {
    /// Operator edited the filter
    Filter(FilterPatch),
    /// Scrolled to the end of the loaded rows
    LoadMore,
    /// Re-query the first page now
    Refresh,
    /// Backend logs were cleared
    HardReset,
    Shutdown,
}

/// Handle to a running session task
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshots: broadcast::Sender<WindowSnapshot>,
}

impl SessionHandle {
    pub fn update_filter(&self, patch: FilterPatch) {
        self.send(SessionEvent::Filter(patch));
    }

    pub fn load_more(&self) {
        self.send(SessionEvent::LoadMore);
    }

    pub fn refresh(&self) {
        self.send(SessionEvent::Refresh);
    }

    pub fn hard_reset(&self) {
        self.send(SessionEvent::HardReset);
    }

    pub fn shutdown(&self) {
        self.send(SessionEvent::Shutdown);
    }

    /// Receive a snapshot every time the visible window changes
    pub fn subscribe(&self) -> broadcast::Receiver<WindowSnapshot> {
        self.snapshots.subscribe()
    }

    fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session already stopped, dropping event");
        }
    }
}

type Completed = (u64, AppResult<LogPage>);

/// Drives a [`RetrievalEngine`] against a backend: owns the timers, runs
/// fetches on the runtime and aborts superseded ones.
pub struct LogSession {
    engine: RetrievalEngine,
    store: FilterStore,
    backend: Arc<dyn LogBackend>,
    timing: RetrievalTiming,
    in_flight: Option<(u64, JoinHandle<()>)>,
    completed_tx: mpsc::UnboundedSender<Completed>,
    completed_rx: mpsc::UnboundedReceiver<Completed>,
    snapshots: broadcast::Sender<WindowSnapshot>,
}

impl LogSession {
    pub fn new(backend: Arc<dyn LogBackend>, store: FilterStore, timing: RetrievalTiming) -> Self {
        let engine = RetrievalEngine::new(store.state().clone(), timing);
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);

        Self {
            engine,
            store,
            backend,
            timing,
            in_flight: None,
            completed_tx,
            completed_rx,
            snapshots,
        }
    }

    pub fn filter(&self) -> &FilterState {
        self.store.state()
    }

    /// Run the session on the current runtime
    pub fn spawn(self) -> (SessionHandle, JoinHandle<FilterStore>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            events: events_tx,
            snapshots: self.snapshots.clone(),
        };

        let task = tokio::spawn(self.run(events_rx));
        (handle, task)
    }

    /// Event loop; returns the filter store when the session ends
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) -> FilterStore {
        info!("Log session started");

        let mut ticker = interval(self.timing.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let commands = self.engine.start(Instant::now());
        self.execute(commands);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let event = match event {
                        Some(SessionEvent::Shutdown) | None => break,
                        Some(event) => event,
                    };
                    self.handle_event(event);
                }
                Some((generation, result)) = self.completed_rx.recv() => {
                    self.handle_completion(generation, result);
                }
                _ = ticker.tick() => {
                    let commands = self.engine.tick(Instant::now());
                    self.execute(commands);
                }
            }
        }

        let commands = self.engine.cancel();
        self.execute(commands);
        info!("Log session stopped");
        self.store
    }

    fn handle_event(&mut self, event: SessionEvent) {
        let now = Instant::now();
        let commands = match event {
            SessionEvent::Filter(patch) => {
                let filter = self.store.update(patch);
                self.engine.set_filter(filter, now)
            }
            SessionEvent::LoadMore => self.engine.load_more(),
            SessionEvent::Refresh => self.engine.refresh(now),
            SessionEvent::HardReset => {
                let commands = self.engine.hard_reset(now);
                self.publish();
                commands
            }
            SessionEvent::Shutdown => Vec::new(),
        };
        self.execute(commands);
    }

    fn handle_completion(&mut self, generation: u64, result: AppResult<LogPage>) {
        if matches!(&self.in_flight, Some((pending, _)) if *pending == generation) {
            self.in_flight = None;
        }

        match self.engine.complete(generation, result) {
            Completion::Applied => self.publish(),
            Completion::Stale | Completion::Cancelled | Completion::Failed => {}
        }
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Cancel { generation } => {
                    if let Some((pending, task)) = self.in_flight.take() {
                        if pending == generation {
                            debug!("Aborting request {}", generation);
                            task.abort();
                        } else {
                            self.in_flight = Some((pending, task));
                        }
                    }
                }
                Command::Fetch(request) => {
                    let backend = self.backend.clone();
                    let completed = self.completed_tx.clone();
                    let generation = request.generation;

                    let task = tokio::spawn(async move {
                        let result = backend.fetch_logs(&request.query).await;
                        if completed.send((request.generation, result)).is_err() {
                            warn!("Session gone before request {} completed", request.generation);
                        }
                    });

                    if let Some((previous, stale)) = self.in_flight.replace((generation, task)) {
                        // The engine cancels before issuing, so this only
                        // happens if the task finished unnoticed
                        debug!("Replacing tracked request {}", previous);
                        stale.abort();
                    }
                }
            }
        }
    }

    fn publish(&self) {
        // No subscribers is fine
        let _ = self.snapshots.send(self.engine.snapshot());
    }
}
