use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Timers driving the retrieval engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalTiming {
    /// Quiet period after the last text edit before a query goes out
    pub debounce: Duration,

    /// Re-poll period while the loaded window is thinner than a page
    pub poll_interval: Duration,

    /// How often the session checks its timers
    pub tick: Duration,
}

impl Default for RetrievalTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(2000),
            tick: Duration::from_millis(100),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the proxy backend
    pub backend_url: String,

    /// File holding persisted filter preferences
    pub prefs_path: PathBuf,

    /// Directory exports are written to
    pub export_dir: PathBuf,

    /// Retrieval timers
    pub timing: RetrievalTiming,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8080".to_string(),
            prefs_path: PathBuf::from("proxylens-prefs.json"),
            export_dir: PathBuf::from("."),
            timing: RetrievalTiming::default(),
        }
    }
}
