use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::filter::preferences::{filter_key, PreferenceStore};
use crate::models::filter::{ContentBucket, FilterPatch, FilterState};
use crate::models::log_record::Source;

/// Callback invoked with the full new state after every update
pub type FilterListener = Box<dyn Fn(&FilterState) + Send + Sync>;

/// Owns the operator's filter state, keeps it persisted and tells
/// listeners about changes
pub struct FilterStore {
    prefs: Arc<dyn PreferenceStore>,
    state: FilterState,
    listeners: Vec<FilterListener>,
}

impl FilterStore {
    /// Restore every dimension from `prefs`, substituting defaults for
    /// anything missing or malformed
    pub fn load(prefs: Arc<dyn PreferenceStore>) -> Self {
        let defaults = FilterState::default();

        let sources = match prefs.get(&filter_key("sources")) {
            Some(raw) => match parse_sources(&raw) {
                Some((sources, true)) => {
                    info!("Migrated legacy source categories in persisted filter: {}", raw);
                    persist(prefs.as_ref(), "sources", &encode_set(&sources));
                    sources
                }
                Some((sources, false)) => sources,
                None => {
                    warn!("Ignoring malformed persisted source filter: {}", raw);
                    defaults.sources.clone()
                }
            },
            None => defaults.sources.clone(),
        };

        let methods = read_json::<Vec<String>>(prefs.as_ref(), "methods")
            .map(|methods| methods.iter().map(|m| m.trim().to_uppercase()).filter(|m| !m.is_empty()).collect())
            .unwrap_or_else(|| defaults.methods.clone());

        let file_types = read_json::<Vec<String>>(prefs.as_ref(), "fileTypes")
            .map(|types| types.iter().filter_map(|t| t.parse::<ContentBucket>().ok()).collect())
            .unwrap_or_else(|| defaults.file_types.clone());

        let state = FilterState {
            url_search: read_text(prefs.as_ref(), "urlSearch"),
            request_search: read_text(prefs.as_ref(), "requestSearch"),
            response_search: read_text(prefs.as_ref(), "responseSearch"),
            sources,
            methods,
            file_types,
            request_rewritten_only: read_flag(prefs.as_ref(), "requestRewrittenOnly"),
            response_rewritten_only: read_flag(prefs.as_ref(), "responseRewrittenOnly"),
            show_ws_connections: read_flag(prefs.as_ref(), "showWsConnections"),
        };

        debug!("Loaded filter state: {:?}", state);

        Self {
            prefs,
            state,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Register a change listener
    pub fn on_change<F>(&mut self, listener: F)
    where
        F: Fn(&FilterState) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Apply `patch`, persist the dimensions it changed and notify listeners
    pub fn update(&mut self, patch: FilterPatch) -> FilterState {
        let changed = patch.apply_to(&mut self.state);

        for dimension in &changed {
            let encoded = encode_dimension(&self.state, dimension);
            persist(self.prefs.as_ref(), dimension, &encoded);
        }

        if !changed.is_empty() {
            debug!("Filter dimensions changed: {:?}", changed);
        }

        self.notify();
        self.state.clone()
    }

    /// Restore every dimension to its default and persist the result
    pub fn reset(&mut self) -> FilterState {
        self.state = FilterState::default();

        for dimension in DIMENSIONS {
            let encoded = encode_dimension(&self.state, dimension);
            persist(self.prefs.as_ref(), dimension, &encoded);
        }

        self.notify();
        self.state.clone()
    }

    fn notify(&self) {
        for listener in &self.listeners {
            listener(&self.state);
        }
    }
}

const DIMENSIONS: [&str; 9] = [
    "urlSearch",
    "requestSearch",
    "responseSearch",
    "sources",
    "methods",
    "fileTypes",
    "requestRewrittenOnly",
    "responseRewrittenOnly",
    "showWsConnections",
];

/// Parse a persisted source whitelist. The flag reports whether legacy
/// transport tokens were folded into `websocket`.
fn parse_sources(raw: &str) -> Option<(BTreeSet<Source>, bool)> {
    let tokens: Vec<String> = serde_json::from_str(raw).ok()?;

    let mut migrated = false;
    let mut sources = BTreeSet::new();
    for token in &tokens {
        match token.parse::<Source>() {
            Ok(source) if source.is_legacy_transport() => {
                migrated = true;
                sources.insert(Source::Websocket);
            }
            Ok(source) => {
                sources.insert(source);
            }
            Err(_) => debug!("Dropping unknown persisted source token '{}'", token),
        }
    }

    Some((sources, migrated))
}

fn read_text(prefs: &dyn PreferenceStore, dimension: &str) -> String {
    prefs.get(&filter_key(dimension)).unwrap_or_default()
}

fn read_flag(prefs: &dyn PreferenceStore, dimension: &str) -> bool {
    match prefs.get(&filter_key(dimension)).as_deref().map(str::trim) {
        Some("true") => true,
        Some("false") | None => false,
        Some(other) => {
            warn!("Ignoring malformed persisted flag {}={}", dimension, other);
            false
        }
    }
}

fn read_json<T: DeserializeOwned>(prefs: &dyn PreferenceStore, dimension: &str) -> Option<T> {
    let raw = prefs.get(&filter_key(dimension))?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring malformed persisted {} filter: {}", dimension, e);
            None
        }
    }
}

fn encode_set<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    let items: Vec<String> = items.into_iter().map(|item| item.to_string()).collect();
    serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string())
}

fn encode_dimension(state: &FilterState, dimension: &str) -> String {
    match dimension {
        "urlSearch" => state.url_search.clone(),
        "requestSearch" => state.request_search.clone(),
        "responseSearch" => state.response_search.clone(),
        "sources" => encode_set(&state.sources),
        "methods" => encode_set(&state.methods),
        "fileTypes" => encode_set(&state.file_types),
        "requestRewrittenOnly" => state.request_rewritten_only.to_string(),
        "responseRewrittenOnly" => state.response_rewritten_only.to_string(),
        "showWsConnections" => state.show_ws_connections.to_string(),
        other => {
            warn!("Unknown filter dimension '{}'", other);
            String::new()
        }
    }
}

/// Best-effort write; a failing store never takes the view down
fn persist(prefs: &dyn PreferenceStore, dimension: &str, value: &str) {
    if let Err(e) = prefs.set(&filter_key(dimension), value) {
        warn!("Failed to persist filter preference {}: {}", dimension, e);
    }
}
