use serde::{Deserialize, Serialize};

use crate::models::filter::FilterState;
use crate::models::log_record::LogRecord;

/// Records per page
pub const PAGE_SIZE: usize = 50;

/// Ceiling for a single export request
pub const EXPORT_LIMIT: usize = 10_000;

/// Query string accepted by the backend log endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub offset: usize,
    pub limit: usize,
    pub search: String,
    pub request_search: String,
    pub response_search: String,
    pub request_rewritten_only: bool,
    pub response_rewritten_only: bool,
    /// Comma-separated
    pub sources: String,
    /// Comma-separated
    pub methods: String,
    /// Comma-separated
    pub file_types: String,
    pub show_ws_connections: bool,
}

impl LogQuery {
    /// Build the query for one page of `filter`
    pub fn page(filter: &FilterState, offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            search: filter.url_search.trim().to_string(),
            request_search: filter.request_search.trim().to_string(),
            response_search: filter.response_search.trim().to_string(),
            request_rewritten_only: filter.request_rewritten_only,
            response_rewritten_only: filter.response_rewritten_only,
            sources: join(filter.effective_sources().iter().map(|s| s.as_str())),
            methods: join(filter.methods.iter().map(String::as_str)),
            file_types: join(filter.file_types.iter().map(|t| t.as_str())),
            show_ws_connections: filter.show_ws_connections,
        }
    }

    /// Everything matching `filter`, up to the export ceiling
    pub fn export(filter: &FilterState) -> Self {
        Self::page(filter, 0, EXPORT_LIMIT)
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(",")
}

/// One page returned by the query endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    #[serde(default)]
    pub items: Vec<LogRecord>,

    #[serde(default)]
    pub total: usize,

    #[serde(default)]
    pub has_more: bool,
}

/// Body returned by the export endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportPayload {
    #[serde(default)]
    pub items: Vec<LogRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::log_record::Source;
    use serde_json::json;

    #[test]
    fn test_query_parameter_names() {
        let mut filter = FilterState::default();
        filter.url_search = "  api;!ads ".to_string();
        filter.sources = [Source::Mitm].into_iter().collect();
        filter.methods = ["GET".to_string(), "POST".to_string()].into_iter().collect();
        filter.file_types.clear();
        filter.show_ws_connections = true;

        let query = LogQuery::page(&filter, 50, PAGE_SIZE);
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "offset": 50,
                "limit": 50,
                "search": "api;!ads",
                "requestSearch": "",
                "responseSearch": "",
                "requestRewrittenOnly": false,
                "responseRewrittenOnly": false,
                "sources": "local,mitm,tunnel,blocked,error,direct",
                "methods": "GET,POST",
                "fileTypes": "",
                "showWsConnections": true
            })
        );
    }

    #[test]
    fn test_export_uses_ceiling() {
        let query = LogQuery::export(&FilterState::default());
        assert_eq!(query.offset, 0);
        assert_eq!(query.limit, EXPORT_LIMIT);
    }

    #[test]
    fn test_page_tolerates_missing_fields() {
        let page: LogPage = serde_json::from_value(json!({ "items": [] })).unwrap();
        assert_eq!(page.total, 0);
        assert!(!page.has_more);
    }

    #[test]
    fn test_page_with_epoch_millis_timestamps_parses() {
        let page: LogPage = serde_json::from_value(json!({
            "items": [
                { "id": 1, "source": "proxied", "timestamp": 1760000000000u64 },
                { "id": 2, "source": "mitm", "timestamp": "2025-10-09T08:53:21Z" }
            ],
            "total": 2,
            "hasMore": false
        }))
        .unwrap();

        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|record| record.timestamp.is_some()));
    }
}
