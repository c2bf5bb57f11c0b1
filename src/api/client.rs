use async_trait::async_trait;
use log::{debug, trace};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::query::{ExportPayload, LogPage, LogQuery};
use crate::models::log_record::LogRecord;
use crate::utils::error::{AppError, AppResult};

/// Backend endpoint for paginated queries
pub const LOGS_ENDPOINT: &str = "/api/logs";

/// Backend endpoint for bulk export
pub const EXPORT_ENDPOINT: &str = "/api/logs/export";

/// Backend endpoint listing blocked patterns
pub const BLOCKED_ENDPOINT: &str = "/api/blocked";

/// What the engine needs from the proxy backend
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// One page of records matching `query`
    async fn fetch_logs(&self, query: &LogQuery) -> AppResult<LogPage>;

    /// Every record matching `query`, up to its limit
    async fn export_logs(&self, query: &LogQuery) -> AppResult<Vec<LogRecord>>;

    /// Raw blocked-pattern payload, shape owned by the backend
    async fn fetch_blocked(&self) -> AppResult<Value>;
}

/// [`LogBackend`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> AppResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::InvalidInputError(format!("invalid backend URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .user_agent(concat!("proxylens/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::InvalidInputError(format!("invalid endpoint '{}': {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: Option<&LogQuery>) -> AppResult<T> {
        let url = self.endpoint(path)?;
        let mut request = self.client.get(url);
        if let Some(query) = query {
            trace!("GET {} {:?}", path, query);
            request = request.query(query);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::BackendStatusError {
                status: status.as_u16(),
                endpoint: path.to_string(),
            });
        }

        let body = response.json::<T>().await?;
        Ok(body)
    }
}

#[async_trait]
impl LogBackend for HttpBackend {
    async fn fetch_logs(&self, query: &LogQuery) -> AppResult<LogPage> {
        let page: LogPage = self.get_json(LOGS_ENDPOINT, Some(query)).await?;
        debug!(
            "Fetched {} records (offset: {}, total: {}, has_more: {})",
            page.items.len(),
            query.offset,
            page.total,
            page.has_more
        );
        Ok(page)
    }

    async fn export_logs(&self, query: &LogQuery) -> AppResult<Vec<LogRecord>> {
        let payload: ExportPayload = self.get_json(EXPORT_ENDPOINT, Some(query)).await?;
        debug!("Export endpoint returned {} records", payload.items.len());
        Ok(payload.items)
    }

    async fn fetch_blocked(&self) -> AppResult<Value> {
        self.get_json(BLOCKED_ENDPOINT, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::filter::FilterState;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serve the canned `(status line, body)` responses in order, one per
    /// connection, reporting each request line
    async fn serve(responses: Vec<(&'static str, &'static str)>) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let request = String::from_utf8_lossy(&request);
                let _ = seen_tx.send(request.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (base, seen_rx)
    }

    #[tokio::test]
    async fn test_fetch_logs_sends_wire_parameters_and_maps_status() {
        let (base, mut seen) = serve(vec![
            (
                "200 OK",
                r#"{"items":[{"id":7,"source":"mitm","timestamp":1760000000000}],"total":1,"hasMore":false}"#,
            ),
            ("500 Internal Server Error", r#"{"error":"boom"}"#),
        ])
        .await;
        let backend = HttpBackend::new(&base).unwrap();
        let query = LogQuery::page(&FilterState::default(), 0, 50);

        let page = backend.fetch_logs(&query).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id.as_str(), "7");
        assert_eq!(page.total, 1);

        let request_line = seen.recv().await.unwrap();
        assert!(request_line.starts_with("GET /api/logs?offset=0&limit=50&search=&"));
        assert!(request_line.contains(
            "requestRewrittenOnly=false&responseRewrittenOnly=false&sources=local%2Cproxied%2Cmitm%2Cwebsocket%2Ctunnel%2Cblocked%2Cerror%2Cdirect"
        ));
        assert!(request_line.contains("methods=DELETE%2CGET%2CPATCH%2CPOST%2CPUT"));
        assert!(request_line.contains("showWsConnections=false"));

        match backend.fetch_logs(&query).await {
            Err(AppError::BackendStatusError { status, endpoint }) => {
                assert_eq!(status, 500);
                assert_eq!(endpoint, LOGS_ENDPOINT);
            }
            other => panic!("expected a status error, got {:?}", other.map(|page| page.total)),
        }
    }

    #[test]
    fn test_endpoints_join_onto_base() {
        let backend = HttpBackend::new("http://127.0.0.1:8080/dashboard/").unwrap();
        assert_eq!(backend.endpoint(LOGS_ENDPOINT).unwrap().as_str(), "http://127.0.0.1:8080/api/logs");
        assert_eq!(backend.endpoint(EXPORT_ENDPOINT).unwrap().path(), "/api/logs/export");
    }

    #[test]
    fn test_rejects_unparseable_base() {
        assert!(matches!(HttpBackend::new("not a url"), Err(AppError::InvalidInputError(_))));
    }
}
