use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::models::log_record::Source;

/// Content-type families the backend can filter by (`fileTypes`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentBucket {
    Json,
    Html,
    Js,
    Css,
    Image,
    Font,
    Media,
    Other,
}

impl ContentBucket {
    pub const ALL: [ContentBucket; 8] = [
        ContentBucket::Json,
        ContentBucket::Html,
        ContentBucket::Js,
        ContentBucket::Css,
        ContentBucket::Image,
        ContentBucket::Font,
        ContentBucket::Media,
        ContentBucket::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentBucket::Json => "json",
            ContentBucket::Html => "html",
            ContentBucket::Js => "js",
            ContentBucket::Css => "css",
            ContentBucket::Image => "image",
            ContentBucket::Font => "font",
            ContentBucket::Media => "media",
            ContentBucket::Other => "other",
        }
    }

    /// Bucket a response by its content type, falling back to the URL's
    /// file extension when the header is missing or generic.
    pub fn classify(content_type: Option<&str>, url: &str) -> ContentBucket {
        let mime = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        let by_mime = if mime.contains("json") {
            Some(ContentBucket::Json)
        } else if mime.contains("html") {
            Some(ContentBucket::Html)
        } else if mime.contains("javascript") || mime.contains("ecmascript") {
            Some(ContentBucket::Js)
        } else if mime == "text/css" {
            Some(ContentBucket::Css)
        } else if mime.starts_with("image/") {
            Some(ContentBucket::Image)
        } else if mime.starts_with("font/") || mime.contains("font-") {
            Some(ContentBucket::Font)
        } else if mime.starts_with("audio/") || mime.starts_with("video/") {
            Some(ContentBucket::Media)
        } else {
            None
        };

        if let Some(bucket) = by_mime {
            return bucket;
        }

        let path = url.split(['?', '#']).next().unwrap_or("");
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => ContentBucket::Json,
            "html" | "htm" => ContentBucket::Html,
            "js" | "mjs" => ContentBucket::Js,
            "css" => ContentBucket::Css,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "avif" => ContentBucket::Image,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => ContentBucket::Font,
            "mp4" | "webm" | "mp3" | "ogg" | "wav" | "m3u8" => ContentBucket::Media,
            _ => ContentBucket::Other,
        }
    }
}

impl fmt::Display for ContentBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ContentBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentBucket::ALL
            .iter()
            .copied()
            .find(|bucket| bucket.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown content bucket '{}'", s))
    }
}

/// Methods shown until the operator picks otherwise
pub const DEFAULT_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Sources shown until the operator picks otherwise
pub const DEFAULT_SOURCES: [Source; 3] = [Source::Proxied, Source::Mitm, Source::Websocket];

/// The operator's current view definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// Boolean search over URLs
    pub url_search: String,

    /// Boolean search over request bodies
    pub request_search: String,

    /// Boolean search over response bodies
    pub response_search: String,

    /// Source whitelist
    pub sources: BTreeSet<Source>,

    /// HTTP method whitelist, upper-case
    pub methods: BTreeSet<String>,

    /// Content-type bucket whitelist
    pub file_types: BTreeSet<ContentBucket>,

    pub request_rewritten_only: bool,

    pub response_rewritten_only: bool,

    /// Show protocol-housekeeping frames and connection entries
    pub show_ws_connections: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            url_search: String::new(),
            request_search: String::new(),
            response_search: String::new(),
            sources: DEFAULT_SOURCES.iter().copied().collect(),
            methods: DEFAULT_METHODS.iter().map(|m| m.to_string()).collect(),
            file_types: ContentBucket::ALL.iter().copied().collect(),
            request_rewritten_only: false,
            response_rewritten_only: false,
            show_ws_connections: false,
        }
    }
}

impl FilterState {
    /// Whether records of `source` are part of the view. Local, blocked and
    /// error records as well as legacy transport markers are never filtered
    /// out by protocol selection.
    pub fn includes_source(&self, source: Source) -> bool {
        match source {
            Source::Local | Source::Blocked | Source::Error => true,
            s if s.is_legacy_transport() => true,
            s => self.sources.contains(&s),
        }
    }

    /// The source set the backend has to be asked for
    pub fn effective_sources(&self) -> Vec<Source> {
        Source::ALL
            .iter()
            .copied()
            .filter(|source| self.includes_source(*source))
            .collect()
    }

    /// Whether the debounced free-text fields differ
    pub fn text_differs(&self, other: &FilterState) -> bool {
        self.url_search != other.url_search
            || self.request_search != other.request_search
            || self.response_search != other.response_search
    }

    /// Whether any of the discrete (set/toggle) fields differ
    pub fn discrete_differs(&self, other: &FilterState) -> bool {
        self.sources != other.sources
            || self.methods != other.methods
            || self.file_types != other.file_types
            || self.request_rewritten_only != other.request_rewritten_only
            || self.response_rewritten_only != other.response_rewritten_only
            || self.show_ws_connections != other.show_ws_connections
    }
}

/// A partial update to [`FilterState`]; `None` leaves the field as is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPatch {
    pub url_search: Option<String>,
    pub request_search: Option<String>,
    pub response_search: Option<String>,
    pub sources: Option<BTreeSet<Source>>,
    pub methods: Option<BTreeSet<String>>,
    pub file_types: Option<BTreeSet<ContentBucket>>,
    pub request_rewritten_only: Option<bool>,
    pub response_rewritten_only: Option<bool>,
    pub show_ws_connections: Option<bool>,
}

impl FilterPatch {
    pub fn url_search(search: impl Into<String>) -> Self {
        Self {
            url_search: Some(search.into()),
            ..Default::default()
        }
    }

    pub fn sources(sources: impl IntoIterator<Item = Source>) -> Self {
        Self {
            sources: Some(sources.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == FilterPatch::default()
    }

    /// Apply onto `state`, returning the fields that actually changed as
    /// preference key suffixes
    pub fn apply_to(self, state: &mut FilterState) -> Vec<&'static str> {
        let FilterPatch {
            url_search,
            request_search,
            response_search,
            sources,
            methods,
            file_types,
            request_rewritten_only,
            response_rewritten_only,
            show_ws_connections,
        } = self;
        let mut changed = Vec::new();

        macro_rules! assign {
            ($field:ident, $key:expr) => {
                if let Some(value) = $field {
                    if state.$field != value {
                        state.$field = value;
                        changed.push($key);
                    }
                }
            };
        }

        assign!(url_search, "urlSearch");
        assign!(request_search, "requestSearch");
        assign!(response_search, "responseSearch");
        assign!(sources, "sources");
        if let Some(methods) = methods {
            let methods: BTreeSet<String> = methods.iter().map(|m| m.trim().to_uppercase()).collect();
            if state.methods != methods {
                state.methods = methods;
                changed.push("methods");
            }
        }
        assign!(file_types, "fileTypes");
        assign!(request_rewritten_only, "requestRewrittenOnly");
        assign!(response_rewritten_only, "responseRewrittenOnly");
        assign!(show_ws_connections, "showWsConnections");

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = FilterState::default();
        assert!(state.url_search.is_empty());
        assert_eq!(state.sources.len(), 3);
        assert!(state.methods.contains("PATCH"));
        assert_eq!(state.file_types.len(), ContentBucket::ALL.len());
        assert!(!state.show_ws_connections);
    }

    #[test]
    fn test_always_included_sources() {
        let mut state = FilterState::default();
        state.sources.clear();

        assert!(state.includes_source(Source::Local));
        assert!(state.includes_source(Source::Blocked));
        assert!(state.includes_source(Source::Error));
        assert!(state.includes_source(Source::Tunnel));
        assert!(state.includes_source(Source::Direct));
        assert!(!state.includes_source(Source::Mitm));
        assert!(!state.includes_source(Source::Unknown));

        state.sources.insert(Source::Mitm);
        assert_eq!(
            state.effective_sources(),
            vec![Source::Local, Source::Mitm, Source::Tunnel, Source::Blocked, Source::Error, Source::Direct]
        );
    }

    #[test]
    fn test_patch_reports_changed_fields_only() {
        let mut state = FilterState::default();
        let patch = FilterPatch {
            url_search: Some("api".to_string()),
            methods: Some(["get".to_string(), "post ".to_string()].into_iter().collect()),
            show_ws_connections: Some(false),
            ..Default::default()
        };

        let changed = patch.apply_to(&mut state);
        assert_eq!(changed, vec!["urlSearch", "methods"]);
        assert_eq!(state.methods, ["GET", "POST"].iter().map(|m| m.to_string()).collect());
    }

    #[test]
    fn test_text_and_discrete_differences() {
        let base = FilterState::default();
        let mut typed = base.clone();
        typed.response_search = "token".to_string();
        assert!(typed.text_differs(&base));
        assert!(!typed.discrete_differs(&base));

        let mut toggled = base.clone();
        toggled.request_rewritten_only = true;
        assert!(toggled.discrete_differs(&base));
        assert!(!toggled.text_differs(&base));
    }

    #[test]
    fn test_classify_buckets() {
        assert_eq!(ContentBucket::classify(Some("application/json"), "/x"), ContentBucket::Json);
        assert_eq!(ContentBucket::classify(Some("text/javascript"), "/x"), ContentBucket::Js);
        assert_eq!(ContentBucket::classify(None, "/static/app.css?v=2"), ContentBucket::Css);
        assert_eq!(ContentBucket::classify(Some("application/octet-stream"), "/a/logo.PNG"), ContentBucket::Image);
        assert_eq!(ContentBucket::classify(None, "/download"), ContentBucket::Other);
    }
}
