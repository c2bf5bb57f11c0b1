use log::debug;
use serde_json::Value;

use crate::models::log_record::LogRecord;
use crate::models::rule::{RuleKind, RuleSeed, RuleTarget, SeedValueType};
use crate::rules::json_path::{derive, seed_value_text, NodeKey};

/// Last non-empty path segment of a URL pattern, ignoring scheme, host,
/// query, fragment and trailing slashes
pub fn endpoint_label(url_pattern: &str) -> Option<String> {
    let without_suffix = url_pattern.split(['?', '#']).next().unwrap_or("");
    let path = match without_suffix.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |start| &rest[start..]),
        None => without_suffix,
    };
    path
        .trim_end_matches('/')
        .rsplit('/')
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// `"<endpoint>: <path>"`, or the bare path when there is no endpoint
pub fn rule_name(endpoint: Option<&str>, path: &str) -> String {
    match endpoint {
        Some(label) if !label.is_empty() => format!("{}: {}", label, path),
        _ => path.to_string(),
    }
}

/// Build a JSON-path rule seed for the node at `key_path` inside `root`
pub fn build_rule_seed(root: &Value, key_path: &[NodeKey], url_pattern: &str, target: RuleTarget) -> RuleSeed {
    let derived = derive(root, key_path);
    if derived.value.is_none() {
        debug!("Path {} does not resolve, seeding with an empty value", derived.path);
    }

    let label = endpoint_label(url_pattern);
    RuleSeed {
        kind: RuleKind::JsonPath,
        name: rule_name(label.as_deref(), &derived.path),
        value: seed_value_text(derived.value.as_ref()),
        path: derived.path,
        value_type: SeedValueType::String,
        url: url_pattern.to_string(),
        target,
    }
}

/// Body the JSON tree for `target` is rendered from
pub fn body_for_target(record: &LogRecord, target: RuleTarget) -> Option<Value> {
    let body = match target {
        RuleTarget::Request => record.request_body.as_ref(),
        RuleTarget::Response | RuleTarget::Both => record.response_body.as_ref(),
    };
    body.and_then(|body| body.as_json())
}

/// Seed a rule from a node selected in `record`'s body and hand it to
/// `on_seed`. Returns `false` when that body is not JSON.
pub fn seed_from_record<F>(record: &LogRecord, key_path: &[NodeKey], target: RuleTarget, on_seed: F) -> bool
where
    F: FnOnce(RuleSeed),
{
    match body_for_target(record, target) {
        Some(root) => {
            on_seed(build_rule_seed(&root, key_path, record.display_url(), target));
            true
        }
        None => {
            debug!("Record {} has no JSON {} body to seed from", record.id, target);
            false
        }
    }
}
