//! Boolean search mini-language used by the URL, request and response
//! search boxes.
//!
//! A query is a list of clauses separated by `||`. Each clause is a list of
//! terms separated by `;`, all of which must match. A term prefixed with `!`
//! must *not* occur in the text. Matching is case-insensitive substring
//! containment. There is no escaping: `||`, `;` and a leading `!` are always
//! structural.
//!
//! ```text
//! api;!facebook            contains "api" and not "facebook"
//! api;!facebook||users     ...or contains "users"
//! ```

const CLAUSE_SEPARATOR: &str = "||";
const TERM_SEPARATOR: char = ';';
const NEGATION: char = '!';

/// One containment test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Contains(String),
    Excludes(String),
}

impl Term {
    fn parse(raw: &str) -> Option<Term> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        match raw.strip_prefix(NEGATION) {
            Some(negated) => {
                let needle = negated.trim();
                // A lone "!" carries nothing to test against
                if needle.is_empty() {
                    None
                } else {
                    Some(Term::Excludes(needle.to_lowercase()))
                }
            }
            None => Some(Term::Contains(raw.to_lowercase())),
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        match self {
            Term::Contains(needle) => haystack.contains(needle.as_str()),
            Term::Excludes(needle) => !haystack.contains(needle.as_str()),
        }
    }
}

/// A parsed query: OR of clauses, each an AND of terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    clauses: Vec<Vec<Term>>,
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        let clauses = query
            .split(CLAUSE_SEPARATOR)
            .map(|clause| clause.split(TERM_SEPARATOR).filter_map(Term::parse).collect::<Vec<_>>())
            .filter(|terms| !terms.is_empty())
            .collect();

        Self { clauses }
    }

    /// A query without any terms matches everything
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Vec<Term>] {
        &self.clauses
    }

    pub fn matches(&self, haystack: &str) -> bool {
        if self.clauses.is_empty() {
            return true;
        }

        let haystack = haystack.to_lowercase();
        self.clauses
            .iter()
            .any(|terms| terms.iter().all(|term| term.matches(&haystack)))
    }
}

/// Evaluate `query` against `haystack`
pub fn matches(haystack: &str, query: &str) -> bool {
    SearchQuery::parse(query).matches(haystack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(matches("anything", ""));
        assert!(matches("", ""));
        assert!(matches("anything", "  ;  || ; "));
    }

    #[test]
    fn test_single_negation() {
        assert!(matches("https://example.com", "!tracker"));
        assert!(!matches("https://Tracker.example.com", "!tracker"));
    }

    #[test]
    fn test_and_within_clause() {
        assert!(matches("apiUsers", "api;!facebook"));
        assert!(!matches("facebook.com/api", "api;!facebook"));
        assert!(!matches("users", "api;users"));
    }

    #[test]
    fn test_or_across_clauses() {
        assert!(matches("users/42", "api;!facebook||users;!tracking"));
        assert!(!matches("users/tracking", "api;!facebook||users;!tracking"));
    }

    #[test]
    fn test_whitespace_and_case_are_ignored() {
        assert!(matches("GET /API/Users", "  api ;  users  "));
        assert!(matches("/health", " ! metrics "));
    }

    #[test]
    fn test_negation_only_clause() {
        assert!(matches("/static/app.js", "!ads;!analytics"));
        assert!(!matches("/static/analytics.js", "!ads;!analytics"));
    }

    #[test]
    fn test_parse_drops_empty_terms() {
        let query = SearchQuery::parse("a;;!b||  ||c");
        assert_eq!(
            query.clauses(),
            &[
                vec![Term::Contains("a".to_string()), Term::Excludes("b".to_string())],
                vec![Term::Contains("c".to_string())],
            ]
        );
    }
}
