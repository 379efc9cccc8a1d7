//! Session resolution for inbound connections

use axum::http::HeaderMap;
use std::collections::HashMap;

/// Header carrying a client-chosen session id
pub const SESSION_HEADER: &str = "x-session-id";
/// Query parameter carrying a client-chosen session id
pub const SESSION_QUERY_PARAM: &str = "sessionId";

/// Durable conversation identifier for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub thread_id: String,
    /// True when the client supplied no identifier and one was generated
    pub is_new: bool,
}

/// Pick the session id: header first, then query parameter, else a fresh
/// UUID v4. Blank values count as absent. Never touches the state store.
pub fn resolve(header: Option<&str>, query: Option<&str>) -> ResolvedSession {
    let supplied = [header, query]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|id| !id.is_empty());

    match supplied {
        Some(id) => ResolvedSession {
            thread_id: id.to_string(),
            is_new: false,
        },
        None => ResolvedSession {
            thread_id: uuid::Uuid::new_v4().to_string(),
            is_new: true,
        },
    }
}

/// Resolve from an HTTP upgrade request
pub fn resolve_request(headers: &HeaderMap, query: &HashMap<String, String>) -> ResolvedSession {
    let header = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok());
    resolve(header, query.get(SESSION_QUERY_PARAM).map(String::as_str))
}
