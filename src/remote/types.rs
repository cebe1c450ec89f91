//! Wire types for the remote filter API

use serde::Deserialize;

use crate::filters::FilterRule;

/// Envelope shared by every API response.
///
/// `code == 0` is the only success sentinel; any other value is a business-level rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Payload of the fetch endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleListData {
    /// `null` or absent when the user has no rules.
    #[serde(default)]
    pub rule: Option<Vec<RemoteRule>>,
}

/// One rule as stored on the server.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRule {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: i64,
    pub filter: String,
}

impl From<RemoteRule> for FilterRule {
    fn from(rule: RemoteRule) -> Self {
        FilterRule {
            category: rule.kind.to_string(),
            pattern: rule.filter,
            remote_id: Some(rule.id),
        }
    }
}

/// Result of an add or delete call that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Whether the server reported `code == 0`.
    pub accepted: bool,
    /// The raw `code` value from the response.
    pub raw_status: i64,
    pub message: Option<String>,
}

impl MutationOutcome {
    pub fn from_code(code: i64, message: Option<String>) -> Self {
        Self {
            accepted: code == 0,
            raw_status: code,
            message,
        }
    }
}

/// Error types for remote filter API calls
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    HttpStatus(u16),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    /// Network-level failures (connection, timeout, non-2xx) as opposed to an unexpected body.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_) | RemoteError::HttpStatus(_))
    }
}

/// Parse the body of the fetch endpoint into rules.
pub fn parse_rule_list(body: &[u8]) -> Result<Vec<FilterRule>, RemoteError> {
    let response: ApiResponse<RuleListData> = serde_json::from_slice(body)?;

    if response.code != 0 {
        return Err(RemoteError::Protocol(format!(
            "fetch returned code {}: {}",
            response.code,
            response.message.unwrap_or_default()
        )));
    }

    let data = response
        .data
        .ok_or_else(|| RemoteError::Protocol("fetch response has no data".to_string()))?;

    Ok(data
        .rule
        .unwrap_or_default()
        .into_iter()
        .map(FilterRule::from)
        .collect())
}

/// Parse the body of an add or delete call.
pub fn parse_mutation(body: &[u8]) -> Result<MutationOutcome, RemoteError> {
    let response: ApiResponse<serde_json::Value> = serde_json::from_slice(body)?;
    Ok(MutationOutcome::from_code(response.code, response.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_rule_list() {
        let body = br#"{"code":0,"message":"0","ttl":1,"data":{"rule":[
            {"id":11,"mid":1,"type":0,"filter":"foo","comment":"","ctime":1,"mtime":1},
            {"id":12,"mid":1,"type":1,"filter":"^bar$","comment":"","ctime":1,"mtime":1}
        ],"toast":""}}"#;

        let rules = parse_rule_list(body).unwrap();
        assert_eq!(
            rules,
            vec![
                FilterRule {
                    category: "0".into(),
                    pattern: "foo".into(),
                    remote_id: Some(11)
                },
                FilterRule {
                    category: "1".into(),
                    pattern: "^bar$".into(),
                    remote_id: Some(12)
                },
            ]
        );
    }

    #[test]
    fn null_rule_list_is_empty() {
        let rules = parse_rule_list(br#"{"code":0,"data":{"rule":null}}"#).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn non_zero_fetch_code_is_protocol_error() {
        let err = parse_rule_list(br#"{"code":-101,"message":"not logged in"}"#).unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(msg) if msg.contains("not logged in")));
    }

    #[test]
    fn missing_data_is_protocol_error() {
        let err = parse_rule_list(br#"{"code":0}"#).unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
        assert!(!err.is_transport());
    }

    #[test]
    fn garbage_body_is_json_error() {
        let err = parse_rule_list(b"<html>").unwrap_err();
        assert!(matches!(err, RemoteError::Json(_)));
    }

    #[test]
    fn mutation_status_maps_to_acceptance() {
        let ok = parse_mutation(br#"{"code":0,"message":"0","data":{"id":5}}"#).unwrap();
        assert!(ok.accepted);
        assert_eq!(ok.raw_status, 0);

        let rejected = parse_mutation(br#"{"code":36007,"message":"exists"}"#).unwrap();
        assert_eq!(
            rejected,
            MutationOutcome {
                accepted: false,
                raw_status: 36007,
                message: Some("exists".into())
            }
        );
    }
}
