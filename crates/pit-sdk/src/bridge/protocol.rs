//! Wire documents for the task control channel.
//!
//! Request (task → orchestrator):
//! `{"method": "get_secret", "params": {"key": "db_password"}}`
//!
//! Response (orchestrator → task):
//! `{"result": "hunter2"}` or `{"result": "", "error": "secret not found"}`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String-keyed, string-valued request parameters.
pub type Params = BTreeMap<String, String>;

pub const GET_SECRET: &str = "get_secret";
pub const GET_SECRET_FIELD: &str = "get_secret_field";
pub const LOAD_DATA: &str = "load_data";
pub const FTP_LIST: &str = "ftp_list";
pub const FTP_DOWNLOAD: &str = "ftp_download";
pub const FTP_UPLOAD: &str = "ftp_upload";
pub const FTP_MOVE: &str = "ftp_move";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("method name must not be empty")]
    EmptyMethod,

    #[error("empty message: peer closed without sending a document")]
    Empty,

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A single control request. Consumed by the exchange that sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Params,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Params) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Reply to a control request.
///
/// A non-empty `error` is a failure no matter what `result` holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub result: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            result: String::new(),
            error: (!error.is_empty()).then_some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Collapse into the result string, or the peer's error message.
    pub fn into_result(self) -> Result<String, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|e| !e.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes() {
        let req = Request::new(GET_SECRET, Params::new()).with_param("key", "db_password");
        insta::assert_json_snapshot!(req, @r#"
        {
          "method": "get_secret",
          "params": {
            "key": "db_password"
          }
        }
        "#);
    }

    #[test]
    fn request_params_are_ordered() {
        let req = Request::new(LOAD_DATA, Params::new())
            .with_param("table", "sales")
            .with_param("file", "out.parquet")
            .with_param("mode", "append");
        insta::assert_json_snapshot!(req, @r#"
        {
          "method": "load_data",
          "params": {
            "file": "out.parquet",
            "mode": "append",
            "table": "sales"
          }
        }
        "#);
    }

    #[test]
    fn ok_response_omits_error() {
        let resp = Response::ok("1000 rows loaded");
        insta::assert_json_snapshot!(resp, @r#"
        {
          "result": "1000 rows loaded"
        }
        "#);
    }

    #[test]
    fn error_response_serializes() {
        let resp = Response::err("unknown method: nope");
        insta::assert_json_snapshot!(resp, @r#"
        {
          "result": "",
          "error": "unknown method: nope"
        }
        "#);
    }

    #[test]
    fn empty_error_is_not_an_error() {
        assert!(!Response::err("").is_error());
    }

    #[test]
    fn into_result_prefers_error() {
        let resp = Response {
            result: "ignored".to_string(),
            error: Some("not found".to_string()),
        };
        assert_eq!(resp.into_result(), Err("not found".to_string()));
        assert_eq!(Response::ok("v").into_result(), Ok("v".to_string()));
    }
}
