//! Typed wrappers for the orchestrator's operation catalogue.
//!
//! Every operation is a single control channel call. Credentials stay on
//! the orchestrator side: tasks pass secret *names*, never secret values,
//! for FTP and database operations.

use std::fmt;
use std::str::FromStr;

use crate::bridge::client::{CallError, ChannelClient};
use crate::bridge::protocol::{
    FTP_DOWNLOAD, FTP_LIST, FTP_MOVE, FTP_UPLOAD, GET_SECRET, GET_SECRET_FIELD, LOAD_DATA, Params,
};

pub const DEFAULT_LOAD_SCHEMA: &str = "dbo";
pub const DEFAULT_FTP_PATTERN: &str = "*";

#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error(transparent)]
    Call(#[from] CallError),

    #[error("{method} returned an unexpected result: {source}")]
    InvalidResult {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown load mode '{0}': expected append, truncate_and_load or create_or_replace")]
    UnknownLoadMode(String),
}

/// How `load_data` treats the target table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadMode {
    #[default]
    Append,
    TruncateAndLoad,
    /// Drop and recreate the table from the Parquet schema.
    CreateOrReplace,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::TruncateAndLoad => "truncate_and_load",
            Self::CreateOrReplace => "create_or_replace",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadMode {
    type Err = OpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(Self::Append),
            "truncate_and_load" => Ok(Self::TruncateAndLoad),
            "create_or_replace" => Ok(Self::CreateOrReplace),
            other => Err(OpError::UnknownLoadMode(other.to_string())),
        }
    }
}

/// Bulk load of a Parquet file from the data directory into a database table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// File name relative to the data directory, e.g. `orders.parquet`.
    pub file: String,
    pub table: String,
    /// Secret key holding the connection string.
    pub connection: String,
    pub schema: String,
    pub mode: LoadMode,
}

impl LoadRequest {
    pub fn new(
        file: impl Into<String>,
        table: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            table: table.into(),
            connection: connection.into(),
            schema: DEFAULT_LOAD_SCHEMA.to_string(),
            mode: LoadMode::default(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    fn params(&self) -> Params {
        Params::from([
            ("file".to_string(), self.file.clone()),
            ("table".to_string(), self.table.clone()),
            ("connection".to_string(), self.connection.clone()),
            ("schema".to_string(), self.schema.clone()),
            ("mode".to_string(), self.mode.as_str().to_string()),
        ])
    }
}

/// What `ftp_download` fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtpSource {
    /// One file by its full remote path.
    File(String),
    /// Every file in `directory` matching a glob `pattern`.
    Matching { directory: String, pattern: String },
}

impl FtpSource {
    fn extend(&self, params: &mut Params) {
        match self {
            Self::File(remote_path) => {
                params.insert("remote_path".to_string(), remote_path.clone());
            }
            Self::Matching { directory, pattern } => {
                params.insert("directory".to_string(), directory.clone());
                params.insert("pattern".to_string(), pattern.clone());
            }
        }
    }
}

fn params<const N: usize>(pairs: [(&str, &str); N]) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse_names(method: &'static str, result: &str) -> Result<Vec<String>, OpError> {
    serde_json::from_str(result).map_err(|source| OpError::InvalidResult { method, source })
}

impl ChannelClient {
    /// Look up a secret for the current project.
    pub fn get_secret(&self, key: &str) -> Result<String, CallError> {
        self.call(GET_SECRET, params([("key", key)]))
    }

    /// Look up one field of a structured secret.
    pub fn get_secret_field(&self, secret: &str, field: &str) -> Result<String, CallError> {
        self.call(
            GET_SECRET_FIELD,
            params([("secret", secret), ("field", field)]),
        )
    }

    /// Ask the orchestrator to bulk-load a Parquet output. Returns its status
    /// message, e.g. `"1000 rows loaded"`.
    pub fn load_data(&self, request: &LoadRequest) -> Result<String, CallError> {
        self.call(LOAD_DATA, request.params())
    }

    /// Names (not paths) of remote files in `directory` matching `pattern`.
    pub fn ftp_list(
        &self,
        secret: &str,
        directory: &str,
        pattern: &str,
    ) -> Result<Vec<String>, OpError> {
        let result = self.call(
            FTP_LIST,
            params([
                ("secret", secret),
                ("directory", directory),
                ("pattern", pattern),
            ]),
        )?;
        parse_names(FTP_LIST, &result)
    }

    /// Download into the data directory. Returns the downloaded file names.
    pub fn ftp_download(&self, secret: &str, source: &FtpSource) -> Result<Vec<String>, OpError> {
        let mut p = params([("secret", secret)]);
        source.extend(&mut p);
        let result = self.call(FTP_DOWNLOAD, p)?;
        parse_names(FTP_DOWNLOAD, &result)
    }

    /// Upload `local_name` from the data directory to `remote_path`.
    pub fn ftp_upload(
        &self,
        secret: &str,
        local_name: &str,
        remote_path: &str,
    ) -> Result<(), CallError> {
        self.call(
            FTP_UPLOAD,
            params([
                ("secret", secret),
                ("local_name", local_name),
                ("remote_path", remote_path),
            ]),
        )
        .map(drop)
    }

    /// Move or rename a remote file.
    pub fn ftp_move(&self, secret: &str, src: &str, dst: &str) -> Result<(), CallError> {
        self.call(
            FTP_MOVE,
            params([("secret", secret), ("src", src), ("dst", dst)]),
        )
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_request_defaults() {
        let req = LoadRequest::new("orders.parquet", "orders", "warehouse_conn");
        assert_eq!(req.schema, "dbo");
        assert_eq!(req.mode, LoadMode::Append);

        let p = req.params();
        assert_eq!(p["file"], "orders.parquet");
        assert_eq!(p["table"], "orders");
        assert_eq!(p["connection"], "warehouse_conn");
        assert_eq!(p["schema"], "dbo");
        assert_eq!(p["mode"], "append");
    }

    #[test]
    fn load_mode_parses_wire_names() {
        for mode in [
            LoadMode::Append,
            LoadMode::TruncateAndLoad,
            LoadMode::CreateOrReplace,
        ] {
            assert_eq!(mode.as_str().parse::<LoadMode>().unwrap(), mode);
        }
        assert!(matches!(
            "upsert".parse::<LoadMode>(),
            Err(OpError::UnknownLoadMode(_))
        ));
    }

    #[test]
    fn ftp_source_params() {
        let mut p = Params::new();
        FtpSource::File("/incoming/report.csv".to_string()).extend(&mut p);
        assert_eq!(p.len(), 1);
        assert_eq!(p["remote_path"], "/incoming/report.csv");

        let mut p = Params::new();
        FtpSource::Matching {
            directory: "/incoming".to_string(),
            pattern: "*.csv".to_string(),
        }
        .extend(&mut p);
        assert_eq!(p.len(), 2);
        assert_eq!(p["directory"], "/incoming");
        assert_eq!(p["pattern"], "*.csv");
    }

    #[test]
    fn parse_names_requires_string_array() {
        assert_eq!(
            parse_names(FTP_LIST, r#"["a.csv","b.csv"]"#).unwrap(),
            ["a.csv", "b.csv"]
        );
        assert!(parse_names(FTP_LIST, "[]").unwrap().is_empty());
        assert!(matches!(
            parse_names(FTP_LIST, r#"{"a":1}"#),
            Err(OpError::InvalidResult { method: "ftp_list", .. })
        ));
    }
}
