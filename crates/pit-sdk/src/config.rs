//! Task process configuration.
//!
//! The orchestrator launches every task with its channel address and data
//! directory in the environment. Both are read exactly once, at startup, and
//! threaded into the components that need them. Nothing in the call path
//! touches the environment again.

use std::path::PathBuf;

use tracing::Span;

use crate::bridge::client::ChannelClient;
use crate::data::DataDir;

/// Channel address: a Unix socket path, or `host:port` for loopback TCP.
pub const SOCKET_ENV: &str = "PIT_SOCKET";
/// The task's private working-data directory.
pub const DATA_DIR_ENV: &str = "PIT_DATA_DIR";
pub const RUN_ID_ENV: &str = "PIT_RUN_ID";
pub const TASK_NAME_ENV: &str = "PIT_TASK_NAME";
pub const DAG_NAME_ENV: &str = "PIT_DAG_NAME";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} environment variable not set; are you running inside a pit task?")]
    Missing { var: &'static str },

    #[error("channel address is empty")]
    EmptyAddress,

    #[error("invalid port '{port}' in channel address '{address}'")]
    InvalidPort { address: String, port: String },
}

impl ConfigError {
    pub fn missing(var: &'static str) -> Self {
        Self::Missing { var }
    }
}

/// Configuration captured from the task environment.
///
/// Empty values are treated as absent, never defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskConfig {
    pub socket: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub run_id: Option<String>,
    pub task_name: Option<String>,
    pub dag_name: Option<String>,
}

impl TaskConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());
        Self {
            socket: get(SOCKET_ENV),
            data_dir: get(DATA_DIR_ENV).map(PathBuf::from),
            run_id: get(RUN_ID_ENV),
            task_name: get(TASK_NAME_ENV),
            dag_name: get(DAG_NAME_ENV),
        }
    }

    pub fn with_socket(mut self, address: impl Into<String>) -> Self {
        self.socket = Some(address.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Check that both mandatory values are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket()?;
        self.data_dir_path()?;
        Ok(())
    }

    pub fn socket(&self) -> Result<&str, ConfigError> {
        self.socket
            .as_deref()
            .ok_or(ConfigError::missing(SOCKET_ENV))
    }

    pub fn data_dir_path(&self) -> Result<&PathBuf, ConfigError> {
        self.data_dir
            .as_ref()
            .ok_or(ConfigError::missing(DATA_DIR_ENV))
    }

    /// Span carrying the run, task and DAG identity. Absent values are
    /// left empty.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "task",
            run_id = self.run_id.as_deref(),
            task = self.task_name.as_deref(),
            dag = self.dag_name.as_deref()
        )
    }

    /// Channel client bound to this configuration. Calls are recorded under
    /// [`Self::span`].
    ///
    /// A missing address is reported by the first call, before any
    /// connection attempt.
    pub fn channel(&self) -> ChannelClient {
        ChannelClient::new(self.socket.clone()).in_span(self.span())
    }

    pub fn data_dir(&self) -> Result<DataDir, ConfigError> {
        Ok(DataDir::new(self.data_dir_path()?.clone()).in_span(self.span()))
    }
}
