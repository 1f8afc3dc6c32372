//! pit-sdk: task-side runtime for the pit orchestrator.

pub mod bridge;
pub mod config;
pub mod data;
pub mod logging;
pub mod materialize;
pub mod ops;

pub use bridge::address::{Address, Connection};
pub use bridge::client::{CallError, ChannelClient};
pub use bridge::protocol::{Params, ProtocolError, Request, Response};
pub use bridge::server::{ChannelServer, SecretResolver, ServerError};
pub use config::{ConfigError, TaskConfig};
pub use data::{DataDir, DataError, Materialized};
pub use materialize::{BatchSink, MaterializeError, ParquetSink, SinkStats, materialize};
pub use ops::{FtpSource, LoadMode, LoadRequest, OpError};
