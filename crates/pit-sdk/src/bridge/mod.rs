//! Control channel between a task process and the pit orchestrator.
//!
//! # Architecture
//!
//! - **address**: picks Unix socket vs loopback TCP from one address string
//! - **protocol**: Request/Response documents
//! - **codec**: JSON encoding; framing is the connection itself
//! - **client**: blocking one-shot exchange used by tasks
//! - **server**: async orchestrator-side peer
//!
//! One connection carries exactly one request. The task half-closes its
//! write side to mark the end of the request and the orchestrator closes the
//! connection after writing the response.

pub mod address;
pub mod client;
pub mod codec;
pub mod protocol;
pub mod server;
