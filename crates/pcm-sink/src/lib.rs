//! Raw PCM ingest service.
//!
//! Accepts `POST` requests on any path and appends everything after the request
//! head, byte for byte, to a single output file. The body is read until the
//! client closes its side of the connection; nothing frames the individual
//! payloads, so the file is the plain concatenation of every body in arrival
//! order.

pub mod cli;
pub mod config;
pub mod http_api;
pub mod request;
pub mod server;
pub mod sink;

pub use config::{IngestConfig, SinkConfig};
pub use server::{IngestServer, RunningServer, ShutdownHandle, spawn};
pub use sink::AppendLog;
