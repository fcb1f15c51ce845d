//! Configuration loading and defaults.
//!
//! The listening port is fixed. An optional TOML file may move the output file
//! or change the write increment size.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

/// Port the binary always listens on.
pub const DEFAULT_PORT: u16 = 8000;
/// Output file, relative to the working directory.
pub const DEFAULT_OUTPUT_PATH: &str = "received.pcm";
/// Upper bound for a single write to the output file.
pub const DEFAULT_READ_CHUNK_BYTES: usize = 4096;

/// Settings read from the optional TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct SinkConfig {
    /// Output file path.
    pub output_path: Option<String>,
    /// Maximum bytes per write increment.
    pub read_chunk_bytes: Option<usize>,
}

impl SinkConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<SinkConfig>(raw)?)
    }
}

/// Resolved runtime settings for one ingest server.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub bind: SocketAddr,
    pub output_path: PathBuf,
    pub read_chunk_bytes: usize,
}

impl IngestConfig {
    /// Apply defaults to a loaded config.
    pub fn resolve(cfg: &SinkConfig) -> Result<Self> {
        let output_path = cfg
            .output_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_OUTPUT_PATH);
        let read_chunk_bytes = cfg.read_chunk_bytes.unwrap_or(DEFAULT_READ_CHUNK_BYTES);
        if read_chunk_bytes == 0 {
            return Err(anyhow!("read_chunk_bytes must be greater than zero"));
        }
        Ok(Self {
            bind: default_bind(),
            output_path: PathBuf::from(output_path),
            read_chunk_bytes,
        })
    }

    /// Same settings on a different address (tests bind an ephemeral port).
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }
}

/// All interfaces on [`DEFAULT_PORT`].
pub fn default_bind() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}
