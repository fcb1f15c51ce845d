use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pcm_sink::cli::Args;
use pcm_sink::{IngestConfig, IngestServer, SinkConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pcm_sink=info")
        }))
        .init();

    let cfg = match args.config.as_deref() {
        Some(path) => SinkConfig::load(path)?,
        None => SinkConfig::default(),
    };
    let config = IngestConfig::resolve(&cfg)?;
    tracing::info!(
        output = %config.output_path.display(),
        read_chunk_bytes = config.read_chunk_bytes,
        "starting pcm-sink"
    );

    let server = IngestServer::bind(&config).await?;
    let handle = server.handle();
    let _ = ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        handle.stop();
    });

    server.run().await
}
