use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pcm-sink", version)]
pub struct Args {
    /// Optional config file (TOML) with output_path / read_chunk_bytes
    #[arg(long)]
    pub config: Option<PathBuf>,
}
