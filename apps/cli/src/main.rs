use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use maskview_cli::{convert, Conversion};

/// Translate GDS-II to WebGL for visualization.
#[derive(Parser)]
#[command(name = "maskview", version)]
struct Cmd {
    /// Input GDS-II file.
    #[arg(short, long)]
    input: PathBuf,

    /// Output file. "<file>.html" writes a self-contained page, anything
    /// else writes the layer data as JavaScript.
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cmd = Cmd::parse();
    convert(&Conversion::new(cmd.input, cmd.output))
}
