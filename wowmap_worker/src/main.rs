use anyhow::Result;
use clap::Parser;
use wowmap_worker::cli::{self, Cli};

fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::Builder::new().filter_level(cli.log_level_filter()).format_timestamp(None).init();

	cli::run(cli)
}
