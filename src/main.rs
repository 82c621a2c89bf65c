use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = instance_tmp::cli::Cli::parse();
    instance_tmp::cli::init_logging(&cli.log_level);
    cli.run()
}
