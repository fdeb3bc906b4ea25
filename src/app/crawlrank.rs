use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use crawlrank::config::PipelineConfig;
use crawlrank::driver::Pipeline;
use crawlrank::standalone::Args;

fn run(args: Args) -> Result<PathBuf> {
    let config = PipelineConfig::from_args(args)?;
    let report = Pipeline::new(config).run()?;
    Ok(report.listing)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(args) {
        Ok(listing) => {
            println!("{}", listing.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
