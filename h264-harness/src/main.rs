mod cli;
mod config;
mod driver;
mod frame;
mod h264_writer;
mod worker;

use clap::{Parser, error::ErrorKind};
use cli::Cli;
use config::HarnessConfig;
use std::process::ExitCode;

// Exit status for every failure: -1 as an unsigned byte
const EXIT_FAILURE: u8 = 255;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Testing H.264 encoder pipeline");

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            _ = e.print();
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let config = match HarnessConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e:?}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match driver::run(&cli, &config) {
        Ok(stats) => {
            log::info!(
                "wrote {} frames ({} bytes) to {} in {} ms",
                stats.written.frames,
                stats.written.bytes,
                config.output_path.display(),
                stats.conversion_time.as_millis()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e:?}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
