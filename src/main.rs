//! Open-LLM-VTuber server entry point.
//!
//! Startup sequence:
//! 1. Parse the command line.
//! 2. Point model caches at `<root>/models` while the process is still
//!    single-threaded.
//! 3. Run the bootstrapper (logging, config, server, runtime) on the
//!    working directory and exit with its status.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use vtuber_server::lifecycle::bootstrap::EXIT_STARTUP;
use vtuber_server::lifecycle::environment::redirect_model_caches;
use vtuber_server::net::TokioRuntime;
use vtuber_server::{BootstrapOptions, Bootstrapper};

#[derive(Parser)]
#[command(name = "vtuber-server")]
#[command(about = "Open-LLM-VTuber Server", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn console_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let root = match std::env::current_dir() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("fatal: cannot determine working directory: {e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    redirect_model_caches(&root);

    let options = BootstrapOptions::new(root, cli.console_level());
    let report = Bootstrapper::new(options, TokioRuntime).run();
    ExitCode::from(report.exit_code)
}
