use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use patron::runner::{RunOptions, SmokeOptions, run_smoke, run_storefront};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Walk the demo storefront end-to-end: register, log in, buy, check out.
    Run {
        #[arg(long, default_value = "http://localhost:3000")]
        base_url: Url,
        /// Show the browser window instead of running headless.
        #[arg(long, default_value_t = false)]
        headed: bool,
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,
        #[arg(long, default_value_t = 0.3)]
        temperature: f64,
        #[arg(long, default_value = "data/actions.log")]
        log_file: PathBuf,
        #[arg(long, default_value = "data/snapshots")]
        snapshot_dir: PathBuf,
        #[arg(long, default_value_t = false)]
        no_sandbox: bool,
    },
    /// Open a URL and follow a few outbound links to verify automation works.
    Smoke {
        base_url: Url,
        #[arg(long, default_value_t = 2)]
        steps: usize,
        /// Show the browser window instead of running headless.
        #[arg(long, default_value_t = false)]
        headed: bool,
        /// Skip the HTML snapshot after each navigation.
        #[arg(long, default_value_t = false)]
        no_snapshot: bool,
        #[arg(long, default_value = "data/actions.log")]
        log_file: PathBuf,
        #[arg(long, default_value = "data/snapshots")]
        snapshot_dir: PathBuf,
        #[arg(long, default_value_t = false)]
        no_sandbox: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(true)
        .init();
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run {
            base_url,
            headed,
            model,
            temperature,
            log_file,
            snapshot_dir,
            no_sandbox,
        } => {
            run_storefront(RunOptions {
                base_url,
                headless: !headed,
                model,
                temperature,
                log_file,
                snapshot_dir,
                no_sandbox,
            })
            .await
        }
        Command::Smoke {
            base_url,
            steps,
            headed,
            no_snapshot,
            log_file,
            snapshot_dir,
            no_sandbox,
        } => {
            run_smoke(SmokeOptions {
                base_url,
                headless: !headed,
                steps,
                snapshot: !no_snapshot,
                log_file,
                snapshot_dir,
                no_sandbox,
            })
            .await
        }
    };
    match outcome {
        Ok(()) => Ok(()),
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(2);
        }
    }
}
