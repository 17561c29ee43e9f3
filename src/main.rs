// src/main.rs

use devbackup::errors::DevbackupError;
use devbackup::{cli, logging, run};

/// Exit status used when the run was interrupted (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("devbackup error: {err}");
        let code = match err {
            DevbackupError::Interrupted => EXIT_INTERRUPTED,
            _ => 1,
        };
        std::process::exit(code);
    }
}

async fn run_main() -> devbackup::errors::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
