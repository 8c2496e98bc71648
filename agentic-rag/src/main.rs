use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agentic_rag::cli::{render_response, run, CliArgs};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agentic_rag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    match run(&args).await {
        Ok(response) => {
            if args.json {
                match serde_json::to_string_pretty(&response) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("error: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!("{}", render_response(&response));
            }
            if response.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
