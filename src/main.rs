use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tftp_client::{Cli, Summary};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match run(&args).await {
        Ok(summary) => {
            println!("\nTotal data bytes sent/received: {}.", summary.bytes);
            let secs = summary.elapsed.as_secs_f64();
            println!(
                "cost: {:.3}s, speed: {:.2} KB/s, retransmissions: {}",
                secs,
                summary.bytes as f64 / secs.max(f64::EPSILON) / 1024.0,
                summary.retransmissions
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("File transfer failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Cli) -> anyhow::Result<Summary> {
    let role = args.role();
    let (mut session, mut transport) =
        tftp_client::connect(role, &args.filename, &args.host, args.config())
            .await
            .with_context(|| {
                format!(
                    "failed to set up {role} of {} with {}",
                    args.filename, args.host
                )
            })?;

    let summary = tftp_client::transfer(&mut session, &mut transport)
        .await
        .with_context(|| format!("{role} of {} failed", args.filename))?;
    Ok(summary)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
