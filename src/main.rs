mod check;
mod cli;
mod config;
mod exec;
mod files;
mod git;
mod pages;
mod poster;
mod progress;
mod report;
mod site;
mod types;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match config::resolve_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e:#}");
            std::process::exit(2);
        }
    };

    match cli.command {
        Commands::Check => match check::run_check() {
            Ok(true) => std::process::exit(0),
            Ok(false) => std::process::exit(1),
            Err(e) => {
                eprintln!("Error: {e:#}");
                std::process::exit(2);
            }
        },
        Commands::Report(args) => {
            let mut opts = cfg.report;
            args.apply(&mut opts);
            match report::generate(&opts) {
                Ok(summary) => {
                    report::print_summary(&summary);
                    std::process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    std::process::exit(2);
                }
            }
        }
        Commands::PreparePages(args) => {
            let mut opts = cfg.pages;
            args.apply(&mut opts);
            match pages::prepare(&opts) {
                Ok(prepared) => {
                    println!("Site prepared in {}", prepared.output_dir.display());
                    for rel in &prepared.written {
                        println!("  + {}", rel.display());
                    }
                    for missing in &prepared.skipped {
                        println!("  - {} (not found, skipped)", missing.display());
                    }
                    std::process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    std::process::exit(2);
                }
            }
        }
        Commands::Deploy(args) => {
            let mut opts = cfg.deploy;
            args.apply(&mut opts);
            match site::deploy(&opts) {
                Ok(outcome) => {
                    match outcome {
                        site::DeployOutcome::Published { remote, branch, commit } => {
                            println!("Published {commit} to {branch} on {remote}")
                        }
                        site::DeployOutcome::Unchanged { remote, branch } => {
                            println!("{branch} on {remote} already up to date")
                        }
                        site::DeployOutcome::Artifact { path, bytes } => {
                            println!("Site artifact written to {} ({bytes} bytes)", path.display())
                        }
                    }
                    std::process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    std::process::exit(2);
                }
            }
        }
        Commands::PostResults(args) => {
            let mut opts = cfg.poster;
            args.apply(&mut opts);
            match poster::post_results(&opts).await {
                Ok(summary) => {
                    poster::print_summary(&summary);
                    if summary.all_posted() {
                        std::process::exit(0);
                    }
                    eprintln!(
                        "Error: {} record(s) could not be posted",
                        summary.failures.len()
                    );
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Error posting test results to Azure DevOps: {e:#}");
                    std::process::exit(2);
                }
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,pipeline_actions={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
