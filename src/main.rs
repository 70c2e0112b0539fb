use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wotd_pipeline::distribute::{Distributor, Platform as _};
use wotd_pipeline::output;
use wotd_pipeline::source::Origin;
use wotd_pipeline::{utils, Cli, Commands, Config, GenerationPipeline, ReleaseOutcome, ReleasePipeline, RunMode};

#[tokio::main]
async fn main() -> ExitCode {
    // Credentials may live in a local .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "wotd_pipeline=debug"
    } else {
        "wotd_pipeline=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { test } => {
            let mode = if test { RunMode::Replay } else { RunMode::Normal };
            output::print_banner(
                "WORD OF THE DAY PIPELINE",
                test.then_some("*** TEST MODE - reusing cached checkpoint and audio ***"),
            );

            let missing_deps = utils::check_dependencies(&config).await;
            if !missing_deps.is_empty() {
                output::print_warning("Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
            }

            let report = GenerationPipeline::new(&config, mode, cli.quiet).run().await?;

            if report.origin == Some(Origin::Fallback) {
                output::print_warning("Source page unavailable; today's word came from the local fallback dataset");
            }
            println!();
            output::print_banner("PIPELINE COMPLETE", None);
            output::print_export(&report.export.path);
            println!("  Cleanup: {}", report.cleanup);
        }
        Commands::Approve => {
            output::print_banner("WORD OF THE DAY PIPELINE - Approve & Distribute", None);

            let pipeline = ReleasePipeline::from_config(&config)?;
            let stdin = std::io::stdin();
            match pipeline.run(stdin.lock(), std::io::stdout()).await? {
                ReleaseOutcome::Rejected(video) => {
                    println!("Video rejected; {} stays in place.", video.display());
                }
                ReleaseOutcome::Distributed { archive, .. } => {
                    println!();
                    output::print_banner("COMPLETE - Video distributed & archived", None);
                    println!("  Archive: {}", archive.path.display());
                }
            }
        }
        Commands::Config { show, init } => {
            if init {
                let path = Config::user_config_path()
                    .context("Could not determine the user config directory")?;
                if path.exists() {
                    anyhow::bail!("Settings file already exists: {}", path.display());
                }
                Config::default().save(&path)?;
                output::print_success(&format!("Default settings written to {}", path.display()));
            } else if show {
                config.display();
            } else {
                config.display();
                println!();
                println!("Run `wotd config --init` to write an editable settings file.");
            }
        }
        Commands::Platforms => {
            println!("Distribution platforms:");
            let distributor = Distributor::from_config(&config)?;
            let mut listed = 0;
            for platform in distributor.platforms() {
                let status = if platform.is_configured() {
                    "credentials set"
                } else {
                    "credentials missing (will be skipped)"
                };
                println!("  • {} - {}", platform.name(), status);
                listed += 1;
            }
            if listed == 0 {
                println!("  (none enabled)");
            }
        }
    }

    Ok(())
}
