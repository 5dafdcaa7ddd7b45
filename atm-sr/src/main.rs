//! Survey Runner (atm-sr) - Main entry point
//!
//! `run` presents the survey in the terminal and syncs progress to atm-ss.
//! `manifest` builds a manifest from a folder of `.wav`/`.lab` files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use atm_common::config::{default_data_dir, load_config, resolve_server_url};
use atm_common::Judgment;
use atm_sr::manifest_loader::{default_candidates, load_manifest, write_manifest};
use atm_sr::{Advance, FileProgressStore, HttpSessionRemote, Phase, SurveyRunner};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for atm-sr
#[derive(Parser, Debug)]
#[command(name = "atm-sr")]
#[command(about = "Survey runner for the audio-text matching survey")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take the survey in the terminal
    Run(RunArgs),
    /// Generate manifest.json from a folder of .wav and .lab files
    Manifest(ManifestArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Base URL of the session service
    #[arg(long, env = "ATM_SERVER_URL")]
    server: Option<String>,

    /// File holding this device's progress
    #[arg(long, env = "ATM_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Manifest location (file path or URL); repeat to try several in order
    #[arg(long = "manifest")]
    manifests: Vec<String>,

    /// Participant id from a resume link
    #[arg(long)]
    sid: Option<String>,

    /// Page that resume links point to (defaults to the service URL)
    #[arg(long)]
    link_base: Option<String>,
}

#[derive(Args, Debug)]
struct ManifestArgs {
    /// Folder containing .wav and .lab files
    data_dir: PathBuf,

    /// Output path (default: <data_dir>/manifest.json)
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atm_sr=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting ATM Survey Runner (atm-sr) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Manifest(args) => {
            let (path, count) = write_manifest(&args.data_dir, args.out.as_deref())
                .with_context(|| format!("Failed to build manifest for {}", args.data_dir.display()))?;
            println!("Wrote {} items to {}", count, path.display());
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_config();
    let server_url = resolve_server_url(args.server.as_deref(), &config);
    let state_file = args
        .state_file
        .unwrap_or_else(|| default_data_dir().join("progress.json"));
    let candidates = if args.manifests.is_empty() {
        default_candidates(&server_url)
    } else {
        args.manifests
    };
    let link_base = args.link_base.unwrap_or_else(|| format!("{server_url}/"));

    info!("Session service: {}", server_url);
    info!("Local progress: {}", state_file.display());

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("Failed to create HTTP client")?;
    let manifest = load_manifest(&http_client, &candidates)
        .await
        .context("Failed to initialize survey")?;

    let remote = HttpSessionRemote::new(&server_url).context("Failed to create service client")?;
    let mut runner = SurveyRunner::start(
        Arc::new(FileProgressStore::new(state_file)),
        Arc::new(remote),
        manifest,
        args.sid.as_deref(),
    )
    .await
    .context("Failed to initialize survey")?;

    println!("Participant: {}", runner.participant_id());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if runner.phase() == Phase::Intro {
        println!();
        println!("You will hear short audio clips, each shown with a sentence.");
        println!("For each clip, answer whether the sentence matches what you heard.");
        println!("Press Enter to begin.");
        if lines.next_line().await?.is_none() {
            runner.shutdown().await;
            return Ok(());
        }
        runner.begin().await?;
    }

    loop {
        if runner.phase() == Phase::Done {
            println!("All items answered. Saving results to server...");
            report_final_save(runner.complete().await);
            break;
        }

        let current = runner.current()?;
        println!();
        println!("Progress: {} / {}", current.position, current.total);
        println!("{}", current.question);
        println!("  Sentence: {}", current.item.label);
        println!("  Audio:    {}", current.item.audio);
        println!("[y]es / [n]o / [u]nsure / later / reset / quit");

        let Some(input) = read_command(&mut lines).await? else {
            break;
        };
        let judgment = match input.as_str() {
            "y" | "yes" => Judgment::Yes,
            "n" | "no" => Judgment::No,
            "u" | "unsure" => Judgment::NotSure,
            "later" => {
                let link = runner.continue_later(&link_base).await?;
                match link.saved {
                    Ok(()) => println!("Saved. Use this link to resume: {}", link.url),
                    Err(e) => println!(
                        "Could not save to server ({e}). Progress is kept on this device; resume link: {}",
                        link.url
                    ),
                }
                continue;
            }
            "reset" => {
                runner.reset().await?;
                println!("Local progress cleared. Run again to start over.");
                return Ok(());
            }
            "quit" | "q" => break,
            other => {
                println!("Unrecognized input: {other:?}");
                continue;
            }
        };

        if let Advance::Completed { saved, .. } = runner.record(judgment).await? {
            println!("Thank you! All items answered.");
            report_final_save(saved);
            break;
        }
    }

    runner.shutdown().await;
    Ok(())
}

async fn read_command(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    Ok(lines
        .next_line()
        .await?
        .map(|line| line.trim().to_lowercase()))
}

fn report_final_save(saved: atm_sr::Result<()>) {
    match saved {
        Ok(()) => println!("Results saved on server."),
        Err(e) => println!("Results could not be saved on server: {e}"),
    }
}
