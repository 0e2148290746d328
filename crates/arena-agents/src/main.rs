//! `code-arena`: run code-generation tournaments from the command line.
//!
//! Commands:
//! - battle: both rounds, or stop after adjudication with `--checkpoint-out`
//! - resume: round 2 from a checkpoint, with optional human critique
//! - bench: run one source file through the execution harness
//! - leaderboard: print ratings

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use arena::{
    BattleCheckpoint, BattleRecord, ExecutionHarness, HarnessConfig, HumanCritiques,
    RatingStore, RoundOneOutcome, Tournament,
};
use arena_agents::{build_tournament, ArenaConfig, Backends, Endpoints};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "code-arena", author, version, about = "Code-generation agent tournaments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a battle
    Battle {
        /// Roster file
        #[arg(long, default_value = "config/agents_config.yaml")]
        config: PathBuf,
        /// Problem statement
        #[arg(long, conflicts_with = "problem_file")]
        problem: Option<String>,
        /// Read the problem statement from a file
        #[arg(long)]
        problem_file: Option<PathBuf>,
        /// Test input, as JSON
        #[arg(long)]
        input: String,
        /// Expected output, as JSON
        #[arg(long)]
        expected: Option<String>,
        /// Stop after adjudication and write the checkpoint here
        #[arg(long)]
        checkpoint_out: Option<PathBuf>,
        /// Human critique per agent, a JSON object of name to text
        #[arg(long, conflicts_with = "checkpoint_out")]
        critiques: Option<PathBuf>,
    },
    /// Run round 2 from a checkpoint
    Resume {
        #[arg(long, default_value = "config/agents_config.yaml")]
        config: PathBuf,
        #[arg(long)]
        checkpoint: PathBuf,
        /// Human critique per agent, a JSON object of name to text
        #[arg(long)]
        critiques: Option<PathBuf>,
    },
    /// Benchmark one source file
    Bench {
        file: PathBuf,
        /// Test input, as JSON
        #[arg(long)]
        input: String,
        /// Expected output, as JSON
        #[arg(long)]
        expected: Option<String>,
        /// Function to call (defaults to normal entry-point resolution)
        #[arg(long)]
        entry: Option<String>,
        #[arg(long)]
        repetitions: Option<u32>,
        /// Wall-clock timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the rating leaderboard
    Leaderboard {
        #[arg(long, default_value = "output/elo_ratings.json")]
        ratings: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Battle {
            config,
            problem,
            problem_file,
            input,
            expected,
            checkpoint_out,
            critiques,
        } => {
            let problem = match (problem, problem_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => bail!("either --problem or --problem-file is required"),
            };
            let input = parse_json("--input", &input)?;
            let expected = expected
                .as_deref()
                .map(|raw| parse_json("--expected", raw))
                .transpose()?;
            let human = load_critiques(critiques.as_deref())?;

            let tournament = load_tournament(&config).await?;
            match tournament.run_round_one(&problem, input, expected).await? {
                RoundOneOutcome::Aborted(record) => print_record(&record),
                RoundOneOutcome::Adjudicated(checkpoint) => match checkpoint_out {
                    Some(path) => {
                        std::fs::write(&path, checkpoint.to_json()?)
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        info!(
                            battle_id = %checkpoint.battle_id,
                            leader = ?checkpoint.verdict.winner,
                            path = %path.display(),
                            "checkpoint written; resume with `code-arena resume`"
                        );
                    }
                    None => {
                        let record = tournament.run_round_two(checkpoint, &human).await?;
                        print_record(&record);
                    }
                },
            }
        }
        Commands::Resume {
            config,
            checkpoint,
            critiques,
        } => {
            let json = std::fs::read_to_string(&checkpoint)
                .with_context(|| format!("failed to read {}", checkpoint.display()))?;
            let checkpoint = BattleCheckpoint::from_json(&json)?;
            let human = load_critiques(critiques.as_deref())?;
            let tournament = load_tournament(&config).await?;
            let record = tournament.run_round_two(checkpoint, &human).await?;
            print_record(&record);
        }
        Commands::Bench {
            file,
            input,
            expected,
            entry,
            repetitions,
            timeout,
        } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let input = parse_json("--input", &input)?;
            let expected = expected
                .as_deref()
                .map(|raw| parse_json("--expected", raw))
                .transpose()?;
            let defaults = HarnessConfig::default();
            let harness = ExecutionHarness::new(HarnessConfig {
                repetitions: repetitions.unwrap_or(defaults.repetitions),
                timeout_secs: timeout.unwrap_or(defaults.timeout_secs),
                ..defaults
            });
            let complexity = arena::complexity_score(&source);
            let result = harness
                .benchmark_entry(&source, entry.as_deref(), &input, expected.as_ref())
                .await;
            println!(
                "{} | Time: {:.6}s | Comp: {} | Success: {}",
                file.display(),
                result.elapsed_secs,
                complexity,
                result.success
            );
            println!("{}", result.message);
        }
        Commands::Leaderboard { ratings } => {
            let store = RatingStore::open(&ratings)
                .with_context(|| format!("failed to open {}", ratings.display()))?;
            let board = store.get_leaderboard();
            if board.is_empty() {
                println!("No ratings yet.");
            }
            for (rank, (agent, rating)) in board.iter().enumerate() {
                println!("{:>3}. {:<24} {}", rank + 1, agent, rating);
            }
        }
    }

    Ok(())
}

/// Build the tournament, probe its endpoints and cancel it on Ctrl-C.
async fn load_tournament(config_path: &Path) -> Result<Tournament> {
    let config = ArenaConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let endpoints = Endpoints::from_env();
    Backends::from_endpoints(&endpoints)
        .context("failed to build chat clients")?
        .preflight()
        .await;
    let tournament = build_tournament(&config, &endpoints)?;

    let token = tournament.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling battle");
            token.cancel();
        }
    });
    Ok(tournament)
}

fn parse_json(flag: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{} must be valid JSON, got {:?}", flag, raw))
}

fn load_critiques(path: Option<&Path>) -> Result<HumanCritiques> {
    let Some(path) = path else {
        return Ok(HumanCritiques::new());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("{} must be a JSON object of agent name to critique", path.display()))
}

fn print_record(record: &BattleRecord) {
    println!("{}", record.report());
}
