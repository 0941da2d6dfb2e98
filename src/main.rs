//! rummikub-racer - find the play for one Rummikub turn
//!
//! Races the subset engine against the maximising engine and prints the
//! winning verdict as JSON.
//!
//! Usage: rummikub-racer --rack "r4 r5 r6 b10 k10 y10" [--board "r 1 2 3 4; 5 r b k"] [--played]

use clap::Parser;
use rummikub_racer::{Board, CancelToken, Rack, RaceOutcome, SolverConfig, StrategyRacer};
use std::fs;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rummikub-racer")]
#[command(about = "Find the best Rummikub play for a rack")]
#[command(version)]
struct Args {
    /// Rack tiles, e.g. "r4 r5 r6 w"
    #[arg(short = 'r', long = "rack", required = true)]
    rack: String,

    /// Board melds separated by ';', e.g. "r 1 2 3; 5 r b k"
    #[arg(short = 'b', long = "board", default_value = "")]
    board: String,

    /// The player has already made a first play
    #[arg(short = 'p', long = "played")]
    played: bool,

    /// Give up after this many milliseconds
    #[arg(short = 't', long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Worker threads for racing
    #[arg(short = 'w', long = "workers")]
    workers: Option<usize>,

    /// JSON solver config; flags above override it
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

fn load_config(args: &Args) -> Result<SolverConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .map_err(|e| format!("Error reading config file '{}': {}", path, e))?;
            SolverConfig::from_json(&json).map_err(|e| format!("Invalid config: {}", e))?
        }
        None => SolverConfig::default(),
    };
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if args.timeout_ms.is_some() {
        config.time_limit_ms = args.timeout_ms;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<String, String> {
    let config = load_config(args)?;
    let rack = Rack::from_notation(&args.rack).map_err(|e| format!("Invalid rack: {}", e))?;
    let board = Board::from_notation(&args.board).map_err(|e| format!("Invalid board: {}", e))?;
    let racer = StrategyRacer::from_config(&config).map_err(|e| e.to_string())?;

    match racer.run(&board, &rack, args.played, &CancelToken::new()) {
        RaceOutcome::Completed(result) => {
            for meld in &result.best_solution.melds {
                eprintln!("  {}", meld);
            }
            serde_json::to_string_pretty(&result).map_err(|e| e.to_string())
        }
        RaceOutcome::TimedOut => Ok(r#"{"timeout":true}"#.to_string()),
        RaceOutcome::Cancelled => Err("search cancelled".to_string()),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
