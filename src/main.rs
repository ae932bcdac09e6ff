use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;

use votechain::config::NodeConfig;
use votechain::logging::{init_logging, LogFormat};
use votechain::runtime::Runtime;
use votechain::{CandidateId, VoterFingerprint};

#[derive(Debug, Parser)]
#[command(name = "votechain", about = "Append-only vote ledger console")]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `log_format` from the config ("human" or "json")
    #[arg(long)]
    log_format: Option<String>,

    /// Overrides `log_level` from the config
    #[arg(long)]
    log_level: Option<String>,

    /// Do not seal pending votes on exit
    #[arg(long)]
    no_seal_on_exit: bool,
}

/// Config file plus flag overrides. Fails on an unknown log format.
fn load_config(cli: &Cli) -> Result<(NodeConfig, LogFormat), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if cli.no_seal_on_exit {
        config.seal_on_shutdown = false;
    }
    let format = config.log_format()?;
    Ok((config, format))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (config, format) = load_config(&cli)?;
    init_logging(format, &config.log_level);

    let runtime = Runtime::new(config)?;
    println!("Vote ledger ready. Type 'help' for commands.");

    let mut input = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        input.clear();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let mut words = input.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        match command {
            "exit" | "quit" => break,
            "vote" => match (words.next(), words.next().map(str::parse::<u64>)) {
                (Some(voter), Some(Ok(candidate))) => {
                    runtime.cast_vote(VoterFingerprint::derive(voter), CandidateId(candidate));
                    println!("Vote queued for candidate {}.", candidate);
                }
                _ => println!("usage: vote <voter-id> <candidate-id>"),
            },
            "seal" => match runtime.seal() {
                Ok(Some(block)) => println!(
                    "Block #{} ({}) sealed with {} votes.",
                    block.index(),
                    block.hash(),
                    block.transactions().len()
                ),
                Ok(None) => println!("Nothing pending."),
                Err(e) => eprintln!("Failed to seal block: {}", e),
            },
            "validate" => match runtime.validate() {
                Ok(()) => println!("Chain is valid."),
                Err(fault) => println!("Chain is INVALID at {}.", fault),
            },
            "tally" => {
                let tally = runtime.tally();
                for (candidate, votes) in &tally.counts {
                    println!("candidate {}: {}", candidate, votes);
                }
                println!("total: {}", tally.total);
            }
            "state" => println!("{:?}", runtime.chain_state()),
            "chain" => match runtime.export_json() {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to export chain: {}", e),
            },
            "reset" => match runtime.reset() {
                Ok(()) => println!("Ledger reset to genesis."),
                Err(e) => eprintln!("Failed to reset: {}", e),
            },
            "help" => {
                println!("Available commands: vote <voter-id> <candidate-id>, seal, validate,");
                println!("                    tally, state, chain, reset, help, exit");
            }
            other => println!("Unknown command: {}", other),
        }
    }

    if let Some(block) = runtime.shutdown()? {
        println!("Sealed block #{} on exit.", block.index());
    }
    Ok(())
}
