mod shell;

use anyhow::{Context, Result};
use blockchain_core::{constants::DEFAULT_DIFFICULTY_BYTES, BlockChain, LeadingZeroBytes, Miner};
use clap::Parser;
use shell::Shell;
use std::io;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "blockchain")]
#[command(about = "Interactive shell over an in-memory proof-of-work ledger")]
struct Cli {
    /// Leading zero bytes every block hash must have
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY_BYTES)]
    difficulty: usize,
    /// Give up mining after this many nonces
    #[arg(long)]
    max_attempts: Option<u64>,
    /// Search nonces on all cores
    #[arg(long)]
    parallel: bool,
    /// Print blocks and transactions as JSON lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut miner = Miner::new().parallel(cli.parallel);
    if let Some(max) = cli.max_attempts {
        miner = miner.with_max_attempts(max);
    }

    info!(difficulty = cli.difficulty, parallel = cli.parallel, "starting");
    let chain = BlockChain::with_miner(LeadingZeroBytes(cli.difficulty), miner)
        .context("could not mine the genesis block")?;

    let stdin = io::stdin();
    let mut shell = Shell::new(chain, stdin.lock(), io::stdout().lock()).json(cli.json);
    shell.run()?;

    let chain = shell.into_chain();
    info!(blocks = chain.size(), correct = chain.is_correct(), "session over");
    Ok(())
}
