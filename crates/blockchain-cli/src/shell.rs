//! The interactive command loop.

use anyhow::Result;
use blockchain_core::{AppendError, Block, BlockChain, Transaction};
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::debug;

const INSTRUCTIONS: &str = "\
Valid commands:
  mine: discovers the nonce for a given transaction
  append: appends a new block onto the end of the chain
  remove: removes the last block from the end of the chain
  check: checks that the block chain is valid
  users: prints a list of users
  balance: finds a user's balance
  transactions: prints out the chain of transactions
  blocks: prints out the chain of blocks (for debugging only)
  help: prints this list of commands
  quit: quits the program";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Mine,
    Append,
    Remove,
    Check,
    Users,
    Balance,
    Transactions,
    Blocks,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "mine" => Command::Mine,
            "append" => Command::Append,
            "remove" => Command::Remove,
            "check" => Command::Check,
            "users" => Command::Users,
            "balance" => Command::Balance,
            "transactions" => Command::Transactions,
            "blocks" => Command::Blocks,
            "help" => Command::Help,
            "quit" => Command::Quit,
            _ => return Err(()),
        })
    }
}

/// Drives a [`BlockChain`] from line-oriented input. End of input behaves
/// like `quit`.
pub struct Shell<R, W> {
    chain: BlockChain,
    input: R,
    out: W,
    json: bool,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(chain: BlockChain, input: R, out: W) -> Self {
        Self {
            chain,
            input,
            out,
            json: false,
        }
    }

    /// Print `blocks` and `transactions` as JSON lines.
    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn into_chain(self) -> BlockChain {
        self.chain
    }

    pub fn run(&mut self) -> Result<()> {
        writeln!(self.out, "{INSTRUCTIONS}")?;
        loop {
            let Some(line) = self.prompt("\nCommand: ")? else {
                break;
            };
            match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    debug!(?command, "running command");
                    if !self.dispatch(command)? {
                        break;
                    }
                }
                Err(()) => writeln!(self.out, "invalid command: '{line}'. Try again.")?,
            }
        }
        writeln!(self.out, "\nGoodbye")?;
        self.out.flush()?;
        Ok(())
    }

    /// Returns `false` when input ran out mid-command.
    fn dispatch(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Mine => {
                let Some(tx) = self.read_transaction()? else {
                    return Ok(false);
                };
                match self.chain.mine(tx) {
                    Ok(block) => writeln!(self.out, "Nonce: {}", block.nonce())?,
                    Err(err) => writeln!(self.out, "Mining failed: {err}")?,
                }
            }
            Command::Append => return self.append(),
            Command::Remove => {
                if self.chain.remove_last() {
                    writeln!(self.out, "Removed last element")?;
                } else {
                    writeln!(self.out, "Could not remove last element")?;
                }
            }
            Command::Check => match self.chain.check() {
                Ok(()) => writeln!(self.out, "The blockchain checks out.")?,
                Err(violation) => writeln!(self.out, "Something is wrong: {violation}")?,
            },
            Command::Users => {
                for user in self.chain.users() {
                    writeln!(self.out, "{user}")?;
                }
            }
            Command::Balance => {
                let Some(user) = self.prompt("User: ")? else {
                    return Ok(false);
                };
                writeln!(self.out, "{user}'s balance is {}", self.chain.balance(&user))?;
            }
            Command::Transactions => {
                for tx in &self.chain {
                    if self.json {
                        writeln!(self.out, "{}", serde_json::to_string(tx)?)?;
                    } else {
                        writeln!(self.out, "{tx}")?;
                    }
                }
            }
            Command::Blocks => {
                for block in self.chain.blocks() {
                    if self.json {
                        writeln!(self.out, "{}", serde_json::to_string(block)?)?;
                    } else {
                        writeln!(self.out, "{block}")?;
                    }
                }
            }
            Command::Help => writeln!(self.out, "{INSTRUCTIONS}")?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Prompts for a block until one is admitted. Returns `false` at EOF.
    fn append(&mut self) -> Result<bool> {
        loop {
            let Some(tx) = self.read_transaction()? else {
                return Ok(false);
            };
            let Some(nonce) = self.read_number::<i64>("Nonce: ")? else {
                return Ok(false);
            };

            if !tx.is_deposit() && self.chain.balance(&tx.source) < i64::from(tx.amount) {
                writeln!(self.out, "Source does not have enough funds, please try again.")?;
                continue;
            }

            let num = self.chain.size() as u32;
            let block = Block::reconstruct(num, tx, self.chain.hash().clone(), nonce);
            match self.chain.append(block) {
                Ok(()) => {
                    writeln!(self.out, "Appended block {num}.")?;
                    return Ok(true);
                }
                Err(AppendError::InvalidHash { .. } | AppendError::HashMismatch { .. }) => {
                    debug!(num, nonce, "nonce rejected");
                    writeln!(self.out, "Incorrect nonce for information provided.")?;
                }
                Err(err) => {
                    writeln!(self.out, "Could not append: {err}")?;
                    return Ok(true);
                }
            }
        }
    }

    fn read_transaction(&mut self) -> Result<Option<Transaction>> {
        let Some(source) = self.prompt("Source (return for deposit): ")? else {
            return Ok(None);
        };
        let Some(target) = self.prompt("Target: ")? else {
            return Ok(None);
        };
        let Some(amount) = self.read_number::<i32>("Amount: ")? else {
            return Ok(None);
        };
        Ok(Some(Transaction::new(source, target, amount)))
    }

    /// Re-prompts until the line parses.
    fn read_number<T: FromStr>(&mut self, label: &str) -> Result<Option<T>> {
        loop {
            let Some(line) = self.prompt(label)? else {
                return Ok(None);
            };
            match line.parse() {
                Ok(n) => return Ok(Some(n)),
                Err(_) => writeln!(self.out, "Please enter a valid integer.")?,
            }
        }
    }

    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.out, "{label}")?;
        self.out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}
