use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};

use arm_dispatch::armv7::emit::{self, EmitterConfig};
use arm_dispatch::armv7::validate::{self, CanonicalMapping};
use arm_dispatch::armv7::{DispatchTable, InstructionKey};

/// Generate and check the ARM dispatch table
#[derive(Parser, Debug)]
#[command(name = "arm-dispatch", version, about = "ARM partial-opcode dispatch table generator")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the compressed C++ table initializer
    Table {
        /// Append the verbatim handler name array
        #[arg(long)]
        names: bool,

        /// Column per-run comments start at
        #[arg(long, default_value_t = EmitterConfig::default().comment_column)]
        comment_column: usize,
    },
    /// Print only the verbatim handler name array
    Names,
    /// Show the category and handler of one key (decimal or 0x-prefixed hex)
    Classify {
        key: String,
    },
    /// Compare the table against a reference table of `[0xNNN] = NAME,` lines
    Check {
        #[arg(long)]
        reference: PathBuf,

        /// Name array to check instead of the freshly built table
        #[arg(long)]
        local: Option<PathBuf>,
    },
}

fn parse_key(text: &str) -> Result<InstructionKey> {
    let value = match text.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse::<u16>(),
    }
    .with_context(|| format!("not a number: {}", text))?;
    Ok(InstructionKey::try_from(value)?)
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let table = DispatchTable::standard();

    match args.command {
        Command::Table { names, comment_column } => {
            let config = EmitterConfig {
                comment_column,
                include_names: names,
                ..EmitterConfig::default()
            };
            print!("{}", emit::render_table(&table, &config)?);
        }
        Command::Names => {
            let mut out = String::new();
            emit::write_name_array(&mut out, &table, &EmitterConfig::default())?;
            print!("{}", out);
        }
        Command::Classify { key } => {
            let key = parse_key(&key)?;
            println!(
                "{}: opcode {:#04x} mul/swp {} -> {} -> {}",
                key,
                key.opcode(),
                key.mul_swp() as u8,
                key.category(),
                table.get(key)
            );
        }
        Command::Check { reference, local } => {
            let reference_text = fs::read_to_string(&reference)
                .with_context(|| format!("reading reference table {}", reference.display()))?;
            let reference_table = validate::parse_reference_table(&reference_text);
            info!("{} entries in {}", reference_table.len(), reference.display());

            let local_table = match local {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("reading name array {}", path.display()))?;
                    validate::parse_local_table(&text)
                }
                None => table.to_map(),
            };
            debug!("{} local entries", local_table.len());

            let mismatches = validate::validate(&reference_table, &local_table, &CanonicalMapping::mgba());
            validate::log_report(&mismatches);

            if !mismatches.is_empty() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
