use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process;

use anyhow::bail;
use clap::{Parser, Subcommand};

mod config;
mod handle;
mod hash;
mod info;
mod logger;
mod parity;
mod progress;
mod raid;
mod scrub;
mod state;
mod status;

use config::ArrayConfig;
use logger::Logger;
use scrub::ScrubOptions;
use state::State;

#[derive(Debug, Parser)]
#[clap(name = "snapscrub", about = "Background integrity verifier for snapshot-RAID arrays")]
struct Args {
    /// Array configuration file
    #[clap(short, long, parse(from_os_str), value_name = "FILE", default_value = "snapscrub.conf")]
    conf: PathBuf,

    /// Set verbosity of the output (can be used multiple times)
    #[clap(short, long, parse(from_occurrences))]
    verbose: u32,

    /// Log file
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Re-read the oldest blocks and verify them against hashes and parity
    Scrub {
        /// Bytes read between automatic catalog saves (0 disables)
        #[clap(long, value_name = "BYTES", default_value_t = 0)]
        autosave: u64,

        /// Scrub exactly this many stripes, ignoring the age quota
        #[clap(long, value_name = "N")]
        count: Option<u32>,

        /// Scrub only even stripes (testing aid)
        #[clap(long)]
        even: bool,

        /// Hint the kernel not to read ahead sequentially
        #[clap(long)]
        skip_sequential: bool,

        /// Invert the exit status, failing when no error is found
        #[clap(long)]
        expect_recoverable: bool,
    },
    /// Report the verification state of the array
    Status,
}

fn main()
{
    let args = Args::parse();

    let mut log_file = None;

    // Create the log file in append mode.

    if let Some(path) = &args.log_file {
        let f = OpenOptions::new()
            .create(true)
            .read(false)
            .append(true)
            .open(&path);

        log_file = match f {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("error: {}: {}", &path.display(), e.to_string());
                None
            }
        };
    }

    let mut context = Context {
        logger: Logger::new(args.verbose, log_file),
    };

    if let Err(e) = run(&args, &mut context) {
        eprintln!("error: {}", e.to_string());
        process::exit(1);
    }
}

fn run(args: &Args, ctx: &mut Context) -> anyhow::Result<()>
{
    let cfg = ArrayConfig::load(&args.conf)?;
    let mut state = State::load(&cfg.content)?;

    if state.block_size != cfg.block_size || state.level != cfg.level {
        bail!("the content file does not match the configuration, run a sync first");
    }

    // The configuration decides where the parity lives.
    state.parity = cfg.parity.clone();
    state.qarity = cfg.qarity.clone();

    match &args.command {
        Command::Scrub { autosave, count, even, skip_sequential, expect_recoverable } => {
            progress::install_interrupt();

            let opts = ScrubOptions {
                autosave: *autosave,
                force_scrub: count.unwrap_or(0),
                force_scrub_even: *even,
                skip_sequential: *skip_sequential,
                expect_recoverable: *expect_recoverable,
                content: cfg.content.clone(),
            };

            let result = scrub::run(&mut state, ctx, &opts);

            // Partial progress survives an abort: whatever the engine
            // marked dirty goes to the content file.
            if state.need_write {
                state.save(&cfg.content)?;
            }

            result
        }
        Command::Status => {
            if status::report(&state) {
                bail!("bad blocks present in the array");
            }

            Ok(())
        }
    }
}

/// Contains shared mutable state.
#[derive(Debug)]
pub struct Context {
    pub logger: Logger,
}
