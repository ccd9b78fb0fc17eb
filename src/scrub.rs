use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail};

use crate::handle::Handle;
use crate::hash::{memhash, HashKind, HASH_SIZE};
use crate::info::{BlockInfo, InfoMap};
use crate::parity::Parity;
use crate::progress::Progress;
use crate::raid;
use crate::state::State;
use crate::Context;


const RECENT_SECS: u32 = 10 * 24 * 3600;


/// Tuning knobs of one scrub run.
#[derive(Clone, Debug, Default)]
pub struct ScrubOptions {
    /// Bytes read between automatic catalog saves. 0 disables.
    pub autosave: u64,
    /// Scrub exactly this many stripes instead of the age-based quota.
    pub force_scrub: u32,
    /// Scrub only even stripes. Testing aid.
    pub force_scrub_even: bool,
    pub skip_sequential: bool,
    /// Invert the final status, failing when no error is found.
    pub expect_recoverable: bool,
    /// Where autosave writes the catalog.
    pub content: PathBuf,
}


/// Staged hash for one disk of the stripe under verification.
#[derive(Clone, Copy, Default)]
struct Rehash {
    hash: [u8; HASH_SIZE],
    staged: bool,
}


pub(crate) fn unix_now() -> u32
{
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}


/// Derives the `(time_limit, count_limit)` pair that drives both passes.
///
/// The used info words are sorted by time so the quota lands on the
/// oldest blocks first. The cutoff never exceeds the recency floor:
/// younger blocks are only scrubbed when forced or flagged bad.
fn scrub_plan(info: &InfoMap, blockmax: u32, countlimit: u32, recentlimit: u32) -> anyhow::Result<(u32, u32)>
{
    let mut words: Vec<BlockInfo> = (0..blockmax)
        .map(|i| info.get(i))
        .filter(|w| !w.is_unused())
        .collect();

    if words.is_empty() {
        bail!("the array appears to be empty");
    }

    words.sort_by(BlockInfo::cmp_time);

    let countlimit = countlimit.min(words.len() as u32);
    let timelimit = if countlimit == 0 {
        recentlimit
    } else {
        words[countlimit as usize - 1].time().min(recentlimit)
    };

    Ok((timelimit, countlimit))
}


/// Runs the scrub over the whole array.
pub fn run(state: &mut State, ctx: &mut Context, opts: &ScrubOptions) -> anyhow::Result<()>
{
    let now = unix_now();

    println!("Initializing...");

    let blockmax = state.blockmax();

    let (countlimit, recentlimit) = if opts.force_scrub_even {
        (blockmax, now)
    } else if opts.force_scrub != 0 {
        (opts.force_scrub, now)
    } else {
        // By default scrub 1/12 of the array, leaving anything verified
        // in the last 10 days alone.
        (blockmax / 12, now.saturating_sub(RECENT_SECS))
    };

    let (timelimit, countlimit) = scrub_plan(&state.info, blockmax, countlimit, recentlimit)?;

    let mut parity = match Parity::open(&state.parity, opts.skip_sequential) {
        Ok(p) => p,
        Err(e) => bail!("without an accessible parity file, it isn't possible to scrub: {}", e),
    };

    let mut qarity = if state.level >= 2 {
        let path = match &state.qarity {
            Some(p) => p.clone(),
            None => bail!("the catalog has no qarity file for a level 2 array"),
        };

        match Parity::open(&path, opts.skip_sequential) {
            Ok(p) => Some(p),
            Err(e) => bail!("without an accessible qarity file, it isn't possible to scrub: {}", e),
        }
    } else {
        None
    };

    println!("Scrubbing...");

    let mut result = scrub_process(
        state,
        ctx,
        &mut parity,
        qarity.as_mut(),
        blockmax,
        timelimit,
        countlimit,
        now,
        opts,
    );

    if parity.close().is_err() {
        eprintln!("DANGER! Unexpected close error in the parity disk.");
        if result.is_ok() {
            result = Err(anyhow!("unexpected close error in the parity disk"));
        }
    }

    if let Some(q) = &mut qarity {
        if q.close().is_err() {
            eprintln!("DANGER! Unexpected close error in the qarity disk.");
            if result.is_ok() {
                result = Err(anyhow!("unexpected close error in the qarity disk"));
            }
        }
    }

    result
}


fn scrub_process(
    state: &mut State,
    ctx: &mut Context,
    parity: &mut Parity,
    mut qarity: Option<&mut Parity>,
    blockmax: u32,
    timelimit: u32,
    countlimit: u32,
    now: u32,
    opts: &ScrubOptions,
) -> anyhow::Result<()>
{
    let mut handles = Handle::map(state);
    let diskmax = handles.len();
    let block_size = state.block_size as usize;

    // Data first, computed parity next, parity read from disk last.
    let buffermax = diskmax + state.level as usize * 2;
    let mut buffers: Vec<Vec<u8>> = vec![vec![0u8; block_size]; buffermax];

    let mut rehandle: Vec<Rehash> = vec![Rehash::default(); diskmax];

    let mut error: u32 = 0;
    let mut silent_error: u32 = 0;

    // Both passes must apply the same predicate, so the processing pass
    // visits exactly the number of stripes counted here.
    let selected = |info: BlockInfo, i: u32, taken: u32| -> bool {
        if info.is_unused() {
            return false;
        }

        // Blocks marked as bad are always checked.
        if !info.is_bad() {
            if info.time() > timelimit {
                return false;
            }
            if opts.force_scrub_even && i % 2 != 0 {
                return false;
            }
            if taken >= countlimit {
                return false;
            }
        }

        true
    };

    let mut countmax: u32 = 0;
    for i in 0..blockmax {
        if selected(state.info.get(i), i, countmax) {
            countmax += 1;
        }
    }

    // The autosave step is sized for the data volume of all disks, as if
    // they were read in parallel.
    let autosavelimit = (opts.autosave / (diskmax.max(1) as u64 * block_size as u64))
        .min(u32::MAX as u64) as u32;
    let mut autosavedone: u32 = 0;
    let mut autosavemissing = countmax;

    let mut countsize: u64 = 0;
    let mut countpos: u32 = 0;
    let mut recountmax: u32 = 0;
    let mut fatal = false;

    let mut progress = Progress::begin(countmax);

    'stripes: for i in 0..blockmax {
        let info = state.info.get(i);
        if !selected(info, i, recountmax) {
            continue;
        }

        recountmax += 1;
        autosavedone += 1;
        autosavemissing -= 1;

        let mut error_on_this_block = false;
        let mut silent_error_on_this_block = false;

        // Whether every file of this stripe still matches the catalog.
        let mut block_is_unsynched = false;

        let rehash = info.needs_rehash();

        for j in 0..diskmax {
            let mut file_is_unsynched = false;
            rehandle[j].staged = false;

            let disk = &state.disks[j];
            let block = match disk.block(i) {
                Some(b) => b,
                None => {
                    // Unused position on this disk, parity sees zeros.
                    buffers[j].fill(0);
                    continue;
                }
            };
            let file = &disk.files[block.file];

            // A block of a different file ends the life of the current
            // descriptor.
            if handles[j].file != Some(block.file) {
                if handles[j].close().is_err() {
                    // Closing a read-only descriptor should never fail.
                    eprintln!("DANGER! Unexpected close error in a data disk, it isn't possible to scrub.");
                    println!("Stopping at block {}", i);
                    error += 1;
                    fatal = true;
                    break 'stripes;
                }
            }

            if handles[j].open(block.file, file, opts.skip_sequential).is_err() {
                ctx.logger.error(&format!(
                    "error:{}:{}:{}: Open error at position {}",
                    i, handles[j].name, file.sub.display(), block.file_pos,
                ));
                error += 1;
                error_on_this_block = true;
                continue;
            }

            // An unsynched file is not a reason to stop: the scrub keeps
            // going and reports the blocks it cannot trust.
            if !handles[j].st.matches(file) {
                block_is_unsynched = true;
                file_is_unsynched = true;
            }

            let read_size = match handles[j].read_block(block.file_pos, &mut buffers[j]) {
                Ok(n) => n,
                Err(_) => {
                    ctx.logger.error(&format!(
                        "error:{}:{}:{}: Read error at position {}",
                        i, handles[j].name, file.sub.display(), block.file_pos,
                    ));
                    error += 1;
                    error_on_this_block = true;
                    continue;
                }
            };

            countsize += read_size as u64;

            let hash = if rehash {
                // Verify under the previous generation and stage the new
                // hash for the commit on a clean stripe.
                rehandle[j].hash = memhash(HashKind::Current, state.hash_seed, &buffers[j][..read_size]);
                rehandle[j].staged = true;

                memhash(HashKind::Previous, state.prevhash_seed, &buffers[j][..read_size])
            } else {
                memhash(HashKind::Current, state.hash_seed, &buffers[j][..read_size])
            };

            if let Some(stored) = &block.hash {
                if *stored != hash {
                    ctx.logger.error(&format!(
                        "error:{}:{}:{}: Data error at position {}",
                        i, handles[j].name, file.sub.display(), block.file_pos,
                    ));
                    error += 1;

                    // It's silent only when the file matches the catalog.
                    if file_is_unsynched {
                        error_on_this_block = true;
                    } else {
                        silent_error += 1;
                        silent_error_on_this_block = true;
                    }
                    continue;
                }
            }
        }

        // With all the data read and matching, check the parity.
        if !error_on_this_block && !silent_error_on_this_block {
            let (parity_buf, qarity_buf) = if state.level == 1 {
                (diskmax + 1, diskmax + 1)
            } else {
                (diskmax + 2, diskmax + 3)
            };

            let parity_ok = match parity.read(i, &mut buffers[parity_buf]) {
                Ok(()) => true,
                Err(_) => {
                    ctx.logger.error(&format!("error:{}:parity: Read error", i));
                    error += 1;
                    error_on_this_block = true;
                    false
                }
            };

            let mut qarity_ok = false;
            if state.level >= 2 {
                if let Some(q) = qarity.as_deref_mut() {
                    qarity_ok = match q.read(i, &mut buffers[qarity_buf]) {
                        Ok(()) => true,
                        Err(_) => {
                            ctx.logger.error(&format!("error:{}:qarity: Read error", i));
                            error += 1;
                            error_on_this_block = true;
                            false
                        }
                    };
                }
            }

            raid::gen(state.level, &mut buffers, diskmax, block_size);

            if parity_ok && buffers[diskmax] != buffers[parity_buf] {
                ctx.logger.error(&format!("error:{}:parity: Data error", i));
                error += 1;

                // It's silent only when the whole stripe is in sync.
                if block_is_unsynched {
                    error_on_this_block = true;
                } else {
                    silent_error += 1;
                    silent_error_on_this_block = true;
                }
            }

            if state.level >= 2 && qarity_ok && buffers[diskmax + 1] != buffers[qarity_buf] {
                ctx.logger.error(&format!("error:{}:qarity: Data error", i));
                error += 1;

                if block_is_unsynched {
                    error_on_this_block = true;
                } else {
                    silent_error += 1;
                    silent_error_on_this_block = true;
                }
            }
        }

        if silent_error_on_this_block {
            // Flag the corruption, keeping the existing time and hashes
            // so the next scrub still sees it.
            state.info.set(i, info.with_bad());
        } else if error_on_this_block {
            // A generic error, likely an unsynched array. The last known
            // good verification time must survive.
        } else {
            if rehash {
                for j in 0..diskmax {
                    if rehandle[j].staged {
                        if let Some(block) = state.disks[j].block_mut(i) {
                            block.hash = Some(rehandle[j].hash);
                        }
                    }
                }
            }

            state.info.set(i, BlockInfo::make(now, false, false));
        }

        state.need_write = true;
        countpos += 1;

        if progress.tick(i, countpos, countmax, countsize) {
            break;
        }

        if opts.autosave != 0
            && autosavedone >= autosavelimit
            && autosavemissing >= autosavelimit
        {
            autosavedone = 0;

            progress.pause();
            println!("Autosaving...");
            if let Err(e) = state.save(&opts.content) {
                eprintln!("error: autosave failed: {}", e);
                error += 1;
                fatal = true;
                break;
            }
            progress.resume();
        }
    }

    if !fatal {
        progress.end(countpos, countmax, countsize);

        if error != 0 || silent_error != 0 {
            println!("{} read/data errors", error);
            println!("{} silent errors", silent_error);
        } else if countpos != 0 {
            println!("No error");
        }
    }

    // The handles go down on every exit path, even after a fatal error.
    for handle in handles.iter_mut() {
        if handle.close().is_err() {
            eprintln!("DANGER! Unexpected close error in a data disk.");
            error += 1;
        }
    }

    if opts.expect_recoverable {
        if error == 0 {
            bail!("expected recoverable errors, but none were found");
        }
    } else if error != 0 {
        bail!("{} errors found during the scrub", error);
    }

    Ok(())
}

// Tests.
