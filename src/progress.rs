use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;


static INTERRUPT: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_sig: libc::c_int)
{
    INTERRUPT.store(true, Ordering::Relaxed);
}

/// Installs the SIGINT flag used for cooperative cancellation.
/// The scrub loop observes it between stripes only, so the outcome of the
/// stripe in flight is always committed before stopping.
pub fn install_interrupt()
{
    unsafe {
        libc::signal(libc::SIGINT, on_interrupt as libc::sighandler_t);
    }
}

pub fn interrupted() -> bool
{
    INTERRUPT.load(Ordering::Relaxed)
}


/// Console progress for one scrub run.
#[derive(Debug)]
pub struct Progress {
    start: Instant,
    last: Instant,
}

impl Progress {
    pub fn begin(countmax: u32) -> Self
    {
        eprintln!("{} blocks to scrub", countmax);

        let now = Instant::now();
        Self {
            start: now,
            last: now,
        }
    }

    /// Reports progress and polls for cancellation.
    /// Returns true when the run should stop.
    pub fn tick(&mut self, i: u32, countpos: u32, countmax: u32, countsize: u64) -> bool
    {
        if interrupted() {
            eprintln!("Stopping at block {} for interruption", i);
            return true;
        }

        if self.last.elapsed().as_secs() >= 1 {
            self.last = Instant::now();

            let elapsed = self.start.elapsed().as_secs_f64();
            let speed = if elapsed > 0.0 {
                countsize as f64 / elapsed / (1024.0 * 1024.0)
            } else {
                0.0
            };

            if countmax != 0 {
                eprint!(
                    "\r{:3}%, {} MiB, {:.0} MiB/s",
                    countpos as u64 * 100 / countmax as u64,
                    countsize / (1024 * 1024),
                    speed,
                );
            }
        }

        false
    }

    /// Ends the progress line before other output takes the console.
    pub fn pause(&mut self)
    {
        eprintln!();
    }

    pub fn resume(&mut self)
    {
        self.last = Instant::now();
    }

    pub fn end(&self, countpos: u32, countmax: u32, countsize: u64)
    {
        if countmax != 0 {
            eprintln!(
                "\r{} of {} blocks scrubbed, {} MiB",
                countpos,
                countmax,
                countsize / (1024 * 1024),
            );
        }
    }
}
