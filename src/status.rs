use crate::state::State;


/// Prints a report of the verification state of the array.
/// Returns true when bad blocks are present.
pub fn report(state: &State) -> bool
{
    let blockmax = state.blockmax();

    let mut times = Vec::new();
    let mut bad = 0u32;
    let mut rehash = 0u32;

    for i in 0..blockmax {
        let info = state.info.get(i);
        if info.is_unused() {
            continue;
        }

        times.push(info.time());
        if info.is_bad() {
            bad += 1;
        }
        if info.needs_rehash() {
            rehash += 1;
        }
    }

    times.sort_unstable();

    println!("{} blocks, {} unused", blockmax, blockmax - times.len() as u32);

    if times.is_empty() {
        println!("Nothing has been verified yet");
        return false;
    }

    let oldest = *times.first().unwrap();
    let newest = *times.last().unwrap();
    let median = times[times.len() / 2];

    println!("Verified between {} and {}, median {}", oldest, newest, median);

    if newest > oldest {
        // Eight buckets from the oldest to the newest verification.
        let span = (newest - oldest) as u64 + 1;
        let mut buckets = [0u32; 8];
        for t in &times {
            let slot = ((*t - oldest) as u64 * 8 / span) as usize;
            buckets[slot] += 1;
        }

        for (b, count) in buckets.iter().enumerate() {
            println!("  age {}/8: {} blocks", 8 - b, count);
        }
    }

    if rehash != 0 {
        println!("{} blocks still waiting for a rehash", rehash);
    }

    if bad != 0 {
        println!("DANGER! {} bad blocks, use the fix command to repair", bad);
    } else {
        println!("No bad blocks");
    }

    bad != 0
}
