use std::cmp::Ordering;

use serde::{Deserialize, Serialize};


const TIME_MASK: u64 = 0xffff_ffff;
const BAD: u64 = 1 << 32;
const REHASH: u64 = 1 << 33;


/// Per-stripe verification record, packed into a single word.
///
/// The low 32 bits hold the time of the last good verification in seconds
/// since the epoch. Bit 32 marks a block whose last verification found
/// silent corruption. Bit 33 marks a block whose stored hashes still use
/// the previous hash generation. The all-zero word is reserved for
/// "unused": such an index has never been hashed and is never scrubbed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo(u64);

impl BlockInfo {
    pub const UNUSED: Self = Self(0);

    pub fn make(time: u32, bad: bool, rehash: bool) -> Self
    {
        let mut word = time as u64;
        if bad { word |= BAD; }
        if rehash { word |= REHASH; }

        Self(word)
    }

    pub fn time(&self) -> u32
    {
        (self.0 & TIME_MASK) as u32
    }

    pub fn is_bad(&self) -> bool { self.0 & BAD != 0 }

    pub fn needs_rehash(&self) -> bool { self.0 & REHASH != 0 }

    pub fn is_unused(&self) -> bool { self.0 == 0 }

    /// The same record with the bad mark set. Time and rehash survive.
    pub fn with_bad(&self) -> Self
    {
        Self(self.0 | BAD)
    }

    /// Ascending order by verification time only.
    pub fn cmp_time(&self, other: &Self) -> Ordering
    {
        self.time().cmp(&other.time())
    }
}


/// Map of info words, indexed directly by stripe number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoMap(Vec<BlockInfo>);

impl InfoMap {
    pub fn new(blockmax: u32) -> Self
    {
        Self { 0: vec![BlockInfo::UNUSED; blockmax as usize] }
    }

    pub fn len(&self) -> u32
    {
        self.0.len() as u32
    }

    /// Indices beyond the map read as unused.
    pub fn get(&self, i: u32) -> BlockInfo
    {
        self.0.get(i as usize).copied().unwrap_or(BlockInfo::UNUSED)
    }

    pub fn set(&mut self, i: u32, info: BlockInfo)
    {
        self.0[i as usize] = info;
    }
}


// Tests.


#[cfg(test)]
mod tests {
    use super::{BlockInfo, InfoMap};

    #[test]
    fn make_and_unpack()
    {
        let info = BlockInfo::make(1234567, false, false);

        assert_eq!(info.time(), 1234567);
        assert_eq!(info.is_bad(), false);
        assert_eq!(info.needs_rehash(), false);
        assert_eq!(info.is_unused(), false);
    }

    #[test]
    fn make_with_flags()
    {
        let info = BlockInfo::make(99, true, true);

        assert_eq!(info.time(), 99);
        assert_eq!(info.is_bad(), true);
        assert_eq!(info.needs_rehash(), true);
    }

    #[test]
    fn zero_word_is_unused()
    {
        assert!(BlockInfo::UNUSED.is_unused());
        assert!(BlockInfo::default().is_unused());
        assert!(!BlockInfo::make(1, false, false).is_unused());
    }

    #[test]
    fn with_bad_preserves_time_and_rehash()
    {
        let info = BlockInfo::make(424242, false, true);
        let bad = info.with_bad();

        assert_eq!(bad.time(), 424242);
        assert_eq!(bad.is_bad(), true);
        assert_eq!(bad.needs_rehash(), true);
    }

    #[test]
    fn cmp_time_ignores_flags()
    {
        let mut words = vec![
            BlockInfo::make(30, false, false),
            BlockInfo::make(10, true, true),
            BlockInfo::make(20, false, true),
        ];
        words.sort_by(BlockInfo::cmp_time);

        assert_eq!(words[0].time(), 10);
        assert_eq!(words[1].time(), 20);
        assert_eq!(words[2].time(), 30);
    }

    #[test]
    fn map_get_out_of_range_is_unused()
    {
        let map = InfoMap::new(2);

        assert!(map.get(5).is_unused());
    }

    #[test]
    fn map_set_get()
    {
        let mut map = InfoMap::new(4);
        map.set(2, BlockInfo::make(7, false, false));

        assert_eq!(map.get(2).time(), 7);
        assert!(map.get(1).is_unused());
        assert_eq!(map.len(), 4);
    }
}
