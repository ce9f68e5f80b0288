//! The identifier-set facade.
//!
//! Per OBJECT_ID_SET.md §1-§3:
//! - One contract, two interchangeable storage strategies selected at
//!   construction (run-list vs bit-vector)
//! - Ascending signed iteration order
//! - Value equality against any identifier collection built from the same
//!   elements, regardless of strategy
//! - A self-describing tagged serialized form so a reader can reconstruct
//!   either representation
//!
//! The set is not internally synchronized; callers that share one across
//! threads wrap it (see `SharedIdSet`).

use std::io::{self, Read, Write};

use super::bit_set::{BitIter, BitSetIdSet};
use super::errors::{IdSetError, IdSetResult};
use super::id::ObjectId;
use super::range_set::{RangeIdSet, RangeIter};

/// Storage strategy, chosen at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetRepresentation {
    /// (start, length) runs; compact for sparse, clustered populations.
    Ranges,
    /// 64-aligned (base, word) pairs; compact for dense populations.
    BitSet,
}

impl SetRepresentation {
    /// Wire tag per OBJECT_ID_SET.md §3.
    pub fn tag(self) -> i32 {
        match self {
            SetRepresentation::Ranges => 0,
            SetRepresentation::BitSet => 1,
        }
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(SetRepresentation::Ranges),
            1 => Some(SetRepresentation::BitSet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backing {
    Ranges(RangeIdSet),
    BitSet(BitSetIdSet),
}

/// A sorted, deduplicated set of object identifiers.
#[derive(Debug, Clone)]
pub struct ObjectIdSet {
    backing: Backing,
}

impl ObjectIdSet {
    /// Create an empty set with the given representation.
    pub fn with_representation(rep: SetRepresentation) -> Self {
        let backing = match rep {
            SetRepresentation::Ranges => Backing::Ranges(RangeIdSet::new()),
            SetRepresentation::BitSet => Backing::BitSet(BitSetIdSet::new()),
        };
        Self { backing }
    }

    /// Empty run-list set. Batch-allocated identifiers cluster into runs,
    /// so this is the default.
    pub fn new() -> Self {
        Self::with_representation(SetRepresentation::Ranges)
    }

    /// Copy construction: same elements, chosen representation.
    pub fn from_ids<I>(rep: SetRepresentation, ids: I) -> Self
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut set = Self::with_representation(rep);
        set.add_all(ids);
        set
    }

    pub fn representation(&self) -> SetRepresentation {
        match &self.backing {
            Backing::Ranges(_) => SetRepresentation::Ranges,
            Backing::BitSet(_) => SetRepresentation::BitSet,
        }
    }

    pub fn len(&self) -> u64 {
        match &self.backing {
            Backing::Ranges(s) => s.len(),
            Backing::BitSet(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        match &self.backing {
            Backing::Ranges(s) => s.contains(id),
            Backing::BitSet(s) => s.contains(id),
        }
    }

    /// Add one identifier. Returns true if the set changed.
    pub fn add(&mut self, id: ObjectId) -> bool {
        match &mut self.backing {
            Backing::Ranges(s) => s.add(id),
            Backing::BitSet(s) => s.add(id),
        }
    }

    /// Remove one identifier. Returns true if the set changed.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        match &mut self.backing {
            Backing::Ranges(s) => s.remove(id),
            Backing::BitSet(s) => s.remove(id),
        }
    }

    pub fn clear(&mut self) {
        match &mut self.backing {
            Backing::Ranges(s) => s.clear(),
            Backing::BitSet(s) => s.clear(),
        }
    }

    pub fn first(&self) -> Option<ObjectId> {
        match &self.backing {
            Backing::Ranges(s) => s.first(),
            Backing::BitSet(s) => s.first(),
        }
    }

    pub fn last(&self) -> Option<ObjectId> {
        match &self.backing {
            Backing::Ranges(s) => s.last(),
            Backing::BitSet(s) => s.last(),
        }
    }

    /// Smallest member strictly greater than `raw`, if any.
    pub fn next_above(&self, raw: i64) -> Option<ObjectId> {
        match &self.backing {
            Backing::Ranges(s) => s.next_above(raw),
            Backing::BitSet(s) => s.next_above(raw),
        }
    }

    /// Add every identifier from `ids`. Returns true if the set changed.
    pub fn add_all<I>(&mut self, ids: I) -> bool
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut changed = false;
        for id in ids {
            changed |= self.add(id);
        }
        changed
    }

    /// Remove every identifier in `ids`. Returns true if the set changed.
    pub fn remove_all<I>(&mut self, ids: I) -> bool
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut changed = false;
        for id in ids {
            changed |= self.remove(id);
        }
        changed
    }

    /// Keep only identifiers also present in `other`. Returns true if the
    /// set changed.
    pub fn retain_all(&mut self, other: &ObjectIdSet) -> bool {
        let evicted: Vec<ObjectId> = self.iter().filter(|id| !other.contains(*id)).collect();
        self.remove_all(evicted)
    }

    /// True when every member of `other` is also a member of this set.
    pub fn is_superset_of(&self, other: &ObjectIdSet) -> bool {
        other.iter().all(|id| self.contains(id))
    }

    pub fn iter(&self) -> Iter<'_> {
        match &self.backing {
            Backing::Ranges(s) => Iter::Ranges(s.iter()),
            Backing::BitSet(s) => Iter::BitSet(s.iter()),
        }
    }

    /// Mutable cursor supporting removal mid-iteration; removal of an
    /// interior run element splits the run without disturbing the rest of
    /// the traversal. Per OBJECT_ID_SET.md §4.
    pub fn cursor(&mut self) -> Cursor<'_> {
        Cursor {
            set: self,
            current: None,
            resume: None,
            started: false,
        }
    }

    /// Serialize per OBJECT_ID_SET.md §3: i32 representation tag, i32
    /// element count, then (i64, u64) pairs: runs for the run-list form,
    /// base/word pairs for the bit-vector form.
    pub fn serialize_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.representation().tag().to_le_bytes())?;
        out.write_all(&(self.len() as i32).to_le_bytes())?;
        match &self.backing {
            Backing::Ranges(s) => {
                for (start, len) in s.runs() {
                    out.write_all(&start.to_le_bytes())?;
                    out.write_all(&len.to_le_bytes())?;
                }
            }
            Backing::BitSet(s) => {
                for (base, word) in s.words() {
                    out.write_all(&base.to_le_bytes())?;
                    out.write_all(&word.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.serialize_to(&mut buf);
        buf
    }

    /// Reconstruct a set from its serialized form. The representation is
    /// taken from the leading tag, not from the reader's preference.
    pub fn deserialize_from<R: Read>(input: &mut R) -> io::Result<ObjectIdSet> {
        let tag = read_i32(input)?;
        let rep = SetRepresentation::from_tag(tag).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown id-set representation tag: {}", tag),
            )
        })?;
        let count = read_i32(input)?;
        if count < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("negative id-set element count: {}", count),
            ));
        }
        let count = count as u64;

        let mut set = ObjectIdSet::with_representation(rep);
        match &mut set.backing {
            Backing::Ranges(s) => {
                let mut seen = 0u64;
                while seen < count {
                    let start = read_i64(input)?;
                    let len = read_u64(input)?;
                    if len == 0 || seen + len > count {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "id-set run length inconsistent with element count",
                        ));
                    }
                    for offset in 0..len {
                        s.add(ObjectId::new(start.wrapping_add(offset as i64)));
                    }
                    seen += len;
                }
            }
            Backing::BitSet(s) => {
                let mut seen = 0u64;
                while seen < count {
                    let base = read_i64(input)?;
                    let word = read_u64(input)?;
                    let bits = u64::from(word.count_ones());
                    if bits == 0 || base & 63 != 0 || seen + bits > count {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "id-set word inconsistent with element count",
                        ));
                    }
                    s.insert_word(base, word);
                    seen += bits;
                }
            }
        }
        Ok(set)
    }

    pub fn deserialize(data: &[u8]) -> io::Result<ObjectIdSet> {
        let mut cursor = io::Cursor::new(data);
        Self::deserialize_from(&mut cursor)
    }
}

impl Default for ObjectIdSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Equality is by membership, independent of representation.
impl PartialEq for ObjectIdSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for ObjectIdSet {}

impl Extend<ObjectId> for ObjectIdSet {
    fn extend<I: IntoIterator<Item = ObjectId>>(&mut self, ids: I) {
        self.add_all(ids);
    }
}

impl FromIterator<ObjectId> for ObjectIdSet {
    fn from_iter<I: IntoIterator<Item = ObjectId>>(ids: I) -> Self {
        let mut set = ObjectIdSet::new();
        set.add_all(ids);
        set
    }
}

impl<'a> IntoIterator for &'a ObjectIdSet {
    type Item = ObjectId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Ascending iterator over either representation.
pub enum Iter<'a> {
    Ranges(RangeIter<'a>),
    BitSet(BitIter<'a>),
}

impl Iterator for Iter<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        match self {
            Iter::Ranges(it) => it.next(),
            Iter::BitSet(it) => it.next(),
        }
    }
}

/// Forward cursor with removal, borrowed mutably from the set.
pub struct Cursor<'a> {
    set: &'a mut ObjectIdSet,
    current: Option<ObjectId>,
    resume: Option<i64>,
    started: bool,
}

impl Cursor<'_> {
    /// Advance to the next identifier in ascending order.
    pub fn next(&mut self) -> Option<ObjectId> {
        let next = match (self.started, self.resume) {
            (false, _) => self.set.first(),
            (true, Some(from)) => self.set.next_above(from),
            (true, None) => None,
        };
        self.started = true;
        self.current = next;
        self.resume = next.map(ObjectId::raw).or(self.resume);
        next
    }

    /// Remove the identifier most recently produced by `next`. The cursor
    /// resumes after the removed position; an interior removal splits the
    /// underlying run.
    pub fn remove(&mut self) -> IdSetResult<()> {
        match self.current.take() {
            Some(id) => {
                self.set.remove(id);
                Ok(())
            }
            None => Err(IdSetError::NoCurrentElement),
        }
    }
}

fn read_i32<R: Read>(input: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i64<R: Read>(input: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: [SetRepresentation; 2] = [SetRepresentation::Ranges, SetRepresentation::BitSet];

    fn set_of(rep: SetRepresentation, ids: &[i64]) -> ObjectIdSet {
        ObjectIdSet::from_ids(rep, ids.iter().copied().map(ObjectId::new))
    }

    #[test]
    fn test_representations_agree() {
        let ids = [1, 10, 14, 18, 68, 75, 175, 205, -3, i64::MIN];
        let ranges = set_of(SetRepresentation::Ranges, &ids);
        let bits = set_of(SetRepresentation::BitSet, &ids);
        assert_eq!(ranges, bits);
        assert_eq!(ranges.len(), bits.len());
        let a: Vec<i64> = ranges.iter().map(ObjectId::raw).collect();
        let b: Vec<i64> = bits.iter().map(ObjectId::raw).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_serialize_round_trip_both_representations() {
        for rep in BOTH {
            let set = set_of(rep, &[1, 2, 3, 64, 65, -100, 4096, i64::MAX]);
            let bytes = set.serialize();
            let back = ObjectIdSet::deserialize(&bytes).unwrap();
            assert_eq!(back.representation(), rep);
            assert_eq!(back, set);
        }
    }

    #[test]
    fn test_deserialize_rejects_unknown_tag() {
        let mut bytes = set_of(SetRepresentation::Ranges, &[1]).serialize();
        bytes[0] = 9;
        let err = ObjectIdSet::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_deserialize_rejects_truncation() {
        let bytes = set_of(SetRepresentation::BitSet, &[1, 100, 1000]).serialize();
        let err = ObjectIdSet::deserialize(&bytes[..bytes.len() - 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_cursor_removal_splits_runs() {
        for rep in BOTH {
            let mut set = set_of(rep, &[1, 2, 3, 4, 5]);
            let mut cursor = set.cursor();
            assert_eq!(cursor.next().map(ObjectId::raw), Some(1));
            assert_eq!(cursor.next().map(ObjectId::raw), Some(2));
            assert_eq!(cursor.next().map(ObjectId::raw), Some(3));
            cursor.remove().unwrap();
            assert_eq!(cursor.next().map(ObjectId::raw), Some(4));
            assert_eq!(cursor.next().map(ObjectId::raw), Some(5));
            assert_eq!(cursor.next(), None);
            let ids: Vec<i64> = set.iter().map(ObjectId::raw).collect();
            assert_eq!(ids, vec![1, 2, 4, 5]);
        }
    }

    #[test]
    fn test_cursor_remove_without_next_is_an_error() {
        let mut set = set_of(SetRepresentation::Ranges, &[1]);
        let mut cursor = set.cursor();
        assert_eq!(cursor.remove(), Err(IdSetError::NoCurrentElement));
    }

    #[test]
    fn test_set_algebra() {
        for rep in BOTH {
            let mut set = set_of(rep, &[1, 2, 3, 4, 5]);
            let keep = set_of(rep, &[2, 4, 9]);
            assert!(set.retain_all(&keep));
            let ids: Vec<i64> = set.iter().map(ObjectId::raw).collect();
            assert_eq!(ids, vec![2, 4]);

            assert!(set.remove_all([ObjectId::new(2)]));
            assert!(!set.remove_all([ObjectId::new(77)]));
            assert!(set.add_all([ObjectId::new(8), ObjectId::new(9)]));
        }
    }

    #[test]
    fn test_superset_check() {
        let big = set_of(SetRepresentation::Ranges, &[1, 2, 3, 4]);
        let small = set_of(SetRepresentation::BitSet, &[2, 3]);
        assert!(big.is_superset_of(&small));
        assert!(!small.is_superset_of(&big));
    }
}
