//! Checker-private state
//!
//! Checkers keep their own facts inside the program state so that the
//! facts fork, merge and get compared together with everything else. Each
//! kind of fact is a [`ProgramStateTrait`]: a tag plus a typed key/value
//! encoding into the shared [`GenericDataMap`].
//!
//! ```ignore
//! struct AllocationState;
//!
//! impl ProgramStateTrait for AllocationState {
//!     const TAG: &'static str = "unix.Malloc";
//!     type Key = SymbolId;
//!     type Value = RefState;
//!     // encode/decode between the typed and stored forms
//! }
//! ```

use crate::memory::RegionId;
use crate::store::PersistentMap;
use crate::svals::SymbolId;

/// Stored form of a trait key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TraitEntry {
    Unit,
    Symbol(SymbolId),
    Region(RegionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitKey {
    pub tag: &'static str,
    pub entry: TraitEntry,
}

/// Stored form of a trait value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TraitValue {
    Int(i64),
    Flag(bool),
    Symbol(SymbolId),
    Region(RegionId),
    /// A kind tag plus the location that produced it
    Tagged { kind: u8, expr: u32 },
}

pub trait ProgramStateTrait {
    const TAG: &'static str;
    type Key;
    type Value;

    fn encode_key(key: &Self::Key) -> TraitEntry;
    fn decode_key(entry: TraitEntry) -> Option<Self::Key>;
    fn encode_value(value: &Self::Value) -> TraitValue;
    fn decode_value(value: &TraitValue) -> Option<Self::Value>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GenericDataMap {
    entries: PersistentMap<TraitKey, TraitValue>,
}

impl GenericDataMap {
    pub fn get<T: ProgramStateTrait>(&self, key: &T::Key) -> Option<T::Value> {
        let key = TraitKey {
            tag: T::TAG,
            entry: T::encode_key(key),
        };
        self.entries.get(&key).and_then(T::decode_value)
    }

    pub fn set<T: ProgramStateTrait>(&self, key: &T::Key, value: &T::Value) -> GenericDataMap {
        let key = TraitKey {
            tag: T::TAG,
            entry: T::encode_key(key),
        };
        GenericDataMap {
            entries: self.entries.insert(key, T::encode_value(value)),
        }
    }

    pub fn remove<T: ProgramStateTrait>(&self, key: &T::Key) -> GenericDataMap {
        let key = TraitKey {
            tag: T::TAG,
            entry: T::encode_key(key),
        };
        GenericDataMap {
            entries: self.entries.remove(&key),
        }
    }

    /// Every entry of trait `T`, in key order.
    pub fn entries<T: ProgramStateTrait>(&self) -> Vec<(T::Key, T::Value)> {
        self.entries
            .iter()
            .filter(|(key, _)| key.tag == T::TAG)
            .filter_map(|(key, value)| Some((T::decode_key(key.entry)?, T::decode_value(value)?)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    impl ProgramStateTrait for Counter {
        const TAG: &'static str = "test.Counter";
        type Key = SymbolId;
        type Value = i64;

        fn encode_key(key: &SymbolId) -> TraitEntry {
            TraitEntry::Symbol(*key)
        }

        fn decode_key(entry: TraitEntry) -> Option<SymbolId> {
            match entry {
                TraitEntry::Symbol(symbol) => Some(symbol),
                _ => None,
            }
        }

        fn encode_value(value: &i64) -> TraitValue {
            TraitValue::Int(*value)
        }

        fn decode_value(value: &TraitValue) -> Option<i64> {
            match value {
                TraitValue::Int(n) => Some(*n),
                _ => None,
            }
        }
    }

    struct Flags;

    impl ProgramStateTrait for Flags {
        const TAG: &'static str = "test.Flags";
        type Key = ();
        type Value = bool;

        fn encode_key(_: &()) -> TraitEntry {
            TraitEntry::Unit
        }

        fn decode_key(_: TraitEntry) -> Option<()> {
            Some(())
        }

        fn encode_value(value: &bool) -> TraitValue {
            TraitValue::Flag(*value)
        }

        fn decode_value(value: &TraitValue) -> Option<bool> {
            match value {
                TraitValue::Flag(flag) => Some(*flag),
                _ => None,
            }
        }
    }

    #[test]
    fn test_traits_do_not_collide() {
        let gdm = GenericDataMap::default()
            .set::<Counter>(&SymbolId(1), &5)
            .set::<Counter>(&SymbolId(2), &6)
            .set::<Flags>(&(), &true);

        assert_eq!(gdm.get::<Counter>(&SymbolId(1)), Some(5));
        assert_eq!(gdm.get::<Flags>(&()), Some(true));
        assert_eq!(gdm.entries::<Counter>(), vec![(SymbolId(1), 5), (SymbolId(2), 6)]);

        let removed = gdm.remove::<Counter>(&SymbolId(1));
        assert_eq!(removed.get::<Counter>(&SymbolId(1)), None);
        assert_eq!(gdm.get::<Counter>(&SymbolId(1)), Some(5));
    }
}
