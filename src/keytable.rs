// ============================================================================
// Build-time key tables: a collision-free hash for one known field-name set
// ============================================================================
//
// For a fixed set of field names we can usually find a trivial hash that
// maps every name to a distinct slot of a small power-of-two table. The
// matcher then resolves a field from the hash alone, with no character
// comparison. The search tries the shift family first (cheapest to compute
// incrementally), then a handful of multipliers; if nothing is perfect, the
// best multiplier is kept and entries chain within their slot.
//
// Tables are immutable after build and safe to share across concurrent
// parses. Duplicate names are a caller contract violation.

/// The hash strategy a table was built with. The matcher must replay the
/// exact same formula unit by unit while scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashKind {
    /// `h = (h << bits) + unit`. Zero bits is the plain sum.
    Shift(u32),
    /// `h = h * prime + unit`.
    Prime(u32),
}

impl HashKind {
    #[inline(always)]
    pub fn step(self, h: u64, unit: u32) -> u64 {
        match self {
            HashKind::Shift(b) => (h << b).wrapping_add(unit as u64),
            HashKind::Prime(p) => h.wrapping_mul(p as u64).wrapping_add(unit as u64),
        }
    }

    /// Hash of a whole name, over UTF-16 code units so that byte and
    /// code-unit scans agree for ASCII names.
    pub fn hash_name(self, name: &str) -> u64 {
        name.encode_utf16().fold(0, |h, u| self.step(h, u as u32))
    }
}

const SHIFT_MAX: u32 = 14;
const PRIMES: [u32; 8] = [31, 37, 41, 43, 47, 53, 59, 61];

/// One resolved field name. Immutable, owned by its table.
pub struct KeyEntry {
    name: Box<str>,
    hash: u64,
    handle: u32,
    /// Index of the next entry in this slot's collision chain, or -1.
    next: i32,
}

impl KeyEntry {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The caller-side field handle: the name's index in the build set.
    #[inline]
    pub fn handle(&self) -> u32 {
        self.handle
    }
}

/// Hash table over one object shape's field names.
pub struct KeyTable {
    kind: HashKind,
    mask: u64,
    collisions: bool,
    ascii_only: bool,
    slots: Box<[i32]>,
    entries: Box<[KeyEntry]>,
}

impl KeyTable {
    /// Build a table for `names`. Handles are the indices into `names`.
    /// Names must be unique.
    pub fn build(names: &[&str]) -> KeyTable {
        debug_assert!(
            {
                let mut seen: Vec<&str> = names.to_vec();
                seen.sort_unstable();
                seen.windows(2).all(|w| w[0] != w[1])
            },
            "duplicate field names in shape"
        );

        let ascii_only = names.iter().all(|n| n.is_ascii());
        let n = names.len();
        if n == 0 {
            return KeyTable {
                kind: HashKind::Shift(0),
                mask: 0,
                collisions: false,
                ascii_only,
                slots: Box::new([]),
                entries: Box::new([]),
            };
        }

        let cap = if n == 1 {
            1
        } else {
            (2 * n).next_power_of_two()
        };

        for bits in 0..=SHIFT_MAX {
            if let Ok(table) = Self::try_perfect(HashKind::Shift(bits), names, cap, ascii_only) {
                return table;
            }
        }

        let mut best = (PRIMES[0], usize::MAX);
        for &p in &PRIMES {
            match Self::try_perfect(HashKind::Prime(p), names, cap, ascii_only) {
                Ok(table) => return table,
                Err(clashes) => {
                    if clashes < best.1 {
                        best = (p, clashes);
                    }
                }
            }
        }

        Self::build_chained(HashKind::Prime(best.0), names, cap, ascii_only)
    }

    /// Attempt a collision-free table; on failure reports how many names
    /// clashed so the caller can keep the best fallback strategy.
    fn try_perfect(
        kind: HashKind,
        names: &[&str],
        cap: usize,
        ascii_only: bool,
    ) -> Result<KeyTable, usize> {
        let mask = (cap - 1) as u64;
        let mut slots = vec![-1i32; cap];
        let mut entries = Vec::with_capacity(names.len());
        let mut clashes = 0usize;

        for (i, &name) in names.iter().enumerate() {
            let hash = kind.hash_name(name);
            let slot = (hash & mask) as usize;
            if slots[slot] >= 0 {
                clashes += 1;
            } else {
                slots[slot] = i as i32;
            }
            entries.push(KeyEntry {
                name: name.into(),
                hash,
                handle: i as u32,
                next: -1,
            });
        }

        if clashes > 0 {
            return Err(clashes);
        }
        Ok(KeyTable {
            kind,
            mask,
            collisions: false,
            ascii_only,
            slots: slots.into_boxed_slice(),
            entries: entries.into_boxed_slice(),
        })
    }

    /// Fallback: keep the strategy, chain clashing entries within a slot.
    fn build_chained(kind: HashKind, names: &[&str], cap: usize, ascii_only: bool) -> KeyTable {
        let mask = (cap - 1) as u64;
        let mut slots = vec![-1i32; cap];
        let mut entries: Vec<KeyEntry> = Vec::with_capacity(names.len());

        for (i, &name) in names.iter().enumerate() {
            let hash = kind.hash_name(name);
            entries.push(KeyEntry {
                name: name.into(),
                hash,
                handle: i as u32,
                next: -1,
            });
            let slot = (hash & mask) as usize;
            if slots[slot] < 0 {
                slots[slot] = i as i32;
            } else {
                let mut at = slots[slot] as usize;
                while entries[at].next >= 0 {
                    at = entries[at].next as usize;
                }
                entries[at].next = i as i32;
            }
        }

        KeyTable {
            kind,
            mask,
            collisions: true,
            ascii_only,
            slots: slots.into_boxed_slice(),
            entries: entries.into_boxed_slice(),
        }
    }

    /// The strategy descriptor the matcher replays.
    #[inline]
    pub fn kind(&self) -> HashKind {
        self.kind
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    #[inline]
    pub fn has_collisions(&self) -> bool {
        self.collisions
    }

    #[inline]
    pub fn is_ascii_only(&self) -> bool {
        self.ascii_only
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a hash match alone may be trusted as a full key match.
    #[inline]
    pub fn fast_mode_ok(&self) -> bool {
        !self.collisions && self.ascii_only
    }

    /// Entries in the slot `hash` maps to, chain order.
    #[inline]
    pub fn probe(&self, hash: u64) -> Probe<'_> {
        let at = if self.entries.is_empty() {
            -1
        } else {
            self.slots[(hash & self.mask) as usize]
        };
        Probe { table: self, at }
    }

    /// Resolve a name the slow way (hash + probe + compare). Used by the
    /// unquoted-key path and by callers that already hold a decoded name.
    pub fn handle_of(&self, name: &str) -> Option<u32> {
        let hash = self.kind.hash_name(name);
        self.probe(hash)
            .find(|e| e.hash == hash && e.name() == name)
            .map(|e| e.handle)
    }
}

/// Iterator over one slot's collision chain.
pub struct Probe<'t> {
    table: &'t KeyTable,
    at: i32,
}

impl<'t> Iterator for Probe<'t> {
    type Item = &'t KeyEntry;

    #[inline]
    fn next(&mut self) -> Option<&'t KeyEntry> {
        if self.at < 0 {
            return None;
        }
        let entry = &self.table.entries[self.at as usize];
        self.at = entry.next;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_build_small_set_is_perfect() {
        let table = KeyTable::build(&["id", "name", "email", "created_at"]);
        assert!(!table.has_collisions());
        assert!(table.fast_mode_ok());
        for (i, name) in ["id", "name", "email", "created_at"].iter().enumerate() {
            assert_eq!(table.handle_of(name), Some(i as u32), "{name}");
        }
        assert_eq!(table.handle_of("missing"), None);
    }

    #[test]
    fn test_trivial_sizes() {
        let empty = KeyTable::build(&[]);
        assert!(empty.is_empty());
        assert_eq!(empty.handle_of("x"), None);
        assert!(empty.probe(123).next().is_none());

        let single = KeyTable::build(&["only"]);
        assert_eq!(single.len(), 1);
        assert!(!single.has_collisions());
        assert_eq!(single.handle_of("only"), Some(0));
        assert_eq!(single.handle_of("other"), None);
    }

    #[test]
    fn test_perfect_hash_distinct_slots() {
        let names = ["a", "b", "c", "aa", "ab", "ba"];
        let table = KeyTable::build(&names);
        if !table.has_collisions() {
            let mut slots: Vec<u64> = names
                .iter()
                .map(|n| table.kind().hash_name(n) & table.mask())
                .collect();
            slots.sort_unstable();
            slots.dedup();
            assert_eq!(slots.len(), names.len());
        }
    }

    #[test]
    fn test_chained_fallback_resolves_all_names() {
        // force the chained path to make sure probing walks chains
        let names = ["alpha", "beta", "gamma", "delta"];
        let table = KeyTable::build_chained(HashKind::Prime(31), &names, 8, true);
        assert!(table.has_collisions());
        assert!(!table.fast_mode_ok());
        for (i, name) in names.iter().enumerate() {
            assert_eq!(table.handle_of(name), Some(i as u32), "{name}");
        }
        assert_eq!(table.handle_of("epsilon"), None);
    }

    #[test]
    fn test_non_ascii_names_disable_fast_mode() {
        let table = KeyTable::build(&["id", "stra\u{df}e"]);
        assert!(!table.fast_mode_ok());
        assert_eq!(table.handle_of("stra\u{df}e"), Some(1));
    }

    #[quickcheck]
    fn prop_build_is_sound(names: Vec<String>) -> TestResult {
        let mut names: Vec<String> = names
            .into_iter()
            .filter(|n| !n.is_empty() && n.is_ascii() && n.len() < 24)
            .take(64)
            .collect();
        names.sort_unstable();
        names.dedup();
        if names.is_empty() {
            return TestResult::discard();
        }
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let table = KeyTable::build(&refs);

        // every name resolves to its own handle, collision-free or not
        for (i, name) in refs.iter().enumerate() {
            if table.handle_of(name) != Some(i as u32) {
                return TestResult::failed();
            }
        }

        // a collision-free report means all slots really are distinct
        if !table.has_collisions() {
            let mut slots: Vec<u64> = refs
                .iter()
                .map(|n| table.kind().hash_name(n) & table.mask())
                .collect();
            slots.sort_unstable();
            slots.dedup();
            if slots.len() != refs.len() {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }
}
