//! Ordered string identifiers ("duplex" transaction ids and "triplex"
//! fractional position ids), C1 of the design.
//!
//! Both id flavours are sequences of 16-bit code units that must compare
//! correctly under plain lexicographic (UTF-16/UCS-2) string order, so they
//! are represented as `SmallVec<[u16; N]>` rather than `String`/`SmartString`:
//! a genuine `String` cannot hold arbitrary 16-bit values (surrogate halves
//! included) and the derived `Ord` on a slice of `u16` already gives exactly
//! the comparison the wire format requires.

use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

/// A single 16-bit code unit, as the wire format is defined over UTF-16/UCS-2
/// transport rather than UTF-8.
pub type CodeUnit = u16;

/// Most identifiers stay within a handful of triplets; 24 code units (3
/// triplets) covers the common case inline.
type Units = SmallVec<[CodeUnit; 24]>;

/// An ordered identifier: either a 5-unit duplex (transaction id) or an
/// `8 * n`-unit triplex (fractional position id).
///
/// `Identifier` implements `Ord` by deriving it from the inner code-unit
/// sequence, which is exactly string/lexicographic order over the code
/// units - the comparison the replication protocol relies on.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Identifier(Units);

impl std::fmt::Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Identifier").field(&self.0.as_slice()).finish()
    }
}

const TRIPLET_UNITS: usize = 8;
const DUPLEX_UNITS: usize = 5;

/// Maximum path value: 48 bits set.
pub const MAX_PATH: u64 = 0xFFFF_FFFF_FFFF;
const MASK_48: u64 = MAX_PATH;
const MASK_32: u32 = 0xFFFF_FFFF;

#[inline]
fn split48(v: u64) -> [u16; 3] {
    debug_assert_eq!(v & !MASK_48, 0, "value does not fit in 48 bits");
    [((v >> 32) & 0xFFFF) as u16, ((v >> 16) & 0xFFFF) as u16, (v & 0xFFFF) as u16]
}

#[inline]
fn join48(hi: u16, mid: u16, lo: u16) -> u64 {
    ((hi as u64) << 32) | ((mid as u64) << 16) | (lo as u64)
}

#[inline]
fn split32(v: u32) -> [u16; 2] {
    debug_assert_eq!(v & !MASK_32, 0);
    [((v >> 16) & 0xFFFF) as u16, (v & 0xFFFF) as u16]
}

#[inline]
fn join32(hi: u16, lo: u16) -> u32 {
    ((hi as u32) << 16) | (lo as u32)
}

/// One `(path, clock, storeId)` triplet read from a triplex id.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Triplet {
    path: u64,
    clock: u64,
    store: u32,
}

impl Identifier {
    /// An identifier with zero code units: sorts before every non-empty
    /// identifier and is used to mean "before everything"/"after everything"
    /// as the lower/upper bound passed to [`make_triplex`].
    pub fn empty() -> Self {
        Identifier(Units::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_units(&self) -> &[CodeUnit] {
        &self.0
    }

    pub fn from_units(units: impl IntoIterator<Item = CodeUnit>) -> Self {
        Identifier(units.into_iter().collect())
    }

    /// Number of 8-unit triplets in this (triplex) identifier.
    pub fn triplet_count(&self) -> usize {
        self.0.len() / TRIPLET_UNITS
    }

    fn triplet_at(&self, i: usize) -> Option<Triplet> {
        let start = i * TRIPLET_UNITS;
        if start + TRIPLET_UNITS > self.0.len() {
            return None;
        }
        let u = &self.0[start..start + TRIPLET_UNITS];
        Some(Triplet {
            path: join48(u[0], u[1], u[2]),
            clock: join48(u[3], u[4], u[5]),
            store: join32(u[6], u[7]),
        })
    }

    /// Path component of the `i`-th triplet, if present.
    pub fn path_at(&self, i: usize) -> Option<u64> {
        self.triplet_at(i).map(|t| t.path)
    }

    /// Clock component of the `i`-th triplet, if present.
    pub fn clock_at(&self, i: usize) -> Option<u64> {
        self.triplet_at(i).map(|t| t.clock)
    }

    /// StoreId component of the `i`-th triplet, if present.
    pub fn store_at(&self, i: usize) -> Option<u32> {
        self.triplet_at(i).map(|t| t.store)
    }

    /// Version component of a duplex (transaction) identifier.
    pub fn duplex_version(&self) -> u64 {
        debug_assert_eq!(self.0.len(), DUPLEX_UNITS);
        join48(self.0[0], self.0[1], self.0[2])
    }

    /// StoreId component of a duplex (transaction) identifier.
    pub fn duplex_store_id(&self) -> u32 {
        debug_assert_eq!(self.0.len(), DUPLEX_UNITS);
        join32(self.0[3], self.0[4])
    }

    fn push_triplet(&mut self, path: u64, clock: u64, store: u32) {
        let [ph, pm, pl] = split48(path);
        let [ch, cm, cl] = split48(clock);
        let [sh, sl] = split32(store);
        self.0.extend_from_slice(&[ph, pm, pl, ch, cm, cl, sh, sl]);
    }
}

impl std::fmt::Display for Identifier {
    /// Hex-encodes the code units; not a wire format, only for logging/debug.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for u in &self.0 {
            write!(f, "{:04x}", u)?;
        }
        Ok(())
    }
}

/// Builds a duplex (transaction) identifier from `(version, storeId)`.
///
/// Emits 5 code units: 3 for the 48-bit version, 2 for the 32-bit storeId.
/// Plain string order on the result gives `(version, storeId)` order.
pub fn make_duplex(version: u64, store_id: u32) -> Identifier {
    let [vh, vm, vl] = split48(version);
    let [sh, sl] = split32(store_id);
    Identifier(smallvec![vh, vm, vl, sh, sl])
}

/// `min + round(random() * sqrt(max - min))`: biases new paths toward the
/// low end of the open window so sequential appends get short ids while
/// random inserts still converge.
fn random_path(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    let span = (max - min) as f64;
    let r: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let offset = (r * span.sqrt()).round() as u64;
    (min + offset).min(max)
}

/// Reads the `i`-th triplet of `id`, zero-padded past its length.
fn lower_triplet(id: &Identifier, i: usize) -> Triplet {
    id.triplet_at(i).unwrap_or(Triplet { path: 0, clock: 0, store: 0 })
}

/// The "upper" bound's triplet once it has no more (real or pretended)
/// structure left to offer: the first such read opens to `MAX_PATH + 1` (so
/// the loop treats the bound as unconstrained to the right); every read
/// after that is all-zero. Shared by `upper_triplet`'s past-the-end case and
/// by `make_triplex`'s "pretend upper is empty" branch, so both paths open
/// the same `(lp+1, MAX_PATH)` window instead of one of them reading a
/// spurious zero ceiling.
fn padded_empty_triplet(first_pad: &mut bool) -> Triplet {
    if *first_pad {
        *first_pad = false;
        Triplet { path: MAX_PATH + 1, clock: 0, store: 0 }
    } else {
        Triplet { path: 0, clock: 0, store: 0 }
    }
}

/// Reads the `i`-th triplet of `id` as an "upper" bound: past the end, pads
/// via [`padded_empty_triplet`].
fn upper_triplet(id: &Identifier, i: usize, first_pad: &mut bool) -> Triplet {
    match id.triplet_at(i) {
        Some(t) => {
            *first_pad = true;
            t
        }
        None => padded_empty_triplet(first_pad),
    }
}

/// Generates a single identifier strictly between `lower` (exclusive, empty
/// meaning "before everything") and `upper` (exclusive, empty meaning
/// "after everything"). Assumes `lower < upper`.
pub fn make_triplex(version: u64, store_id: u32, lower: &Identifier, upper: &Identifier) -> Identifier {
    let mut out = Identifier::empty();
    // Tracks whether `upper`'s *next* missing triplet should open to
    // MAX_PATH+1 (still bounded "from here on") or to 0 (fully open, once
    // we've started treating `upper` as empty after an adjacent-triplet
    // split).
    let mut upper_first_pad = true;
    let mut upper_is_empty = upper.is_empty();

    let mut i = 0usize;
    loop {
        let lower_exhausted = i >= lower.triplet_count();
        let upper_exhausted = upper_is_empty || i >= upper.triplet_count();
        if lower_exhausted && upper_exhausted {
            // Both inputs are spent and every triplet so far matched
            // exactly: there is no more structure to share, so open a
            // brand new triplet in the (1, MAX_PATH) window.
            let np = random_path(1, MAX_PATH);
            out.push_triplet(np, version, store_id);
            return out;
        }

        let lo = lower_triplet(lower, i);
        let up = if upper_is_empty {
            padded_empty_triplet(&mut upper_first_pad)
        } else {
            upper_triplet(upper, i, &mut upper_first_pad)
        };

        if lo == up {
            out.push_triplet(lo.path, lo.clock, lo.store);
            i += 1;
            continue;
        }

        if up.path.wrapping_sub(lo.path) > 1 {
            let np = random_path(lo.path + 1, up.path - 1);
            out.push_triplet(np, version, store_id);
            return out;
        }

        // Paths are adjacent or equal but the tail differs: keep the
        // lower triplet and, from here on, search for free space to the
        // right of it as if `upper` were unbounded.
        out.push_triplet(lo.path, lo.clock, lo.store);
        upper_is_empty = true;
        i += 1;
    }
}

/// Generates `n` identifiers strictly between `lower` and `upper`, each
/// strictly greater than the last, by chaining single calls to
/// [`make_triplex`] (each result becomes the new `lower`).
pub fn make_triplex_many(
    n: usize,
    version: u64,
    store_id: u32,
    lower: &Identifier,
    upper: &Identifier,
) -> Vec<Identifier> {
    let mut out = Vec::with_capacity(n);
    let mut cur_lower = lower.clone();
    for _ in 0..n {
        let id = make_triplex(version, store_id, &cur_lower, upper);
        cur_lower = id.clone();
        out.push(id);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplex_sorts_by_version_then_store() {
        let a = make_duplex(1, 5);
        let b = make_duplex(1, 6);
        let c = make_duplex(2, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn triplex_between_empty_bounds_has_one_triplet() {
        let empty = Identifier::empty();
        let id = make_triplex(1, 1, &empty, &empty);
        assert_eq!(id.triplet_count(), 1);
        assert!(id > empty);
    }

    #[test]
    fn triplex_is_strictly_between_bounds() {
        let empty = Identifier::empty();
        let lower = make_triplex(1, 1, &empty, &empty);
        let upper = make_triplex(2, 1, &lower, &empty);
        assert!(lower < upper);
        let mid = make_triplex(3, 1, &lower, &upper);
        assert!(lower < mid);
        assert!(mid < upper);
    }

    #[test]
    fn repeated_appends_against_an_empty_upper_bound_do_not_panic() {
        // Mirrors a run of `push`es: each new id's lower bound is the
        // previous id and its upper bound is empty ("after everything").
        let empty = Identifier::empty();
        let mut lower = make_triplex(1, 1, &empty, &empty);
        for v in 2..50 {
            let next = make_triplex(v, 1, &lower, &empty);
            assert!(lower < next);
            lower = next;
        }
    }

    #[test]
    fn triplex_many_is_strictly_increasing() {
        let empty = Identifier::empty();
        let ids = make_triplex_many(20, 1, 1, &empty, &empty);
        for w in ids.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn triplex_many_stays_within_tight_bounds() {
        let empty = Identifier::empty();
        let lower = make_triplex(1, 1, &empty, &empty);
        let upper = make_triplex(2, 1, &lower, &empty);
        let ids = make_triplex_many(8, 3, 1, &lower, &upper);
        assert_eq!(ids.len(), 8);
        for w in ids.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert!(lower < *ids.first().unwrap());
        assert!(*ids.last().unwrap() < upper);
    }

    #[test]
    fn tie_break_is_by_store_id_at_equal_path_and_clock() {
        // Two peers racing to insert at the same point with the same clock:
        // the lower storeId sorts first.
        let empty = Identifier::empty();
        let id_a = make_triplex(1, 1, &empty, &empty);
        let id_b = make_triplex(1, 2, &empty, &empty);
        // Not guaranteed equal paths in general (random), but if a path
        // collision happens the store id is what breaks the tie; exercise
        // the reader functions directly instead.
        assert_eq!(id_a.store_at(0), Some(1));
        assert_eq!(id_b.store_at(0), Some(2));
    }
}
