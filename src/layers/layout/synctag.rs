//! Sync-tag wraparound arithmetic (§4.8, §8 Property 6), used by rainX
//! recovery to order dirty-zone resync generations across a 32-bit wrap.

/// A generation tag for one dirty zone's resync state. `Blank` sorts below
/// every valid tag (a zone never synced); `Max` sorts above every valid tag
/// (used to force an unconditional resync). `Valid` tags wrap modulo 2^32.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncTag {
    Blank,
    Valid(u32),
    Max,
}

/// Width of the grey zone, in tag units, around the wraparound point where
/// two valid tags are deliberately not comparable. Chosen well below
/// `u32::MAX / 2` so genuinely stale and genuinely current tags are never
/// mistaken for each other near the wrap.
pub const MAX_DIFF: u32 = 1 << 16;

const MODULUS: u64 = 1u64 << 32;

impl SyncTag {
    pub const BLANK: SyncTag = SyncTag::Blank;
    pub const ZERO: SyncTag = SyncTag::Valid(0);
    pub const LAST: SyncTag = SyncTag::Valid(u32::MAX);
    pub const MAX: SyncTag = SyncTag::Max;
}

fn forward_distance(from: u32, to: u32) -> u32 {
    (((to as u64) + MODULUS - (from as u64)) % MODULUS) as u32
}

/// `inc(BLANK) = ZERO`, `inc(LAST) = ZERO` (wraps), `inc(MAX) = MAX`.
pub fn inc(tag: SyncTag) -> SyncTag {
    match tag {
        SyncTag::Blank => SyncTag::ZERO,
        SyncTag::Max => SyncTag::Max,
        SyncTag::Valid(u32::MAX) => SyncTag::ZERO,
        SyncTag::Valid(x) => SyncTag::Valid(x + 1),
    }
}

/// Two tags are comparable if either is an extreme (`Blank`/`Max`), or both
/// are valid and their modular distance is within [`MAX_DIFF`].
pub fn comparable(a: SyncTag, b: SyncTag) -> bool {
    match (a, b) {
        (SyncTag::Valid(x), SyncTag::Valid(y)) => {
            let d = forward_distance(x, y).min(forward_distance(y, x));
            d <= MAX_DIFF
        }
        _ => true,
    }
}

/// `Some(true)` if `a` is strictly greater than `b`, `Some(false)` if
/// strictly less, `None` if equal or not [`comparable`]. Antisymmetric and
/// irreflexive by construction.
pub fn greater(a: SyncTag, b: SyncTag) -> Option<bool> {
    if !comparable(a, b) {
        return None;
    }
    match (a, b) {
        (SyncTag::Blank, SyncTag::Blank) | (SyncTag::Max, SyncTag::Max) => None,
        (SyncTag::Blank, _) => Some(false),
        (_, SyncTag::Blank) => Some(true),
        (SyncTag::Max, _) => Some(true),
        (_, SyncTag::Max) => Some(false),
        (SyncTag::Valid(x), SyncTag::Valid(y)) => {
            if x == y {
                return None;
            }
            Some(forward_distance(y, x) <= MAX_DIFF)
        }
    }
}
