//! 160-bit ring identifiers.
//!
//! An [`Id`] is an opaque 20-byte value, ordered as an unsigned big-endian
//! integer modulo 2^160 and compared circularly via [`Id::in_arc`]. The only
//! operations the core needs are equality, arc containment, and derivation
//! from arbitrary bytes via SHA-1 (spec §3).

use sha1::{Digest, Sha1};
use std::fmt;

pub const ID_LEN: usize = 20;

/// A 160-bit identifier on the Chord ring.
///
/// `Ord`/`PartialOrd` compare the underlying bytes lexicographically, which
/// is exactly big-endian unsigned integer comparison — the natural encoding
/// for a fixed-width byte array already gives us modulo-free ordering; the
/// *circular* comparison used for routing decisions lives in [`Id::in_arc`],
/// not in this derived `Ord`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; ID_LEN]);

impl Id {
    pub const ZERO: Id = Id([0u8; ID_LEN]);

    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Id(bytes)
    }

    /// Derives an identifier from arbitrary byte input via SHA-1 (spec §3,
    /// "Identifier (ID)").
    pub fn from_sha1(input: &[u8]) -> Self {
        let digest = Sha1::digest(input);
        let mut bytes = [0u8; ID_LEN];
        bytes.copy_from_slice(&digest);
        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Whether `self` lies in the half-open arc `(a, b]`, measured clockwise
    /// modulo 2^160 (spec §3, GLOSSARY "Arc").
    ///
    /// When `a == b` the arc degenerates to the entire ring — the only
    /// sensible reading for a single-node ring, where that one node is
    /// trivially responsible for every identifier.
    pub fn in_arc(&self, a: &Id, b: &Id) -> bool {
        if a == b {
            return true;
        }
        if a < b {
            self > a && self <= b
        } else {
            self > a || self <= b
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(last_byte: u8) -> Id {
        let mut bytes = [0u8; ID_LEN];
        bytes[ID_LEN - 1] = last_byte;
        Id(bytes)
    }

    #[test]
    fn sha1_derivation_is_deterministic() {
        let a = Id::from_sha1(b"a.bin");
        let b = Id::from_sha1(b"a.bin");
        assert_eq!(a, b);
    }

    #[test]
    fn sha1_derivation_matches_known_vector() {
        // SHA-1("abc") = a9993e364706816aba3e25717850c26c9cd0d89
        let got = Id::from_sha1(b"abc");
        assert_eq!(got.to_string(), "a9993e364706816aba3e25717850c26c9cd0d89");
    }

    #[test]
    fn in_arc_normal_range() {
        let a = id(10);
        let b = id(20);
        assert!(id(15).in_arc(&a, &b));
        assert!(id(20).in_arc(&a, &b)); // inclusive upper bound
        assert!(!id(10).in_arc(&a, &b)); // exclusive lower bound
        assert!(!id(25).in_arc(&a, &b));
    }

    #[test]
    fn in_arc_wrapping_range() {
        let a = id(250);
        let b = id(5);
        assert!(id(255).in_arc(&a, &b));
        assert!(id(0).in_arc(&a, &b));
        assert!(id(5).in_arc(&a, &b));
        assert!(!id(6).in_arc(&a, &b));
        assert!(!id(250).in_arc(&a, &b));
    }

    #[test]
    fn in_arc_degenerate_single_node_ring_owns_everything() {
        let a = id(42);
        assert!(id(0).in_arc(&a, &a));
        assert!(id(255).in_arc(&a, &a));
    }

    #[test]
    fn locality_partitions_the_ring() {
        // Three nodes at 10, 20, 30 (wrapping ring of one byte for brevity).
        // Every identifier must be owned by exactly one node's arc
        // (predecessor, self].
        let nodes = [id(10), id(20), id(30)];
        for x in 0..=255u8 {
            let x = id(x);
            let mut owners = 0;
            for i in 0..nodes.len() {
                let pred = nodes[(i + nodes.len() - 1) % nodes.len()];
                if x.in_arc(&pred, &nodes[i]) {
                    owners += 1;
                }
            }
            assert_eq!(owners, 1, "id {x:?} owned by {owners} nodes, expected 1");
        }
    }
}
