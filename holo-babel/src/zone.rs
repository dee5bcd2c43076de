//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::datum::Datum;
use crate::prefix::{prefix_cmp, PrefixCmp};

/// A zone is the (destination, source) intersection of two routing keys.
///
/// Structurally identical to a [`Datum`] (same four fields), but kept as a
/// distinct name since a zone is always the *result* of intersecting two
/// data, never a route's own key.
pub type Zone = Datum;

/// Returns true if `rt` and `rt1` disagree on specificity in a way that
/// requires a completion route at their intersection: one is more specific
/// on destination and less specific on source than the other (or vice
/// versa). Disjoint or destination-equal pairs never conflict.
pub fn conflicts(rt: &Datum, rt1: &Datum) -> bool {
    let dst_st = prefix_cmp(&rt.dst, &rt1.dst);
    if matches!(dst_st, PrefixCmp::Disjoint | PrefixCmp::Equal) {
        return false;
    }
    let src_st = prefix_cmp(&rt.src, &rt1.src);
    matches!(
        (dst_st, src_st),
        (PrefixCmp::LessSpecific, PrefixCmp::MoreSpecific)
            | (PrefixCmp::MoreSpecific, PrefixCmp::LessSpecific)
    )
}

/// Computes `rt` ∩ `rt1`: the narrower prefix on each axis. Returns `None`
/// when destination or source prefixes are disjoint.
pub fn intersect(rt: &Datum, rt1: &Datum) -> Option<Zone> {
    let dst_st = prefix_cmp(&rt.dst, &rt1.dst);
    if dst_st == PrefixCmp::Disjoint {
        return None;
    }
    let src_st = prefix_cmp(&rt.src, &rt1.src);
    if src_st == PrefixCmp::Disjoint {
        return None;
    }
    let dst = if matches!(dst_st, PrefixCmp::MoreSpecific | PrefixCmp::Equal) {
        rt.dst
    } else {
        rt1.dst
    };
    let src = if matches!(src_st, PrefixCmp::MoreSpecific | PrefixCmp::Equal) {
        rt.src
    } else {
        rt1.src
    };
    Some(Zone::new(dst, src))
}

/// A zone equals another iff all four fields match exactly.
pub fn zone_equal(z1: &Zone, z2: &Zone) -> bool {
    z1 == z2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::Prefix;

    fn v6(b0: u8, b1: u8, len: u8) -> Prefix {
        let mut octets = [0u8; 16];
        octets[0] = b0;
        octets[1] = b1;
        Prefix::new(octets, len)
    }

    #[test]
    fn disjoint_destinations_never_conflict() {
        let a = Datum::new(v6(0x20, 0x01, 32), v6(0x30, 0x00, 32));
        let b = Datum::new(v6(0x20, 0x02, 32), v6(0x30, 0x00, 32));
        assert!(!conflicts(&a, &b));
        assert!(intersect(&a, &b).is_none());
    }

    #[test]
    fn classic_source_specific_conflict() {
        // dst a is more specific than dst b, but src a is less specific
        // than src b: the classic conflicting pair.
        let a = Datum::new(v6(0x20, 0x01, 64), v6(0x30, 0x00, 32));
        let b = Datum::new(v6(0x20, 0x01, 48), v6(0x30, 0x00, 48));
        assert!(conflicts(&a, &b));
        let zone = intersect(&a, &b).unwrap();
        assert_eq!(zone.dst, a.dst);
        assert_eq!(zone.src, b.src);
    }

    #[test]
    fn identical_data_never_conflict() {
        let a = Datum::new(v6(0x20, 0x01, 64), v6(0x30, 0x00, 48));
        assert!(!conflicts(&a, &a));
    }

    #[test]
    fn zone_equal_requires_all_four_fields() {
        let z1 = Zone::new(v6(1, 0, 32), v6(2, 0, 32));
        let z2 = Zone::new(v6(1, 0, 32), v6(2, 0, 32));
        let z3 = Zone::new(v6(1, 0, 32), v6(3, 0, 32));
        assert!(zone_equal(&z1, &z2));
        assert!(!zone_equal(&z1, &z3));
    }
}
