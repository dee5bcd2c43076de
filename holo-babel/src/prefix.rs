//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv6Addr};

use serde::{Deserialize, Serialize};

// The v4-mapped embedding used to carry IPv4 prefixes inside the 128-bit
// address space, per RFC 4291 Section 2.5.5.2.
const V4_MAPPED_PREFIX: [u8; 12] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff,
];

/// An IPv6 (or v4-mapped IPv4) prefix: 16 octets plus a length in 0..=128.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
#[derive(Deserialize, Serialize)]
pub struct Prefix {
    octets: [u8; 16],
    len: u8,
}

/// Result of comparing two prefixes. Total over any pair of lengths.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrefixCmp {
    Equal,
    Disjoint,
    MoreSpecific,
    LessSpecific,
}

// ===== impl Prefix =====

impl Prefix {
    pub const MAX_LEN: u8 = 128;

    /// Builds a prefix from raw octets and a length, zeroing any bits beyond
    /// `len` so the invariant in the data model ("bits beyond the declared
    /// length are zero") always holds.
    pub fn new(mut octets: [u8; 16], len: u8) -> Prefix {
        assert!(len <= Self::MAX_LEN, "prefix length out of range");
        normalize(&mut octets, len);
        Prefix { octets, len }
    }

    pub fn default_prefix() -> Prefix {
        Prefix { octets: [0; 16], len: 0 }
    }

    pub fn host(addr: Ipv6Addr) -> Prefix {
        Prefix::new(addr.octets(), Self::MAX_LEN)
    }

    pub fn from_v4_mapped(addr: [u8; 4], len: u8) -> Prefix {
        let mut octets = [0u8; 16];
        octets[..12].copy_from_slice(&V4_MAPPED_PREFIX);
        octets[12..].copy_from_slice(&addr);
        Prefix::new(octets, 96 + len)
    }

    pub fn octets(&self) -> &[u8; 16] {
        &self.octets
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_v4_mapped(&self) -> bool {
        self.octets[..12] == V4_MAPPED_PREFIX
    }

    /// True for `::/0` and for the v4-mapped default `::ffff:0:0/96`.
    pub fn is_default(&self) -> bool {
        self.len == 0 || (self.len == 96 && self.is_v4_mapped())
    }

    /// Loopback, multicast, unspecified or v4-mapped-equivalents thereof:
    /// never a legitimate redistribution candidate.
    pub fn is_martian(&self) -> bool {
        if self.is_v4_mapped() {
            let v4 = [
                self.octets[12],
                self.octets[13],
                self.octets[14],
                self.octets[15],
            ];
            let addr = std::net::Ipv4Addr::from(v4);
            return addr.is_loopback()
                || addr.is_multicast()
                || addr.is_unspecified()
                || addr.is_broadcast();
        }
        let addr = Ipv6Addr::from(self.octets);
        addr.is_loopback() || addr.is_multicast() || addr.is_unspecified()
    }

    pub fn addr(&self) -> IpAddr {
        if self.is_v4_mapped() {
            IpAddr::V4(std::net::Ipv4Addr::new(
                self.octets[12],
                self.octets[13],
                self.octets[14],
                self.octets[15],
            ))
        } else {
            IpAddr::V6(Ipv6Addr::from(self.octets))
        }
    }
}

impl std::fmt::Debug for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", Ipv6Addr::from(self.octets), self.len)
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

fn normalize(octets: &mut [u8; 16], len: u8) {
    let len = len as usize;
    let full_bytes = len / 8;
    let rem_bits = len % 8;
    if rem_bits != 0 {
        let mask = 0xffu8 << (8 - rem_bits);
        octets[full_bytes] &= mask;
    }
    for byte in octets.iter_mut().skip(full_bytes + usize::from(rem_bits != 0))
    {
        *byte = 0;
    }
}

// ===== global functions =====

/// Compares two prefixes by their common prefix length `k = min(l1, l2)`.
///
/// Pure and total: for any two prefixes of any lengths this returns exactly
/// one of the four [`PrefixCmp`] values.
pub fn prefix_cmp(p1: &Prefix, p2: &Prefix) -> PrefixCmp {
    let k = p1.len.min(p2.len);
    if !common_bits_equal(&p1.octets, &p2.octets, k) {
        return PrefixCmp::Disjoint;
    }
    match p1.len.cmp(&p2.len) {
        std::cmp::Ordering::Equal => PrefixCmp::Equal,
        std::cmp::Ordering::Greater => PrefixCmp::MoreSpecific,
        std::cmp::Ordering::Less => PrefixCmp::LessSpecific,
    }
}

fn common_bits_equal(a: &[u8; 16], b: &[u8; 16], bits: u8) -> bool {
    let bits = bits as usize;
    let full_bytes = bits / 8;
    let rem_bits = bits % 8;
    if a[..full_bytes] != b[..full_bytes] {
        return false;
    }
    if rem_bits != 0 {
        let mask = 0xffu8 << (8 - rem_bits);
        if (a[full_bytes] & mask) != (b[full_bytes] & mask) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pfx(octets: [u8; 16], len: u8) -> Prefix {
        Prefix::new(octets, len)
    }

    #[test]
    fn equal_same_length_same_bits() {
        let a = pfx([0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 32);
        let b = pfx([0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 32);
        assert_eq!(prefix_cmp(&a, &b), PrefixCmp::Equal);
    }

    #[test]
    fn equal_same_length_disjoint_bits() {
        let a = pfx([0x20, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 32);
        let b = pfx([0x20, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 32);
        assert_eq!(prefix_cmp(&a, &b), PrefixCmp::Disjoint);
    }

    #[test]
    fn more_and_less_specific_are_symmetric_inverses() {
        let narrow =
            pfx([0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 48);
        let wide =
            pfx([0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 32);
        assert_eq!(prefix_cmp(&narrow, &wide), PrefixCmp::MoreSpecific);
        assert_eq!(prefix_cmp(&wide, &narrow), PrefixCmp::LessSpecific);
    }

    #[test]
    fn disjoint_when_common_bits_differ() {
        let narrow =
            pfx([0x20, 0x01, 0x0d, 0xb9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 48);
        let wide =
            pfx([0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 32);
        assert_eq!(prefix_cmp(&narrow, &wide), PrefixCmp::Disjoint);
    }

    #[test]
    fn zero_bits_beyond_length_are_normalized() {
        let p = pfx([0xff; 16], 4);
        assert_eq!(p.octets()[0], 0xf0);
        assert_eq!(p.octets()[1], 0);
    }

    #[test]
    fn default_prefix_is_default() {
        assert!(Prefix::default_prefix().is_default());
        assert!(Prefix::from_v4_mapped([0, 0, 0, 0], 0).is_default());
        assert!(!Prefix::from_v4_mapped([10, 0, 0, 0], 8).is_default());
    }

    #[test]
    fn totality_over_random_like_samples() {
        let samples: Vec<Prefix> = (0..20u8)
            .map(|i| {
                let mut octets = [0u8; 16];
                octets[0] = i;
                octets[1] = i.wrapping_mul(7);
                pfx(octets, (i % 9) * 8 + 4)
            })
            .collect();
        for a in &samples {
            for b in &samples {
                // Must return exactly one of the four variants (guaranteed by
                // the enum), and disjointness must be symmetric.
                let ab = prefix_cmp(a, b);
                let ba = prefix_cmp(b, a);
                if ab == PrefixCmp::Disjoint {
                    assert_eq!(ba, PrefixCmp::Disjoint);
                }
                if a.len() == b.len() {
                    assert!(matches!(
                        ab,
                        PrefixCmp::Equal | PrefixCmp::Disjoint
                    ));
                }
            }
        }
    }
}
