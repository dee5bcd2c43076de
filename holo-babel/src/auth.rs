//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-neighbour authentication trailer: HMAC-SHA1 append/verify plus
//! (timestamp, packet-counter) replay protection.
//!
//! Both TLVs live in the trailer appended after the message body, per the
//! draft this was built against: `[12][20][digest]` for the MAC and
//! `[11][6][ts:u32][pc:u16]` for the replay counter. The MAC covers the
//! 4-byte packet header and the body only, never the trailer itself.

use std::collections::HashMap;
use std::net::IpAddr;

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::debug::Debug;
use crate::error::Error;

pub const HMAC_TYPE: u8 = 12;
pub const TSPC_TYPE: u8 = 11;
pub const DIGEST_LEN: usize = 20;
pub const SHA1_BLOCK_SIZE: usize = 64;
pub const MESSAGE_PAD1: u8 = 0;

type HmacSha1 = Hmac<Sha1>;

/// Per-(neighbour, interface) authentication replay state: the highest
/// (timestamp, packet-counter) pair accepted so far.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Anm {
    pub last_ts: u32,
    pub last_pc: u16,
}

impl Anm {
    /// Lexicographic (ts, pc) ordering, strict.
    fn accepts(&self, ts: u32, pc: u16) -> bool {
        (ts, pc) > (self.last_ts, self.last_pc)
    }
}

/// The process-wide table of per-neighbour replay state.
#[derive(Default)]
pub struct AnmTable(HashMap<(IpAddr, u32), Anm>);

impl AnmTable {
    pub fn find(&self, addr: IpAddr, ifindex: u32) -> Option<&Anm> {
        self.0.get(&(addr, ifindex))
    }

    fn entry(&mut self, addr: IpAddr, ifindex: u32) -> &mut Anm {
        self.0.entry((addr, ifindex)).or_default()
    }
}

/// Normalizes a key to the HMAC-SHA1 block size the way the reference
/// implementation does: hash it down with SHA1 if it's longer than one
/// block, leave it as-is otherwise (HMAC itself pads short keys).
fn normalize_key(key: &[u8]) -> Vec<u8> {
    if key.len() > SHA1_BLOCK_SIZE {
        use sha1::Digest;
        Sha1::digest(key).to_vec()
    } else {
        key.to_vec()
    }
}

fn digest(key: &[u8], src: IpAddr, dst: IpAddr, packet_header: &[u8; 4], body: &[u8]) -> [u8; DIGEST_LEN] {
    let key = normalize_key(key);
    let mut mac = HmacSha1::new_from_slice(&key).expect("HMAC accepts any key length");
    mac.update(&addr_octets(dst));
    mac.update(&addr_octets(src));
    mac.update(packet_header);
    mac.update(body);
    let out = mac.finalize().into_bytes();
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&out);
    digest
}

fn addr_octets(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V6(addr) => addr.octets(),
        IpAddr::V4(addr) => {
            let mut octets = [0u8; 16];
            octets[10] = 0xff;
            octets[11] = 0xff;
            octets[12..].copy_from_slice(&addr.octets());
            octets
        }
    }
}

/// Appends an HMAC TLV covering `packet_header` and `body` to `trailer`,
/// computed with `key`.
pub fn add_hmac(
    key: &[u8],
    src: IpAddr,
    dst: IpAddr,
    packet_header: &[u8; 4],
    body: &[u8],
    trailer: &mut Vec<u8>,
) {
    let mac = digest(key, src, dst, packet_header, body);
    trailer.push(HMAC_TYPE);
    trailer.push(DIGEST_LEN as u8);
    trailer.extend_from_slice(&mac);
}

/// Walks a Babel TLV stream, yielding `(type, payload)` for every TLV.
/// `Pad1` is yielded with an empty payload; all other TLVs with a
/// `len` that would run past the buffer end the walk early (truncated
/// stream).
fn tlvs(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    std::iter::from_fn(move || {
        if i >= data.len() {
            return None;
        }
        let ty = data[i];
        if ty == MESSAGE_PAD1 {
            i += 1;
            return Some((ty, &data[0..0]));
        }
        if i + 1 >= data.len() {
            return None;
        }
        let len = data[i + 1] as usize;
        if i + 2 + len > data.len() {
            return None;
        }
        let payload = &data[i + 2..i + 2 + len];
        i += 2 + len;
        Some((ty, payload))
    })
}

/// Verifies the trailer's HMAC TLV(s) against `keys`, accepting if any one
/// of them produces a matching digest over `packet_header` and `body`.
pub fn check_hmac(
    keys: &[Vec<u8>],
    src: IpAddr,
    dst: IpAddr,
    packet_header: &[u8; 4],
    body: &[u8],
    trailer: &[u8],
) -> Result<(), Error> {
    for (ty, payload) in tlvs(trailer) {
        if ty != HMAC_TYPE {
            continue;
        }
        if payload.len() != DIGEST_LEN {
            return Err(Error::AuthTruncatedDigest);
        }
        for key in keys {
            let expected = digest(key, src, dst, packet_header, body);
            if expected.as_slice() == payload {
                return Ok(());
            }
        }
    }
    Err(Error::AuthNoMatchingDigest)
}

/// Scans `body` for TSPC TLVs and enforces replay monotonicity against the
/// neighbour's ANM entry. Exactly one strictly-increasing TSPC accepts and
/// advances the ANM; zero TSPC TLVs accepts without updating (a legacy
/// peer that doesn't send them); more than one, or a non-increasing pair,
/// rejects.
pub fn check_tspc(
    anm: &mut AnmTable,
    neighbour: IpAddr,
    ifindex: u32,
    body: &[u8],
) -> Result<(), Error> {
    let mut found: Option<(u32, u16)> = None;
    let mut count = 0;
    for (ty, payload) in tlvs(body) {
        if ty != TSPC_TYPE {
            continue;
        }
        count += 1;
        if payload.len() != 6 {
            continue;
        }
        let ts = u32::from_be_bytes(payload[0..4].try_into().unwrap());
        let pc = u16::from_be_bytes(payload[4..6].try_into().unwrap());
        found = Some((ts, pc));
    }

    if count > 1 {
        Debug::AuthReject.log();
        return Err(Error::AuthMultipleTspc);
    }

    let Some((ts, pc)) = found else {
        // No TSPC TLV at all: accept without touching the ANM.
        return Ok(());
    };

    let state = anm.entry(neighbour, ifindex);
    if !state.accepts(ts, pc) {
        Debug::AuthReject.log();
        return Err(Error::AuthReplay);
    }
    state.last_ts = ts;
    state.last_pc = pc;
    Debug::AuthAccept(ts, pc).log();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn addr(tag: u8) -> IpAddr {
        let mut octets = [0u8; 16];
        octets[0] = tag;
        IpAddr::V6(Ipv6Addr::from(octets))
    }

    fn tspc_tlv(ts: u32, pc: u16) -> Vec<u8> {
        let mut tlv = vec![TSPC_TYPE, 6];
        tlv.extend_from_slice(&ts.to_be_bytes());
        tlv.extend_from_slice(&pc.to_be_bytes());
        tlv
    }

    #[test]
    fn hmac_round_trips_with_matching_key() {
        let key = b"Ala ma kota".to_vec();
        let src = addr(1);
        let dst = addr(2);
        let header = [1, 2, 3, 4];
        let body = b"babel body bytes";

        let mut trailer = Vec::new();
        add_hmac(&key, src, dst, &header, body, &mut trailer);

        assert!(check_hmac(&[key], src, dst, &header, body, &trailer).is_ok());
    }

    #[test]
    fn hmac_rejects_when_no_configured_key_matches() {
        let key = b"Ala ma kota".to_vec();
        let wrong_key = b"wrong key".to_vec();
        let src = addr(1);
        let dst = addr(2);
        let header = [1, 2, 3, 4];
        let body = b"babel body bytes";

        let mut trailer = Vec::new();
        add_hmac(&key, src, dst, &header, body, &mut trailer);

        assert!(check_hmac(&[wrong_key], src, dst, &header, body, &trailer).is_err());
    }

    #[test]
    fn hmac_rejects_truncated_digest() {
        let trailer = vec![HMAC_TYPE, DIGEST_LEN as u8, 1, 2, 3];
        let result = check_hmac(
            &[b"key".to_vec()],
            addr(1),
            addr(2),
            &[0; 4],
            b"body",
            &trailer,
        );
        assert!(matches!(result, Err(Error::AuthTruncatedDigest)));
    }

    #[test]
    fn tspc_replay_sequence() {
        let mut anm = AnmTable::default();
        let n = addr(9);

        assert!(check_tspc(&mut anm, n, 1, &tspc_tlv(100, 5)).is_ok());
        assert_eq!(anm.find(n, 1), Some(&Anm { last_ts: 100, last_pc: 5 }));

        assert!(matches!(
            check_tspc(&mut anm, n, 1, &tspc_tlv(100, 5)),
            Err(Error::AuthReplay)
        ));

        assert!(check_tspc(&mut anm, n, 1, &tspc_tlv(100, 6)).is_ok());

        assert!(matches!(
            check_tspc(&mut anm, n, 1, &tspc_tlv(99, 9999)),
            Err(Error::AuthReplay)
        ));

        let mut two_tlvs = tspc_tlv(200, 1);
        two_tlvs.extend(tspc_tlv(201, 1));
        assert!(matches!(
            check_tspc(&mut anm, n, 1, &two_tlvs),
            Err(Error::AuthMultipleTspc)
        ));
    }

    #[test]
    fn missing_tspc_is_accepted_without_updating_anm() {
        let mut anm = AnmTable::default();
        let n = addr(3);
        assert!(check_tspc(&mut anm, n, 1, b"no tlvs here").is_ok());
        assert!(anm.find(n, 1).is_none());
    }

    #[test]
    fn pad1_tlvs_are_skipped_while_scanning() {
        let mut anm = AnmTable::default();
        let n = addr(4);
        let mut body = vec![MESSAGE_PAD1, MESSAGE_PAD1];
        body.extend(tspc_tlv(1, 1));
        assert!(check_tspc(&mut anm, n, 1, &body).is_ok());
        assert_eq!(anm.find(n, 1), Some(&Anm { last_ts: 1, last_pc: 1 }));
    }
}
