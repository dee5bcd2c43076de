//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The retransmission engine: bounded, exponentially-backed-off
//! resends of route requests and updates, with filter-aware suppression.
//!
//! The event loop (an external collaborator) is responsible for calling
//! [`ResendTable::do_resend`]/[`ResendTable::expire_resend`] when a kind's
//! deadline elapses; this module never sleeps or spawns anything of its
//! own.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::collaborator::{FilterGate, Sender};
use crate::datum::Datum;
use crate::debug::Debug;

const DELAY_CAP_MS: u32 = 0xFFFF;

/// Which of the two retransmission kinds an entry belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    Request,
    Update,
}

/// A Babel sequence number. Wraps at 16 bits; ordering is circular (RFC
/// 1982), not a plain integer comparison, since a wrapped seqno must still
/// compare as newer than the one it wrapped past.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Seqno(pub u16);

impl Seqno {
    pub fn cmp_circular(self, other: Seqno) -> Ordering {
        let diff = other.0.wrapping_sub(self.0);
        if diff == 0 {
            Ordering::Equal
        } else if diff & 0x8000 != 0 {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }
}

/// A scheduled retransmission. Identity is (kind, Datum); the kind is
/// implied by which of [`ResendTable`]'s two maps holds the entry.
#[derive(Clone, Debug)]
pub struct Entry {
    pub seqno: Seqno,
    pub id: Option<[u8; 8]>,
    pub interface: Option<u32>,
    pub time: Instant,
    pub delay_ms: u32,
    pub retries: u8,
    /// Set by [`ResendTable::satisfy_request`]; forces expiry on the next
    /// sweep without rewinding `time`, which `Instant` can't safely do.
    satisfied: bool,
}

impl Entry {
    fn expired(&self, kind: Kind, now: Instant, request_timeout: Duration) -> bool {
        if self.satisfied {
            return true;
        }
        match kind {
            Kind::Request => now.duration_since(self.time) >= request_timeout,
            Kind::Update => self.retries == 0,
        }
    }
}

/// The pair of per-kind pending-retransmission sets, plus each kind's
/// next-fire deadline.
pub struct ResendTable {
    requests: HashMap<Datum, Entry>,
    updates: HashMap<Datum, Entry>,
    request_deadline: Option<Instant>,
    update_deadline: Option<Instant>,
    resend_max: u8,
    request_timeout: Duration,
}

impl ResendTable {
    pub fn new(resend_max: u8, request_timeout: Duration) -> ResendTable {
        ResendTable {
            requests: HashMap::new(),
            updates: HashMap::new(),
            request_deadline: None,
            update_deadline: None,
            resend_max,
            request_timeout,
        }
    }

    fn table(&self, kind: Kind) -> &HashMap<Datum, Entry> {
        match kind {
            Kind::Request => &self.requests,
            Kind::Update => &self.updates,
        }
    }

    fn table_mut(&mut self, kind: Kind) -> &mut HashMap<Datum, Entry> {
        match kind {
            Kind::Request => &mut self.requests,
            Kind::Update => &mut self.updates,
        }
    }

    fn deadline_mut(&mut self, kind: Kind) -> &mut Option<Instant> {
        match kind {
            Kind::Request => &mut self.request_deadline,
            Kind::Update => &mut self.update_deadline,
        }
    }

    /// The earliest time `do_resend(kind)` should next be called, if any
    /// live entry has a pending delay.
    pub fn deadline(&self, kind: Kind) -> Option<Instant> {
        match kind {
            Kind::Request => self.request_deadline,
            Kind::Update => self.update_deadline,
        }
    }

    pub fn find_request(&self, datum: &Datum) -> Option<&Entry> {
        self.requests.get(datum)
    }

    /// Records a pending retransmission, or refreshes an existing one.
    /// Suppressed entirely (no-op, returns `false`) if the relevant filter
    /// already drops the Datum.
    pub fn record<F: FilterGate>(
        &mut self,
        gate: &F,
        kind: Kind,
        datum: Datum,
        seqno: Seqno,
        id: Option<[u8; 8]>,
        interface: Option<u32>,
        delay_ms: u32,
        now: Instant,
    ) -> bool {
        let filtered = match kind {
            Kind::Request => gate.input_filtered(&datum, interface),
            Kind::Update => gate.output_filtered(&datum, interface),
        };
        if filtered {
            return false;
        }

        let delay_ms = delay_ms.min(DELAY_CAP_MS);
        let resend_max = self.resend_max;
        let table = self.table_mut(kind);
        match table.get_mut(&datum) {
            Some(entry) => {
                if let Some(id) = id {
                    if entry.id == Some(id) && seqno.cmp_circular(entry.seqno) == Ordering::Less {
                        return false;
                    }
                }
                entry.delay_ms = match (entry.delay_ms, delay_ms) {
                    (0, d) => d,
                    (e, 0) => e,
                    (e, d) => e.min(d),
                };
                entry.time = now;
                entry.retries = resend_max;
                entry.satisfied = false;
                entry.id = id;
                entry.seqno = seqno;
                if entry.interface != interface {
                    entry.interface = None;
                }
            }
            None => {
                table.insert(
                    datum,
                    Entry {
                        seqno,
                        id,
                        interface,
                        time: now,
                        delay_ms,
                        retries: resend_max,
                        satisfied: false,
                    },
                );
            }
        }

        let entry = &self.table(kind)[&datum];
        let entry_delay_ms = entry.delay_ms;
        let entry_time = entry.time;
        if entry_delay_ms > 0 {
            let deadline = entry_time + Duration::from_millis(u64::from(entry_delay_ms));
            let slot = self.deadline_mut(kind);
            *slot = Some(slot.map_or(deadline, |d| d.min(deadline)));
        }
        Debug::ResendRecord(kind, &datum, entry_delay_ms as u16).log();
        true
    }

    /// True if a REQUEST for `datum` is outstanding and the given (id,
    /// seqno) pair wouldn't satisfy it (i.e. a fresh request should still
    /// be sent for it).
    pub fn unsatisfied_request(
        &self,
        datum: &Datum,
        seqno: Seqno,
        id: [u8; 8],
        now: Instant,
    ) -> bool {
        let Some(request) = self.requests.get(datum) else {
            return false;
        };
        if request.expired(Kind::Request, now, self.request_timeout) {
            return false;
        }
        request.id != Some(id) || request.seqno.cmp_circular(seqno) != Ordering::Greater
    }

    /// Whether an inbound REQUEST for `datum` received on `interface`
    /// should be forwarded, given our own outstanding request for it.
    pub fn request_redundant(
        &self,
        datum: &Datum,
        interface: Option<u32>,
        seqno: Seqno,
        id: [u8; 8],
        hello_interval: Duration,
        now: Instant,
    ) -> bool {
        let Some(request) = self.requests.get(datum) else {
            return false;
        };
        if request.expired(Kind::Request, now, self.request_timeout) {
            return false;
        }
        if request.id == Some(id) && request.seqno.cmp_circular(seqno) == Ordering::Greater {
            return false;
        }
        if let Some(req_if) = request.interface {
            if Some(req_if) != interface {
                return false;
            }
        }
        if request.retries > 0 {
            return true;
        }
        now.duration_since(request.time) < hello_interval.min(Duration::from_secs(1))
    }

    /// Marks the outstanding REQUEST for `datum` as satisfied by an
    /// incoming update with the given (id, seqno), if it actually is.
    /// Satisfied requests are reaped on the next [`Self::expire_resend`]
    /// pass rather than removed immediately, avoiding a mutation of the
    /// map while some other iteration over it might be in progress.
    pub fn satisfy_request(
        &mut self,
        datum: &Datum,
        interface: Option<u32>,
        seqno: Seqno,
        id: [u8; 8],
    ) -> bool {
        let Some(request) = self.requests.get_mut(datum) else {
            return false;
        };
        if let Some(if_) = interface {
            if request.interface != Some(if_) {
                return false;
            }
        }
        if request.id == Some(id) && request.seqno.cmp_circular(seqno) == Ordering::Greater {
            return false;
        }
        request.retries = 0;
        request.satisfied = true;
        self.recompute_deadline(Kind::Request);
        true
    }

    /// Fires every entry of `kind` whose delay has elapsed, doubling its
    /// delay (capped at 0xFFFF ms) and decrementing its retry budget, then
    /// sweeps expired entries and recomputes the kind's deadline.
    pub fn do_resend<S: Sender>(&mut self, sender: &S, kind: Kind, now: Instant) {
        let request_timeout = self.request_timeout;
        let table = self.table_mut(kind);
        let mut expired = Vec::new();
        for (datum, entry) in table.iter_mut() {
            if !entry.expired(kind, now, request_timeout) && entry.delay_ms > 0 && entry.retries > 0
            {
                let deadline = entry.time + Duration::from_millis(u64::from(entry.delay_ms));
                if now >= deadline {
                    match kind {
                        Kind::Request => sender.send_multicast_multihop_request(datum, 127),
                        Kind::Update => sender.send_update(datum),
                    }
                    Debug::ResendFire(kind, datum, entry.retries).log();
                    entry.delay_ms = entry.delay_ms.saturating_mul(2).min(DELAY_CAP_MS);
                    entry.retries -= 1;
                }
            }
            if entry.expired(kind, now, request_timeout) {
                expired.push(*datum);
            }
        }
        for datum in expired {
            self.table_mut(kind).remove(&datum);
            Debug::ResendExpire(kind, &datum).log();
        }
        self.recompute_deadline(kind);
    }

    /// Sweeps expired entries of both kinds and recomputes both deadlines.
    /// Called on a coarse timer independent of either kind's own deadline.
    pub fn expire_resend(&mut self, now: Instant) {
        for kind in [Kind::Request, Kind::Update] {
            let expired: Vec<Datum> = self
                .table(kind)
                .iter()
                .filter(|(_, entry)| entry.expired(kind, now, self.request_timeout))
                .map(|(datum, _)| *datum)
                .collect();
            for datum in &expired {
                self.table_mut(kind).remove(datum);
                Debug::ResendExpire(kind, datum).log();
            }
            if !expired.is_empty() {
                self.recompute_deadline(kind);
            }
        }
    }

    fn recompute_deadline(&mut self, kind: Kind) {
        let deadline = self
            .table(kind)
            .values()
            .filter(|e| e.delay_ms > 0 && e.retries > 0)
            .map(|e| e.time + Duration::from_millis(u64::from(e.delay_ms)))
            .min();
        *self.deadline_mut(kind) = deadline;
    }
}
