//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! External route (xroute) reconciliation: diffs the kernel's route table
//! against the set of externally-originated routes the daemon currently
//! redistributes, with incremental add/flush and update emission.
//!
//! Flush decisions are collected into a list before any route is actually
//! flushed, rather than mutating the table mid-scan. Removing an entry
//! while iterating it risks skipping or revisiting a neighbour depending on
//! how the underlying map reshuffles on removal, so the two phases are kept
//! separate.

use std::collections::HashMap;
use std::time::Instant;

use crate::collaborator::{
    FilterGate, KernelDump, KernelRoute, RedistributeFilter, RouteSelection, RouteTable,
};
use crate::datum::Datum;
use crate::debug::Debug;
use crate::error::Error;
use crate::resend::{Kind, ResendTable, Seqno};

/// Initial kernel-dump buffer size; grown geometrically on overflow and
/// retuned after every successful call, sizing the *next* call's buffer
/// from the *current* result rather than always starting from scratch.
pub const INITIAL_MAXROUTES: usize = 8;
const MAXMAXROUTES: usize = 16 * 1024;

/// A redistributed route: Datum plus the bookkeeping needed to recognise it
/// again in a later kernel snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Xroute {
    pub datum: Datum,
    pub metric: u16,
    pub ifindex: u32,
    pub proto: u8,
}

/// Outcome of [`XrouteTable::add_xroute`], driving what the caller notifies
/// local subscribers and the resend engine of.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    /// An existing entry already had an equal-or-better metric; no change.
    Unchanged,
    /// The Datum's metric improved; the entry was updated in place.
    Changed,
    /// No prior entry existed for the Datum.
    Added,
}

/// The set of externally-redistributed routes, keyed by Datum (at most one
/// xroute per Datum).
pub struct XrouteTable {
    routes: HashMap<Datum, Xroute>,
    maxroutes: usize,
}

impl Default for XrouteTable {
    fn default() -> XrouteTable {
        XrouteTable {
            routes: HashMap::new(),
            maxroutes: INITIAL_MAXROUTES,
        }
    }
}

impl XrouteTable {
    pub fn find_xroute(&self, datum: &Datum) -> Option<&Xroute> {
        self.routes.get(datum)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Inserts or updates the xroute for `datum`. A lower metric always
    /// wins; an incoming metric that's no better than the existing one is a
    /// no-op.
    pub fn add_xroute(
        &mut self,
        datum: Datum,
        metric: u16,
        ifindex: u32,
        proto: u8,
    ) -> AddOutcome {
        match self.routes.get_mut(&datum) {
            Some(existing) => {
                if existing.metric <= metric {
                    return AddOutcome::Unchanged;
                }
                existing.metric = metric;
                existing.ifindex = ifindex;
                existing.proto = proto;
                AddOutcome::Changed
            }
            None => {
                self.routes.insert(
                    datum,
                    Xroute { datum, metric, ifindex, proto },
                );
                AddOutcome::Added
            }
        }
    }

    pub fn flush_xroute(&mut self, datum: &Datum) -> Option<Xroute> {
        self.routes.remove(datum)
    }
}

/// Reads the kernel's current route set into `buf`, growing the buffer
/// geometrically on overflow up to [`MAXMAXROUTES`].
fn read_snapshot<D: KernelDump>(
    dump: &D,
    starting_maxroutes: usize,
) -> Result<Vec<KernelRoute>, Error> {
    let mut maxroutes = starting_maxroutes.max(1);
    loop {
        let mut buf = Vec::with_capacity(maxroutes);
        let total = dump.kernel_dump(&mut buf);
        if total <= maxroutes {
            return Ok(buf);
        }
        if maxroutes >= MAXMAXROUTES {
            return Err(Error::XrouteSnapshotTooLarge {
                requested: total,
                cap: MAXMAXROUTES,
            });
        }
        maxroutes = MAXMAXROUTES.min(2 * maxroutes);
    }
}

/// Runs one reconciliation pass: flushes xroutes the kernel no longer
/// backs, and redistributes kernel routes that now pass the filter.
/// Returns whether anything changed.
pub fn check_xroutes<T, S, F, D, N>(
    routes: &T,
    selector: &S,
    filter: &F,
    dump: &D,
    sender: &N,
    xroutes: &mut XrouteTable,
    resend: &mut ResendTable,
    allow_duplicate_xroutes: Option<u16>,
    send_updates: bool,
    now: Instant,
) -> Result<bool, Error>
where
    T: RouteTable,
    S: RouteSelection,
    F: RedistributeFilter + FilterGate,
    D: KernelDump,
    N: crate::collaborator::Sender,
{
    let mut snapshot = read_snapshot(dump, xroutes.maxroutes)?;
    snapshot.retain(|r| !r.datum.dst.is_martian() && !r.datum.src.is_martian());
    for route in &mut snapshot {
        if route.proto == RTPROT_BABEL_LOCAL {
            continue;
        }
        if let Some(src) = filter.rewrite_source(&route.datum, route.ifindex, route.proto) {
            route.datum.src = src;
        }
    }

    Debug::XrouteCheckStart(snapshot.len(), xroutes.maxroutes).log();

    let mut change = false;

    let to_flush: Vec<Xroute> = xroutes
        .routes
        .values()
        .copied()
        .filter(|xr| !still_exported(xr, filter, &snapshot))
        .collect();

    for xr in to_flush {
        xroutes.flush_xroute(&xr.datum);
        Debug::XrouteFlush(&xr.datum).log();
        if let Some(best) = selector.find_best_route(&xr.datum) {
            selector.install_route(best.as_ref());
        }
        if send_updates {
            resend.record(filter, Kind::Update, xr.datum, Seqno(0), None, None, 0, now);
        }
        change = true;
    }

    for route in &snapshot {
        let Some(metric) = filter.redistribute_metric(&route.datum, route.ifindex, route.proto)
        else {
            continue;
        };
        let outcome = xroutes.add_xroute(route.datum, metric, route.ifindex, route.proto);
        if outcome == AddOutcome::Added {
            if let Some(installed) = routes.find_installed_route(&route.datum) {
                let should_uninstall = allow_duplicate_xroutes
                    .is_none_or(|threshold| metric < threshold);
                if should_uninstall {
                    selector.uninstall_route(installed);
                }
            }
        }
        if outcome != AddOutcome::Unchanged {
            change = true;
            Debug::XrouteAdd(&route.datum, metric).log();
            if send_updates {
                sender.send_update(&route.datum);
            }
        }
    }

    xroutes.maxroutes = MAXMAXROUTES.min(snapshot.len() + 8);
    Ok(change)
}

/// A kernel route still backs `xr` if the filter still assigns it the same
/// metric and some route in the snapshot still carries its exact identity.
fn still_exported<F: RedistributeFilter>(
    xr: &Xroute,
    filter: &F,
    snapshot: &[KernelRoute],
) -> bool {
    let Some(metric) = filter.redistribute_metric(&xr.datum, xr.ifindex, xr.proto) else {
        return false;
    };
    if metric != xr.metric {
        return false;
    }
    snapshot
        .iter()
        .any(|r| r.datum == xr.datum && r.ifindex == xr.ifindex && r.proto == xr.proto)
}

/// Protocol tag distinguishing a local interface-address host route from an
/// ordinary kernel-redistributed one, so the two can be told apart in the
/// xroute table.
pub const RTPROT_BABEL_LOCAL: u8 = 42;
