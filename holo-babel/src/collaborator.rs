//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Traits implemented by the consumer binary: the neighbour table, the
//! kernel FIB, route selection and the Babel network transport. This crate
//! never talks to the kernel or the wire directly; it only decides what the
//! consumer should do next.

use crate::datum::Datum;
use crate::error::KernelError;
use crate::order::RouteDatum;
use crate::zone::Zone;

/// A neighbour-learned route as seen by the disambiguation and resend
/// engines. The consumer's route table entry implements this.
pub trait Route: RouteDatum {
    /// Kernel-facing next hop address.
    fn nexthop(&self) -> std::net::IpAddr;
    /// Outgoing interface index.
    fn ifindex(&self) -> u32;
    /// The route's Babel metric, already converted to a kernel-comparable
    /// cost.
    fn metric(&self) -> u32;
}

/// Kernel FIB mutation, keyed by (table, zone, nexthop/ifindex/metric).
/// Add/flush/modify/modify-metric are split into typed methods rather than
/// multiplexed through a single opcode parameter.
pub trait KernelInterface {
    /// True if the kernel can natively perform longest-match lookups keyed
    /// on (dst, src) pairs, i.e. no completion routes are needed.
    fn kernel_disambiguate(&self, v4: bool) -> bool;

    /// Resolves the routing table id that should hold routes for `zone`.
    fn find_table(&self, zone: &Zone) -> u32;

    fn kernel_route_add(
        &self,
        table: u32,
        zone: &Zone,
        route: &dyn Route,
    ) -> Result<(), KernelError>;

    fn kernel_route_flush(
        &self,
        table: u32,
        zone: &Zone,
        route: &dyn Route,
    ) -> Result<(), KernelError>;

    fn kernel_route_modify(
        &self,
        table: u32,
        zone: &Zone,
        old: &dyn Route,
        new: &dyn Route,
    ) -> Result<(), KernelError>;

    fn kernel_route_modify_metric(
        &self,
        table: u32,
        zone: &Zone,
        route: &dyn Route,
        old_metric: u32,
        new_metric: u32,
    ) -> Result<(), KernelError>;
}

/// A snapshot of one kernel-redistributed route, as returned by a
/// [`KernelDump`] call.
#[derive(Clone, Copy, Debug)]
pub struct KernelRoute {
    pub datum: Datum,
    pub metric: u16,
    pub ifindex: u32,
    /// The kernel's routing protocol tag for this route, e.g.
    /// `RTPROT_BABEL_LOCAL` (see `xroute.rs`) for a locally-addressed host
    /// route synthesised from an interface address rather than read from
    /// the kernel.
    pub proto: u8,
}

/// Bulk kernel route table read, used by the xroute engine to diff the
/// kernel's idea of externally-reachable prefixes against what's currently
/// redistributed.
pub trait KernelDump {
    /// Fills `buf` with up to `buf.len()` routes and returns the total
    /// number of routes the kernel currently holds (which may exceed
    /// `buf.len()`, signalling the caller to retry with a bigger buffer).
    fn kernel_dump(&self, buf: &mut Vec<KernelRoute>) -> usize;
}

/// Queries against the already-installed route table, used to decide
/// whether a completion route would duplicate an existing kernel entry.
pub trait RouteTable {
    type Route: Route;

    fn find_installed_route(&self, datum: &Datum) -> Option<&Self::Route>;

    /// Iterates every currently-installed route (`ROUTE_INSTALLED`).
    fn installed_routes(&self) -> Box<dyn Iterator<Item = &Self::Route> + '_>;

    /// Iterates every currently-installed source-specific route
    /// (`ROUTE_SS_INSTALLED`, i.e. `src` is not the default prefix).
    fn installed_ss_routes(&self) -> Box<dyn Iterator<Item = &Self::Route> + '_> {
        Box::new(
            self.installed_routes()
                .filter(|r| !r.datum().src.is_default()),
        )
    }
}

/// Per-neighbour transport used by the resend engine to actually emit
/// requests and updates; the wire encoding itself is out of scope.
pub trait Sender {
    fn send_multicast_multihop_request(&self, datum: &Datum, hop_count: u8);
    fn send_unicast_request(&self, neighbour: std::net::IpAddr, datum: &Datum);
    fn send_update(&self, datum: &Datum);
}

/// The route-selection metric gates (`input_filter`/`output_filter`) that
/// suppress a resend for a Datum already filtered to infinity.
pub trait FilterGate {
    fn input_filtered(&self, datum: &Datum, ifindex: Option<u32>) -> bool;
    fn output_filtered(&self, datum: &Datum, ifindex: Option<u32>) -> bool;
}

/// The redistribution policy (`redistribute_filter`) xroute reconciliation
/// consults to decide whether, and at what metric, a kernel route should be
/// exported into the protocol.
pub trait RedistributeFilter {
    /// `None` means filtered out (metric `>= infinity`).
    fn redistribute_metric(&self, datum: &Datum, ifindex: u32, proto: u8) -> Option<u16>;

    /// Lets the policy assign a source prefix to a kernel route that came in
    /// with none, before the route is compared against the existing
    /// xroute table.
    fn rewrite_source(&self, datum: &Datum, ifindex: u32, proto: u8) -> Option<crate::prefix::Prefix>;
}

/// The route-selection-and-install pipeline: choosing which Babel route
/// should back a Datum and pushing that choice into the kernel. This is the
/// consumer's job; xroute reconciliation only calls through this trait.
pub trait RouteSelection {
    fn find_best_route(&self, datum: &Datum) -> Option<Box<dyn Route>>;
    fn install_route(&self, route: &dyn Route);
    fn uninstall_route(&self, route: &dyn Route);
}
