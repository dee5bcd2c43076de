//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Source-specific route disambiguation: keeps a destination-only
//! kernel FIB semantically equivalent to the installed source-specific
//! route set by programming extra "completion routes" at the intersection
//! zones where two routes conflict.

use std::cmp::Ordering;
use std::net::IpAddr;

use crate::collaborator::{KernelInterface, Route, RouteTable};
use crate::datum::Datum;
use crate::debug::Debug;
use crate::error::Error;
use crate::order::{rt_cmp, RouteDatum};
use crate::zone::{conflicts, intersect, zone_equal, Zone};

fn is_v4(addr: IpAddr) -> bool {
    matches!(addr, IpAddr::V4(_))
}

/// True if no source-specific route is currently installed anywhere (the
/// fast path's second condition: a default-source route never needs
/// completion work unless something else forces disambiguation).
fn not_any_specific_route<T: RouteTable>(routes: &T) -> bool {
    routes.installed_ss_routes().next().is_none()
}

/// The minimum, under [`rt_cmp`], over installed routes that conflict with
/// `route` at exactly `zone`, excluding `exclude` itself (used when `route`
/// being installed/uninstalled is in-flight: it mustn't count as its own
/// pre-existing occupant of the zone it's busy completing).
fn min_conflict<'a, T: RouteTable>(
    routes: &'a T,
    zone: &Zone,
    route: &Datum,
    exclude: Option<&Datum>,
) -> Option<&'a T::Route> {
    let mut min: Option<&T::Route> = None;
    for candidate in routes.installed_routes() {
        if Some(candidate.datum()) == exclude {
            continue;
        }
        if !conflicts(route, candidate.datum()) {
            continue;
        }
        let Some(curr_zone) = intersect(route, candidate.datum()) else {
            continue;
        };
        if !zone_equal(&curr_zone, zone) {
            continue;
        }
        min = crate::order::min_route(Some(candidate), min);
    }
    min
}

/// The winner of whichever conflicting pair of installed routes currently
/// intersects at exactly `route`'s own zone, if any. This is the route
/// that would have been programmed at `route`'s own zone as somebody
/// else's completion.
///
/// Considers both members of every conflicting pair and returns the pair's
/// specificity winner, rather than assuming one side is always the
/// source-specific half. That generality is needed to find a
/// destination-specific winner, such as a completion pointing at a
/// default-source route.
fn conflict_solution<'a, T: RouteTable>(
    routes: &'a T,
    route: &Datum,
) -> Option<&'a T::Route> {
    let mut min: Option<&T::Route> = None;
    let all: Vec<&T::Route> = routes.installed_routes().collect();
    for (i, rt1) in all.iter().enumerate() {
        for rt2 in &all[i + 1..] {
            if !conflicts(rt1.datum(), rt2.datum()) {
                continue;
            }
            let Some(tmp) = intersect(rt1.datum(), rt2.datum()) else {
                continue;
            };
            if !zone_equal(&tmp, route) {
                continue;
            }
            let winner = if rt_cmp(rt1.datum(), rt2.datum()) != Ordering::Greater {
                *rt1
            } else {
                *rt2
            };
            min = crate::order::min_route(Some(winner), min);
        }
    }
    min
}

/// `rt_cmp(a, b) == Equal`, i.e. `a` and `b` tie under the specificity
/// order. Used in place of identity comparison when checking whether a
/// candidate route is *the* `min_conflict` winner, since ties are possible
/// when two data share specificity on both axes.
fn rt_tied(a: &Datum, b: Option<&Datum>) -> bool {
    match b {
        Some(b) => rt_cmp(a, b) == Ordering::Equal,
        None => false,
    }
}

fn log_best_effort(result: Result<(), Error>) {
    if let Err(error) = result {
        error.log();
    }
}

/// Swallows `EEXIST` (treated as success on install), propagates everything
/// else.
fn primary_result(
    result: Result<(), Error>,
    is_add: bool,
) -> Result<(), Error> {
    match result {
        Err(Error::Kernel(ref kernel_error))
            if is_add
                && kernel_error.source.kind() == std::io::ErrorKind::AlreadyExists =>
        {
            Ok(())
        }
        other => other,
    }
}

/// Installs `route`, programming completion routes on the slow path.
pub fn install<K, T>(
    kernel: &K,
    routes: &T,
    route: &T::Route,
) -> Result<(), Error>
where
    K: KernelInterface,
    T: RouteTable,
{
    let datum = *route.datum();
    let v4 = is_v4(route.nexthop());

    if kernel.kernel_disambiguate(v4)
        || (datum.src.is_default() && not_any_specific_route(routes))
    {
        let table = kernel.find_table(&datum);
        let result = kernel.kernel_route_add(table, &datum, route).map_err(Error::from);
        Debug::DisambiguateInstall(&datum).log();
        return primary_result(result, true);
    }

    for rt1 in routes.installed_routes() {
        let Some(zone) = intersect(&datum, rt1.datum()) else {
            continue;
        };
        if !conflicts(&datum, rt1.datum()) {
            continue;
        }
        if routes.find_installed_route(&zone).is_some() {
            continue;
        }
        let winner = min_conflict(routes, &zone, &datum, None);
        if !rt_tied(rt1.datum(), winner.map(|w| w.datum())) {
            continue;
        }
        let table = kernel.find_table(&zone);
        match min_conflict(routes, &zone, rt1.datum(), Some(&datum)) {
            None => {
                let better = if rt_cmp(&datum, rt1.datum()) != Ordering::Greater {
                    route
                } else {
                    rt1
                };
                log_best_effort(
                    kernel
                        .kernel_route_add(table, &zone, better)
                        .map_err(Error::from),
                );
            }
            Some(rt2) => {
                if rt_cmp(&datum, rt2.datum()) == Ordering::Less
                    && rt_cmp(&datum, rt1.datum()) == Ordering::Less
                {
                    log_best_effort(
                        kernel
                            .kernel_route_modify(table, &zone, rt2, route)
                            .map_err(Error::from),
                    );
                }
            }
        }
    }

    let table = kernel.find_table(&datum);
    let result = match conflict_solution(routes, &datum) {
        None => {
            Debug::DisambiguateInstall(&datum).log();
            kernel.kernel_route_add(table, &datum, route)
        }
        Some(rt1) => {
            Debug::DisambiguateSwitch(&datum).log();
            kernel.kernel_route_modify(table, &datum, rt1, route)
        }
    }
    .map_err(Error::from);
    primary_result(result, true)
}

/// Uninstalls `route`, rewriting or flushing completion routes on the slow
/// path. Mirror of [`install`].
pub fn uninstall<K, T>(
    kernel: &K,
    routes: &T,
    route: &T::Route,
) -> Result<(), Error>
where
    K: KernelInterface,
    T: RouteTable,
{
    let datum = *route.datum();
    let v4 = is_v4(route.nexthop());
    let table = kernel.find_table(&datum);

    if kernel.kernel_disambiguate(v4)
        || (datum.src.is_default() && not_any_specific_route(routes))
    {
        Debug::DisambiguateUninstall(&datum).log();
        let result = kernel
            .kernel_route_flush(table, &datum, route)
            .map_err(Error::from);
        if let Err(ref error) = result {
            error.log();
        }
        return result;
    }

    let primary = match conflict_solution(routes, &datum) {
        None => {
            Debug::DisambiguateUninstall(&datum).log();
            kernel.kernel_route_flush(table, &datum, route)
        }
        Some(rt1) => {
            Debug::DisambiguateSwitch(&datum).log();
            kernel.kernel_route_modify(table, &datum, route, rt1)
        }
    }
    .map_err(Error::from);
    if let Err(ref error) = primary {
        error.log();
    }

    for rt1 in routes.installed_routes() {
        let Some(zone) = intersect(&datum, rt1.datum()) else {
            continue;
        };
        if !conflicts(&datum, rt1.datum()) {
            continue;
        }
        if routes.find_installed_route(&zone).is_some() {
            continue;
        }
        let winner = min_conflict(routes, &zone, &datum, None);
        if !rt_tied(rt1.datum(), winner.map(|w| w.datum())) {
            continue;
        }
        let table = kernel.find_table(&zone);
        match min_conflict(routes, &zone, rt1.datum(), Some(&datum)) {
            None => {
                let better = if rt_cmp(&datum, rt1.datum()) != Ordering::Greater {
                    route
                } else {
                    rt1
                };
                log_best_effort(
                    kernel
                        .kernel_route_flush(table, &zone, better)
                        .map_err(Error::from),
                );
            }
            Some(rt2) => {
                if rt_cmp(&datum, rt2.datum()) == Ordering::Less
                    && rt_cmp(&datum, rt1.datum()) == Ordering::Less
                {
                    log_best_effort(
                        kernel
                            .kernel_route_modify(table, &zone, route, rt2)
                            .map_err(Error::from),
                    );
                }
            }
        }
    }

    primary
}

/// Switches `old`'s zone (and any completion zones it was winning) to point
/// at `new` instead; `old` and `new` share the same Datum.
pub fn switch<K, T>(
    kernel: &K,
    routes: &T,
    old: &T::Route,
    new: &T::Route,
) -> Result<(), Error>
where
    K: KernelInterface,
    T: RouteTable,
{
    let datum = *old.datum();
    let table = kernel.find_table(&datum);
    Debug::DisambiguateSwitch(&datum).log();
    let primary = kernel
        .kernel_route_modify(table, &datum, old, new)
        .map_err(Error::from);
    if let Err(ref error) = primary {
        error.log();
        return primary;
    }

    if !kernel.kernel_disambiguate(is_v4(old.nexthop())) && !not_any_specific_route(routes) {
        for rt1 in routes.installed_routes() {
            let Some(zone) = intersect(&datum, rt1.datum()) else {
                continue;
            };
            if !conflicts(&datum, rt1.datum()) {
                continue;
            }
            if routes.find_installed_route(&zone).is_some() {
                continue;
            }
            if rt_cmp(&datum, rt1.datum()) != Ordering::Less {
                continue;
            }
            if !rt_tied(&datum, min_conflict(routes, &zone, rt1.datum(), None).map(|w| w.datum())) {
                continue;
            }
            let table = kernel.find_table(&zone);
            log_best_effort(
                kernel
                    .kernel_route_modify(table, &zone, old, new)
                    .map_err(Error::from),
            );
        }
    }

    primary
}

/// Changes `route`'s kernel metric (and any completion zones it wins) from
/// `old_metric` to `new_metric`; same topology as [`switch`].
pub fn change_metric<K, T>(
    kernel: &K,
    routes: &T,
    route: &T::Route,
    old_metric: u32,
    new_metric: u32,
) -> Result<(), Error>
where
    K: KernelInterface,
    T: RouteTable,
{
    let datum = *route.datum();
    let table = kernel.find_table(&datum);
    let primary = kernel
        .kernel_route_modify_metric(table, &datum, route, old_metric, new_metric)
        .map_err(Error::from);
    if let Err(ref error) = primary {
        error.log();
        return primary;
    }

    if !kernel.kernel_disambiguate(is_v4(route.nexthop())) && !not_any_specific_route(routes) {
        for rt1 in routes.installed_routes() {
            let Some(zone) = intersect(&datum, rt1.datum()) else {
                continue;
            };
            if !conflicts(&datum, rt1.datum()) {
                continue;
            }
            if routes.find_installed_route(&zone).is_some() {
                continue;
            }
            if rt_cmp(&datum, rt1.datum()) != Ordering::Less {
                continue;
            }
            if !rt_tied(&datum, min_conflict(routes, &zone, rt1.datum(), None).map(|w| w.datum())) {
                continue;
            }
            let table = kernel.find_table(&zone);
            log_best_effort(
                kernel
                    .kernel_route_modify_metric(table, &zone, route, old_metric, new_metric)
                    .map_err(Error::from),
            );
        }
    }

    primary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use crate::prefix::Prefix;
    use std::cell::RefCell;
    use std::net::Ipv6Addr;

    fn v6(tag: u8, len: u8) -> Prefix {
        let mut octets = [0u8; 16];
        octets[0] = tag;
        Prefix::new(octets, len)
    }

    struct FakeRoute {
        datum: Datum,
    }

    impl RouteDatum for FakeRoute {
        fn datum(&self) -> &Datum {
            &self.datum
        }
    }

    impl Route for FakeRoute {
        fn nexthop(&self) -> IpAddr {
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        }

        fn ifindex(&self) -> u32 {
            1
        }

        fn metric(&self) -> u32 {
            10
        }
    }

    struct FakeRoutes {
        routes: Vec<FakeRoute>,
    }

    impl FakeRoutes {
        fn new(data: &[Datum]) -> FakeRoutes {
            FakeRoutes {
                routes: data.iter().map(|&datum| FakeRoute { datum }).collect(),
            }
        }
    }

    impl RouteTable for FakeRoutes {
        type Route = FakeRoute;

        fn find_installed_route(&self, datum: &Datum) -> Option<&FakeRoute> {
            self.routes.iter().find(|r| &r.datum == datum)
        }

        fn installed_routes(&self) -> Box<dyn Iterator<Item = &FakeRoute> + '_> {
            Box::new(self.routes.iter())
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    enum Call {
        Add(Zone, Datum),
        Flush(Zone, Datum),
        Modify(Zone, Datum, Datum),
        ModifyMetric(Zone),
    }

    struct FakeKernel {
        calls: RefCell<Vec<Call>>,
    }

    impl FakeKernel {
        fn new() -> FakeKernel {
            FakeKernel {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl KernelInterface for FakeKernel {
        fn kernel_disambiguate(&self, _v4: bool) -> bool {
            false
        }

        fn find_table(&self, _zone: &Zone) -> u32 {
            0
        }

        fn kernel_route_add(
            &self,
            _table: u32,
            zone: &Zone,
            route: &dyn Route,
        ) -> Result<(), KernelError> {
            self.calls.borrow_mut().push(Call::Add(*zone, *route.datum()));
            Ok(())
        }

        fn kernel_route_flush(
            &self,
            _table: u32,
            zone: &Zone,
            route: &dyn Route,
        ) -> Result<(), KernelError> {
            self.calls.borrow_mut().push(Call::Flush(*zone, *route.datum()));
            Ok(())
        }

        fn kernel_route_modify(
            &self,
            _table: u32,
            zone: &Zone,
            old: &dyn Route,
            new: &dyn Route,
        ) -> Result<(), KernelError> {
            self.calls
                .borrow_mut()
                .push(Call::Modify(*zone, *old.datum(), *new.datum()));
            Ok(())
        }

        fn kernel_route_modify_metric(
            &self,
            _table: u32,
            zone: &Zone,
            _route: &dyn Route,
            _old_metric: u32,
            _new_metric: u32,
        ) -> Result<(), KernelError> {
            self.calls.borrow_mut().push(Call::ModifyMetric(*zone));
            Ok(())
        }
    }

    #[test]
    fn no_conflict_install_produces_one_entry_per_zone() {
        let x = Datum::new(v6(0x20, 32), Prefix::default_prefix());
        let y = Datum::new(v6(0x20, 48), Prefix::default_prefix());

        let kernel = FakeKernel::new();
        let routes = FakeRoutes::new(&[x]);
        install(&kernel, &routes, &routes.routes[0]).unwrap();

        let routes = FakeRoutes::new(&[x, y]);
        install(&kernel, &routes, &routes.routes[1]).unwrap();

        let calls = kernel.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| matches!(c, Call::Add(..))));
    }

    #[test]
    fn classic_conflict_installs_completion_pointing_at_winner() {
        let src_a = v6(0x30, 48);
        let dst_b = v6(0x20, 48);
        let a = Datum::new(Prefix::default_prefix(), src_a);
        let b = Datum::new(dst_b, Prefix::default_prefix());

        let kernel = FakeKernel::new();
        let routes = FakeRoutes::new(&[a]);
        install(&kernel, &routes, &routes.routes[0]).unwrap();
        assert_eq!(kernel.calls.borrow().len(), 1);

        let routes = FakeRoutes::new(&[a, b]);
        install(&kernel, &routes, &routes.routes[1]).unwrap();

        let calls = kernel.calls.borrow();
        assert_eq!(calls.len(), 3, "{calls:?}");
        let intersection = Zone::new(dst_b, src_a);
        assert!(calls[1..]
            .iter()
            .any(|c| matches!(c, Call::Add(z, d) if *z == intersection && *d == b)));
        assert!(calls[1..]
            .iter()
            .any(|c| matches!(c, Call::Add(z, d) if *z == b && *d == b)));
    }

    #[test]
    fn completion_rewrite_on_better_route() {
        let src_a = v6(0x30, 48);
        let dst_b = v6(0x20, 48);
        let a = Datum::new(Prefix::default_prefix(), src_a);
        let b = Datum::new(dst_b, Prefix::default_prefix());
        let c = Datum::new(dst_b, src_a);

        let kernel = FakeKernel::new();
        let routes = FakeRoutes::new(&[a, b, c]);
        install(&kernel, &routes, &routes.routes[2]).unwrap();

        let calls = kernel.calls.borrow();
        assert_eq!(*calls, vec![Call::Modify(c, b, c)]);
    }

    #[test]
    fn uninstall_restores_completion() {
        let src_a = v6(0x30, 48);
        let dst_b = v6(0x20, 48);
        let a = Datum::new(Prefix::default_prefix(), src_a);
        let b = Datum::new(dst_b, Prefix::default_prefix());
        let c = Datum::new(dst_b, src_a);

        let kernel = FakeKernel::new();
        let routes = FakeRoutes::new(&[a, b, c]);
        uninstall(&kernel, &routes, &routes.routes[2]).unwrap();

        let calls = kernel.calls.borrow();
        assert_eq!(*calls, vec![Call::Modify(c, c, b)]);
    }
}
