//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;

use crate::datum::Datum;
use crate::prefix::{prefix_cmp, PrefixCmp};

/// Borrowed view onto an externally-owned route, exposing only the routing
/// key comparison needs. Implemented by the consumer's route table entry
/// type; this crate never owns a full route record.
pub trait RouteDatum {
    fn datum(&self) -> &Datum;
}

/// Orders two routing keys, destination-specificity first, then
/// source-specificity.
///
/// Only meaningful when `a` and `b` are not disjoint; callers that can't
/// guarantee this (most of C4) always pair it with a conflict/intersection
/// check first.
pub fn rt_cmp(a: &Datum, b: &Datum) -> Ordering {
    match prefix_cmp(&a.dst, &b.dst) {
        PrefixCmp::MoreSpecific => return Ordering::Less,
        PrefixCmp::LessSpecific => return Ordering::Greater,
        PrefixCmp::Equal | PrefixCmp::Disjoint => {}
    }
    match prefix_cmp(&a.src, &b.src) {
        PrefixCmp::MoreSpecific => Ordering::Less,
        PrefixCmp::LessSpecific => Ordering::Greater,
        PrefixCmp::Equal | PrefixCmp::Disjoint => Ordering::Equal,
    }
}

/// The lesser of two optional routes under [`rt_cmp`], ties going to `r1`.
pub fn min_route<'a, T: RouteDatum>(
    r1: Option<&'a T>,
    r2: Option<&'a T>,
) -> Option<&'a T> {
    match (r1, r2) {
        (None, r2) => r2,
        (r1, None) => r1,
        (Some(a), Some(b)) => {
            if rt_cmp(a.datum(), b.datum()) != Ordering::Greater {
                r1
            } else {
                r2
            }
        }
    }
}
