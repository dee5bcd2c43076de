//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span};

use crate::datum::Datum;
use crate::resend::Kind;

/// Loggable events raised by the core engines.
#[derive(Debug)]
pub enum Debug<'a> {
    DisambiguateInstall(&'a Datum),
    DisambiguateUninstall(&'a Datum),
    DisambiguateSwitch(&'a Datum),
    ResendRecord(Kind, &'a Datum, u16),
    ResendFire(Kind, &'a Datum, u8),
    ResendExpire(Kind, &'a Datum),
    XrouteCheckStart(usize, usize),
    XrouteFlush(&'a Datum),
    XrouteAdd(&'a Datum, u16),
    AuthAccept(u32, u16),
    AuthReject,
}

// ===== impl Debug =====

impl<'a> Debug<'a> {
    pub fn log(&self) {
        match self {
            Debug::DisambiguateInstall(datum)
            | Debug::DisambiguateUninstall(datum)
            | Debug::DisambiguateSwitch(datum) => {
                debug_span!("disambiguate", %datum).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::ResendRecord(kind, datum, delay) => {
                debug_span!("resend", ?kind, %datum).in_scope(|| {
                    debug!(%delay, "{}", self);
                });
            }
            Debug::ResendFire(kind, datum, retries_left) => {
                debug_span!("resend", ?kind, %datum).in_scope(|| {
                    debug!(%retries_left, "{}", self);
                });
            }
            Debug::ResendExpire(kind, datum) => {
                debug_span!("resend", ?kind, %datum).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::XrouteCheckStart(numroutes, maxroutes) => {
                debug_span!("xroute").in_scope(|| {
                    debug!(%numroutes, %maxroutes, "{}", self);
                });
            }
            Debug::XrouteFlush(datum) => {
                debug_span!("xroute").in_scope(|| {
                    debug!(%datum, "{}", self);
                });
            }
            Debug::XrouteAdd(datum, metric) => {
                debug_span!("xroute").in_scope(|| {
                    debug!(%datum, %metric, "{}", self);
                });
            }
            Debug::AuthAccept(timestamp, packet_counter) => {
                debug_span!("auth").in_scope(|| {
                    debug!(%timestamp, %packet_counter, "{}", self);
                });
            }
            Debug::AuthReject => {
                debug_span!("auth").in_scope(|| {
                    debug!("{}", self);
                });
            }
        }
    }
}

impl<'a> std::fmt::Display for Debug<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::DisambiguateInstall(..) => write!(f, "zone installed"),
            Debug::DisambiguateUninstall(..) => write!(f, "zone uninstalled"),
            Debug::DisambiguateSwitch(..) => {
                write!(f, "zone switched to a new winning route")
            }
            Debug::ResendRecord(..) => write!(f, "resend recorded"),
            Debug::ResendFire(..) => write!(f, "resend fired"),
            Debug::ResendExpire(..) => write!(f, "resend entry expired"),
            Debug::XrouteCheckStart(..) => write!(f, "xroute reconciliation started"),
            Debug::XrouteFlush(..) => write!(f, "xroute flushed"),
            Debug::XrouteAdd(..) => write!(f, "xroute added"),
            Debug::AuthAccept(..) => write!(f, "authentication trailer accepted"),
            Debug::AuthReject => write!(f, "authentication trailer rejected"),
        }
    }
}
