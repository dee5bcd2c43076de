//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, warn};

use crate::datum::Datum;

/// Errors surfaced by the core engines.
///
/// None of these abort the process; each fallible operation returns a
/// `Result` and leaves recovery to the caller.
#[derive(Debug)]
pub enum Error {
    Kernel(KernelError),
    XrouteSnapshotTooLarge { requested: usize, cap: usize },
    AuthTruncatedDigest,
    AuthNoMatchingDigest,
    AuthMultipleTspc,
    AuthReplay,
}

/// A failed kernel FIB call (install/flush/modify).
#[derive(Debug)]
pub struct KernelError {
    pub op: KernelOp,
    pub datum: Datum,
    pub source: std::io::Error,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KernelOp {
    Add,
    Flush,
    Modify,
    ModifyMetric,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::Kernel(error) => error.log(),
            Error::XrouteSnapshotTooLarge { requested, cap } => {
                warn!(%requested, %cap, "{}", self);
            }
            Error::AuthTruncatedDigest
            | Error::AuthNoMatchingDigest
            | Error::AuthMultipleTspc => {
                warn!("{}", self);
            }
            // A replay attempt isn't a protocol malfunction, just a
            // neighbour resending something stale.
            Error::AuthReplay => {
                debug!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Kernel(error) => error.fmt(f),
            Error::XrouteSnapshotTooLarge { .. } => {
                write!(f, "kernel route dump exceeded the capped buffer size")
            }
            Error::AuthTruncatedDigest => {
                write!(f, "authentication trailer digest is truncated")
            }
            Error::AuthNoMatchingDigest => {
                write!(f, "no HMAC digest in the trailer matched a known key")
            }
            Error::AuthMultipleTspc => {
                write!(f, "more than one timestamp/packet-counter TLV in trailer")
            }
            Error::AuthReplay => {
                write!(f, "authentication replay: non-increasing timestamp/counter")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Kernel(error) => Some(error),
            _ => None,
        }
    }
}

impl From<KernelError> for Error {
    fn from(error: KernelError) -> Error {
        Error::Kernel(error)
    }
}

// ===== impl KernelError =====

impl KernelError {
    pub(crate) fn log(&self) {
        warn!(op = ?self.op, datum = %self.datum, error = %with_source(&self.source), "{}", self);
    }
}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.op {
            KernelOp::Add => write!(f, "failed to add kernel route"),
            KernelOp::Flush => write!(f, "failed to flush kernel route"),
            KernelOp::Modify => write!(f, "failed to modify kernel route"),
            KernelOp::ModifyMetric => {
                write!(f, "failed to modify kernel route metric")
            }
        }
    }
}

impl std::error::Error for KernelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
