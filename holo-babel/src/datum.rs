//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

use crate::prefix::Prefix;

/// The routing key of a source-specific route: a destination prefix paired
/// with a source prefix.
///
/// Kept together as a single struct, rather than passed as two loose
/// prefixes, since every core operation treats the pair as one routing key.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
#[derive(Deserialize, Serialize)]
pub struct Datum {
    pub dst: Prefix,
    pub src: Prefix,
}

impl Datum {
    pub fn new(dst: Prefix, src: Prefix) -> Datum {
        Datum { dst, src }
    }
}

impl std::fmt::Debug for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} from {}", self.dst, self.src)
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
