//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Daemon-wide tunables. Loading these from a config file or YANG
//! datastore is the consumer's job; this crate only defines the knobs and
//! their defaults.

use std::collections::HashMap;
use std::time::Duration;

/// Default resend retry budget.
pub const DEFAULT_RESEND_MAX: u8 = 3;
/// Default window a REQUEST stays outstanding before it's given up on.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// The metric value meaning "unreachable".
pub const DEFAULT_INFINITY: u16 = 0xFFFF;

#[derive(Debug)]
pub struct Config {
    pub resend_max: u8,
    pub request_timeout: Duration,
    pub infinity: u16,
    /// `None` always prefers installing the xroute over a duplicate Babel
    /// route; `Some(threshold)` only does so when the xroute's metric beats
    /// the threshold.
    pub allow_duplicate_xroutes: Option<u16>,
    /// Per-interface authentication keys, tried in order by
    /// [`crate::auth::check_hmac`].
    pub auth_keys: HashMap<u32, Vec<Vec<u8>>>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            resend_max: DEFAULT_RESEND_MAX,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            infinity: DEFAULT_INFINITY,
            allow_duplicate_xroutes: None,
            auth_keys: HashMap::new(),
        }
    }
}

impl Config {
    pub fn auth_keys_for(&self, ifindex: u32) -> &[Vec<u8>] {
        self.auth_keys
            .get(&ifindex)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let config = Config::default();
        assert_eq!(config.resend_max, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.infinity, 0xFFFF);
        assert!(config.allow_duplicate_xroutes.is_none());
    }

    #[test]
    fn auth_keys_for_unknown_interface_is_empty() {
        let config = Config::default();
        assert!(config.auth_keys_for(7).is_empty());
    }
}
