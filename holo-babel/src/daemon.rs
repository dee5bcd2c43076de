//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Owns the process-wide state: the xroute table, the two resend tables,
//! the authentication replay table, and the running configuration.
//! Single-threaded by construction; the event loop holds the one `Daemon`
//! and passes `&mut` into each core operation as it handles a packet or
//! fires a timer.

use crate::auth::AnmTable;
use crate::config::Config;
use crate::resend::ResendTable;
use crate::xroute::XrouteTable;

pub struct Daemon {
    pub config: Config,
    pub xroutes: XrouteTable,
    pub resend: ResendTable,
    pub anm: AnmTable,
}

impl Daemon {
    pub fn new(config: Config) -> Daemon {
        let resend = ResendTable::new(config.resend_max, config.request_timeout);
        Daemon {
            config,
            xroutes: XrouteTable::default(),
            resend,
            anm: AnmTable::default(),
        }
    }
}

impl Default for Daemon {
    fn default() -> Daemon {
        Daemon::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_daemon_starts_with_empty_tables() {
        let daemon = Daemon::default();
        assert!(daemon.xroutes.is_empty());
        assert_eq!(daemon.config.resend_max, 3);
    }
}
