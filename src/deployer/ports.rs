// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use gateway_api::apis::standard::gateways::GatewayListeners;
use itertools::Itertools;
use tracing::debug;

const TARGET: &str = super::TARGET;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProxyPort {
    pub port: i32,
    pub target_port: i32,
}

impl ProxyPort {
    pub fn name(&self) -> String {
        format!("listener-{}", self.port)
    }
}

/// One entry per distinct listener port, in declaration order. The first listener on a port wins.
pub fn aggregate_ports(listeners: &[GatewayListeners], target_port: i32) -> Vec<ProxyPort> {
    listeners
        .iter()
        .map(|l| l.port)
        .unique()
        .map(|port| {
            debug!(target: TARGET, "Mapping listener port {port} to {target_port}");
            ProxyPort { port, target_port }
        })
        .collect()
}

/// Distinct target ports, in first seen order.
pub fn target_ports(ports: &[ProxyPort]) -> Vec<i32> {
    ports.iter().map(|p| p.target_port).unique().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listeners(m: &str) -> Vec<GatewayListeners> {
        serde_yaml::from_str(m).unwrap()
    }

    #[test]
    fn test_duplicate_ports_are_coalesced() {
        let listeners = listeners(
            r"
- name: listener-1
  port: 80
  protocol: HTTP
- name: listener-2
  port: 443
  protocol: HTTPS
- name: listener-3
  port: 80
  protocol: HTTP
",
        );
        let ports = aggregate_ports(&listeners, 8080);
        assert_eq!(ports, vec![ProxyPort { port: 80, target_port: 8080 }, ProxyPort { port: 443, target_port: 8080 }]);
        assert_eq!(ports[0].name(), "listener-80");
        assert_eq!(target_ports(&ports), vec![8080]);
    }

    #[test]
    fn test_no_listeners() {
        assert!(aggregate_ports(&[], 8080).is_empty());
    }
}
