// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::{collections::BTreeMap, sync::LazyLock};

use itertools::Itertools;
use serde::Serialize;
use tera::Tera;
use tracing::{debug, warn};

use super::{
    DeployerError,
    ports::{self, ProxyPort},
};
use crate::{
    common::Inputs,
    crds::{EnvoyBootstrap, KubernetesProxyConfig},
};

const TARGET: &str = super::TARGET;

const BOOTSTRAP_TEMPLATE_NAME: &str = "envoy-bootstrap.yaml.tera";
const BOOTSTRAP_TEMPLATE: &str = include_str!("../../templates/envoy-bootstrap.yaml.tera");

pub const ENVOY_CONFIG_DIRECTORY: &str = "/etc/envoy";
pub const ENVOY_CONFIG_KEY: &str = "envoy.yaml";
pub const ADMIN_PORT: i32 = 19000;
pub const SDS_PORT: i32 = 8234;
pub const METRICS_PATH: &str = "/metrics";
pub const READY_PATH: &str = "/ready";
pub const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_METRICS_PREFIX_REWRITE: &str = "/stats/prometheus";
const DEFAULT_STATS_PREFIX_REWRITE: &str = "/stats";

static TEMPLATES: LazyLock<Tera> = LazyLock::new(|| {
    let mut tera = Tera::default();
    if let Err(e) = tera.add_raw_template(BOOTSTRAP_TEMPLATE_NAME, BOOTSTRAP_TEMPLATE) {
        warn!(target: TARGET, "Parsing error(s): {}", e);
    }
    tera
});

/// Resolved settings of the administrative stats listener.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsSettings {
    pub port: i32,
    pub metrics_prefix_rewrite: String,
    pub stats_prefix_rewrite: Option<String>,
}

impl StatsSettings {
    /// `None` when stats are disabled. Stats are enabled unless explicitly turned off.
    pub fn resolve(config: &KubernetesProxyConfig, inputs: &Inputs) -> Option<Self> {
        let stats = config.stats.clone().unwrap_or_default();
        if !stats.enabled.unwrap_or(true) {
            return None;
        }
        let stats_prefix_rewrite = if stats.enable_stats_route.unwrap_or(false) {
            Some(stats.stats_route_prefix_rewrite.unwrap_or(DEFAULT_STATS_PREFIX_REWRITE.to_owned()))
        } else {
            None
        };
        Some(Self {
            port: inputs.stats_port,
            metrics_prefix_rewrite: stats.route_prefix_rewrite.unwrap_or(DEFAULT_METRICS_PREFIX_REWRITE.to_owned()),
            stats_prefix_rewrite,
        })
    }
}

#[derive(Debug, Serialize)]
struct TeraListener {
    name: String,
    port: i32,
}

#[derive(Debug)]
pub struct Bootstrap {
    pub document: String,
    pub envoy_args: Vec<String>,
}

pub struct BootstrapComposer<'a> {
    pub proxy_name: &'a str,
    pub gateway_name: &'a str,
    pub gateway_namespace: &'a str,
    pub config: &'a KubernetesProxyConfig,
    pub inputs: &'a Inputs,
    pub ports: &'a [ProxyPort],
}

impl BootstrapComposer<'_> {
    pub fn compose(&self) -> Result<Bootstrap, DeployerError> {
        let document = self.render()?;
        let envoy_args = envoy_args(self.config.envoy_container.as_ref().and_then(|c| c.bootstrap.as_ref()));
        Ok(Bootstrap { document, envoy_args })
    }

    /// The string the xDS server uses to pick the configuration for this proxy.
    pub fn role(&self) -> String {
        format!("{}~{}~{}-{}", self.inputs.proxy_role, self.gateway_namespace, self.gateway_namespace, self.gateway_name)
    }

    fn render(&self) -> Result<String, DeployerError> {
        let listeners: Vec<TeraListener> =
            ports::target_ports(self.ports).into_iter().map(|port| TeraListener { name: format!("listener-{port}"), port }).collect();
        let stats = StatsSettings::resolve(self.config, self.inputs);

        let mut tera_context = tera::Context::new();
        tera_context.insert("proxy_name", self.proxy_name);
        tera_context.insert("role", &self.role());
        tera_context.insert("admin_port", &ADMIN_PORT);
        tera_context.insert("xds_host", &self.inputs.control_plane.xds_host);
        tera_context.insert("xds_port", &self.inputs.control_plane.xds_port);
        tera_context.insert("listeners", &listeners);
        tera_context.insert("stats", &stats);
        tera_context.insert("sds", &self.config.sds_container.is_some());
        tera_context.insert("sds_port", &SDS_PORT);

        let document = TEMPLATES.render(BOOTSTRAP_TEMPLATE_NAME, &tera_context)?;
        let _: serde_yaml::Value = serde_yaml::from_str(&document).map_err(DeployerError::InvalidBootstrap)?;
        debug!(target: TARGET, "Rendered bootstrap for {}", self.proxy_name);
        Ok(document)
    }
}

/// Arguments of the primary container.
pub fn envoy_args(bootstrap: Option<&EnvoyBootstrap>) -> Vec<String> {
    let config_path = format!("{ENVOY_CONFIG_DIRECTORY}/{ENVOY_CONFIG_KEY}");
    let mut args: Vec<String> = ["-c", config_path.as_str(), "--disable-hot-restart", "--service-node", "$(POD_NAME).$(POD_NAMESPACE)"]
        .into_iter()
        .map(str::to_owned)
        .collect();

    let log_level = bootstrap.and_then(|b| b.log_level.as_deref()).filter(|l| !l.is_empty()).unwrap_or(DEFAULT_LOG_LEVEL);
    args.push("--log-level".to_owned());
    args.push(log_level.to_owned());

    if let Some(levels) = bootstrap.map(|b| &b.component_log_levels).filter(|l| !l.is_empty()) {
        args.push("--component-log-level".to_owned());
        args.push(component_log_level(levels));
    }
    args
}

/// `name:level` pairs joined with commas, ordered by component name.
pub fn component_log_level(levels: &BTreeMap<String, String>) -> String {
    levels.iter().map(|(component, level)| format!("{component}:{level}")).join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ControlPlane, ResourceKey};

    fn inputs() -> Inputs {
        Inputs::builder()
            .controller_name("gloo.solo.io/gloo-gateway")
            .default_parameters(ResourceKey::parameters("gloo-gateway", "default"))
            .control_plane(ControlPlane::builder().xds_host("gloo.gloo-system.svc.cluster.local").xds_port(9977).build())
            .build()
    }

    fn compose(config: &KubernetesProxyConfig, ports: &[ProxyPort]) -> Bootstrap {
        let inputs = inputs();
        BootstrapComposer {
            proxy_name: "gloo-proxy-foo",
            gateway_name: "foo",
            gateway_namespace: "default",
            config,
            inputs: &inputs,
            ports,
        }
        .compose()
        .unwrap()
    }

    fn listener_names(document: &str) -> Vec<String> {
        let value: serde_yaml::Value = serde_yaml::from_str(document).unwrap();
        value["static_resources"]["listeners"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap().to_owned())
            .collect()
    }

    fn cluster_names(document: &str) -> Vec<String> {
        let value: serde_yaml::Value = serde_yaml::from_str(document).unwrap();
        value["static_resources"]["clusters"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn test_component_log_level_is_sorted() {
        let mut levels = BTreeMap::new();
        levels.insert("upstream".to_owned(), "debug".to_owned());
        levels.insert("router".to_owned(), "info".to_owned());
        levels.insert("listener".to_owned(), "warn".to_owned());
        assert_eq!(component_log_level(&levels), "listener:warn,router:info,upstream:debug");
    }

    #[test]
    fn test_envoy_args() {
        let bootstrap: EnvoyBootstrap = serde_yaml::from_str(
            r"
logLevel: debug
componentLogLevels:
  router: info
  listener: warn
",
        )
        .unwrap();
        let args = envoy_args(Some(&bootstrap));
        assert_eq!(
            args,
            vec![
                "-c",
                "/etc/envoy/envoy.yaml",
                "--disable-hot-restart",
                "--service-node",
                "$(POD_NAME).$(POD_NAMESPACE)",
                "--log-level",
                "debug",
                "--component-log-level",
                "listener:warn,router:info"
            ]
        );

        let args = envoy_args(None);
        assert_eq!(args[args.len() - 2..], ["--log-level".to_owned(), "info".to_owned()]);
    }

    #[test]
    fn test_node_metadata_role() {
        let bootstrap = compose(&KubernetesProxyConfig::default(), &[ProxyPort { port: 80, target_port: 8080 }]);
        let value: serde_yaml::Value = serde_yaml::from_str(&bootstrap.document).unwrap();
        assert_eq!(value["node"]["metadata"]["role"].as_str(), Some("gloo-kube-gateway-api~default~default-foo"));
        assert_eq!(value["node"]["cluster"].as_str(), Some("gloo-proxy-foo"));
        assert_eq!(
            value["static_resources"]["clusters"][0]["load_assignment"]["endpoints"][0]["lb_endpoints"][0]["endpoint"]["address"]
                ["socket_address"]["port_value"]
                .as_u64(),
            Some(9977)
        );
    }

    #[test]
    fn test_stats_listener_enabled_by_default() {
        let bootstrap = compose(&KubernetesProxyConfig::default(), &[ProxyPort { port: 80, target_port: 8080 }]);
        assert_eq!(listener_names(&bootstrap.document), vec!["listener-8080", "prometheus_listener"]);
        assert!(!bootstrap.document.contains("prefix: /stats\n"));
    }

    #[test]
    fn test_stats_route() {
        let config: KubernetesProxyConfig = serde_yaml::from_str(
            r"
stats:
  enableStatsRoute: true
  statsRoutePrefixRewrite: /stats/all
",
        )
        .unwrap();
        let bootstrap = compose(&config, &[]);
        let value: serde_yaml::Value = serde_yaml::from_str(&bootstrap.document).unwrap();
        let routes = value["static_resources"]["listeners"][0]["filter_chains"][0]["filters"][0]["typed_config"]["route_config"]
            ["virtual_hosts"][0]["routes"]
            .as_sequence()
            .unwrap()
            .clone();
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[1]["route"]["prefix_rewrite"].as_str(), Some("/stats/prometheus"));
        assert_eq!(routes[2]["route"]["prefix_rewrite"].as_str(), Some("/stats/all"));
    }

    #[test]
    fn test_stats_disabled_and_no_listeners() {
        let config: KubernetesProxyConfig = serde_yaml::from_str(
            r"
stats:
  enabled: false
",
        )
        .unwrap();
        let bootstrap = compose(&config, &[]);
        assert!(listener_names(&bootstrap.document).is_empty());
    }

    #[test]
    fn test_sds_cluster() {
        let bootstrap = compose(&KubernetesProxyConfig::default(), &[]);
        assert_eq!(cluster_names(&bootstrap.document), vec!["xds_cluster", "admin_port_cluster"]);

        let config: KubernetesProxyConfig = serde_yaml::from_str("sdsContainer: {}").unwrap();
        let bootstrap = compose(&config, &[]);
        assert_eq!(cluster_names(&bootstrap.document), vec!["xds_cluster", "admin_port_cluster", "gateway_proxy_sds"]);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let config: KubernetesProxyConfig = serde_yaml::from_str(
            r"
envoyContainer:
  bootstrap:
    componentLogLevels:
      router: info
      listener: warn
      upstream: debug
",
        )
        .unwrap();
        let ports = [ProxyPort { port: 80, target_port: 8080 }];
        let first = compose(&config, &ports);
        let second = compose(&config, &ports);
        assert_eq!(first.document, second.document);
        assert_eq!(first.envoy_args, second.envoy_args);
    }
}
