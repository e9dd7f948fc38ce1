// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use super::ResourceKey;
use crate::Result;

pub const DEFAULT_PROXY_ROLE: &str = "gloo-kube-gateway-api";
pub const DEFAULT_TARGET_PORT: i32 = 8080;
pub const DEFAULT_STATS_PORT: i32 = 9091;
const DEFAULT_LOOKUP_TIMEOUT_SECONDS: u64 = 10;

fn default_build_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

fn default_proxy_role() -> String {
    DEFAULT_PROXY_ROLE.to_owned()
}

fn default_target_port() -> i32 {
    DEFAULT_TARGET_PORT
}

fn default_stats_port() -> i32 {
    DEFAULT_STATS_PORT
}

fn default_lookup_timeout_seconds() -> u64 {
    DEFAULT_LOOKUP_TIMEOUT_SECONDS
}

/// Address of the xDS server the proxies fetch their dynamic configuration from.
#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct ControlPlane {
    #[builder(setter(into))]
    pub xds_host: String,
    pub xds_port: u16,
}

/// Everything the deployer needs besides the Gateway itself.
#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct Inputs {
    #[builder(setter(into))]
    pub controller_name: String,
    pub default_parameters: ResourceKey,
    pub control_plane: ControlPlane,
    #[serde(default)]
    #[builder(default)]
    pub istio_integration_enabled: bool,
    #[serde(default = "default_build_version")]
    #[builder(default = default_build_version(), setter(into))]
    pub build_version: String,
    #[serde(default = "default_proxy_role")]
    #[builder(default = default_proxy_role(), setter(into))]
    pub proxy_role: String,
    #[serde(default = "default_target_port")]
    #[builder(default = DEFAULT_TARGET_PORT)]
    pub target_port: i32,
    #[serde(default = "default_stats_port")]
    #[builder(default = DEFAULT_STATS_PORT)]
    pub stats_port: i32,
    #[serde(default = "default_lookup_timeout_seconds")]
    #[builder(default = DEFAULT_LOOKUP_TIMEOUT_SECONDS)]
    pub lookup_timeout_seconds: u64,
}

impl Inputs {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_seconds)
    }
}

#[derive(Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    #[builder(setter(into))]
    pub controller_name: String,
    #[builder(default)]
    pub enable_open_telemetry: Option<bool>,
    pub deployer: Inputs,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("xds host must be not empty")]
    XdsHost,
    #[error("build version must be not empty")]
    BuildVersion,
    #[error("proxy role must be not empty")]
    ProxyRole,
    #[error("port {0} is out of range")]
    Port(i32),
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        self.deployer.validate().map_err(std::convert::Into::into)
    }
}

impl Inputs {
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.control_plane.xds_host.is_empty() {
            return Err(ConfigurationError::XdsHost);
        }
        if self.build_version.is_empty() {
            return Err(ConfigurationError::BuildVersion);
        }
        if self.proxy_role.is_empty() {
            return Err(ConfigurationError::ProxyRole);
        }
        for port in [self.target_port, self.stats_port] {
            if !(1..=65535).contains(&port) {
                return Err(ConfigurationError::Port(port));
            }
        }
        Ok(())
    }
}
