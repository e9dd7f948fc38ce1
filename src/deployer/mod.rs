// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

mod bootstrap;
mod config_resolver;
mod containers;
mod merge;
mod objects;
mod ports;

pub use config_resolver::{EffectiveEnvironment, KubeProxyConfigLookup, ProxyConfigLookup};
use gateway_api::apis::standard::gateways::Gateway;
use kube::ResourceExt;
pub use objects::{ProxyObject, proxy_name};
use thiserror::Error;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use self::{
    bootstrap::BootstrapComposer,
    config_resolver::ConfigResolver,
    containers::ContainerAssembler,
    objects::{GatewayIdentity, ObjectBuilder},
};
use crate::{
    common::{Inputs, ResourceKey},
    crds::GATEWAY_PARAMETERS_ANNOTATION,
};

pub(crate) const TARGET: &str = "gateway_proxy_deployer::deployer";

#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration not found {0}")]
    ConfigurationNotFound(ResourceKey),
    #[error("object store failure while fetching {key}: {source}")]
    ObjectStore { key: ResourceKey, source: crate::Error },
    #[error("templating error: {0}")]
    Templating(#[from] tera::Error),
    #[error("rendered bootstrap is not valid yaml: {0}")]
    InvalidBootstrap(#[source] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] serde_json::Error),
}

/// Computes the objects that run the proxy fleet of a Gateway.
#[derive(TypedBuilder)]
pub struct Deployer<L> {
    lookup: L,
}

impl<L: ProxyConfigLookup> Deployer<L> {
    /// Deployment, Service, ServiceAccount and ConfigMap for the gateway, or nothing when the gateway is self managed.
    ///
    /// The result only depends on the arguments and on the configuration objects returned by the lookup.
    pub async fn compute_objects(&self, gateway: &Gateway, inputs: Option<&Inputs>) -> Result<Vec<ProxyObject>, DeployerError> {
        let inputs = inputs.ok_or_else(|| DeployerError::InvalidInput("deployer inputs are missing".to_owned()))?;
        let name = gateway.metadata.name.as_deref().ok_or_else(|| DeployerError::InvalidInput("gateway has no name".to_owned()))?;
        let namespace =
            gateway.metadata.namespace.as_deref().ok_or_else(|| DeployerError::InvalidInput(format!("gateway {name} has no namespace")))?;
        let uid =
            gateway.metadata.uid.as_deref().ok_or_else(|| DeployerError::InvalidInput(format!("gateway {namespace}.{name} has no uid")))?;

        let override_key = gateway
            .annotations()
            .get(GATEWAY_PARAMETERS_ANNOTATION)
            .filter(|n| !n.is_empty())
            .map(|parameters_name| ResourceKey::parameters(parameters_name, namespace));

        let resolver = ConfigResolver { lookup: &self.lookup, timeout: inputs.lookup_timeout() };
        let config = match resolver.resolve(&inputs.default_parameters, override_key.as_ref()).await? {
            EffectiveEnvironment::SelfManaged => {
                info!(target: TARGET, "Gateway {namespace}.{name} is self managed, nothing to deploy");
                return Ok(vec![]);
            },
            EffectiveEnvironment::KubeManaged(config) => config,
        };

        let proxy_name = proxy_name(name);
        let ports = ports::aggregate_ports(&gateway.spec.listeners, inputs.target_port);
        let bootstrap = BootstrapComposer {
            proxy_name: &proxy_name,
            gateway_name: name,
            gateway_namespace: namespace,
            config: &config,
            inputs,
            ports: &ports,
        }
        .compose()?;
        let pod = ContainerAssembler { proxy_name: &proxy_name, config: &config, inputs, ports: &ports, bootstrap: &bootstrap }.assemble();

        let objects = ObjectBuilder {
            gateway: GatewayIdentity { name, namespace, uid },
            config: &config,
            inputs,
            ports: &ports,
            bootstrap,
            pod,
        }
        .build();
        debug!(target: TARGET, "Computed {} objects for gateway {namespace}.{name}", objects.len());
        Ok(objects)
    }
}
