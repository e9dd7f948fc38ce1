// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::BTreeMap;

use gateway_api::apis::standard::gateways::Gateway;
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{ConfigMap, PodSpec, PodTemplateSpec, Service, ServiceAccount, ServicePort, ServiceSpec},
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference},
        util::intstr::IntOrString,
    },
};
use kube::Resource;
use serde::Serialize;

use super::{
    bootstrap::{Bootstrap, ENVOY_CONFIG_KEY, METRICS_PATH, StatsSettings},
    containers::PodContainers,
    ports::ProxyPort,
};
use crate::{common::Inputs, crds::KubernetesProxyConfig};

pub const PROXY_NAME_PREFIX: &str = "gloo-proxy-";
pub const SCRAPE_ANNOTATION: &str = "prometheus.io/scrape";
pub const SCRAPE_PORT_ANNOTATION: &str = "prometheus.io/port";
pub const SCRAPE_PATH_ANNOTATION: &str = "prometheus.io/path";

const NAME_LABEL: &str = "app.kubernetes.io/name";
const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
const GATEWAY_NAME_LABEL: &str = "gateway.networking.k8s.io/gateway-name";
const GLOO_LABEL: &str = "gloo";
const GLOO_LABEL_VALUE: &str = "kube-gateway";

const DEFAULT_REPLICAS: i32 = 1;

pub fn proxy_name(gateway_name: &str) -> String {
    format!("{PROXY_NAME_PREFIX}{gateway_name}")
}

/// One of the objects generated for a Gateway.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProxyObject {
    Deployment(Box<Deployment>),
    Service(Service),
    ServiceAccount(ServiceAccount),
    ConfigMap(ConfigMap),
}

impl ProxyObject {
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ProxyObject::Deployment(d) => &d.metadata,
            ProxyObject::Service(s) => &s.metadata,
            ProxyObject::ServiceAccount(s) => &s.metadata,
            ProxyObject::ConfigMap(c) => &c.metadata,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProxyObject::Deployment(_) => "Deployment",
            ProxyObject::Service(_) => "Service",
            ProxyObject::ServiceAccount(_) => "ServiceAccount",
            ProxyObject::ConfigMap(_) => "ConfigMap",
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }
}

/// Identity of the Gateway the objects are generated for.
pub struct GatewayIdentity<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub uid: &'a str,
}

impl GatewayIdentity<'_> {
    fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: Gateway::api_version(&()).to_string(),
            kind: Gateway::kind(&()).to_string(),
            name: self.name.to_owned(),
            uid: self.uid.to_owned(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

pub struct ObjectBuilder<'a> {
    pub gateway: GatewayIdentity<'a>,
    pub config: &'a KubernetesProxyConfig,
    pub inputs: &'a Inputs,
    pub ports: &'a [ProxyPort],
    pub bootstrap: Bootstrap,
    pub pod: PodContainers,
}

impl ObjectBuilder<'_> {
    /// Deployment, Service, ServiceAccount and ConfigMap, in this order.
    pub fn build(self) -> Vec<ProxyObject> {
        let name = proxy_name(self.gateway.name);
        let selector = self.selector_labels(&name);
        let owner_reference = self.gateway.owner_reference();
        let metadata = |labels: Option<BTreeMap<String, String>>, annotations: Option<BTreeMap<String, String>>| ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(self.gateway.namespace.to_owned()),
            labels,
            annotations,
            owner_references: Some(vec![owner_reference.clone()]),
            ..Default::default()
        };

        let deployment = self.deployment(&name, &selector, metadata(Some(selector.clone()), None));
        let service = self.service(&selector, metadata(Some(self.service_labels(&selector)), self.service_annotations()));
        let service_account = ServiceAccount { metadata: metadata(None, None), ..Default::default() };
        let config_map = ConfigMap {
            metadata: metadata(Some(selector.clone()), None),
            data: Some(BTreeMap::from([(ENVOY_CONFIG_KEY.to_owned(), self.bootstrap.document.clone())])),
            ..Default::default()
        };

        vec![
            ProxyObject::Deployment(Box::new(deployment)),
            ProxyObject::Service(service),
            ProxyObject::ServiceAccount(service_account),
            ProxyObject::ConfigMap(config_map),
        ]
    }

    fn selector_labels(&self, name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (NAME_LABEL.to_owned(), name.to_owned()),
            (INSTANCE_LABEL.to_owned(), self.gateway.name.to_owned()),
            (GATEWAY_NAME_LABEL.to_owned(), self.gateway.name.to_owned()),
            (GLOO_LABEL.to_owned(), GLOO_LABEL_VALUE.to_owned()),
        ])
    }

    /// Extra labels never replace selector labels.
    fn with_selector(selector: &BTreeMap<String, String>, extra: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
        let mut labels = extra.cloned().unwrap_or_default();
        labels.extend(selector.clone());
        labels
    }

    fn deployment(&self, name: &str, selector: &BTreeMap<String, String>, metadata: ObjectMeta) -> Deployment {
        let pod = self.config.pod_template.clone().unwrap_or_default();
        let replicas = self.config.deployment.as_ref().and_then(|d| d.replicas).unwrap_or(DEFAULT_REPLICAS);

        let mut annotations = pod.extra_annotations;
        if let Some(stats) = StatsSettings::resolve(self.config, self.inputs) {
            annotations.insert(SCRAPE_ANNOTATION.to_owned(), "true".to_owned());
            annotations.insert(SCRAPE_PORT_ANNOTATION.to_owned(), stats.port.to_string());
            annotations.insert(SCRAPE_PATH_ANNOTATION.to_owned(), METRICS_PATH.to_owned());
        }

        let pod_spec = PodSpec {
            containers: self.pod.containers.clone(),
            volumes: Some(self.pod.volumes.clone()),
            service_account_name: Some(name.to_owned()),
            security_context: pod.security_context,
            image_pull_secrets: (!pod.image_pull_secrets.is_empty()).then_some(pod.image_pull_secrets),
            node_selector: (!pod.node_selector.is_empty()).then_some(pod.node_selector),
            affinity: pod.affinity,
            tolerations: (!pod.tolerations.is_empty()).then_some(pod.tolerations),
            ..Default::default()
        };

        Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector { match_labels: Some(selector.clone()), ..Default::default() },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(Self::with_selector(selector, Some(&pod.extra_labels))),
                        annotations: (!annotations.is_empty()).then_some(annotations),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn service_labels(&self, selector: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        Self::with_selector(selector, self.config.service.as_ref().map(|s| &s.extra_labels))
    }

    fn service_annotations(&self) -> Option<BTreeMap<String, String>> {
        self.config.service.as_ref().map(|s| s.extra_annotations.clone()).filter(|a| !a.is_empty())
    }

    fn service(&self, selector: &BTreeMap<String, String>, metadata: ObjectMeta) -> Service {
        let config = self.config.service.clone().unwrap_or_default();
        let ports = self
            .ports
            .iter()
            .map(|p| ServicePort {
                name: Some(p.name()),
                port: p.port,
                target_port: Some(IntOrString::Int(p.target_port)),
                protocol: Some("TCP".to_owned()),
                ..Default::default()
            })
            .collect();

        Service {
            metadata,
            spec: Some(ServiceSpec {
                type_: Some(config.service_type.unwrap_or_default().to_string()),
                cluster_ip: config.cluster_ip.filter(|ip| !ip.is_empty()),
                selector: Some(selector.clone()),
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
