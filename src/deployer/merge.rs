// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Field by field merge of an override configuration over a default one.
//!
//! * optional scalars are taken from the override only when the override sets them
//! * maps are unioned, the override wins on key collisions
//! * lists are replaced wholesale by a non-empty override
//! * embedded Kubernetes types are merged recursively on their JSON form with the same rules

use std::collections::BTreeMap;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::crds::{
    AiExtension, EnvoyBootstrap, EnvoyContainer, Image, IstioContainer, IstioIntegration, KubernetesProxyConfig, Pod, ProxyDeployment,
    SdsBootstrap, SdsContainer, ServiceConfig, StatsConfig,
};

pub type MergeResult<T> = std::result::Result<T, serde_json::Error>;

pub trait Merge: Sized {
    fn merge(self, overrides: Self) -> MergeResult<Self>;
}

pub fn merge_scalar<T>(default: Option<T>, overrides: Option<T>) -> Option<T> {
    overrides.or(default)
}

pub fn merge_nested<T: Merge>(default: Option<T>, overrides: Option<T>) -> MergeResult<Option<T>> {
    Ok(match (default, overrides) {
        (Some(default), Some(overrides)) => Some(default.merge(overrides)?),
        (default, None) => default,
        (None, overrides) => overrides,
    })
}

pub fn merge_map(mut default: BTreeMap<String, String>, overrides: BTreeMap<String, String>) -> BTreeMap<String, String> {
    default.extend(overrides);
    default
}

pub fn merge_list<T>(default: Vec<T>, overrides: Vec<T>) -> Vec<T> {
    if overrides.is_empty() { default } else { overrides }
}

pub fn merge_kube<T: Serialize + DeserializeOwned>(default: Option<T>, overrides: Option<T>) -> MergeResult<Option<T>> {
    match (default, overrides) {
        (Some(default), Some(overrides)) => {
            let merged = merge_values(serde_json::to_value(default)?, serde_json::to_value(overrides)?);
            Ok(Some(serde_json::from_value(merged)?))
        },
        (default, None) => Ok(default),
        (None, overrides) => Ok(overrides),
    }
}

fn merge_values(default: Value, overrides: Value) -> Value {
    match (default, overrides) {
        (Value::Object(mut default), Value::Object(overrides)) => {
            for (key, value) in overrides {
                if value.is_null() {
                    continue;
                }
                let merged = match default.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                default.insert(key, merged);
            }
            Value::Object(default)
        },
        (default, Value::Null) => default,
        (default, Value::Array(overrides)) if overrides.is_empty() => default,
        (_, overrides) => overrides,
    }
}

impl Merge for KubernetesProxyConfig {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            deployment: merge_nested(self.deployment, overrides.deployment)?,
            envoy_container: merge_nested(self.envoy_container, overrides.envoy_container)?,
            sds_container: merge_nested(self.sds_container, overrides.sds_container)?,
            pod_template: merge_nested(self.pod_template, overrides.pod_template)?,
            service: merge_nested(self.service, overrides.service)?,
            istio: merge_nested(self.istio, overrides.istio)?,
            stats: merge_nested(self.stats, overrides.stats)?,
            ai_extension: merge_nested(self.ai_extension, overrides.ai_extension)?,
        })
    }
}

impl Merge for ProxyDeployment {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self { replicas: merge_scalar(self.replicas, overrides.replicas) })
    }
}

impl Merge for Image {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            registry: merge_scalar(self.registry, overrides.registry),
            repository: merge_scalar(self.repository, overrides.repository),
            tag: merge_scalar(self.tag, overrides.tag),
            digest: merge_scalar(self.digest, overrides.digest),
            pull_policy: merge_scalar(self.pull_policy, overrides.pull_policy),
        })
    }
}

impl Merge for EnvoyBootstrap {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            log_level: merge_scalar(self.log_level, overrides.log_level),
            component_log_levels: merge_map(self.component_log_levels, overrides.component_log_levels),
        })
    }
}

impl Merge for EnvoyContainer {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            bootstrap: merge_nested(self.bootstrap, overrides.bootstrap)?,
            image: merge_nested(self.image, overrides.image)?,
            security_context: merge_kube(self.security_context, overrides.security_context)?,
            resources: merge_kube(self.resources, overrides.resources)?,
        })
    }
}

impl Merge for SdsBootstrap {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self { log_level: merge_scalar(self.log_level, overrides.log_level) })
    }
}

impl Merge for SdsContainer {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            image: merge_nested(self.image, overrides.image)?,
            security_context: merge_kube(self.security_context, overrides.security_context)?,
            resources: merge_kube(self.resources, overrides.resources)?,
            bootstrap: merge_nested(self.bootstrap, overrides.bootstrap)?,
        })
    }
}

impl Merge for IstioIntegration {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self { istio_proxy_container: merge_nested(self.istio_proxy_container, overrides.istio_proxy_container)? })
    }
}

impl Merge for IstioContainer {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            image: merge_nested(self.image, overrides.image)?,
            security_context: merge_kube(self.security_context, overrides.security_context)?,
            resources: merge_kube(self.resources, overrides.resources)?,
            log_level: merge_scalar(self.log_level, overrides.log_level),
            istio_discovery_address: merge_scalar(self.istio_discovery_address, overrides.istio_discovery_address),
            istio_meta_mesh_id: merge_scalar(self.istio_meta_mesh_id, overrides.istio_meta_mesh_id),
            istio_meta_cluster_id: merge_scalar(self.istio_meta_cluster_id, overrides.istio_meta_cluster_id),
        })
    }
}

impl Merge for AiExtension {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            enabled: merge_scalar(self.enabled, overrides.enabled),
            image: merge_nested(self.image, overrides.image)?,
            security_context: merge_kube(self.security_context, overrides.security_context)?,
            resources: merge_kube(self.resources, overrides.resources)?,
            env: merge_list(self.env, overrides.env),
            ports: merge_list(self.ports, overrides.ports),
        })
    }
}

impl Merge for Pod {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            extra_labels: merge_map(self.extra_labels, overrides.extra_labels),
            extra_annotations: merge_map(self.extra_annotations, overrides.extra_annotations),
            security_context: merge_kube(self.security_context, overrides.security_context)?,
            image_pull_secrets: merge_list(self.image_pull_secrets, overrides.image_pull_secrets),
            node_selector: merge_map(self.node_selector, overrides.node_selector),
            affinity: merge_kube(self.affinity, overrides.affinity)?,
            tolerations: merge_list(self.tolerations, overrides.tolerations),
        })
    }
}

impl Merge for ServiceConfig {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            service_type: merge_scalar(self.service_type, overrides.service_type),
            cluster_ip: merge_scalar(self.cluster_ip, overrides.cluster_ip),
            extra_labels: merge_map(self.extra_labels, overrides.extra_labels),
            extra_annotations: merge_map(self.extra_annotations, overrides.extra_annotations),
        })
    }
}

impl Merge for StatsConfig {
    fn merge(self, overrides: Self) -> MergeResult<Self> {
        Ok(Self {
            enabled: merge_scalar(self.enabled, overrides.enabled),
            route_prefix_rewrite: merge_scalar(self.route_prefix_rewrite, overrides.route_prefix_rewrite),
            enable_stats_route: merge_scalar(self.enable_stats_route, overrides.enable_stats_route),
            stats_route_prefix_rewrite: merge_scalar(self.stats_route_prefix_rewrite, overrides.stats_route_prefix_rewrite),
        })
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{PodSecurityContext, Toleration};

    use super::*;

    fn parse(m: &str) -> KubernetesProxyConfig {
        serde_yaml::from_str(m).unwrap()
    }

    #[test]
    fn test_scalars_fall_back_to_default() {
        let default = parse(
            r"
deployment:
  replicas: 2
envoyContainer:
  image:
    registry: r
    repository: p
    tag: t
",
        );
        let overrides = parse(
            r"
deployment:
  replicas: 3
envoyContainer:
  image:
    tag: ''
",
        );
        let merged = default.merge(overrides).unwrap();
        assert_eq!(merged.deployment.unwrap().replicas, Some(3));
        let image = merged.envoy_container.unwrap().image.unwrap();
        assert_eq!(image.registry.as_deref(), Some("r"));
        assert_eq!(image.repository.as_deref(), Some("p"));
        assert_eq!(image.tag.as_deref(), Some(""));
    }

    #[test]
    fn test_maps_are_unioned() {
        let default = parse(
            r"
envoyContainer:
  bootstrap:
    componentLogLevels:
      router: info
      listener: warn
podTemplate:
  extraLabels:
    team: a
",
        );
        let overrides = parse(
            r"
envoyContainer:
  bootstrap:
    componentLogLevels:
      router: debug
      upstream: trace
podTemplate:
  extraLabels:
    tier: edge
",
        );
        let merged = default.merge(overrides).unwrap();
        let levels = merged.envoy_container.unwrap().bootstrap.unwrap().component_log_levels;
        assert_eq!(
            levels.into_iter().collect::<Vec<_>>(),
            vec![
                ("listener".to_owned(), "warn".to_owned()),
                ("router".to_owned(), "debug".to_owned()),
                ("upstream".to_owned(), "trace".to_owned())
            ]
        );
        let labels = merged.pod_template.unwrap().extra_labels;
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_lists_are_replaced() {
        let default = parse(
            r"
podTemplate:
  tolerations:
  - key: a
    operator: Exists
  - key: b
    operator: Exists
",
        );
        let overrides = parse(
            r"
podTemplate:
  tolerations:
  - key: c
    operator: Exists
",
        );
        let merged = default.clone().merge(overrides).unwrap();
        let tolerations: Vec<Toleration> = merged.pod_template.unwrap().tolerations;
        assert_eq!(tolerations.len(), 1);
        assert_eq!(tolerations[0].key.as_deref(), Some("c"));

        let merged = default.merge(parse("podTemplate: {}")).unwrap();
        assert_eq!(merged.pod_template.unwrap().tolerations.len(), 2);
    }

    #[test]
    fn test_kube_types_merge_recursively() {
        let default = parse(
            r"
podTemplate:
  securityContext:
    runAsUser: 1
    runAsGroup: 2
",
        );
        let overrides = parse(
            r"
podTemplate:
  securityContext:
    runAsUser: 3
",
        );
        let merged = default.merge(overrides).unwrap();
        let security_context: PodSecurityContext = merged.pod_template.unwrap().security_context.unwrap();
        assert_eq!(security_context.run_as_user, Some(3));
        assert_eq!(security_context.run_as_group, Some(2));
    }

    #[test]
    fn test_resources_merge_per_key() {
        let default = parse(
            r"
envoyContainer:
  resources:
    limits:
      cpu: 101m
      memory: 128Mi
",
        );
        let overrides = parse(
            r"
envoyContainer:
  resources:
    limits:
      cpu: 200m
",
        );
        let merged = default.merge(overrides).unwrap();
        let limits = merged.envoy_container.unwrap().resources.unwrap().limits.unwrap();
        assert_eq!(limits.get("cpu").map(|q| q.0.as_str()), Some("200m"));
        assert_eq!(limits.get("memory").map(|q| q.0.as_str()), Some("128Mi"));
    }
}
