// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use k8s_openapi::{
    api::core::v1::{
        ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource, HTTPGetAction, ObjectFieldSelector,
        Probe, Volume, VolumeMount,
    },
    apimachinery::pkg::util::intstr::IntOrString,
};
use tracing::debug;

use super::{
    bootstrap::{Bootstrap, DEFAULT_LOG_LEVEL, ENVOY_CONFIG_DIRECTORY, READY_PATH, StatsSettings},
    ports::{self, ProxyPort},
};
use crate::{
    common::Inputs,
    crds::{AiExtension, Image, IstioContainer, KubernetesProxyConfig, PullPolicy, SdsContainer},
};

const TARGET: &str = super::TARGET;

pub const ENVOY_CONTAINER_NAME: &str = "gloo-gateway";
pub const SDS_CONTAINER_NAME: &str = "sds";
pub const ISTIO_CONTAINER_NAME: &str = "istio-proxy";
pub const AI_EXTENSION_CONTAINER_NAME: &str = "gloo-ai-extension";

pub const BOOTSTRAP_VOLUME_NAME: &str = "envoy-config";
pub const ISTIO_CERTS_VOLUME_NAME: &str = "istio-certs";
const ISTIO_CERTS_DIRECTORY: &str = "/etc/istio-certs";

const DEFAULT_REGISTRY: &str = "quay.io/solo-io";
const ENVOY_REPOSITORY: &str = "gloo-envoy-wrapper";
const SDS_REPOSITORY: &str = "sds";
const ISTIO_REGISTRY: &str = "docker.io/istio";
const ISTIO_REPOSITORY: &str = "proxyv2";
const AI_EXTENSION_REPOSITORY: &str = "gloo-ai-extension";

/// Renders `registry/repository[:tag|@digest]`.
///
/// A digest wins over a tag. Empty values count as unset, and with neither set the image is pinned to `build_version`.
pub fn image_reference(image: Option<&Image>, default_registry: &str, default_repository: &str, build_version: &str) -> String {
    let registry = image.and_then(|i| i.registry.as_deref()).unwrap_or(default_registry);
    let repository = image.and_then(|i| i.repository.as_deref()).unwrap_or(default_repository);
    let name = if registry.is_empty() { repository.to_owned() } else { format!("{registry}/{repository}") };

    let tag = image.and_then(|i| i.tag.as_deref()).filter(|t| !t.is_empty());
    let digest = image.and_then(|i| i.digest.as_deref()).filter(|d| !d.is_empty());
    match (tag, digest) {
        (_, Some(digest)) => format!("{name}@{digest}"),
        (Some(tag), None) => format!("{name}:{tag}"),
        (None, None) => format!("{name}:{build_version}"),
    }
}

fn pull_policy(image: Option<&Image>) -> String {
    image.and_then(|i| i.pull_policy).unwrap_or(PullPolicy::Always).to_string()
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar { name: name.to_owned(), value: Some(value.into()), ..Default::default() }
}

fn field_ref_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector { field_path: field_path.to_owned(), ..Default::default() }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container_port(name: String, port: i32) -> ContainerPort {
    ContainerPort { name: Some(name), container_port: port, protocol: Some("TCP".to_owned()), ..Default::default() }
}

fn certs_mount() -> VolumeMount {
    VolumeMount { name: ISTIO_CERTS_VOLUME_NAME.to_owned(), mount_path: ISTIO_CERTS_DIRECTORY.to_owned(), ..Default::default() }
}

#[derive(Debug, Default)]
pub struct PodContainers {
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
}

pub struct ContainerAssembler<'a> {
    pub proxy_name: &'a str,
    pub config: &'a KubernetesProxyConfig,
    pub inputs: &'a Inputs,
    pub ports: &'a [ProxyPort],
    pub bootstrap: &'a Bootstrap,
}

impl ContainerAssembler<'_> {
    /// Primary container first, then sds, istio and the AI extension when configured.
    pub fn assemble(&self) -> PodContainers {
        let sds = self.config.sds_container.as_ref();
        let istio = self.istio_container();
        let ai_extension = self.config.ai_extension.as_ref().filter(|ai| ai.enabled == Some(true));

        let mut containers = vec![self.envoy_container()];
        if let Some(sds) = sds {
            containers.push(self.sds_container(sds, istio.is_some()));
        }
        if let Some(istio) = istio {
            containers.push(self.istio_proxy_container(istio));
        }
        if let Some(ai_extension) = ai_extension {
            containers.push(self.ai_extension_container(ai_extension));
        }

        let mut volumes = vec![Volume {
            name: BOOTSTRAP_VOLUME_NAME.to_owned(),
            config_map: Some(ConfigMapVolumeSource { name: self.proxy_name.to_owned(), ..Default::default() }),
            ..Default::default()
        }];
        if sds.is_some() || istio.is_some() {
            volumes.push(Volume {
                name: ISTIO_CERTS_VOLUME_NAME.to_owned(),
                empty_dir: Some(EmptyDirVolumeSource { medium: Some("Memory".to_owned()), ..Default::default() }),
                ..Default::default()
            });
        }

        debug!(target: TARGET, "Assembled {} containers for {}", containers.len(), self.proxy_name);
        PodContainers { containers, volumes }
    }

    fn istio_container(&self) -> Option<&IstioContainer> {
        if !self.inputs.istio_integration_enabled {
            return None;
        }
        self.config.istio.as_ref().and_then(|i| i.istio_proxy_container.as_ref())
    }

    fn envoy_container(&self) -> Container {
        let envoy = self.config.envoy_container.clone().unwrap_or_default();
        let stats = StatsSettings::resolve(self.config, self.inputs);

        let mut ports: Vec<ContainerPort> =
            ports::target_ports(self.ports).into_iter().map(|port| container_port(format!("listener-{port}"), port)).collect();
        let readiness_probe = stats.as_ref().map(|stats| {
            ports.push(container_port("http-monitoring".to_owned(), stats.port));
            Probe {
                http_get: Some(HTTPGetAction {
                    path: Some(READY_PATH.to_owned()),
                    port: IntOrString::Int(stats.port),
                    ..Default::default()
                }),
                initial_delay_seconds: Some(5),
                period_seconds: Some(10),
                failure_threshold: Some(2),
                ..Default::default()
            }
        });

        let mut volume_mounts = vec![VolumeMount {
            name: BOOTSTRAP_VOLUME_NAME.to_owned(),
            mount_path: ENVOY_CONFIG_DIRECTORY.to_owned(),
            ..Default::default()
        }];
        if self.config.sds_container.is_some() {
            volume_mounts.push(certs_mount());
        }

        Container {
            name: ENVOY_CONTAINER_NAME.to_owned(),
            image: Some(image_reference(envoy.image.as_ref(), DEFAULT_REGISTRY, ENVOY_REPOSITORY, &self.inputs.build_version)),
            image_pull_policy: Some(pull_policy(envoy.image.as_ref())),
            args: Some(self.bootstrap.envoy_args.clone()),
            env: Some(vec![field_ref_env("POD_NAME", "metadata.name"), field_ref_env("POD_NAMESPACE", "metadata.namespace")]),
            ports: Some(ports),
            readiness_probe,
            security_context: envoy.security_context,
            resources: envoy.resources,
            volume_mounts: Some(volume_mounts),
            ..Default::default()
        }
    }

    fn sds_container(&self, sds: &SdsContainer, istio_enabled: bool) -> Container {
        let log_level =
            sds.bootstrap.as_ref().and_then(|b| b.log_level.as_deref()).filter(|l| !l.is_empty()).unwrap_or(DEFAULT_LOG_LEVEL);
        Container {
            name: SDS_CONTAINER_NAME.to_owned(),
            image: Some(image_reference(sds.image.as_ref(), DEFAULT_REGISTRY, SDS_REPOSITORY, &self.inputs.build_version)),
            image_pull_policy: Some(pull_policy(sds.image.as_ref())),
            env: Some(vec![
                field_ref_env("POD_NAME", "metadata.name"),
                field_ref_env("POD_NAMESPACE", "metadata.namespace"),
                env("LOG_LEVEL", log_level),
                env("ISTIO_MTLS_SDS_ENABLED", istio_enabled.to_string()),
            ]),
            security_context: sds.security_context.clone(),
            resources: sds.resources.clone(),
            volume_mounts: Some(vec![certs_mount()]),
            ..Default::default()
        }
    }

    fn istio_proxy_container(&self, istio: &IstioContainer) -> Container {
        let mut env_vars = Vec::new();
        if let Some(address) = istio.istio_discovery_address.as_deref() {
            env_vars.push(env("PROXY_CONFIG", format!("{{\"discoveryAddress\": \"{address}\"}}")));
        }
        if let Some(mesh_id) = istio.istio_meta_mesh_id.as_deref() {
            env_vars.push(env("ISTIO_META_MESH_ID", mesh_id));
        }
        if let Some(cluster_id) = istio.istio_meta_cluster_id.as_deref() {
            env_vars.push(env("ISTIO_META_CLUSTER_ID", cluster_id));
        }
        let log_level = istio.log_level.as_deref().filter(|l| !l.is_empty()).unwrap_or("warning");

        Container {
            name: ISTIO_CONTAINER_NAME.to_owned(),
            image: Some(image_reference(istio.image.as_ref(), ISTIO_REGISTRY, ISTIO_REPOSITORY, &self.inputs.build_version)),
            image_pull_policy: Some(pull_policy(istio.image.as_ref())),
            args: Some(vec!["proxy".to_owned(), "sidecar".to_owned(), "--proxyLogLevel".to_owned(), log_level.to_owned()]),
            env: Some(env_vars),
            security_context: istio.security_context.clone(),
            resources: istio.resources.clone(),
            volume_mounts: Some(vec![certs_mount()]),
            ..Default::default()
        }
    }

    fn ai_extension_container(&self, ai_extension: &AiExtension) -> Container {
        Container {
            name: AI_EXTENSION_CONTAINER_NAME.to_owned(),
            image: Some(image_reference(
                ai_extension.image.as_ref(),
                DEFAULT_REGISTRY,
                AI_EXTENSION_REPOSITORY,
                &self.inputs.build_version,
            )),
            image_pull_policy: Some(pull_policy(ai_extension.image.as_ref())),
            env: (!ai_extension.env.is_empty()).then(|| ai_extension.env.clone()),
            ports: (!ai_extension.ports.is_empty()).then(|| ai_extension.ports.clone()),
            security_context: ai_extension.security_context.clone(),
            resources: ai_extension.resources.clone(),
            ..Default::default()
        }
    }
}
