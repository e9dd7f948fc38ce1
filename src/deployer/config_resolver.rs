// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::time::Duration;

use async_trait::async_trait;
use kube::{Api, Client};
use tracing::{debug, warn};

use super::{DeployerError, merge::Merge};
use crate::{
    common::ResourceKey,
    crds::{EnvironmentType, GatewayParameters, KubernetesProxyConfig},
};

const TARGET: &str = super::TARGET;

/// Namespaced lookup of `GatewayParameters`. `Ok(None)` means the object does not exist.
#[async_trait]
pub trait ProxyConfigLookup: Send + Sync {
    async fn get(&self, key: &ResourceKey) -> crate::Result<Option<GatewayParameters>>;
}

#[derive(Clone)]
pub struct KubeProxyConfigLookup {
    client: Client,
}

impl KubeProxyConfigLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProxyConfigLookup for KubeProxyConfigLookup {
    async fn get(&self, key: &ResourceKey) -> crate::Result<Option<GatewayParameters>> {
        let api: Api<GatewayParameters> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EffectiveEnvironment {
    KubeManaged(Box<KubernetesProxyConfig>),
    SelfManaged,
}

pub struct ConfigResolver<'a, L> {
    pub lookup: &'a L,
    pub timeout: Duration,
}

impl<L: ProxyConfigLookup> ConfigResolver<'_, L> {
    /// Merges the override, when one is named, over the default.
    pub async fn resolve(&self, default: &ResourceKey, overrides: Option<&ResourceKey>) -> Result<EffectiveEnvironment, DeployerError> {
        let default_parameters = self.fetch(default).await?;
        let override_parameters = match overrides {
            Some(key) => Some(self.fetch(key).await?),
            None => None,
        };

        let default_environment = default_parameters.spec.environment_type();
        let override_environment = override_parameters.as_ref().and_then(|p| p.spec.environment_type());

        let environment = match (default_environment, override_environment) {
            (_, Some(EnvironmentType::SelfManaged)) => EffectiveEnvironment::SelfManaged,
            (Some(EnvironmentType::KubeManaged(default)), Some(EnvironmentType::KubeManaged(overrides))) => {
                EffectiveEnvironment::KubeManaged(Box::new(default.clone().merge(overrides.clone())?))
            },
            (_, Some(EnvironmentType::KubeManaged(overrides))) => EffectiveEnvironment::KubeManaged(Box::new(overrides.clone())),
            (Some(EnvironmentType::SelfManaged), None) => EffectiveEnvironment::SelfManaged,
            (Some(EnvironmentType::KubeManaged(default)), None) => EffectiveEnvironment::KubeManaged(Box::new(default.clone())),
            (None, None) => EffectiveEnvironment::KubeManaged(Box::default()),
        };
        debug!(target: TARGET, "Resolved environment for default {} override {:?}", default, overrides.map(ToString::to_string));
        Ok(environment)
    }

    async fn fetch(&self, key: &ResourceKey) -> Result<GatewayParameters, DeployerError> {
        match tokio::time::timeout(self.timeout, self.lookup.get(key)).await {
            Ok(Ok(Some(parameters))) => Ok(parameters),
            Ok(Ok(None)) => {
                warn!(target: TARGET, "Configuration not found {key}");
                Err(DeployerError::ConfigurationNotFound(key.clone()))
            },
            Ok(Err(source)) => Err(DeployerError::ObjectStore { key: key.clone(), source }),
            Err(elapsed) => Err(DeployerError::ObjectStore { key: key.clone(), source: Box::new(elapsed) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::{Request, Response};
    use kube::client::Body;
    use tower_test::mock;

    use super::*;
    use crate::deployer::test::InMemoryLookup;

    const DEFAULT: &str = r"
apiVersion: gateway.gloo.solo.io/v1alpha1
kind: GatewayParameters
metadata:
  name: gloo-gateway
  namespace: gloo-system
spec:
  kube:
    deployment:
      replicas: 2
    envoyContainer:
      image:
        repository: envoy
        tag: v1
";

    fn resolver(lookup: &InMemoryLookup) -> ConfigResolver<'_, InMemoryLookup> {
        ConfigResolver { lookup, timeout: Duration::from_secs(1) }
    }

    fn default_key() -> ResourceKey {
        ResourceKey::parameters("gloo-gateway", "gloo-system")
    }

    #[tokio::test]
    async fn test_default_only() {
        let lookup = InMemoryLookup::from_yaml(&[DEFAULT]);
        let environment = resolver(&lookup).resolve(&default_key(), None).await.unwrap();
        let EffectiveEnvironment::KubeManaged(config) = environment else { panic!("expected kube managed") };
        assert_eq!(config.deployment.and_then(|d| d.replicas), Some(2));
    }

    #[tokio::test]
    async fn test_override_merges_over_default() {
        let lookup = InMemoryLookup::from_yaml(&[
            DEFAULT,
            r"
apiVersion: gateway.gloo.solo.io/v1alpha1
kind: GatewayParameters
metadata:
  name: three-replicas
  namespace: default
spec:
  kube:
    deployment:
      replicas: 3
",
        ]);
        let overrides = ResourceKey::parameters("three-replicas", "default");
        let environment = resolver(&lookup).resolve(&default_key(), Some(&overrides)).await.unwrap();
        let EffectiveEnvironment::KubeManaged(config) = environment else { panic!("expected kube managed") };
        assert_eq!(config.deployment.as_ref().and_then(|d| d.replicas), Some(3));
        assert_eq!(config.envoy_container.and_then(|c| c.image).and_then(|i| i.tag).as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_self_managed_override_wins() {
        let lookup = InMemoryLookup::from_yaml(&[
            DEFAULT,
            r"
apiVersion: gateway.gloo.solo.io/v1alpha1
kind: GatewayParameters
metadata:
  name: self-managed
  namespace: default
spec:
  selfManaged: {}
",
        ]);
        let overrides = ResourceKey::parameters("self-managed", "default");
        let environment = resolver(&lookup).resolve(&default_key(), Some(&overrides)).await.unwrap();
        assert_eq!(environment, EffectiveEnvironment::SelfManaged);
    }

    #[tokio::test]
    async fn test_kube_override_over_self_managed_default() {
        let lookup = InMemoryLookup::from_yaml(&[
            r"
apiVersion: gateway.gloo.solo.io/v1alpha1
kind: GatewayParameters
metadata:
  name: gloo-gateway
  namespace: gloo-system
spec:
  selfManaged: {}
",
            r"
apiVersion: gateway.gloo.solo.io/v1alpha1
kind: GatewayParameters
metadata:
  name: kube
  namespace: default
spec:
  kube:
    deployment:
      replicas: 4
",
        ]);
        let environment = resolver(&lookup).resolve(&default_key(), None).await.unwrap();
        assert_eq!(environment, EffectiveEnvironment::SelfManaged);

        let environment = resolver(&lookup).resolve(&default_key(), Some(&ResourceKey::parameters("kube", "default"))).await.unwrap();
        let EffectiveEnvironment::KubeManaged(config) = environment else { panic!("expected kube managed") };
        assert_eq!(config.deployment.and_then(|d| d.replicas), Some(4));
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let lookup = InMemoryLookup::from_yaml(&[DEFAULT]);
        let missing = ResourceKey::parameters("missing", "default");
        let result = resolver(&lookup).resolve(&default_key(), Some(&missing)).await;
        assert!(matches!(result, Err(DeployerError::ConfigurationNotFound(key)) if key == missing));

        let lookup = InMemoryLookup::from_yaml(&[]);
        let result = resolver(&lookup).resolve(&default_key(), None).await;
        assert!(matches!(result, Err(DeployerError::ConfigurationNotFound(key)) if key == default_key()));
    }

    #[tokio::test]
    async fn test_empty_spec_is_kube_managed() {
        let lookup = InMemoryLookup::from_yaml(&[r"
apiVersion: gateway.gloo.solo.io/v1alpha1
kind: GatewayParameters
metadata:
  name: gloo-gateway
  namespace: gloo-system
spec: {}
"]);
        let environment = resolver(&lookup).resolve(&default_key(), None).await.unwrap();
        assert_eq!(environment, EffectiveEnvironment::KubeManaged(Box::default()));
    }

    #[tokio::test]
    async fn test_kube_lookup_not_found() {
        let (mock_service, mut handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("request");
            assert_eq!(request.uri().path(), "/apis/gateway.gloo.solo.io/v1alpha1/namespaces/gloo-system/gatewayparameters/gloo-gateway");
            let status = serde_json::json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": "gatewayparameters.gateway.gloo.solo.io \"gloo-gateway\" not found",
                "reason": "NotFound",
                "code": 404
            });
            let response = Response::builder().status(404).body(Body::from(serde_json::to_vec(&status).unwrap())).unwrap();
            send.send_response(response);
        });

        let lookup = KubeProxyConfigLookup::new(client);
        let result = ConfigResolver { lookup: &lookup, timeout: Duration::from_secs(5) }.resolve(&default_key(), None).await;
        assert!(matches!(result, Err(DeployerError::ConfigurationNotFound(_))));
    }

    #[tokio::test]
    async fn test_kube_lookup_found() {
        let (mock_service, mut handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        tokio::spawn(async move {
            let (_request, send) = handle.next_request().await.expect("request");
            let parameters: GatewayParameters = serde_yaml::from_str(DEFAULT).unwrap();
            let response = Response::builder().status(200).body(Body::from(serde_json::to_vec(&parameters).unwrap())).unwrap();
            send.send_response(response);
        });

        let lookup = KubeProxyConfigLookup::new(client);
        let environment = ConfigResolver { lookup: &lookup, timeout: Duration::from_secs(5) }.resolve(&default_key(), None).await.unwrap();
        let EffectiveEnvironment::KubeManaged(config) = environment else { panic!("expected kube managed") };
        assert_eq!(config.deployment.and_then(|d| d.replicas), Some(2));
    }

    struct FailingLookup {
        unreachable: ResourceKey,
        inner: InMemoryLookup,
    }

    #[async_trait]
    impl ProxyConfigLookup for FailingLookup {
        async fn get(&self, key: &ResourceKey) -> crate::Result<Option<GatewayParameters>> {
            if *key == self.unreachable {
                return Err("connection refused".into());
            }
            self.inner.get(key).await
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_carries_the_key() {
        let overrides = ResourceKey::parameters("three-replicas", "default");
        let lookup = FailingLookup { unreachable: overrides.clone(), inner: InMemoryLookup::from_yaml(&[DEFAULT]) };
        let resolver = ConfigResolver { lookup: &lookup, timeout: Duration::from_secs(1) };

        let result = resolver.resolve(&default_key(), Some(&overrides)).await;
        let Err(DeployerError::ObjectStore { key, source }) = result else { panic!("expected object store error") };
        assert_eq!(key, overrides);
        assert_eq!(source.to_string(), "connection refused");

        let lookup = FailingLookup { unreachable: default_key(), inner: InMemoryLookup::from_yaml(&[DEFAULT]) };
        let resolver = ConfigResolver { lookup: &lookup, timeout: Duration::from_secs(1) };
        let result = resolver.resolve(&default_key(), None).await;
        assert!(matches!(result, Err(DeployerError::ObjectStore { key, .. }) if key == default_key()));
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_object_store_error() {
        let (mock_service, _handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let lookup = KubeProxyConfigLookup::new(client);
        let result = ConfigResolver { lookup: &lookup, timeout: Duration::from_millis(50) }.resolve(&default_key(), None).await;
        assert!(matches!(result, Err(DeployerError::ObjectStore { key, .. }) if key == default_key()));
    }
}
