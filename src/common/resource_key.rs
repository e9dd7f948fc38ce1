// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::fmt::Display;

use gateway_api::apis::standard::gateways::Gateway;
use kube::{Resource, ResourceExt};
use serde::Deserialize;

use crate::crds::GatewayParameters;

pub const DEFAULT_NAMESPACE_NAME: &str = "default";

/// Identifies one object in the object store.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize)]
pub struct ResourceKey {
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_group() -> String {
    GatewayParameters::group(&()).into_owned()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE_NAME.to_owned()
}

fn default_kind() -> String {
    GatewayParameters::kind(&()).into_owned()
}

impl ResourceKey {
    /// Key of a `GatewayParameters` object.
    pub fn parameters(name: &str, namespace: &str) -> Self {
        Self { name: name.to_owned(), namespace: namespace.to_owned(), ..Default::default() }
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self { group: default_group(), namespace: default_namespace(), name: String::default(), kind: default_kind() }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} {}.{}", self.group, self.kind, self.namespace, self.name)
    }
}

impl From<&Gateway> for ResourceKey {
    fn from(value: &Gateway) -> Self {
        let namespace = value.meta().namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        Self { group: Gateway::group(&()).into_owned(), namespace, name: value.name_any(), kind: Gateway::kind(&()).into_owned() }
    }
}

impl From<&GatewayParameters> for ResourceKey {
    fn from(value: &GatewayParameters) -> Self {
        let namespace = value.meta().namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        Self::parameters(&value.name_any(), &namespace)
    }
}
