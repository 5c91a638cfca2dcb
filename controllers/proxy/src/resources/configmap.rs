//! ProxyConfig ConfigMap and `server.yaml` rendering
//!
//! The record is never modified: rendering borrows from it and builds a
//! separate serialization-ready view, so composed credentials are always
//! recomputed from `user`, `hostName` and `password`.

use super::{identity, owner_reference};
use crate::error::ConstructionError;
use crds::{AuthorityUser, PrivilegeType, Props, ProxyConfig, ProxyConfigSpec, RepositoryType};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::collections::BTreeMap;

/// ConfigMap key holding the rendered configuration
pub const CONFIG_MAP_KEY: &str = "server.yaml";

#[derive(Debug, Serialize)]
struct ServerYaml<'a> {
    mode: Mode<'a>,
    authority: RenderedAuthority,
    #[serde(skip_serializing_if = "Option::is_none")]
    props: Option<&'a Props>,
}

#[derive(Debug, Serialize)]
struct Mode<'a> {
    #[serde(rename = "type")]
    type_: &'a str,
    repository: Repository<'a>,
    overwrite: bool,
}

#[derive(Debug, Serialize)]
struct Repository<'a> {
    #[serde(rename = "type")]
    type_: RepositoryType,
    props: &'a Props,
}

#[derive(Debug, Serialize)]
struct RenderedAuthority {
    users: Vec<RenderedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    privilege: Option<RenderedPrivilege>,
}

#[derive(Debug, Serialize)]
struct RenderedUser {
    user: String,
}

#[derive(Debug, Serialize)]
struct RenderedPrivilege {
    #[serde(rename = "type")]
    type_: PrivilegeType,
}

/// `user@host:password` credential string
pub fn compose_credential(user: &AuthorityUser) -> String {
    format!("{}@{}:{}", user.user, user.host_name, user.password)
}

/// Renders the `server.yaml` document for a ProxyConfig spec
pub fn render_server_yaml(spec: &ProxyConfigSpec) -> Result<String, ConstructionError> {
    let cluster = &spec.cluster_config;
    let document = ServerYaml {
        mode: Mode {
            type_: &cluster.type_,
            repository: Repository {
                type_: cluster.repository.type_,
                props: &cluster.repository.props,
            },
            overwrite: cluster.overwrite,
        },
        authority: RenderedAuthority {
            users: spec.authority.users.iter()
                .map(|u| RenderedUser { user: compose_credential(u) })
                .collect(),
            privilege: spec.authority.privilege.as_ref()
                .map(|p| RenderedPrivilege { type_: p.type_ }),
        },
        props: spec.props.as_ref(),
    };
    Ok(serde_yaml::to_string(&document)?)
}

/// Builds the ConfigMap that should exist for a ProxyConfig
pub fn build_config_map(config: &ProxyConfig) -> Result<ConfigMap, ConstructionError> {
    let (namespace, name) = identity(config, "ProxyConfig")?;
    let server_yaml = render_server_yaml(&config.spec)?;

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            owner_references: Some(vec![owner_reference(config)]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(CONFIG_MAP_KEY.to_string(), server_yaml)])),
        ..Default::default()
    })
}
