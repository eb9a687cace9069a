use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Describes how requests to a routing resource must be authenticated.
///
/// At most one authentication block is expected to be set. The controller
/// never interprets the authentication settings themselves; it only derives
/// the shape of the forward-auth middleware from them.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hub.traefik.io",
    version = "v1alpha1",
    kind = "AccessControlPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlPolicySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_auth: Option<DigestAuthConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JwtConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signing_secret: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub signing_secret_base64_encoded: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jwks_file: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jwks_url: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strip_authorization_header: bool,

    /// Maps a request header name to the claim whose value it carries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub forward_headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_query_key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub claims: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strip_authorization_header: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub forward_username_header: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DigestAuthConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strip_authorization_header: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub forward_username_header: String,
}
