#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ingress;
pub mod middleware;
pub mod policy;

pub use self::{
    ingress::{DecodeError, RoutingResource},
    middleware::{ForwardAuth, Middleware, MiddlewareSpec},
    policy::{AccessControlPolicy, AccessControlPolicySpec},
};
pub use k8s_openapi::api::{
    self,
    networking::v1::{Ingress, IngressClass, IngressClassSpec},
};
pub use kube::{
    api::{Api, ObjectMeta, PostParams, ResourceExt},
    core::{DynamicObject, GroupVersionKind},
    Client, Error, Resource,
};

/// Identifies the process that writes dependent resources.
pub const MANAGED_BY: &str = "acp-controller";

/// The label used to mark resources written by this controller.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
