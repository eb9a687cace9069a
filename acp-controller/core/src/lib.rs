#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod binding;
pub mod chain;
pub mod class;
pub mod middleware;
pub mod policy;
pub mod quota;

pub use self::{
    binding::{BindingTransition, InvalidPolicyRef, PolicyRef},
    class::ResolveClass,
    middleware::{MiddlewareRef, MiddlewareStore, Provisioner},
    policy::{AuthKind, GetPolicy},
    quota::{Ledger, QuotaExceeded, Transaction},
};

/// Binds a routing resource to an access control policy (`name@namespace`).
pub const POLICY_ANNOTATION: &str = "hub.traefik.io/access-control-policy";

/// Holds the comma-separated, ordered list of router middlewares.
pub const MIDDLEWARES_ANNOTATION: &str = "traefik.ingress.kubernetes.io/router.middlewares";

/// The controller type, as named by `IngressClass` resources, whose routing
/// resources are reviewed.
pub const TRAEFIK_CONTROLLER: &str = "traefik.io/ingress-controller";

/// Failures that abort a review. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to resolve ingress controller: {0:#}")]
    ClassResolution(anyhow::Error),

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    #[error("access control policy {0} not found")]
    PolicyNotFound(PolicyRef),

    #[error("failed to get access control policy {policy}: {error:#}")]
    PolicyLookup {
        policy: PolicyRef,
        error: anyhow::Error,
    },

    #[error("failed to provision middleware {name} in namespace {namespace}: {error:#}")]
    Provisioning {
        namespace: String,
        name: String,
        error: anyhow::Error,
    },

    #[error("failed to decode {0}")]
    Decode(String),
}

impl From<InvalidPolicyRef> for Error {
    fn from(error: InvalidPolicyRef) -> Self {
        Self::Decode(error.to_string())
    }
}
