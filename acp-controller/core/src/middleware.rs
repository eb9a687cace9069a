//! Provisions the forward-auth middleware that enforces a bound policy.

use crate::{AuthKind, Error, PolicyRef};
use acp_controller_k8s_api::{
    policy::AccessControlPolicySpec, ForwardAuth, Middleware, MiddlewareSpec, ObjectMeta,
    MANAGED_BY, MANAGED_BY_LABEL,
};
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// The Traefik provider that serves `Middleware` resources.
const PROVIDER: &str = "kubernetescrd";

const AUTHORIZATION: &str = "Authorization";

/// Reads and writes `Middleware` resources.
#[async_trait::async_trait]
pub trait MiddlewareStore {
    async fn get(&self, ns: &str, name: &str) -> anyhow::Result<Option<Middleware>>;

    async fn create(&self, ns: &str, middleware: Middleware) -> anyhow::Result<()>;

    async fn replace(&self, ns: &str, middleware: Middleware) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl<T: MiddlewareStore + Send + Sync + ?Sized> MiddlewareStore for Arc<T> {
    async fn get(&self, ns: &str, name: &str) -> anyhow::Result<Option<Middleware>> {
        (**self).get(ns, name).await
    }

    async fn create(&self, ns: &str, middleware: Middleware) -> anyhow::Result<()> {
        (**self).create(ns, middleware).await
    }

    async fn replace(&self, ns: &str, middleware: Middleware) -> anyhow::Result<()> {
        (**self).replace(ns, middleware).await
    }
}

/// Names the middleware enforcing a policy on routing resources in a
/// namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiddlewareRef {
    namespace: String,
    name: String,
    chain_entry: String,
}

/// Creates or updates forward-auth middlewares.
#[derive(Clone, Debug)]
pub struct Provisioner<S> {
    store: S,
    auth_server_url: String,
}

// === impl MiddlewareRef ===

impl MiddlewareRef {
    pub fn new(ingress_ns: &str, policy: &PolicyRef) -> Self {
        let name = format!("zz-{}-{}", policy.name, policy.namespace);
        let chain_entry = format!("{ingress_ns}-{name}@{PROVIDER}");
        Self {
            namespace: ingress_ns.to_string(),
            name,
            chain_entry,
        }
    }

    /// The namespace the middleware lives in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The middleware resource's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The reference used in a routing resource's middleware chain.
    pub fn chain_entry(&self) -> &str {
        &self.chain_entry
    }
}

/// Lists the auth server response headers a middleware forwards to the
/// backend for the given authentication method.
pub fn auth_response_headers(kind: &AuthKind) -> Vec<String> {
    match kind {
        AuthKind::Jwt(jwt) => {
            let mut headers = jwt.forward_headers.keys().cloned().collect::<Vec<_>>();
            if jwt.strip_authorization_header
                && !headers.iter().any(|h| h.eq_ignore_ascii_case(AUTHORIZATION))
            {
                headers.push(AUTHORIZATION.to_string());
            }
            headers
        }
        AuthKind::BasicAuth(basic) => user_headers(
            &basic.forward_username_header,
            basic.strip_authorization_header,
        ),
        AuthKind::DigestAuth(digest) => user_headers(
            &digest.forward_username_header,
            digest.strip_authorization_header,
        ),
    }
}

fn user_headers(username_header: &str, strip_authorization: bool) -> Vec<String> {
    let mut headers = Vec::new();
    if !username_header.is_empty() {
        headers.push(username_header.to_string());
    }
    if strip_authorization {
        headers.push(AUTHORIZATION.to_string());
    }
    headers
}

// === impl Provisioner ===

impl<S: MiddlewareStore> Provisioner<S> {
    pub fn new(store: S, auth_server_url: impl Into<String>) -> Self {
        Self {
            store,
            auth_server_url: auth_server_url.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ensures that the middleware enforcing `policy` on routing resources in
    /// `ingress_ns` matches the policy's configuration.
    ///
    /// Policies that configure no supported authentication method get no
    /// middleware. Existing middlewares are only written when their
    /// forward-auth address or response headers differ; other fields are
    /// preserved.
    pub async fn provision(
        &self,
        ingress_ns: &str,
        policy: &PolicyRef,
        config: &AccessControlPolicySpec,
    ) -> Result<MiddlewareRef, Error> {
        let mref = MiddlewareRef::new(ingress_ns, policy);

        let Some(kind) = AuthKind::from_spec(config) else {
            info!(%policy, "Policy configures no supported authentication method; skipping middleware");
            return Ok(mref);
        };

        let address = self.address(policy);
        let headers = auth_response_headers(&kind);
        let failed = |error| Error::Provisioning {
            namespace: mref.namespace.clone(),
            name: mref.name.clone(),
            error,
        };

        match self
            .store
            .get(&mref.namespace, &mref.name)
            .await
            .map_err(failed)?
        {
            None => {
                let middleware = Middleware {
                    metadata: ObjectMeta {
                        name: Some(mref.name.clone()),
                        namespace: Some(mref.namespace.clone()),
                        labels: Some(
                            [(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string())]
                                .into_iter()
                                .collect(),
                        ),
                        ..Default::default()
                    },
                    spec: MiddlewareSpec {
                        forward_auth: Some(ForwardAuth {
                            address,
                            auth_response_headers: headers,
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                };
                self.store
                    .create(&mref.namespace, middleware)
                    .await
                    .map_err(failed)?;
                info!(ns = %mref.namespace, name = %mref.name, kind = kind.name(), "Created middleware");
            }

            Some(mut middleware) => {
                let forward_auth = middleware.spec.forward_auth.get_or_insert_with(Default::default);
                if forward_auth.address == address && forward_auth.auth_response_headers == headers
                {
                    debug!(ns = %mref.namespace, name = %mref.name, "Middleware up to date");
                    return Ok(mref);
                }

                forward_auth.address = address;
                forward_auth.auth_response_headers = headers;
                self.store
                    .replace(&mref.namespace, middleware)
                    .await
                    .map_err(failed)?;
                info!(ns = %mref.namespace, name = %mref.name, kind = kind.name(), "Updated middleware");
            }
        }

        Ok(mref)
    }

    fn address(&self, policy: &PolicyRef) -> String {
        format!("{}/{}", self.auth_server_url.trim_end_matches('/'), policy)
    }
}
