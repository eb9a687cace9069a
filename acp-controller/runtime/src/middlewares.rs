use crate::{
    core::MiddlewareStore,
    k8s::{Api, Client, Middleware, PostParams, ResourceExt},
};
use anyhow::Result;

/// Reads and writes `Middleware` resources through the Kubernetes API.
#[derive(Clone)]
pub struct KubeMiddlewares {
    client: Client,
}

// === impl KubeMiddlewares ===

impl KubeMiddlewares {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, ns: &str) -> Api<Middleware> {
        Api::namespaced(self.client.clone(), ns)
    }
}

#[async_trait::async_trait]
impl MiddlewareStore for KubeMiddlewares {
    async fn get(&self, ns: &str, name: &str) -> Result<Option<Middleware>> {
        let middleware = self.api(ns).get_opt(name).await?;
        Ok(middleware)
    }

    async fn create(&self, ns: &str, middleware: Middleware) -> Result<()> {
        self.api(ns)
            .create(&PostParams::default(), &middleware)
            .await?;
        Ok(())
    }

    async fn replace(&self, ns: &str, middleware: Middleware) -> Result<()> {
        let name = middleware.name_unchecked();
        self.api(ns)
            .replace(&name, &PostParams::default(), &middleware)
            .await?;
        Ok(())
    }
}
