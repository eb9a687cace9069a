use crate::{
    admission::Admission,
    core::{Ledger, Provisioner},
    k8s::{AccessControlPolicy, IngressClass},
    metrics::{self, AdmissionMetrics},
    seed, KubeMiddlewares, Policies, Reviewer,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "acp-controller",
    about = "Binds ingresses to access control policies"
)]
pub struct Args {
    #[clap(long, default_value = "acp=info,warn", env = "ACP_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// The maximum number of ingresses that may be bound to access control
    /// policies at once.
    #[clap(long, default_value = "100")]
    max_policy_bindings: u32,

    /// The base URL of the auth server that middlewares forward requests to.
    #[clap(
        long,
        default_value = "http://hub-agent-auth-server.hub-agent.svc.cluster.local"
    )]
    auth_server_url: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            max_policy_bindings,
            auth_server_url,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let ledger = Ledger::new(max_policy_bindings);

        let mut prom = <Registry>::default();
        let acp = prom.sub_registry_with_prefix("acp");
        metrics::register_quota(acp, ledger.clone());
        let admission_metrics = AdmissionMetrics::register(acp);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        // Existing bindings must be counted, and the classes known, before
        // any review is admitted.
        let classes = seed::seed(runtime.client(), &ledger).await?;

        // Spawn resource watches.

        let ingress_classes = runtime.watch_all::<IngressClass>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(classes.index(), ingress_classes)
                .instrument(info_span!("ingressclasses")),
        );

        let policies = Policies::default();
        let acps = runtime.watch_all::<AccessControlPolicy>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(policies.index(), acps)
                .instrument(info_span!("accesscontrolpolicies")),
        );

        let provisioner = Provisioner::new(KubeMiddlewares::new(runtime.client()), auth_server_url);
        let reviewer = Arc::new(Reviewer::new(classes, policies, provisioner, ledger));
        let admission = Admission::new(reviewer, admission_metrics);
        let runtime = runtime.spawn_server(move || admission.clone());

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
