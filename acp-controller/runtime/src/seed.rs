//! Rebuilds the quota ledger from the bindings that exist when the
//! controller starts.

use crate::{
    core::{binding, Ledger, TRAEFIK_CONTROLLER},
    k8s::{Api, Client, Ingress, IngressClass, ResourceExt, RoutingResource},
    review::classify,
    IngressClasses,
};
use anyhow::Result;
use kube::api::ListParams;
use tracing::{info, warn};

/// Lists the cluster's ingress classes and ingresses and records every
/// existing policy binding in `ledger`.
///
/// Returns the listed classes, which the `IngressClass` watch keeps current
/// from then on.
pub(crate) async fn seed(client: Client, ledger: &Ledger) -> Result<IngressClasses> {
    let classes = Api::<IngressClass>::all(client.clone())
        .list(&ListParams::default())
        .await?;
    let ingresses = Api::<Ingress>::all(client)
        .list(&ListParams::default())
        .await?;

    let classes = IngressClasses::from_list(classes.items);
    let seeded = seed_from(&classes, ingresses.items, ledger);
    info!(seeded, total = ledger.total(), "Seeded policy bindings");
    Ok(classes)
}

fn seed_from(
    classes: &IngressClasses,
    ingresses: impl IntoIterator<Item = Ingress>,
    ledger: &Ledger,
) -> usize {
    let mut seeded = 0;
    for ingress in ingresses {
        let resource = routing_resource(ingress);
        match classify(classes, &resource, TRAEFIK_CONTROLLER) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(error) => {
                warn!(ns = %resource.namespace, name = %resource.name, %error, "Skipping ingress");
                continue;
            }
        }

        let policy = match binding::current(&resource) {
            Ok(Some(policy)) => policy,
            Ok(None) => continue,
            Err(error) => {
                warn!(ns = %resource.namespace, name = %resource.name, %error, "Skipping ingress");
                continue;
            }
        };

        match ledger.seed(&binding::binding_id(&resource, &policy)) {
            Ok(()) => seeded += 1,
            Err(error) => warn!(%error, "Existing binding exceeds quota"),
        }
    }
    seeded
}

fn routing_resource(ingress: Ingress) -> RoutingResource {
    RoutingResource {
        namespace: ingress.namespace().unwrap_or_default(),
        name: ingress.name_any(),
        annotations: ingress.metadata.annotations.unwrap_or_default(),
        class_name: ingress
            .spec
            .and_then(|spec| spec.ingress_class_name)
            .filter(|name| !name.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::POLICY_ANNOTATION,
        k8s::{api::networking::v1::IngressSpec, IngressClassSpec, ObjectMeta},
    };
    use kubert::index::IndexClusterResource;
    use maplit::btreemap;

    fn ingress(name: &str, class: Option<&str>, policy: Option<&str>) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                namespace: Some("test".to_string()),
                name: Some(name.to_string()),
                annotations: policy.map(|p| {
                    btreemap! { POLICY_ANNOTATION.to_string() => p.to_string() }
                }),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                ingress_class_name: class.map(ToString::to_string),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn classes() -> IngressClasses {
        let class = |name: &str, controller: &str| IngressClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(IngressClassSpec {
                controller: Some(controller.to_string()),
                ..Default::default()
            }),
        };
        IngressClasses::from_list([
            class("traefik", TRAEFIK_CONTROLLER),
            class("nginx", "k8s.io/ingress-nginx"),
        ])
    }

    #[test]
    fn seeds_bindings_of_handled_ingresses() {
        let ledger = Ledger::new(10);
        let seeded = seed_from(
            &classes(),
            [
                ingress("a", Some("traefik"), Some("my-policy@test")),
                ingress("b", Some("traefik"), Some("my-policy")),
                ingress("c", Some("traefik"), None),
                ingress("d", Some("nginx"), Some("my-policy@test")),
                ingress("e", None, Some("my-policy@test")),
                ingress("f", Some("traefik"), Some("@")),
            ],
            &ledger,
        );

        assert_eq!(seeded, 2);
        assert_eq!(ledger.total(), 2);
        assert_eq!(ledger.count("test/a/my-policy@test"), 1);
        assert_eq!(ledger.count("test/b/my-policy@test"), 1);
    }

    #[test]
    fn listed_classes_resolve_until_watch_updates() {
        let default_class = |name: &str, controller: &str| IngressClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                annotations: Some(btreemap! {
                    "ingressclass.kubernetes.io/is-default-class".to_string() => "true".to_string(),
                }),
                ..Default::default()
            },
            spec: Some(IngressClassSpec {
                controller: Some(controller.to_string()),
                ..Default::default()
            }),
        };

        let ledger = Ledger::new(10);
        let classes = IngressClasses::from_list([default_class("traefik", TRAEFIK_CONTROLLER)]);
        let seeded = seed_from(
            &classes,
            [ingress("a", None, Some("my-policy@test"))],
            &ledger,
        );
        assert_eq!(seeded, 1);

        let resource = routing_resource(ingress("b", None, None));
        assert!(classify(&classes, &resource, TRAEFIK_CONTROLLER).unwrap());

        // The watch replaces the listed state through the shared index.
        let index = classes.index();
        IndexClusterResource::<IngressClass>::delete(&mut *index.write(), "traefik".to_string());
        index
            .write()
            .apply(default_class("nginx", "k8s.io/ingress-nginx"));
        assert!(!classify(&classes, &resource, TRAEFIK_CONTROLLER).unwrap());
    }

    #[test]
    fn stops_at_capacity() {
        let ledger = Ledger::new(1);
        let seeded = seed_from(
            &classes(),
            [
                ingress("a", Some("traefik"), Some("my-policy@test")),
                ingress("b", Some("traefik"), Some("my-policy@test")),
            ],
            &ledger,
        );
        assert_eq!(seeded, 1);
        assert_eq!(ledger.total(), 1);
        assert_eq!(ledger.open_transactions(), 0);
    }
}
