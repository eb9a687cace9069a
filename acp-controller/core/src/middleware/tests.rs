use super::*;
use acp_controller_k8s_api::{
    middleware::{AddPrefix, ClientTls},
    policy::{BasicAuthConfig, DigestAuthConfig, JwtConfig},
};
use maplit::btreemap;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

#[derive(Default)]
struct Store {
    middlewares: Mutex<BTreeMap<(String, String), Middleware>>,
    writes: Mutex<usize>,
}

#[async_trait::async_trait]
impl MiddlewareStore for Store {
    async fn get(&self, ns: &str, name: &str) -> anyhow::Result<Option<Middleware>> {
        let key = (ns.to_string(), name.to_string());
        Ok(self.middlewares.lock().get(&key).cloned())
    }

    async fn create(&self, ns: &str, middleware: Middleware) -> anyhow::Result<()> {
        let key = (ns.to_string(), middleware.metadata.name.clone().unwrap());
        let mut middlewares = self.middlewares.lock();
        anyhow::ensure!(!middlewares.contains_key(&key), "already exists");
        middlewares.insert(key, middleware);
        *self.writes.lock() += 1;
        Ok(())
    }

    async fn replace(&self, ns: &str, middleware: Middleware) -> anyhow::Result<()> {
        let key = (ns.to_string(), middleware.metadata.name.clone().unwrap());
        let mut middlewares = self.middlewares.lock();
        anyhow::ensure!(middlewares.contains_key(&key), "not found");
        middlewares.insert(key, middleware);
        *self.writes.lock() += 1;
        Ok(())
    }
}

impl Store {
    fn forward_auth(&self, ns: &str, name: &str) -> Option<ForwardAuth> {
        let key = (ns.to_string(), name.to_string());
        self.middlewares
            .lock()
            .get(&key)
            .and_then(|m| m.spec.forward_auth.clone())
    }

    fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

fn jwt(config: JwtConfig) -> AccessControlPolicySpec {
    AccessControlPolicySpec {
        jwt: Some(config),
        ..Default::default()
    }
}

fn policy() -> PolicyRef {
    PolicyRef::new("my-policy", "test")
}

#[test]
fn names_middleware() {
    let mref = MiddlewareRef::new("apps", &policy());
    assert_eq!(mref.namespace(), "apps");
    assert_eq!(mref.name(), "zz-my-policy-test");
    assert_eq!(mref.chain_entry(), "apps-zz-my-policy-test@kubernetescrd");
}

#[test]
fn jwt_headers() {
    let kind = AuthKind::Jwt(JwtConfig {
        forward_headers: btreemap! {
            "fwdHeader".to_string() => "claim".to_string(),
        },
        ..Default::default()
    });
    assert_eq!(auth_response_headers(&kind), vec!["fwdHeader"]);

    let kind = AuthKind::Jwt(JwtConfig {
        strip_authorization_header: true,
        ..Default::default()
    });
    assert_eq!(auth_response_headers(&kind), vec!["Authorization"]);

    let kind = AuthKind::Jwt(JwtConfig {
        strip_authorization_header: true,
        forward_headers: btreemap! {
            "X-User".to_string() => "sub".to_string(),
            "Authorization".to_string() => "token".to_string(),
        },
        ..Default::default()
    });
    assert_eq!(auth_response_headers(&kind), vec!["Authorization", "X-User"]);
}

#[test]
fn basic_and_digest_headers() {
    let kind = AuthKind::BasicAuth(BasicAuthConfig {
        strip_authorization_header: true,
        forward_username_header: "User".to_string(),
        ..Default::default()
    });
    assert_eq!(auth_response_headers(&kind), vec!["User", "Authorization"]);

    let kind = AuthKind::DigestAuth(DigestAuthConfig {
        forward_username_header: "User".to_string(),
        ..Default::default()
    });
    assert_eq!(auth_response_headers(&kind), vec!["User"]);

    let kind = AuthKind::DigestAuth(DigestAuthConfig::default());
    assert!(auth_response_headers(&kind).is_empty());
}

#[tokio::test]
async fn creates_middleware() {
    let provisioner = Provisioner::new(Store::default(), "http://auth.example/");
    let config = jwt(JwtConfig {
        forward_headers: btreemap! {
            "fwdHeader".to_string() => "claim".to_string(),
        },
        ..Default::default()
    });

    let mref = provisioner
        .provision("test", &policy(), &config)
        .await
        .unwrap();
    assert_eq!(mref, MiddlewareRef::new("test", &policy()));

    let store = provisioner.store();
    assert_eq!(
        store.forward_auth("test", "zz-my-policy-test"),
        Some(ForwardAuth {
            address: "http://auth.example/my-policy@test".to_string(),
            auth_response_headers: vec!["fwdHeader".to_string()],
            ..Default::default()
        })
    );
    let created = store
        .get("test", "zz-my-policy-test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        created.metadata.labels,
        Some(btreemap! { MANAGED_BY_LABEL.to_string() => MANAGED_BY.to_string() })
    );
}

#[tokio::test]
async fn updates_owned_fields_only() {
    let store = Store::default();
    store
        .create(
            "test",
            Middleware {
                metadata: ObjectMeta {
                    name: Some("zz-my-policy-test".to_string()),
                    namespace: Some("test".to_string()),
                    ..Default::default()
                },
                spec: MiddlewareSpec {
                    forward_auth: Some(ForwardAuth {
                        address: "http://old".to_string(),
                        trust_forward_header: true,
                        auth_response_headers: vec!["fwdHeader".to_string()],
                        tls: Some(ClientTls {
                            ca_secret: "ca".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    add_prefix: Some(AddPrefix {
                        prefix: "/api".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            },
        )
        .await
        .unwrap();

    let provisioner = Provisioner::new(store, "http://auth");
    let config = AccessControlPolicySpec {
        basic_auth: Some(BasicAuthConfig {
            strip_authorization_header: true,
            ..Default::default()
        }),
        ..Default::default()
    };
    provisioner
        .provision("test", &policy(), &config)
        .await
        .unwrap();

    let updated = provisioner
        .store()
        .get("test", "zz-my-policy-test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        updated.spec,
        MiddlewareSpec {
            forward_auth: Some(ForwardAuth {
                address: "http://auth/my-policy@test".to_string(),
                trust_forward_header: true,
                auth_response_headers: vec!["Authorization".to_string()],
                tls: Some(ClientTls {
                    ca_secret: "ca".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            add_prefix: Some(AddPrefix {
                prefix: "/api".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn update_keeps_unmodeled_fields() {
    let store = Store::default();
    let existing: Middleware = serde_json::from_value(serde_json::json!({
        "apiVersion": "traefik.containo.us/v1alpha1",
        "kind": "Middleware",
        "metadata": {
            "name": "zz-my-policy-test",
            "namespace": "test",
        },
        "spec": {
            "forwardAuth": {
                "address": "http://old",
                "addAuthCookiesToResponse": ["session"],
            },
            "stripPrefix": {
                "prefixes": ["/a"],
                "forceSlash": true,
            },
            "headers": {
                "customRequestHeaders": { "X-Script-Name": "test" },
            },
            "rateLimit": { "average": 100 },
        },
    }))
    .unwrap();
    store.create("test", existing).await.unwrap();

    let provisioner = Provisioner::new(store, "http://auth");
    provisioner
        .provision("test", &policy(), &jwt(JwtConfig::default()))
        .await
        .unwrap();
    assert_eq!(provisioner.store().writes(), 2);

    let updated = provisioner
        .store()
        .get("test", "zz-my-policy-test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        serde_json::to_value(&updated.spec).unwrap(),
        serde_json::json!({
            "forwardAuth": {
                "address": "http://auth/my-policy@test",
                "addAuthCookiesToResponse": ["session"],
            },
            "stripPrefix": {
                "prefixes": ["/a"],
                "forceSlash": true,
            },
            "headers": {
                "customRequestHeaders": { "X-Script-Name": "test" },
            },
            "rateLimit": { "average": 100 },
        })
    );
}

#[tokio::test]
async fn identical_inputs_do_not_write() {
    let provisioner = Provisioner::new(Store::default(), "http://auth");
    let config = jwt(JwtConfig::default());

    provisioner
        .provision("test", &policy(), &config)
        .await
        .unwrap();
    provisioner
        .provision("test", &policy(), &config)
        .await
        .unwrap();
    assert_eq!(provisioner.store().writes(), 1);
}

#[tokio::test]
async fn unsupported_policy_creates_nothing() {
    let provisioner = Provisioner::new(Store::default(), "http://auth");

    let mref = provisioner
        .provision("test", &policy(), &AccessControlPolicySpec::default())
        .await
        .unwrap();
    assert_eq!(mref.chain_entry(), "test-zz-my-policy-test@kubernetescrd");
    assert_eq!(provisioner.store().writes(), 0);
}
