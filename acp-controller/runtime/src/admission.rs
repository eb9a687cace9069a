use crate::{
    core::{GetPolicy, MiddlewareStore, ResolveClass},
    k8s::{DynamicObject, ResourceExt},
    metrics::{AdmissionMetrics, ReviewResult},
    review::{AdmissionRequest, Reviewer},
};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Serves admission reviews of routing resources.
pub struct Admission<C, P, S> {
    reviewer: Arc<Reviewer<C, P, S>>,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl<C, P, S> Clone for Admission<C, P, S> {
    fn clone(&self) -> Self {
        Self {
            reviewer: self.reviewer.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<C, P, S> tower::Service<Request<hyper::body::Incoming>> for Admission<C, P, S>
where
    C: ResolveClass + Send + Sync + 'static,
    P: GetPolicy + Send + Sync + 'static,
    S: MiddlewareStore + Send + Sync + 'static,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: AdmissionReview = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    admission.metrics.record(ReviewResult::Invalid);
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req).await
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    admission.metrics.record(ReviewResult::Invalid);
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl<C, P, S> Admission<C, P, S>
where
    C: ResolveClass,
    P: GetPolicy,
    S: MiddlewareStore,
{
    pub(crate) fn new(reviewer: Arc<Reviewer<C, P, S>>, metrics: AdmissionMetrics) -> Self {
        Self { reviewer, metrics }
    }

    async fn admit(&self, req: AdmissionRequest) -> AdmissionResponse {
        let (ns, name) = req
            .object
            .as_ref()
            .or(req.old_object.as_ref())
            .map(|obj| (obj.namespace(), obj.name_any()))
            .unwrap_or_default();
        let ns = ns.or_else(|| req.namespace.clone()).unwrap_or_default();
        let span = info_span!("review", %ns, %name, op = ?req.operation);

        let (rsp, result) = self.admit_inner(req).instrument(span).await;
        self.metrics.record(result);
        rsp
    }

    async fn admit_inner(&self, req: AdmissionRequest) -> (AdmissionResponse, ReviewResult) {
        let rsp = AdmissionResponse::from(&req);

        match self.reviewer.can_review(&req) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Resource is not handled by this controller");
                return (rsp, ReviewResult::Skipped);
            }
            Err(error) => {
                info!(%error, "Denying resource");
                return (rsp.deny(error), ReviewResult::Denied);
            }
        }

        let patch = match self.reviewer.review(&req).await {
            Ok(patch) => patch,
            Err(error) => {
                info!(%error, "Denying resource");
                return (rsp.deny(error), ReviewResult::Denied);
            }
        };

        let Some(patch) = patch else {
            return (rsp, ReviewResult::Allowed);
        };
        debug!(?patch);
        match rsp.with_patch(patch) {
            Ok(rsp) => (rsp, ReviewResult::Patched),
            Err(error) => {
                warn!(%error, "Failed to serialize patch");
                (
                    AdmissionResponse::from(&req).deny(error),
                    ReviewResult::Denied,
                )
            }
        }
    }
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}
