#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use acp_controller_core as core;
pub use acp_controller_k8s_api as k8s;

mod admission;
mod args;
mod ingress_class;
mod metrics;
mod middlewares;
mod policies;
mod review;
mod seed;

pub use self::{
    admission::Admission,
    args::Args,
    ingress_class::IngressClasses,
    middlewares::KubeMiddlewares,
    policies::Policies,
    review::{classify, AdmissionRequest, Reviewer},
};
