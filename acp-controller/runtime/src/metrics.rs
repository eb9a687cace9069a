use crate::core::Ledger;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};

/// Reports the quota ledger's capacity and usage at scrape time.
#[derive(Debug)]
struct Quota(Ledger);

#[derive(Clone, Debug)]
pub struct AdmissionMetrics {
    reviews: Family<ReviewLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReviewLabels {
    result: &'static str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReviewResult {
    /// The resource is not handled by this controller.
    Skipped,
    Allowed,
    Patched,
    Denied,
    Invalid,
}

pub fn register_quota(reg: &mut Registry, ledger: Ledger) {
    reg.register_collector(Box::new(Quota(ledger)));
}

impl Collector for Quota {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let capacity_encoder = encoder.encode_descriptor(
            "quota_capacity",
            "The maximum number of concurrent access control policy bindings",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(i64::from(self.0.capacity())).encode(capacity_encoder)?;

        let bindings_encoder = encoder.encode_descriptor(
            "quota_bindings",
            "The number of access control policy bindings held",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(i64::from(self.0.total())).encode(bindings_encoder)?;

        Ok(())
    }
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reviews = Family::default();
        reg.register(
            "admission_reviews",
            "Count of admission reviews by result",
            reviews.clone(),
        );
        Self { reviews }
    }

    pub fn record(&self, result: ReviewResult) {
        let labels = ReviewLabels {
            result: result.as_str(),
        };
        self.reviews.get_or_create(&labels).inc();
    }
}

// === impl ReviewResult ===

impl ReviewResult {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Allowed => "allowed",
            Self::Patched => "patched",
            Self::Denied => "denied",
            Self::Invalid => "invalid",
        }
    }
}
