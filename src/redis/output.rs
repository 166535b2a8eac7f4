use std::borrow::Cow;

use event::tags::Tags;
use event::{Bucket, IntoF64, Metric, MetricValue, Quantile};

use super::registry::{Descriptor, Kind, Registry, parse_value};

/// Collects the observations of one scrape.
///
/// Series are looked up in the descriptor catalog by name, label values
/// are positional and zipped with the label names of the descriptor.
pub struct Output<'a> {
    registry: &'a Registry,
    namespace: &'a str,
    metrics: Vec<Metric>,
}

impl<'a> Output<'a> {
    pub fn new(registry: &'a Registry, namespace: &'a str) -> Self {
        Self {
            registry,
            namespace,
            metrics: Vec::with_capacity(512),
        }
    }

    fn name(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.namespace, name)
        }
    }

    fn lookup(&self, name: &str, labels: &[&str]) -> Option<(&'a Descriptor, Tags)> {
        let Some(descriptor) = self.registry.descriptor(name) else {
            warn!(message = "metric is not declared", metric = name);
            return None;
        };

        debug_assert_eq!(
            descriptor.labels.len(),
            labels.len(),
            "label values of {name} do not match its descriptor"
        );

        let tags = descriptor
            .labels
            .iter()
            .zip(labels)
            .map(|(k, v)| (*k, *v))
            .collect::<Tags>();

        Some((descriptor, tags))
    }

    /// Emit a gauge or counter declared in the catalog.
    pub fn emit(&mut self, name: &str, value: impl IntoF64, labels: &[&str]) {
        let Some((descriptor, tags)) = self.lookup(name, labels) else {
            return;
        };

        let value = match descriptor.kind {
            Kind::Gauge => MetricValue::Gauge(value.into_f64()),
            Kind::Counter => MetricValue::Sum(value.into_f64()),
            Kind::Summary | Kind::Histogram => {
                warn!(message = "metric is not a gauge or counter", metric = name);
                return;
            }
        };

        self.metrics.push(Metric::new(
            self.name(descriptor.name),
            Some(Cow::Borrowed(descriptor.help)),
            tags,
            value,
        ));
    }

    /// Resolve a raw `field:value` pair with the field tables, returns false
    /// if the field is unknown or the value is not a number.
    pub fn field(&mut self, field: &str, value: &str) -> bool {
        let Some(mapping) = self.registry.resolve(field) else {
            return false;
        };

        let Some(value) = parse_value(value) else {
            debug!(message = "drop unparsable field", field, value);
            return false;
        };

        self.emit(mapping.name, value * mapping.scale, &[]);
        true
    }

    pub fn summary(
        &mut self,
        name: &str,
        count: u64,
        sum: f64,
        quantiles: Vec<Quantile>,
        labels: &[&str],
    ) {
        let Some((descriptor, tags)) = self.lookup(name, labels) else {
            return;
        };

        self.metrics.push(Metric::new(
            self.name(descriptor.name),
            Some(Cow::Borrowed(descriptor.help)),
            tags,
            MetricValue::Summary {
                count,
                sum,
                quantiles,
            },
        ));
    }

    pub fn histogram(
        &mut self,
        name: &str,
        count: u64,
        sum: f64,
        buckets: Vec<Bucket>,
        labels: &[&str],
    ) {
        let Some((descriptor, tags)) = self.lookup(name, labels) else {
            return;
        };

        self.metrics.push(Metric::new(
            self.name(descriptor.name),
            Some(Cow::Borrowed(descriptor.help)),
            tags,
            MetricValue::Histogram {
                count,
                sum,
                buckets,
            },
        ));
    }

    /// Emit a gauge whose label set is only known at emission time, so a
    /// descriptor is synthesized on the fly.
    pub fn dynamic(&mut self, name: &str, help: &'static str, value: impl IntoF64, tags: Tags) {
        self.metrics.push(Metric::gauge_with_tags(
            self.name(name),
            help,
            value,
            tags,
        ));
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn into_metrics(self) -> Vec<Metric> {
        self.metrics
    }
}
