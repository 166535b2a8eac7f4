use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use crate::tags::Tags;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd)]
pub enum Kind {
    Gauge,
    Sum,
    Histogram,
    Summary,
}

impl Kind {
    /// The Prometheus `TYPE` of this kind
    pub const fn as_str(&self) -> &'static str {
        match self {
            Kind::Gauge => "gauge",
            Kind::Sum => "counter",
            Kind::Histogram => "histogram",
            Kind::Summary => "summary",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Bucket {
    pub upper: f64,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Quantile {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum MetricValue {
    Sum(f64),
    Gauge(f64),
    Histogram {
        count: u64,
        sum: f64,
        buckets: Vec<Bucket>,
    },
    Summary {
        count: u64,
        sum: f64,
        quantiles: Vec<Quantile>,
    },
}

impl MetricValue {
    pub fn kind(&self) -> Kind {
        match self {
            MetricValue::Sum(_) => Kind::Sum,
            MetricValue::Gauge(_) => Kind::Gauge,
            MetricValue::Histogram { .. } => Kind::Histogram,
            MetricValue::Summary { .. } => Kind::Summary,
        }
    }

    /// Returns the value of a gauge or sum
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Sum(v) | MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd)]
pub struct MetricSeries {
    pub name: String,
    pub tags: Tags,
}

/// A single observation, it is immutable once produced.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct Metric {
    pub series: MetricSeries,

    pub description: Option<Cow<'static, str>>,

    pub value: MetricValue,
}

impl Display for Metric {
    /// Display a metric using something like Prometheus's text format
    ///
    /// ```text
    /// redis_db_keys{db="db0"} 10
    /// ```
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{}", self.name())?;

        if !self.series.tags.is_empty() {
            write!(fmt, "{{")?;

            for (i, (k, v)) in self.series.tags.iter().enumerate() {
                if i != 0 {
                    write!(fmt, ",")?;
                }
                write!(fmt, "{k}=\"{v}\"")?;
            }

            write!(fmt, "}}")?;
        }

        match &self.value {
            MetricValue::Sum(v) | MetricValue::Gauge(v) => write!(fmt, " {v}"),
            MetricValue::Histogram { count, sum, .. } | MetricValue::Summary { count, sum, .. } => {
                write!(fmt, " count={count} sum={sum}")
            }
        }
    }
}

pub trait IntoF64 {
    fn into_f64(self) -> f64;
}

macro_rules! impl_intof64 {
    ($typ:ident) => {
        impl IntoF64 for $typ {
            #[inline]
            fn into_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_intof64!(usize);
impl_intof64!(i64);
impl_intof64!(u64);
impl_intof64!(f64);
impl_intof64!(u32);
impl_intof64!(i32);
impl_intof64!(f32);

impl IntoF64 for bool {
    #[inline]
    fn into_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }
}

impl IntoF64 for std::time::Duration {
    #[inline]
    fn into_f64(self) -> f64 {
        self.as_secs_f64()
    }
}

impl Metric {
    #[inline]
    pub fn new(
        name: impl Into<String>,
        description: Option<Cow<'static, str>>,
        tags: Tags,
        value: MetricValue,
    ) -> Self {
        Self {
            series: MetricSeries {
                name: name.into(),
                tags,
            },
            description,
            value,
        }
    }

    #[inline]
    pub fn gauge<N, D, V>(name: N, desc: D, v: V) -> Metric
    where
        N: Into<String>,
        D: Into<Cow<'static, str>>,
        V: IntoF64,
    {
        Self::new(
            name,
            Some(desc.into()),
            Tags::default(),
            MetricValue::Gauge(v.into_f64()),
        )
    }

    #[inline]
    pub fn gauge_with_tags<N, D, V>(name: N, desc: D, value: V, tags: Tags) -> Metric
    where
        N: Into<String>,
        D: Into<Cow<'static, str>>,
        V: IntoF64,
    {
        Self::new(
            name,
            Some(desc.into()),
            tags,
            MetricValue::Gauge(value.into_f64()),
        )
    }

    #[inline]
    pub fn sum<N, D, V>(name: N, desc: D, v: V) -> Metric
    where
        N: Into<String>,
        D: Into<Cow<'static, str>>,
        V: IntoF64,
    {
        Self::new(
            name,
            Some(desc.into()),
            Tags::default(),
            MetricValue::Sum(v.into_f64()),
        )
    }

    #[inline]
    pub fn sum_with_tags<N, D, V>(name: N, desc: D, value: V, tags: Tags) -> Metric
    where
        N: Into<String>,
        D: Into<Cow<'static, str>>,
        V: IntoF64,
    {
        Self::new(
            name,
            Some(desc.into()),
            tags,
            MetricValue::Sum(value.into_f64()),
        )
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.series.name
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.value.kind()
    }

    #[inline]
    pub fn tags(&self) -> &Tags {
        &self.series.tags
    }

    #[inline]
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.series.tags.get(name)
    }

    #[inline]
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tags;

    #[test]
    fn gauge() {
        let m = Metric::gauge("name", "desc", 1);
        assert_eq!(m.name(), "name");
        assert_eq!(m.description(), "desc");
        assert_eq!(m.value, MetricValue::Gauge(1.0));
        assert_eq!(m.kind(), Kind::Gauge);
    }

    #[test]
    fn sum() {
        let m = Metric::sum_with_tags("name", "desc", 2, tags!("foo" => "bar"));
        assert_eq!(m.name(), "name");
        assert_eq!(m.value, MetricValue::Sum(2.0));
        assert_eq!(m.tag_value("foo"), Some("bar"));
        assert_eq!(m.kind().as_str(), "counter");
    }

    #[test]
    fn display() {
        let m = Metric::gauge_with_tags(
            "redis_db_keys",
            "Total number of keys by DB",
            10,
            tags!("db" => "db0", "extra" => "x"),
        );

        assert_eq!(m.to_string(), r#"redis_db_keys{db="db0",extra="x"} 10"#);
    }
}
