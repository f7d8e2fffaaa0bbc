//! Per-probe Prometheus collectors (§4.C): each probe owns a small struct of
//! `*Vec` collectors labelled by `target`, registers them with the
//! process-wide registry on creation, and removes a target's label row when
//! that target drops out of its config.

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

use crate::error::MetricError;

const LABEL_TARGET: &str = "target";

fn register<T: prometheus::core::Collector + Clone + 'static>(
    registry: &Registry,
    name: &str,
    collector: T,
) -> Result<T, MetricError> {
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| MetricError::Register(name.to_string(), e))?;
    Ok(collector)
}

/// `sparrow_health_up{target} in {0,1}`.
#[derive(Clone)]
pub struct HealthCollectors {
    pub up: GaugeVec,
}

impl HealthCollectors {
    pub fn register(registry: &Registry) -> Result<Self, MetricError> {
        let up = register(
            registry,
            "sparrow_health_up",
            GaugeVec::new(
                Opts::new("sparrow_health_up", "1 if the target's last health check succeeded"),
                &[LABEL_TARGET],
            )?,
        )?;
        Ok(Self { up })
    }

    pub fn remove(&self, target: &str) -> Result<(), MetricError> {
        self.up
            .remove_label_values(&[target])
            .map_err(|_| MetricError::NotFound(vec![target.to_string()]))
    }
}

/// `sparrow_latency_seconds`, `sparrow_latency_count`, `sparrow_latency_duration`.
#[derive(Clone)]
pub struct LatencyCollectors {
    pub seconds: GaugeVec,
    pub count: CounterVec,
    pub duration: HistogramVec,
}

impl LatencyCollectors {
    pub fn register(registry: &Registry) -> Result<Self, MetricError> {
        let seconds = register(
            registry,
            "sparrow_latency_seconds",
            GaugeVec::new(
                Opts::new("sparrow_latency_seconds", "Latency of the most recent attempt"),
                &[LABEL_TARGET],
            )?,
        )?;
        let count = register(
            registry,
            "sparrow_latency_count",
            CounterVec::new(
                Opts::new("sparrow_latency_count", "Number of latency attempts made"),
                &[LABEL_TARGET],
            )?,
        )?;
        let duration = register(
            registry,
            "sparrow_latency_duration",
            HistogramVec::new(
                HistogramOpts::new("sparrow_latency_duration", "Distribution of latency attempt durations"),
                &[LABEL_TARGET],
            )?,
        )?;
        Ok(Self { seconds, count, duration })
    }

    pub fn remove(&self, target: &str) -> Result<(), MetricError> {
        let mut found = false;
        found |= self.seconds.remove_label_values(&[target]).is_ok();
        found |= self.count.remove_label_values(&[target]).is_ok();
        found |= self.duration.remove_label_values(&[target]).is_ok();
        if found {
            Ok(())
        } else {
            Err(MetricError::NotFound(vec![target.to_string()]))
        }
    }
}

/// DNS lookup gauge/counter/histogram, all labelled by target.
#[derive(Clone)]
pub struct DnsCollectors {
    pub seconds: GaugeVec,
    pub count: CounterVec,
    pub duration: HistogramVec,
}

impl DnsCollectors {
    pub fn register(registry: &Registry) -> Result<Self, MetricError> {
        let seconds = register(
            registry,
            "sparrow_dns_seconds",
            GaugeVec::new(
                Opts::new("sparrow_dns_seconds", "Duration of the most recent DNS lookup"),
                &[LABEL_TARGET],
            )?,
        )?;
        let count = register(
            registry,
            "sparrow_dns_count",
            CounterVec::new(Opts::new("sparrow_dns_count", "Number of DNS lookups performed"), &[LABEL_TARGET])?,
        )?;
        let duration = register(
            registry,
            "sparrow_dns_duration",
            HistogramVec::new(
                HistogramOpts::new("sparrow_dns_duration", "Distribution of DNS lookup durations"),
                &[LABEL_TARGET],
            )?,
        )?;
        Ok(Self { seconds, count, duration })
    }

    pub fn remove(&self, target: &str) -> Result<(), MetricError> {
        let mut found = false;
        found |= self.seconds.remove_label_values(&[target]).is_ok();
        found |= self.count.remove_label_values(&[target]).is_ok();
        found |= self.duration.remove_label_values(&[target]).is_ok();
        if found {
            Ok(())
        } else {
            Err(MetricError::NotFound(vec![target.to_string()]))
        }
    }
}

/// `sparrow_traceroute_minimum_hops{target}`.
#[derive(Clone)]
pub struct TracerouteCollectors {
    pub minimum_hops: GaugeVec,
}

impl TracerouteCollectors {
    pub fn register(registry: &Registry) -> Result<Self, MetricError> {
        let minimum_hops = register(
            registry,
            "sparrow_traceroute_minimum_hops",
            GaugeVec::new(
                Opts::new(
                    "sparrow_traceroute_minimum_hops",
                    "Smallest successful-path length seen in the most recent tick",
                ),
                &[LABEL_TARGET],
            )?,
        )?;
        Ok(Self { minimum_hops })
    }

    pub fn remove(&self, target: &str) -> Result<(), MetricError> {
        self.minimum_hops
            .remove_label_values(&[target])
            .map_err(|_| MetricError::NotFound(vec![target.to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_collector_removes_known_target() {
        let registry = Registry::new();
        let collectors = HealthCollectors::register(&registry).unwrap();
        collectors.up.with_label_values(&["example.com"]).set(1.0);
        assert!(collectors.remove("example.com").is_ok());
    }

    #[test]
    fn removing_unknown_target_is_an_error() {
        let registry = Registry::new();
        let collectors = HealthCollectors::register(&registry).unwrap();
        assert!(collectors.remove("never-seen").is_err());
    }

    #[test]
    fn latency_collectors_register_under_distinct_names() {
        let registry = Registry::new();
        let collectors = LatencyCollectors::register(&registry).unwrap();
        collectors.seconds.with_label_values(&["t"]).set(0.5);
        collectors.count.with_label_values(&["t"]).inc();
        collectors.duration.with_label_values(&["t"]).observe(0.5);
        assert!(collectors.remove("t").is_ok());
    }
}
