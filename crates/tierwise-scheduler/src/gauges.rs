//! Named gauges on a Prometheus registry, added and retired as tiers come and go.

use parking_lot::RwLock;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use std::collections::BTreeMap;
use tracing::warn;

/// Gauges shared between the publisher and the scrape endpoint
#[derive(Default)]
pub struct GaugeRegistry {
    registry: Registry,
    gauges: RwLock<BTreeMap<String, IntGauge>>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gauge at 0. Returns false if it already exists or the
    /// name is not a valid metric name.
    pub fn register(&self, name: &str, help: &str) -> bool {
        let mut gauges = self.gauges.write();
        if gauges.contains_key(name) {
            return false;
        }

        let gauge = match IntGauge::new(name, help) {
            Ok(gauge) => gauge,
            Err(e) => {
                warn!("Cannot create gauge {}: {}", name, e);
                return false;
            }
        };
        if let Err(e) = self.registry.register(Box::new(gauge.clone())) {
            warn!("Cannot register gauge {}: {}", name, e);
            return false;
        }

        gauges.insert(name.to_string(), gauge);
        true
    }

    /// Set a registered gauge. Returns false for unknown names.
    pub fn set(&self, name: &str, value: i64) -> bool {
        match self.gauges.read().get(name) {
            Some(gauge) => {
                gauge.set(value);
                true
            }
            None => false,
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        let Some(gauge) = self.gauges.write().remove(name) else {
            return false;
        };
        if let Err(e) = self.registry.unregister(Box::new(gauge)) {
            warn!("Gauge {} was not on the registry: {}", name, e);
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.gauges.read().get(name).map(IntGauge::get)
    }

    pub fn names(&self) -> Vec<String> {
        self.gauges.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.read().is_empty()
    }

    /// Text exposition of every registered gauge
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
