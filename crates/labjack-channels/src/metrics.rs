use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Prometheus counters for host command traffic.
#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub reads: IntCounter,
    pub writes: IntCounter,
    pub publishes: IntCounter,
    pub errors: IntCounter,
    pub vendor_errors: IntCounter,
    pub channels: IntGauge,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let reads = counter("lj_channel_reads", "Total channel read commands")?;
        let writes = counter("lj_channel_writes", "Total channel write commands, linked ones included")?;
        let publishes = counter("lj_channel_publishes", "Total values published to links")?;
        let errors = counter("lj_channel_errors", "Total failed channel commands")?;
        let vendor_errors = counter("lj_vendor_errors", "Total commands failed by the vendor library")?;
        let channels = IntGauge::new("lj_channels", "Number of channels created")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let _ = registry.register(Box::new(reads.clone()));
        let _ = registry.register(Box::new(writes.clone()));
        let _ = registry.register(Box::new(publishes.clone()));
        let _ = registry.register(Box::new(errors.clone()));
        let _ = registry.register(Box::new(vendor_errors.clone()));
        let _ = registry.register(Box::new(channels.clone()));
        Ok(Self {
            registry,
            reads,
            writes,
            publishes,
            errors,
            vendor_errors,
            channels,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
