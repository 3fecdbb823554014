use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub negotiations_total: IntCounterVec,
    pub loyalty_points_total: IntCounterVec,
    pub location_pings_total: IntCounterVec,
    pub change_events_total: IntCounterVec,
    pub kyc_decisions_total: IntCounterVec,
    pub tracking_sessions_active: IntGauge,
    pub rewards_queue_depth: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let negotiations_total = IntCounterVec::new(
            Opts::new("negotiations_total", "Negotiation operations by outcome"),
            &["outcome"],
        )
        .expect("valid negotiations_total metric");

        let loyalty_points_total = IntCounterVec::new(
            Opts::new("loyalty_points_total", "Loyalty points moved by transaction kind"),
            &["kind"],
        )
        .expect("valid loyalty_points_total metric");

        let location_pings_total = IntCounterVec::new(
            Opts::new("location_pings_total", "Recorded GPS pings by source"),
            &["source"],
        )
        .expect("valid location_pings_total metric");

        let change_events_total = IntCounterVec::new(
            Opts::new("change_events_total", "Published change events by table"),
            &["table"],
        )
        .expect("valid change_events_total metric");

        let kyc_decisions_total = IntCounterVec::new(
            Opts::new("kyc_decisions_total", "KYC decisions by resulting status"),
            &["decision"],
        )
        .expect("valid kyc_decisions_total metric");

        let tracking_sessions_active =
            IntGauge::new("tracking_sessions_active", "Currently running tracking sessions")
                .expect("valid tracking_sessions_active metric");

        let rewards_queue_depth =
            IntGauge::new("rewards_queue_depth", "Delivered deals waiting for point awards")
                .expect("valid rewards_queue_depth metric");

        registry
            .register(Box::new(negotiations_total.clone()))
            .expect("register negotiations_total");
        registry
            .register(Box::new(loyalty_points_total.clone()))
            .expect("register loyalty_points_total");
        registry
            .register(Box::new(location_pings_total.clone()))
            .expect("register location_pings_total");
        registry
            .register(Box::new(change_events_total.clone()))
            .expect("register change_events_total");
        registry
            .register(Box::new(kyc_decisions_total.clone()))
            .expect("register kyc_decisions_total");
        registry
            .register(Box::new(tracking_sessions_active.clone()))
            .expect("register tracking_sessions_active");
        registry
            .register(Box::new(rewards_queue_depth.clone()))
            .expect("register rewards_queue_depth");

        Self {
            registry,
            negotiations_total,
            loyalty_points_total,
            location_pings_total,
            change_events_total,
            kyc_decisions_total,
            tracking_sessions_active,
            rewards_queue_depth,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
