use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub ledger_events_total: IntCounterVec,
    pub reconciliations_total: IntCounterVec,
    pub location_samples_total: IntCounterVec,
    pub poll_runs_total: IntCounterVec,
    pub pending_orders: IntGauge,
    pub active_deliveries: IntGauge,
    pub online_drivers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Status transition attempts by outcome"),
            &["outcome"],
        )
        .expect("valid transitions_total metric");

        let ledger_events_total = IntCounterVec::new(
            Opts::new("ledger_events_total", "Accepted assignment ledger events by kind"),
            &["kind"],
        )
        .expect("valid ledger_events_total metric");

        let reconciliations_total = IntCounterVec::new(
            Opts::new("reconciliations_total", "Payment reconciliation results by outcome"),
            &["outcome"],
        )
        .expect("valid reconciliations_total metric");

        let location_samples_total = IntCounterVec::new(
            Opts::new("location_samples_total", "Published location samples by outcome"),
            &["outcome"],
        )
        .expect("valid location_samples_total metric");

        let poll_runs_total = IntCounterVec::new(
            Opts::new("poll_runs_total", "Polling task runs by task name"),
            &["task"],
        )
        .expect("valid poll_runs_total metric");

        let pending_orders = IntGauge::new("pending_orders", "Orders currently pending")
            .expect("valid pending_orders metric");

        let active_deliveries = IntGauge::new("active_deliveries", "Orders currently out with a driver")
            .expect("valid active_deliveries metric");

        let online_drivers = IntGauge::new("online_drivers", "Drivers currently holding an order")
            .expect("valid online_drivers metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(ledger_events_total.clone()))
            .expect("register ledger_events_total");
        registry
            .register(Box::new(reconciliations_total.clone()))
            .expect("register reconciliations_total");
        registry
            .register(Box::new(location_samples_total.clone()))
            .expect("register location_samples_total");
        registry
            .register(Box::new(poll_runs_total.clone()))
            .expect("register poll_runs_total");
        registry
            .register(Box::new(pending_orders.clone()))
            .expect("register pending_orders");
        registry
            .register(Box::new(active_deliveries.clone()))
            .expect("register active_deliveries");
        registry
            .register(Box::new(online_drivers.clone()))
            .expect("register online_drivers");

        Self {
            registry,
            transitions_total,
            ledger_events_total,
            reconciliations_total,
            location_samples_total,
            poll_runs_total,
            pending_orders,
            active_deliveries,
            online_drivers,
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
