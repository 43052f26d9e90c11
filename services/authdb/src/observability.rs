//! Observability wiring for processes embedding the authorization store.
//!
//! # Purpose
//! Initializes tracing with an env-driven filter and registers descriptions
//! for the counters the store emits. Installing a metrics exporter is left to
//! the embedding process.
//!
//! # Notes
//! Initialization is guarded by `OnceLock` to keep startup idempotent in tests.
use metrics::{Unit, describe_counter};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static OBS_INIT: OnceLock<()> = OnceLock::new();

pub fn init_observability(service_name: &str) {
    OBS_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer();
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
        describe_metrics();
        tracing::info!(service = service_name, "observability initialized");
    });
}

fn describe_metrics() {
    describe_counter!(
        "carebridge_policy_reloads_total",
        Unit::Count,
        "Policy cache rebuilds, labelled by result."
    );
    describe_counter!(
        "carebridge_sync_pulls_total",
        Unit::Count,
        "Replication pull rounds, labelled by outcome."
    );
    describe_counter!(
        "carebridge_cascade_removed_total",
        Unit::Count,
        "Records removed by cascading deletes, labelled by entity."
    );
}
