//! Gauges published through the `metrics` facade. The embedding broker picks
//! the recorder (Prometheus exporter, logging recorder, or none).

use metrics::gauge;

pub fn record_cached_offsets(count: usize) {
    gauge!("emberq_coordinator_offsets_cached").set(count as f64);
}

pub fn record_cached_groups(count: usize) {
    gauge!("emberq_coordinator_groups_cached").set(count as f64);
}
