pub const METRIC_STARTUP_COMPLETED: &str = "lifecycle_startup_completed_total";
pub const METRIC_PROBE_DURATION: &str = "lifecycle_probe_duration_seconds";
pub const METRIC_SHUTDOWN_INITIATED: &str = "lifecycle_shutdown_initiated_total";
pub const METRIC_SHUTDOWN_COMPLETED: &str = "lifecycle_shutdown_completed_total";
pub const METRIC_COMPONENT_CLOSE_RESULT: &str = "lifecycle_component_close_result_total";

pub fn emit_startup_completed(service_name: &str, result: &str) {
    metrics::counter!(
        METRIC_STARTUP_COMPLETED,
        "service_name" => service_name.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

pub fn emit_probe_duration(component: &str, healthy: bool, duration_secs: f64) {
    metrics::histogram!(
        METRIC_PROBE_DURATION,
        "component" => component.to_string(),
        "healthy" => healthy.to_string()
    )
    .record(duration_secs);
}

pub fn emit_shutdown_initiated(service_name: &str, trigger_reason: &str) {
    metrics::counter!(
        METRIC_SHUTDOWN_INITIATED,
        "service_name" => service_name.to_string(),
        "trigger_reason" => trigger_reason.to_string()
    )
    .increment(1);
}

pub fn emit_shutdown_completed(service_name: &str, clean: bool) {
    metrics::counter!(
        METRIC_SHUTDOWN_COMPLETED,
        "service_name" => service_name.to_string(),
        "clean" => clean.to_string()
    )
    .increment(1);
}

pub fn emit_component_close_result(service_name: &str, component: &str, result: &str) {
    metrics::counter!(
        METRIC_COMPONENT_CLOSE_RESULT,
        "service_name" => service_name.to_string(),
        "component" => component.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}
