use prometheus::{register_int_counter_vec, IntCounterVec};
use std::sync::LazyLock;

pub static TURNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "careconnect_turns_total",
        "Conversation turns processed, by outcome",
        &["outcome"]
    )
    .expect("metric can be registered")
});

pub static AGENT_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "careconnect_agent_runs_total",
        "Specialist agent executions",
        &["agent"]
    )
    .expect("metric can be registered")
});

pub static GENERATION_FALLBACKS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "careconnect_generation_fallbacks_total",
        "Generation failures answered with a deterministic fallback",
        &["site"]
    )
    .expect("metric can be registered")
});

pub fn record_fallback(site: &str) {
    GENERATION_FALLBACKS.with_label_values(&[site]).inc();
}

/// Text exposition of everything in the default registry.
pub fn render() -> Result<String, prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
