//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Embedders install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider` — provider name (e.g. "groq", "gemini")
//! - `mode` — generation mode (e.g. "exam", "lesson", "chat")
//! - `status` — outcome: "ok" or "error"

/// Provider calls dispatched by the router.
///
/// Labels: `provider`, `mode`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// Provider call duration in seconds, including normalization.
///
/// Labels: `provider`, `mode`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Secondary-provider attempts after a primary failure.
///
/// Labels: `from`, `to`, `mode`.
pub const FALLBACKS_TOTAL: &str = "huginn_fallbacks_total";

/// Static placeholders returned in place of a generated result.
///
/// Labels: `mode`.
pub const DEGRADED_TOTAL: &str = "huginn_degraded_total";

/// Rate limiter decisions.
///
/// Labels: `decision` ("admitted" | "rejected").
pub const RATE_DECISIONS_TOTAL: &str = "huginn_rate_decisions_total";

/// Response cache hits.
///
/// Labels: `mode`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Response cache misses (including expired entries).
///
/// Labels: `mode`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Entries dropped by the bulk size sweep.
pub const CACHE_EVICTIONS_TOTAL: &str = "huginn_cache_evictions_total";
