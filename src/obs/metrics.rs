// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter incremented once per broker flow attempt, success, and failure.
pub const FLOW_COUNTER: &str = "feishu_broker_flow_total";

/// Counts a token or request flow outcome on the installed `metrics` recorder.
///
/// Labels are `flow` ([`FlowKind::as_str`]) and `outcome` ([`FlowOutcome::as_str`]). Without the
/// `metrics` feature this is a no-op.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(FLOW_COUNTER, "flow" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}
