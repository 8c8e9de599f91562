use serde::{Deserialize, Serialize};

/// Embedded payload of an api-request log event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequestInfo {
    #[serde(default)]
    pub tokens_in: Option<u64>,
    #[serde(default)]
    pub tokens_out: Option<u64>,
    #[serde(default)]
    pub cache_writes: Option<u64>,
    #[serde(default)]
    pub cache_reads: Option<u64>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Embedded payload of a context-condense log event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CondensePayload {
    pub context_condense: ContextCondense,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextCondense {
    #[serde(default)]
    pub new_context_tokens: u64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_context_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Consolidated token and cost totals for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub total_cost: f64,
    pub total_cache_reads: u64,
    pub total_cache_writes: u64,
    pub context_tokens: u64,
}

impl UsageSnapshot {
    /// Whether any field differs from `previous`.
    pub fn has_changed(&self, previous: &UsageSnapshot) -> bool {
        self != previous
    }
}

/// Running accumulator behind [`UsageSnapshot`].
///
/// Context size comes from whichever of the last api request and the last
/// condense event is newer by timestamp, independent of delivery order.
#[derive(Debug, Clone, Default)]
pub(crate) struct UsageAccumulator {
    snapshot: UsageSnapshot,
    last_request: Option<(i64, u64)>,
    last_condense: Option<(i64, u64)>,
}

impl UsageAccumulator {
    pub(crate) fn add_request(&mut self, ts: i64, info: &ApiRequestInfo) {
        let tokens_in = info.tokens_in.unwrap_or(0);
        let tokens_out = info.tokens_out.unwrap_or(0);
        let s = &mut self.snapshot;
        s.total_tokens_in = s.total_tokens_in.saturating_add(tokens_in);
        s.total_tokens_out = s.total_tokens_out.saturating_add(tokens_out);
        s.total_cache_writes = s
            .total_cache_writes
            .saturating_add(info.cache_writes.unwrap_or(0));
        s.total_cache_reads = s
            .total_cache_reads
            .saturating_add(info.cache_reads.unwrap_or(0));
        s.total_cost += info.cost.unwrap_or(0.0).max(0.0);

        if self.last_request.map_or(true, |(last, _)| ts >= last) {
            self.last_request = Some((ts, tokens_in.saturating_add(tokens_out)));
        }
        self.refresh_context();
    }

    pub(crate) fn add_condense(&mut self, ts: i64, condense: &ContextCondense) {
        self.snapshot.total_cost += condense.cost.max(0.0);
        if self.last_condense.map_or(true, |(last, _)| ts >= last) {
            self.last_condense = Some((ts, condense.new_context_tokens));
        }
        self.refresh_context();
    }

    fn refresh_context(&mut self) {
        self.snapshot.context_tokens = match (self.last_request, self.last_condense) {
            (Some((req_ts, _)), Some((cond_ts, tokens))) if cond_ts > req_ts => tokens,
            (None, Some((_, tokens))) => tokens,
            (Some((_, tokens)), _) => tokens,
            (None, None) => 0,
        };
    }

    pub(crate) fn snapshot(&self) -> &UsageSnapshot {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tokens_in: u64, tokens_out: u64, cost: f64) -> ApiRequestInfo {
        ApiRequestInfo {
            tokens_in: Some(tokens_in),
            tokens_out: Some(tokens_out),
            cost: Some(cost),
            ..Default::default()
        }
    }

    #[test]
    fn requests_accumulate_and_set_context() {
        let mut acc = UsageAccumulator::default();
        acc.add_request(1, &request(100, 50, 0.01));
        acc.add_request(2, &request(200, 100, 0.02));

        let s = acc.snapshot();
        assert_eq!(s.total_tokens_in, 300);
        assert_eq!(s.total_tokens_out, 150);
        assert!((s.total_cost - 0.03).abs() < 1e-9);
        assert_eq!(s.context_tokens, 300);
    }

    #[test]
    fn later_condense_replaces_context() {
        let mut acc = UsageAccumulator::default();
        acc.add_request(1, &request(100, 50, 0.0));
        acc.add_condense(
            2,
            &ContextCondense {
                new_context_tokens: 5000,
                cost: 0.05,
                ..Default::default()
            },
        );
        assert_eq!(acc.snapshot().context_tokens, 5000);
        assert!((acc.snapshot().total_cost - 0.05).abs() < 1e-9);

        acc.add_request(3, &request(40, 10, 0.0));
        assert_eq!(acc.snapshot().context_tokens, 50);
    }

    #[test]
    fn out_of_order_request_does_not_override_newer_condense() {
        let mut acc = UsageAccumulator::default();
        acc.add_condense(
            10,
            &ContextCondense {
                new_context_tokens: 800,
                cost: 0.0,
                ..Default::default()
            },
        );
        acc.add_request(5, &request(1000, 1000, 0.0));
        assert_eq!(acc.snapshot().context_tokens, 800);
    }

    #[test]
    fn oversized_counts_saturate() {
        let mut acc = UsageAccumulator::default();
        acc.add_request(1, &request(u64::MAX, 1, 0.0));
        assert_eq!(acc.snapshot().context_tokens, u64::MAX);

        acc.add_request(2, &request(5, 5, 0.0));
        let s = acc.snapshot();
        assert_eq!(s.total_tokens_in, u64::MAX);
        assert_eq!(s.total_tokens_out, 6);
        assert_eq!(s.context_tokens, 10);
    }

    #[test]
    fn comparator_detects_any_difference() {
        let a = UsageSnapshot::default();
        let mut b = a.clone();
        assert!(!b.has_changed(&a));
        b.total_cache_reads = 1;
        assert!(b.has_changed(&a));
    }

    #[test]
    fn condense_payload_shape() {
        let payload: CondensePayload = serde_json::from_str(
            r#"{"contextCondense": {"newContextTokens": 5000, "cost": 0.05, "prevContextTokens": 90000}}"#,
        )
        .unwrap();
        assert_eq!(payload.context_condense.new_context_tokens, 5000);
        assert_eq!(payload.context_condense.prev_context_tokens, Some(90000));
    }
}
