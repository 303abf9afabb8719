use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

pub const HTTP_METRIC_GROUP: &str = "external.source.http";

/// Events the connector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aspect {
    TotalCalls,
    EmptyInput,
    Timeouts,
    InvalidConfiguration,
    DecodeFailure,
    InvalidDataType,
    SuccessResponse,
    Failure4xx,
    Failure5xx,
    OtherErrors,
    CloseConnection,
}

impl Aspect {
    pub const ALL: [Aspect; 11] = [
        Aspect::TotalCalls,
        Aspect::EmptyInput,
        Aspect::Timeouts,
        Aspect::InvalidConfiguration,
        Aspect::DecodeFailure,
        Aspect::InvalidDataType,
        Aspect::SuccessResponse,
        Aspect::Failure4xx,
        Aspect::Failure5xx,
        Aspect::OtherErrors,
        Aspect::CloseConnection,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Aspect::TotalCalls => "total_calls",
            Aspect::EmptyInput => "empty_input",
            Aspect::Timeouts => "timeouts",
            Aspect::InvalidConfiguration => "invalid_configuration",
            Aspect::DecodeFailure => "decode_failure",
            Aspect::InvalidDataType => "invalid_data_type",
            Aspect::SuccessResponse => "success_response",
            Aspect::Failure4xx => "failure_code_4xx",
            Aspect::Failure5xx => "failure_code_5xx",
            Aspect::OtherErrors => "other_errors",
            Aspect::CloseConnection => "close_connection",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Counters shared by every in-flight call of a connector.
#[derive(Debug)]
pub struct ConnectorMetrics {
    group: String,
    counters: [AtomicU64; Aspect::ALL.len()],
    response_time_ms_total: AtomicU64,
    response_time_samples: AtomicU64,
}

impl ConnectorMetrics {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            response_time_ms_total: AtomicU64::new(0),
            response_time_samples: AtomicU64::new(0),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn mark(&self, aspect: Aspect) {
        self.counters[aspect.slot()].fetch_add(1, Ordering::Relaxed);
        trace!(group = %self.group, aspect = aspect.name(), "metric event");
    }

    pub fn count(&self, aspect: Aspect) -> u64 {
        self.counters[aspect.slot()].load(Ordering::Relaxed)
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.response_time_ms_total.fetch_add(millis, Ordering::Relaxed);
        self.response_time_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mean_response_time(&self) -> Option<Duration> {
        let samples = self.response_time_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return None;
        }
        let total = self.response_time_ms_total.load(Ordering::Relaxed);
        Some(Duration::from_millis(total / samples))
    }

    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        Aspect::ALL
            .iter()
            .map(|aspect| (aspect.name(), self.count(*aspect)))
            .collect()
    }
}

impl Default for ConnectorMetrics {
    fn default() -> Self {
        Self::new(HTTP_METRIC_GROUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn aspect_slots_match_declaration_order() {
        for (index, aspect) in Aspect::ALL.iter().enumerate() {
            assert_eq!(aspect.slot(), index);
        }
    }

    #[tokio::test]
    async fn concurrent_marks_are_all_counted() {
        let metrics = Arc::new(ConnectorMetrics::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    metrics.mark(Aspect::TotalCalls);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(metrics.count(Aspect::TotalCalls), 800);
        assert_eq!(metrics.count(Aspect::Timeouts), 0);
    }

    #[test]
    fn response_time_mean() {
        let metrics = ConnectorMetrics::default();
        assert_eq!(metrics.mean_response_time(), None);

        metrics.record_response_time(Duration::from_millis(10));
        metrics.record_response_time(Duration::from_millis(30));
        assert_eq!(metrics.mean_response_time(), Some(Duration::from_millis(20)));
    }
}
