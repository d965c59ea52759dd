// MindHarbor - Metrics and observability.
//
// Lightweight in-process counters for how replies are produced: crisis
// overrides, generated answers, fallbacks (by reason), generator latency and
// how much grounding retrieval actually finds.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Shared metrics collector; clones point at the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<RwLock<MetricsInner>>,
    start_time: Instant,
}

#[derive(Default)]
struct MetricsInner {
    /// Messages accepted by `handle_user_message`.
    messages: u64,
    /// Messages rejected by validation.
    rejected: u64,
    crisis_overrides: u64,
    generated: u64,
    /// Fallback replies keyed by why generation was skipped or failed.
    fallbacks: HashMap<String, u64>,
    generator_calls: u64,
    generator_failures: u64,
    generator_total_ms: u64,
    retrieval_queries: u64,
    retrieval_hits: u64,
    /// Queries where nothing cleared the relevance floor.
    retrieval_misses: u64,
    sessions_started: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
            start_time: Instant::now(),
        }
    }

    pub async fn record_message(&self) {
        self.inner.write().await.messages += 1;
    }

    pub async fn record_rejected(&self) {
        self.inner.write().await.rejected += 1;
    }

    pub async fn record_crisis_override(&self) {
        self.inner.write().await.crisis_overrides += 1;
    }

    pub async fn record_generated(&self) {
        self.inner.write().await.generated += 1;
    }

    pub async fn record_fallback(&self, reason: &str) {
        let mut m = self.inner.write().await;
        *m.fallbacks.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Record one generator call, successful or not.
    pub async fn record_generator_call(&self, success: bool, duration: Duration) {
        let mut m = self.inner.write().await;
        m.generator_calls += 1;
        m.generator_total_ms += duration.as_millis() as u64;
        if !success {
            m.generator_failures += 1;
        }
    }

    pub async fn record_retrieval(&self, hits: usize) {
        let mut m = self.inner.write().await;
        m.retrieval_queries += 1;
        m.retrieval_hits += hits as u64;
        if hits == 0 {
            m.retrieval_misses += 1;
        }
    }

    pub async fn record_session_started(&self) {
        self.inner.write().await.sessions_started += 1;
    }

    /// Get uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Snapshot every counter.
    pub async fn report(&self) -> MetricsReport {
        let m = self.inner.read().await;

        let avg_generator_ms = if m.generator_calls > 0 {
            m.generator_total_ms / m.generator_calls
        } else {
            0
        };
        let avg_hits = if m.retrieval_queries > 0 {
            m.retrieval_hits as f64 / m.retrieval_queries as f64
        } else {
            0.0
        };

        MetricsReport {
            uptime_secs: self.uptime().as_secs(),
            messages: m.messages,
            rejected: m.rejected,
            crisis_overrides: m.crisis_overrides,
            generated: m.generated,
            total_fallbacks: m.fallbacks.values().sum(),
            fallbacks: m.fallbacks.clone(),
            generator_calls: m.generator_calls,
            generator_failures: m.generator_failures,
            avg_generator_ms,
            retrieval_queries: m.retrieval_queries,
            retrieval_misses: m.retrieval_misses,
            avg_hits,
            sessions_started: m.sessions_started,
        }
    }

    /// Format report as a displayable string.
    pub async fn format_report(&self) -> String {
        let r = self.report().await;
        let mut out = String::new();

        let hours = r.uptime_secs / 3600;
        let mins = (r.uptime_secs % 3600) / 60;
        let secs = r.uptime_secs % 60;

        out.push_str(&format!(
            "═══ MindHarbor Metrics ═══\n\
             Uptime:       {:02}:{:02}:{:02}\n\
             Messages:     {} ({} rejected)\n\
             Crisis:       {}\n\
             Generated:    {}\n\
             Fallbacks:    {}\n\
             Generator:    {} calls ({} failed), {}ms avg\n\
             Retrieval:    {} queries ({} empty), {:.2} hits avg\n\
             Sessions:     {} started\n",
            hours,
            mins,
            secs,
            r.messages,
            r.rejected,
            r.crisis_overrides,
            r.generated,
            r.total_fallbacks,
            r.generator_calls,
            r.generator_failures,
            r.avg_generator_ms,
            r.retrieval_queries,
            r.retrieval_misses,
            r.avg_hits,
            r.sessions_started,
        ));

        if !r.fallbacks.is_empty() {
            out.push_str("\n─── Fallback Reasons ───\n");
            let mut reasons: Vec<(&String, &u64)> = r.fallbacks.iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (reason, count) in reasons {
                out.push_str(&format!("  {:<20} {:>4}\n", reason, count));
            }
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Structured metrics report.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub uptime_secs: u64,
    pub messages: u64,
    pub rejected: u64,
    pub crisis_overrides: u64,
    pub generated: u64,
    pub total_fallbacks: u64,
    pub fallbacks: HashMap<String, u64>,
    pub generator_calls: u64,
    pub generator_failures: u64,
    pub avg_generator_ms: u64,
    pub retrieval_queries: u64,
    pub retrieval_misses: u64,
    pub avg_hits: f64,
    pub sessions_started: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_message().await;
        metrics.record_message().await;
        metrics.record_rejected().await;
        metrics.record_crisis_override().await;
        metrics.record_generated().await;
        metrics.record_fallback("timeout").await;
        metrics.record_fallback("timeout").await;
        metrics.record_fallback("no_index").await;
        metrics
            .record_generator_call(true, Duration::from_millis(500))
            .await;
        metrics
            .record_generator_call(false, Duration::from_millis(300))
            .await;
        metrics.record_retrieval(3).await;
        metrics.record_retrieval(0).await;

        let report = metrics.report().await;
        assert_eq!(report.messages, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.crisis_overrides, 1);
        assert_eq!(report.generated, 1);
        assert_eq!(report.total_fallbacks, 3);
        assert_eq!(report.fallbacks["timeout"], 2);
        assert_eq!(report.generator_calls, 2);
        assert_eq!(report.generator_failures, 1);
        assert_eq!(report.avg_generator_ms, 400);
        assert_eq!(report.retrieval_queries, 2);
        assert_eq!(report.retrieval_misses, 1);
        assert!((report.avg_hits - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_metrics_report_format() {
        let metrics = Metrics::new();
        metrics.record_message().await;
        metrics.record_fallback("no_generator").await;

        let text = metrics.format_report().await;
        assert!(text.contains("MindHarbor Metrics"));
        assert!(text.contains("Messages:     1 (0 rejected)"));
        assert!(text.contains("Fallback Reasons"));
        assert!(text.contains("no_generator"));
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_session_started().await;
        assert_eq!(metrics.report().await.sessions_started, 1);
    }
}
