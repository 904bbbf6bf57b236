use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::aspect::Aspect;
use crate::task::Task;

/// Stock aspect collecting request counts and latency.
///
/// All counters are atomic, so one instance can be shared across routes
/// or registered globally. Latency is measured from task creation to the
/// post-service step, covering every inner aspect and the handler.
#[derive(Debug, Default)]
pub struct MetricsAspect {
    request_count: AtomicUsize,
    completed_count: AtomicUsize,
    total_latency_ns: AtomicU64,
}

impl MetricsAspect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that entered the pipeline.
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Requests whose post-service step ran.
    pub fn completed_count(&self) -> usize {
        self.completed_count.load(Ordering::Relaxed)
    }

    /// Mean latency over completed requests; zero when none completed.
    pub fn average_latency(&self) -> Duration {
        let count = self.completed_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }
}

impl Aspect for MetricsAspect {
    fn pre_service(&self, _task: &mut Task) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    fn post_service(&self, task: &mut Task) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(task.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }
}
