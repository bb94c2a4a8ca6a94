//! Job Scheduler & Queue (C6): a prioritized, tenant-aware multi-queue held
//! in process memory. The scheduler owns queue order and the tenant
//! concurrency counter; the Job Store remains the durable record (§4.6,
//! §5).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::job::{Priority, QueueName};
use crate::error::{Error, Result};

/// Ordered FIFO queue for one `(QueueName)`, split into three priority
/// bands so dequeue always drains high before normal before low.
#[derive(Default)]
struct PriorityLanes {
    high: VecDeque<Uuid>,
    normal: VecDeque<Uuid>,
    low: VecDeque<Uuid>,
}

impl PriorityLanes {
    fn push(&mut self, priority: Priority, job_id: Uuid) {
        match priority {
            Priority::High => self.high.push_back(job_id),
            Priority::Normal => self.normal.push_back(job_id),
            Priority::Low => self.low.push_back(job_id),
        }
    }

    fn pop(&mut self) -> Option<Uuid> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn remove(&mut self, job_id: Uuid) -> bool {
        for lane in [&mut self.high, &mut self.normal, &mut self.low] {
            if let Some(pos) = lane.iter().position(|id| *id == job_id) {
                lane.remove(pos);
                return true;
            }
        }
        false
    }

    fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty() && self.low.is_empty()
    }
}

struct QueueState {
    lanes: HashMap<QueueName, PriorityLanes>,
}

impl QueueState {
    fn new() -> Self {
        let mut lanes = HashMap::new();
        lanes.insert(QueueName::Default, PriorityLanes::default());
        lanes.insert(QueueName::Analysis, PriorityLanes::default());
        lanes.insert(QueueName::Streaming, PriorityLanes::default());
        QueueState { lanes }
    }
}

/// A cancellation handle for a running job; the worker that picked the job
/// up registers its receiver end and watches for a `true` value.
pub struct RunningHandle {
    pub cancel_tx: watch::Sender<bool>,
}

pub struct Scheduler {
    state: Mutex<QueueState>,
    running: DashMap<Uuid, RunningHandle>,
    tenant_counts: DashMap<String, u32>,
    tenant_caps: DashMap<String, u32>,
    default_tenant_cap: u32,
    notify: Notify,
}

impl Scheduler {
    pub fn new(default_tenant_cap: u32) -> Self {
        Scheduler {
            state: Mutex::new(QueueState::new()),
            running: DashMap::new(),
            tenant_counts: DashMap::new(),
            tenant_caps: DashMap::new(),
            default_tenant_cap,
            notify: Notify::new(),
        }
    }

    /// Rebuild tenant counters from a snapshot of non-terminal jobs,
    /// typically read from the Job Store at startup (§4.6).
    pub fn restore_tenant_counts(&self, counts: impl IntoIterator<Item = (String, u32)>) {
        for (tenant, count) in counts {
            self.tenant_counts.insert(tenant, count);
        }
    }

    pub fn set_tenant_cap(&self, tenant_key: &str, cap: u32) {
        self.tenant_caps.insert(tenant_key.to_string(), cap);
    }

    fn tenant_cap(&self, tenant_key: &str) -> u32 {
        self.tenant_caps
            .get(tenant_key)
            .map(|c| *c)
            .unwrap_or(self.default_tenant_cap)
    }

    /// Enqueue re-checks the tenant cap atomically; the submit path (HTTP
    /// layer) has already checked but races between concurrent submits
    /// from the same tenant must still be caught here (§5, linearized
    /// enqueue).
    pub fn enqueue(
        &self,
        job_id: Uuid,
        tenant_key: &str,
        priority: Priority,
        queue: QueueName,
    ) -> Result<()> {
        let mut entry = self.tenant_counts.entry(tenant_key.to_string()).or_insert(0);
        if *entry >= self.tenant_cap(tenant_key) {
            return Err(Error::queue_enqueue_failed(
                "tenant concurrency cap reached",
            ));
        }
        *entry += 1;
        drop(entry);

        let mut state = self.state.lock().unwrap();
        state.lanes.get_mut(&queue).unwrap().push(priority, job_id);
        drop(state);
        self.notify.notify_one();
        debug!(%job_id, %tenant_key, ?queue, "job enqueued");
        Ok(())
    }

    /// Pop the next job id available across the given queues, in the order
    /// supplied, blocking cooperatively until one appears.
    pub async fn dequeue(&self, queues: &[QueueName]) -> Uuid {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                for queue in queues {
                    if let Some(lanes) = state.lanes.get_mut(queue) {
                        if let Some(job_id) = lanes.pop() {
                            return job_id;
                        }
                    }
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn cancel_queued(&self, job_id: Uuid) -> bool {
        let mut state = self.state.lock().unwrap();
        state.lanes.values_mut().any(|lanes| lanes.remove(job_id))
    }

    pub fn cancel_running(&self, job_id: Uuid) -> bool {
        if let Some(handle) = self.running.get(&job_id) {
            let _ = handle.cancel_tx.send(true);
            true
        } else {
            false
        }
    }

    /// Called by a worker right after dequeue, before execution begins;
    /// registers the cancellation channel the worker will watch.
    pub fn register_running(&self, job_id: Uuid) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.running.insert(job_id, RunningHandle { cancel_tx: tx });
        rx
    }

    /// Called on any terminal transition; decrements the tenant counter and
    /// forgets the running handle.
    pub fn mark_terminal(&self, job_id: Uuid, tenant_key: &str) {
        self.running.remove(&job_id);
        if let Some(mut entry) = self.tenant_counts.get_mut(tenant_key) {
            *entry = entry.saturating_sub(1);
        }
    }

    pub fn is_queue_empty(&self, queue: QueueName) -> bool {
        self.state
            .lock()
            .unwrap()
            .lanes
            .get(&queue)
            .map(|l| l.is_empty())
            .unwrap_or(true)
    }
}

/// A submitted batch shares one `batch_id` and assigns ascending
/// `batch_index` to each member job, per §4.6.
pub struct BatchAssignment {
    pub batch_id: Uuid,
    pub job_indices: Vec<u32>,
}

pub fn assign_batch(job_count: usize) -> BatchAssignment {
    BatchAssignment {
        batch_id: Uuid::new_v4(),
        job_indices: (0..job_count as u32).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dequeue_respects_priority_band_order() {
        let scheduler = Scheduler::new(100);
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        scheduler
            .enqueue(low, "tenant-a", Priority::Low, QueueName::Default)
            .unwrap();
        scheduler
            .enqueue(high, "tenant-a", Priority::High, QueueName::Default)
            .unwrap();

        let first = scheduler.dequeue(&[QueueName::Default]).await;
        assert_eq!(first, high);
        let second = scheduler.dequeue(&[QueueName::Default]).await;
        assert_eq!(second, low);
    }

    #[test]
    fn enqueue_rejects_beyond_tenant_cap() {
        let scheduler = Scheduler::new(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        scheduler
            .enqueue(a, "tenant-a", Priority::Normal, QueueName::Default)
            .unwrap();
        let result = scheduler.enqueue(b, "tenant-a", Priority::Normal, QueueName::Default);
        assert!(result.is_err());
    }

    #[test]
    fn mark_terminal_frees_tenant_capacity() {
        let scheduler = Scheduler::new(1);
        let a = Uuid::new_v4();
        scheduler
            .enqueue(a, "tenant-a", Priority::Normal, QueueName::Default)
            .unwrap();
        scheduler.mark_terminal(a, "tenant-a");
        let b = Uuid::new_v4();
        assert!(scheduler
            .enqueue(b, "tenant-a", Priority::Normal, QueueName::Default)
            .is_ok());
    }

    #[test]
    fn cancel_queued_removes_pending_job() {
        let scheduler = Scheduler::new(10);
        let a = Uuid::new_v4();
        scheduler
            .enqueue(a, "tenant-a", Priority::Normal, QueueName::Default)
            .unwrap();
        assert!(scheduler.cancel_queued(a));
        assert!(scheduler.is_queue_empty(QueueName::Default));
    }
}
