// src/queue/handle.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::errors::{AutoconvertError, Result};

use super::{Job, JobId, QueueEvent, QueueReport};

/// Capacity of a queue's event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable front end of one running queue.
///
/// All methods only enqueue an event; the queue's control loop applies
/// them in the order they were sent. They fail with
/// [`AutoconvertError::QueueClosed`] once that loop has exited.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    name: Arc<str>,
    tx: mpsc::Sender<QueueEvent>,
    next_id: Arc<AtomicU64>,
}

impl QueueHandle {
    /// Create a handle plus the receiver its control loop should consume.
    pub fn channel(name: impl Into<String>) -> (Self, mpsc::Receiver<QueueEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = Self {
            name: Arc::from(name.into()),
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (handle, rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw event sender, for wiring an executor to this queue.
    pub fn sender(&self) -> mpsc::Sender<QueueEvent> {
        self.tx.clone()
    }

    /// Append a job to the pending list and return its id.
    ///
    /// Ids are handed out in call order, so they also give append order.
    pub async fn append(&self, job: Job) -> Result<JobId> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send(QueueEvent::Append { id, job }).await?;
        Ok(id)
    }

    pub async fn start(&self) -> Result<()> {
        self.send(QueueEvent::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(QueueEvent::Stop).await
    }

    pub async fn cancel(&self, id: JobId) -> Result<()> {
        self.send(QueueEvent::Cancel(id)).await
    }

    pub async fn cancel_running(&self) -> Result<()> {
        self.send(QueueEvent::CancelRunning).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(QueueEvent::Shutdown).await
    }

    /// Receive a [`QueueReport`] every time this queue announces "finished".
    ///
    /// Subscribe before calling [`start`](Self::start); announcements made
    /// earlier are not replayed.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<QueueReport>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(QueueEvent::Subscribe(tx)).await?;
        Ok(rx)
    }

    async fn send(&self, event: QueueEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AutoconvertError::QueueClosed(self.name.to_string()))
    }
}
