//! Bounded FIFO submission queue
//!
//! Job ids travel through a bounded mpsc channel; the job records live in
//! the store. Submission beyond capacity fails fast with `QueueFull`
//! instead of blocking the caller. The receiver half is shared by every
//! worker behind an async mutex, so exactly one worker gets each id.

use clipforge_common::errors::{AppError, Result};
use clipforge_common::metrics::set_queue_depth;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

pub fn job_queue(capacity: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let depth = Arc::new(AtomicUsize::new(0));
    (
        JobSender {
            tx,
            capacity,
            depth: Arc::clone(&depth),
        },
        JobReceiver {
            rx: Mutex::new(rx),
            depth,
        },
    )
}

/// Producer half, held by the job service
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::Sender<Uuid>,
    capacity: usize,
    depth: Arc<AtomicUsize>,
}

impl JobSender {
    /// Non-blocking enqueue; fails fast when the queue is at capacity
    pub fn enqueue(&self, id: Uuid) -> Result<()> {
        self.tx.try_send(id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AppError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => AppError::QueueClosed,
        })?;
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        set_queue_depth(depth);
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consumer half, shared across the worker pool
pub struct JobReceiver {
    rx: Mutex<mpsc::Receiver<Uuid>>,
    depth: Arc<AtomicUsize>,
}

impl JobReceiver {
    /// Wait for the next job id; `None` when the queue is closed and drained
    pub async fn recv(&self) -> Option<Uuid> {
        let id = self.rx.lock().await.recv().await?;
        let depth = self.depth.fetch_sub(1, Ordering::SeqCst) - 1;
        set_queue_depth(depth);
        Some(id)
    }
}
