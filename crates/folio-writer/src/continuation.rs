//! Scheduling the next step of a background writing job.
//!
//! A step never calls the next step directly. It hands the project id to a
//! [`Continuation`], which in production is an in-process queue drained by
//! the worker. Losing a queued id (for example on restart) is harmless: the
//! project row still says the job is active, and the reconciliation sweep
//! re-queues it.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{Error, Result};

/// Something that arranges for `process_next_scene(project_id)` to run later.
pub trait Continuation: Send + Sync {
  fn schedule(&self, project_id: Uuid) -> Result<()>;
}

/// Sending half of the in-process queue; cheap to clone.
#[derive(Clone, Debug)]
pub struct ContinuationQueue {
  tx: mpsc::UnboundedSender<Uuid>,
}

/// Receiving half, owned by the worker.
#[derive(Debug)]
pub struct ContinuationReceiver {
  rx: mpsc::UnboundedReceiver<Uuid>,
}

/// Create a connected queue and receiver.
pub fn continuation_queue() -> (ContinuationQueue, ContinuationReceiver) {
  let (tx, rx) = mpsc::unbounded_channel();
  (ContinuationQueue { tx }, ContinuationReceiver { rx })
}

impl Continuation for ContinuationQueue {
  fn schedule(&self, project_id: Uuid) -> Result<()> {
    self.tx.send(project_id).map_err(|_| Error::QueueClosed)
  }
}

impl ContinuationReceiver {
  /// Wait for the next scheduled project; `None` once every sender is gone.
  pub async fn next(&mut self) -> Option<Uuid> { self.rx.recv().await }
}
