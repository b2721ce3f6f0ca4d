use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ticket::TicketId;
use crate::workflows::{AdvanceOutcome, WorkflowEngine, WorkflowError};

pub type AdvanceResult = Result<AdvanceOutcome, WorkflowError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("Timed out waiting for {pending} ticket worker(s) to finish")]
    ShutdownTimeout { pending: usize },
}

struct AdvanceRequest {
    done: oneshot::Sender<AdvanceResult>,
}

#[derive(Default)]
struct DispatcherState {
    queues: HashMap<TicketId, mpsc::UnboundedSender<AdvanceRequest>>,
    workers: Vec<JoinHandle<()>>,
    closed: bool,
}

/// Runs advance requests with exactly one worker per ticket.
///
/// Workers are spawned on first use and consume their queue in order, so
/// enqueueing never waits on the ticket lock and a ticket is never advanced
/// by two tasks at once.
pub struct AdvanceDispatcher {
    engine: Arc<WorkflowEngine>,
    state: Mutex<DispatcherState>,
}

impl AdvanceDispatcher {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(DispatcherState::default()),
        }
    }

    /// Queue an advance for `ticket_id`. The returned receiver yields the
    /// result once the worker has run it; dropping it is fine.
    pub async fn enqueue(
        &self,
        ticket_id: &str,
    ) -> Result<oneshot::Receiver<AdvanceResult>, DispatchError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(DispatchError::ShuttingDown);
        }

        let (done, receiver) = oneshot::channel();
        let mut request = AdvanceRequest { done };

        if let Some(queue) = state.queues.get(ticket_id) {
            match queue.send(request) {
                Ok(()) => return Ok(receiver),
                // The worker is gone; fall through and start a new one
                Err(mpsc::error::SendError(returned)) => request = returned,
            }
        }

        let (queue, requests) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(
            Arc::clone(&self.engine),
            ticket_id.to_string(),
            requests,
        ));
        debug!(ticket_id = %ticket_id, "Started advance worker");

        // A fresh receiver is alive until the worker exits, which needs this sender dropped
        let _ = queue.send(request);
        state.queues.insert(ticket_id.to_string(), queue);
        state.workers.push(worker);
        Ok(receiver)
    }

    pub async fn worker_count(&self) -> usize {
        self.state.lock().await.queues.len()
    }

    /// Stop accepting requests and wait for queued work to drain
    pub async fn shutdown(&self, grace: Duration) -> Result<(), DispatchError> {
        let workers = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.queues.clear();
            std::mem::take(&mut state.workers)
        };

        info!(workers = workers.len(), "Shutting down advance dispatcher");
        let total = workers.len();
        let mut finished = 0;
        let drained = tokio::time::timeout(grace, async {
            for worker in workers {
                if let Err(e) = worker.await {
                    warn!(error = %e, "Advance worker ended abnormally");
                }
                finished += 1;
            }
        })
        .await;

        match drained {
            Ok(()) => {
                info!("Advance dispatcher stopped");
                Ok(())
            }
            Err(_) => {
                let pending = total - finished;
                warn!(pending, "Advance dispatcher shutdown timed out");
                Err(DispatchError::ShutdownTimeout { pending })
            }
        }
    }
}

async fn run_worker(
    engine: Arc<WorkflowEngine>,
    ticket_id: TicketId,
    mut requests: mpsc::UnboundedReceiver<AdvanceRequest>,
) {
    while let Some(request) = requests.recv().await {
        let result = engine.advance(&ticket_id).await;
        match &result {
            Ok(outcome) => debug!(ticket_id = %ticket_id, outcome = ?outcome, "Queued advance finished"),
            // Already logged and broadcast by the engine
            Err(e) => debug!(ticket_id = %ticket_id, error = %e, "Queued advance failed"),
        }
        let _ = request.done.send(result);
    }
    debug!(ticket_id = %ticket_id, "Advance worker exiting");
}
