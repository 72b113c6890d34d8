use crate::conversation_store::ConversationStore;
use crate::lead_analyzer::LeadAnalyzer;
use crate::models::{Catalog, Message};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// One unit of background lead analysis: a snapshot of the updated history
/// plus the catalog in force when the turn completed.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub lead_id: Uuid,
    pub history: Vec<Message>,
    pub catalog: Catalog,
}

/// Handle for submitting analysis work. Cheap to clone.
///
/// Submission never blocks the chat turn: a full queue drops the job with a
/// warning. Losing one analysis is fine (the next turn re-analyzes the full
/// transcript); delaying a user response is not.
#[derive(Clone)]
pub struct AnalysisDispatcher {
    tx: mpsc::Sender<AnalysisJob>,
}

impl AnalysisDispatcher {
    /// Enqueues a job. Returns false when the job was dropped (queue full or
    /// workers gone).
    pub fn dispatch(&self, job: AnalysisJob) -> bool {
        let lead_id = job.lead_id;
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    "Analysis queue full, dropping analysis for lead {}",
                    lead_id
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(
                    "Analysis workers are gone, dropping analysis for lead {}",
                    lead_id
                );
                false
            }
        }
    }
}

/// Spawns the bounded analysis worker pool and returns its dispatcher.
///
/// Workers pull from one shared queue; `queue_capacity` bounds how much
/// analysis work can pile up under load.
pub fn spawn_analysis_workers(
    workers: usize,
    queue_capacity: usize,
    analyzer: Arc<LeadAnalyzer>,
    store: Arc<dyn ConversationStore>,
) -> AnalysisDispatcher {
    let (tx, rx) = mpsc::channel::<AnalysisJob>(queue_capacity);
    let rx = Arc::new(Mutex::new(rx));

    for worker_id in 0..workers {
        let rx = rx.clone();
        let analyzer = analyzer.clone();
        let store = store.clone();
        tokio::spawn(async move {
            loop {
                let job = { rx.lock().await.recv().await };
                match job {
                    Some(job) => run_analysis(worker_id, job, &analyzer, &store).await,
                    None => {
                        tracing::debug!("Analysis worker {} shutting down", worker_id);
                        break;
                    }
                }
            }
        });
    }

    tracing::info!(
        "Analysis worker pool started ({} workers, queue capacity {})",
        workers,
        queue_capacity
    );
    AnalysisDispatcher { tx }
}

/// Runs one job to completion. Nothing on this path can reach a request
/// handler: analysis faults fall back to neutral inside the analyzer, and
/// merge faults are logged and swallowed.
async fn run_analysis(
    worker_id: usize,
    job: AnalysisJob,
    analyzer: &LeadAnalyzer,
    store: &Arc<dyn ConversationStore>,
) {
    tracing::debug!(
        "Worker {} analyzing lead {} ({} messages)",
        worker_id,
        job.lead_id,
        job.history.len()
    );

    let result = analyzer
        .analyze_conversation(&job.history, &job.catalog)
        .await;

    match store.merge_lead_update(job.lead_id, &result).await {
        Ok(()) => {
            tracing::info!("Lead {} scored: {}", job.lead_id, result.reasoning);
        }
        Err(e) => {
            tracing::error!("Error persisting analysis for lead {}: {}", job.lead_id, e);
        }
    }
}
