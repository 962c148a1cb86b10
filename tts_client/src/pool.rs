// Session pool: N requests under a concurrency cap

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::session::{run_session, SessionOutcome};
use crate::transport::Connector;

/// One failed session. Failures never abort sibling sessions.
#[derive(Debug, Clone, Serialize)]
pub struct SessionFailure {
    pub index: usize,
    pub message: String,
}

/// Aggregate outcome of a batch run.
#[derive(Debug)]
pub struct PoolOutcome {
    /// Successful sessions, ordered by request index.
    pub results: Vec<(usize, SessionOutcome)>,
    pub failures: Vec<SessionFailure>,
    /// Wall time for the whole batch.
    pub elapsed_s: f64,
}

/// Run `requests` independent sessions with at most `concurrency`
/// executing at any instant. Texts are assigned round-robin.
pub async fn run_pool(
    config: SessionConfig,
    texts: Vec<String>,
    requests: usize,
    concurrency: usize,
    connector: Arc<dyn Connector>,
) -> PoolOutcome {
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let results = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));
    let config = Arc::new(config);
    let texts = Arc::new(texts);

    let mut workers = Vec::with_capacity(requests);
    for index in 0..requests {
        let semaphore = Arc::clone(&semaphore);
        let results = Arc::clone(&results);
        let failures = Arc::clone(&failures);
        let config = Arc::clone(&config);
        let texts = Arc::clone(&texts);
        let connector = Arc::clone(&connector);

        workers.push(tokio::spawn(async move {
            // Closed only when the pool itself is dropped mid-run.
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            let text = if texts.is_empty() {
                ""
            } else {
                texts[index % texts.len()].as_str()
            };
            match run_session(&config, text, connector.as_ref()).await {
                Ok(outcome) => {
                    if outcome.samples.is_empty() {
                        info!(index, "session closed cleanly but produced no audio");
                    }
                    results.lock().await.push((index, outcome));
                }
                Err(e) => {
                    warn!(index, error = %e, "session failed");
                    failures.lock().await.push(SessionFailure {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }));
    }

    for worker in workers {
        let _ = worker.await;
    }

    let mut results = Arc::try_unwrap(results)
        .map(Mutex::into_inner)
        .unwrap_or_default();
    let mut failures = Arc::try_unwrap(failures)
        .map(Mutex::into_inner)
        .unwrap_or_default();
    results.sort_by_key(|(index, _)| *index);
    failures.sort_by_key(|f| f.index);

    PoolOutcome {
        results,
        failures,
        elapsed_s: started.elapsed().as_secs_f64(),
    }
}
