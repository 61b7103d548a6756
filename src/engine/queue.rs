use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, error};
use tokio::sync::mpsc;

/// A FIFO of background jobs drained by one worker task.
///
/// Jobs run strictly in push order, one at a time, so a later write can never
/// be overtaken by an earlier one. Pushing never blocks.
pub(crate) struct JobQueue<J> {
    name: &'static str,
    tx: mpsc::UnboundedSender<J>,
    pending: Arc<AtomicUsize>,
}

impl<J: Send + 'static> JobQueue<J> {
    /// Spawns the worker. Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, mut handler: F) -> Self
    where
        F: FnMut(J) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<J>();
        let pending = Arc::new(AtomicUsize::new(0));
        let done = pending.clone();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                handler(job).await;
                done.fetch_sub(1, Ordering::SeqCst);
            }
            debug!("{} queue closed", name);
        });

        Self { name, tx, pending }
    }

    pub fn push(&self, job: J) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            error!("{} queue is closed, dropping job", self.name);
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Waits until every job pushed so far has finished.
    pub async fn wait(&self) {
        while self.pending() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}
