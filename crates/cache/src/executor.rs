use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

use raio_common::SubmitError;

type RebuildTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Pool limitado de workers para rebuild assíncrono de cache.
///
/// Tarefas chegam por um channel de capacidade fixa e são drenadas por
/// N workers fixos; submissões além da fila são rejeitadas em vez de
/// crescer sem limite. O pool é um recurso explícito do processo, com
/// ciclo de vida (new/shutdown) — nunca um singleton escondido.
pub struct RebuildExecutor {
    tx: mpsc::Sender<RebuildTask>,
    workers: Vec<JoinHandle<()>>,
}

impl RebuildExecutor {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..workers)
            .map(|id| {
                let rx = rx.clone();
                tokio::spawn(worker_loop(id, rx))
            })
            .collect();

        Self { tx, workers }
    }

    /// Submete uma tarefa fire-and-forget. Fila cheia → rejeição
    /// imediata; o caller decide o que fazer (tipicamente: nada, o
    /// valor velho continua servindo até a próxima leitura).
    pub fn try_submit(
        &self,
        task: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), SubmitError> {
        self.tx.try_send(Box::pin(task)).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::QueueFull,
            TrySendError::Closed(_) => SubmitError::Shutdown,
        })
    }

    /// Encerra o pool: fecha a fila, drena as tarefas pendentes e
    /// espera os workers terminarem.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(id: usize, rx: Arc<tokio::sync::Mutex<mpsc::Receiver<RebuildTask>>>) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        match task {
            Some(task) => task.await,
            None => {
                debug!("rebuild worker {id} encerrado");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::time::Duration;

    #[tokio::test]
    async fn runs_submitted_tasks() {
        let executor = RebuildExecutor::new(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            executor
                .try_submit(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        executor.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn rejects_when_queue_full() {
        // 1 worker preso + fila de 1 → terceira submissão é rejeitada
        let executor = RebuildExecutor::new(1, 1);
        let gate = Arc::new(Notify::new());

        let g = gate.clone();
        executor
            .try_submit(async move { g.notified().await })
            .unwrap();
        // Dar tempo do worker pegar a primeira tarefa
        tokio::time::sleep(Duration::from_millis(20)).await;

        executor.try_submit(async {}).unwrap(); // ocupa a fila

        let result = executor.try_submit(async {});
        assert!(matches!(result, Err(SubmitError::QueueFull)));

        gate.notify_one();
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_pending_tasks() {
        let executor = RebuildExecutor::new(1, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = counter.clone();
            executor
                .try_submit(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        executor.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
