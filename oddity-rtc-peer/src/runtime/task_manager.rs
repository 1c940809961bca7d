use std::future::Future;

use tokio::select;
use tokio::spawn;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct TaskManager {
    hold_tx: Mutex<Option<mpsc::Sender<()>>>,
    hold_rx: Mutex<mpsc::Receiver<()>>,
    stop_tx: broadcast::Sender<()>,
}

impl TaskManager {
    pub fn new() -> Self {
        let (hold_tx, hold_rx) = mpsc::channel(1);
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            // Must protect by mutex since another task might
            // invalidate the `hold_tx` once shutdown begins.
            hold_tx: Mutex::new(Some(hold_tx)),
            // Must protect `hold_rx` by mutex to allow for
            // internal mutability.
            hold_rx: Mutex::new(hold_rx),
            stop_tx,
        }
    }

    pub async fn spawn<F, T>(&self, f: F) -> Task
    where
        F: FnOnce(TaskContext) -> T + Send + 'static,
        T: Future<Output = ()> + Send + 'static,
    {
        let (task_stop_tx, task_stop_rx) = watch::channel(false);

        // `hold_tx` could be empty if another task already asked the
        // manager to stop, in which case we don't start a task at all
        // and hand back a task that is already finished.
        let hold_tx = self.hold_tx.lock().await.as_ref().cloned();
        let handle = match hold_tx {
            Some(hold_tx) => {
                let stop_rx = self.stop_tx.subscribe();
                Some(spawn(async move {
                    // After the future generated by `f` has finished,
                    // the context is dropped, which releases the hold.
                    let task_context = TaskContext {
                        stop: stop_rx,
                        task_stop: task_stop_rx,
                        _token: hold_tx,
                    };

                    f(task_context).await;
                }))
            }
            None => {
                tracing::warn!("runtime is stopping, task not spawned");
                None
            }
        };

        Task {
            stop_tx: task_stop_tx,
            handle,
        }
    }

    pub async fn stop(&self) {
        // If we don't drop the apex hold_tx here then the call
        // to recv() below will block forever since there would
        // be one remaining hold.
        drop(self.hold_tx.lock().await.take());

        // Tasks must respond to the stop signal. This must happen
        // after `hold_tx` is dropped, since that causes further
        // invocations of `spawn` to be ignored. Otherwise a task
        // could be spawned that never receives the stop request.
        let _ = self.stop_tx.send(());

        // The channel breaks after all `hold_tx` are dropped, which
        // means all tasks have finished.
        let _ = self.hold_rx.lock().await.recv().await;
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a single spawned task. Dropping the handle also signals the
/// task to stop.
pub struct Task {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Task {
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::error!(%err, "task did not finish cleanly");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

pub struct TaskContext {
    stop: broadcast::Receiver<()>,
    task_stop: watch::Receiver<bool>,
    _token: mpsc::Sender<()>,
}

impl TaskContext {
    /// Resolves when either the whole runtime or this particular task is
    /// asked to stop.
    pub async fn wait_for_stop(&mut self) {
        if *self.task_stop.borrow() {
            return;
        }
        select! {
            // CANCEL SAFETY: `broadcast::Receiver::recv` is cancel safe.
            _ = self.stop.recv() => {},
            // CANCEL SAFETY: `watch::Receiver::changed` is cancel safe.
            _ = self.task_stop.changed() => {},
        }
    }
}

#[cfg(test)]
mod tests {

    use super::TaskManager;

    #[tokio::test]
    async fn stop_single_task() {
        let task_manager = TaskManager::new();
        let mut task = task_manager
            .spawn(|mut task_context| async move {
                task_context.wait_for_stop().await;
            })
            .await;
        assert!(task.is_running());
        task.stop().await;
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn stop_manager_waits_for_tasks() {
        let task_manager = TaskManager::new();
        let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
        let _task = task_manager
            .spawn(move |mut task_context| async move {
                task_context.wait_for_stop().await;
                let _ = done_tx.send(());
            })
            .await;
        task_manager.stop().await;
        assert!(done_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn spawn_after_stop_is_ignored() {
        let task_manager = TaskManager::new();
        task_manager.stop().await;
        let task = task_manager.spawn(|_| async {}).await;
        assert!(!task.is_running());
    }
}
