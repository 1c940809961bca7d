use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tokio::select;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::runtime::task_manager::{Task, TaskContext};
use crate::runtime::Runtime;

type JobFn<S> = Box<dyn FnOnce(&mut S) -> Result<(), Error> + Send + 'static>;

pub struct Job<S> {
    name: &'static str,
    run: JobFn<S>,
}

pub type JobTx<S> = mpsc::UnboundedSender<Job<S>>;
pub type JobRx<S> = mpsc::UnboundedReceiver<Job<S>>;

/// Runs submitted jobs one at a time, in submission order, against a state
/// value that is owned by the worker. Jobs never run concurrently, so the
/// state needs no locking.
///
/// A job that returns an error or panics is logged and dropped; the jobs
/// queued after it still run.
pub struct SerialTaskQueue<S> {
    handle: QueueHandle<S>,
    worker: Task,
}

impl<S: Send + 'static> SerialTaskQueue<S> {
    pub async fn start(state: S, runtime: &Runtime) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        tracing::trace!("starting serial task queue");
        let worker = runtime
            .task()
            .spawn(move |task_context| Self::run(state, job_rx, task_context))
            .await;
        tracing::trace!("started serial task queue");

        Self {
            handle: QueueHandle { job_tx },
            worker,
        }
    }

    pub fn handle(&self) -> QueueHandle<S> {
        self.handle.clone()
    }

    /// Stops the worker. Jobs that were already queued still run before the
    /// worker exits; jobs submitted afterwards are refused.
    pub async fn stop(&mut self) {
        tracing::trace!("sending stop signal to serial task queue");
        self.worker.stop().await;
        tracing::trace!("stopped serial task queue");
    }

    async fn run(mut state: S, mut job_rx: JobRx<S>, mut task_context: TaskContext) {
        loop {
            select! {
                // CANCEL SAFETY: `mpsc::UnboundedReceiver::recv` is cancel safe.
                job = job_rx.recv() => {
                    match job {
                        Some(job) => execute(&mut state, job),
                        None => {
                            tracing::trace!("all queue handles dropped");
                            break;
                        },
                    }
                },
                // CANCEL SAFETY: `TaskContext::wait_for_stop` is cancel safe.
                _ = task_context.wait_for_stop() => {
                    tracing::trace!("stopping serial task queue");
                    break;
                },
            }
        }

        job_rx.close();
        while let Some(job) = job_rx.recv().await {
            execute(&mut state, job);
        }
    }
}

fn execute<S>(state: &mut S, job: Job<S>) {
    let Job { name, run } = job;
    match panic::catch_unwind(AssertUnwindSafe(|| run(state))) {
        Ok(Ok(())) => {
            tracing::trace!(task = name, "task done");
        }
        Ok(Err(err)) => {
            tracing::warn!(task = name, %err, "task failed");
        }
        Err(panic) => {
            tracing::error!(task = name, reason = panic_reason(&panic), "task panicked");
        }
    }
}

fn panic_reason(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(reason) = panic.downcast_ref::<&'static str>() {
        reason
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.as_str()
    } else {
        "unknown"
    }
}

/// Producer side of a [`SerialTaskQueue`]. Both application calls and media
/// engine callbacks submit through a handle.
pub struct QueueHandle<S> {
    job_tx: JobTx<S>,
}

impl<S: Send + 'static> QueueHandle<S> {
    pub fn submit<F>(&self, name: &'static str, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut S) -> Result<(), Error> + Send + 'static,
    {
        self.job_tx
            .send(Job {
                name,
                run: Box::new(f),
            })
            .map_err(|_| Error::QueueClosed)
    }

    /// Submits a job and waits for the value it produces.
    pub async fn query<F, T>(&self, name: &'static str, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(name, move |state| {
            let _ = reply_tx.send(f(state));
            Ok(())
        })?;
        reply_rx.await.map_err(|_| Error::TaskAborted)
    }

    /// Resolves once every job submitted before this call has run.
    pub async fn flush(&self) -> Result<(), Error> {
        self.query("flush", |_| ()).await
    }

    pub fn is_closed(&self) -> bool {
        self.job_tx.is_closed()
    }

    /// Handle whose worker is already gone. Everything submitted to it is
    /// refused.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (job_tx, _) = mpsc::unbounded_channel();
        Self { job_tx }
    }
}

impl<S> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            job_tx: self.job_tx.clone(),
        }
    }
}

impl<S> fmt::Debug for QueueHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("closed", &self.job_tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {

    use super::SerialTaskQueue;
    use crate::error::Error;
    use crate::runtime::Runtime;

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let runtime = Runtime::new();
        let queue = SerialTaskQueue::start(Vec::new(), &runtime).await;
        let handle = queue.handle();
        for i in 0..100 {
            handle
                .submit("push", move |state: &mut Vec<u32>| {
                    state.push(i);
                    Ok(())
                })
                .unwrap();
        }
        let state = handle.query("read", |state| state.clone()).await.unwrap();
        assert_eq!(state, (0..100).collect::<Vec<_>>());
        runtime.stop().await;
    }

    #[tokio::test]
    async fn failing_and_panicking_jobs_do_not_stop_queue() {
        let runtime = Runtime::new();
        let queue = SerialTaskQueue::start(0_u32, &runtime).await;
        let handle = queue.handle();
        handle
            .submit("fail", |_| Err(Error::QueueClosed))
            .unwrap();
        handle
            .submit("panic", |_| panic!("job exploded"))
            .unwrap();
        handle
            .submit("increment", |state| {
                *state += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(handle.query("read", |state| *state).await.unwrap(), 1);
        runtime.stop().await;
    }

    #[tokio::test]
    async fn query_of_panicking_job_is_aborted() {
        let runtime = Runtime::new();
        let queue = SerialTaskQueue::start((), &runtime).await;
        let result = queue
            .handle()
            .query("panic", |_| -> u32 { panic!("no reply") })
            .await;
        assert!(matches!(result, Err(Error::TaskAborted)));
        runtime.stop().await;
    }

    #[tokio::test]
    async fn jobs_submitted_from_jobs_run_afterwards() {
        let runtime = Runtime::new();
        let queue = SerialTaskQueue::start(Vec::new(), &runtime).await;
        let handle = queue.handle();
        let inner = handle.clone();
        handle
            .submit("outer", move |state: &mut Vec<&'static str>| {
                inner.submit("inner", |state| {
                    state.push("inner");
                    Ok(())
                })?;
                state.push("outer");
                Ok(())
            })
            .unwrap();
        handle
            .submit("after", |state| {
                state.push("after");
                Ok(())
            })
            .unwrap();
        handle.flush().await.unwrap();
        let state = handle.query("read", |state| state.clone()).await.unwrap();
        assert_eq!(state, vec!["outer", "after", "inner"]);
        runtime.stop().await;
    }

    #[tokio::test]
    async fn stopped_queue_refuses_jobs() {
        let runtime = Runtime::new();
        let mut queue = SerialTaskQueue::start((), &runtime).await;
        let handle = queue.handle();
        queue.stop().await;
        assert!(handle.is_closed());
        assert!(matches!(handle.submit("late", |_| Ok(())), Err(Error::QueueClosed)));
        runtime.stop().await;
    }
}
