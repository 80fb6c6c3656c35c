//! Serialized execution context
//!
//! Each controller owns one actor task that holds its state. Every read or
//! write of controller fields is a job sent to that task, so jobs never race
//! each other. Async I/O runs elsewhere and re-enters through [`SerialContext::run`].

use tokio::sync::{mpsc, oneshot};

use crate::error::{AppError, Result};

type Reply = Box<dyn FnOnce() + Send>;
type Job<S> = Box<dyn FnOnce(&mut S) -> Reply + Send>;

pub(crate) struct SerialContext<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
}

impl<S> Clone for SerialContext<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: Send + 'static> SerialContext<S> {
    /// Spawn the actor task. `after_each` runs after every job, still on the
    /// context and before the job's caller is woken.
    pub(crate) fn spawn<H>(mut state: S, mut after_each: H) -> Self
    where
        H: FnMut(&S) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<S>>();

        tokio::spawn(async move {
            after_each(&state);
            while let Some(job) = rx.recv().await {
                let reply = job(&mut state);
                after_each(&state);
                reply();
            }
            tracing::debug!("Collection context stopped");
        });

        Self { tx }
    }

    /// Run `f` on the context and wait for its result
    pub(crate) async fn run<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move |state: &mut S| {
                let result = f(state);
                Box::new(move || {
                    let _ = reply_tx.send(result);
                }) as Reply
            }))
            .map_err(|_| AppError::ControllerClosed)?;

        reply_rx.await.map_err(|_| AppError::ControllerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_jobs_apply_in_order() {
        let ctx = SerialContext::spawn(Vec::<u32>::new(), |_| {});

        let mut handles = Vec::new();
        for i in 0..10 {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                ctx.run(move |v: &mut Vec<u32>| v.push(i)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let len = ctx.run(|v: &mut Vec<u32>| v.len()).await.unwrap();
        assert_eq!(len, 10);
    }

    #[tokio::test]
    async fn test_after_each_runs_per_job() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let ctx = SerialContext::spawn(0u32, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        ctx.run(|n: &mut u32| *n += 1).await.unwrap();
        ctx.run(|n: &mut u32| *n += 1).await.unwrap();

        // initial publish + two jobs
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
