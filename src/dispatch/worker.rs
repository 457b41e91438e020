//! Audio worker pool
//!
//! Blocking backend calls run on a fixed set of named threads fed by a
//! bounded job queue. Each job carries a oneshot sender; the connection
//! task that submitted it awaits the receiver, so the reactor thread only
//! ever waits inside its own event loop.

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

use super::Dispatcher;
use crate::error::AudioError;
use crate::protocol::{Action, Response};

struct Job {
    action: Action,
    reply: oneshot::Sender<Response>,
}

/// Fixed-size pool of audio worker threads
pub struct WorkerPool {
    jobs: Sender<Job>,
    /// Dropped to tell workers to exit
    stop_tx: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `threads` workers with a job queue of `queue_depth`
    pub fn start(dispatcher: Arc<Dispatcher>, threads: usize, queue_depth: usize) -> std::io::Result<Self> {
        let (jobs_tx, jobs_rx) = bounded::<Job>(queue_depth.max(1));
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let mut workers = Vec::new();
        for index in 0..threads.max(1) {
            let dispatcher = dispatcher.clone();
            let jobs_rx = jobs_rx.clone();
            let stop_rx = stop_rx.clone();

            let handle = thread::Builder::new()
                .name(format!("audio-worker-{}", index))
                .spawn(move || worker_loop(index, dispatcher, jobs_rx, stop_rx))?;
            workers.push(handle);
        }

        tracing::debug!("Started {} audio workers (queue depth {})", workers.len(), queue_depth);

        Ok(Self {
            jobs: jobs_tx,
            stop_tx: Some(stop_tx),
            workers,
        })
    }

    /// A cloneable handle for submitting work
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            jobs: self.jobs.clone(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop the workers after their current job and wait for them
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        if self.stop_tx.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Audio worker panicked during shutdown");
            }
        }
        tracing::debug!("Audio workers stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

fn worker_loop(index: usize, dispatcher: Arc<Dispatcher>, jobs: Receiver<Job>, stop: Receiver<()>) {
    loop {
        select! {
            recv(jobs) -> job => {
                let Ok(job) = job else { break };
                let name = job.action.name();

                let response = catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(job.action)))
                    .unwrap_or_else(|_| {
                        tracing::error!("Audio worker {} panicked handling '{}'", index, name);
                        Response::audio_error(&AudioError::StreamError(format!(
                            "internal failure handling {}",
                            name
                        )))
                    });

                // Connection may have gone away meanwhile
                let _ = job.reply.send(response);
            }
            recv(stop) -> _ => break,
        }
    }
}

/// Submits actions to the worker pool from connection tasks
#[derive(Clone)]
pub struct DispatchHandle {
    jobs: Sender<Job>,
}

impl DispatchHandle {
    /// Dispatch an action and wait for its response without blocking the
    /// calling thread
    ///
    /// `Ping` is answered immediately. A full queue yields a `busy`
    /// response instead of waiting.
    pub async fn dispatch(&self, action: Action) -> Response {
        if action == Action::Ping {
            return Response::pong();
        }

        let name = action.name();
        let (reply, done) = oneshot::channel();
        match self.jobs.try_send(Job { action, reply }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Audio worker queue full, rejecting '{}'", name);
                return Response::busy();
            }
            Err(TrySendError::Disconnected(_)) => {
                return Response::audio_error(&AudioError::WorkerGone);
            }
        }

        done.await
            .unwrap_or_else(|_| Response::audio_error(&AudioError::WorkerGone))
    }

    /// Jobs waiting for a free worker
    pub fn queued(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::RecordingBackend;
    use crate::dispatch::DispatchDefaults;
    use crate::protocol::ResultCode;

    fn pool(threads: usize, depth: usize) -> (Arc<RecordingBackend>, WorkerPool) {
        let backend = Arc::new(RecordingBackend::with_devices(&[0, 1, 2]));
        let dispatcher = Arc::new(Dispatcher::new(backend.clone(), DispatchDefaults::default()));
        (backend, WorkerPool::start(dispatcher, threads, depth).unwrap())
    }

    #[tokio::test]
    async fn test_dispatch_through_pool() {
        let (backend, pool) = pool(2, 8);
        assert_eq!(pool.worker_count(), 2);
        let handle = pool.handle();

        let response = handle.dispatch(Action::SetDevice { device_id: 1 }).await;
        assert!(response.is_ok());
        let response = handle.dispatch(Action::StopPlayback).await;
        assert!(response.is_ok());
        assert_eq!(backend.calls(), vec!["enumerate".to_string(), "stop".to_string()]);

        drop(handle);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_ping_answered_inline() {
        let (backend, pool) = pool(1, 1);
        assert_eq!(pool.handle().dispatch(Action::Ping).await, Response::pong());
        assert!(backend.calls().is_empty());
    }

    /// Backend whose `stop` blocks until released
    struct GateBackend {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl crate::audio::AudioBackend for GateBackend {
        fn play(&self, _: crate::audio::AudioClip, _: Option<f64>, _: Option<u32>) -> Result<(), AudioError> {
            Ok(())
        }

        fn stop(&self) -> Result<(), AudioError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(())
        }

        fn enumerate_devices(&self) -> Result<Vec<crate::audio::DeviceInfo>, AudioError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_full_queue_is_busy() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let backend = Arc::new(GateBackend {
            entered: entered_tx,
            release: release_rx,
        });
        let dispatcher = Arc::new(Dispatcher::new(backend, DispatchDefaults::default()));
        let pool = WorkerPool::start(dispatcher, 1, 1).unwrap();
        let handle = pool.handle();

        // Occupy the only worker
        let first = tokio::spawn({
            let handle = handle.clone();
            async move { handle.dispatch(Action::StopPlayback).await }
        });
        while entered_rx.try_recv().is_err() {
            tokio::task::yield_now().await;
        }

        // Fill the queue
        let second = tokio::spawn({
            let handle = handle.clone();
            async move { handle.dispatch(Action::StopPlayback).await }
        });
        while handle.queued() == 0 {
            tokio::task::yield_now().await;
        }

        let third = handle.dispatch(Action::StopPlayback).await;
        assert_eq!(third.result, ResultCode::Busy);

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());

        drop(handle);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_after_shutdown_reports_worker_gone() {
        let (_, pool) = pool(1, 4);
        let handle = pool.handle();
        pool.shutdown();

        // Every worker dropped its receiver on exit, so the send fails
        let response = handle.dispatch(Action::StopPlayback).await;
        assert_eq!(response.result, ResultCode::AudioError);
    }
}
