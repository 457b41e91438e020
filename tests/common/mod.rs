//! Shared harness for loopback tests

#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use socket_audio_host::{
    audio::{AudioBackend, AudioClip, DeviceInfo},
    config::ServerConfig,
    dispatch::{DispatchDefaults, Dispatcher, WorkerPool},
    error::AudioError,
    protocol::AudioSource,
    server::{Server, ServerState},
};

/// Backend that records calls; `play` can be held until released
#[derive(Default)]
pub struct MockBackend {
    device_ids: Vec<u32>,
    calls: Mutex<Vec<String>>,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl MockBackend {
    pub fn with_devices(ids: &[u32]) -> Self {
        Self {
            device_ids: ids.to_vec(),
            ..Self::default()
        }
    }

    /// `play` signals `entered` and then waits on `release`
    pub fn gated(ids: &[u32], entered: Sender<()>, release: Receiver<()>) -> Self {
        Self {
            gate: Some((entered, release)),
            ..Self::with_devices(ids)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl AudioBackend for MockBackend {
    fn load(&self, source: &AudioSource) -> Result<AudioClip, AudioError> {
        self.calls.lock().push(format!("load {}", source.describe()));
        Ok(AudioClip::new(vec![0.0; 8], 48000, 2))
    }

    fn play(&self, _clip: AudioClip, level: Option<f64>, device_id: Option<u32>) -> Result<(), AudioError> {
        if let Some((entered, release)) = &self.gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        self.calls.lock().push(format!("play {:?} {:?}", level, device_id));
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        self.calls.lock().push("stop".to_string());
        Ok(())
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        Ok(self
            .device_ids
            .iter()
            .map(|&id| DeviceInfo {
                id,
                name: format!("out {}", id),
                max_output_channels: 2,
                is_default: id == 0,
            })
            .collect())
    }
}

/// A server on an ephemeral loopback port, running on the test runtime
pub struct TestHost {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<socket_audio_host::Result<ServerState>>>,
    pool: Option<WorkerPool>,
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    }
}

impl TestHost {
    pub async fn start(backend: Arc<dyn AudioBackend>) -> Self {
        Self::start_with(backend, test_config()).await
    }

    pub async fn start_with(backend: Arc<dyn AudioBackend>, config: ServerConfig) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(backend, DispatchDefaults::default()));
        let pool = WorkerPool::start(dispatcher, 2, 8).unwrap();

        let mut server = Server::bind(&config, pool.handle()).await.unwrap();
        assert_eq!(server.state(), ServerState::Listening);
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = shutdown_rx.await;
                })
                .await?;
            Ok::<_, socket_audio_host::Error>(server.state())
        });

        Self {
            addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            pool: Some(pool),
        }
    }

    /// Ask the server to stop without waiting for it
    pub fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Stop the server and wait until it has shut down
    pub async fn stop(mut self) -> ServerState {
        self.signal_shutdown();
        let state = match self.task.take() {
            Some(task) => task.await.unwrap().unwrap(),
            None => ServerState::ShutDown,
        };
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
        state
    }
}
