//! MJPEG server
//!
//! `Server` owns the configuration and the run-once guard. Each call to
//! `run` or `serve` builds a fresh `Reactor` on the calling thread and
//! blocks until a `StopHandle` fires or a fatal error occurs.
//!
//! # Example
//!
//! ```no_run
//! use mjpeg_fanout::{Server, ServerConfig};
//!
//! let config = ServerConfig::default()
//!     .static_token("secret")
//!     .device("/tmp/camera.mjpeg");
//! let server = Server::new(config);
//!
//! let stop = server.stop_handle();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(60));
//!     stop.stop();
//! });
//!
//! let stats = server.run().unwrap();
//! println!("served {} viewers", stats.authenticated);
//! ```

pub mod config;
pub mod connection;
pub mod listener;
pub(crate) mod reactor;
pub mod state;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mio::unix::pipe;
use mio::{Poll, Waker};

use crate::capture::{fifo, FrameSource, StreamSource};
use crate::error::{Error, Result};
use crate::stats::ServerStats;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionPhase, Transition};
pub use listener::Listener;
pub use state::ReactorState;

use reactor::Reactor;

/// Stop request shared between the server and its handles
#[derive(Debug, Default)]
struct StopSignal {
    requested: AtomicBool,
    waker: Mutex<Option<Arc<Waker>>>,
}

impl StopSignal {
    fn raise(&self) {
        self.requested.store(true, Ordering::Release);
        let waker = self.waker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(waker) = waker.as_ref() {
            if let Err(e) = waker.wake() {
                tracing::error!(error = %e, "Failed to wake reactor");
            }
        }
    }

    fn install(&self, waker: Arc<Waker>) {
        *self.waker.lock().unwrap_or_else(PoisonError::into_inner) = Some(waker);
    }

    fn reset(&self) {
        *self.waker.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.requested.store(false, Ordering::Release);
    }
}

/// Requests the running reactor to stop; cheap to clone and send
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    /// Make the current or next readiness wait return and end the run
    pub fn stop(&self) {
        self.signal.raise();
    }
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// MJPEG fan-out server
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    running: AtomicBool,
    generation: AtomicU64,
    stop: Arc<StopSignal>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            stop: Arc::new(StopSignal::default()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle for stopping the server from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            signal: Arc::clone(&self.stop),
        }
    }

    /// Number of runs started so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Open the device and token feed, bind, and serve until stopped
    ///
    /// This method blocks the calling thread.
    pub fn run(&self) -> Result<ServerStats> {
        let _guard = self.begin()?;

        let device = fifo::open(&self.config.device).map_err(|e| {
            tracing::error!(device = %self.config.device.display(), error = %e, "Failed to open device");
            e
        })?;
        let source = StreamSource::new(device, self.config.framing)
            .max_frame_size(self.config.max_frame_size);

        let feed = match &self.config.token_feed {
            Some(path) => {
                fifo::create(path)?;
                Some(fifo::open(path)?)
            }
            None => None,
        };

        let listener = Listener::bind(self.config.bind_addr)?.nodelay(self.config.tcp_nodelay);
        self.serve_inner(listener, source, feed)
    }

    /// Serve on an already bound listener with a caller-provided frame source
    pub fn serve<F: FrameSource>(
        &self,
        listener: Listener,
        source: F,
        feed: Option<pipe::Receiver>,
    ) -> Result<ServerStats> {
        let _guard = self.begin()?;
        self.serve_inner(listener, source, feed)
    }

    /// Run on tokio's blocking pool until `shutdown` resolves
    pub async fn run_until<Fut>(self: &Arc<Self>, shutdown: Fut) -> Result<ServerStats>
    where
        Fut: Future<Output = ()>,
    {
        let server = Arc::clone(self);
        let mut task = tokio::task::spawn_blocking(move || server.run());

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                self.stop_handle().stop();
                task.await
            }
        };

        joined.map_err(|e| Error::Join(e.to_string()))?
    }

    fn begin(&self) -> Result<RunGuard<'_>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }
        Ok(RunGuard {
            running: &self.running,
        })
    }

    fn serve_inner<F: FrameSource>(
        &self,
        listener: Listener,
        source: F,
        feed: Option<pipe::Receiver>,
    ) -> Result<ServerStats> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), reactor::WAKER)?);
        self.stop.install(waker);

        tracing::info!(
            generation = generation,
            addr = %listener.local_addr(),
            one_time_tokens = feed.is_some(),
            "Reactor starting"
        );

        let result = Reactor::new(poll, self.config.clone(), listener, source, feed)
            .and_then(|reactor| reactor.run(&self.stop.requested));
        self.stop.reset();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_starts_at_zero() {
        let server = Server::new(ServerConfig::default());
        assert_eq!(server.generation(), 0);
        assert!(!server.is_running());
    }

    #[test]
    fn test_second_run_rejected() {
        let server = Server::new(ServerConfig::default());
        let _guard = server.begin().unwrap();
        assert!(matches!(server.begin(), Err(Error::AlreadyRunning)));
    }

    #[test]
    fn test_guard_released_on_drop() {
        let server = Server::new(ServerConfig::default());
        drop(server.begin().unwrap());
        assert!(server.begin().is_ok());
    }

    #[test]
    fn test_run_fails_on_missing_device() {
        let config = ServerConfig::default().device("/nonexistent/mjpeg-fanout-device");
        let server = Server::new(config);

        assert!(matches!(server.run(), Err(Error::Io(_))));
        assert!(!server.is_running());
    }
}
