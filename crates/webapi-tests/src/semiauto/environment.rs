//! Test environment lifecycle.
//!
//! A [`TestEnvironment`] owns one [`CoordinationServer`] and moves through
//! `Created -> Running -> Stopped` exactly once. [`EnvironmentSlot`] is the
//! factory a test session owns: it builds and starts an environment on
//! first use and hands the same instance back until it is stopped.

use super::broker::PromptBroker;
use super::server::CoordinationServer;
use crate::result::{WebApiError, WebApiResult};
use crate::wait::{Wait, WaitOptions, WaitResult};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, TcpStream};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default coordination server host
pub const DEFAULT_HOST: &str = "localhost";

/// Default coordination server port
pub const DEFAULT_PORT: u16 = 6666;

/// Default deadline for the server worker to exit on stop
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 10_000;

const READY_CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Coordination server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Host to bind
    pub host: String,
    /// Port to bind; 0 picks a free port
    pub port: u16,
    /// Worker join deadline in milliseconds
    pub join_timeout_ms: u64,
    /// Allow cross-origin requests
    pub cors: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
            cors: false,
        }
    }
}

impl EnvironmentConfig {
    /// Set the host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the join deadline
    #[must_use]
    pub const fn with_join_timeout(mut self, ms: u64) -> Self {
        self.join_timeout_ms = ms;
        self
    }

    /// Enable or disable CORS
    #[must_use]
    pub const fn with_cors(mut self, cors: bool) -> Self {
        self.cors = cors;
        self
    }

    /// Join deadline as a duration
    #[must_use]
    pub const fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, never started
    Created,
    /// Server started
    Running,
    /// Stopped for good
    Stopped,
}

struct Worker {
    handle: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

struct State {
    phase: Phase,
    worker: Option<Worker>,
}

/// A coordination server plus its worker thread
pub struct TestEnvironment {
    config: EnvironmentConfig,
    server: Arc<CoordinationServer>,
    state: Mutex<State>,
}

impl std::fmt::Debug for TestEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestEnvironment")
            .field("addr", &self.addr())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl TestEnvironment {
    /// Create an environment; nothing runs until [`start`](Self::start)
    #[must_use]
    pub fn new(config: &EnvironmentConfig) -> Self {
        Self {
            config: config.clone(),
            server: Arc::new(CoordinationServer::new(config)),
            state: Mutex::new(State {
                phase: Phase::Created,
                worker: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured `(host, port)`
    #[must_use]
    pub fn addr(&self) -> (&str, u16) {
        (self.config.host.as_str(), self.config.port)
    }

    /// Address the server actually bound
    #[must_use]
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Whether the environment has been started and not stopped
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Broker for operator prompts
    #[must_use]
    pub fn broker(&self) -> Arc<PromptBroker> {
        self.server.broker()
    }

    /// The coordination server
    #[must_use]
    pub fn server(&self) -> Arc<CoordinationServer> {
        Arc::clone(&self.server)
    }

    /// Start the coordination server.
    ///
    /// With `block` the server runs on the calling thread until another
    /// thread calls [`stop`](Self::stop). Otherwise a worker thread is
    /// spawned and this returns once it is launched, not once the server
    /// listens; use [`wait_until_ready`](Self::wait_until_ready) for that.
    pub fn start(&self, block: bool) -> WebApiResult<()> {
        {
            let mut state = self.state();
            match state.phase {
                Phase::Created => {}
                Phase::Running => {
                    return Err(WebApiError::environment("environment is already running"))
                }
                Phase::Stopped => {
                    return Err(WebApiError::environment(
                        "a stopped environment cannot be restarted",
                    ))
                }
            }

            if !block {
                let server = Arc::clone(&self.server);
                let (done_tx, done) = mpsc::channel();
                let handle = std::thread::Builder::new()
                    .name("coordination-server".to_string())
                    .spawn(move || {
                        if let Err(e) = server.serve() {
                            error!(error = %e, "coordination server failed");
                        }
                        let _ = done_tx.send(());
                    })?;
                state.worker = Some(Worker { handle, done });
            }
            state.phase = Phase::Running;
        }

        let (host, port) = self.addr();
        info!(host, port, block, "test environment started");

        if block {
            let served = self.server.serve();
            self.state().phase = Phase::Stopped;
            served?;
        }
        Ok(())
    }

    /// Stop the server and join its worker. A no-op unless running.
    pub fn stop(&self) -> WebApiResult<()> {
        let worker = {
            let mut state = self.state();
            if state.phase != Phase::Running {
                debug!(phase = ?state.phase, "stop on an environment that is not running");
                return Ok(());
            }
            state.phase = Phase::Stopped;
            state.worker.take()
        };

        self.server.shutdown();
        if let Some(worker) = worker {
            join_worker(worker, self.config.join_timeout())?;
        }
        info!("test environment stopped");
        Ok(())
    }

    /// Poll until the server accepts TCP connections
    pub fn wait_until_ready(&self, options: WaitOptions) -> WebApiResult<WaitResult> {
        if !self.is_alive() {
            return Err(WebApiError::environment("environment is not running"));
        }
        Wait::new(options).until("coordination server to accept connections", || {
            Ok(self
                .bound_addr()
                .is_some_and(|addr| TcpStream::connect_timeout(&addr, READY_CONNECT_TIMEOUT).is_ok()))
        })
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

fn join_worker(worker: Worker, timeout: Duration) -> WebApiResult<()> {
    match worker.done.recv_timeout(timeout) {
        // a disconnect means the thread unwound before signalling
        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
            if worker.handle.join().is_err() {
                warn!("coordination server worker panicked");
            }
            Ok(())
        }
        Err(mpsc::RecvTimeoutError::Timeout) => Err(WebApiError::ShutdownTimeout {
            ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Owned factory for the session's test environment
#[derive(Debug, Default)]
pub struct EnvironmentSlot {
    config: EnvironmentConfig,
    current: Option<Arc<TestEnvironment>>,
}

impl EnvironmentSlot {
    /// Empty slot building environments from `config`
    #[must_use]
    pub const fn new(config: EnvironmentConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Settings used for new environments
    #[must_use]
    pub const fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Whether an environment is held
    #[must_use]
    pub const fn is_occupied(&self) -> bool {
        self.current.is_some()
    }

    /// The running environment, built and started on first use.
    ///
    /// # Panics
    ///
    /// Panics if the held environment is no longer alive. That only happens
    /// when it was stopped behind the slot's back, which is a setup bug.
    pub fn get(&mut self) -> Arc<TestEnvironment> {
        let config = &self.config;
        let env = self.current.get_or_insert_with(|| {
            let env = Arc::new(TestEnvironment::new(config));
            if let Err(e) = env.start(false) {
                error!(error = %e, "failed to start test environment");
            }
            env
        });
        assert!(
            env.is_alive(),
            "test environment is not alive; stop it through the slot so a fresh one is built"
        );
        Arc::clone(env)
    }

    /// Stop and forget the held environment
    pub fn stop(&mut self) -> WebApiResult<()> {
        match self.current.take() {
            Some(env) => env.stop(),
            None => Ok(()),
        }
    }
}
