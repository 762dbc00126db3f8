//! Lifecycle of the shared engine instance
//!
//! An [`EngineManager`] launches its engine lazily on the first
//! [`acquire`](EngineManager::acquire), hands the same instance to every later
//! caller, and tears it down once on [`shutdown`](EngineManager::shutdown).
//!
//! The state lives in a `tokio::sync::Mutex<LifecycleState>` that is held only
//! across transitions (launch, teardown), never across a render. An atomic
//! mirror of the state gives warm callers a lock-free fast path.

use crate::engine::{Engine, EngineLauncher};
use crate::{Error, Result};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Lifecycle of an [`EngineManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Disposing = 3,
    Disposed = 4,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Uninitialized,
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Ready,
            3 => LifecycleState::Disposing,
            _ => LifecycleState::Disposed,
        }
    }
}

/// Owner of one lazily launched, shared engine instance
pub struct EngineManager {
    launcher: Arc<dyn EngineLauncher>,
    // Mirror of `guard`'s value, written only while `guard` is held.
    state: AtomicU8,
    guard: Mutex<LifecycleState>,
    // Set before the state becomes Ready, cleared after it leaves Ready.
    engine: RwLock<Option<Arc<dyn Engine>>>,
}

impl EngineManager {
    pub fn new(launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            launcher,
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
            guard: Mutex::new(LifecycleState::Uninitialized),
            engine: RwLock::new(None),
        }
    }

    /// Current state, read without locking
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Return the shared engine, launching it if this is the first call.
    ///
    /// Concurrent first callers queue on the transition lock; exactly one of
    /// them launches and the rest observe the published instance. A failed
    /// launch leaves the manager `Uninitialized` so a later call can retry.
    ///
    /// Fails with [`Error::UseAfterDispose`] once the manager is shut down,
    /// and with [`Error::Cancelled`] (without side effects) if `cancel` fires
    /// while waiting for the lock.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Arc<dyn Engine>> {
        match self.state() {
            LifecycleState::Ready => {
                if let Some(engine) = self.published() {
                    return Ok(engine);
                }
            }
            LifecycleState::Disposing | LifecycleState::Disposed => {
                return Err(Error::UseAfterDispose)
            }
            LifecycleState::Uninitialized | LifecycleState::Initializing => {}
        }

        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            slot = self.guard.lock() => slot,
        };
        let mut transition = Transition::new(slot, &self.state);

        match transition.current() {
            LifecycleState::Ready => {
                if let Some(engine) = self.published() {
                    return Ok(engine);
                }
            }
            LifecycleState::Disposing | LifecycleState::Disposed => {
                return Err(Error::UseAfterDispose)
            }
            LifecycleState::Uninitialized | LifecycleState::Initializing => {}
        }

        transition.set(LifecycleState::Initializing);
        debug!("Launching engine instance");
        let engine = self.launch().await?;

        *self.engine.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&engine));
        transition.set(LifecycleState::Ready);
        info!("Engine instance ready");
        Ok(engine)
    }

    /// Tear the engine down and mark the manager permanently disposed.
    ///
    /// Waits for an in-flight launch to finish first. Calling it again is a
    /// no-op. A teardown error is returned as [`Error::ShutdownFailure`] but
    /// the manager is disposed regardless.
    pub async fn shutdown(&self) -> Result<()> {
        let mut transition = Transition::new(self.guard.lock().await, &self.state);

        match transition.current() {
            LifecycleState::Disposing | LifecycleState::Disposed => return Ok(()),
            LifecycleState::Uninitialized | LifecycleState::Initializing => {
                transition.set(LifecycleState::Disposed);
                debug!("Engine manager disposed before first use");
                return Ok(());
            }
            LifecycleState::Ready => {}
        }

        transition.set(LifecycleState::Disposing);
        let engine = self.engine.write().unwrap_or_else(PoisonError::into_inner).take();

        let result = match engine {
            // Runs to completion even if this future is dropped.
            Some(engine) => match tokio::task::spawn_blocking(move || engine.shutdown()).await {
                Ok(res) => res,
                Err(e) => Err(Error::ShutdownFailure(format!("teardown task failed: {}", e))),
            },
            None => Ok(()),
        };

        transition.set(LifecycleState::Disposed);

        match result {
            Ok(()) => {
                info!("Engine instance shut down");
                Ok(())
            }
            Err(e) => {
                warn!("Engine teardown failed: {}", e);
                Err(match e {
                    Error::ShutdownFailure(_) => e,
                    other => Error::ShutdownFailure(other.to_string()),
                })
            }
        }
    }

    fn published(&self) -> Option<Arc<dyn Engine>> {
        self.engine.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        let launcher = Arc::clone(&self.launcher);
        let task = tokio::task::spawn_blocking(move || -> Result<Arc<dyn Engine>> {
            let engine: Arc<dyn Engine> = Arc::from(launcher.launch()?);
            if let Err(e) = engine.verify() {
                if let Err(teardown) = engine.shutdown() {
                    warn!("Failed to tear down engine after failed readiness check: {}", teardown);
                }
                return Err(e);
            }
            Ok(engine)
        });

        match task.await {
            Ok(Ok(engine)) => Ok(engine),
            Ok(Err(e)) => {
                warn!("Engine launch failed: {}", e);
                Err(match e {
                    Error::InitializationFailure(_) => e,
                    other => Error::InitializationFailure(anyhow::Error::new(other)),
                })
            }
            Err(e) => Err(Error::InitializationFailure(anyhow::anyhow!("launch task failed: {}", e))),
        }
    }
}

impl std::fmt::Debug for EngineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineManager").field("state", &self.state()).finish()
    }
}

/// Holds the transition lock and keeps the atomic mirror in step.
///
/// Dropping it mid-transition (error or a dropped future) settles the state:
/// an unfinished launch rolls back to `Uninitialized`, an unfinished teardown
/// lands on `Disposed`. This runs before the lock itself is released.
struct Transition<'a> {
    slot: MutexGuard<'a, LifecycleState>,
    mirror: &'a AtomicU8,
}

impl<'a> Transition<'a> {
    fn new(slot: MutexGuard<'a, LifecycleState>, mirror: &'a AtomicU8) -> Self {
        Self { slot, mirror }
    }

    fn current(&self) -> LifecycleState {
        *self.slot
    }

    fn set(&mut self, state: LifecycleState) {
        *self.slot = state;
        self.mirror.store(state as u8, Ordering::Release);
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        match *self.slot {
            LifecycleState::Initializing => self.set(LifecycleState::Uninitialized),
            LifecycleState::Disposing => self.set(LifecycleState::Disposed),
            _ => {}
        }
    }
}
