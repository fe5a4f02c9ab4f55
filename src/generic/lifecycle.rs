// src/generic/lifecycle.rs

use crate::generic::error::LifecycleError;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Endpoint lifecycle. Transitions only move forward, except that `Failed`
/// is reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EndpointState {
    Created = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
    Failed = 5,
}

impl EndpointState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EndpointState::Created,
            1 => EndpointState::Starting,
            2 => EndpointState::Running,
            3 => EndpointState::Stopping,
            4 => EndpointState::Stopped,
            _ => EndpointState::Failed,
        }
    }
}

/// Shared, atomically updated lifecycle state with an optional transition
/// observer. The state cell is an `Arc` so a [`StopHandle`] can request a
/// stop from another thread while the endpoint owns the main loop.
pub struct Lifecycle {
    state: Arc<AtomicU8>,
    observer: Option<Box<dyn FnMut(EndpointState, EndpointState) + Send>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { state: Arc::new(AtomicU8::new(EndpointState::Created as u8)), observer: None }
    }

    pub fn state(&self) -> EndpointState {
        EndpointState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_observer(&mut self, observer: impl FnMut(EndpointState, EndpointState) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { state: Arc::clone(&self.state) }
    }

    fn transition(&mut self, to: EndpointState) {
        let prev = EndpointState::from_u8(self.state.swap(to as u8, Ordering::AcqRel));
        if prev != to {
            if let Some(observer) = self.observer.as_mut() {
                observer(prev, to);
            }
        }
    }

    /// `Created -> Starting`. A second start is an error.
    pub fn begin_start(&mut self) -> Result<(), LifecycleError> {
        match self.state() {
            EndpointState::Created => {
                self.transition(EndpointState::Starting);
                Ok(())
            }
            EndpointState::Starting | EndpointState::Running => Err(LifecycleError::AlreadyStarted),
            from => Err(LifecycleError::InvalidTransition { from, to: EndpointState::Starting }),
        }
    }

    pub fn mark_running(&mut self) {
        self.transition(EndpointState::Running);
    }

    /// Idempotent: requesting a stop on an already stopping or terminal
    /// endpoint changes nothing.
    pub fn request_stop(&mut self) {
        match self.state() {
            EndpointState::Starting | EndpointState::Running => {
                self.transition(EndpointState::Stopping);
            }
            EndpointState::Created => self.transition(EndpointState::Stopped),
            _ => {}
        }
    }

    pub fn mark_stopped(&mut self) {
        if self.state() != EndpointState::Failed {
            self.transition(EndpointState::Stopped);
        }
    }

    pub fn mark_failed(&mut self) {
        self.transition(EndpointState::Failed);
    }

    pub fn is_running(&self) -> bool {
        self.state() == EndpointState::Running
    }

    pub fn should_stop(&self) -> bool {
        !matches!(self.state(), EndpointState::Starting | EndpointState::Running)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle").field("state", &self.state()).finish_non_exhaustive()
    }
}

/// Clonable handle that lets another thread ask the owning endpoint to stop.
/// The endpoint's main loop observes the flag at its next iteration.
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<AtomicU8>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        // Only demote live states; terminal states stay as they are.
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            match EndpointState::from_u8(current) {
                EndpointState::Starting | EndpointState::Running => {
                    Some(EndpointState::Stopping as u8)
                }
                EndpointState::Created => Some(EndpointState::Stopped as u8),
                _ => None,
            }
        });
    }

    pub fn state(&self) -> EndpointState {
        EndpointState::from_u8(self.state.load(Ordering::Acquire))
    }
}
