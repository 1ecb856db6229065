//! Lifecycle Controller
//!
//! Install → wait → activate state machine for one worker version, with the
//! "adopt now" override that skips the wait for open clients.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, ShellError};

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Created, install not started
    Parsed,
    /// Precaching shell assets
    Installing,
    /// Installed, waiting for open clients to go away
    Waiting,
    /// Purging stale generations
    Activating,
    /// Serving and controlling clients
    Active,
    /// Install failed; the previous version keeps serving
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Lifecycle Controller ==
#[derive(Debug)]
pub struct LifecycleController {
    state: LifecycleState,
    open_clients: usize,
    skip_waiting: bool,
}

impl LifecycleController {
    pub fn new(skip_waiting: bool) -> Self {
        Self {
            state: LifecycleState::Parsed,
            open_clients: 0,
            skip_waiting,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn open_clients(&self) -> usize {
        self.open_clients
    }

    pub fn begin_install(&mut self) -> Result<()> {
        self.transition(LifecycleState::Parsed, LifecycleState::Installing)
    }

    pub fn install_succeeded(&mut self) -> Result<()> {
        self.transition(LifecycleState::Installing, LifecycleState::Waiting)
    }

    /// Abandons this version. Nothing it staged becomes authoritative.
    pub fn install_failed(&mut self) -> Result<()> {
        self.transition(LifecycleState::Installing, LifecycleState::Redundant)
    }

    /// Records the "adopt now" signal. Takes effect now if waiting, or right
    /// after install otherwise.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// True when a waiting version may activate: either adoption was forced
    /// or no client is still open.
    pub fn should_activate(&self) -> bool {
        self.state == LifecycleState::Waiting && (self.skip_waiting || self.open_clients == 0)
    }

    pub fn begin_activation(&mut self) -> Result<()> {
        self.transition(LifecycleState::Waiting, LifecycleState::Activating)
    }

    pub fn activation_complete(&mut self) -> Result<()> {
        self.transition(LifecycleState::Activating, LifecycleState::Active)
    }

    pub fn client_opened(&mut self) -> usize {
        self.open_clients += 1;
        self.open_clients
    }

    pub fn client_closed(&mut self) -> usize {
        self.open_clients = self.open_clients.saturating_sub(1);
        self.open_clients
    }

    fn transition(&mut self, from: LifecycleState, to: LifecycleState) -> Result<()> {
        if self.state != from {
            return Err(ShellError::InvalidState {
                expected: from.as_str(),
                actual: self.state,
            });
        }
        self.state = to;
        Ok(())
    }
}
