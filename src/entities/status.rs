//! Asset lifecycle: `Waiting -> Ready|Proxy|ProxyOnly -> Missing`, plus an
//! orthogonal `reloading` flag held for the duration of a rebuild.
//!
//! Transition rules:
//! - any state may move to `Missing`
//! - `Waiting` resolves to `Ready`, `Proxy` or `ProxyOnly`
//! - loaded states may go back to `Waiting` (explicit reload) or swap among
//!   themselves (proxy created or dropped)
//! - `Missing` only leaves through a reload that succeeded, i.e. while
//!   `reloading` is set; it never goes back to `Waiting`

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ClipStatus {
    /// Master producer not built yet
    #[default]
    Waiting,
    /// Master producer uses the original resource
    Ready,
    /// Master producer uses a proxy, original still resolvable
    Proxy,
    /// Master producer uses a proxy, original is gone
    ProxyOnly,
    /// Backing resource cannot be resolved
    Missing,
}

impl ClipStatus {
    /// Master producer is usable for derivation
    pub fn is_loaded(self) -> bool {
        matches!(self, ClipStatus::Ready | ClipStatus::Proxy | ClipStatus::ProxyOnly)
    }
}

impl std::fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClipStatus::Waiting => "waiting",
            ClipStatus::Ready => "ready",
            ClipStatus::Proxy => "proxy",
            ClipStatus::ProxyOnly => "proxy-only",
            ClipStatus::Missing => "missing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: ClipStatus, to: ClipStatus },
    #[error("reload already in progress")]
    AlreadyReloading,
}

/// Status plus reloading flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    status: ClipStatus,
    reloading: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ClipStatus {
        self.status
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    /// Whether `to` is reachable from the current state.
    pub fn can_transition(&self, to: ClipStatus) -> bool {
        use ClipStatus::*;
        match (self.status, to) {
            (_, Missing) => true,
            (Waiting, Waiting | Ready | Proxy | ProxyOnly) => true,
            (Ready | Proxy | ProxyOnly, Waiting | Ready | Proxy | ProxyOnly) => true,
            (Missing, Ready | Proxy | ProxyOnly) => self.reloading,
            (Missing, Waiting) => false,
        }
    }

    /// Apply a transition, returning the previous status.
    pub fn transition(&mut self, to: ClipStatus) -> Result<ClipStatus, StatusError> {
        if !self.can_transition(to) {
            return Err(StatusError::IllegalTransition { from: self.status, to });
        }
        let prev = self.status;
        self.status = to;
        Ok(prev)
    }

    /// Set the reloading flag. A second request while set is refused so
    /// callers can coalesce it.
    pub fn begin_reload(&mut self) -> Result<(), StatusError> {
        if self.reloading {
            return Err(StatusError::AlreadyReloading);
        }
        self.reloading = true;
        Ok(())
    }

    pub fn end_reload(&mut self) {
        self.reloading = false;
    }
}
