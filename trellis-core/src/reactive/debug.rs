//! Debug hooks.
//!
//! Effects and computeds can carry observer callbacks that fire when a
//! dependency is recorded and when a notification schedules them. The
//! callbacks receive a [`DebuggerEvent`] and must not touch the graph.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::graph::{DirtyLevel, EffectId, SourceId};

/// What happened to the dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugOp {
    /// The source was read by a running effect.
    Get,
    /// The source's value was written (or force-triggered).
    Set,
    /// A computed upstream may have changed and asks for re-verification.
    Invalidate,
}

/// Metadata passed to `on_track` / `on_trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebuggerEvent {
    pub effect: EffectId,
    pub source: SourceId,
    pub op: DebugOp,
    /// Level carried by the notification; `None` for track events.
    pub level: Option<DirtyLevel>,
}

/// Observer callback type.
pub type DebugHook = Rc<dyn Fn(&DebuggerEvent)>;

/// Optional observers attached to an effect or computed.
#[derive(Clone, Default)]
pub struct DebugHooks {
    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,
}

impl DebugHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback fired when a dependency is recorded.
    pub fn on_track<F>(mut self, f: F) -> Self
    where
        F: Fn(&DebuggerEvent) + 'static,
    {
        self.on_track = Some(Rc::new(f));
        self
    }

    /// Set the callback fired when a notification triggers the effect.
    pub fn on_trigger<F>(mut self, f: F) -> Self
    where
        F: Fn(&DebuggerEvent) + 'static,
    {
        self.on_trigger = Some(Rc::new(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_track.is_none() && self.on_trigger.is_none()
    }
}

impl fmt::Debug for DebugHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugHooks")
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}
