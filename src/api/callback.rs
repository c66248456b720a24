//! Event callbacks for session observers
//!
//! Collaborators (recording, UI) register callbacks to hear about floor
//! changes, conveyance transitions and fix outcomes without polling.

use std::collections::HashMap;

use crate::api::types::FixDisposition;
use crate::core::FixSource;

/// Callback function type for session events
pub type EventCallback = Box<dyn Fn(SessionEvent) + Send>;

/// Events raised while processing sensor input
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Recording started at the given reference point
    Started { latitude: f64, longitude: f64 },
    Stopped,
    /// Barometric baseline established
    ElevationCalibrated { baseline_m: f32 },
    FloorChanged { floor: i32, change: i32 },
    ConveyanceEntered,
    ConveyanceExited,
    FixProcessed { source: FixSource, disposition: FixDisposition },
    /// An update was skipped after a numeric fault
    NumericFault { context: String },
}

/// Callback registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u32);

impl CallbackHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

#[derive(Default)]
pub struct CallbackRegistry {
    counter: u32,
    callbacks: HashMap<CallbackHandle, EventCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: EventCallback) -> CallbackHandle {
        self.counter += 1;
        let handle = CallbackHandle(self.counter);
        self.callbacks.insert(handle, callback);
        handle
    }

    /// Remove a callback; false if the handle was unknown
    pub fn unregister(&mut self, handle: CallbackHandle) -> bool {
        self.callbacks.remove(&handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn trigger(&self, event: SessionEvent) {
        for callback in self.callbacks.values() {
            callback(event.clone());
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registered", &self.callbacks.len())
            .finish()
    }
}
