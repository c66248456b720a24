//! Session API
//!
//! [`FusionSession`] is the single entry point for sensor input. Callers on
//! several threads share one through [`SharedSession`], and replay tools
//! drive it with serialized [`FusionEvent`]s.

pub mod callback;
pub mod conveyance;
pub mod dispatch;
pub mod session;
pub mod types;

pub use callback::{CallbackHandle, CallbackRegistry, EventCallback, SessionEvent};
pub use conveyance::{ConveyanceState, ConveyanceTracker, ConveyanceTransition};
pub use dispatch::{EventOutcome, FixSpec, FusionEvent, SharedSession};
pub use session::FusionSession;
pub use types::{
    FixDisposition, FusedPosition, JointFixOutcome, OutlierFlags, SessionStats, Tag, TrajectoryPoint,
};
