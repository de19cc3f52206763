pub mod context;
pub mod controller;
pub mod frame;
pub mod loop_worker;
pub mod session_log;
pub mod state;

pub use context::{Reconciled, ScanContext, ScanSnapshot, ScanUpdate};
pub use controller::CaptureController;
pub use frame::{prepare_frame, FrameSpec};
pub use loop_worker::{LoopConfig, TickOutcome};
pub use session_log::{RecognitionEvent, SessionLog, Severity};
pub use state::{ApiStatus, CaptureSession, InFlightGuard, LastMatch};
