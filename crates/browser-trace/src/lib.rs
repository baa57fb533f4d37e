pub mod config;
pub mod recorder;

pub use config::TraceConfig;
pub use recorder::{FailureCapture, TraceRecorder};
