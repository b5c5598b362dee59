//! `hoot-runtime` – the command core of the owl.
//!
//! # Modules
//!
//! - [`dispatcher`] – [`CommandDispatcher`]: validates nothing itself but
//!   routes an already-validated command to speech and motion, resolving
//!   macros first.
//! - [`speech_buffer`] – [`SpeechBuffers`]: per-session accumulation of
//!   speech fragments until a trailing `!` completes an utterance.
//! - [`macros`] – [`MacroRegistry`]: named, read-only gesture sequences.
//! - [`scheduler`] – [`MovementScheduler`]: the single FIFO of gestures and
//!   the worker that drives the actuator with retries and timeouts.
//! - [`annotation`] – inline `[TLTFRONT,1.5]` style markers in speech text.
//! - [`telemetry`] – [`init_tracing`]: subscriber and optional OTLP export.

pub mod annotation;
pub mod dispatcher;
pub mod macros;
pub mod scheduler;
pub mod speech_buffer;
pub mod telemetry;

pub use dispatcher::{CommandDispatcher, DispatchReceipt};
pub use macros::{MacroRegistry, WELCOME_TEXT};
pub use scheduler::{MovementScheduler, SchedulerConfig, StopOutcome};
pub use speech_buffer::{SpeechBuffer, SpeechBuffers};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
