//! `hoot-cockpit` – network surfaces of the owl.
//!
//! 1. [`CockpitServer`] (default port `9123`) accepts commands over HTTP:
//!    `POST /owl/command`, `POST /owl/stop`, the legacy `POST /owl/text`,
//!    and `GET /health`.
//! 2. [`EventMonitor`] (default port `9124`) streams every bus event to
//!    WebSocket clients and accepts command frames from them.
//!
//! Both are thin: validation and dispatch live in `hoot-runtime`.

pub mod api;
pub mod monitor;
pub mod server;

pub use monitor::{DEFAULT_MONITOR_PORT, EventMonitor};
pub use server::{ApiError, CockpitServer, DEFAULT_PORT, router};
