// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod api;
pub mod app_dirs;
pub mod assessment;
pub mod clock;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod countdown;
pub mod error;
pub mod guard;
pub mod lock;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod store;
pub mod timer;
