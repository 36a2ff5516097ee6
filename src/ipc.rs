//! Daemon side: Unix-socket control server, the control loop thread, and
//! action dispatch.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use dispatch::{Dispatched, dispatch_action};
pub use server::{client_request, run_daemon};
