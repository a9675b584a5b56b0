//! Connection plumbing: the per-connection queue, heartbeat, frame type,
//! and the loops that drive one transport.

pub mod connection;
pub mod frame;
pub mod heartbeat;
pub mod session;

pub use connection::Connection;
pub use frame::Frame;
pub use heartbeat::{HeartbeatResult, run_heartbeat};
pub use session::run_connection;
