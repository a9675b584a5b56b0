//! Concurrency-safe registries shared by an [`Engine`](crate::Engine).

pub mod connections;
pub mod handlers;
pub mod listeners;

pub use connections::ConnectionRegistry;
pub use handlers::HandlerRegistry;
pub use listeners::{ListenerRegistry, RegisteredListener};
