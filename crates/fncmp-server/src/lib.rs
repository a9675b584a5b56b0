//! # fncmp-server
//!
//! The dispatch engine and its WebSocket front end:
//!
//! - [`Engine`] owns the connection and listener registries, the cache and
//!   the session handlers
//! - [`SessionHandler`] runs the inbound and outbound dispatch loops
//! - [`FnComponent`] pairs a dispatch with its markup and listener callbacks
//! - [`FncmpServer`] serves `/ws`, `/health` and `/metrics` over Axum

#![deny(unsafe_code)]

pub mod callback;
pub mod component;
pub mod config;
pub mod engine;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use callback::{Callback, CallbackResult, Context};
pub use component::{Component, FnComponent, Html, sanitize_html};
pub use config::ServerConfig;
pub use engine::Engine;
pub use handler::{HandlerState, SessionHandler};
pub use server::FncmpServer;
