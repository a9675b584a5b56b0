//! # fncmp-core
//!
//! Types shared by every fncmp crate:
//!
//! - Branded identifiers for connections, handlers, listeners and components
//! - The [`Session`] value carried through callbacks and cache lookups
//! - The [`Dispatch`] wire message and its payloads
//! - The closed [`EventKind`] enumeration and wire event listener
//! - [`DispatchError`] and its stable machine codes
//! - `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod dispatch;
pub mod errors;
pub mod event;
pub mod ids;
pub mod logging;
pub mod session;

pub use dispatch::{Dispatch, FnClass, FnCustom, FnError, FnPing, FnRedirect, FnRender, Function, Tag};
pub use errors::DispatchError;
pub use event::{EventKind, EventListener, FnEvent};
pub use ids::{ComponentId, ConnId, HandlerId, ListenerId};
pub use session::Session;
