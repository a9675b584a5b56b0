//! Explicit session identity.
//!
//! A [`Session`] names the connection a unit of work belongs to and,
//! once bound, the handler serving it. It is passed by value into callbacks,
//! component renders and cache lookups.

use serde::{Deserialize, Serialize};

use crate::ids::{ConnId, HandlerId};

/// Connection-scoped identity threaded through the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    conn_id: ConnId,
    handler_id: Option<HandlerId>,
}

impl Session {
    /// Session for a connection not yet bound to a handler.
    pub fn new(conn_id: impl Into<ConnId>) -> Self {
        Self {
            conn_id: conn_id.into(),
            handler_id: None,
        }
    }

    /// Session for a connection served by `handler_id`.
    pub fn bound(conn_id: impl Into<ConnId>, handler_id: impl Into<HandlerId>) -> Self {
        Self {
            conn_id: conn_id.into(),
            handler_id: Some(handler_id.into()),
        }
    }

    /// The connection this session belongs to.
    pub fn conn_id(&self) -> &ConnId {
        &self.conn_id
    }

    /// The serving handler, when bound.
    pub fn handler_id(&self) -> Option<&HandlerId> {
        self.handler_id.as_ref()
    }

    /// Cache namespace for this session (the connection id).
    pub fn store_key(&self) -> &str {
        self.conn_id.as_str()
    }
}
