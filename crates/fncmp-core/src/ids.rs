//! Branded ID newtypes.
//!
//! Connections, session handlers, event listeners and components each get a
//! distinct string-backed type so a listener id cannot be passed where a
//! connection id is expected. Fresh ids are UUID v7.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh UUID v7 id.
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Borrow the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the id is the empty string (an unset wire field).
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Consume the id, returning the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        // Wire payloads leave ids unset rather than absent, so the default
        // is the empty id. `new()` mints a real one.
        impl Default for $name {
            fn default() -> Self {
                Self(String::new())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of one client transport connection.
    ///
    /// Supplied by the client on upgrade (`fncmp_id` query parameter) so that
    /// a page reload can rebind to the same cache namespace.
    ConnId
}

branded_id! {
    /// Identifier of a session handler.
    HandlerId
}

branded_id! {
    /// Identifier of a registered event listener.
    ListenerId
}

branded_id! {
    /// DOM id of a rendered component wrapper.
    ComponentId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_uuid_v7() {
        let id = ListenerId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("valid uuid");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(ConnId::new(), ConnId::new());
    }

    #[test]
    fn default_is_empty_not_random() {
        assert!(HandlerId::default().is_empty());
        assert!(ComponentId::default().is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ConnId::from("conn-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conn-1\"");
        let back: ConnId = serde_json::from_str("\"conn-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn deref_and_display() {
        let id = ListenerId::from("l-9");
        let s: &str = &id;
        assert_eq!(s, "l-9");
        assert_eq!(format!("{id}"), "l-9");
        assert_eq!(String::from(id), "l-9");
    }
}
