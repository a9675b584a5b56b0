//! The `Dispatch` wire message.
//!
//! Every frame exchanged with a client is one JSON-encoded [`Dispatch`].
//! The `function` field selects which payload is meaningful; the others are
//! omitted on the wire. Constructors here only ever populate the payload that
//! matches their function.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{DispatchError, Result};
use crate::event::{EventListener, FnEvent};
use crate::ids::{ConnId, HandlerId};

/// Which command (or report) a dispatch carries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Function {
    /// Replace or insert rendered markup.
    Render,
    /// Navigate the client to a URL.
    Redirect,
    /// Client-reported DOM event.
    Event,
    /// Invoke a named client-side function.
    Custom,
    /// Error report.
    Error,
    /// Liveness probe.
    Ping,
    /// Add or remove CSS classes.
    Class,
    /// Any name outside the protocol; kept so loops can report it.
    Unknown(String),
}

impl Function {
    /// Wire name of the function.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Render => "render",
            Self::Redirect => "redirect",
            Self::Event => "event",
            Self::Custom => "custom",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Class => "class",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for Function {
    fn from(s: String) -> Self {
        match s.as_str() {
            "render" => Self::Render,
            "redirect" => Self::Redirect,
            "event" => Self::Event,
            "custom" => Self::Custom,
            "error" => Self::Error,
            "ping" => Self::Ping,
            "class" => Self::Class,
            _ => Self::Unknown(s),
        }
    }
}

impl From<Function> for String {
    fn from(f: Function) -> Self {
        match f {
            Function::Unknown(name) => name,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document-level element a render can target instead of an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// `<html>`
    Html,
    /// `<head>`
    Head,
    /// `<body>`
    Body,
    /// `<main>`
    Main,
}

/// DOM mutation payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FnRender {
    /// Element id to apply the mutation to.
    pub target_id: String,
    /// Document tag to apply the mutation to when no id is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
    /// Replace the target's children.
    pub inner: bool,
    /// Replace the target itself.
    pub outer: bool,
    /// Insert after the target's last child.
    pub append: bool,
    /// Insert before the target's first child.
    pub prepend: bool,
    /// Markup to apply.
    pub html: String,
    /// Listeners the client must attach inside `html`.
    pub event_listeners: Vec<EventListener>,
}

/// Liveness probe payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FnPing {
    /// Probe originated on the server.
    pub server: bool,
    /// Probe originated on the client.
    pub client: bool,
}

/// CSS class mutation payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FnClass {
    /// Element id whose class list changes.
    pub target_id: String,
    /// Remove `names` instead of adding them.
    pub remove: bool,
    /// Class names.
    pub names: Vec<String>,
}

/// Navigation payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FnRedirect {
    /// Destination URL.
    pub url: String,
}

/// Client-side function call payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FnCustom {
    /// Name of the registered client function.
    pub function: String,
    /// Argument passed to it.
    pub data: Value,
    /// Return value, when the client reports one.
    pub result: Value,
}

/// Error report payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FnError {
    /// Human-readable description.
    pub message: String,
    /// Machine-readable code, when produced by the engine.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub code: String,
}

/// One protocol message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Message id.
    #[serde(default)]
    pub id: String,
    /// Active function.
    pub function: Function,
    /// Connection the message belongs to.
    #[serde(default)]
    pub conn_id: ConnId,
    /// Handler serving that connection.
    #[serde(default)]
    pub handler_id: HandlerId,
    /// Free-form label for client-side routing or debugging.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    /// Action hint copied from the triggering listener.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    /// `render` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<FnRender>,
    /// `redirect` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<FnRedirect>,
    /// `custom` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<FnCustom>,
    /// `class` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<FnClass>,
    /// `ping` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<FnPing>,
    /// `error` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FnError>,
    /// `event` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<FnEvent>,
}

impl Dispatch {
    fn empty(function: Function) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            function,
            conn_id: ConnId::default(),
            handler_id: HandlerId::default(),
            label: String::new(),
            action: String::new(),
            render: None,
            redirect: None,
            custom: None,
            class: None,
            ping: None,
            error: None,
            event: None,
        }
    }

    /// A `render` dispatch.
    pub fn render(payload: FnRender) -> Self {
        Self {
            render: Some(payload),
            ..Self::empty(Function::Render)
        }
    }

    /// A `redirect` dispatch.
    pub fn redirect(url: impl Into<String>) -> Self {
        Self {
            redirect: Some(FnRedirect { url: url.into() }),
            ..Self::empty(Function::Redirect)
        }
    }

    /// A `custom` dispatch calling `function` with `data`.
    pub fn custom(function: impl Into<String>, data: Value) -> Self {
        Self {
            custom: Some(FnCustom {
                function: function.into(),
                data,
                result: Value::Null,
            }),
            ..Self::empty(Function::Custom)
        }
    }

    /// A `class` dispatch.
    pub fn class(payload: FnClass) -> Self {
        Self {
            class: Some(payload),
            ..Self::empty(Function::Class)
        }
    }

    /// A server-initiated `ping` dispatch.
    pub fn ping() -> Self {
        Self {
            ping: Some(FnPing {
                server: true,
                client: false,
            }),
            ..Self::empty(Function::Ping)
        }
    }

    /// An `error` dispatch with a plain message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(FnError {
                message: message.into(),
                code: String::new(),
            }),
            ..Self::empty(Function::Error)
        }
    }

    /// An `error` dispatch describing `err`, carrying its code.
    pub fn from_error(err: &DispatchError) -> Self {
        Self {
            error: Some(FnError {
                message: err.to_string(),
                code: err.code().to_owned(),
            }),
            ..Self::empty(Function::Error)
        }
    }

    /// An `event` dispatch (as sent by a client).
    pub fn event(payload: FnEvent) -> Self {
        Self {
            action: payload.action.clone(),
            event: Some(payload),
            ..Self::empty(Function::Event)
        }
    }

    /// Set the connection and handler this dispatch belongs to.
    #[must_use]
    pub fn stamped(mut self, conn_id: &ConnId, handler_id: &HandlerId) -> Self {
        self.conn_id = conn_id.clone();
        self.handler_id = handler_id.clone();
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Decode a dispatch from a text frame.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode this dispatch as a text frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(DispatchError::from)
    }

    /// Error message, when this is an `error` dispatch.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::ids::ListenerId;

    #[test]
    fn function_names_parse() {
        assert_eq!(Function::from("render".to_owned()), Function::Render);
        assert_eq!(Function::from("class".to_owned()), Function::Class);
        assert_eq!(
            Function::from("teleport".to_owned()),
            Function::Unknown("teleport".into())
        );
    }

    #[test]
    fn unknown_function_survives_decoding() {
        let d = Dispatch::from_json(r#"{"function":"teleport","conn_id":"c1"}"#).unwrap();
        assert_eq!(d.function, Function::Unknown("teleport".into()));
        assert_eq!(d.function.as_str(), "teleport");
        assert_eq!(d.conn_id.as_str(), "c1");
    }

    #[test]
    fn missing_function_is_invalid_payload() {
        let err = Dispatch::from_json(r#"{"id":"x"}"#).unwrap_err();
        assert_eq!(err.code(), crate::errors::INVALID_PAYLOAD);
    }

    #[test]
    fn constructors_fill_only_their_payload() {
        let d = Dispatch::redirect("/home");
        assert_eq!(d.function, Function::Redirect);
        assert!(d.redirect.is_some());
        assert!(d.render.is_none() && d.custom.is_none() && d.error.is_none());

        let d = Dispatch::error("boom");
        assert_eq!(d.error_message(), Some("boom"));
        assert!(d.redirect.is_none());
    }

    #[test]
    fn from_error_carries_code() {
        let err = DispatchError::not_found("listener", "l-404");
        let d = Dispatch::from_error(&err);
        let payload = d.error.unwrap();
        assert_eq!(payload.code, "NOT_FOUND");
        assert!(payload.message.contains("l-404"));
    }

    #[test]
    fn stamped_sets_ids() {
        let d = Dispatch::ping().stamped(&ConnId::from("c1"), &HandlerId::from("h1"));
        assert_eq!(d.conn_id.as_str(), "c1");
        assert_eq!(d.handler_id.as_str(), "h1");
        assert_eq!(d.ping, Some(FnPing { server: true, client: false }));
    }

    #[test]
    fn render_wire_shape() {
        let mut d = Dispatch::render(FnRender {
            target_id: "counter".into(),
            inner: true,
            html: "<b>1</b>".into(),
            ..FnRender::default()
        })
        .stamped(&ConnId::from("c1"), &HandlerId::from("h1"));
        d.id = "d1".into();
        insta::assert_json_snapshot!(d, @r#"
        {
          "id": "d1",
          "function": "render",
          "conn_id": "c1",
          "handler_id": "h1",
          "render": {
            "target_id": "counter",
            "inner": true,
            "outer": false,
            "append": false,
            "prepend": false,
            "html": "<b>1</b>",
            "event_listeners": []
          }
        }
        "#);
    }

    #[test]
    fn decodes_client_event() {
        let text = r#"{
            "function": "event",
            "conn_id": "c1",
            "handler_id": "h1",
            "event": {"id": "l1", "on": "click", "action": "", "method": "", "data": {"x": 1}}
        }"#;
        let d = Dispatch::from_json(text).unwrap();
        assert_eq!(d.function, Function::Event);
        let ev = d.event.unwrap();
        assert_eq!(ev.id, ListenerId::from("l1"));
        assert_eq!(ev.on, Some(EventKind::Click));
        assert_eq!(ev.data["x"], 1);
    }

    #[test]
    fn tag_serializes_lowercase() {
        let r = FnRender {
            tag: Some(Tag::Body),
            ..FnRender::default()
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["tag"], "body");
    }
}
