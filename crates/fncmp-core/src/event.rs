//! DOM event kinds, wire listeners, and inbound event payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ListenerId;

macro_rules! event_kinds {
    ($($variant:ident => $name:literal,)*) => {
        /// DOM event a listener can be attached to.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum EventKind {
            $(
                #[doc = concat!("The `", $name, "` event.")]
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl EventKind {
            /// Every supported kind, in declaration order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant),*];

            /// The DOM event name.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }

        impl FromStr for EventKind {
            type Err = UnknownEventKind;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)*
                    other => Err(UnknownEventKind(other.to_owned())),
                }
            }
        }
    };
}

event_kinds! {
    Abort => "abort",
    AnimationEnd => "animationend",
    AnimationIteration => "animationiteration",
    AnimationStart => "animationstart",
    Blur => "blur",
    CanPlay => "canplay",
    CanPlayThrough => "canplaythrough",
    ChangeCapture => "changecapture",
    Click => "click",
    CompositionEnd => "compositionend",
    CompositionStart => "compositionstart",
    CompositionUpdate => "compositionupdate",
    ContextMenuCapture => "contextmenucapture",
    Copy => "copy",
    Cut => "cut",
    DoubleClickCapture => "doubleclickcapture",
    Drag => "drag",
    DragEnd => "dragend",
    DragEnter => "dragenter",
    DragExitCapture => "dragexitcapture",
    DragLeave => "dragleave",
    DragOver => "dragover",
    DragStart => "dragstart",
    Drop => "drop",
    DurationChange => "durationchange",
    Emptied => "emptied",
    Encrypted => "encrypted",
    Ended => "ended",
    Error => "error",
    Focus => "focus",
    GotPointerCapture => "gotpointercapture",
    Input => "input",
    Invalid => "invalid",
    KeyDown => "keydown",
    KeyPress => "keypress",
    KeyUp => "keyup",
    Load => "load",
    LoadEnd => "loadend",
    LoadStart => "loadstart",
    LoadedData => "loadeddata",
    LoadedMetadata => "loadedmetadata",
    LostPointerCapture => "lostpointercapture",
    MouseDown => "mousedown",
    MouseEnter => "mouseenter",
    MouseLeave => "mouseleave",
    MouseMove => "mousemove",
    MouseOut => "mouseout",
    MouseOver => "mouseover",
    MouseUp => "mouseup",
    Pause => "pause",
    Play => "play",
    Playing => "playing",
    PointerCancel => "pointercancel",
    PointerDown => "pointerdown",
    PointerEnter => "pointerenter",
    PointerLeave => "pointerleave",
    PointerMove => "pointermove",
    PointerOut => "pointerout",
    PointerOver => "pointerover",
    PointerUp => "pointerup",
    Progress => "progress",
    RateChange => "ratechange",
    ResetCapture => "resetcapture",
    Scroll => "scroll",
    Seeked => "seeked",
    Seeking => "seeking",
    SelectCapture => "selectcapture",
    Stalled => "stalled",
    Submit => "submit",
    Suspend => "suspend",
    TimeUpdate => "timeupdate",
    Toggle => "toggle",
    TouchCancel => "touchcancel",
    TouchEnd => "touchend",
    TouchMove => "touchmove",
    TouchStart => "touchstart",
    TransitionEnd => "transitionend",
    VolumeChange => "volumechange",
    Waiting => "waiting",
    Wheel => "wheel",
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name outside the [`EventKind`] set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind '{0}'")]
pub struct UnknownEventKind(pub String);

/// Listener descriptor sent to the client alongside rendered markup.
///
/// The client attaches a DOM handler for `on` to the wrapped element and
/// reports triggers back as an `event` dispatch carrying `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventListener {
    /// Server-generated listener id.
    pub id: ListenerId,
    /// DOM event to listen for.
    pub on: EventKind,
    /// Optional form action / route hint echoed back by the client.
    #[serde(default)]
    pub action: String,
    /// Optional HTTP-style method hint echoed back by the client.
    #[serde(default)]
    pub method: String,
}

impl EventListener {
    /// Listener with a fresh id and no action or method.
    pub fn new(on: EventKind) -> Self {
        Self {
            id: ListenerId::new(),
            on,
            action: String::new(),
            method: String::new(),
        }
    }

    /// Set the action hint.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Set the method hint.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

/// Payload of an inbound `event` dispatch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FnEvent {
    /// Listener that fired.
    pub id: ListenerId,
    /// Kind reported by the client, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<EventKind>,
    /// Action hint echoed from the listener.
    #[serde(default)]
    pub action: String,
    /// Method hint echoed from the listener.
    #[serde(default)]
    pub method: String,
    /// Event-specific data collected by the client (form values, key, ...).
    #[serde(default)]
    pub data: Value,
}

impl FnEvent {
    /// Event payload reporting that `listener` fired.
    pub fn from_listener(listener: &EventListener, data: Value) -> Self {
        Self {
            id: listener.id.clone(),
            on: Some(listener.on),
            action: listener.action.clone(),
            method: listener.method.clone(),
            data,
        }
    }
}
