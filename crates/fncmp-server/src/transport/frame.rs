//! Transport-neutral WebSocket frame.

use axum::extract::ws::Message;

/// One frame on a full-duplex message transport.
///
/// The connection loops are written against this type so they can run over
/// an Axum WebSocket or over in-memory channels in tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text, one JSON dispatch.
    Text(String),
    /// Binary payload; accepted if it is UTF-8 JSON.
    Binary(Vec<u8>),
    /// Ping probe.
    Ping(Vec<u8>),
    /// Ping reply.
    Pong(Vec<u8>),
    /// Close handshake.
    Close,
}

impl Frame {
    /// Text content of a `Text` frame or a UTF-8 `Binary` frame.
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(bytes) => String::from_utf8(bytes).ok(),
            Self::Ping(_) | Self::Pong(_) | Self::Close => None,
        }
    }
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(bytes) => Self::Binary(bytes.to_vec()),
            Message::Ping(bytes) => Self::Ping(bytes.to_vec()),
            Message::Pong(bytes) => Self::Pong(bytes.to_vec()),
            Message::Close(_) => Self::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Ping(bytes) => Message::Ping(bytes.into()),
            Frame::Pong(bytes) => Message::Pong(bytes.into()),
            Frame::Close => Message::Close(None),
        }
    }
}
