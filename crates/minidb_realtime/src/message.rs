//! Messages delivered to connections.

use bytes::Bytes;
use tokio_tungstenite::tungstenite;

/// A message queued for, or received from, a connection.
///
/// Cloning is cheap for binary messages; text is copied per recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl Message {
    /// Creates a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Creates a text message holding serialized JSON.
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self::Text(value.to_string())
    }

    /// Returns the text, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Parses a text message as JSON.
    #[must_use]
    pub fn to_json(&self) -> Option<serde_json::Value> {
        self.as_text().and_then(|text| serde_json::from_str(text).ok())
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts a WebSocket frame into a message.
    ///
    /// Control frames (ping, pong, close) carry no application data and
    /// yield `None`.
    #[must_use]
    pub fn from_frame(frame: tungstenite::Message) -> Option<Self> {
        match frame {
            tungstenite::Message::Text(text) => Some(Self::Text(text.as_str().to_owned())),
            tungstenite::Message::Binary(data) => Some(Self::Binary(data)),
            _ => None,
        }
    }
}

impl From<Message> for tungstenite::Message {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => tungstenite::Message::text(text),
            Message::Binary(data) => tungstenite::Message::binary(data),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
