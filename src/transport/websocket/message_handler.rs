//! Pure routing of incoming WebSocket frames
//!
//! The envelope protocol only uses text frames. Control frames are handled
//! by tungstenite itself and are skipped here.

use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Routing decisions for incoming frames
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRoute {
    /// Payload to hand to the envelope decoder
    Deliver(String),
    /// Peer sent a close frame
    Closed { reason: Option<String> },
    /// Ping/pong and raw frames, nothing to deliver
    Skip,
}

/// Pure message routing decisions
pub struct MessageHandler;

impl MessageHandler {
    /// Route one incoming frame (pure function)
    ///
    /// Binary frames are delivered as lossy UTF-8 so a server that sends JSON
    /// as binary still reaches the decoder.
    pub fn route_frame(message: Message) -> FrameRoute {
        match message {
            Message::Text(text) => FrameRoute::Deliver(text.to_string()),
            Message::Binary(data) => {
                debug!(len = data.len(), "Binary frame received, decoding as UTF-8");
                FrameRoute::Deliver(String::from_utf8_lossy(&data).into_owned())
            }
            Message::Close(frame) => FrameRoute::Closed {
                reason: frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty()),
            },
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => FrameRoute::Skip,
        }
    }
}
