//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between a client following lesson
//! generation and the API server.

use lesson_core::domain::{LessonEvent, LessonId, LessonStatus};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts forwarding the events of one lesson. May be sent repeatedly to
    /// follow several lessons on the same connection.
    Subscribe { lesson_id: LessonId },

    /// Stops forwarding the events of one lesson.
    Unsubscribe { lesson_id: LessonId },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms a subscription with the lesson's current status, so a client
    /// that joins late knows where generation stands.
    Subscribed {
        lesson_id: LessonId,
        status: Option<LessonStatus>,
    },

    Unsubscribed { lesson_id: LessonId },

    /// A progress, ready or error event for a subscribed lesson.
    LessonEvent(LessonEvent),

    /// Reports a problem with a client message; the connection stays open.
    Error { message: String },
}
