use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed to clients over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A direct message addressed to the connected user
    MessageCreate {
        id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        receiver_id: Uuid,
        content: String,
        images: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}
