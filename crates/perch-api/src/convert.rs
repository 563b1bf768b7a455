//! Row -> DTO conversions shared by the services.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use perch_db::models::{FollowRow, MessageRow, ReactionRow};
use perch_types::api::{FollowResponse, MessageResponse, ReactionResponse};
use perch_types::models::ReactionKind;

pub fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS.SSS" without timezone.
/// Parse as naive UTC, accepting RFC 3339 as well.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn reaction_response(row: &ReactionRow) -> ReactionResponse {
    ReactionResponse {
        post_id: parse_id(&row.post_id, "reaction post_id"),
        user_id: parse_id(&row.user_id, "reaction user_id"),
        kind: row.kind.parse().unwrap_or_else(|e| {
            warn!("Corrupt reaction kind on post '{}': {}", row.post_id, e);
            ReactionKind::Like
        }),
    }
}

pub fn follow_response(row: &FollowRow) -> FollowResponse {
    FollowResponse {
        follower_id: parse_id(&row.follower_id, "follower_id"),
        followed_id: parse_id(&row.followed_id, "followed_id"),
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn message_response(row: MessageRow, images: Vec<String>) -> MessageResponse {
    MessageResponse {
        id: parse_id(&row.id, "message id"),
        sender_id: parse_id(&row.sender_id, "sender_id"),
        receiver_id: parse_id(&row.receiver_id, "receiver_id"),
        content: row.content,
        images,
        created_at: parse_timestamp(&row.created_at),
    }
}
