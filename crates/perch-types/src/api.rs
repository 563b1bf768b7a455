use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ReactionKind;

// -- JWT Claims --

/// JWT claims shared across perch-api (REST middleware) and perch-gateway
/// (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

/// Login accepts either the email or the username alongside the password.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Pagination --

/// Cursor pagination query for content listings.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub before: Option<Uuid>,
    pub after: Option<Uuid>,
}

impl PageQuery {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.before.is_none() && self.after.is_none()
    }
}

/// Offset pagination query for account listings.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct OffsetQuery {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

// -- Users --

/// Public summary of an account, attached to every post as its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub public_account: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfilePictureResponse {
    pub url: Option<String>,
}

// -- Posts & comments --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub images: Vec<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A post or comment enriched with its author and engagement counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedPostResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub images: Vec<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub author: UserView,
    pub qty_comments: u64,
    pub qty_likes: u64,
    pub qty_retweets: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaUploadRequest {
    pub file_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    pub put_url: String,
    pub object_key: String,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    #[serde(rename = "type")]
    pub kind: ReactionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionResponse {
    pub post_id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ReactionKind,
}

// -- Follows --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowResponse {
    pub follower_id: Uuid,
    pub followed_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// -- Direct messages --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}
