/// Database row types. These map directly to SQLite rows.
/// Distinct from perch-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub public_account: bool,
    pub profile_picture_key: Option<String>,
    pub created_at: String,
}

pub struct FollowRow {
    pub follower_id: String,
    pub followed_id: String,
    pub created_at: String,
}

/// A post or a comment. Comments carry `is_comment` and the parent's id.
pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub images: Vec<String>,
    pub parent_id: Option<String>,
    pub is_comment: bool,
    pub created_at: String,
}

pub struct ReactionRow {
    pub post_id: String,
    pub user_id: String,
    pub kind: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub images: Vec<String>,
    pub created_at: String,
}

/// Read-time engagement counters for a single post.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngagementCounts {
    pub comments: u64,
    pub likes: u64,
    pub retweets: u64,
}

// -- Write inputs --

pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

#[derive(Default)]
pub struct UserUpdate<'a> {
    pub name: Option<&'a str>,
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub public_account: Option<bool>,
}

pub struct NewPost<'a> {
    pub id: &'a str,
    pub author_id: &'a str,
    pub content: &'a str,
    pub images: &'a [String],
    /// Set for comments.
    pub parent_id: Option<&'a str>,
}

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub content: &'a str,
    pub images: &'a [String],
}

// -- Pagination --

/// Boundary of a cursor page, by post id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Items strictly preceding this id in listing order.
    Before(String),
    /// Items strictly following this id in listing order.
    After(String),
}

/// A validated cursor page request. Listing order is reaction count desc,
/// created_at desc, id desc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub cursor: Option<Cursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPage {
    pub limit: u32,
    pub skip: u32,
}

/// Candidate set for a paginated post listing.
#[derive(Debug, Clone, Copy)]
pub enum PostScope<'a> {
    /// Every top-level post.
    TopLevel,
    /// Top-level posts written by one author.
    ByAuthor(&'a str),
    /// Comments attached to one parent post.
    CommentsOf(&'a str),
}
