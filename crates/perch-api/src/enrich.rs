use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use perch_db::Database;
use perch_db::models::{PostRow, UserRow};
use perch_types::api::{ExtendedPostResponse, PostResponse, UserView};

use crate::convert::{parse_id, parse_timestamp};
use crate::error::ApiResult;
use crate::media::{MediaMethod, MediaSigner};

/// Attaches author summaries, engagement counts and signed media URLs to
/// rows on their way out to clients.
#[derive(Clone)]
pub struct Enricher {
    db: Arc<Database>,
    media: MediaSigner,
}

impl Enricher {
    pub fn new(db: Arc<Database>, media: MediaSigner) -> Self {
        Self { db, media }
    }

    pub fn media(&self) -> &MediaSigner {
        &self.media
    }

    pub fn user_view(&self, row: &UserRow) -> UserView {
        UserView {
            id: parse_id(&row.id, "user id"),
            name: row.name.clone(),
            username: row.username.clone(),
            profile_picture: row
                .profile_picture_key
                .as_deref()
                .map(|key| self.media.sign(key, MediaMethod::Get)),
        }
    }

    pub fn images(&self, references: &[String]) -> Vec<String> {
        references.iter().map(|r| self.media.resolve(r)).collect()
    }

    pub fn post(&self, row: &PostRow) -> PostResponse {
        PostResponse {
            id: parse_id(&row.id, "post id"),
            author_id: parse_id(&row.author_id, "post author_id"),
            content: row.content.clone(),
            images: self.images(&row.images),
            parent_id: row.parent_id.as_deref().map(|p| parse_id(p, "post parent_id")),
            created_at: parse_timestamp(&row.created_at),
        }
    }

    pub fn extend(&self, row: PostRow) -> ApiResult<ExtendedPostResponse> {
        self.extend_with(row, &mut HashMap::new())
    }

    /// Enrich a batch, loading each distinct author once.
    pub fn extend_all(&self, rows: Vec<PostRow>) -> ApiResult<Vec<ExtendedPostResponse>> {
        let mut authors = HashMap::new();
        rows.into_iter()
            .map(|row| self.extend_with(row, &mut authors))
            .collect()
    }

    fn extend_with(
        &self,
        row: PostRow,
        authors: &mut HashMap<String, UserView>,
    ) -> ApiResult<ExtendedPostResponse> {
        let author = match authors.get(&row.author_id) {
            Some(view) => view.clone(),
            None => {
                let user = self.db.get_user_by_id(&row.author_id)?.ok_or_else(|| {
                    anyhow::anyhow!("author {} of post {} is missing", row.author_id, row.id)
                })?;
                let view = self.user_view(&user);
                authors.insert(row.author_id.clone(), view.clone());
                view
            }
        };

        let counts = self.db.engagement_counts(&row.id)?;
        let base = self.post(&row);

        Ok(ExtendedPostResponse {
            id: base.id,
            author_id: base.author_id,
            content: base.content,
            images: base.images,
            parent_id: base.parent_id,
            created_at: base.created_at,
            author,
            qty_comments: counts.comments,
            qty_likes: counts.likes,
            qty_retweets: counts.retweets,
        })
    }

    /// The UserView for an account id, if it exists.
    pub fn user_by_id(&self, id: Uuid) -> ApiResult<Option<UserView>> {
        Ok(self.db.get_user_by_id(&id.to_string())?.map(|u| self.user_view(&u)))
    }
}
