use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use perch_db::Database;
use perch_db::models::{Cursor, NewPost, PostRow, PostScope};
use perch_types::api::{
    Claims, CreatePostRequest, ExtendedPostResponse, MediaUploadRequest, MediaUploadResponse,
    PageQuery, PostResponse, UserView,
};

use crate::auth::AppState;
use crate::enrich::Enricher;
use crate::error::{ApiError, ApiResult};
use crate::media::{MediaMethod, image_extension, new_object_key};
use crate::pagination::resolve_page;
use crate::run_blocking;
use crate::visibility::VisibilityPolicy;

pub const MAX_CONTENT_CHARS: usize = 240;
pub const MAX_IMAGES: usize = 4;

/// Check a post, comment or message body. Returns the trimmed content.
pub fn validate_body(content: &str, images: &[String]) -> ApiResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("content must not be empty"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::validation(format!(
            "content must be at most {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    if images.len() > MAX_IMAGES {
        return Err(ApiError::validation(format!("at most {} images per post", MAX_IMAGES)));
    }
    Ok(content.to_string())
}

#[derive(Clone)]
pub struct PostService {
    db: Arc<Database>,
    policy: VisibilityPolicy,
    enricher: Enricher,
}

impl PostService {
    pub fn new(db: Arc<Database>, policy: VisibilityPolicy, enricher: Enricher) -> Self {
        Self { db, policy, enricher }
    }

    pub fn create_post(&self, author: Uuid, req: CreatePostRequest) -> ApiResult<PostResponse> {
        let content = validate_body(&req.content, &req.images)?;
        let id = Uuid::new_v4().to_string();

        let row = self.db.insert_post(&NewPost {
            id: &id,
            author_id: &author.to_string(),
            content: &content,
            images: &req.images,
            parent_id: None,
        })?;

        info!("{} created post {}", author, id);
        Ok(self.enricher.post(&row))
    }

    pub fn get_post(&self, viewer: Uuid, post_id: Uuid) -> ApiResult<ExtendedPostResponse> {
        let row = self.policy.ensure_content_visible(viewer, post_id)?;
        self.enricher.extend(row)
    }

    /// Newest top-level posts, engagement first. Posts by authors the viewer
    /// can't see are skipped and the walk continues past them, so a short
    /// page means the feed is exhausted in that direction.
    pub fn latest_posts(&self, viewer: Uuid, query: &PageQuery) -> ApiResult<Vec<ExtendedPostResponse>> {
        let mut page = resolve_page(query)?;
        let limit = page.limit as usize;
        let backwards = matches!(page.cursor, Some(Cursor::Before(_)));
        let mut scope = self.policy.scope(viewer);
        let mut visible: Vec<PostRow> = Vec::with_capacity(limit);

        loop {
            let rows = self.db.list_posts_page(PostScope::TopLevel, &page)?;
            let exhausted = rows.len() < limit;
            // Rows come back in listing order either way; the batch edge
            // farthest from the cursor is where the next batch starts.
            let edge = if backwards { rows.first() } else { rows.last() };
            let next = edge.map(|row| row.id.clone());

            let kept = scope.retain_visible(rows)?;
            if backwards {
                visible.splice(0..0, kept);
            } else {
                visible.extend(kept);
            }

            match next {
                Some(id) if !exhausted && visible.len() < limit => {
                    page.cursor = Some(if backwards { Cursor::Before(id) } else { Cursor::After(id) });
                }
                _ => break,
            }
        }

        if visible.len() > limit {
            if backwards {
                visible.drain(..visible.len() - limit);
            } else {
                visible.truncate(limit);
            }
        }
        self.enricher.extend_all(visible)
    }

    pub fn posts_by_author(
        &self,
        viewer: Uuid,
        author: Uuid,
        query: &PageQuery,
    ) -> ApiResult<Vec<ExtendedPostResponse>> {
        let page = resolve_page(query)?;
        self.policy.ensure_owner_visible(viewer, author)?;

        let rows = self
            .db
            .list_posts_page(PostScope::ByAuthor(&author.to_string()), &page)?;
        self.enricher.extend_all(rows)
    }

    pub fn post_author(&self, viewer: Uuid, post_id: Uuid) -> ApiResult<UserView> {
        let row = self.policy.ensure_content_visible(viewer, post_id)?;
        let author = self.db.get_user_by_id(&row.author_id)?.ok_or(ApiError::NotFound)?;
        Ok(self.enricher.user_view(&author))
    }

    pub fn delete_post(&self, actor: Uuid, post_id: Uuid) -> ApiResult<()> {
        let row = self.policy.ensure_content_visible(actor, post_id)?;
        if row.author_id != actor.to_string() {
            return Err(ApiError::Forbidden("NOT_POST_AUTHOR"));
        }

        if !self.db.delete_post(&row.id)? {
            return Err(ApiError::NotFound);
        }
        info!("{} deleted post {}", actor, row.id);
        Ok(())
    }

    /// A signed PUT URL for a new image under the actor's prefix.
    pub fn upload_media_url(&self, actor: Uuid, req: &MediaUploadRequest) -> ApiResult<MediaUploadResponse> {
        let ext = image_extension(&req.file_type).ok_or_else(|| {
            ApiError::validation(format!("unsupported file type '{}'", req.file_type))
        })?;

        let object_key = new_object_key(&format!("posts/{}", actor), &ext);
        let put_url = self.enricher.media().sign(&object_key, MediaMethod::Put);
        Ok(MediaUploadResponse { put_url, object_key })
    }
}

// -- Handlers --

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = run_blocking(state, move |s| s.posts.create_post(claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let post = run_blocking(state, move |s| s.posts.get_post(claims.sub, post_id)).await?;
    Ok(Json(post))
}

pub async fn latest_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = run_blocking(state, move |s| s.posts.latest_posts(claims.sub, &query)).await?;
    Ok(Json(posts))
}

pub async fn posts_by_author(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = run_blocking(state, move |s| s.posts.posts_by_author(claims.sub, user_id, &query)).await?;
    Ok(Json(posts))
}

pub async fn post_author(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let author = run_blocking(state, move |s| s.posts.post_author(claims.sub, post_id)).await?;
    Ok(Json(author))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(state, move |s| s.posts.delete_post(claims.sub, post_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_media_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MediaUploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let upload = state.posts.upload_media_url(claims.sub, &req)?;
    Ok(Json(upload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaSigner;
    use perch_db::models::{NewUser, UserUpdate};

    struct Fixture {
        db: Arc<Database>,
        posts: PostService,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let media = MediaSigner::new("http://media.test", b"secret").unwrap();
        let posts = PostService::new(
            db.clone(),
            VisibilityPolicy::new(db.clone()),
            Enricher::new(db.clone(), media),
        );
        Fixture { db, posts }
    }

    fn user(db: &Database, username: &str, public: bool) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&NewUser {
            id: &id.to_string(),
            name: username,
            username,
            email: &format!("{}@example.com", username),
            password_hash: "x",
        })
        .unwrap();
        db.update_user(
            &id.to_string(),
            &UserUpdate {
                public_account: Some(public),
                ..Default::default()
            },
        )
        .unwrap();
        id
    }

    fn write(posts: &PostService, author: Uuid, content: &str) -> Uuid {
        posts
            .create_post(
                author,
                CreatePostRequest {
                    content: content.into(),
                    images: vec![],
                },
            )
            .unwrap()
            .id
    }

    #[test]
    fn body_validation() {
        assert_eq!(validate_body("  hi  ", &[]).unwrap(), "hi");
        assert!(validate_body("   ", &[]).is_err());
        assert!(validate_body(&"x".repeat(241), &[]).is_err());
        assert!(validate_body(&"é".repeat(240), &[]).is_ok());
        assert!(validate_body("hi", &vec!["k".to_string(); 5]).is_err());
    }

    #[test]
    fn private_author_is_hidden_from_non_followers() {
        let f = fixture();
        let private = user(&f.db, "private", false);
        let stranger = user(&f.db, "stranger", true);
        let post = write(&f.posts, private, "secret");

        assert!(matches!(f.posts.get_post(stranger, post), Err(ApiError::NotFound)));
        assert!(matches!(
            f.posts.posts_by_author(stranger, private, &PageQuery::default()),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(f.posts.post_author(stranger, post), Err(ApiError::NotFound)));

        f.db.insert_follow(&stranger.to_string(), &private.to_string()).unwrap();
        let listed = f.posts.posts_by_author(stranger, private, &PageQuery::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].author.username, "private");
        assert_eq!(f.posts.post_author(stranger, post).unwrap().id, private);
    }

    #[test]
    fn latest_posts_skips_invisible_authors() {
        let f = fixture();
        let open = user(&f.db, "open", true);
        let closed = user(&f.db, "closed", false);
        let viewer = user(&f.db, "viewer", true);
        write(&f.posts, open, "visible");
        write(&f.posts, closed, "hidden");

        let feed = f.posts.latest_posts(viewer, &PageQuery::default()).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].content, "visible");

        let own_feed = f.posts.latest_posts(closed, &PageQuery::default()).unwrap();
        assert_eq!(own_feed.len(), 2);
    }

    fn pin_created_at(db: &Database, post: Uuid, created_at: &str) {
        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE posts SET created_at = ?1 WHERE id = ?2",
                (created_at, post.to_string()),
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn latest_posts_walks_past_hidden_authors_to_fill_the_page() {
        let f = fixture();
        let open = user(&f.db, "open", true);
        let closed = user(&f.db, "closed", false);
        let viewer = user(&f.db, "viewer", true);

        let oldest = write(&f.posts, open, "oldest");
        pin_created_at(&f.db, oldest, "2024-01-01 00:00:01.000");
        for i in 2..=4 {
            let hidden = write(&f.posts, closed, "hidden");
            pin_created_at(&f.db, hidden, &format!("2024-01-01 00:00:0{}.000", i));
        }
        let newest = write(&f.posts, open, "newest");
        pin_created_at(&f.db, newest, "2024-01-01 00:00:05.000");

        let ids = |query: PageQuery| -> Vec<Uuid> {
            f.posts
                .latest_posts(viewer, &query)
                .unwrap()
                .into_iter()
                .map(|p| p.id)
                .collect()
        };

        let first = ids(PageQuery {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(first, vec![newest, oldest]);

        let after_newest = ids(PageQuery {
            limit: Some(1),
            after: Some(newest),
            ..Default::default()
        });
        assert_eq!(after_newest, vec![oldest]);

        let before_oldest = ids(PageQuery {
            limit: Some(1),
            before: Some(oldest),
            ..Default::default()
        });
        assert_eq!(before_oldest, vec![newest]);

        assert!(ids(PageQuery {
            limit: Some(1),
            after: Some(oldest),
            ..Default::default()
        })
        .is_empty());
    }

    #[test]
    fn only_the_author_can_delete() {
        let f = fixture();
        let author = user(&f.db, "author", true);
        let other = user(&f.db, "other", true);
        let post = write(&f.posts, author, "mine");

        assert!(matches!(
            f.posts.delete_post(other, post),
            Err(ApiError::Forbidden(_))
        ));
        f.posts.delete_post(author, post).unwrap();
        assert!(matches!(f.posts.get_post(author, post), Err(ApiError::NotFound)));
        assert!(matches!(f.posts.delete_post(author, post), Err(ApiError::NotFound)));
    }

    #[test]
    fn extended_post_carries_counts() {
        let f = fixture();
        let author = user(&f.db, "author", true);
        let fan = user(&f.db, "fan", true);
        let post = write(&f.posts, author, "hello");

        f.db.insert_reaction(&post.to_string(), &fan.to_string(), "LIKE").unwrap();
        f.db.insert_reaction(&post.to_string(), &fan.to_string(), "RETWEET").unwrap();

        let extended = f.posts.get_post(fan, post).unwrap();
        assert_eq!((extended.qty_likes, extended.qty_retweets, extended.qty_comments), (1, 1, 0));
        assert_eq!(extended.author.id, author);
    }

    #[test]
    fn upload_url_requires_an_image_type() {
        let f = fixture();
        let actor = Uuid::new_v4();

        let upload = f
            .posts
            .upload_media_url(actor, &MediaUploadRequest { file_type: "png".into() })
            .unwrap();
        assert!(upload.object_key.starts_with(&format!("posts/{}/", actor)));
        assert!(upload.put_url.contains("method=PUT"));

        assert!(matches!(
            f.posts.upload_media_url(actor, &MediaUploadRequest { file_type: "gif".into() }),
            Err(ApiError::Validation(_))
        ));
    }
}
