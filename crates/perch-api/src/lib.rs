pub mod auth;
pub mod comments;
pub mod convert;
pub mod enrich;
pub mod error;
pub mod follows;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod pagination;
pub mod posts;
pub mod reactions;
pub mod users;
pub mod visibility;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tracing::error;

pub use auth::{AppState, AppStateInner};
pub use error::{ApiError, ApiResult};

/// Every REST route. Everything except signup and login sits behind the
/// bearer-token middleware.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/signup", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected = Router::new()
        // Posts
        .route("/posts", get(posts::latest_posts).post(posts::create_post))
        .route("/posts/media", post(posts::upload_media_url))
        .route("/posts/by_user/{user_id}", get(posts::posts_by_author))
        .route("/posts/{post_id}", get(posts::get_post).delete(posts::delete_post))
        .route("/posts/{post_id}/author", get(posts::post_author))
        // Comments
        .route("/comments/by_user/{user_id}", get(comments::comments_by_user))
        .route(
            "/comments/{post_id}",
            get(comments::post_comments).post(comments::create_comment),
        )
        .route(
            "/comments/{post_id}/{comment_id}",
            get(comments::get_comment).delete(comments::delete_comment),
        )
        // Reactions
        .route("/reactions/likes/by_user/{user_id}", get(reactions::likes_by_user))
        .route("/reactions/retweets/by_user/{user_id}", get(reactions::retweets_by_user))
        .route("/reactions/likes/{post_id}", get(reactions::likes_by_post))
        .route("/reactions/retweets/{post_id}", get(reactions::retweets_by_post))
        .route("/reactions/{post_id}/mine", get(reactions::get_reaction))
        .route(
            "/reactions/{post_id}",
            post(reactions::react).delete(reactions::unreact),
        )
        // Follows
        .route("/follow/{user_id}", post(follows::follow))
        .route("/unfollow/{user_id}", post(follows::unfollow))
        .route("/users/{user_id}/followers", get(follows::followers))
        .route("/users/{user_id}/following", get(follows::following))
        // Users
        .route("/users", get(users::recommendations))
        .route(
            "/users/me",
            get(users::me).patch(users::update_me).delete(users::delete_me),
        )
        .route(
            "/users/me/profile_picture",
            get(users::profile_picture).post(users::profile_picture_upload),
        )
        .route("/users/by_username/{username}", get(users::search_by_username))
        .route("/users/{user_id}", get(users::get_user))
        // Direct messages
        .route(
            "/messages/{user_id}",
            get(messages::conversation).post(messages::send_message),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    public.merge(protected).with_state(state)
}

/// Run synchronous store work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}

/// `blocking`, handing the closure the shared state.
pub(crate) async fn run_blocking<T, F>(state: AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppStateInner) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    blocking(move || f(&state)).await
}
