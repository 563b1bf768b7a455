use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use perch_db::models::NewUser;
use perch_db::{Database, is_constraint_violation};
use perch_gateway::Dispatcher;
use perch_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::comments::CommentService;
use crate::convert::parse_id;
use crate::enrich::Enricher;
use crate::error::{ApiError, ApiResult};
use crate::follows::FollowService;
use crate::media::MediaSigner;
use crate::messages::MessageService;
use crate::posts::PostService;
use crate::reactions::ReactionService;
use crate::run_blocking;
use crate::users::UserService;
use crate::visibility::VisibilityPolicy;

const TOKEN_LIFETIME_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub posts: PostService,
    pub comments: CommentService,
    pub reactions: ReactionService,
    pub follows: FollowService,
    pub users: UserService,
    pub messages: MessageService,
}

impl AppStateInner {
    /// Wire every service against one store, one visibility policy and one
    /// media signer.
    pub fn new(db: Arc<Database>, jwt_secret: String, media: MediaSigner, dispatcher: Dispatcher) -> Self {
        let policy = VisibilityPolicy::new(db.clone());
        let enricher = Enricher::new(db.clone(), media);

        Self {
            posts: PostService::new(db.clone(), policy.clone(), enricher.clone()),
            comments: CommentService::new(db.clone(), policy.clone(), enricher.clone()),
            reactions: ReactionService::new(db.clone(), policy.clone()),
            follows: FollowService::new(db.clone(), policy.clone()),
            users: UserService::new(db.clone(), policy, enricher.clone()),
            messages: MessageService::new(db.clone(), dispatcher.clone(), enricher),
            db,
            jwt_secret,
            dispatcher,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = run_blocking(state, move |s| register_account(&s.db, &s.jwt_secret, req)).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = run_blocking(state, move |s| authenticate(&s.db, &s.jwt_secret, req)).await?;
    Ok(Json(response))
}

pub fn register_account(db: &Database, jwt_secret: &str, req: RegisterRequest) -> ApiResult<RegisterResponse> {
    validate_username(&req.username)?;
    if req.password.chars().count() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }
    validate_email(&req.email)?;

    if db
        .get_user_by_email_or_username(Some(&req.email), Some(&req.username))?
        .is_some()
    {
        return Err(ApiError::Conflict("USER_ALREADY_EXISTS"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();

    db.create_user(&NewUser {
        id: &user_id.to_string(),
        name: &req.username,
        username: &req.username,
        email: &req.email,
        password_hash: &password_hash,
    })
    .map_err(|e| {
        if is_constraint_violation(&e) {
            warn!("lost a signup race for {}", req.username);
            ApiError::Conflict("USER_ALREADY_EXISTS")
        } else {
            ApiError::Internal(e)
        }
    })?;

    info!("registered {} ({})", req.username, user_id);

    let token = create_token(jwt_secret, user_id, &req.username)?;
    Ok(RegisterResponse { user_id, token })
}

pub fn authenticate(db: &Database, jwt_secret: &str, req: LoginRequest) -> ApiResult<LoginResponse> {
    if req.email.is_none() && req.username.is_none() {
        return Err(ApiError::validation("email or username is required"));
    }

    let user = db
        .get_user_by_email_or_username(req.email.as_deref(), req.username.as_deref())?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored hash for {} is unreadable: {}", user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id = parse_id(&user.id, "user id");
    let token = create_token(jwt_secret, user_id, &user.username)?;

    Ok(LoginResponse {
        user_id,
        username: user.username,
        token,
    })
}

pub fn validate_username(username: &str) -> ApiResult<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::validation("username must be 3 to 32 characters"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> ApiResult<()> {
    if !email.contains('@') {
        return Err(ApiError::validation("email is invalid"));
    }
    Ok(())
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate an HS256 token and return its claims.
pub fn decode_token(secret: &str, token: &str) -> ApiResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    Ok(token_data.claims)
}
