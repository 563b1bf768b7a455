#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use perch_api::media::MediaSigner;
use perch_api::{AppState, AppStateInner};
use perch_db::Database;
use perch_db::models::{NewUser, UserUpdate};
use perch_gateway::Dispatcher;

pub const JWT_SECRET: &str = "integration-test-secret";

pub fn state() -> AppState {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let media = MediaSigner::new("http://media.test", b"media-secret").unwrap();
    Arc::new(AppStateInner::new(db, JWT_SECRET.to_string(), media, Dispatcher::new()))
}

/// Create an account directly in the store.
pub fn user(state: &AppState, username: &str, public: bool) -> Uuid {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(&NewUser {
            id: &id.to_string(),
            name: username,
            username,
            email: &format!("{}@example.com", username),
            password_hash: "not-a-real-hash",
        })
        .unwrap();
    set_public(state, id, public);
    id
}

pub fn set_public(state: &AppState, id: Uuid, public: bool) {
    state
        .db
        .update_user(
            &id.to_string(),
            &UserUpdate {
                public_account: Some(public),
                ..Default::default()
            },
        )
        .unwrap();
}

/// Pin a post's creation time so ordering doesn't depend on the clock.
pub fn set_created_at(state: &AppState, post_id: Uuid, created_at: &str) {
    state
        .db
        .with_conn_mut(|conn| {
            conn.execute(
                "UPDATE posts SET created_at = ?1 WHERE id = ?2",
                (created_at, post_id.to_string()),
            )?;
            Ok(())
        })
        .unwrap();
}
