mod follows;
mod messages;
mod posts;
mod reactions;
mod users;

use anyhow::Result;
use rusqlite::Row;
use rusqlite::types::Type;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Media references are stored as a JSON array in a TEXT column.
pub(crate) fn images_to_json(images: &[String]) -> Result<String> {
    Ok(serde_json::to_string(images)?)
}

pub(crate) fn images_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::Database;
    use crate::models::{NewPost, NewUser};

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, username: &str, public_account: bool) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        db.create_user(&NewUser {
            id: &id,
            name: username,
            username,
            email: &format!("{}@example.com", username),
            password_hash: "not-a-real-hash",
        })
        .unwrap();
        if !public_account {
            db.with_conn_mut(|conn| {
                conn.execute("UPDATE users SET public_account = 0 WHERE id = ?1", [&id])?;
                Ok(())
            })
            .unwrap();
        }
        id
    }

    pub fn post(db: &Database, author_id: &str, parent_id: Option<&str>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        db.insert_post(&NewPost {
            id: &id,
            author_id,
            content: "hello",
            images: &[],
            parent_id,
        })
        .unwrap();
        id
    }

    /// Pin a post's creation time so ordering tests don't depend on the clock.
    pub fn set_created_at(db: &Database, post_id: &str, created_at: &str) {
        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE posts SET created_at = ?1 WHERE id = ?2",
                [created_at, post_id],
            )?;
            Ok(())
        })
        .unwrap();
    }
}
