use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{NewUser, OffsetPage, UserRow, UserUpdate};

const USER_COLUMNS: &str =
    "id, name, username, email, password, public_account, profile_picture_key, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, username, email, password) VALUES (?1, ?2, ?3, ?4, ?5)",
                (user.id, user.name, user.username, user.email, user.password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Look up an account by email or username; either may be omitted. When
    /// both are given they must name the same account.
    pub fn get_user_by_email_or_username(
        &self,
        email: Option<&str>,
        username: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users
                 WHERE (?1 IS NOT NULL OR ?2 IS NOT NULL)
                   AND (?1 IS NULL OR email = ?1)
                   AND (?2 IS NULL OR username = ?2)",
                USER_COLUMNS
            );
            let row = conn.query_row(&sql, (email, username), user_from_row).optional()?;
            Ok(row)
        })
    }

    /// Apply the fields present in `update`. Returns false when the user doesn't exist.
    pub fn update_user(&self, id: &str, update: &UserUpdate<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    username = COALESCE(?3, username),
                    email = COALESCE(?4, email),
                    public_account = COALESCE(?5, public_account)
                 WHERE id = ?1",
                (id, update.name, update.username, update.email, update.public_account),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_profile_picture_key(&self, id: &str, key: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET profile_picture_key = ?2 WHERE id = ?1",
                (id, key),
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete an account. Posts, reactions, follow edges and messages cascade.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// All accounts ordered by id, offset-paginated.
    pub fn list_users(&self, page: OffsetPage) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users ORDER BY id ASC LIMIT ?1 OFFSET ?2",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((page.limit, page.skip), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Accounts whose username contains `fragment` (case-insensitive), ordered by username.
    pub fn search_users_by_username(&self, fragment: &str, page: OffsetPage) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", escape_like(fragment));

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE username LIKE ?1 ESCAPE '\\'
                 ORDER BY username ASC LIMIT ?2 OFFSET ?3",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((&pattern, page.limit, page.skip), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let row = conn.query_row(&sql, [value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        public_account: row.get(5)?,
        profile_picture_key: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
