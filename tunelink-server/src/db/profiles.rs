//! Listening profile storage
//!
//! Profiles are written by the external ingestion pipeline through
//! [`replace_profile`] and read by the matching engine through the
//! [`ProfileStore`] trait, so the engine can be driven by any source.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tunelink_common::db::{ListeningProfile, UserId};

use crate::error::Result;

/// Category table and its item column, in profile field order
const CATEGORY_TABLES: [(&str, &str); 3] = [
    ("profile_artists", "artist_id"),
    ("profile_tracks", "track_id"),
    ("profile_genres", "genre_id"),
];

/// Read access to listening profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load one user's profile, `None` if the user is unknown
    async fn load_profile(&self, user_id: UserId) -> Result<Option<ListeningProfile>>;

    /// Every user id the store knows about
    async fn known_users(&self) -> Result<Vec<UserId>>;
}

/// [`ProfileStore`] backed by the service database
#[derive(Clone)]
pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn load_profile(&self, user_id: UserId) -> Result<Option<ListeningProfile>> {
        if !super::users::user_exists(&self.pool, user_id).await? {
            return Ok(None);
        }

        let mut sets: Vec<BTreeSet<i64>> = Vec::with_capacity(CATEGORY_TABLES.len());
        for (table, column) in CATEGORY_TABLES {
            let sql = format!("SELECT {column} FROM {table} WHERE user_id = ?");
            let ids: Vec<i64> = sqlx::query_scalar(&sql)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
            sets.push(ids.into_iter().collect());
        }

        let genres = sets.pop().unwrap_or_default();
        let tracks = sets.pop().unwrap_or_default();
        let artists = sets.pop().unwrap_or_default();

        Ok(Some(ListeningProfile {
            artists,
            tracks,
            genres,
        }))
    }

    async fn known_users(&self) -> Result<Vec<UserId>> {
        let ids = sqlx::query_scalar("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

/// Overwrite a user's three id sets in one transaction
///
/// Creates the user row if the ingestion pipeline reaches us first.
pub async fn replace_profile(
    pool: &SqlitePool,
    user_id: UserId,
    profile: &ListeningProfile,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT OR IGNORE INTO users (id) VALUES (?)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let categories = [&profile.artists, &profile.tracks, &profile.genres];
    for ((table, column), items) in CATEGORY_TABLES.into_iter().zip(categories) {
        sqlx::query(&format!("DELETE FROM {table} WHERE user_id = ?"))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let insert = format!("INSERT INTO {table} (user_id, {column}) VALUES (?, ?)");
        for item in items {
            sqlx::query(&insert)
                .bind(user_id)
                .bind(*item)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tunelink_common::db::init::create_schema;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_replace_then_load() {
        let pool = setup_test_db().await;
        let store = SqliteProfileStore::new(pool.clone());

        let profile = ListeningProfile::new([1, 2, 3], [10], [100, 200]);
        replace_profile(&pool, 5, &profile).await.unwrap();

        let loaded = store.load_profile(5).await.unwrap();
        assert_eq!(loaded, Some(profile));
        assert_eq!(store.known_users().await.unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_replace_overwrites_wholesale() {
        let pool = setup_test_db().await;
        let store = SqliteProfileStore::new(pool.clone());

        replace_profile(&pool, 5, &ListeningProfile::new([1, 2], [3], [4]))
            .await
            .unwrap();
        replace_profile(&pool, 5, &ListeningProfile::new([9], [], []))
            .await
            .unwrap();

        let loaded = store.load_profile(5).await.unwrap().unwrap();
        assert_eq!(loaded, ListeningProfile::new([9], [], []));
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_profile() {
        let pool = setup_test_db().await;
        let store = SqliteProfileStore::new(pool);

        assert_eq!(store.load_profile(77).await.unwrap(), None);
    }
}
