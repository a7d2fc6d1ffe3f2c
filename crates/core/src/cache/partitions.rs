//! Named partition management.
//!
//! Partitions are created lazily on first open and removed wholesale; there
//! is no per-entry expiry.

use super::connection::CacheDb;
use crate::Error;
use chrono::Utc;
use tokio_rusqlite::params;

/// Handle to one named partition of the cache store.
///
/// Opening a partition is cheap and idempotent; the handle does not keep
/// the partition alive if it is deleted through another handle.
#[derive(Clone, Debug)]
pub struct Partition {
    pub(crate) db: CacheDb,
    pub(crate) name: String,
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CacheDb {
    /// Open a partition, creating it if absent.
    pub async fn open_partition(&self, name: &str) -> Result<Partition, Error> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("partition name cannot be empty".into()));
        }

        let owned = name.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![owned, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(Partition { db: self.clone(), name: name.to_string() })
    }

    /// Check whether a partition with this name exists.
    pub async fn has_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// All partition names, in creation order.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY id ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and every entry in it.
    ///
    /// Returns whether the partition existed.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_once() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("site-static-v1").await.unwrap();
        db.open_partition("site-static-v1").await.unwrap();

        assert_eq!(db.partition_names().await.unwrap(), vec!["site-static-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_names_in_creation_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for name in ["b", "a", "c"] {
            db.open_partition(name).await.unwrap();
        }
        assert_eq!(db.partition_names().await.unwrap(), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_delete_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("old").await.unwrap();

        assert!(db.delete_partition("old").await.unwrap());
        assert!(!db.delete_partition("old").await.unwrap());
        assert!(!db.has_partition("old").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.open_partition("  ").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
