//! Entry operations on cache partitions.
//!
//! Provides put/match/delete on a single partition and the cross-partition
//! lookup the worker uses when it does not care which partition holds a
//! response.

use super::connection::CacheDb;
use super::partitions::Partition;
use crate::Error;
use crate::http::{Request, StoredResponse};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Listing row for a stored entry, without its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EntryMeta {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body_len: u64,
    pub stored_at: String,
}

type RawEntry = (u16, String, Vec<u8>);

fn decode(raw: Option<RawEntry>) -> Result<Option<StoredResponse>, Error> {
    let Some((status, headers_json, body)) = raw else {
        return Ok(None);
    };
    let headers: Vec<(String, String)> =
        serde_json::from_str(&headers_json).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?;
    Ok(Some(StoredResponse { status, headers, body: Bytes::from(body) }))
}

/// An entry prepared for writing, detached from the borrowed request.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn new(request: &Request, response: &StoredResponse) -> Result<Self, Error> {
        if !request.is_get() {
            return Err(Error::InvalidInput(format!("cannot cache {} requests", request.method)));
        }
        let headers_json =
            serde_json::to_string(&response.headers).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?;
        Ok(Self {
            key_hash: request.cache_key(),
            method: request.method.to_ascii_uppercase(),
            url: request.url.to_string(),
            status: response.status,
            headers_json,
            body: response.body.to_vec(),
        })
    }
}

fn write_rows(conn: &rusqlite::Connection, partition: &str, rows: &[EntryRow], now: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![partition, now],
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO entries (
        partition, key_hash, method, url, status, headers_json, body, body_len, stored_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(partition, key_hash) DO UPDATE SET
        method = excluded.method,
        url = excluded.url,
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        body_len = excluded.body_len,
        stored_at = excluded.stored_at",
    )?;
    for row in rows {
        stmt.execute(params![
            partition,
            &row.key_hash,
            &row.method,
            &row.url,
            row.status,
            &row.headers_json,
            &row.body,
            row.body.len() as i64,
            now,
        ])?;
    }
    Ok(())
}

impl Partition {
    /// Store a response for a request, replacing any existing entry.
    ///
    /// Recreates the partition row if it was deleted in the meantime.
    pub async fn put(&self, request: &Request, response: &StoredResponse) -> Result<(), Error> {
        let row = EntryRow::new(request, response)?;
        let partition = self.name.clone();
        let now = Utc::now().to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> { write_rows(conn, &partition, &[row], &now) })
            .await
            .map_err(Error::from)
    }

    /// Store several entries in one transaction: either all land or none do.
    pub async fn put_all(&self, entries: &[(Request, StoredResponse)]) -> Result<(), Error> {
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::new(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let partition = self.name.clone();
        let now = Utc::now().to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                write_rows(&tx, &partition, &rows, &now)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for a request in this partition only.
    pub async fn match_request(&self, request: &Request) -> Result<Option<StoredResponse>, Error> {
        let partition = self.name.clone();
        let key_hash = request.cache_key();
        let raw = self
            .db
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let result: rusqlite::Result<RawEntry> = conn.query_row(
                    "SELECT status, headers_json, body FROM entries WHERE partition = ?1 AND key_hash = ?2",
                    params![partition, key_hash],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                );

                match result {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        decode(raw)
    }

    /// Remove the entry for a request. Returns whether one existed.
    pub async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let partition = self.name.clone();
        let key_hash = request.cache_key();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND key_hash = ?2",
                    params![partition, key_hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// List the entries in this partition, oldest first.
    pub async fn keys(&self) -> Result<Vec<EntryMeta>, Error> {
        let partition = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<EntryMeta>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, body_len, stored_at
                FROM entries WHERE partition = ?1 ORDER BY stored_at ASC, url ASC",
                )?;
                let rows = stmt
                    .query_map(params![partition], |row| {
                        Ok(EntryMeta {
                            method: row.get(0)?,
                            url: row.get(1)?,
                            status: row.get(2)?,
                            body_len: row.get::<_, i64>(3)? as u64,
                            stored_at: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in this partition.
    pub async fn len(&self) -> Result<u64, Error> {
        let partition = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }
}

impl CacheDb {
    /// Look up a request across every partition.
    ///
    /// Partitions are searched in creation order and the first hit wins.
    pub async fn match_request(&self, request: &Request) -> Result<Option<StoredResponse>, Error> {
        let key_hash = request.cache_key();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let result: rusqlite::Result<RawEntry> = conn.query_row(
                    "SELECT e.status, e.headers_json, e.body
                FROM entries e JOIN partitions p ON p.name = e.partition
                WHERE e.key_hash = ?1
                ORDER BY p.id ASC
                LIMIT 1",
                    params![key_hash],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                );

                match result {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        decode(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Destination;
    use url::Url;

    fn request(path: &str) -> Request {
        let url = Url::parse("https://site.test").unwrap().join(path).unwrap();
        let destination = Destination::infer(&url);
        Request::get(url, destination)
    }

    fn response(body: &'static str) -> StoredResponse {
        StoredResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/css".into())],
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic").await.unwrap();

        partition.put(&request("/styles.css"), &response("body{}")).await.unwrap();

        let hit = partition.match_request(&request("/styles.css")).await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(&hit.body[..], b"body{}");
        assert_eq!(hit.content_type(), Some("text/css"));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic").await.unwrap();

        partition.put(&request("/styles.css"), &response("v1")).await.unwrap();
        partition.put(&request("/styles.css"), &response("v2")).await.unwrap();

        assert_eq!(partition.len().await.unwrap(), 1);
        let hit = partition.match_request(&request("/styles.css")).await.unwrap().unwrap();
        assert_eq!(&hit.body[..], b"v2");
    }

    #[tokio::test]
    async fn test_match_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic").await.unwrap();
        assert!(partition.match_request(&request("/nope.js")).await.unwrap().is_none());
        assert!(db.match_request(&request("/nope.js")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_across_partitions_prefers_oldest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = db.open_partition("static").await.unwrap();
        let second = db.open_partition("dynamic").await.unwrap();

        second.put(&request("/"), &response("from dynamic")).await.unwrap();
        assert_eq!(&db.match_request(&request("/")).await.unwrap().unwrap().body[..], b"from dynamic");

        first.put(&request("/"), &response("from static")).await.unwrap();
        assert_eq!(&db.match_request(&request("/")).await.unwrap().unwrap().body[..], b"from static");
    }

    #[tokio::test]
    async fn test_delete_partition_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("old").await.unwrap();
        partition.put(&request("/script.js"), &response("x")).await.unwrap();

        db.delete_partition("old").await.unwrap();

        assert!(db.match_request(&request("/script.js")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_recreates_deleted_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic").await.unwrap();
        db.delete_partition("dynamic").await.unwrap();

        partition.put(&request("/script.js"), &response("x")).await.unwrap();
        assert!(db.has_partition("dynamic").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_and_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic").await.unwrap();
        partition.put(&request("/script.js"), &response("abc")).await.unwrap();

        let keys = partition.keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].url, "https://site.test/script.js");
        assert_eq!(keys[0].method, "GET");
        assert_eq!(keys[0].body_len, 3);

        assert!(partition.delete(&request("/script.js")).await.unwrap());
        assert!(partition.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_put_all_rejects_batch_with_non_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("static").await.unwrap();
        let post = Request { method: "POST".into(), ..request("/form") };
        let batch = vec![(request("/"), response("home")), (post, response("nope"))];

        assert!(partition.put_all(&batch).await.is_err());
        assert!(partition.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_put_all_stores_every_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("static").await.unwrap();
        let batch = vec![(request("/"), response("home")), (request("/styles.css"), response("css"))];

        partition.put_all(&batch).await.unwrap();
        assert_eq!(partition.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic").await.unwrap();
        let post = Request { method: "POST".into(), ..request("/form") };

        let result = partition.put(&post, &response("ok")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
