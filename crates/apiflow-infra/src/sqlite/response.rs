//! SQLite response repository: captured responses, their headers and the
//! assertion results computed against them.

use apiflow_core::repository::ResponseRepository;
use apiflow_types::assertion::AssertResult;
use apiflow_types::error::RepositoryError;
use apiflow_types::id::{ExampleId, ResponseId};
use apiflow_types::response::{CapturedResponse, ExampleResponse, ResponseHeader};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::pool::DatabasePool;
use super::util::{format_datetime, parse_datetime, parse_id, query_err, write_err};

/// SQLite-backed implementation of `ResponseRepository`.
pub struct SqliteResponseRepository {
    pool: DatabasePool,
}

impl SqliteResponseRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn tx<'c>(&self, conn: &'c mut SqliteConnection) -> ResponseQueries<'c> {
        ResponseQueries { conn }
    }
}

pub(crate) fn row_to_response(row: &SqliteRow) -> Result<ExampleResponse, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let example_id: String = row.try_get("example_id").map_err(query_err)?;
    let status: i64 = row.try_get("status").map_err(query_err)?;
    let duration_ms: i64 = row.try_get("duration_ms").map_err(query_err)?;
    let size: i64 = row.try_get("size").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(ExampleResponse {
        id: parse_id(&id)?,
        example_id: parse_id(&example_id)?,
        status: u16::try_from(status).map_err(|_| RepositoryError::Query(format!("invalid status {status}")))?,
        body: row.try_get("body").map_err(query_err)?,
        duration_ms: duration_ms.max(0) as u64,
        size: size.max(0) as u64,
        created_at: parse_datetime(&created_at)?,
    })
}

fn row_to_header(row: &SqliteRow) -> Result<ResponseHeader, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let response_id: String = row.try_get("response_id").map_err(query_err)?;
    Ok(ResponseHeader {
        id: parse_id(&id)?,
        response_id: parse_id(&response_id)?,
        key: row.try_get("header_key").map_err(query_err)?,
        value: row.try_get("value").map_err(query_err)?,
    })
}

fn row_to_result(row: &SqliteRow) -> Result<AssertResult, RepositoryError> {
    let response_id: String = row.try_get("response_id").map_err(query_err)?;
    let assert_id: String = row.try_get("assert_id").map_err(query_err)?;
    Ok(AssertResult {
        response_id: parse_id(&response_id)?,
        assert_id: parse_id(&assert_id)?,
        result: row.try_get("result").map_err(query_err)?,
        error: row.try_get("error").map_err(query_err)?,
    })
}

/// Response queries bound to one connection.
pub struct ResponseQueries<'c> {
    conn: &'c mut SqliteConnection,
}

impl ResponseQueries<'_> {
    pub async fn insert(&mut self, captured: &CapturedResponse) -> Result<(), RepositoryError> {
        let r = &captured.response;
        sqlx::query(
            "INSERT INTO example_responses (id, example_id, status, body, duration_ms, size, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(r.id.to_string())
        .bind(r.example_id.to_string())
        .bind(i64::from(r.status))
        .bind(&r.body)
        .bind(r.duration_ms as i64)
        .bind(r.size as i64)
        .bind(format_datetime(&r.created_at))
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "response"))?;

        for (position, h) in captured.headers.iter().enumerate() {
            sqlx::query(
                "INSERT INTO example_response_headers (id, response_id, position, header_key, value)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(h.id.to_string())
            .bind(r.id.to_string())
            .bind(position as i64)
            .bind(&h.key)
            .bind(&h.value)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "response header"))?;
        }

        for a in &captured.assert_results {
            sqlx::query("INSERT INTO assert_results (response_id, assert_id, result, error) VALUES (?, ?, ?, ?)")
                .bind(r.id.to_string())
                .bind(a.assert_id.to_string())
                .bind(a.result)
                .bind(&a.error)
                .execute(&mut *self.conn)
                .await
                .map_err(|e| write_err(e, "assert result"))?;
        }
        Ok(())
    }

    pub async fn get(&mut self, id: &ResponseId) -> Result<Option<CapturedResponse>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM example_responses WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let response = row_to_response(&row)?;

        let headers = sqlx::query("SELECT * FROM example_response_headers WHERE response_id = ? ORDER BY position")
            .bind(id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?
            .iter()
            .map(row_to_header)
            .collect::<Result<Vec<_>, _>>()?;

        let assert_results = sqlx::query("SELECT * FROM assert_results WHERE response_id = ? ORDER BY rowid")
            .bind(id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?
            .iter()
            .map(row_to_result)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(CapturedResponse {
            response,
            headers,
            assert_results,
        }))
    }

    pub async fn list(&mut self, example_id: &ExampleId, limit: i64) -> Result<Vec<ExampleResponse>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM example_responses WHERE example_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(example_id.to_string())
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(query_err)?;
        rows.iter().map(row_to_response).collect()
    }
}

impl ResponseRepository for SqliteResponseRepository {
    async fn save_response(&self, captured: &CapturedResponse) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).insert(captured).await?;
        tx.commit().await.map_err(query_err)?;
        tracing::debug!(
            response_id = %captured.response.id,
            status = captured.response.status,
            asserts = captured.assert_results.len(),
            "response saved"
        );
        Ok(())
    }

    async fn get_response(&self, id: &ResponseId) -> Result<Option<CapturedResponse>, RepositoryError> {
        let mut conn = self.pool.reader.acquire().await.map_err(query_err)?;
        self.tx(&mut conn).get(id).await
    }

    async fn list_responses(&self, example_id: &ExampleId, limit: i64) -> Result<Vec<ExampleResponse>, RepositoryError> {
        let mut conn = self.pool.reader.acquire().await.map_err(query_err)?;
        self.tx(&mut conn).list(example_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteExampleRepository;
    use crate::sqlite::example::testing::{endpoint, example};
    use crate::sqlite::pool::testing::test_pool;
    use apiflow_core::repository::ExampleRepository;
    use apiflow_types::id::{AssertId, ResponseHeaderId};
    use chrono::{Duration, Utc};

    fn captured(example_id: ExampleId, status: u16, age_secs: i64) -> CapturedResponse {
        let id = ResponseId::new();
        CapturedResponse {
            response: ExampleResponse {
                id,
                example_id,
                status,
                body: b"{\"ok\":true}".to_vec(),
                duration_ms: 12,
                size: 11,
                created_at: Utc::now() - Duration::seconds(age_secs),
            },
            headers: vec![
                ResponseHeader {
                    id: ResponseHeaderId::new(),
                    response_id: id,
                    key: "Content-Type".into(),
                    value: "application/json".into(),
                },
                ResponseHeader {
                    id: ResponseHeaderId::new(),
                    response_id: id,
                    key: "Set-Cookie".into(),
                    value: "a=1".into(),
                },
            ],
            assert_results: vec![AssertResult {
                response_id: id,
                assert_id: AssertId::new(),
                result: false,
                error: Some("path not found: response.body.missing".into()),
            }],
        }
    }

    #[tokio::test]
    async fn saves_and_loads_with_headers_in_order() {
        let pool = test_pool().await;
        let ep = endpoint(&pool).await;
        let ex = SqliteExampleRepository::new(pool.clone())
            .create_example(&example(ep.id, "ok"))
            .await
            .unwrap();
        let repo = SqliteResponseRepository::new(pool);

        let saved = captured(ex.id, 200, 0);
        repo.save_response(&saved).await.unwrap();
        let loaded = repo.get_response(&saved.response.id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn lists_newest_first_with_limit() {
        let pool = test_pool().await;
        let ep = endpoint(&pool).await;
        let ex = SqliteExampleRepository::new(pool.clone())
            .create_example(&example(ep.id, "ok"))
            .await
            .unwrap();
        let repo = SqliteResponseRepository::new(pool);

        for (status, age) in [(500, 30), (404, 20), (200, 10)] {
            repo.save_response(&captured(ex.id, status, age)).await.unwrap();
        }
        let listed = repo.list_responses(&ex.id, 2).await.unwrap();
        let statuses: Vec<u16> = listed.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [200, 404]);
    }

    #[tokio::test]
    async fn failed_save_leaves_nothing_behind() {
        let pool = test_pool().await;
        let ep = endpoint(&pool).await;
        let ex = SqliteExampleRepository::new(pool.clone())
            .create_example(&example(ep.id, "ok"))
            .await
            .unwrap();
        let repo = SqliteResponseRepository::new(pool);

        let mut broken = captured(ex.id, 200, 0);
        let dup = broken.assert_results[0].clone();
        broken.assert_results.push(dup);
        assert!(repo.save_response(&broken).await.is_err());
        assert!(repo.get_response(&broken.response.id).await.unwrap().is_none());
    }
}
