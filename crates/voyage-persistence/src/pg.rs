//! Postgres-backed `Journal`.
//!
//! Every mutating call runs inside its own `sqlx` transaction; ownership
//! transitions (`claim`/`disown`) are single compare-and-set `UPDATE`s with
//! the precondition baked into the `WHERE` clause, never a read followed by
//! a write. Transient failures (lost connection, serialization conflict)
//! are retried a few times with a short fixed backoff before surfacing.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use voyage_core::{
    Direction, Error, ExceptionSerializer, ExecutionState, InputParameters, OperationStatus,
    PlainTextExceptionSerializer, Result, WorkingMap,
};

use crate::error::{is_retryable, map_sqlx_error};
use crate::journal::{
    EnumerateFilter, Journal, LogEntry, OperationDetail, OperationSummary, Page, ProgressMeter,
    ReconstructedOperation, StepLogWrite,
};

const RETRY_DELAYS: [Duration; 3] =
    [Duration::from_millis(15), Duration::from_millis(30), Duration::from_millis(45)];

async fn with_retry<T, F, Fut>(mut op: F) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < RETRY_DELAYS.len() && is_retryable(&e) => {
                tracing::warn!(attempt, error = %e, "retrying transient journal operation");
                tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct PgJournal {
    pool: PgPool,
    exception_serializer: Arc<dyn ExceptionSerializer>,
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, exception_serializer: Arc::new(PlainTextExceptionSerializer) }
    }

    pub fn with_exception_serializer(
        pool: PgPool,
        exception_serializer: Arc<dyn ExceptionSerializer>,
    ) -> Self {
        Self { pool, exception_serializer }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn status_to_direction(raw: &str) -> Direction {
    raw.parse().unwrap_or(Direction::Do)
}

fn status_from_str(raw: &str) -> OperationStatus {
    raw.parse().unwrap_or(OperationStatus::Fatal)
}

fn push_clause(sql: &mut String, binds: &mut Vec<String>, idx: &mut i32, clause: &str, value: String) {
    binds.push(value);
    sql.push_str(&clause.replace("{}", &format!("${}", idx)));
    *idx += 1;
}

fn encode_page_token(last_id: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(last_id.as_bytes())
}

fn decode_page_token(token: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(token)
        .map_err(|_| Error::InvalidPageToken)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidPageToken)
}

#[async_trait]
impl Journal for PgJournal {
    async fn create(
        &self,
        op_id: &str,
        class_name: &str,
        status: OperationStatus,
        inputs: &InputParameters,
        owner: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        with_retry(|| async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "INSERT INTO flight (flightid, submit_time, class_name, completed_time, status, serialized_exception, stairway_id) \
                 VALUES ($1, $2, $3, NULL, $4, NULL, $5)",
            )
            .bind(op_id)
            .bind(now)
            .bind(class_name)
            .bind(status.as_str())
            .bind(owner)
            .execute(&mut *tx)
            .await?;

            for (key, value) in inputs.iter() {
                sqlx::query(
                    "INSERT INTO flightinput (flightid, key, value) VALUES ($1, $2, $3)",
                )
                .bind(op_id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await
        })
        .await
        .map_err(map_sqlx_error)
    }

    async fn step_log(&self, write: StepLogWrite) -> Result<()> {
        let log_id = Uuid::new_v4();
        let now = Utc::now();
        with_retry(|| async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "INSERT INTO flightlog (id, flightid, log_time, step_index, direction, rerun, serialized_exception) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(log_id)
            .bind(&write.op_id)
            .bind(now)
            .bind(write.step_index as i32)
            .bind(write.direction.as_str())
            .bind(write.rerun)
            .bind(&write.serialized_exception)
            .execute(&mut *tx)
            .await?;

            for (key, value) in &write.working_map {
                sqlx::query(
                    "INSERT INTO flightworking (flightlog_id, key, value) VALUES ($1, $2, $3)",
                )
                .bind(log_id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }

            if let Some(status) = write.new_status {
                if write.release_owner {
                    sqlx::query(
                        "UPDATE flight SET status = $1, stairway_id = NULL WHERE flightid = $2",
                    )
                    .bind(status.as_str())
                    .bind(&write.op_id)
                    .execute(&mut *tx)
                    .await?;
                } else {
                    sqlx::query("UPDATE flight SET status = $1 WHERE flightid = $2")
                        .bind(status.as_str())
                        .bind(&write.op_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }

            tx.commit().await
        })
        .await
        .map_err(map_sqlx_error)
    }

    async fn exit(
        &self,
        op_id: &str,
        status: OperationStatus,
        serialized_exception: Option<String>,
    ) -> Result<()> {
        let now = Utc::now();
        with_retry(|| async {
            sqlx::query(
                "UPDATE flight SET status = $1, completed_time = $2, serialized_exception = $3, stairway_id = NULL \
                 WHERE flightid = $4",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(&serialized_exception)
            .bind(op_id)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await
        .map_err(map_sqlx_error)
    }

    async fn disown(&self, op_id: &str, owner: &str) -> Result<bool> {
        with_retry(|| async {
            let result = sqlx::query(
                "UPDATE flight SET status = 'READY', stairway_id = NULL \
                 WHERE flightid = $1 AND status = 'RUNNING' AND stairway_id = $2",
            )
            .bind(op_id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
        .map_err(map_sqlx_error)
    }

    async fn claim(&self, op_id: &str, new_owner: &str) -> Result<bool> {
        with_retry(|| async {
            let result = sqlx::query(
                "UPDATE flight SET status = 'RUNNING', stairway_id = $1 \
                 WHERE flightid = $2 AND status = 'READY' AND stairway_id IS NULL",
            )
            .bind(new_owner)
            .bind(op_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
        .map_err(map_sqlx_error)
    }

    async fn reconstruct(&self, op_id: &str) -> Result<ReconstructedOperation> {
        let flight_row = sqlx::query("SELECT class_name, status FROM flight WHERE flightid = $1")
            .bind(op_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(Error::NotFound)?;
        let class_name: String = flight_row.try_get("class_name").map_err(map_sqlx_error)?;
        let status_raw: String = flight_row.try_get("status").map_err(map_sqlx_error)?;
        let status = status_from_str(&status_raw);

        let input_rows = sqlx::query("SELECT key, value FROM flightinput WHERE flightid = $1")
            .bind(op_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let mut inputs = BTreeMap::new();
        for row in input_rows {
            let key: String = row.try_get("key").map_err(map_sqlx_error)?;
            let value: Option<String> = row.try_get("value").map_err(map_sqlx_error)?;
            inputs.insert(key, value.unwrap_or_default());
        }

        let last_log = sqlx::query(
            "SELECT id, step_index, direction, rerun, serialized_exception \
             FROM flightlog WHERE flightid = $1 ORDER BY log_seq DESC LIMIT 1",
        )
        .bind(op_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let state = match last_log {
            None => ExecutionState::initial(0),
            Some(row) => {
                let log_id: Uuid = row.try_get("id").map_err(map_sqlx_error)?;
                let step_index: i32 = row.try_get("step_index").map_err(map_sqlx_error)?;
                let direction_raw: String = row.try_get("direction").map_err(map_sqlx_error)?;
                let rerun: bool = row.try_get("rerun").map_err(map_sqlx_error)?;
                let serialized_exception: Option<String> =
                    row.try_get("serialized_exception").map_err(map_sqlx_error)?;
                let direction = status_to_direction(&direction_raw);
                let step_index = step_index as usize;

                let working_rows = sqlx::query(
                    "SELECT key, value FROM flightworking WHERE flightlog_id = $1",
                )
                .bind(log_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
                let mut working_map = BTreeMap::new();
                for row in working_rows {
                    let key: String = row.try_get("key").map_err(map_sqlx_error)?;
                    let value: Option<String> = row.try_get("value").map_err(map_sqlx_error)?;
                    working_map.insert(key, value.unwrap_or_default());
                }
                let working_map = WorkingMap::from_map(working_map);

                let last_exception = serialized_exception
                    .as_deref()
                    .map(|raw| self.exception_serializer.deserialize_exception(raw));

                if rerun {
                    ExecutionState { cursor: step_index, direction, working_map, last_exception }
                } else if last_exception.is_some() {
                    match direction {
                        Direction::Do => ExecutionState {
                            cursor: step_index,
                            direction: Direction::Undo,
                            working_map,
                            last_exception,
                        },
                        Direction::Undo => ExecutionState {
                            cursor: step_index,
                            direction: Direction::Undo,
                            working_map,
                            last_exception,
                        },
                    }
                } else {
                    match direction {
                        Direction::Do => ExecutionState {
                            cursor: step_index + 1,
                            direction: Direction::Do,
                            working_map,
                            last_exception: None,
                        },
                        Direction::Undo => ExecutionState {
                            cursor: step_index.saturating_sub(1),
                            direction: Direction::Undo,
                            working_map,
                            last_exception: None,
                        },
                    }
                }
            }
        };

        Ok(ReconstructedOperation { class_name, inputs: InputParameters::from_map(inputs), status, state })
    }

    async fn list_dead(&self, peer_ids: &[String]) -> Result<Vec<String>> {
        if peer_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT flightid FROM flight WHERE status = 'RUNNING' AND stairway_id = ANY($1)",
        )
        .bind(peer_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("flightid").map_err(map_sqlx_error))
            .collect()
    }

    async fn enumerate(
        &self,
        filter: &EnumerateFilter,
        limit: usize,
        page_token: Option<&str>,
    ) -> Result<Page<OperationSummary>> {
        let after_id = match page_token {
            Some(tok) => Some(decode_page_token(tok)?),
            None => None,
        };

        let mut sql = String::from(
            "SELECT flightid, class_name, submit_time, completed_time, status, stairway_id, serialized_exception \
             FROM flight WHERE 1 = 1",
        );
        let mut binds: Vec<String> = Vec::new();
        let mut idx = 1i32;

        if let Some(status) = filter.status {
            push_clause(&mut sql, &mut binds, &mut idx, " AND status = {}", status.as_str().to_string());
        }
        if let Some(class_name) = &filter.class_name {
            push_clause(&mut sql, &mut binds, &mut idx, " AND class_name = {}", class_name.clone());
        }
        if let Some(after) = after_id {
            push_clause(&mut sql, &mut binds, &mut idx, " AND flightid > {}", after);
        }

        sql.push_str(" ORDER BY flightid ASC LIMIT ");
        sql.push_str(&(limit as i64 + 1).to_string());

        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

        let has_more = rows.len() > limit;
        let mut items: Vec<OperationSummary> = Vec::new();
        for row in rows.into_iter().take(limit) {
            items.push(row_to_summary(&row)?);
        }
        let next_page_token =
            if has_more { items.last().map(|s| encode_page_token(&s.id)) } else { None };

        Ok(Page { items, next_page_token })
    }

    async fn count(&self, filter: &EnumerateFilter) -> Result<i64> {
        let mut sql = String::from("SELECT count(*) AS n FROM flight WHERE 1 = 1");
        let mut binds: Vec<String> = Vec::new();
        let mut idx = 1i32;
        if let Some(status) = filter.status {
            push_clause(&mut sql, &mut binds, &mut idx, " AND status = {}", status.as_str().to_string());
        }
        if let Some(class_name) = &filter.class_name {
            push_clause(&mut sql, &mut binds, &mut idx, " AND class_name = {}", class_name.clone());
        }
        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        let row = query.fetch_one(&self.pool).await.map_err(map_sqlx_error)?;
        row.try_get::<i64, _>("n").map_err(map_sqlx_error)
    }

    async fn retain(&self, horizon: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM flight WHERE completed_time IS NOT NULL AND completed_time < $1 \
             AND status IN ('SUCCESS', 'ERROR', 'FATAL')",
        )
        .bind(horizon)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn register_instance(&self, instance_name: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO stairwayinstance (stairway_id) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(instance_name)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(map_sqlx_error)
    }

    async fn remove_instance(&self, instance_name: &str) -> Result<()> {
        sqlx::query("DELETE FROM stairwayinstance WHERE stairway_id = $1")
            .bind(instance_name)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn list_instances(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT stairway_id FROM stairwayinstance")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("stairway_id").map_err(map_sqlx_error))
            .collect()
    }

    async fn record_progress(&self, op_id: &str, name: &str, v1: i64, v2: i64) -> Result<()> {
        if name.starts_with(voyage_core::constants::RESERVED_METER_PREFIX) {
            return Err(Error::InvalidMeterName);
        }
        sqlx::query(
            "INSERT INTO flightprogress (flightid, name, v1, v2) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (flightid, name) DO UPDATE SET v1 = EXCLUDED.v1, v2 = EXCLUDED.v2",
        )
        .bind(op_id)
        .bind(name)
        .bind(v1)
        .bind(v2)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(map_sqlx_error)
    }

    async fn get_progress(&self, op_id: &str) -> Result<Vec<ProgressMeter>> {
        let rows = sqlx::query("SELECT name, v1, v2 FROM flightprogress WHERE flightid = $1")
            .bind(op_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|row| {
                Ok(ProgressMeter {
                    name: row.try_get("name").map_err(map_sqlx_error)?,
                    v1: row.try_get("v1").map_err(map_sqlx_error)?,
                    v2: row.try_get("v2").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }

    async fn get_detail(&self, op_id: &str) -> Result<OperationDetail> {
        let row = sqlx::query(
            "SELECT flightid, class_name, submit_time, completed_time, status, stairway_id, serialized_exception \
             FROM flight WHERE flightid = $1",
        )
        .bind(op_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(Error::NotFound)?;
        let summary = row_to_summary(&row)?;

        let input_rows = sqlx::query("SELECT key, value FROM flightinput WHERE flightid = $1")
            .bind(op_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let mut inputs = BTreeMap::new();
        for row in input_rows {
            let key: String = row.try_get("key").map_err(map_sqlx_error)?;
            let value: Option<String> = row.try_get("value").map_err(map_sqlx_error)?;
            inputs.insert(key, value.unwrap_or_default());
        }

        let log_rows = sqlx::query(
            "SELECT id, flightid, log_time, step_index, direction, rerun, serialized_exception \
             FROM flightlog WHERE flightid = $1 ORDER BY log_seq ASC",
        )
        .bind(op_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        let mut log = Vec::with_capacity(log_rows.len());
        for row in log_rows {
            let direction_raw: String = row.try_get("direction").map_err(map_sqlx_error)?;
            let step_index: i32 = row.try_get("step_index").map_err(map_sqlx_error)?;
            log.push(LogEntry {
                id: row.try_get("id").map_err(map_sqlx_error)?,
                op_id: row.try_get("flightid").map_err(map_sqlx_error)?,
                log_time: row.try_get("log_time").map_err(map_sqlx_error)?,
                step_index: step_index as usize,
                direction: status_to_direction(&direction_raw),
                rerun: row.try_get("rerun").map_err(map_sqlx_error)?,
                serialized_exception: row.try_get("serialized_exception").map_err(map_sqlx_error)?,
            });
        }

        Ok(OperationDetail { summary, inputs: InputParameters::from_map(inputs), log })
    }

    async fn force_ready(&self, op_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE flight SET status = 'READY', stairway_id = NULL WHERE flightid = $1",
        )
        .bind(op_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn force_fatal(&self, op_id: &str, serialized_exception: Option<String>) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE flight SET status = 'FATAL', stairway_id = NULL, completed_time = $1, serialized_exception = $2 \
             WHERE flightid = $3",
        )
        .bind(now)
        .bind(&serialized_exception)
        .bind(op_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn truncate_all(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE flight, stairwayinstance, work_queue_message RESTART IDENTITY CASCADE")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

fn row_to_summary(row: &sqlx::postgres::PgRow) -> Result<OperationSummary> {
    let status_raw: String = row.try_get("status").map_err(map_sqlx_error)?;
    Ok(OperationSummary {
        id: row.try_get("flightid").map_err(map_sqlx_error)?,
        class_name: row.try_get("class_name").map_err(map_sqlx_error)?,
        submit_time: row.try_get("submit_time").map_err(map_sqlx_error)?,
        completed_time: row.try_get("completed_time").map_err(map_sqlx_error)?,
        status: status_from_str(&status_raw),
        owner: row.try_get("stairway_id").map_err(map_sqlx_error)?,
        serialized_exception: row.try_get("serialized_exception").map_err(map_sqlx_error)?,
    })
}
