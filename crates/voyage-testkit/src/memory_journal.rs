//! An in-process `Journal` backed by a `Mutex<HashMap>`, for engine tests
//! that exercise the state machine, worker pool, and admission without a
//! database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use voyage_core::{Direction, ExecutionState, InputParameters, OperationStatus, Result, Error};
use voyage_persistence::{
    EnumerateFilter, Journal, LogEntry, OperationDetail, OperationSummary, Page, ProgressMeter,
    ReconstructedOperation, StepLogWrite,
};

struct Record {
    class_name: String,
    status: OperationStatus,
    owner: Option<String>,
    submit_time: DateTime<Utc>,
    completed_time: Option<DateTime<Utc>>,
    serialized_exception: Option<String>,
    inputs: InputParameters,
    log: Vec<LogEntry>,
    working_snapshot: BTreeMap<String, String>,
    progress: BTreeMap<String, ProgressMeter>,
}

#[derive(Default)]
pub struct MemoryJournal {
    operations: Mutex<HashMap<String, Record>>,
    instances: Mutex<Vec<String>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn create(
        &self,
        op_id: &str,
        class_name: &str,
        status: OperationStatus,
        inputs: &InputParameters,
        owner: Option<&str>,
    ) -> Result<()> {
        let mut ops = self.operations.lock().await;
        if ops.contains_key(op_id) {
            return Err(Error::DuplicateId);
        }
        ops.insert(
            op_id.to_string(),
            Record {
                class_name: class_name.to_string(),
                status,
                owner: owner.map(str::to_string),
                submit_time: Utc::now(),
                completed_time: None,
                serialized_exception: None,
                inputs: inputs.clone(),
                log: Vec::new(),
                working_snapshot: BTreeMap::new(),
                progress: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn step_log(&self, write: StepLogWrite) -> Result<()> {
        let mut ops = self.operations.lock().await;
        let record = ops.get_mut(&write.op_id).ok_or(Error::NotFound)?;
        record.log.push(LogEntry {
            id: Uuid::new_v4(),
            op_id: write.op_id.clone(),
            log_time: Utc::now(),
            step_index: write.step_index,
            direction: write.direction,
            rerun: write.rerun,
            serialized_exception: write.serialized_exception,
        });
        record.working_snapshot = write.working_map;
        if let Some(status) = write.new_status {
            record.status = status;
            if write.release_owner {
                record.owner = None;
            }
        }
        Ok(())
    }

    async fn exit(
        &self,
        op_id: &str,
        status: OperationStatus,
        serialized_exception: Option<String>,
    ) -> Result<()> {
        let mut ops = self.operations.lock().await;
        let record = ops.get_mut(op_id).ok_or(Error::NotFound)?;
        record.status = status;
        record.serialized_exception = serialized_exception;
        record.completed_time = Some(Utc::now());
        record.owner = None;
        Ok(())
    }

    async fn disown(&self, op_id: &str, owner: &str) -> Result<bool> {
        let mut ops = self.operations.lock().await;
        let record = ops.get_mut(op_id).ok_or(Error::NotFound)?;
        if record.status == OperationStatus::Running && record.owner.as_deref() == Some(owner) {
            record.status = OperationStatus::Ready;
            record.owner = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn claim(&self, op_id: &str, new_owner: &str) -> Result<bool> {
        let mut ops = self.operations.lock().await;
        let record = ops.get_mut(op_id).ok_or(Error::NotFound)?;
        if record.status == OperationStatus::Ready && record.owner.is_none() {
            record.status = OperationStatus::Running;
            record.owner = Some(new_owner.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn reconstruct(&self, op_id: &str) -> Result<ReconstructedOperation> {
        let ops = self.operations.lock().await;
        let record = ops.get(op_id).ok_or(Error::NotFound)?;

        let mut working_map = BTreeMap::new();
        let mut cursor = 0usize;
        let mut direction = Direction::Do;

        if let Some(last) = record.log.last() {
            working_map = record.working_snapshot.clone();
            if last.rerun {
                cursor = last.step_index;
                direction = last.direction;
            } else if last.direction == Direction::Do && last.serialized_exception.is_some() {
                cursor = last.step_index;
                direction = Direction::Undo;
            } else if last.direction == Direction::Do {
                cursor = last.step_index + 1;
                direction = Direction::Do;
            } else if last.step_index == 0 {
                cursor = 0;
                direction = Direction::Undo;
            } else {
                cursor = last.step_index - 1;
                direction = Direction::Undo;
            }
        }

        Ok(ReconstructedOperation {
            class_name: record.class_name.clone(),
            inputs: record.inputs.clone(),
            status: record.status,
            state: ExecutionState {
                cursor,
                direction,
                working_map: voyage_core::WorkingMap::from_map(working_map),
                last_exception: None,
            },
        })
    }

    async fn list_dead(&self, peer_ids: &[String]) -> Result<Vec<String>> {
        let ops = self.operations.lock().await;
        Ok(ops
            .iter()
            .filter(|(_, record)| {
                record.status == OperationStatus::Running
                    && record.owner.as_deref().is_some_and(|owner| peer_ids.iter().any(|p| p == owner))
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn enumerate(
        &self,
        filter: &EnumerateFilter,
        limit: usize,
        page_token: Option<&str>,
    ) -> Result<Page<OperationSummary>> {
        let ops = self.operations.lock().await;
        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let mut matches: Vec<_> = ops
            .iter()
            .filter(|(_, r)| matches_filter(r, filter))
            .map(|(id, r)| to_summary(id, r))
            .collect();
        matches.sort_by(|a, b| a.submit_time.cmp(&b.submit_time));
        let page: Vec<_> = matches.into_iter().skip(offset).take(limit).collect();
        let next_page_token = if page.len() == limit { Some((offset + limit).to_string()) } else { None };
        Ok(Page { items: page, next_page_token })
    }

    async fn count(&self, filter: &EnumerateFilter) -> Result<i64> {
        let ops = self.operations.lock().await;
        Ok(ops.values().filter(|r| matches_filter(r, filter)).count() as i64)
    }

    async fn retain(&self, horizon: DateTime<Utc>) -> Result<u64> {
        let mut ops = self.operations.lock().await;
        let before = ops.len();
        ops.retain(|_, r| !(r.status.is_terminal() && r.completed_time.is_some_and(|t| t < horizon)));
        Ok((before - ops.len()) as u64)
    }

    async fn register_instance(&self, instance_name: &str) -> Result<()> {
        let mut instances = self.instances.lock().await;
        if !instances.iter().any(|i| i == instance_name) {
            instances.push(instance_name.to_string());
        }
        Ok(())
    }

    async fn remove_instance(&self, instance_name: &str) -> Result<()> {
        self.instances.lock().await.retain(|i| i != instance_name);
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<String>> {
        Ok(self.instances.lock().await.clone())
    }

    async fn record_progress(&self, op_id: &str, name: &str, v1: i64, v2: i64) -> Result<()> {
        if name.starts_with(voyage_core::constants::RESERVED_METER_PREFIX) {
            return Err(Error::InvalidMeterName);
        }
        let mut ops = self.operations.lock().await;
        let record = ops.get_mut(op_id).ok_or(Error::NotFound)?;
        record.progress.insert(name.to_string(), ProgressMeter { name: name.to_string(), v1, v2 });
        Ok(())
    }

    async fn get_progress(&self, op_id: &str) -> Result<Vec<ProgressMeter>> {
        let ops = self.operations.lock().await;
        let record = ops.get(op_id).ok_or(Error::NotFound)?;
        Ok(record.progress.values().cloned().collect())
    }

    async fn get_detail(&self, op_id: &str) -> Result<OperationDetail> {
        let ops = self.operations.lock().await;
        let record = ops.get(op_id).ok_or(Error::NotFound)?;
        Ok(OperationDetail {
            summary: to_summary(op_id, record),
            inputs: record.inputs.clone(),
            log: record.log.clone(),
        })
    }

    async fn force_ready(&self, op_id: &str) -> Result<()> {
        let mut ops = self.operations.lock().await;
        let record = ops.get_mut(op_id).ok_or(Error::NotFound)?;
        record.status = OperationStatus::Ready;
        record.owner = None;
        Ok(())
    }

    async fn force_fatal(&self, op_id: &str, serialized_exception: Option<String>) -> Result<()> {
        let mut ops = self.operations.lock().await;
        let record = ops.get_mut(op_id).ok_or(Error::NotFound)?;
        record.status = OperationStatus::Fatal;
        record.owner = None;
        record.serialized_exception = serialized_exception;
        record.completed_time = Some(Utc::now());
        Ok(())
    }

    async fn truncate_all(&self) -> Result<()> {
        self.operations.lock().await.clear();
        self.instances.lock().await.clear();
        Ok(())
    }
}

fn matches_filter(record: &Record, filter: &EnumerateFilter) -> bool {
    if let Some(status) = filter.status {
        if record.status != status {
            return false;
        }
    }
    if let Some(class_name) = &filter.class_name {
        if &record.class_name != class_name {
            return false;
        }
    }
    if let Some(after) = filter.submitted_after {
        if record.submit_time <= after {
            return false;
        }
    }
    if let Some(before) = filter.submitted_before {
        if record.submit_time >= before {
            return false;
        }
    }
    if let Some((key, value)) = &filter.input_equals {
        if record.inputs.get_raw(key) != Some(value.as_str()) {
            return false;
        }
    }
    true
}

fn to_summary(id: &str, record: &Record) -> OperationSummary {
    OperationSummary {
        id: id.to_string(),
        class_name: record.class_name.clone(),
        submit_time: record.submit_time,
        completed_time: record.completed_time,
        status: record.status,
        owner: record.owner.clone(),
        serialized_exception: record.serialized_exception.clone(),
    }
}
