/*
 * Data-management task runner: ingestion, aggregation and analysis runs
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};
use crate::api::{ApiClient, JsonMap, RunTemplatePayload};
use crate::models::{ArbviewError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Success,
    Error,
}

impl TaskStatus {
    /// `idle→running`, `running→success|error`, `success|error→running`.
    #[must_use]
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::{Error, Idle, Running, Success};
        matches!(
            (self, next),
            (Idle | Success | Error, Running) | (Running, Success | Error)
        )
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Idle => "Ready",
            TaskStatus::Running => "Running",
            TaskStatus::Success => "Success",
            TaskStatus::Error => "Error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub last_error: Option<String>,
}

impl TaskEntry {
    #[must_use]
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            status: TaskStatus::Idle,
            last_run: None,
            duration: None,
            last_error: None,
        }
    }

    pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ArbviewError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[must_use]
pub fn default_tasks() -> Vec<TaskEntry> {
    vec![
        TaskEntry::new("uniswap-ingest", "Uniswap Data Ingestion", "Fetch Uniswap V3 swap data via The Graph API"),
        TaskEntry::new("binance-ingest", "Binance Data Import", "Import Binance historical trades from CSV"),
        TaskEntry::new("aggregate", "Data Aggregation", "Aggregate raw data by time intervals"),
        TaskEntry::new("analyze", "Arbitrage Analysis", "Detect arbitrage opportunities and calculate profits"),
    ]
}

/// Backend task type behind each dashboard task. Only the types the backend
/// dispatcher accepts are listed; see [`runs_locally`] for the rest.
#[must_use]
pub fn backend_task_type(task_id: &str) -> Option<&'static str> {
    match task_id {
        "uniswap-ingest" => Some("collect_uniswap"),
        "binance-ingest" => Some("collect_binance"),
        "analyze" => Some("analyse"),
        _ => None,
    }
}

/// Dashboard tasks with no backend step. Aggregation settings travel with the analysis run.
#[must_use]
pub fn runs_locally(task_id: &str) -> bool {
    task_id == "aggregate"
}

/// User-editable pipeline parameters. Typed, not otherwise validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub pool_address: String,
    /// Shown on the dashboard; the backend imports from its own configured CSV location.
    pub csv_path: String,
    pub import_percentage: u32,
    pub chunk_size: u32,
    pub aggregation_interval: String,
    pub time_delay: u32,
    pub profit_threshold: f64,
    pub batch_id: Option<u64>,
    pub overwrite: bool,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            start_timestamp: 1_725_148_800,
            end_timestamp: 1_727_740_800,
            pool_address: "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640".to_string(),
            csv_path: "/data/binance_aggTrades_ETHUSDT.csv".to_string(),
            import_percentage: 100,
            chunk_size: 1_000_000,
            aggregation_interval: "5m".to_string(),
            time_delay: 15,
            profit_threshold: 0.5,
            batch_id: None,
            overwrite: false,
        }
    }
}

impl PipelineParams {
    /// Template overrides for one backend task type, keyed the way the dispatcher reads them.
    #[must_use]
    pub fn overrides_for(&self, task_type: &str) -> JsonMap {
        let mut value = match task_type {
            "collect_uniswap" => json!({
                "start_ts": self.start_timestamp,
                "end_ts": self.end_timestamp,
                "pool_address": self.pool_address,
            }),
            "collect_binance" => json!({
                "import_percentage": self.import_percentage,
                "chunk_size": self.chunk_size,
            }),
            "analyse" => json!({
                "overwrite": self.overwrite,
                "strategy": {
                    "interval": self.aggregation_interval,
                    "start_ts": self.start_timestamp,
                    "end_ts": self.end_timestamp,
                    "time_delay": self.time_delay,
                    "profit_threshold": self.profit_threshold,
                },
            }),
            _ => json!({}),
        };
        if let (Some(batch_id), "analyse") = (self.batch_id, task_type) {
            value["batch_id"] = json!(batch_id);
        }
        match value {
            serde_json::Value::Object(map) => map,
            _ => JsonMap::new(),
        }
    }
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task_id: &str, params: &PipelineParams) -> Result<()>;
}

/// Runs a dashboard task by launching the backend template of the matching task type.
pub struct ApiTaskExecutor {
    client: ApiClient,
    trigger: String,
}

impl ApiTaskExecutor {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            trigger: "dashboard".to_string(),
        }
    }
}

#[async_trait]
impl TaskExecutor for ApiTaskExecutor {
    async fn execute(&self, task_id: &str, params: &PipelineParams) -> Result<()> {
        if runs_locally(task_id) {
            info!("Task {} has no backend step", task_id);
            return Ok(());
        }
        let task_type = backend_task_type(task_id).ok_or_else(|| ArbviewError::TaskNotFound(task_id.to_string()))?;

        let templates = self.client.get_templates().await?.into_data().unwrap_or_default();
        let template = templates
            .iter()
            .find(|t| t.task_type == task_type)
            .ok_or_else(|| ArbviewError::ConfigError(format!("No template for task type {task_type}")))?;

        let payload = RunTemplatePayload {
            task_id: None,
            trigger: Some(self.trigger.clone()),
            overrides: Some(params.overrides_for(task_type)),
        };
        let response = self.client.run_template(template.id, Some(&payload)).await?;
        if let Some(task) = response.into_data() {
            info!("Template {} started backend task {} ({})", template.id, task.task_id, task.status);
        }
        Ok(())
    }
}

/// Task entries plus the executor that runs them. Each run only touches its own entry.
pub struct TaskBoard {
    entries: Arc<RwLock<Vec<TaskEntry>>>,
    params: RwLock<PipelineParams>,
    executor: Arc<dyn TaskExecutor>,
}

impl TaskBoard {
    #[must_use]
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self::with_tasks(default_tasks(), executor)
    }

    #[must_use]
    pub fn with_tasks(tasks: Vec<TaskEntry>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(tasks)),
            params: RwLock::new(PipelineParams::default()),
            executor,
        }
    }

    pub async fn snapshot(&self) -> Vec<TaskEntry> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, task_id: &str) -> Option<TaskEntry> {
        self.entries.read().await.iter().find(|t| t.id == task_id).cloned()
    }

    pub async fn params(&self) -> PipelineParams {
        self.params.read().await.clone()
    }

    pub async fn set_params(&self, params: PipelineParams) {
        *self.params.write().await = params;
    }

    async fn update<F>(&self, task_id: &str, apply: F) -> Result<TaskEntry>
    where
        F: FnOnce(&mut TaskEntry) -> Result<()>,
    {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| ArbviewError::TaskNotFound(task_id.to_string()))?;
        apply(entry)?;
        Ok(entry.clone())
    }

    /// Drives one task through `running` to `success` or `error`.
    ///
    /// Executor failures end in the `error` status and are not returned as `Err`;
    /// `Err` means the run could not start (unknown task, already running).
    pub async fn run(&self, task_id: &str) -> Result<TaskEntry> {
        self.update(task_id, |entry| entry.transition(TaskStatus::Running)).await?;
        info!("Task {} started", task_id);
        let mut guard = RunGuard {
            entries: self.entries.clone(),
            task_id: task_id.to_string(),
            started: Instant::now(),
            armed: true,
        };

        let params = self.params().await;
        let outcome = self.executor.execute(task_id, &params).await;
        let elapsed = guard.started.elapsed();

        let finished = self.update(task_id, |entry| {
            entry.last_run = Some(Utc::now());
            entry.duration = Some(elapsed);
            match &outcome {
                Ok(()) => {
                    info!("Task {} succeeded in {:.1}s", task_id, elapsed.as_secs_f64());
                    entry.last_error = None;
                    entry.transition(TaskStatus::Success)
                }
                Err(e) => {
                    warn!("Task {} failed after {:.1}s: {}", task_id, elapsed.as_secs_f64(), e);
                    entry.last_error = Some(e.to_string());
                    entry.transition(TaskStatus::Error)
                }
            }
        })
        .await;
        guard.armed = false;
        finished
    }

    /// Runs every task in board order, stopping after the first one that ends in `error`.
    pub async fn run_pipeline(&self) -> Result<Vec<TaskEntry>> {
        let ids: Vec<String> = self.entries.read().await.iter().map(|t| t.id.clone()).collect();
        let mut finished = Vec::with_capacity(ids.len());
        for id in ids {
            let entry = self.run(&id).await?;
            let failed = entry.status == TaskStatus::Error;
            finished.push(entry);
            if failed {
                break;
            }
        }
        Ok(finished)
    }
}

/// Ends a run that was dropped mid-flight in `error`, so the task can be started again.
struct RunGuard {
    entries: Arc<RwLock<Vec<TaskEntry>>>,
    task_id: String,
    started: Instant,
    armed: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let elapsed = self.started.elapsed();
        if let Ok(mut entries) = self.entries.try_write() {
            abandon_run(entries.as_mut_slice(), &self.task_id, elapsed);
            return;
        }
        // Lock is busy: finish the bookkeeping on the runtime once it frees up.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let entries = self.entries.clone();
            let task_id = std::mem::take(&mut self.task_id);
            handle.spawn(async move {
                abandon_run(entries.write().await.as_mut_slice(), &task_id, elapsed);
            });
        }
    }
}

fn abandon_run(entries: &mut [TaskEntry], task_id: &str, elapsed: Duration) {
    let Some(entry) = entries
        .iter_mut()
        .find(|t| t.id == task_id && t.status == TaskStatus::Running)
    else {
        return;
    };
    warn!("Task {} abandoned after {:.1}s", task_id, elapsed.as_secs_f64());
    entry.last_run = Some(Utc::now());
    entry.duration = Some(elapsed);
    entry.last_error = Some("run abandoned before completion".to_string());
    entry.status = TaskStatus::Error;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Scripted {
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for Scripted {
        async fn execute(&self, task_id: &str, _params: &PipelineParams) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(task_id) {
                return Err(ArbviewError::Unknown("ingestion failed".to_string()));
            }
            Ok(())
        }
    }

    struct Gated {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl TaskExecutor for Gated {
        async fn execute(&self, _task_id: &str, _params: &PipelineParams) -> Result<()> {
            self.gate.notified().await;
            Ok(())
        }
    }

    fn scripted(fail_on: Option<&'static str>) -> Arc<Scripted> {
        Arc::new(Scripted {
            fail_on,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn transition_table() {
        use TaskStatus::*;
        assert!(Idle.can_transition_to(Running));
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Error));
        assert!(Success.can_transition_to(Running));
        assert!(Error.can_transition_to(Running));

        assert!(!Idle.can_transition_to(Success));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Running.can_transition_to(Running));
        assert!(!Success.can_transition_to(Error));
        assert!(!Running.can_transition_to(Idle));
    }

    #[test]
    fn skipping_running_is_rejected() {
        let mut entry = TaskEntry::new("aggregate", "Data Aggregation", "");
        let err = entry.transition(TaskStatus::Success).unwrap_err();
        assert!(matches!(err, ArbviewError::InvalidTransition { .. }));
        assert_eq!(entry.status, TaskStatus::Idle);
    }

    #[tokio::test]
    async fn run_records_success_and_timing() {
        let board = TaskBoard::new(scripted(None));
        let entry = board.run("aggregate").await.unwrap();

        assert_eq!(entry.status, TaskStatus::Success);
        assert!(entry.last_run.is_some());
        assert!(entry.duration.is_some());
        assert!(entry.last_error.is_none());
    }

    #[tokio::test]
    async fn executor_failure_ends_in_error_and_can_rerun() {
        let executor = scripted(Some("binance-ingest"));
        let board = TaskBoard::new(executor.clone());

        let failed = board.run("binance-ingest").await.unwrap();
        assert_eq!(failed.status, TaskStatus::Error);
        assert_eq!(failed.last_error.as_deref(), Some("Unknown error: ingestion failed"));

        let again = board.run("binance-ingest").await.unwrap();
        assert_eq!(again.status, TaskStatus::Error);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let board = TaskBoard::new(scripted(None));
        assert!(matches!(board.run("nope").await, Err(ArbviewError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn passes_through_running_and_blocks_double_start() {
        let gate = Arc::new(Notify::new());
        let board = Arc::new(TaskBoard::new(Arc::new(Gated { gate: gate.clone() })));

        let runner = {
            let board = board.clone();
            tokio::spawn(async move { board.run("analyze").await })
        };

        while board.get("analyze").await.map(|t| t.status) != Some(TaskStatus::Running) {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            board.run("analyze").await,
            Err(ArbviewError::InvalidTransition { .. })
        ));
        assert_eq!(board.get("aggregate").await.unwrap().status, TaskStatus::Idle);

        gate.notify_one();
        let done = runner.await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn concurrent_runs_touch_only_their_own_entry() {
        let board = Arc::new(TaskBoard::new(scripted(Some("uniswap-ingest"))));
        let (a, b) = tokio::join!(board.run("uniswap-ingest"), board.run("aggregate"));

        assert_eq!(a.unwrap().status, TaskStatus::Error);
        assert_eq!(b.unwrap().status, TaskStatus::Success);
        assert_eq!(board.get("analyze").await.unwrap().status, TaskStatus::Idle);
    }

    #[tokio::test]
    async fn pipeline_stops_at_first_error() {
        let board = TaskBoard::new(scripted(Some("aggregate")));
        let finished = board.run_pipeline().await.unwrap();

        let ids: Vec<&str> = finished.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["uniswap-ingest", "binance-ingest", "aggregate"]);
        assert_eq!(board.get("analyze").await.unwrap().status, TaskStatus::Idle);
    }

    #[test]
    fn overrides_follow_task_type() {
        let params = PipelineParams::default();
        let uniswap = params.overrides_for("collect_uniswap");
        assert_eq!(uniswap["start_ts"], 1_725_148_800);
        assert_eq!(uniswap["pool_address"], "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640");

        let binance = params.overrides_for("collect_binance");
        assert_eq!(binance["import_percentage"], 100);
        assert_eq!(binance["chunk_size"], 1_000_000);
        assert!(!binance.contains_key("csv_path"));

        let analyse = params.overrides_for("analyse");
        assert_eq!(analyse["overwrite"], false);
        assert_eq!(analyse["strategy"]["profit_threshold"], 0.5);
        assert_eq!(analyse["strategy"]["interval"], "5m");
        assert!(!analyse.contains_key("batch_id"));

        let with_batch = PipelineParams {
            batch_id: Some(9),
            ..PipelineParams::default()
        };
        assert_eq!(with_batch.overrides_for("analyse")["batch_id"], 9);
        assert!(params.overrides_for("unknown").is_empty());
    }

    #[test]
    fn every_default_task_has_a_backend_step_or_runs_locally() {
        for task in default_tasks() {
            assert!(
                backend_task_type(&task.id).is_some() != runs_locally(&task.id),
                "{}",
                task.id
            );
        }
        assert_eq!(backend_task_type("aggregate"), None);
    }

    struct StallFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for StallFirst {
        async fn execute(&self, _task_id: &str, _params: &PipelineParams) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn aborted_run_ends_in_error_and_can_rerun() {
        let board = Arc::new(TaskBoard::new(Arc::new(StallFirst {
            calls: AtomicUsize::new(0),
        })));

        let runner = {
            let board = board.clone();
            tokio::spawn(async move { board.run("analyze").await })
        };
        while board.get("analyze").await.map(|t| t.status) != Some(TaskStatus::Running) {
            tokio::task::yield_now().await;
        }

        runner.abort();
        assert!(runner.await.unwrap_err().is_cancelled());

        let abandoned = board.get("analyze").await.unwrap();
        assert_eq!(abandoned.status, TaskStatus::Error);
        assert!(abandoned.duration.is_some());
        assert!(abandoned.last_error.unwrap().contains("abandoned"));

        let rerun = board.run("analyze").await.unwrap();
        assert_eq!(rerun.status, TaskStatus::Success);
    }
}
