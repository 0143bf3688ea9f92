//! 调度引擎
//!
//! 把调度计划变成运行中的进程：启动时对账并载入计划，触发循环按
//! `tick_interval` 评估到期的 TIMED/INTERVAL 计划以及待启动的手动与
//! STARTUP 请求，每个任务由独立的 tokio 任务等待进程退出并写回结果。
//!
//! 所有执行状态（计划的下次触发时间、运行中的任务）位于同一把
//! `tokio::sync::Mutex` 之后，互斥检查与任务启动在同一临界区内完成，
//! 因此同一个 exclusive 计划不会同时存在两个 RUNNING 任务。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use edge_core::config::SchedulerConfig;
use edge_core::models::{Schedule, ScheduleType, ScheduledProcess, Task, TaskFilter};
use edge_core::traits::{
    LaunchContext, LaunchedProcess, ProcessControl, ProcessLauncher, ProcessRepository,
    ScheduleRepository, TaskRepository,
};
use edge_core::{EdgeError, EdgeResult};

use crate::recovery::TaskRecoveryService;
use crate::schedule_timing::{following_start_time, initial_start_time};

/// 单个调度计划的运行时状态
struct ScheduleExecution {
    schedule: Schedule,
    next_start: Option<DateTime<Utc>>,
    /// 等待启动的手动或 STARTUP 请求
    start_now: bool,
    running_tasks: HashSet<Uuid>,
}

impl ScheduleExecution {
    fn new(schedule: Schedule, now: DateTime<Utc>, on_engine_start: bool) -> Self {
        let start_now = on_engine_start
            && schedule.enabled
            && schedule.schedule_type == ScheduleType::Startup;
        Self {
            next_start: initial_start_time(&schedule, now),
            schedule,
            start_now,
            running_tasks: HashSet::new(),
        }
    }

    fn is_busy(&self) -> bool {
        self.schedule.exclusive && !self.running_tasks.is_empty()
    }
}

struct RunningTask {
    task: Task,
    control: Arc<dyn ProcessControl>,
}

#[derive(Default)]
struct EngineState {
    started: bool,
    processes: HashMap<String, ScheduledProcess>,
    executions: HashMap<Uuid, ScheduleExecution>,
    tasks: HashMap<Uuid, RunningTask>,
    stop_tx: Option<broadcast::Sender<()>>,
    trigger_loop: Option<JoinHandle<()>>,
    last_purge: Option<Instant>,
}

struct SchedulerInner {
    schedule_repo: Arc<dyn ScheduleRepository>,
    task_repo: Arc<dyn TaskRepository>,
    process_repo: Arc<dyn ProcessRepository>,
    launcher: Arc<dyn ProcessLauncher>,
    config: SchedulerConfig,
    state: Mutex<EngineState>,
    running_count: watch::Sender<usize>,
}

/// 调度引擎
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        schedule_repo: Arc<dyn ScheduleRepository>,
        task_repo: Arc<dyn TaskRepository>,
        process_repo: Arc<dyn ProcessRepository>,
        launcher: Arc<dyn ProcessLauncher>,
        config: SchedulerConfig,
    ) -> Self {
        let (running_count, _) = watch::channel(0);
        Self {
            inner: Arc::new(SchedulerInner {
                schedule_repo,
                task_repo,
                process_repo,
                launcher,
                config,
                state: Mutex::new(EngineState::default()),
                running_count,
            }),
        }
    }

    pub async fn is_started(&self) -> bool {
        self.inner.state.lock().await.started
    }

    /// 启动调度器
    ///
    /// 先把遗留的 RUNNING 任务标记为 INTERRUPTED，再载入进程与调度计划。
    /// 对账失败时调度器保持停止状态。上一次停止后仍有进程未退出时拒绝启动。
    pub async fn start(&self) -> EdgeResult<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if state.started {
            return Err(EdgeError::AlreadyStarted);
        }
        if !state.tasks.is_empty() {
            warn!("{} 个任务的进程尚未退出，暂不启动调度器", state.tasks.len());
            return Err(EdgeError::TasksStillRunning {
                count: state.tasks.len(),
            });
        }

        info!("启动调度器");
        let report = TaskRecoveryService::new(self.inner.task_repo.clone())
            .recover_interrupted_tasks()
            .await?;
        if !report.interrupted_tasks.is_empty() {
            info!(
                "启动对账完成: {} 个任务标记为中断，耗时 {}ms",
                report.interrupted_tasks.len(),
                report.recovery_duration_ms
            );
        }

        let processes = self.inner.process_repo.get_all().await?;
        let schedules = self.inner.schedule_repo.get_all().await?;
        let now = Utc::now();

        state.processes = processes
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        state.executions = schedules
            .into_iter()
            .map(|s| (s.schedule_id, ScheduleExecution::new(s, now, true)))
            .collect();
        state.started = true;
        state.last_purge = Some(Instant::now());

        let (stop_tx, stop_rx) = broadcast::channel(1);
        state.trigger_loop = Some(tokio::spawn(self.clone().trigger_loop(stop_rx)));
        state.stop_tx = Some(stop_tx);

        info!(
            "调度器已启动: {} 个调度计划, {} 个进程",
            state.executions.len(),
            state.processes.len()
        );
        Ok(())
    }

    /// 停止调度器
    ///
    /// 停止触发循环，请求所有运行中的任务退出，并在 `shutdown_timeout`
    /// 内等待它们结束，超时后强制结束剩余进程并再等待同样的时长。
    pub async fn stop(&self) -> EdgeResult<()> {
        let trigger_loop = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            if !state.started {
                return Ok(());
            }

            info!("停止调度器，运行中任务: {}", state.tasks.len());
            state.started = false;
            if let Some(stop_tx) = state.stop_tx.take() {
                let _ = stop_tx.send(());
            }
            for running in state.tasks.values_mut() {
                self.request_cancel(running).await;
            }
            state.trigger_loop.take()
        };

        if let Some(handle) = trigger_loop {
            if let Err(e) = handle.await {
                warn!("调度循环异常退出: {}", e);
            }
        }

        let timeout = self.inner.config.shutdown_timeout();
        let mut running_count = self.inner.running_count.subscribe();
        let drained = tokio::time::timeout(timeout, running_count.wait_for(|count| *count == 0))
            .await
            .is_ok();

        if !drained {
            {
                let state = self.inner.state.lock().await;
                warn!(
                    "{} 个任务在 {:?} 内未结束，强制结束",
                    state.tasks.len(),
                    timeout
                );
                for (task_id, running) in &state.tasks {
                    if let Err(e) = running.control.kill().await {
                        warn!("强制结束任务 {} 失败: {}", task_id, e);
                    }
                }
            }

            let killed =
                tokio::time::timeout(timeout, running_count.wait_for(|count| *count == 0))
                    .await
                    .is_ok();
            if !killed {
                error!(
                    "强制结束后仍有 {} 个任务未退出",
                    *self.inner.running_count.borrow()
                );
            }
        }

        info!("调度器已停止");
        Ok(())
    }

    async fn trigger_loop(self, mut stop_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.inner.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    debug!("调度循环收到停止信号");
                    break;
                }
                _ = interval.tick() => {
                    self.process_schedules().await;
                    self.purge_if_due().await;
                }
            }
        }
    }

    /// 评估所有调度计划，启动到期的任务
    async fn process_schedules(&self) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if !state.started {
            return;
        }

        let now = Utc::now();
        let mut ordered: Vec<(String, Uuid)> = state
            .executions
            .values()
            .map(|e| (e.schedule.name.clone(), e.schedule.schedule_id))
            .collect();
        ordered.sort();

        for (_, schedule_id) in ordered {
            let Some(execution) = state.executions.get_mut(&schedule_id) else {
                continue;
            };

            let timer_due = match execution.next_start {
                Some(next) if next <= now => {
                    execution.next_start = following_start_time(&execution.schedule, next, now);
                    true
                }
                _ => false,
            };
            if !timer_due && !execution.start_now {
                continue;
            }

            if execution.is_busy() {
                if timer_due {
                    debug!(
                        "调度计划 {} 仍有任务在运行，跳过本次触发",
                        execution.schedule.name
                    );
                    counter!(
                        "edge_scheduler_exclusive_skips_total",
                        "schedule" => execution.schedule.name.clone()
                    )
                    .increment(1);
                }
                continue;
            }

            execution.start_now = false;
            let schedule_name = execution.schedule.name.clone();
            if let Err(e) = self.start_task(state, schedule_id).await {
                error!("调度计划 {} 启动任务失败: {}", schedule_name, e);
            }
        }
    }

    async fn start_task(&self, state: &mut EngineState, schedule_id: Uuid) -> EdgeResult<Uuid> {
        let schedule = state
            .executions
            .get(&schedule_id)
            .map(|e| e.schedule.clone())
            .ok_or(EdgeError::ScheduleNotFound { id: schedule_id })?;

        let process = match state.processes.get(&schedule.process_name) {
            Some(process) => process.clone(),
            None => {
                let process = self
                    .inner
                    .process_repo
                    .get_by_name(&schedule.process_name)
                    .await?
                    .ok_or_else(|| EdgeError::ProcessNotFound {
                        name: schedule.process_name.clone(),
                    })?;
                state.processes.insert(process.name.clone(), process.clone());
                process
            }
        };

        let task = Task::start(&process.name, Some(schedule_id), Some(&schedule.name));
        let context = LaunchContext {
            task_id: task.task_id,
            schedule_name: Some(schedule.name.clone()),
        };

        let launched = match self.inner.launcher.launch(&process, &context).await {
            Ok(launched) => launched,
            Err(e) => {
                counter!("edge_scheduler_launch_failures_total", "process" => process.name.clone())
                    .increment(1);
                return Err(e);
            }
        };
        let LaunchedProcess { pid, exit, control } = launched;

        if let Err(e) = self.inner.task_repo.insert(&task).await {
            error!("记录任务失败，结束已启动的进程 {}: {}", process.name, e);
            if let Err(kill_err) = control.kill().await {
                warn!("结束进程 {} 失败: {}", process.name, kill_err);
            }
            return Err(e);
        }

        let task_id = task.task_id;
        info!(
            "任务已启动: {} (调度计划: {}, task_id={}, pid={:?})",
            process.name, schedule.name, task_id, pid
        );
        counter!("edge_scheduler_tasks_started_total", "process" => process.name.clone())
            .increment(1);

        state.tasks.insert(task_id, RunningTask { task, control });
        if let Some(execution) = state.executions.get_mut(&schedule_id) {
            execution.running_tasks.insert(task_id);
        }
        self.inner.running_count.send_replace(state.tasks.len());

        let engine = self.clone();
        tokio::spawn(async move {
            let result = exit.await;
            engine.on_task_exit(task_id, result).await;
        });

        Ok(task_id)
    }

    async fn on_task_exit(&self, task_id: Uuid, result: EdgeResult<Option<i32>>) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let Some(RunningTask { mut task, .. }) = state.tasks.remove(&task_id) else {
            return;
        };

        let exit_code = match result {
            Ok(code) => code,
            Err(e) => {
                warn!("等待任务 {} 的进程退出失败: {}", task_id, e);
                None
            }
        };
        task.finish(exit_code);
        // 已持久化的终止状态不可覆盖
        match self.inner.task_repo.get_by_id(task_id).await {
            Ok(Some(stored)) if stored.state.is_terminal() => {
                warn!("任务 {} 已处于 {} 状态，保留已记录的结果", task_id, stored.state);
            }
            _ => {
                if let Err(e) = self.inner.task_repo.update(&task).await {
                    error!("更新任务 {} 状态失败: {}", task_id, e);
                }
            }
        }
        self.inner.running_count.send_replace(state.tasks.len());

        info!(
            "任务结束: {} (task_id={}, 状态: {}, 退出码: {:?})",
            task.process_name, task_id, task.state, task.exit_code
        );
        counter!("edge_scheduler_tasks_finished_total", "state" => task.state.as_str())
            .increment(1);
        if let Some(duration_ms) = task.execution_duration_ms() {
            histogram!("edge_scheduler_task_duration_seconds").record(duration_ms as f64 / 1000.0);
        }

        // 排队中的请求由下一次触发循环启动
        if let Some(execution) = task
            .schedule_id
            .and_then(|id| state.executions.get_mut(&id))
        {
            execution.running_tasks.remove(&task_id);
        }
    }

    async fn request_cancel(&self, running: &mut RunningTask) {
        if running.task.cancel_requested.is_none() {
            running.task.cancel_requested = Some(Utc::now());
        }
        if let Err(e) = self.inner.task_repo.update(&running.task).await {
            warn!("记录任务 {} 的取消请求失败: {}", running.task.task_id, e);
        }
        if let Err(e) = running.control.terminate().await {
            warn!("终止任务 {} 的进程失败: {}", running.task.task_id, e);
        }
    }

    fn schedule_forced_kill(&self, task_id: Uuid) {
        let engine = self.clone();
        let grace_period = self.inner.config.cancel_grace_period();
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            let state = engine.inner.state.lock().await;
            if let Some(running) = state.tasks.get(&task_id) {
                warn!("任务 {} 在 {:?} 内未响应取消，强制结束", task_id, grace_period);
                if let Err(e) = running.control.kill().await {
                    error!("强制结束任务 {} 失败: {}", task_id, e);
                }
            }
        });
    }

    async fn purge_if_due(&self) {
        {
            let mut state = self.inner.state.lock().await;
            let due = state
                .last_purge
                .map_or(true, |last| last.elapsed() >= self.inner.config.purge_interval());
            if !due {
                return;
            }
            state.last_purge = Some(Instant::now());
        }

        let cutoff = Utc::now() - self.inner.config.max_completed_task_age();
        if let Err(e) = self.purge_tasks(cutoff).await {
            error!("清理历史任务失败: {}", e);
        }
    }

    /// 新增或修改调度计划
    ///
    /// 返回保存后的计划（新计划会分配ID）。调度器运行中时新定义立即生效。
    pub async fn save_schedule(&self, mut schedule: Schedule) -> EdgeResult<Schedule> {
        schedule.validate()?;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let process = self
            .inner
            .process_repo
            .get_by_name(&schedule.process_name)
            .await?
            .ok_or_else(|| EdgeError::ProcessNotFound {
                name: schedule.process_name.clone(),
            })?;

        if let Some(same_name) = self.inner.schedule_repo.get_by_name(&schedule.name).await? {
            if same_name.schedule_id != schedule.schedule_id {
                return Err(EdgeError::DuplicateRequest(format!(
                    "调度计划名称已存在: {}",
                    schedule.name
                )));
            }
        }

        let existing = if schedule.has_id() {
            self.inner.schedule_repo.get_by_id(schedule.schedule_id).await?
        } else {
            None
        };

        match existing {
            Some(old) => {
                if old.schedule_type != schedule.schedule_type {
                    return Err(EdgeError::ScheduleTypeImmutable {
                        id: schedule.schedule_id,
                    });
                }
                self.inner.schedule_repo.update(&schedule).await?;
                info!("更新调度计划: {} ({})", schedule.name, schedule.schedule_id);
            }
            None => {
                if !schedule.has_id() {
                    schedule.schedule_id = Uuid::new_v4();
                }
                self.inner.schedule_repo.insert(&schedule).await?;
                info!(
                    "新增调度计划: {} ({}, 类型: {})",
                    schedule.name, schedule.schedule_id, schedule.schedule_type
                );
            }
        }

        if state.started {
            state.processes.insert(process.name.clone(), process);
            let now = Utc::now();
            match state.executions.get_mut(&schedule.schedule_id) {
                Some(execution) => {
                    let timing_changed = execution.schedule.enabled != schedule.enabled
                        || execution.schedule.repeat != schedule.repeat
                        || execution.schedule.time_of_day != schedule.time_of_day
                        || execution.schedule.day_of_week != schedule.day_of_week;
                    execution.schedule = schedule.clone();
                    if timing_changed {
                        execution.next_start = initial_start_time(&schedule, now);
                    }
                }
                None => {
                    state.executions.insert(
                        schedule.schedule_id,
                        ScheduleExecution::new(schedule.clone(), now, false),
                    );
                }
            }
        }

        Ok(schedule)
    }

    /// 删除调度计划，存在运行中的任务时拒绝
    pub async fn delete_schedule(&self, schedule_id: Uuid) -> EdgeResult<()> {
        let mut state = self.inner.state.lock().await;

        let schedule = self
            .inner
            .schedule_repo
            .get_by_id(schedule_id)
            .await?
            .ok_or(EdgeError::ScheduleNotFound { id: schedule_id })?;

        if state
            .executions
            .get(&schedule_id)
            .is_some_and(|e| !e.running_tasks.is_empty())
        {
            return Err(EdgeError::ScheduleInUse { id: schedule_id });
        }

        self.inner.schedule_repo.delete(schedule_id).await?;
        state.executions.remove(&schedule_id);
        info!("删除调度计划: {} ({})", schedule.name, schedule_id);
        Ok(())
    }

    pub async fn enable_schedule(&self, schedule_id: Uuid) -> EdgeResult<()> {
        self.set_schedule_enabled(schedule_id, true).await
    }

    /// 停用调度计划，不影响已在运行的任务
    pub async fn disable_schedule(&self, schedule_id: Uuid) -> EdgeResult<()> {
        self.set_schedule_enabled(schedule_id, false).await
    }

    async fn set_schedule_enabled(&self, schedule_id: Uuid, enabled: bool) -> EdgeResult<()> {
        let mut state = self.inner.state.lock().await;

        let mut schedule = self
            .inner
            .schedule_repo
            .get_by_id(schedule_id)
            .await?
            .ok_or(EdgeError::ScheduleNotFound { id: schedule_id })?;
        if schedule.enabled == enabled {
            return Ok(());
        }

        schedule.enabled = enabled;
        self.inner.schedule_repo.update(&schedule).await?;

        if let Some(execution) = state.executions.get_mut(&schedule_id) {
            execution.next_start = initial_start_time(&schedule, Utc::now());
            execution.schedule = schedule;
        }
        info!(
            "调度计划 {} 已{}",
            schedule_id,
            if enabled { "启用" } else { "停用" }
        );
        Ok(())
    }

    pub async fn get_schedules(&self) -> EdgeResult<Vec<Schedule>> {
        self.inner.schedule_repo.get_all().await
    }

    pub async fn get_schedule(&self, schedule_id: Uuid) -> EdgeResult<Schedule> {
        self.inner
            .schedule_repo
            .get_by_id(schedule_id)
            .await?
            .ok_or(EdgeError::ScheduleNotFound { id: schedule_id })
    }

    /// 调度计划的下次定时触发时间
    pub async fn next_start_time(&self, schedule_id: Uuid) -> Option<DateTime<Utc>> {
        self.inner
            .state
            .lock()
            .await
            .executions
            .get(&schedule_id)
            .and_then(|e| e.next_start)
    }

    /// 立即执行一次调度计划
    ///
    /// exclusive 计划已有任务在运行时，请求会在该任务结束后执行，此时返回 `None`。
    pub async fn queue_task(&self, schedule_id: Uuid) -> EdgeResult<Option<Uuid>> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if !state.started {
            return Err(EdgeError::NotReady);
        }

        let execution = state
            .executions
            .get_mut(&schedule_id)
            .ok_or(EdgeError::ScheduleNotFound { id: schedule_id })?;

        if execution.is_busy() {
            execution.start_now = true;
            info!(
                "调度计划 {} 正在运行，任务将在当前任务结束后启动",
                execution.schedule.name
            );
            return Ok(None);
        }

        self.start_task(state, schedule_id).await.map(Some)
    }

    /// 请求取消运行中的任务
    ///
    /// 任务在进程真正退出后才进入 CANCELED，超过 `cancel_grace_period` 仍未退出时强制结束。
    pub async fn cancel_task(&self, task_id: Uuid) -> EdgeResult<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        match state.tasks.get_mut(&task_id) {
            Some(running) => {
                info!("取消任务: {} (task_id={})", running.task.process_name, task_id);
                self.request_cancel(running).await;
                self.schedule_forced_kill(task_id);
                Ok(())
            }
            None => match self.inner.task_repo.get_by_id(task_id).await? {
                Some(_) => Err(EdgeError::TaskNotRunning { id: task_id }),
                None => Err(EdgeError::TaskNotFound { id: task_id }),
            },
        }
    }

    pub async fn get_task(&self, task_id: Uuid) -> EdgeResult<Task> {
        if let Some(running) = self.inner.state.lock().await.tasks.get(&task_id) {
            return Ok(running.task.clone());
        }
        self.inner
            .task_repo
            .get_by_id(task_id)
            .await?
            .ok_or(EdgeError::TaskNotFound { id: task_id })
    }

    pub async fn get_tasks(&self, filter: &TaskFilter) -> EdgeResult<Vec<Task>> {
        self.inner.task_repo.list(filter).await
    }

    /// 本进程当前管理的运行中任务，按开始时间排序
    pub async fn get_running_tasks(&self) -> Vec<Task> {
        let state = self.inner.state.lock().await;
        let mut tasks: Vec<Task> = state.tasks.values().map(|r| r.task.clone()).collect();
        tasks.sort_by_key(|t| t.start_time);
        tasks
    }

    pub async fn save_process(&self, process: ScheduledProcess) -> EdgeResult<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.process_repo.save(&process).await?;
        info!("保存进程定义: {} {:?}", process.name, process.script);
        if state.started {
            state.processes.insert(process.name.clone(), process);
        }
        Ok(())
    }

    pub async fn get_processes(&self) -> EdgeResult<Vec<ScheduledProcess>> {
        self.inner.process_repo.get_all().await
    }

    /// 删除结束时间早于 `older_than` 的已结束任务
    pub async fn purge_tasks(&self, older_than: DateTime<Utc>) -> EdgeResult<u64> {
        let deleted = self.inner.task_repo.delete_finished_before(older_than).await?;
        if deleted > 0 {
            info!("已清理 {} 个历史任务", deleted);
        }
        counter!("edge_scheduler_tasks_purged_total").increment(deleted);
        Ok(deleted)
    }
}
