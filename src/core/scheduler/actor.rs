use actix::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::{ConcurrencyLimit, Config, QueueDiscipline};
use crate::core::error::DownloadError;
use crate::core::length_cache::LengthCache;
use crate::core::task::{local_len, TaskOutcome, TaskState, TransferTask};
use crate::core::transport::{HttpTransport, TransferRequest, Transport};
use crate::utils::validator::{file_name_of, parse_source};

/// 下载调度器 Actor
///
/// 持有任务表、活跃集合和等待队列。所有操作和传输事件都经过同一个
/// mailbox，每条消息内对三者的修改就是一个完整的临界区。
pub struct DownloadScheduler {
    pub(super) storage_dir: PathBuf,
    pub(super) limit: ConcurrencyLimit,
    pub(super) discipline: QueueDiscipline,
    pub(super) transport: Box<dyn Transport>,
    pub(super) cache: LengthCache,
    /// key（文件名） -> 任务，同一 key 最多一个活着的任务
    pub(super) tasks: HashMap<String, TransferTask>,
    pub(super) active: Vec<String>,
    pub(super) waiting: VecDeque<String>,
    next_attempt: u64,
    next_seq: u64,
}

impl Actor for DownloadScheduler {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        log::info!(
            "[scheduler] 下载调度器已启动: 目录 {}, 并发 {}, 队列 {}",
            self.storage_dir.display(), self.limit, self.discipline
        );
    }

    /// 进程退出时关闭所有输出端，已写入的字节保留，下次可以续传
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for task in self.tasks.values_mut() {
            task.abort_transfer();
            if let Err(e) = task.close_sink() {
                log::warn!("[scheduler] 关闭输出文件失败 {}: {}", task.key, e);
            }
        }
        log::info!("[scheduler] 下载调度器已停止");
    }
}

impl DownloadScheduler {
    pub fn new(config: &Config, transport: impl Transport + 'static) -> Result<Self, DownloadError> {
        config.validate()?;
        fs::create_dir_all(&config.storage_dir)?;
        let cache = LengthCache::load(config.length_cache_path());
        Ok(Self {
            storage_dir: config.storage_dir.clone(),
            limit: config.max_concurrent_downloads,
            discipline: config.queue_discipline,
            transport: Box::new(transport),
            cache,
            tasks: HashMap::new(),
            active: Vec::new(),
            waiting: VecDeque::new(),
            next_attempt: 0,
            next_seq: 0,
        })
    }

    /// 使用默认的 HTTP 传输
    pub fn with_http(config: &Config) -> Result<Self, DownloadError> {
        Self::new(config, HttpTransport::from_config(config))
    }

    pub(super) fn resolve(&self, url: &str) -> Result<(Url, String), DownloadError> {
        let url = parse_source(url)?;
        let key = file_name_of(&url)?;
        Ok((url, key))
    }

    pub(super) fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub(super) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// 本地字节数等于缓存的预期长度（且不为 0）
    pub(super) fn is_download_completed(&self, key: &str) -> bool {
        let total = self.cache.get(key);
        total != 0 && local_len(&self.file_path(key)) == total
    }

    pub(super) fn downloaded_progress(&self, key: &str) -> f64 {
        if self.is_download_completed(key) {
            return 1.0;
        }
        let total = self.cache.get(key);
        if total == 0 {
            return 0.0;
        }
        (local_len(&self.file_path(key)) as f64 / total as f64).min(1.0)
    }

    fn admissible(&self) -> bool {
        self.limit.admits(self.active.len())
    }

    /// 有空位就立即启动，否则进入等待队列
    pub(super) fn admit_or_enqueue(&mut self, key: &str, ctx: &mut Context<Self>) -> TaskState {
        if self.admissible() {
            self.start_transfer(key, ctx);
            TaskState::Running
        } else {
            self.waiting.push_back(key.to_string());
            if let Some(task) = self.tasks.get_mut(key) {
                task.set_state(TaskState::Waiting);
            }
            log::info!("[scheduler] 并发已满，任务进入等待队列: {} (等待 {})", key, self.waiting.len());
            TaskState::Waiting
        }
    }

    /// 从本地已有字节处发起 Range 请求
    fn start_transfer(&mut self, key: &str, ctx: &mut Context<Self>) {
        let Some(task) = self.tasks.get_mut(key) else {
            return;
        };
        self.next_attempt += 1;
        let offset = local_len(&task.file_path);
        let request = TransferRequest {
            key: key.to_string(),
            attempt: self.next_attempt,
            url: task.url.clone(),
            offset,
        };
        log::info!("[scheduler] 开始下载 {} 从第 {} 字节", task.url, offset);
        let control = self.transport.start(request, ctx.address().recipient());
        task.attach_transfer(self.next_attempt, control, offset);
        self.active.push(key.to_string());
        task.set_state(TaskState::Running);
    }

    /// 按队列顺序把等待中的任务提升进空出来的位置
    ///
    /// 先检查准入再出队：并发数被调低时候选任务留在队列里原位不动。
    pub(super) fn promote_waiting(&mut self, ctx: &mut Context<Self>) {
        while self.admissible() {
            let next = match self.discipline {
                QueueDiscipline::Fifo => self.waiting.pop_front(),
                QueueDiscipline::Lifo => self.waiting.pop_back(),
            };
            let Some(key) = next else {
                break;
            };
            log::debug!("[scheduler] 从等待队列提升任务: {}", key);
            self.start_transfer(&key, ctx);
        }
    }

    fn forget(&mut self, key: &str) {
        self.active.retain(|k| k != key);
        self.waiting.retain(|k| k != key);
    }

    /// 暂停：等待中的直接出队，运行中的中止传输并保留已写入字节
    pub(super) fn suspend_task(&mut self, key: &str, promote: bool, ctx: &mut Context<Self>) -> bool {
        let Some(task) = self.tasks.get_mut(key) else {
            return false;
        };
        match task.state {
            TaskState::Waiting => {}
            TaskState::Running => {
                task.abort_transfer();
                if let Err(e) = task.close_sink() {
                    log::warn!("[scheduler] 暂停时关闭输出文件失败 {}: {}", key, e);
                }
            }
            _ => return false,
        }
        task.set_state(TaskState::Suspended);
        log::info!("[scheduler] 任务已暂停: {} ({} 字节)", key, local_len(&task.file_path));
        self.forget(key);
        if promote {
            self.promote_waiting(ctx);
        }
        true
    }

    pub(super) fn resume_task(&mut self, key: &str, ctx: &mut Context<Self>) -> Option<TaskState> {
        let suspended = self.tasks.get(key).map_or(false, |t| t.state == TaskState::Suspended);
        if !suspended {
            return None;
        }
        Some(self.admit_or_enqueue(key, ctx))
    }

    /// 取消：从任务表中彻底移除，之后不能再恢复
    pub(super) fn cancel_task(&mut self, key: &str, promote: bool, ctx: &mut Context<Self>) -> bool {
        let Some(mut task) = self.tasks.remove(key) else {
            return false;
        };
        task.abort_transfer();
        if let Err(e) = task.close_sink() {
            log::warn!("[scheduler] 取消时关闭输出文件失败 {}: {}", key, e);
        }
        self.forget(key);
        task.finish(TaskOutcome::Canceled);
        log::info!("[scheduler] 任务已取消: {}", key);
        if promote {
            self.promote_waiting(ctx);
        }
        true
    }

    pub(super) fn fail_task(&mut self, key: &str, error: DownloadError, ctx: &mut Context<Self>) {
        let Some(mut task) = self.tasks.remove(key) else {
            return;
        };
        task.abort_transfer();
        if let Err(e) = task.close_sink() {
            log::warn!("[scheduler] 失败时关闭输出文件失败 {}: {}", key, e);
        }
        self.forget(key);
        log::error!("[scheduler] 下载失败 {}: {}", task.url, error);
        task.finish(TaskOutcome::Failed(error));
        self.promote_waiting(ctx);
    }

    /// 传输自然结束（成功或出错）
    pub(super) fn finish_transfer(&mut self, key: &str, result: Result<(), DownloadError>, ctx: &mut Context<Self>) {
        let Some(mut task) = self.tasks.remove(key) else {
            return;
        };
        task.detach_transfer();
        let closed = task.close_sink();
        self.forget(key);

        let outcome = match result.and(closed) {
            Ok(()) => self.settle_completed(&task),
            Err(e) => TaskOutcome::Failed(e),
        };
        match &outcome {
            TaskOutcome::Completed(path) => log::info!("[scheduler] 下载完成 {} -> {}", task.url, path.display()),
            TaskOutcome::Failed(e) => log::error!("[scheduler] 下载失败 {}: {}", task.url, e),
            TaskOutcome::Canceled => {}
        }
        task.finish(outcome);
        self.promote_waiting(ctx);
    }

    /// 传输报告成功后核对本地大小，必要时移动到目标路径
    fn settle_completed(&mut self, task: &TransferTask) -> TaskOutcome {
        let actual = local_len(&task.file_path);
        let mut expected = self.cache.get(&task.key);
        if expected == 0 {
            expected = task.expected_length;
        }
        if expected == 0 {
            // 服务器没给长度，以实际写入的为准
            if actual > 0 {
                if let Err(e) = self.cache.record(&task.key, actual) {
                    log::warn!("[scheduler] 写入长度缓存失败 {}: {}", task.key, e);
                }
            }
            expected = actual;
        }
        if actual != expected {
            return TaskOutcome::Failed(DownloadError::IncompleteTransfer { expected, actual });
        }
        match &task.dest_path {
            Some(dest) => match move_file(&task.file_path, dest) {
                Ok(()) => TaskOutcome::Completed(dest.clone()),
                Err(e) => TaskOutcome::Failed(e),
            },
            None => TaskOutcome::Completed(task.file_path.clone()),
        }
    }

    /// 收到响应头：打开输出端，记录预期总长度
    pub(super) fn on_headers(&mut self, key: &str, remaining: Option<u64>, restarted: bool, ctx: &mut Context<Self>) {
        let Some(task) = self.tasks.get_mut(key) else {
            return;
        };
        if let Err(e) = task.open_sink(restarted) {
            self.fail_task(key, e, ctx);
            return;
        }
        if restarted {
            log::warn!("[scheduler] 服务器不支持 Range，从头下载: {}", task.url);
        }
        let present = local_len(&task.file_path);
        task.received = present;
        if let Some(remaining) = remaining {
            let Some(total) = remaining.checked_add(present) else {
                let error = DownloadError::Transport(format!(
                    "服务器返回的长度无效: 剩余 {} 字节, 本地已有 {} 字节", remaining, present
                ));
                self.fail_task(key, error, ctx);
                return;
            };
            task.update_expected_length(total);
            if let Err(e) = self.cache.record(&task.key, total) {
                log::warn!("[scheduler] 写入长度缓存失败 {}: {}", task.key, e);
            }
        }
        log::debug!("[scheduler] 响应头 {}: 已有 {} 字节, 预期 {} 字节", key, present, task.expected_length);
        task.report_progress();
    }

    pub(super) fn on_data(&mut self, key: &str, data: &[u8], ctx: &mut Context<Self>) {
        let Some(task) = self.tasks.get_mut(key) else {
            return;
        };
        if let Err(e) = task.write(data) {
            self.fail_task(key, e, ctx);
            return;
        }
        task.report_progress();
    }

    pub(super) fn keys_in_order(&self, pred: impl Fn(&TransferTask) -> bool) -> Vec<String> {
        let mut tasks: Vec<&TransferTask> = self.tasks.values().filter(|t| pred(*t)).collect();
        tasks.sort_by_key(|t| t.seq);
        tasks.into_iter().map(|t| t.key.clone()).collect()
    }
}

/// rename 失败（例如跨设备）时退回复制再删除
fn move_file(from: &Path, to: &Path) -> Result<(), DownloadError> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}
