use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::transport::TransferControl;
use super::observer::{Progress, TaskObserver};
use super::sink::FileSink;
use super::state::TaskState;

/// 任务的最终结果，每个任务只会产生一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(PathBuf),
    Failed(DownloadError),
    /// 主动取消，不算失败
    Canceled,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed(_) => TaskState::Completed,
            TaskOutcome::Failed(_) => TaskState::Failed,
            TaskOutcome::Canceled => TaskState::Canceled,
        }
    }
}

/// 本地文件当前字节数，文件不存在时为 0
pub fn local_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// 单个下载任务的全部状态，只由调度器 actor 持有和修改
pub struct TransferTask {
    pub id: Uuid,
    pub key: String,
    pub url: Url,
    /// 下载完成后移动到的位置
    pub dest_path: Option<PathBuf>,
    /// 下载过程中写入的位置（存储目录下）
    pub file_path: PathBuf,
    pub state: TaskState,
    /// 首次收到响应头前为 0，之后只增不减
    pub expected_length: u64,
    pub received: u64,
    /// 注册顺序，批量恢复时按它排序
    pub seq: u64,
    attempt: Option<u64>,
    sink: Option<FileSink>,
    transfer: Option<Box<dyn TransferControl>>,
    observer: TaskObserver,
    outcome: Option<oneshot::Sender<TaskOutcome>>,
}

impl TransferTask {
    pub fn new(
        key: String,
        url: Url,
        file_path: PathBuf,
        dest_path: Option<PathBuf>,
        observer: TaskObserver,
        seq: u64,
    ) -> (Self, oneshot::Receiver<TaskOutcome>) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            id: Uuid::new_v4(),
            key,
            url,
            dest_path,
            file_path,
            state: TaskState::Waiting,
            expected_length: 0,
            received: 0,
            seq,
            attempt: None,
            sink: None,
            transfer: None,
            observer,
            outcome: Some(tx),
        };
        (task, rx)
    }

    pub fn set_state(&mut self, state: TaskState) {
        log::debug!("[task] {} ({}) {:?} -> {:?}", self.key, self.id, self.state, state);
        self.state = state;
        self.observer.state(state);
    }

    /// 记录新启动的传输
    pub fn attach_transfer(&mut self, attempt: u64, transfer: Box<dyn TransferControl>, offset: u64) {
        self.attempt = Some(attempt);
        self.transfer = Some(transfer);
        self.received = offset;
    }

    /// 事件是否来自当前这次传输
    pub fn is_current(&self, attempt: u64) -> bool {
        self.attempt == Some(attempt)
    }

    /// 中止传输（不等待），之后到达的事件都会被当作过期事件丢弃
    pub fn abort_transfer(&mut self) {
        self.attempt = None;
        if let Some(transfer) = self.transfer.take() {
            transfer.abort();
        }
    }

    /// 传输自己结束时调用，不需要 abort
    pub fn detach_transfer(&mut self) {
        self.attempt = None;
        self.transfer = None;
    }

    /// 收到响应头时打开输出端
    pub fn open_sink(&mut self, restarted: bool) -> DownloadResult<()> {
        self.close_sink()?;
        let sink = if restarted {
            FileSink::truncate(&self.file_path)?
        } else {
            FileSink::append(&self.file_path)?
        };
        self.sink = Some(sink);
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> DownloadResult<()> {
        match self.sink.as_mut() {
            Some(sink) => {
                sink.write(data)?;
                self.received += data.len() as u64;
                Ok(())
            }
            None => Err(DownloadError::Io(format!("输出文件未打开: {}", self.file_path.display()))),
        }
    }

    pub fn close_sink(&mut self) -> DownloadResult<()> {
        match self.sink.take() {
            Some(sink) => sink.close().map(|_| ()),
            None => Ok(()),
        }
    }

    /// 首次收到响应头时确定，之后不会变小
    pub fn update_expected_length(&mut self, expected: u64) {
        self.expected_length = self.expected_length.max(expected);
    }

    pub fn report_progress(&self) {
        if self.expected_length != 0 {
            self.observer.progress(Progress::new(self.received, self.expected_length));
        }
    }

    /// 进入终态：依次通知状态回调、完成回调（取消除外）和 outcome 通道
    pub fn finish(&mut self, outcome: TaskOutcome) {
        self.set_state(outcome.state());
        match &outcome {
            TaskOutcome::Completed(path) => self.observer.complete(Ok(path.clone())),
            TaskOutcome::Failed(error) => self.observer.complete(Err(error.clone())),
            TaskOutcome::Canceled => {}
        }
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(outcome);
        }
    }
}

impl std::fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTask")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .field("expected_length", &self.expected_length)
            .field("received", &self.received)
            .field("attempt", &self.attempt)
            .finish()
    }
}
