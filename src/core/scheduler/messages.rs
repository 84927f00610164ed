use actix::Message;
use std::path::PathBuf;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::{ConcurrencyLimit, QueueDiscipline};
use crate::core::error::DownloadError;
use crate::core::task::{TaskObserver, TaskOutcome, TaskState};

/// 提交下载
///
/// ```no_run
/// # use downkit::core::scheduler::Download;
/// # use downkit::core::task::TaskObserver;
/// let msg = Download::new("https://example.com/file.zip")
///     .dest_path("/tmp/file.zip")
///     .observer(TaskObserver::new().on_state(|s| println!("{}", s)));
/// ```
#[derive(Debug)]
pub struct Download {
    pub url: String,
    pub dest_path: Option<PathBuf>,
    pub observer: TaskObserver,
}

impl Download {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), dest_path: None, observer: TaskObserver::new() }
    }

    pub fn dest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dest_path = Some(path.into());
        self
    }

    pub fn observer(mut self, observer: TaskObserver) -> Self {
        self.observer = observer;
        self
    }
}
impl Message for Download { type Result = Submission; }

/// `Download` 的处理结果
#[derive(Debug)]
pub enum Submission {
    /// 本地文件已完整，没有发起网络请求
    AlreadyComplete(PathBuf),
    /// 已注册为新任务
    Accepted(TaskTicket),
    /// 同名任务已存在，本次提交被忽略
    Ignored,
    /// 地址无效，没有发起网络请求
    Rejected(DownloadError),
}

/// 新任务的凭据，`outcome` 在任务进入终态时恰好收到一次结果
#[derive(Debug)]
pub struct TaskTicket {
    pub key: String,
    pub id: Uuid,
    /// 提交时的状态：Running 或 Waiting
    pub state: TaskState,
    pub outcome: oneshot::Receiver<TaskOutcome>,
}

impl TaskTicket {
    /// 等待终态；调度器在任务结束前停止时返回 None
    pub async fn wait(self) -> Option<TaskOutcome> {
        self.outcome.await.ok()
    }
}

/// 暂停任务
pub struct SuspendDownload { pub url: String }
impl Message for SuspendDownload { type Result = bool; }

/// 恢复已暂停的任务，返回恢复后的状态
pub struct ResumeDownload { pub url: String }
impl Message for ResumeDownload { type Result = Option<TaskState>; }

/// 取消任务
pub struct CancelDownload { pub url: String }
impl Message for CancelDownload { type Result = bool; }

/// 暂停所有运行中和等待中的任务
pub struct SuspendAll;
impl Message for SuspendAll { type Result = usize; }

/// 按提交顺序恢复所有已暂停的任务
pub struct ResumeAll;
impl Message for ResumeAll { type Result = usize; }

/// 取消所有任务
pub struct CancelAll;
impl Message for CancelAll { type Result = usize; }

/// 查询存储路径
pub struct FileFullPath { pub url: String }
impl Message for FileFullPath { type Result = Result<PathBuf, DownloadError>; }

/// 查询本地已下载比例，只看本地文件和长度缓存
pub struct DownloadedProgress { pub url: String }
impl Message for DownloadedProgress { type Result = Result<f64, DownloadError>; }

/// 删除文件和长度缓存，进行中的任务先取消
pub struct DeleteFile { pub url: String }
impl Message for DeleteFile { type Result = Result<(), DownloadError>; }

/// 取消所有任务并清空存储目录，返回删除的条目数
pub struct DeleteAllFiles;
impl Message for DeleteAllFiles { type Result = Result<usize, DownloadError>; }

/// 运行时调整并发数
pub struct SetConcurrencyLimit(pub ConcurrencyLimit);
impl Message for SetConcurrencyLimit { type Result = (); }

/// 查询已注册任务的状态
pub struct QueryTaskState { pub url: String }
impl Message for QueryTaskState { type Result = Option<TaskState>; }

/// 查询调度器统计
pub struct GetStats;
impl Message for GetStats { type Result = SchedulerStats; }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub registered: usize,
    pub active: usize,
    pub waiting: usize,
    pub suspended: usize,
    pub limit: ConcurrencyLimit,
    pub discipline: QueueDiscipline,
}
