use std::path::PathBuf;
use crate::core::error::DownloadError;
use super::state::TaskState;

/// 进度快照，`fraction` 在 [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub received: u64,
    pub expected: u64,
    pub fraction: f64,
}

impl Progress {
    pub fn new(received: u64, expected: u64) -> Self {
        let fraction = if expected == 0 {
            0.0
        } else {
            (received as f64 / expected as f64).min(1.0)
        };
        Self { received, expected, fraction }
    }
}

pub type StateCallback = Box<dyn Fn(TaskState) + Send>;
pub type ProgressCallback = Box<dyn Fn(Progress) + Send>;
/// 成功时带最终文件路径，失败时带错误；取消不会走到这里
pub type CompletionCallback = Box<dyn FnOnce(Result<PathBuf, DownloadError>) + Send>;

/// 调用方提供的三个回调，都在调度器 actor 的线程上执行
#[derive(Default)]
pub struct TaskObserver {
    on_state: Option<StateCallback>,
    on_progress: Option<ProgressCallback>,
    on_completion: Option<CompletionCallback>,
}

impl TaskObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_state(mut self, f: impl Fn(TaskState) + Send + 'static) -> Self {
        self.on_state = Some(Box::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl Fn(Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_completion(mut self, f: impl FnOnce(Result<PathBuf, DownloadError>) + Send + 'static) -> Self {
        self.on_completion = Some(Box::new(f));
        self
    }

    pub fn state(&self, state: TaskState) {
        if let Some(f) = &self.on_state {
            f(state);
        }
    }

    pub fn progress(&self, progress: Progress) {
        if let Some(f) = &self.on_progress {
            f(progress);
        }
    }

    /// 完成回调只会被调用一次
    pub fn complete(&mut self, result: Result<PathBuf, DownloadError>) {
        if let Some(f) = self.on_completion.take() {
            f(result);
        }
    }
}

impl std::fmt::Debug for TaskObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskObserver")
            .field("on_state", &self.on_state.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_completion", &self.on_completion.is_some())
            .finish()
    }
}
