use thiserror::Error;
use std::io;

/// 下载核心的错误类型
///
/// 所有错误都只作用于单个任务，不会中断其他任务。
/// 用户主动取消不是错误，不在这里出现（见 `TaskOutcome::Canceled`）。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("无效的下载地址: {0}")]
    InvalidSource(String),

    #[error("网络错误: {0}")]
    Transport(String),

    #[error("服务器错误: HTTP {status}")]
    Server { status: u16 },

    #[error("下载超时")]
    Timeout,

    #[error("文件下载不完整: 预期 {expected} 字节, 实际 {actual} 字节")]
    IncompleteTransfer {
        expected: u64,
        actual: u64,
    },

    #[error("IO错误: {0}")]
    Io(String),

    #[error("配置错误: {0}")]
    Config(String),
}

impl DownloadError {
    /// 调用方据此决定是否重新提交任务，核心本身不做自动重试
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Transport(_)
            | DownloadError::Timeout
            | DownloadError::IncompleteTransfer { .. } => true,
            DownloadError::Server { status } => *status >= 500,
            _ => false,
        }
    }

}

impl From<io::Error> for DownloadError {
    fn from(error: io::Error) -> Self {
        DownloadError::Io(error.to_string())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
