//! Core: 调度器、单个任务、传输层、长度缓存和错误类型

pub mod error;
pub mod length_cache;
pub mod scheduler;
pub mod task;
pub mod transport;

pub use error::{DownloadError, DownloadResult};
pub use length_cache::LengthCache;
pub use scheduler::{DownloadScheduler, Download, Submission, TaskTicket, SchedulerStats};
pub use task::{Progress, TaskObserver, TaskOutcome, TaskState};
pub use transport::{HttpTransport, Transport};
