//! `task` 模块包含了与单个传输任务相关的所有逻辑
//!
//! 主要包括：
//! - `state`: 任务状态 `TaskState`
//! - `observer`: 调用方回调（状态、进度、完成）
//! - `sink`: 追加写入的文件输出端
//! - `transfer`: `TransferTask` 本身和最终结果 `TaskOutcome`

pub mod state;
pub mod observer;
pub mod sink;
pub mod transfer;

pub use state::TaskState;
pub use observer::{Progress, TaskObserver};
pub use sink::FileSink;
pub use transfer::{local_len, TaskOutcome, TransferTask};
