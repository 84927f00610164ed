use serde::{Serialize, Deserialize};
use std::fmt;

/// 下载任务状态
///
/// `Waiting -> Running -> {Suspended, Canceled, Completed, Failed}`，
/// `Suspended -> Running | Waiting`。后三个是终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Waiting,
    Running,
    Suspended,
    Canceled,
    Completed,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::Waiting => "等待中",
            TaskState::Running => "下载中",
            TaskState::Suspended => "已暂停",
            TaskState::Canceled => "已取消",
            TaskState::Completed => "已完成",
            TaskState::Failed => "失败",
        };
        f.write_str(label)
    }
}
