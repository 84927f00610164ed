mod progress;

use std::fmt;
pub use progress::{ProgressBoard, TaskBar};

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("✗ {}", message);
}

#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub total_files: usize,
    pub total_size: u64,
    pub elapsed_time: std::time::Duration,
    pub success_count: usize,
    pub failed_count: usize,
    /// 失败中可以重新提交再试的（网络、超时、不完整、5xx）
    pub retryable_count: usize,
    pub canceled_count: usize,
    /// 退出时仍未结束（暂停、等待或运行中）
    pub unfinished_count: usize,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n下载摘要:")?;
        writeln!(f, "总文件数: {}", self.total_files)?;
        writeln!(f, "总大小: {}", format_size(self.total_size))?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        writeln!(f, "成功: {}", self.success_count)?;
        writeln!(f, "失败: {}", self.failed_count)?;
        if self.retryable_count > 0 {
            writeln!(f, "  其中 {} 个可重新运行续传", self.retryable_count)?;
        }
        writeln!(f, "取消: {}", self.canceled_count)?;
        if self.unfinished_count > 0 {
            writeln!(f, "未完成: {}（下次运行会续传）", self.unfinished_count)?;
        }
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
