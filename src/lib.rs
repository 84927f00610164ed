//! downkit: 基于 actix 的下载管理器
//!
//! 调度器限制同时运行的任务数，超出的任务按 FIFO 或 LIFO 排队；
//! 文件按 URL 最后一段命名存放在存储目录下，中断后按本地已有字节续传。

pub mod cli;
pub mod config;
pub mod core;
pub mod ui;
pub mod utils;
