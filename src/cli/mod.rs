//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 基本下载：`downkit <url>`
//! - 批量下载：`downkit -f urls.txt`
//! - 限制并发：`downkit -j 2 --queue lifo <url> <url> ...`
//! - 编辑配置：`downkit -e`
//! - 查询本地进度：`downkit --progress <url>`
//! - 删除文件：`downkit --delete <url>` / `downkit --delete-all`
//!
//! ## 配置文件位置
//!
//! - Windows: `%APPDATA%/downkit/downkit.conf`
//! - macOS: `~/Library/Application Support/downkit/downkit.conf`
//! - Linux: `~/.config/downkit/downkit.conf`

use clap::Parser;
use std::env;
use std::fs;
use std::path::Path;

use crate::config::{ConcurrencyLimit, Config, QueueDiscipline};
use crate::core::error::DownloadError;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/downkit/downkit.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/downkit/downkit.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/downkit/downkit.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 xdg-open，否则 nano
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// `--version` 输出，构建时间和提交由 build.rs 里的 vergen 生成
pub const BUILD_INFO: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("VERGEN_GIT_SHA"),
    ", built ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")"
);

/// 本次运行要做的事
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Download,
    Progress,
    Delete,
    DeleteAll,
}

/// downkit 命令行参数
///
/// 示例用法：
///   downkit https://example.com/file.zip
///   downkit -j 2 -f urls.txt
///   downkit -o ~/iso/debian.iso https://example.com/debian.iso
#[derive(Parser, Debug, Clone)]
#[command(
    name = "downkit",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    long_version = BUILD_INFO,
    about = "一个用 Rust 编写的下载管理器",
    long_about = "限制并发、排队调度、断点续传的下载管理器。\n\n示例：\n  downkit https://example.com/file.zip\n  downkit -j 2 --queue lifo -f urls.txt\n  downkit --progress https://example.com/file.zip\n  downkit --delete-all\n"
)]
pub struct Args {
    /// 要下载的URL列表（可同时指定多个）
    #[arg(required = false, help = "要下载的URL列表，可以同时指定多个URL。")]
    pub urls: Vec<String>,

    #[arg(short, long, help = "包含URL列表的文件路径，每行一个URL，# 开头为注释。")]
    pub file: Option<String>,

    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    #[arg(long, short = 'd', help = "下载目录，覆盖配置文件中的 storage_dir。")]
    pub storage_dir: Option<String>,

    #[arg(long = "jobs", short = 'j', help = "最大并发下载数，整数或 unbounded，覆盖配置文件中的设置。")]
    pub max_concurrent: Option<ConcurrencyLimit>,

    #[arg(long, value_enum, help = "等待队列顺序：fifo 或 lifo。")]
    pub queue: Option<QueueDiscipline>,

    /// 完成后移动到的位置，只能和单个URL一起使用
    #[arg(long, short = 'o', help = "下载完成后把文件移动到此路径，只能用于单个URL。")]
    pub output: Option<String>,

    #[arg(long, conflicts_with_all = ["delete", "delete_all"], help = "只打印本地已下载比例，不联网。")]
    pub progress: bool,

    #[arg(long, conflicts_with = "delete_all", help = "删除URL对应的本地文件和长度缓存。")]
    pub delete: bool,

    #[arg(long, help = "取消所有任务并清空下载目录。")]
    pub delete_all: bool,

    #[arg(long, default_value = "logs/downkit.log", help = "日志文件路径。")]
    pub log_file: String,

    #[arg(long, help = "日志输出到标准错误（env_logger，受 RUST_LOG 控制），不写日志文件。")]
    pub log_stderr: bool,
}

impl Args {
    /// 解析命令行参数并加载合并后的配置
    pub fn parse_args() -> Result<(Self, Config), DownloadError> {
        let args = Args::parse();

        if args.edit_config {
            if !Path::new(&args.config).exists() {
                Config::default().save_with_tutorial(&args.config)?;
            }
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    /// 加载或创建配置文件，再用命令行参数覆盖
    pub fn load_config(&self) -> Result<Config, DownloadError> {
        let mut config = Config::load(&self.config)
            .map_err(|e| DownloadError::Config(format!("无法读取配置文件 {}: {}", self.config, e)))?;
        config.merge_from_args(self);
        config
            .validate()
            .map_err(|e| DownloadError::Config(format!("配置无效: {}", e)))?;
        Ok(config)
    }

    pub fn mode(&self) -> Mode {
        if self.delete_all {
            Mode::DeleteAll
        } else if self.delete {
            Mode::Delete
        } else if self.progress {
            Mode::Progress
        } else {
            Mode::Download
        }
    }

    /// 命令行和 URL 文件中的全部地址，至少一个
    pub fn get_urls(&self) -> Result<Vec<String>, DownloadError> {
        let mut urls = Vec::new();
        urls.extend_from_slice(&self.urls);

        if let Some(file_path) = &self.file {
            let content = fs::read_to_string(file_path)
                .map_err(|e| DownloadError::Io(format!("无法读取URL文件 {}: {}", file_path, e)))?;

            // 按行读取URL，忽略空行和注释
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    if !crate::utils::validator::is_valid_url(line) {
                        return Err(DownloadError::InvalidSource(line.to_string()));
                    }
                    urls.push(line.to_string());
                }
            }
        }

        if urls.is_empty() {
            return Err(DownloadError::InvalidSource(
                "未提供任何URL。请通过命令行参数或文件提供至少一个URL。".to_string(),
            ));
        }
        if self.output.is_some() && urls.len() > 1 {
            return Err(DownloadError::Config("-o/--output 只能用于单个URL".to_string()));
        }

        Ok(urls)
    }
}
