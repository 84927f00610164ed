use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use crate::core::error::DownloadError;

/// 同时运行的任务数上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawLimit", into = "RawLimit")]
pub enum ConcurrencyLimit {
    #[default]
    Unbounded,
    Limited(NonZeroUsize),
}

impl ConcurrencyLimit {
    pub fn limited(count: usize) -> Self {
        NonZeroUsize::new(count).map_or(ConcurrencyLimit::Unbounded, ConcurrencyLimit::Limited)
    }

    /// 当前活跃数是否还允许再启动一个任务
    pub fn admits(&self, active: usize) -> bool {
        match self {
            ConcurrencyLimit::Unbounded => true,
            ConcurrencyLimit::Limited(max) => active < max.get(),
        }
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyLimit::Unbounded => write!(f, "unbounded"),
            ConcurrencyLimit::Limited(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for ConcurrencyLimit {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(ConcurrencyLimit::Unbounded);
        }
        s.parse::<NonZeroUsize>()
            .map(ConcurrencyLimit::Limited)
            .map_err(|_| format!("并发数必须是大于0的整数或 unbounded: {}", s))
    }
}

/// 配置文件中的写法：整数或字符串 "unbounded"
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawLimit {
    Count(u64),
    Keyword(String),
}

impl TryFrom<RawLimit> for ConcurrencyLimit {
    type Error = String;
    fn try_from(raw: RawLimit) -> Result<Self, Self::Error> {
        match raw {
            RawLimit::Count(n) => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(ConcurrencyLimit::Limited)
                .ok_or_else(|| format!("并发数必须大于0: {}", n)),
            RawLimit::Keyword(word) => word.parse(),
        }
    }
}

impl From<ConcurrencyLimit> for RawLimit {
    fn from(limit: ConcurrencyLimit) -> Self {
        match limit {
            ConcurrencyLimit::Unbounded => RawLimit::Keyword("unbounded".to_string()),
            ConcurrencyLimit::Limited(n) => RawLimit::Count(n.get() as u64),
        }
    }
}

/// 等待队列出队顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QueueDiscipline {
    /// 先进先出
    #[default]
    Fifo,
    /// 后进先出
    Lifo,
}

impl fmt::Display for QueueDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueDiscipline::Fifo => write!(f, "fifo"),
            QueueDiscipline::Lifo => write!(f, "lifo"),
        }
    }
}

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 下载文件与长度缓存的存放目录
    pub storage_dir: PathBuf,
    /// 最大并发下载数，整数或 "unbounded"
    pub max_concurrent_downloads: ConcurrencyLimit,
    /// 等待队列顺序
    pub queue_discipline: QueueDiscipline,
    /// 网络超时时间（秒），同时用作传输空闲超时
    pub timeout: u64,
    /// User-Agent
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./downloads"),
            max_concurrent_downloads: ConcurrencyLimit::Unbounded,
            queue_discipline: QueueDiscipline::Fifo,
            timeout: 30,
            user_agent: format!("downkit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入带教程的默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    eprintln!("配置文件格式错误: {}，将使用默认配置", e);
                    Ok(Config::default())
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::Config(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    fn generate_tutorial_content() -> &'static str {
        r#"# downkit 配置文件
# ====================
#
# TOML 格式。命令行参数会覆盖这里的设置，优先级：命令行 > 配置文件 > 默认值
#
# 配置文件位置：
# - Windows: %APPDATA%/downkit/downkit.conf
# - macOS: ~/Library/Application Support/downkit/downkit.conf
# - Linux: ~/.config/downkit/downkit.conf
#
# ==================== 配置项说明 ====================
#
# storage_dir               下载文件与长度缓存（.downkit-lengths.json）所在目录，不存在会自动创建
# max_concurrent_downloads  同时下载的任务数，整数（>=1）或 "unbounded"（不限制）
# queue_discipline          超出并发数的任务进入等待队列，"fifo" 先进先出，"lifo" 后进先出
# timeout                   网络超时（秒）；连接、响应以及两次数据之间的空闲时间都受此限制
# user_agent                请求使用的 User-Agent
#
# 使用示例：
#   downkit https://example.com/file.zip
#   downkit -j 2 --queue lifo -f urls.txt
#   downkit --progress https://example.com/file.zip     # 只查询本地进度，不联网
#   downkit --delete https://example.com/file.zip       # 删除文件和长度缓存
"#
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(DownloadError::Config("下载目录不能为空".to_string()));
        }
        if self.timeout == 0 {
            return Err(DownloadError::Config("超时时间必须大于0".to_string()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(DownloadError::Config("User-Agent 不能为空".to_string()));
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(dir) = &args.storage_dir {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(limit) = args.max_concurrent {
            self.max_concurrent_downloads = limit;
        }
        if let Some(discipline) = args.queue {
            self.queue_discipline = discipline;
        }
    }

    /// 长度缓存文件路径
    pub fn length_cache_path(&self) -> PathBuf {
        self.storage_dir.join(crate::core::length_cache::LENGTH_CACHE_FILE)
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 并发数: {}\n\
            - 队列顺序: {}\n\
            - 超时时间: {} 秒",
            self.storage_dir.display(),
            match self.max_concurrent_downloads {
                ConcurrencyLimit::Unbounded => "不限制".to_string(),
                ConcurrencyLimit::Limited(n) => n.to_string(),
            },
            self.queue_discipline,
            self.timeout,
        )
    }
}
