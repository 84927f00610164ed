use chrono::Local; // 用于获取本地时间
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{Write, BufWriter};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use actix::prelude::*;

/// 日志消息
pub struct LogMsg {
    pub level: Level,
    pub target: String,
    pub message: String,
}
impl Message for LogMsg { type Result = (); }

/// 刷新缓冲区，退出前调用
pub struct FlushLog;
impl Message for FlushLog { type Result = (); }

/// 日志Actor，负责写文件和按大小轮转
pub struct LoggerActor {
    pub writer: BufWriter<File>,
    pub file_path: String,
    pub max_size: u64, // 最大文件大小 (bytes)
    pub current_size: u64,
}

impl LoggerActor {
    /// 创建新的日志Actor
    pub fn new(file_path: &str, max_size: u64) -> Result<Self, std::io::Error> {
        // 确保日志目录存在
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            writer: BufWriter::new(file),
            file_path: file_path.to_string(),
            max_size,
            current_size,
        })
    }

    /// 检查并执行日志轮转
    fn check_rotation(&mut self) -> Result<(), std::io::Error> {
        if self.current_size > self.max_size {
            self.writer.flush()?;

            let backup_path = format!("{}.backup", self.file_path);
            if Path::new(&backup_path).exists() {
                std::fs::remove_file(&backup_path)?;
            }
            std::fs::rename(&self.file_path, &backup_path)?;

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)?;

            self.writer = BufWriter::new(file);
            self.current_size = 0;
        }
        Ok(())
    }

    fn write_log(&mut self, msg: &LogMsg) -> Result<(), std::io::Error> {
        let log_entry = format!(
            "{} [{}] {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            msg.level,
            msg.target,
            msg.message
        );

        self.check_rotation()?;

        self.writer.write_all(log_entry.as_bytes())?;
        self.current_size += log_entry.len() as u64;

        // 错误日志立即落盘，其余按 1KB 左右批量刷新
        if msg.level <= Level::Warn || self.current_size % 1024 < log_entry.len() as u64 {
            self.writer.flush()?;
        }
        Ok(())
    }
}

impl Actor for LoggerActor {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let _ = self.writer.flush();
    }
}

impl Handler<LogMsg> for LoggerActor {
    type Result = ();
    fn handle(&mut self, msg: LogMsg, _ctx: &mut Self::Context) {
        if let Err(e) = self.write_log(&msg) {
            eprintln!("日志写入失败: {}", e);
        }
    }
}

impl Handler<FlushLog> for LoggerActor {
    type Result = ();
    fn handle(&mut self, _msg: FlushLog, _ctx: &mut Self::Context) {
        let _ = self.writer.flush();
    }
}

/// `log` 门面到 `LoggerActor` 的桥接，库代码统一用 `log::info!` 等宏
pub struct ActorLogger {
    addr: Mutex<Addr<LoggerActor>>,
    level: LevelFilter,
}

impl ActorLogger {
    /// 安装为全局 logger，只能调用一次
    pub fn install(addr: Addr<LoggerActor>, level: LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(ActorLogger { addr: Mutex::new(addr), level }))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for ActorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(addr) = self.addr.lock() {
            addr.do_send(LogMsg {
                level: record.level(),
                target: record.target().to_string(),
                message: record.args().to_string(),
            });
        }
    }

    fn flush(&self) {
        if let Ok(addr) = self.addr.lock() {
            addr.do_send(FlushLog);
        }
    }
}
