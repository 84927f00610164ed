use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use crate::core::error::DownloadResult;

const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// 任务独占的文件输出端
///
/// 追加模式打开，数据先进缓冲区，写满或关闭时落盘。
/// 只在传输写数据期间打开，暂停、完成、失败、取消时关闭。
pub struct FileSink {
    buffer: Vec<u8>,
    buffer_size: usize,
    file_handle: File,
    total_written: u64,
}

impl FileSink {
    /// 追加写入，断点续传时使用
    pub fn append(path: &Path) -> DownloadResult<Self> {
        Self::open(path, false)
    }

    /// 清空后重新写入，服务器不支持 Range 时使用
    pub fn truncate(path: &Path) -> DownloadResult<Self> {
        Self::open(path, true)
    }

    fn open(path: &Path, truncate: bool) -> DownloadResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file_handle = options.open(path)?;

        Ok(Self {
            buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            buffer_size: DEFAULT_BUFFER_SIZE,
            file_handle,
            total_written: 0,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> DownloadResult<()> {
        if self.buffer.len() + data.len() > self.buffer_size {
            self.flush()?;
        }
        if data.len() >= self.buffer_size {
            self.file_handle.write_all(data)?;
        } else {
            self.buffer.extend_from_slice(data);
        }
        self.total_written += data.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> DownloadResult<()> {
        if !self.buffer.is_empty() {
            self.file_handle.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        self.file_handle.flush()?;
        Ok(())
    }

    /// 落盘并关闭
    pub fn close(mut self) -> DownloadResult<u64> {
        self.flush()?;
        Ok(self.total_written)
    }

    /// 本次打开以来写入的字节数（含缓冲区中尚未落盘的部分）
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            let _ = self.file_handle.write_all(&self.buffer);
        }
    }
}
