//! 文件预期总长度的持久化缓存
//!
//! 文件名 -> 预期总字节数。重启后据此判断本地文件是否已经下载完整，
//! 不需要再发起网络请求。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::{DownloadError, DownloadResult};

pub const LENGTH_CACHE_FILE: &str = ".downkit-lengths.json";

#[derive(Debug)]
pub struct LengthCache {
    path: PathBuf,
    lengths: HashMap<String, u64>,
}

impl LengthCache {
    /// 从磁盘加载，文件不存在或内容损坏都当作空缓存
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lengths = match fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<HashMap<String, u64>>(&data) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("长度缓存损坏，按空缓存处理: {} ({})", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                log::warn!("无法读取长度缓存，按空缓存处理: {} ({})", path.display(), e);
                HashMap::new()
            }
        };
        log::debug!("长度缓存已加载: {} 条记录", lengths.len());
        Self { path, lengths }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 未记录时返回 0
    pub fn get(&self, file_name: &str) -> u64 {
        self.lengths.get(file_name).copied().unwrap_or(0)
    }

    /// 记录预期长度并立即整体落盘
    pub fn record(&mut self, file_name: &str, expected: u64) -> DownloadResult<()> {
        if self.lengths.get(file_name) == Some(&expected) {
            return Ok(());
        }
        self.lengths.insert(file_name.to_string(), expected);
        self.persist()
    }

    /// 删除记录，没有记录时什么都不做
    pub fn remove(&mut self, file_name: &str) -> DownloadResult<()> {
        if self.lengths.remove(file_name).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// 只清空内存，磁盘文件由调用方处理
    pub fn clear(&mut self) {
        self.lengths.clear();
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// 先写临时文件再 rename 覆盖，读者不会看到写了一半的文件
    fn persist(&self) -> DownloadResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.lengths)
            .map_err(|e| DownloadError::Io(format!("无法序列化长度缓存: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
