//! 传输层适配：核心只依赖这里的 trait 和事件，不直接做网络 I/O
//!
//! 传输层对每次启动必须：
//! - 按 `offset` 发起 Range 请求
//! - 先发一个 `HeadersReceived`（剩余长度），再发零个或多个 `DataReceived`
//! - 最后恰好发一个终止事件：`Finished` 或被 `abort()` 后的 `Aborted`

pub mod http;
#[cfg(test)]
pub(crate) mod recording;

use actix::prelude::*;
use bytes::Bytes;
use url::Url;
use crate::core::error::DownloadError;

pub use http::HttpTransport;

/// 一次传输请求
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub key: String,
    /// 每次启动/恢复递增，用来丢弃过期传输的迟到事件
    pub attempt: u64,
    pub url: Url,
    /// Range 起点，即本地已有的字节数
    pub offset: u64,
}

/// 传输层发给调度器的事件
pub struct TransportEvent {
    pub key: String,
    pub attempt: u64,
    pub kind: TransportEventKind,
}
impl Message for TransportEvent { type Result = (); }

#[derive(Debug)]
pub enum TransportEventKind {
    /// `remaining` 为本次响应剩余长度，未知时为 None；
    /// `restarted` 表示服务器忽略了 Range，从头返回了完整内容
    HeadersReceived { remaining: Option<u64>, restarted: bool },
    DataReceived(Bytes),
    Finished(Result<(), DownloadError>),
    /// 调用方主动中止，不是错误
    Aborted,
}

impl TransportEvent {
    pub fn new(request: &TransferRequest, kind: TransportEventKind) -> Self {
        Self { key: request.key.clone(), attempt: request.attempt, kind }
    }
}

/// 正在进行的传输，`abort` 立即返回，实际拆除可以是异步的
pub trait TransferControl {
    fn abort(&self);
}

pub trait Transport {
    fn start(&self, request: TransferRequest, events: Recipient<TransportEvent>) -> Box<dyn TransferControl>;
}
