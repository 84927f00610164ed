use actix::prelude::*;
use awc::error::SendRequestError;
use awc::http::StatusCode;
use futures::future::{AbortHandle, Abortable};
use futures::StreamExt;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::Config;
use crate::core::error::DownloadError;
use super::{TransferControl, TransferRequest, Transport, TransportEvent, TransportEventKind};

/// 基于 awc 的 HTTP(S) 传输
///
/// 每次启动在当前 arbiter 上 spawn 一个请求，事件通过 `Recipient` 发回调度器。
#[derive(Debug, Clone)]
pub struct HttpTransport {
    user_agent: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self { user_agent: user_agent.into(), timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.user_agent.clone(), Duration::from_secs(config.timeout))
    }
}

struct HttpTransfer {
    abort_handle: AbortHandle,
}

impl TransferControl for HttpTransfer {
    fn abort(&self) {
        self.abort_handle.abort();
    }
}

impl Transport for HttpTransport {
    fn start(&self, request: TransferRequest, events: Recipient<TransportEvent>) -> Box<dyn TransferControl> {
        let (abort_handle, registration) = AbortHandle::new_pair();
        let user_agent = self.user_agent.clone();
        let timeout = self.timeout;

        log::debug!("[http] 发起请求 {} Range: bytes={}-", request.url, request.offset);
        actix::spawn(async move {
            let transfer = Abortable::new(
                perform_transfer(&request, &events, &user_agent, timeout),
                registration,
            );
            let kind = match transfer.await {
                Ok(result) => TransportEventKind::Finished(result),
                Err(_) => TransportEventKind::Aborted,
            };
            events.do_send(TransportEvent::new(&request, kind));
        });

        Box::new(HttpTransfer { abort_handle })
    }
}

/// 执行一次 Range 请求，把响应头和数据块转成事件
async fn perform_transfer(
    request: &TransferRequest,
    events: &Recipient<TransportEvent>,
    user_agent: &str,
    timeout: Duration,
) -> Result<(), DownloadError> {
    // awc 的超时会一直作用到响应体读完，这里只限制请求本身，数据之间的空闲时间单独限制
    let client = awc::Client::builder()
        .disable_timeout()
        .add_default_header(("User-Agent", user_agent))
        .finish();

    let send = client
        .get(request.url.as_str())
        .insert_header(("Range", format!("bytes={}-", request.offset)))
        .insert_header(("Accept-Encoding", "identity"))
        .no_decompress()
        .send();
    let mut response = tokio::time::timeout(timeout, send)
        .await
        .map_err(|_| DownloadError::Timeout)?
        .map_err(|e| match e {
            SendRequestError::Timeout => DownloadError::Timeout,
            e => DownloadError::Transport(e.to_string()),
        })?;

    let status = response.status();
    let restarted = if status == StatusCode::PARTIAL_CONTENT {
        let range_start = response.headers().get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_start);
        if let Some(start) = range_start {
            if start != request.offset {
                return Err(DownloadError::Transport(format!(
                    "服务器返回的范围起点 {} 与请求的 {} 不一致", start, request.offset
                )));
            }
        }
        false
    } else if status.is_success() {
        // 200 说明服务器忽略了 Range，返回的是完整内容
        request.offset > 0
    } else {
        return Err(DownloadError::Server { status: status.as_u16() });
    };

    let remaining = response.headers().get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    events.do_send(TransportEvent::new(request, TransportEventKind::HeadersReceived { remaining, restarted }));

    loop {
        match tokio::time::timeout(timeout, response.next()).await {
            Err(_) => return Err(DownloadError::Timeout),
            Ok(None) => break,
            Ok(Some(Ok(bytes))) => {
                events.do_send(TransportEvent::new(request, TransportEventKind::DataReceived(bytes)));
            }
            Ok(Some(Err(e))) => return Err(DownloadError::Transport(format!("网络流错误: {}", e))),
        }
    }
    Ok(())
}

/// 解析 `Content-Range: bytes 100-999/1000` 的起点
fn content_range_start(value: &str) -> Option<u64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^\s*bytes\s+(\d+)-(\d+)/(\d+|\*)\s*$").expect("content-range pattern")
    });
    pattern.captures(value)?.get(1)?.as_str().parse().ok()
}
