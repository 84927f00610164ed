//! 测试用传输：只记录请求和中止调用，事件由测试自己发给调度器

use actix::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use super::{TransferControl, TransferRequest, Transport, TransportEvent};

#[derive(Clone)]
pub(crate) struct StartedTransfer {
    pub request: TransferRequest,
    pub aborted: Arc<AtomicBool>,
}

impl StartedTransfer {
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    started: Arc<Mutex<Vec<StartedTransfer>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<StartedTransfer> {
        self.started.lock().unwrap().clone()
    }

    /// 某个 key 最近一次启动的请求
    pub fn last_for(&self, key: &str) -> Option<StartedTransfer> {
        self.started().into_iter().rev().find(|t| t.request.key == key)
    }

    pub fn started_keys(&self) -> Vec<String> {
        self.started().into_iter().map(|t| t.request.key).collect()
    }
}

struct RecordedTransfer {
    aborted: Arc<AtomicBool>,
}

impl TransferControl for RecordedTransfer {
    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn start(&self, request: TransferRequest, _events: Recipient<TransportEvent>) -> Box<dyn TransferControl> {
        let aborted = Arc::new(AtomicBool::new(false));
        self.started.lock().unwrap().push(StartedTransfer { request, aborted: aborted.clone() });
        Box::new(RecordedTransfer { aborted })
    }
}
