use actix::prelude::*;
use std::fs;

use crate::core::error::DownloadError;
use crate::core::task::{TaskState, TransferTask};
use crate::core::transport::{TransportEvent, TransportEventKind};
use super::actor::DownloadScheduler;
use super::messages::*;

impl Handler<Download> for DownloadScheduler {
    type Result = MessageResult<Download>;
    fn handle(&mut self, msg: Download, ctx: &mut Self::Context) -> Self::Result {
        let Download { url, dest_path, mut observer } = msg;

        let (url, key) = match self.resolve(&url) {
            Ok(resolved) => resolved,
            Err(e) => {
                log::error!("[scheduler] {}", e);
                observer.state(TaskState::Failed);
                observer.complete(Err(e.clone()));
                return MessageResult(Submission::Rejected(e));
            }
        };

        if self.is_download_completed(&key) {
            let path = self.file_path(&key);
            log::info!("[scheduler] 文件已下载完整，跳过: {}", path.display());
            observer.state(TaskState::Completed);
            observer.complete(Ok(path.clone()));
            return MessageResult(Submission::AlreadyComplete(path));
        }

        if self.tasks.contains_key(&key) {
            log::debug!("[scheduler] 任务已存在，忽略重复提交: {}", key);
            return MessageResult(Submission::Ignored);
        }

        let seq = self.next_seq();
        let (task, outcome) = TransferTask::new(key.clone(), url, self.file_path(&key), dest_path, observer, seq);
        let id = task.id;
        self.tasks.insert(key.clone(), task);
        let state = self.admit_or_enqueue(&key, ctx);

        MessageResult(Submission::Accepted(TaskTicket { key, id, state, outcome }))
    }
}

impl Handler<SuspendDownload> for DownloadScheduler {
    type Result = bool;
    fn handle(&mut self, msg: SuspendDownload, ctx: &mut Self::Context) -> Self::Result {
        match self.resolve(&msg.url) {
            Ok((_, key)) => self.suspend_task(&key, true, ctx),
            Err(_) => false,
        }
    }
}

impl Handler<ResumeDownload> for DownloadScheduler {
    type Result = Option<TaskState>;
    fn handle(&mut self, msg: ResumeDownload, ctx: &mut Self::Context) -> Self::Result {
        let (_, key) = self.resolve(&msg.url).ok()?;
        self.resume_task(&key, ctx)
    }
}

impl Handler<CancelDownload> for DownloadScheduler {
    type Result = bool;
    fn handle(&mut self, msg: CancelDownload, ctx: &mut Self::Context) -> Self::Result {
        match self.resolve(&msg.url) {
            Ok((_, key)) => self.cancel_task(&key, true, ctx),
            Err(_) => false,
        }
    }
}

impl Handler<SuspendAll> for DownloadScheduler {
    type Result = usize;
    fn handle(&mut self, _msg: SuspendAll, ctx: &mut Self::Context) -> Self::Result {
        let keys = self.keys_in_order(|t| matches!(t.state, TaskState::Running | TaskState::Waiting));
        keys.iter().filter(|key| self.suspend_task(key, false, ctx)).count()
    }
}

impl Handler<ResumeAll> for DownloadScheduler {
    type Result = usize;
    fn handle(&mut self, _msg: ResumeAll, ctx: &mut Self::Context) -> Self::Result {
        let keys = self.keys_in_order(|t| t.state == TaskState::Suspended);
        keys.iter().filter(|key| self.resume_task(key, ctx).is_some()).count()
    }
}

impl Handler<CancelAll> for DownloadScheduler {
    type Result = usize;
    fn handle(&mut self, _msg: CancelAll, ctx: &mut Self::Context) -> Self::Result {
        let keys = self.keys_in_order(|_| true);
        keys.iter().filter(|key| self.cancel_task(key, false, ctx)).count()
    }
}

impl Handler<FileFullPath> for DownloadScheduler {
    type Result = Result<std::path::PathBuf, DownloadError>;
    fn handle(&mut self, msg: FileFullPath, _ctx: &mut Self::Context) -> Self::Result {
        let (_, key) = self.resolve(&msg.url)?;
        Ok(self.file_path(&key))
    }
}

impl Handler<DownloadedProgress> for DownloadScheduler {
    type Result = Result<f64, DownloadError>;
    fn handle(&mut self, msg: DownloadedProgress, _ctx: &mut Self::Context) -> Self::Result {
        let (_, key) = self.resolve(&msg.url)?;
        Ok(self.downloaded_progress(&key))
    }
}

impl Handler<DeleteFile> for DownloadScheduler {
    type Result = Result<(), DownloadError>;
    fn handle(&mut self, msg: DeleteFile, ctx: &mut Self::Context) -> Self::Result {
        let (_, key) = self.resolve(&msg.url)?;
        self.cancel_task(&key, true, ctx);
        self.cache.remove(&key)?;
        match fs::remove_file(self.file_path(&key)) {
            Ok(()) => log::info!("[scheduler] 已删除文件: {}", key),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl Handler<DeleteAllFiles> for DownloadScheduler {
    type Result = Result<usize, DownloadError>;
    fn handle(&mut self, _msg: DeleteAllFiles, ctx: &mut Self::Context) -> Self::Result {
        let keys = self.keys_in_order(|_| true);
        for key in &keys {
            self.cancel_task(key, false, ctx);
        }

        // 先清内存，目录删到一半出错时也不会把旧记录写回磁盘
        self.cache.clear();
        let mut removed = 0;
        for entry in fs::read_dir(&self.storage_dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            if path != self.cache.path() {
                removed += 1;
            }
        }
        log::info!("[scheduler] 已清空下载目录 {}: {} 个条目", self.storage_dir.display(), removed);
        Ok(removed)
    }
}

impl Handler<SetConcurrencyLimit> for DownloadScheduler {
    type Result = ();
    fn handle(&mut self, msg: SetConcurrencyLimit, ctx: &mut Self::Context) {
        log::info!("[scheduler] 并发数调整: {} -> {}", self.limit, msg.0);
        self.limit = msg.0;
        self.promote_waiting(ctx);
    }
}

impl Handler<QueryTaskState> for DownloadScheduler {
    type Result = Option<TaskState>;
    fn handle(&mut self, msg: QueryTaskState, _ctx: &mut Self::Context) -> Self::Result {
        let (_, key) = self.resolve(&msg.url).ok()?;
        self.tasks.get(&key).map(|t| t.state)
    }
}

impl Handler<GetStats> for DownloadScheduler {
    type Result = MessageResult<GetStats>;
    fn handle(&mut self, _msg: GetStats, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(SchedulerStats {
            registered: self.tasks.len(),
            active: self.active.len(),
            waiting: self.waiting.len(),
            suspended: self.tasks.values().filter(|t| t.state == TaskState::Suspended).count(),
            limit: self.limit,
            discipline: self.discipline,
        })
    }
}

/// 传输事件：只处理当前这次传输的事件，其余的直接丢弃
impl Handler<TransportEvent> for DownloadScheduler {
    type Result = ();
    fn handle(&mut self, event: TransportEvent, ctx: &mut Self::Context) {
        let current = self.tasks.get(&event.key).map_or(false, |t| t.is_current(event.attempt));
        if !current {
            log::debug!("[scheduler] 丢弃过期的传输事件: {} #{}", event.key, event.attempt);
            return;
        }
        match event.kind {
            TransportEventKind::HeadersReceived { remaining, restarted } => {
                self.on_headers(&event.key, remaining, restarted, ctx);
            }
            TransportEventKind::DataReceived(data) => self.on_data(&event.key, &data, ctx),
            TransportEventKind::Finished(result) => self.finish_transfer(&event.key, result, ctx),
            TransportEventKind::Aborted => {
                log::debug!("[scheduler] 传输已中止: {}", event.key);
            }
        }
    }
}
