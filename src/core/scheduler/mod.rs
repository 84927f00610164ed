//! 下载调度器：任务表、并发上限和等待队列
//!
//! - `actor`: `DownloadScheduler` 本体和状态迁移
//! - `messages`: 对外的全部操作
//! - `handlers`: 消息处理，包括传输层回来的 `TransportEvent`

pub mod actor;
pub mod handlers;
pub mod messages;

pub use actor::DownloadScheduler;
pub use messages::*;

#[cfg(test)]
mod tests {
    use super::*;
    use actix::prelude::*;
    use bytes::Bytes;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use crate::config::{ConcurrencyLimit, Config, QueueDiscipline};
    use crate::core::error::DownloadError;
    use crate::core::length_cache::{LengthCache, LENGTH_CACHE_FILE};
    use crate::core::task::{Progress, TaskObserver, TaskOutcome, TaskState};
    use crate::core::transport::recording::RecordingTransport;
    use crate::core::transport::{TransferRequest, TransportEvent, TransportEventKind};

    fn config_in(dir: &Path, limit: usize, discipline: QueueDiscipline) -> Config {
        Config {
            storage_dir: dir.to_path_buf(),
            max_concurrent_downloads: ConcurrencyLimit::limited(limit),
            queue_discipline: discipline,
            ..Config::default()
        }
    }

    fn start(config: &Config) -> (Addr<DownloadScheduler>, RecordingTransport) {
        let transport = RecordingTransport::new();
        let addr = DownloadScheduler::new(config, transport.clone()).unwrap().start();
        (addr, transport)
    }

    fn url(name: &str) -> String {
        format!("https://example.com/files/{}", name)
    }

    async fn submit(addr: &Addr<DownloadScheduler>, msg: Download) -> TaskTicket {
        match addr.send(msg).await.unwrap() {
            Submission::Accepted(ticket) => ticket,
            other => panic!("任务未被接受: {:?}", other),
        }
    }

    async fn emit(addr: &Addr<DownloadScheduler>, request: &TransferRequest, kind: TransportEventKind) {
        addr.send(TransportEvent::new(request, kind)).await.unwrap();
    }

    fn request_for(transport: &RecordingTransport, key: &str) -> TransferRequest {
        transport.last_for(key).unwrap().request
    }

    /// 完整走一遍：响应头、数据、成功结束
    async fn complete(addr: &Addr<DownloadScheduler>, request: &TransferRequest, body: &'static [u8]) {
        let remaining = Some(body.len() as u64);
        emit(addr, request, TransportEventKind::HeadersReceived { remaining, restarted: false }).await;
        emit(addr, request, TransportEventKind::DataReceived(Bytes::from_static(body))).await;
        emit(addr, request, TransportEventKind::Finished(Ok(()))).await;
    }

    async fn state_of(addr: &Addr<DownloadScheduler>, name: &str) -> Option<TaskState> {
        addr.send(QueryTaskState { url: url(name) }).await.unwrap()
    }

    #[actix_rt::test]
    async fn test_limit_bounds_running_tasks_and_fifo_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 2, QueueDiscipline::Fifo));

        let a = submit(&addr, Download::new(url("a.bin"))).await;
        let b = submit(&addr, Download::new(url("b.bin"))).await;
        let c = submit(&addr, Download::new(url("c.bin"))).await;
        let d = submit(&addr, Download::new(url("d.bin"))).await;
        assert_eq!(a.state, TaskState::Running);
        assert_eq!(b.state, TaskState::Running);
        assert_eq!(c.state, TaskState::Waiting);
        assert_eq!(d.state, TaskState::Waiting);
        assert_eq!(transport.started_keys(), vec!["a.bin", "b.bin"]);

        complete(&addr, &request_for(&transport, "a.bin"), b"abc").await;
        assert_eq!(a.wait().await, Some(TaskOutcome::Completed(dir.path().join("a.bin"))));
        assert_eq!(transport.started_keys(), vec!["a.bin", "b.bin", "c.bin"]);

        let stats = addr.send(GetStats).await.unwrap();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.registered, 3);
    }

    #[actix_rt::test]
    async fn test_lifo_promotes_most_recent_waiting_task() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Lifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        submit(&addr, Download::new(url("b.bin"))).await;
        submit(&addr, Download::new(url("c.bin"))).await;

        complete(&addr, &request_for(&transport, "a.bin"), b"a").await;
        assert_eq!(transport.started_keys(), vec!["a.bin", "c.bin"]);
        assert_eq!(state_of(&addr, "b.bin").await, Some(TaskState::Waiting));
    }

    #[actix_rt::test]
    async fn test_suspend_and_resume_continue_from_local_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let progress = Arc::new(Mutex::new(Vec::new()));
        let p = progress.clone();
        let observer = TaskObserver::new().on_progress(move |pr: Progress| p.lock().unwrap().push(pr.received));
        submit(&addr, Download::new(url("a.bin")).observer(observer)).await;

        let first = request_for(&transport, "a.bin");
        assert_eq!(first.offset, 0);
        emit(&addr, &first, TransportEventKind::HeadersReceived { remaining: Some(10), restarted: false }).await;
        emit(&addr, &first, TransportEventKind::DataReceived(Bytes::from_static(b"0123"))).await;

        assert!(addr.send(SuspendDownload { url: url("a.bin") }).await.unwrap());
        assert!(transport.last_for("a.bin").unwrap().is_aborted());
        assert_eq!(state_of(&addr, "a.bin").await, Some(TaskState::Suspended));
        assert_eq!(fs::metadata(dir.path().join("a.bin")).unwrap().len(), 4);
        let fraction = addr.send(DownloadedProgress { url: url("a.bin") }).await.unwrap().unwrap();
        assert!((fraction - 0.4).abs() < 1e-9);

        // 旧传输迟到的数据不能写进文件
        emit(&addr, &first, TransportEventKind::DataReceived(Bytes::from_static(b"zz"))).await;

        let resumed = addr.send(ResumeDownload { url: url("a.bin") }).await.unwrap();
        assert_eq!(resumed, Some(TaskState::Running));
        let second = request_for(&transport, "a.bin");
        assert_eq!(second.offset, 4);
        assert_ne!(second.attempt, first.attempt);

        emit(&addr, &second, TransportEventKind::HeadersReceived { remaining: Some(6), restarted: false }).await;
        emit(&addr, &second, TransportEventKind::DataReceived(Bytes::from_static(b"456789"))).await;
        emit(&addr, &second, TransportEventKind::Finished(Ok(()))).await;

        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), b"0123456789");
        assert_eq!(*progress.lock().unwrap(), vec![0, 4, 4, 10]);
        assert_eq!(state_of(&addr, "a.bin").await, None);
    }

    #[actix_rt::test]
    async fn test_resume_only_applies_to_suspended_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        assert_eq!(addr.send(ResumeDownload { url: url("a.bin") }).await.unwrap(), None);
        assert_eq!(addr.send(ResumeDownload { url: url("missing.bin") }).await.unwrap(), None);
        assert!(!addr.send(SuspendDownload { url: url("missing.bin") }).await.unwrap());
    }

    #[actix_rt::test]
    async fn test_cancel_unregisters_and_allows_new_download() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let completions = Arc::new(Mutex::new(0));
        let c = completions.clone();
        let observer = TaskObserver::new().on_completion(move |_| *c.lock().unwrap() += 1);
        let ticket = submit(&addr, Download::new(url("a.bin")).observer(observer)).await;
        let request = request_for(&transport, "a.bin");
        emit(&addr, &request, TransportEventKind::HeadersReceived { remaining: Some(10), restarted: false }).await;
        emit(&addr, &request, TransportEventKind::DataReceived(Bytes::from_static(b"0123"))).await;

        assert!(addr.send(CancelDownload { url: url("a.bin") }).await.unwrap());
        assert!(transport.last_for("a.bin").unwrap().is_aborted());
        assert_eq!(ticket.wait().await, Some(TaskOutcome::Canceled));
        assert_eq!(*completions.lock().unwrap(), 0);
        assert_eq!(state_of(&addr, "a.bin").await, None);
        assert!(!addr.send(CancelDownload { url: url("a.bin") }).await.unwrap());

        // 取消后到达的事件被丢弃
        emit(&addr, &request, TransportEventKind::Finished(Ok(()))).await;

        // 文件留在原处，重新提交从已有字节继续
        assert_eq!(fs::metadata(dir.path().join("a.bin")).unwrap().len(), 4);
        let again = submit(&addr, Download::new(url("a.bin"))).await;
        assert_eq!(again.state, TaskState::Running);
        assert_eq!(transport.started().len(), 2);
        let second = request_for(&transport, "a.bin");
        assert_eq!(second.offset, 4);
        assert_ne!(second.attempt, request.attempt);
    }

    #[actix_rt::test]
    async fn test_cancel_then_removed_file_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        let first = request_for(&transport, "a.bin");
        emit(&addr, &first, TransportEventKind::HeadersReceived { remaining: Some(10), restarted: false }).await;
        emit(&addr, &first, TransportEventKind::DataReceived(Bytes::from_static(b"0123"))).await;
        assert!(addr.send(CancelDownload { url: url("a.bin") }).await.unwrap());

        fs::remove_file(dir.path().join("a.bin")).unwrap();
        submit(&addr, Download::new(url("a.bin"))).await;
        let second = request_for(&transport, "a.bin");
        assert_eq!(second.offset, 0);
        assert_ne!(second.attempt, first.attempt);
    }

    #[actix_rt::test]
    async fn test_oversized_length_fails_only_that_task() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        fs::write(dir.path().join("a.bin"), b"01").unwrap();
        let a = submit(&addr, Download::new(url("a.bin"))).await;
        submit(&addr, Download::new(url("b.bin"))).await;
        let request = request_for(&transport, "a.bin");
        assert_eq!(request.offset, 2);

        // 剩余长度加上本地字节会溢出
        emit(&addr, &request, TransportEventKind::HeadersReceived { remaining: Some(u64::MAX), restarted: false }).await;

        assert!(matches!(a.wait().await, Some(TaskOutcome::Failed(DownloadError::Transport(_)))));
        let stats = addr.send(GetStats).await.unwrap();
        assert_eq!((stats.registered, stats.active), (1, 1));
        assert_eq!(state_of(&addr, "b.bin").await, Some(TaskState::Running));
        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), b"01");
    }

    #[actix_rt::test]
    async fn test_short_transfer_fails_and_promotes_next() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        let observer = TaskObserver::new().on_completion(move |r| e.lock().unwrap().push(r));
        let a = submit(&addr, Download::new(url("a.bin")).observer(observer)).await;
        submit(&addr, Download::new(url("b.bin"))).await;

        let request = request_for(&transport, "a.bin");
        emit(&addr, &request, TransportEventKind::HeadersReceived { remaining: Some(10), restarted: false }).await;
        emit(&addr, &request, TransportEventKind::DataReceived(Bytes::from_static(b"0123"))).await;
        emit(&addr, &request, TransportEventKind::Finished(Ok(()))).await;

        let expected = DownloadError::IncompleteTransfer { expected: 10, actual: 4 };
        assert_eq!(a.wait().await, Some(TaskOutcome::Failed(expected.clone())));
        assert_eq!(*errors.lock().unwrap(), vec![Err(expected)]);
        assert_eq!(transport.started_keys(), vec!["a.bin", "b.bin"]);
        // 部分数据保留，下次可以续传
        assert_eq!(fs::metadata(dir.path().join("a.bin")).unwrap().len(), 4);
    }

    #[actix_rt::test]
    async fn test_transport_error_fails_task() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let a = submit(&addr, Download::new(url("a.bin"))).await;
        submit(&addr, Download::new(url("b.bin"))).await;
        let request = request_for(&transport, "a.bin");
        emit(&addr, &request, TransportEventKind::Finished(Err(DownloadError::Server { status: 500 }))).await;

        assert_eq!(a.wait().await, Some(TaskOutcome::Failed(DownloadError::Server { status: 500 })));
        assert_eq!(state_of(&addr, "b.bin").await, Some(TaskState::Running));
    }

    #[actix_rt::test]
    async fn test_completed_file_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        complete(&addr, &request_for(&transport, "a.bin"), b"hello").await;

        let states = Arc::new(Mutex::new(Vec::new()));
        let results = Arc::new(Mutex::new(Vec::new()));
        let (s, r) = (states.clone(), results.clone());
        let observer = TaskObserver::new()
            .on_state(move |state| s.lock().unwrap().push(state))
            .on_completion(move |result| r.lock().unwrap().push(result));

        let path = dir.path().join("a.bin");
        let submission = addr.send(Download::new(url("a.bin")).observer(observer)).await.unwrap();
        assert!(matches!(submission, Submission::AlreadyComplete(ref p) if *p == path));
        assert_eq!(*states.lock().unwrap(), vec![TaskState::Completed]);
        assert_eq!(*results.lock().unwrap(), vec![Ok(path)]);
        assert_eq!(transport.started().len(), 1);

        let fraction = addr.send(DownloadedProgress { url: url("a.bin") }).await.unwrap().unwrap();
        assert_eq!(fraction, 1.0);
    }

    #[actix_rt::test]
    async fn test_duplicate_submission_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 2, QueueDiscipline::Fifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        // 同一文件名，不同目录
        let again = addr.send(Download::new("https://mirror.example.org/a.bin")).await.unwrap();
        assert!(matches!(again, Submission::Ignored));
        assert_eq!(transport.started().len(), 1);
    }

    #[actix_rt::test]
    async fn test_invalid_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let results = Arc::new(Mutex::new(Vec::new()));
        let r = results.clone();
        let observer = TaskObserver::new().on_completion(move |result| r.lock().unwrap().push(result.is_err()));

        let submission = addr.send(Download::new("ftp://example.com/a.bin").observer(observer)).await.unwrap();
        assert!(matches!(submission, Submission::Rejected(DownloadError::InvalidSource(_))));
        let submission = addr.send(Download::new("https://example.com/")).await.unwrap();
        assert!(matches!(submission, Submission::Rejected(DownloadError::InvalidSource(_))));

        assert_eq!(*results.lock().unwrap(), vec![true]);
        assert!(transport.started().is_empty());
        assert!(addr.send(FileFullPath { url: "not a url".to_string() }).await.unwrap().is_err());
    }

    #[actix_rt::test]
    async fn test_file_full_path_and_unknown_progress() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let path = addr.send(FileFullPath { url: url("a.bin?token=1") }).await.unwrap().unwrap();
        assert_eq!(path, dir.path().join("a.bin"));
        let fraction = addr.send(DownloadedProgress { url: url("a.bin") }).await.unwrap().unwrap();
        assert_eq!(fraction, 0.0);
    }

    #[actix_rt::test]
    async fn test_delete_file() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        // 没有文件也没有任务时是空操作
        addr.send(DeleteFile { url: url("a.bin") }).await.unwrap().unwrap();

        submit(&addr, Download::new(url("a.bin"))).await;
        complete(&addr, &request_for(&transport, "a.bin"), b"hello").await;
        assert!(dir.path().join("a.bin").exists());

        addr.send(DeleteFile { url: url("a.bin") }).await.unwrap().unwrap();
        assert!(!dir.path().join("a.bin").exists());
        let fraction = addr.send(DownloadedProgress { url: url("a.bin") }).await.unwrap().unwrap();
        assert_eq!(fraction, 0.0);

        // 长度缓存也被清掉，重新提交会真正下载
        let ticket = submit(&addr, Download::new(url("a.bin"))).await;
        assert_eq!(ticket.state, TaskState::Running);
    }

    #[actix_rt::test]
    async fn test_delete_file_cancels_running_task() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let a = submit(&addr, Download::new(url("a.bin"))).await;
        submit(&addr, Download::new(url("b.bin"))).await;
        let request = request_for(&transport, "a.bin");
        emit(&addr, &request, TransportEventKind::HeadersReceived { remaining: Some(10), restarted: false }).await;
        emit(&addr, &request, TransportEventKind::DataReceived(Bytes::from_static(b"01"))).await;

        addr.send(DeleteFile { url: url("a.bin") }).await.unwrap().unwrap();
        assert_eq!(a.wait().await, Some(TaskOutcome::Canceled));
        assert!(!dir.path().join("a.bin").exists());
        assert_eq!(state_of(&addr, "b.bin").await, Some(TaskState::Running));
    }

    #[actix_rt::test]
    async fn test_completed_file_moves_to_dest_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let dest: PathBuf = out.path().join("nested").join("renamed.bin");
        let ticket = submit(&addr, Download::new(url("a.bin")).dest_path(&dest)).await;
        complete(&addr, &request_for(&transport, "a.bin"), b"payload").await;

        assert_eq!(ticket.wait().await, Some(TaskOutcome::Completed(dest.clone())));
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        assert!(!dir.path().join("a.bin").exists());
    }

    #[actix_rt::test]
    async fn test_limit_change_at_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 2, QueueDiscipline::Fifo));

        for name in ["a.bin", "b.bin", "c.bin", "d.bin"] {
            submit(&addr, Download::new(url(name))).await;
        }

        // 调低不抢占正在运行的任务
        addr.send(SetConcurrencyLimit(ConcurrencyLimit::limited(1))).await.unwrap();
        let stats = addr.send(GetStats).await.unwrap();
        assert_eq!((stats.active, stats.waiting), (2, 2));

        complete(&addr, &request_for(&transport, "a.bin"), b"a").await;
        assert_eq!(transport.started().len(), 2);

        addr.send(SetConcurrencyLimit(ConcurrencyLimit::Unbounded)).await.unwrap();
        assert_eq!(transport.started_keys(), vec!["a.bin", "b.bin", "c.bin", "d.bin"]);
        let stats = addr.send(GetStats).await.unwrap();
        assert_eq!((stats.active, stats.waiting), (3, 0));
        assert_eq!(stats.limit, ConcurrencyLimit::Unbounded);
    }

    #[actix_rt::test]
    async fn test_suspended_waiting_task_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        submit(&addr, Download::new(url("b.bin"))).await;
        assert!(addr.send(SuspendDownload { url: url("b.bin") }).await.unwrap());
        assert_eq!(addr.send(GetStats).await.unwrap().waiting, 0);

        complete(&addr, &request_for(&transport, "a.bin"), b"a").await;
        assert_eq!(transport.started_keys(), vec!["a.bin"]);

        let resumed = addr.send(ResumeDownload { url: url("b.bin") }).await.unwrap();
        assert_eq!(resumed, Some(TaskState::Running));
        assert_eq!(transport.started_keys(), vec!["a.bin", "b.bin"]);
    }

    #[actix_rt::test]
    async fn test_restarted_response_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        let first = request_for(&transport, "a.bin");
        emit(&addr, &first, TransportEventKind::HeadersReceived { remaining: Some(10), restarted: false }).await;
        emit(&addr, &first, TransportEventKind::DataReceived(Bytes::from_static(b"xxxx"))).await;
        addr.send(SuspendDownload { url: url("a.bin") }).await.unwrap();
        addr.send(ResumeDownload { url: url("a.bin") }).await.unwrap();

        let second = request_for(&transport, "a.bin");
        assert_eq!(second.offset, 4);
        // 服务器忽略 Range，返回了完整内容
        emit(&addr, &second, TransportEventKind::HeadersReceived { remaining: Some(10), restarted: true }).await;
        emit(&addr, &second, TransportEventKind::DataReceived(Bytes::from_static(b"0123456789"))).await;
        emit(&addr, &second, TransportEventKind::Finished(Ok(()))).await;

        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), b"0123456789");
    }

    #[actix_rt::test]
    async fn test_unknown_length_completes_with_actual_size() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        let ticket = submit(&addr, Download::new(url("a.bin"))).await;
        let request = request_for(&transport, "a.bin");
        emit(&addr, &request, TransportEventKind::HeadersReceived { remaining: None, restarted: false }).await;
        emit(&addr, &request, TransportEventKind::DataReceived(Bytes::from_static(b"hello"))).await;
        emit(&addr, &request, TransportEventKind::Finished(Ok(()))).await;

        assert_eq!(ticket.wait().await, Some(TaskOutcome::Completed(dir.path().join("a.bin"))));
        let fraction = addr.send(DownloadedProgress { url: url("a.bin") }).await.unwrap().unwrap();
        assert_eq!(fraction, 1.0);
    }

    #[actix_rt::test]
    async fn test_bulk_suspend_resume_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        for name in ["a.bin", "b.bin", "c.bin"] {
            submit(&addr, Download::new(url(name))).await;
        }

        assert_eq!(addr.send(SuspendAll).await.unwrap(), 3);
        let stats = addr.send(GetStats).await.unwrap();
        assert_eq!((stats.active, stats.waiting, stats.suspended), (0, 0, 3));

        assert_eq!(addr.send(ResumeAll).await.unwrap(), 3);
        assert_eq!(state_of(&addr, "a.bin").await, Some(TaskState::Running));
        assert_eq!(state_of(&addr, "b.bin").await, Some(TaskState::Waiting));
        assert_eq!(state_of(&addr, "c.bin").await, Some(TaskState::Waiting));

        assert_eq!(addr.send(CancelAll).await.unwrap(), 3);
        assert_eq!(addr.send(GetStats).await.unwrap().registered, 0);
    }

    #[actix_rt::test]
    async fn test_delete_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 2, QueueDiscipline::Fifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        complete(&addr, &request_for(&transport, "a.bin"), b"hello").await;

        let b = submit(&addr, Download::new(url("b.bin"))).await;
        let request = request_for(&transport, "b.bin");
        emit(&addr, &request, TransportEventKind::HeadersReceived { remaining: Some(10), restarted: false }).await;
        emit(&addr, &request, TransportEventKind::DataReceived(Bytes::from_static(b"xy"))).await;
        fs::write(dir.path().join("notes.txt"), "keep?").unwrap();

        let removed = addr.send(DeleteAllFiles).await.unwrap().unwrap();
        assert_eq!(removed, 3);
        assert_eq!(b.wait().await, Some(TaskOutcome::Canceled));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let ticket = submit(&addr, Download::new(url("a.bin"))).await;
        assert_eq!(ticket.state, TaskState::Running);
    }

    #[actix_rt::test]
    async fn test_delete_all_failure_does_not_revive_cache_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 1, QueueDiscipline::Fifo));

        submit(&addr, Download::new(url("a.bin"))).await;
        complete(&addr, &request_for(&transport, "a.bin"), b"hello").await;

        // 目录已不存在，清空中途出错
        fs::remove_dir_all(dir.path()).unwrap();
        assert!(addr.send(DeleteAllFiles).await.unwrap().is_err());

        // 下一次写缓存会重建目录，旧记录不能跟着写回去
        submit(&addr, Download::new(url("b.bin"))).await;
        let request = request_for(&transport, "b.bin");
        emit(&addr, &request, TransportEventKind::HeadersReceived { remaining: Some(3), restarted: false }).await;

        let cache = LengthCache::load(dir.path().join(LENGTH_CACHE_FILE));
        assert_eq!(cache.get("a.bin"), 0);
        assert_eq!(cache.get("b.bin"), 3);
    }

    #[actix_rt::test]
    async fn test_completion_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 1, QueueDiscipline::Fifo);

        let (addr, transport) = start(&config);
        submit(&addr, Download::new(url("a.bin"))).await;
        complete(&addr, &request_for(&transport, "a.bin"), b"hello").await;

        // 新实例从磁盘重新加载长度缓存，不发起任何请求
        let (restarted, transport) = start(&config);
        let fraction = restarted.send(DownloadedProgress { url: url("a.bin") }).await.unwrap().unwrap();
        assert_eq!(fraction, 1.0);
        let submission = restarted.send(Download::new(url("a.bin"))).await.unwrap();
        assert!(matches!(submission, Submission::AlreadyComplete(_)));
        assert!(transport.started().is_empty());
    }

    #[actix_rt::test]
    async fn test_burst_never_exceeds_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, transport) = start(&config_in(dir.path(), 3, QueueDiscipline::Lifo));

        let names: Vec<String> = (0..20).map(|i| format!("f{}.bin", i)).collect();
        let sends: Vec<_> = names.iter().map(|n| addr.send(Download::new(url(n)))).collect();
        for submission in futures::future::join_all(sends).await {
            assert!(matches!(submission.unwrap(), Submission::Accepted(_)));
        }

        let stats = addr.send(GetStats).await.unwrap();
        assert_eq!((stats.active, stats.waiting), (3, 17));
        for name in &names[..3] {
            assert_eq!(request_for(&transport, name).offset, 0);
        }
        assert_eq!(transport.started().len(), 3);
    }
}
