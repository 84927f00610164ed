use actix::prelude::*;
use anyhow::Context as _;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::LevelFilter;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

use downkit::cli::{self, Mode};
use downkit::config::Config;
use downkit::core::scheduler::*;
use downkit::core::task::{local_len, TaskOutcome};
use downkit::ui::{self, DownloadSummary, ProgressBoard, TaskBar};
use downkit::utils::logger::{ActorLogger, LoggerActor};
use downkit::utils::validator::{file_name_of, parse_source};

const OUTCOME_POLL_INTERVAL: Duration = Duration::from_millis(200);
const KEYBOARD_POLL_INTERVAL: Duration = Duration::from_millis(100);
const LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

#[actix::main]
async fn main() -> anyhow::Result<()> {
    let (args, config) = match cli::Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            ui::print_error(&format!("参数解析失败: {}", e));
            std::process::exit(1);
        }
    };

    init_logging(&args)?;
    log::info!("downkit {} 启动", cli::BUILD_INFO);
    log::info!("配置文件路径: {}", args.config);
    log::info!("{}", config.get_summary());

    let scheduler = DownloadScheduler::with_http(&config)
        .context("无法初始化下载目录")?
        .start();

    match args.mode() {
        Mode::DeleteAll => {
            let removed = scheduler.send(DeleteAllFiles).await??;
            ui::print_success(&format!("已清空 {}，删除 {} 个条目", config.storage_dir.display(), removed));
        }
        Mode::Delete => {
            for url in args.get_urls()? {
                match scheduler.send(DeleteFile { url: url.clone() }).await? {
                    Ok(()) => ui::print_success(&format!("已删除: {}", url)),
                    Err(e) => ui::print_error(&format!("删除失败 {}: {}", url, e)),
                }
            }
        }
        Mode::Progress => {
            for url in args.get_urls()? {
                match scheduler.send(DownloadedProgress { url: url.clone() }).await? {
                    Ok(fraction) => println!("{:>6.1}%  {}", fraction * 100.0, url),
                    Err(e) => ui::print_error(&format!("{}: {}", url, e)),
                }
            }
        }
        Mode::Download => {
            let urls = args.get_urls()?;
            println!("{}", config.get_summary());
            let summary = run_downloads(&scheduler, &config, &urls, args.output.as_deref()).await?;
            println!("{}", summary);
            log::info!(
                "下载结束 - 成功: {}, 失败: {}, 取消: {}, 未完成: {}",
                summary.success_count, summary.failed_count, summary.canceled_count, summary.unfinished_count
            );
        }
    }

    log::logger().flush();
    Ok(())
}

/// 默认写日志文件；`--log-stderr` 时改用 env_logger
fn init_logging(args: &cli::Args) -> anyhow::Result<()> {
    if args.log_stderr {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        return Ok(());
    }
    let logger = LoggerActor::new(&args.log_file, LOG_MAX_SIZE)
        .with_context(|| format!("无法打开日志文件 {}", args.log_file))?
        .start();
    ActorLogger::install(logger, LevelFilter::Info)?;
    Ok(())
}

struct Pending {
    url: String,
    bar: TaskBar,
    outcome: oneshot::Receiver<TaskOutcome>,
}

/// 提交全部地址，然后处理按键并收集结果，直到全部结束或用户退出
async fn run_downloads(
    scheduler: &Addr<DownloadScheduler>,
    config: &Config,
    urls: &[String],
    output: Option<&str>,
) -> anyhow::Result<DownloadSummary> {
    let started = Instant::now();
    let board = ProgressBoard::new();
    let mut summary = DownloadSummary { total_files: urls.len(), ..Default::default() };
    let mut pending = Vec::new();

    for url in urls {
        let name = parse_source(url)
            .and_then(|u| file_name_of(&u))
            .unwrap_or_else(|_| url.clone());
        let bar = board.add(&name);
        let mut msg = Download::new(url.clone()).observer(bar.observer());
        if let Some(output) = output {
            msg = msg.dest_path(output);
        }

        match scheduler.send(msg).await? {
            Submission::Accepted(ticket) => {
                log::info!("已提交 {} ({}): {}", ticket.key, ticket.id, ticket.state);
                pending.push(Pending { url: url.clone(), bar, outcome: ticket.outcome });
            }
            Submission::AlreadyComplete(path) => {
                summary.success_count += 1;
                summary.total_size += local_len(&path);
                bar.finish(&TaskOutcome::Completed(path));
            }
            Submission::Ignored => {
                summary.total_files -= 1;
                board.println(&format!("重复的文件名，已忽略: {}", url));
                bar.dismiss();
            }
            Submission::Rejected(e) => {
                summary.failed_count += 1;
                bar.finish(&TaskOutcome::Failed(e));
            }
        }
    }

    if !pending.is_empty() {
        board.println(&format!(
            "开始下载 {} 个任务到 {} (按 'p' 暂停, 'r' 恢复, 'c' 取消, 'q' 退出)",
            pending.len(),
            config.storage_dir.display()
        ));
        watch(scheduler, &board, &mut pending, &mut summary).await?;
    }

    summary.unfinished_count = pending.len();
    summary.elapsed_time = started.elapsed();
    Ok(summary)
}

async fn watch(
    scheduler: &Addr<DownloadScheduler>,
    board: &ProgressBoard,
    pending: &mut Vec<Pending>,
    summary: &mut DownloadSummary,
) -> anyhow::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let mut keys = spawn_key_reader(stop.clone());
    let mut tick = tokio::time::interval(OUTCOME_POLL_INTERVAL);

    loop {
        tokio::select! {
            Some(key) = keys.recv() => {
                match key {
                    KeyCode::Char('p') | KeyCode::Char('P') => {
                        let n = scheduler.send(SuspendAll).await?;
                        board.println(&format!("已暂停 {} 个任务", n));
                    }
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        let n = scheduler.send(ResumeAll).await?;
                        board.println(&format!("已恢复 {} 个任务", n));
                    }
                    KeyCode::Char('c') | KeyCode::Char('C') => {
                        let n = scheduler.send(CancelAll).await?;
                        board.println(&format!("已取消 {} 个任务", n));
                    }
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                        // 暂停会关闭输出文件，已下载的字节下次续传
                        scheduler.send(SuspendAll).await?;
                        log::info!("用户退出，{} 个任务未完成", pending.len());
                        break;
                    }
                    _ => {}
                }
            }
            _ = tick.tick() => {
                collect_outcomes(pending, summary);
                if pending.is_empty() {
                    break;
                }
            }
        }
    };

    stop.store(true, Ordering::SeqCst);
    let _ = terminal::disable_raw_mode();
    collect_outcomes(pending, summary);
    board.clear();
    Ok(())
}

fn collect_outcomes(pending: &mut Vec<Pending>, summary: &mut DownloadSummary) {
    pending.retain_mut(|task| match task.outcome.try_recv() {
        Ok(outcome) => {
            match &outcome {
                TaskOutcome::Completed(path) => {
                    summary.success_count += 1;
                    summary.total_size += local_len(path);
                }
                TaskOutcome::Failed(e) => {
                    summary.failed_count += 1;
                    log::error!("下载失败 {}: {}", task.url, e);
                    if e.is_retryable() {
                        summary.retryable_count += 1;
                    }
                }
                TaskOutcome::Canceled => summary.canceled_count += 1,
            }
            task.bar.finish(&outcome);
            false
        }
        Err(oneshot::error::TryRecvError::Empty) => true,
        Err(oneshot::error::TryRecvError::Closed) => false,
    });
}

/// 在单独的线程里读键盘，避免阻塞 actor 所在的运行时
fn spawn_key_reader(stop: Arc<AtomicBool>) -> mpsc::UnboundedReceiver<KeyCode> {
    let (tx, rx) = mpsc::unbounded_channel();
    if !std::io::stdin().is_terminal() {
        return rx;
    }
    if let Err(e) = terminal::enable_raw_mode() {
        log::warn!("无法进入终端原始模式，键盘控制不可用: {}", e);
        return rx;
    }

    std::thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            match event::poll(KEYBOARD_POLL_INTERVAL) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read() {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        let code = if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                            KeyCode::Char('q')
                        } else {
                            key.code
                        };
                        if tx.send(code).is_err() {
                            break;
                        }
                    }
                }
                Ok(false) => {}
                Err(_) => break,
            }
        }
        let _ = terminal::disable_raw_mode();
    });
    rx
}
