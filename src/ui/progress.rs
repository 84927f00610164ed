use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::task::{Progress, TaskObserver, TaskOutcome, TaskState};

const BAR_TEMPLATE: &str =
    "{prefix:24!} [{bar:32.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA:{eta} {msg}";

/// 多任务进度面板，每个任务一行
pub struct ProgressBoard {
    multi: MultiProgress,
    style: ProgressStyle,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        Self { multi: MultiProgress::with_draw_target(target), style }
    }

    /// 新增一行，返回可以交给调度器回调的句柄
    pub fn add(&self, name: &str) -> TaskBar {
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(self.style.clone());
        bar.set_prefix(name.to_string());
        bar.set_message(TaskState::Waiting.to_string());
        TaskBar { bar }
    }

    /// 在进度条上方打印一行，不打乱面板
    pub fn println(&self, line: &str) {
        if self.multi.println(line).is_err() {
            println!("{}", line);
        }
    }

    pub fn clear(&self) {
        let _ = self.multi.clear();
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// 单个任务的进度条
#[derive(Clone)]
pub struct TaskBar {
    bar: ProgressBar,
}

impl TaskBar {
    pub fn set_progress(&self, progress: Progress) {
        if progress.expected > 0 {
            self.bar.set_length(progress.expected);
        }
        self.bar.set_position(progress.received);
    }

    pub fn set_state(&self, state: TaskState) {
        self.bar.set_message(state.to_string());
    }

    pub fn finish(&self, outcome: &TaskOutcome) {
        let message = match outcome {
            TaskOutcome::Completed(path) => format!("✓ {}", path.display()),
            TaskOutcome::Failed(e) => format!("✗ {}", e),
            TaskOutcome::Canceled => format!("✗ {}", TaskState::Canceled),
        };
        self.bar.abandon_with_message(message);
    }

    /// 不需要这一行时直接移除
    pub fn dismiss(&self) {
        self.bar.finish_and_clear();
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }

    /// 把状态和进度回调接到这一行上
    pub fn observer(&self) -> TaskObserver {
        let on_state = self.clone();
        let on_progress = self.clone();
        TaskObserver::new()
            .on_state(move |state| on_state.set_state(state))
            .on_progress(move |progress| on_progress.set_progress(progress))
    }
}
