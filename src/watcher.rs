//! 目录监听与防抖重载
//!
//! notify 事件经 channel 转入 tokio 任务；每来一个相关事件就把
//! 防抖计时器重置为 100ms，计时器到期后执行一次重载。

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 默认防抖间隔
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// 重载回调
pub type ReloadFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("创建文件监听器失败: {0}")]
    Create(#[source] notify::Error),

    #[error("监听目录 {path} 失败: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("监听需要在 tokio 运行时中启动")]
    NoRuntime,
}

/// 目录监听器
///
/// 持有期间保持监听，`stop()` 可重复调用。
pub struct DirWatcher {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    cancel: CancellationToken,
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

impl DirWatcher {
    /// 开始递归监听目录
    ///
    /// # Arguments
    /// * `dir` - 监听的根目录
    /// * `tag` - 日志前缀，例如 `STEERING`
    /// * `debounce` - 防抖间隔
    /// * `reload` - 防抖结束后在阻塞线程池中执行的回调
    pub fn start(
        dir: &Path,
        tag: &'static str,
        debounce: Duration,
        reload: ReloadFn,
    ) -> Result<Self, WatchError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => tracing::error!("[WATCHER] [{}] 监听错误: {}", tag, e),
            },
            notify::Config::default(),
        )
        .map_err(WatchError::Create)?;

        watcher
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Watch {
                path: dir.to_path_buf(),
                source,
            })?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_dir = dir.to_path_buf();

        runtime.spawn(async move {
            let sleep = tokio::time::sleep(debounce);
            tokio::pin!(sleep);
            let mut pending = false;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if is_relevant(&event) {
                            tracing::debug!("[WATCHER] [{}] 文件变更: {:?}", tag, event.paths);
                            pending = true;
                            sleep.as_mut().reset(Instant::now() + debounce);
                        }
                    }
                    _ = &mut sleep, if pending => {
                        pending = false;
                        tracing::info!("[WATCHER] [{}] 目录 {} 已变更，重新加载", tag, task_dir.display());
                        let reload = reload.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || reload()).await {
                            tracing::error!("[WATCHER] [{}] 重载任务异常: {}", tag, e);
                        }
                    }
                }
            }
            tracing::debug!("[WATCHER] [{}] 监听任务退出", tag);
        });

        tracing::info!("[WATCHER] [{}] 开始监听 {}", tag, dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            watcher: Some(watcher),
            cancel,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// 停止监听
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if self.watcher.take().is_some() {
            tracing::info!("[WATCHER] 停止监听 {}", self.dir.display());
        }
    }
}

impl Drop for DirWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
