//! 目录实时监控
//!
//! 监控 relay log 目录的创建和修改事件，文件名匹配前缀时交给 [`LogSegmentProcessor`] 处理。
//!
//! - 每个被监控的目录一个后台线程，文件在该线程上按通知顺序依次处理
//! - 通过 [`ShutdownToken`] 停止，停止延迟不超过 `poll_interval`
//! - 监控后端报错或事件通道断开时循环退出，不会自动重启
//!
//! # 示例
//!
//! ```no_run
//! use relay_counter::realtime::{DirectoryWatcher, WatchConfig};
//! use relay_counter::store::MemoryCounterStore;
//! use std::sync::Arc;
//!
//! let watcher = DirectoryWatcher::new(WatchConfig::default(), Arc::new(MemoryCounterStore::new()));
//! let handle = watcher.start("/var/lib/mysql/relay").expect("watch failed");
//!
//! // ...
//! handle.stop();
//! handle.join().expect("watch loop failed");
//! ```

use crate::error::WatchError;
use crate::processor::LogSegmentProcessor;
use crate::store::CounterStore;
use crate::tools::is_segment_file;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 监控参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// 只处理文件名以此开头的文件
    pub prefix: String,
    /// 每轮等待事件的最长时间
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            prefix: "relay-bin".to_string(),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// 停止信号，可在线程间克隆共享
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 运行中的监控
pub struct WatchHandle {
    directory: PathBuf,
    token: ShutdownToken,
    worker: JoinHandle<Result<(), WatchError>>,
}

impl WatchHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }

    /// 请求停止，不等待线程退出
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// 等待监控线程退出并返回循环的结果
    pub fn join(self) -> Result<(), WatchError> {
        self.worker.join().map_err(|_| WatchError::WorkerPanicked)?
    }
}

/// 正在监控的目录集合
type ActiveDirectories = Arc<Mutex<HashSet<PathBuf>>>;

fn lock_active(active: &ActiveDirectories) -> MutexGuard<'_, HashSet<PathBuf>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 监控线程退出时（包括 panic）把目录移出集合
struct ActiveEntry {
    active: ActiveDirectories,
    directory: PathBuf,
}

impl Drop for ActiveEntry {
    fn drop(&mut self) {
        lock_active(&self.active).remove(&self.directory);
    }
}

/// 目录监控器
///
/// 可以对多个目录分别调用 [`start`](Self::start)，每个目录同一时间只有一个监控线程，
/// 各自拥有独立的处理器和游标。
pub struct DirectoryWatcher {
    config: WatchConfig,
    store: Arc<dyn CounterStore>,
    active: ActiveDirectories,
}

impl DirectoryWatcher {
    pub fn new(config: WatchConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            config,
            store,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 目录（规范化路径）是否有运行中的监控
    pub fn is_watching<P: AsRef<Path>>(&self, directory: P) -> bool {
        match directory.as_ref().canonicalize() {
            Ok(directory) => lock_active(&self.active).contains(&directory),
            Err(_) => false,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// 注册目录监控并启动后台线程
    ///
    /// 注册在调用线程上完成，失败直接返回。同一目录已在监控时返回
    /// [`WatchError::AlreadyWatching`]。
    pub fn start<P: AsRef<Path>>(&self, directory: P) -> Result<WatchHandle, WatchError> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(WatchError::NotADirectory(directory.to_path_buf()));
        }
        let directory = directory
            .canonicalize()
            .map_err(|_| WatchError::NotADirectory(directory.to_path_buf()))?;

        // 先占位，注册或启动失败时由 ActiveEntry 释放
        if !lock_active(&self.active).insert(directory.clone()) {
            return Err(WatchError::AlreadyWatching(directory));
        }
        let entry = ActiveEntry {
            active: Arc::clone(&self.active),
            directory: directory.clone(),
        };

        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        info!(
            directory = %directory.display(),
            prefix = %self.config.prefix,
            "watching relay log directory"
        );

        let token = ShutdownToken::new();
        let worker_loop = WatchLoop {
            directory: directory.clone(),
            prefix: self.config.prefix.clone(),
            poll_interval: self.config.poll_interval,
            processor: LogSegmentProcessor::new(Arc::clone(&self.store)),
            token: token.clone(),
        };

        let worker = thread::Builder::new()
            .name("relay-watch".to_string())
            .spawn(move || {
                let _entry = entry;
                // watcher 的生命周期与循环一致，drop 时注销监控
                let _watcher = watcher;
                worker_loop.run(rx)
            })
            .map_err(WatchError::Spawn)?;

        Ok(WatchHandle {
            directory,
            token,
            worker,
        })
    }
}

struct WatchLoop {
    directory: PathBuf,
    prefix: String,
    poll_interval: Duration,
    processor: LogSegmentProcessor,
    token: ShutdownToken,
}

impl WatchLoop {
    fn run(mut self, rx: Receiver<Result<Event, notify::Error>>) -> Result<(), WatchError> {
        let result = self.event_loop(&rx);
        match &result {
            Ok(()) => info!(directory = %self.directory.display(), "watch loop stopped"),
            Err(e) => error!(directory = %self.directory.display(), error = %e, "watch loop failed"),
        }
        result
    }

    fn event_loop(&mut self, rx: &Receiver<Result<Event, notify::Error>>) -> Result<(), WatchError> {
        while !self.token.is_cancelled() {
            let event = match rx.recv_timeout(self.poll_interval) {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => return Err(e.into()),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(WatchError::Disconnected),
            };

            if event.need_rescan() {
                warn!(directory = %self.directory.display(), "watch events dropped, skipping rescan");
                continue;
            }

            match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => {
                    for path in &event.paths {
                        self.dispatch(path);
                    }
                }
                EventKind::Remove(_) if event.paths.iter().any(|p| p == &self.directory) => {
                    warn!(directory = %self.directory.display(), "watched directory removed");
                    return Ok(());
                }
                _ => trace!(kind = ?event.kind, "ignoring watch event"),
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, path: &Path) {
        if !is_segment_file(path, &self.prefix) {
            trace!(path = %path.display(), "not a segment file");
            return;
        }
        if !path.is_file() {
            return;
        }

        debug!(path = %path.display(), "segment changed");
        // 失败已在处理器中记录，继续处理后续通知
        let _ = self.processor.process(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::__test_helpers::write_segment;
    use crate::store::MemoryCounterStore;
    use std::time::Instant;
    use tempfile::TempDir;

    fn watcher(store: Arc<MemoryCounterStore>) -> DirectoryWatcher {
        let config = WatchConfig {
            prefix: "relay-".to_string(),
            poll_interval: Duration::from_millis(50),
        };
        DirectoryWatcher::new(config, store)
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        condition()
    }

    #[test]
    fn test_shutdown_token() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_start_on_missing_directory() {
        let store = Arc::new(MemoryCounterStore::new());
        let result = watcher(store).start("/nonexistent/relay/dir");
        assert!(matches!(result, Err(WatchError::NotADirectory(_))));
    }

    #[test]
    fn test_stop_ends_loop() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCounterStore::new());
        let handle = watcher(store).start(dir.path()).unwrap();

        handle.stop();
        assert!(handle.join().is_ok());
    }

    #[test]
    fn test_created_segment_is_counted() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCounterStore::new());
        let handle = watcher(store.clone()).start(dir.path()).unwrap();

        write_segment(
            dir.path().join("relay-0001"),
            &["INSERT INTO t (group_code, bill_code, channel) VALUES ('G1','B1','CH1')"],
            false,
        )
        .unwrap();

        assert!(wait_for(|| store.get("count:G1:B1", "CH1:99") == Some(1)));

        handle.stop();
        handle.join().unwrap();
    }

    #[test]
    fn test_prefix_mismatch_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCounterStore::new());
        let handle = watcher(store.clone()).start(dir.path()).unwrap();

        write_segment(
            dir.path().join("other-0001"),
            &["INSERT INTO t (group_code, bill_code, channel) VALUES ('G1','B1','CH1')"],
            false,
        )
        .unwrap();
        thread::sleep(Duration::from_millis(300));

        handle.stop();
        handle.join().unwrap();
        assert_eq!(store.total(), 0);
    }
    #[test]
    fn test_second_start_on_same_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCounterStore::new());
        let watcher = watcher(store.clone());

        let handle = watcher.start(dir.path()).unwrap();
        let second = watcher.start(dir.path());
        assert!(matches!(second, Err(WatchError::AlreadyWatching(_))));
        assert!(watcher.is_watching(dir.path()));

        write_segment(
            dir.path().join("relay-0001"),
            &["INSERT INTO t (group_code, bill_code, channel) VALUES ('G1','B1','CH1')"],
            false,
        )
        .unwrap();
        assert!(wait_for(|| store.get("count:G1:B1", "CH1:99") == Some(1)));
        thread::sleep(Duration::from_millis(300));
        assert_eq!(store.get("count:G1:B1", "CH1:99"), Some(1));

        handle.stop();
        handle.join().unwrap();
        assert!(!watcher.is_watching(dir.path()));

        // 停止后可以重新监控
        let handle = watcher.start(dir.path()).unwrap();
        handle.stop();
        handle.join().unwrap();
    }

    #[test]
    fn test_removed_directory_ends_loop() {
        let parent = TempDir::new().unwrap();
        let dir = parent.path().join("relay");
        std::fs::create_dir(&dir).unwrap();
        let store = Arc::new(MemoryCounterStore::new());
        let watcher = watcher(store);
        let handle = watcher.start(&dir).unwrap();

        std::fs::remove_dir(&dir).unwrap();

        assert!(wait_for(|| handle.is_finished()));
        assert!(handle.join().is_ok());
        assert!(lock_active(&watcher.active).is_empty());
    }

    fn watch_loop() -> WatchLoop {
        WatchLoop {
            directory: PathBuf::from("/var/lib/mysql/relay"),
            prefix: "relay-".to_string(),
            poll_interval: Duration::from_millis(10),
            processor: LogSegmentProcessor::new(Arc::new(MemoryCounterStore::new())),
            token: ShutdownToken::new(),
        }
    }

    #[test]
    fn test_disconnected_channel_is_fatal() {
        let (tx, rx) = channel::<Result<Event, notify::Error>>();
        drop(tx);

        let result = watch_loop().event_loop(&rx);
        assert!(matches!(result, Err(WatchError::Disconnected)));
    }

    #[test]
    fn test_backend_error_is_fatal() {
        let (tx, rx) = channel();
        tx.send(Err(notify::Error::generic("inotify queue broken"))).unwrap();

        let result = watch_loop().event_loop(&rx);
        assert!(matches!(result, Err(WatchError::Notify(_))));
    }

    #[test]
    fn test_cancelled_loop_returns_ok() {
        let (_tx, rx) = channel::<Result<Event, notify::Error>>();
        let mut worker = watch_loop();
        worker.token.cancel();

        assert!(worker.event_loop(&rx).is_ok());
    }
}
