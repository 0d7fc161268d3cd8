//! 触发接口
//!
//! - `GET /start?relayLogDirectory=<dir>` 在后台开始监控目录，立即返回
//! - `GET /stop` 停止所有通过本接口启动的监控
//! - `GET /` 服务名

use crate::error::WatchError;
use crate::realtime::{DirectoryWatcher, WatchHandle};
use axum::extract::{Query, State};
use axum::{Router, routing};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

pub const STARTED_MESSAGE: &str = "Relay log reading started.";
pub const STOPPED_MESSAGE: &str = "Relay log reading stopped.";

#[derive(Clone)]
pub struct AppState {
    watcher: Arc<DirectoryWatcher>,
    default_directory: PathBuf,
    handles: Arc<Mutex<Vec<WatchHandle>>>,
}

impl AppState {
    pub fn new(watcher: DirectoryWatcher, default_directory: PathBuf) -> Self {
        Self {
            watcher: Arc::new(watcher),
            default_directory,
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 当前仍在运行的监控数
    pub fn active_watches(&self) -> usize {
        self.handles
            .lock()
            .map(|handles| handles.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// 登记的监控数，包括已经退出但尚未清理的
    pub fn registered_watches(&self) -> usize {
        self.handles.lock().map(|handles| handles.len()).unwrap_or(0)
    }

    /// 登记新的监控，顺带清理已经退出的
    fn register(&self, handle: WatchHandle) {
        let mut handles = match self.handles.lock() {
            Ok(handles) => handles,
            Err(_) => {
                handle.stop();
                error!(
                    directory = %handle.directory().display(),
                    "watch registry poisoned, watch stopped"
                );
                return;
            }
        };

        let (finished, running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *handles).into_iter().partition(|h| h.is_finished());
        *handles = running;
        handles.push(handle);
        drop(handles);

        for handle in finished {
            let directory = handle.directory().display().to_string();
            if let Err(e) = handle.join() {
                warn!(%directory, error = %e, "watch ended with error");
            }
        }
    }

    /// 停止全部监控并等待线程退出，返回停止的数量
    pub fn stop_all(&self) -> usize {
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => return 0,
        };

        let count = handles.len();
        for handle in &handles {
            handle.stop();
        }
        for handle in handles {
            let directory = handle.directory().display().to_string();
            if let Err(e) = handle.join() {
                warn!(%directory, error = %e, "watch ended with error");
            }
        }
        count
    }
}

#[derive(Debug, Deserialize)]
pub struct StartParams {
    #[serde(rename = "relayLogDirectory")]
    relay_log_directory: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", routing::get(index))
        .route("/start", routing::get(start))
        .route("/stop", routing::get(stop))
        .with_state(state)
}

pub async fn index() -> &'static str {
    "relay-counter"
}

async fn start(State(state): State<AppState>, Query(params): Query<StartParams>) -> &'static str {
    let directory = params
        .relay_log_directory
        .filter(|d| !d.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| state.default_directory.clone());

    info!(directory = %directory.display(), "start requested");

    // 注册在阻塞线程池上完成，失败只记录日志
    tokio::task::spawn_blocking(move || match state.watcher.start(&directory) {
        Ok(handle) => state.register(handle),
        Err(WatchError::AlreadyWatching(directory)) => {
            warn!(directory = %directory.display(), "directory already watched, start ignored")
        }
        Err(e) => error!(directory = %directory.display(), error = %e, "failed to start watch"),
    });

    STARTED_MESSAGE
}

async fn stop(State(state): State<AppState>) -> &'static str {
    let stopped = tokio::task::spawn_blocking(move || state.stop_all())
        .await
        .unwrap_or(0);
    info!(stopped, "stop requested");
    STOPPED_MESSAGE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::WatchConfig;
    use crate::store::MemoryCounterStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    fn state(default_directory: PathBuf) -> AppState {
        let config = WatchConfig {
            prefix: "relay-".to_string(),
            poll_interval: Duration::from_millis(50),
        };
        let watcher = DirectoryWatcher::new(config, Arc::new(MemoryCounterStore::new()));
        AppState::new(watcher, default_directory)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn wait_for_watches(state: &AppState, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if state.active_watches() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn index() {
        let (status, body) = get(app(state(PathBuf::from("/tmp"))), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "relay-counter");
    }

    #[tokio::test]
    async fn start_and_stop() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(PathBuf::from("/nonexistent"));
        let uri = format!("/start?relayLogDirectory={}", dir.path().display());

        let (status, body) = get(app(state.clone()), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, STARTED_MESSAGE);
        assert!(wait_for_watches(&state, 1).await);

        let (status, body) = get(app(state.clone()), "/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, STOPPED_MESSAGE);
        assert_eq!(state.active_watches(), 0);
    }

    #[tokio::test]
    async fn start_twice_keeps_one_watch() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(PathBuf::from("/nonexistent"));
        let uri = format!("/start?relayLogDirectory={}", dir.path().display());

        get(app(state.clone()), &uri).await;
        assert!(wait_for_watches(&state, 1).await);

        let (status, body) = get(app(state.clone()), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, STARTED_MESSAGE);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(state.registered_watches(), 1);

        state.stop_all();
    }

    #[tokio::test]
    async fn finished_watches_are_pruned() {
        let parent = tempfile::TempDir::new().unwrap();
        let gone = parent.path().join("gone");
        std::fs::create_dir(&gone).unwrap();
        let kept = tempfile::TempDir::new().unwrap();
        let state = state(PathBuf::from("/nonexistent"));

        get(app(state.clone()), &format!("/start?relayLogDirectory={}", gone.display())).await;
        assert!(wait_for_watches(&state, 1).await);

        std::fs::remove_dir(&gone).unwrap();
        assert!(wait_for_watches(&state, 0).await);
        assert_eq!(state.registered_watches(), 1);

        get(app(state.clone()), &format!("/start?relayLogDirectory={}", kept.path().display())).await;
        assert!(wait_for_watches(&state, 1).await);
        assert_eq!(state.registered_watches(), 1);

        state.stop_all();
    }

    #[tokio::test]
    async fn start_without_directory_uses_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(dir.path().to_path_buf());

        let (status, _) = get(app(state.clone()), "/start?relayLogDirectory=").await;
        assert_eq!(status, StatusCode::OK);
        assert!(wait_for_watches(&state, 1).await);

        state.stop_all();
    }

    #[tokio::test]
    async fn start_failure_still_responds() {
        let state = state(PathBuf::from("/nonexistent/relay"));

        let (status, body) = get(app(state.clone()), "/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, STARTED_MESSAGE);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.active_watches(), 0);
    }
}
