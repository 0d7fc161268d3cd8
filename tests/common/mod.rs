//! 集成测试共用工具

#![allow(dead_code)]

use relay_counter::MemoryCounterStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub use relay_counter::__test_helpers::{SegmentBuilder, append_queries, encode_segment, write_segment};

pub const INSERT_G1_B1_CH1: &str =
    "INSERT INTO t_bill (group_code, bill_code, channel) VALUES ('G1','B1','CH1')";
pub const UPDATE_G1_B1_CH1_5: &str =
    "UPDATE t_bill SET result_code='5', group_code='G1', channel='CH1' WHERE bill_code='B1'";
pub const UPDATE_PENDING: &str =
    "UPDATE t_bill SET result_code='99', group_code='G1', channel='CH1' WHERE bill_code='B1'";

pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<MemoryCounterStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
            store: Arc::new(MemoryCounterStore::new()),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// 轮询直到条件成立，最多 5 秒
pub fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}
