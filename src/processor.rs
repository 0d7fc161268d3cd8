//! segment 文件处理
//!
//! 对一个 segment 文件中尚未处理的事件依次执行 分类 → 提取 → 聚合。
//! 每个文件维护一个 [`SegmentCursor`]，重复通知同一个文件时只处理新追加的事件。

use crate::aggregator::{CounterAggregator, Outcome};
use crate::error::SegmentError;
use crate::event::StatementKind;
use crate::parser::{classify, extract};
use crate::segment::{SegmentCursor, SegmentReader};
use crate::store::CounterStore;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 单次处理的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// 解码出的事件数（所有类型）
    pub events: usize,
    /// QUERY 事件数
    pub queries: usize,
    pub inserts: usize,
    pub updates: usize,
    pub incremented: usize,
    pub suppressed: usize,
    pub incomplete: usize,
    /// 字段提取失败被丢弃的语句数
    pub malformed: usize,
    pub store_failures: usize,
    /// 本次读取的起止偏移量
    pub start_offset: u64,
    pub end_offset: u64,
    /// 读取停在未写完的事件上时，该事件声明的结束位置
    pub pending_end: Option<u64>,
}

impl ProcessReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Incremented { .. } => self.incremented += 1,
            Outcome::Suppressed => self.suppressed += 1,
            Outcome::Incomplete => self.incomplete += 1,
            Outcome::StoreFailed { .. } => self.store_failures += 1,
            Outcome::Ignored => {}
        }
    }
}

/// segment 文件处理器
///
/// 游标只保存在内存中，进程重启后文件会从头重新处理。
pub struct LogSegmentProcessor {
    aggregator: CounterAggregator,
    cursors: HashMap<PathBuf, SegmentCursor>,
    stalls: HashMap<PathBuf, Stall>,
}

/// 上一次处理停在未写完事件时的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stall {
    offset: u64,
    declared_end: u64,
    len: u64,
}

impl LogSegmentProcessor {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            aggregator: CounterAggregator::new(store),
            cursors: HashMap::new(),
            stalls: HashMap::new(),
        }
    }

    /// 某个文件当前的游标
    pub fn cursor(&self, path: &Path) -> Option<SegmentCursor> {
        self.cursors.get(path).copied()
    }

    /// 忘记某个文件的游标，下次从头处理
    pub fn forget(&mut self, path: &Path) -> Option<SegmentCursor> {
        self.stalls.remove(path);
        self.cursors.remove(path)
    }

    /// 处理文件中游标之后的所有完整事件
    ///
    /// 读取出错时中止该文件，已经处理的事件不回滚，游标停在最后一个完整事件之后。
    pub fn process<P: AsRef<Path>>(&mut self, path: P) -> Result<ProcessReport, SegmentError> {
        let path = path.as_ref();
        let mut cursor = self.cursors.get(path).copied().unwrap_or_default();

        let len = fs::metadata(path)?.len();
        if len < cursor.offset {
            warn!(
                path = %path.display(),
                len,
                offset = cursor.offset,
                "segment shrank, restarting from the beginning"
            );
            cursor = SegmentCursor::default();
        }

        let mut report = ProcessReport {
            start_offset: cursor.offset,
            end_offset: cursor.offset,
            ..ProcessReport::default()
        };

        let mut reader = match SegmentReader::open(path, cursor) {
            Ok(reader) => reader,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot open segment");
                return Err(e);
            }
        };
        let mut failure = None;

        for event in reader.by_ref() {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            report.events += 1;

            if !event.is_query() {
                continue;
            }
            report.queries += 1;

            let kind = classify(&event.statement);
            match kind {
                StatementKind::Insert => report.inserts += 1,
                StatementKind::Update => report.updates += 1,
                StatementKind::Other => continue,
            }
            debug!(path = %path.display(), %kind, offset = event.position, "routing statement");

            let fields = match extract(kind, &event.statement) {
                Ok(fields) => fields,
                Err(e) => {
                    report.malformed += 1;
                    warn!(
                        path = %path.display(),
                        statement = %event.statement,
                        error = %e,
                        "dropping statement"
                    );
                    continue;
                }
            };

            let outcome = self.aggregator.aggregate(kind, &fields);
            if matches!(outcome, Outcome::Incomplete) {
                warn!(
                    path = %path.display(),
                    statement = %event.statement,
                    "required fields missing, statement not counted"
                );
            }
            report.record(&outcome);
        }

        let cursor = reader.cursor();
        report.end_offset = cursor.offset;
        report.pending_end = reader.pending_end();
        self.cursors.insert(path.to_path_buf(), cursor);
        self.track_stall(path, cursor.offset, report.pending_end, len);

        if let Some(e) = failure {
            error!(
                path = %path.display(),
                offset = cursor.offset,
                error = %e,
                "segment read aborted"
            );
            return Err(e);
        }

        info!(
            path = %path.display(),
            events = report.events,
            queries = report.queries,
            incremented = report.incremented,
            suppressed = report.suppressed,
            malformed = report.malformed,
            store_failures = report.store_failures,
            offset = report.end_offset,
            "segment processed"
        );
        Ok(report)
    }
}

impl LogSegmentProcessor {
    /// 文件变长后同一个尾部事件仍未完成时告警，长度字段可能已损坏
    fn track_stall(&mut self, path: &Path, offset: u64, pending_end: Option<u64>, len: u64) {
        let Some(declared_end) = pending_end else {
            self.stalls.remove(path);
            return;
        };

        let current = Stall {
            offset,
            declared_end,
            len,
        };
        if let Some(previous) = self.stalls.insert(path.to_path_buf(), current) {
            if previous.offset == offset && previous.declared_end == declared_end && len > previous.len {
                warn!(
                    path = %path.display(),
                    offset,
                    declared_end,
                    len,
                    "trailing event still incomplete after the file grew"
                );
            }
        }
    }
}
