//! # relay-counter
//!
//! 监听 MySQL/MariaDB relay log 目录，从 QUERY 事件中解析 INSERT/UPDATE 语句，
//! 在 Redis 中按业务组和单据维护计数。
//!
//! ## 处理流程
//!
//! ```text
//! 目录通知 → segment 解码 → 语句分类 → 字段提取 → 计数聚合 → HINCRBY
//! ```
//!
//! - 键：`count:<group_code>:<bill_code>`
//! - 字段：`<channel>:<result_code>`，INSERT 的结果码固定为 `99`
//! - UPDATE 的结果码为 `99` 时不计数
//!
//! ## 快速开始
//!
//! ### 处理单个 segment 文件
//!
//! ```rust,no_run
//! use relay_counter::{LogSegmentProcessor, MemoryCounterStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryCounterStore::new());
//! let mut processor = LogSegmentProcessor::new(store.clone());
//!
//! let report = processor.process("/var/lib/mysql/relay/relay-bin.000001").unwrap();
//! println!("计数 {} 次", report.incremented);
//!
//! // 再次处理同一文件只会读取新追加的事件
//! processor.process("/var/lib/mysql/relay/relay-bin.000001").unwrap();
//! ```
//!
//! ### 只做提取和聚合决策
//!
//! ```rust
//! use relay_counter::aggregator::{plan, Decision};
//! use relay_counter::parser::{classify, extract};
//!
//! let sql = "UPDATE t SET result_code='5', group_code='G1', channel='CH1' WHERE bill_code='B1'";
//! let kind = classify(sql);
//! let fields = extract(kind, sql).unwrap();
//!
//! match plan(kind, &fields) {
//!     Decision::Increment { key, field } => {
//!         assert_eq!(key.as_str(), "count:G1:B1");
//!         assert_eq!(field.as_str(), "CH1:5");
//!     }
//!     other => panic!("unexpected decision: {:?}", other),
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod parser;
pub mod processor;
#[cfg(feature = "realtime")]
pub mod realtime;
pub mod segment;
#[cfg(feature = "realtime")]
pub mod server;
pub mod store;
pub mod tools;

#[doc(hidden)]
pub mod __test_helpers;

pub use aggregator::{CounterAggregator, Decision, Outcome};
pub use error::{ConfigError, ExtractError, SegmentError, StoreError, WatchError};
pub use event::{ChangeEvent, CounterField, CounterKey, EventType, ExtractedFields, StatementKind};
pub use processor::{LogSegmentProcessor, ProcessReport};
#[cfg(feature = "realtime")]
pub use realtime::{DirectoryWatcher, ShutdownToken, WatchConfig, WatchHandle};
pub use segment::{SegmentCursor, SegmentReader};
pub use store::{CounterStore, MemoryCounterStore, RedisConfig, RedisCounterStore};
