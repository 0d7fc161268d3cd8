//! 错误类型定义
//!
//! 按流水线的各个环节划分错误：语句字段提取、segment 解码、计数存储、目录监控和配置加载。
//! 除了目录监控的注册失败以外，这些错误都只影响单个事件或单个文件。

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 字段提取错误
///
/// 出现时只丢弃当前事件，同一文件中的后续事件照常处理。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// INSERT 语句缺少 `(<columns>) VALUES (<values>)` 结构
    #[error("no `(columns) VALUES (values)` structure in INSERT statement")]
    MissingValuesClause,

    /// 列数与值数不一致
    #[error("column count {columns} does not match value count {values}")]
    ColumnCountMismatch {
        /// 列数
        columns: usize,
        /// 值数
        values: usize,
    },

    /// UPDATE 语句缺少 SET 子句
    #[error("no SET clause in UPDATE statement")]
    MissingSetClause,

    /// UPDATE 语句缺少 WHERE 子句
    #[error("no WHERE clause after SET in UPDATE statement")]
    MissingWhereClause,

    /// 括号没有闭合
    #[error("unbalanced parenthesis starting at byte {0}")]
    UnbalancedParen(usize),
}

/// segment 文件解码错误
///
/// 出现时中止当前文件的处理，已经消费的事件不会回滚。
#[derive(Debug, Error)]
pub enum SegmentError {
    /// 底层 IO 错误
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// 文件头不是 binlog 魔数
    #[error("not a binlog segment: bad magic header {0:02x?}")]
    BadMagic([u8; 4]),

    /// 事件体超过允许的最大长度
    #[error("event at offset {position} is too large: {length} bytes")]
    OversizedEvent {
        /// 事件起始偏移量
        position: u64,
        /// 声明的事件长度
        length: u32,
    },

    /// 事件头中的长度字段非法
    #[error("corrupt event at offset {position}: declared length {length}")]
    CorruptEvent {
        /// 事件起始偏移量
        position: u64,
        /// 声明的事件长度
        length: u32,
    },

    /// QUERY 事件体比声明的字段还短
    #[error("truncated query event at offset {position}")]
    TruncatedQuery {
        /// 事件起始偏移量
        position: u64,
    },
}

/// 计数存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis 返回或连接错误
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// 超时内连不上任何集群种子节点
    #[error("no redis cluster node reachable within timeout: {0}")]
    ClusterUnreachable(io::Error),

    /// 连接锁被其他线程 panic 污染
    #[error("counter store connection lock poisoned")]
    Poisoned,
}

/// 目录监控错误
///
/// 对所在目录是致命的：监控循环退出且不会自动重启。
#[derive(Debug, Error)]
pub enum WatchError {
    /// 创建或注册文件监控失败，或监控后端报告错误
    #[cfg(feature = "realtime")]
    #[error("watch backend error: {0}")]
    Notify(#[from] notify::Error),

    /// 监控目录不存在或不是目录
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// 该目录已有运行中的监控
    #[error("already watching {0}")]
    AlreadyWatching(PathBuf),

    /// 事件通道被关闭
    #[error("watch event channel disconnected")]
    Disconnected,

    /// 无法启动后台线程
    #[error("failed to spawn watch worker: {0}")]
    Spawn(io::Error),

    /// 后台线程 panic
    #[error("watch worker panicked")]
    WorkerPanicked,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量缺失或无法解析
    #[error("environment: {0}")]
    Env(#[from] envconfig::Error),

    /// 集群节点格式不是 `host:port`
    #[error("invalid cluster node '{0}': expected host:port")]
    InvalidClusterNode(String),

    /// 启用了集群模式但没有配置节点
    #[error("cluster mode enabled but REDIS_CLUSTER_NODES is empty")]
    EmptyCluster,
}
