//! 计数存储
//!
//! 流水线只需要一个操作：对哈希字段做原子自增（HINCRBY）。

use crate::error::StoreError;
use redis::cluster::{ClusterClient, ClusterClientBuilder, ClusterConnection};
use redis::{Commands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::collections::HashMap;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// 计数存储接口
///
/// 实现必须保证并发调用下 `increment` 是原子的。
pub trait CounterStore: Send + Sync {
    /// 对 `key` 哈希中的 `field` 加 `delta`，返回自增后的值
    fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;
}

/// Redis 连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// 非空时使用集群模式，忽略 host/port
    pub cluster_nodes: Vec<(String, u16)>,
    /// 连接、读、写超时
    pub data_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            cluster_nodes: Vec::new(),
            data_timeout: Duration::from_millis(2000),
        }
    }
}

enum RedisTarget {
    Single(redis::Client),
    Cluster(ClusterClient),
}

enum RedisConnection {
    Single(redis::Connection),
    Cluster(ClusterConnection),
}

/// 基于 Redis 的计数存储，支持单机与集群
///
/// 连接在第一次使用时建立；命令失败后丢弃连接，下次调用重新连接。
pub struct RedisCounterStore {
    target: RedisTarget,
    cluster_nodes: Vec<(String, u16)>,
    timeout: Duration,
    connection: Mutex<Option<RedisConnection>>,
}

impl RedisCounterStore {
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let password = config.password.clone().filter(|p| !p.is_empty());

        let target = if config.cluster_nodes.is_empty() {
            let info = ConnectionInfo {
                addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
                redis: RedisConnectionInfo {
                    db: 0,
                    username: None,
                    password,
                },
            };
            RedisTarget::Single(redis::Client::open(info)?)
        } else {
            let nodes: Vec<String> = config
                .cluster_nodes
                .iter()
                .map(|(host, port)| format!("redis://{}:{}/", host, port))
                .collect();
            let mut builder = ClusterClientBuilder::new(nodes);
            if let Some(password) = password {
                builder = builder.password(password);
            }
            RedisTarget::Cluster(builder.build()?)
        };

        Ok(Self {
            target,
            cluster_nodes: config.cluster_nodes.clone(),
            timeout: config.data_timeout,
            connection: Mutex::new(None),
        })
    }

    fn connect(&self) -> Result<RedisConnection, StoreError> {
        let timeout = Some(self.timeout);
        match &self.target {
            RedisTarget::Single(client) => {
                let conn = client.get_connection_with_timeout(self.timeout)?;
                conn.set_read_timeout(timeout)?;
                conn.set_write_timeout(timeout)?;
                debug!("connected to redis");
                Ok(RedisConnection::Single(conn))
            }
            RedisTarget::Cluster(client) => {
                self.check_cluster_reachable()?;
                let conn = client.get_connection()?;
                conn.set_read_timeout(timeout)?;
                conn.set_write_timeout(timeout)?;
                debug!("connected to redis cluster");
                Ok(RedisConnection::Cluster(conn))
            }
        }
    }

    /// 集群客户端建连本身没有超时，先在超时内确认至少一个种子节点可以连上
    ///
    /// 只覆盖种子节点，重定向或拓扑发现到的节点仍然按 redis 客户端的默认方式建连。
    fn check_cluster_reachable(&self) -> Result<(), StoreError> {
        let mut last_error = None;
        for (host, port) in &self.cluster_nodes {
            let addrs = match (host.as_str(), *port).to_socket_addrs() {
                Ok(addrs) => addrs,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            for addr in addrs {
                match TcpStream::connect_timeout(&addr, self.timeout) {
                    Ok(_) => return Ok(()),
                    Err(e) => {
                        debug!(%addr, error = %e, "redis cluster node unreachable");
                        last_error = Some(e);
                    }
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no cluster node address"));
        Err(StoreError::ClusterUnreachable(error))
    }
}

impl CounterStore for RedisCounterStore {
    fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut guard = self.connection.lock().map_err(|_| StoreError::Poisoned)?;

        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };

        let result: redis::RedisResult<i64> = match &mut conn {
            RedisConnection::Single(conn) => conn.hincr(key, field, delta),
            RedisConnection::Cluster(conn) => conn.hincr(key, field, delta),
        };

        match result {
            Ok(value) => {
                *guard = Some(conn);
                Ok(value)
            }
            Err(e) => {
                warn!(key, field, error = %e, "redis command failed, dropping connection");
                Err(e.into())
            }
        }
    }
}

/// 进程内计数存储，用于测试和本地运行
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, HashMap<String, i64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取单个字段的当前值，不存在为 None
    pub fn get(&self, key: &str, field: &str) -> Option<i64> {
        let counters = self.counters.lock().ok()?;
        counters.get(key)?.get(field).copied()
    }

    /// 某个 key 下的全部字段快照
    pub fn fields(&self, key: &str) -> HashMap<String, i64> {
        self.counters
            .lock()
            .ok()
            .and_then(|counters| counters.get(key).cloned())
            .unwrap_or_default()
    }

    /// 所有字段值之和
    pub fn total(&self) -> i64 {
        self.counters
            .lock()
            .map(|counters| counters.values().flat_map(|fields| fields.values()).sum())
            .unwrap_or(0)
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut counters = self.counters.lock().map_err(|_| StoreError::Poisoned)?;
        let value = counters
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0);
        *value += delta;
        Ok(*value)
    }
}
