//! 运行配置
//!
//! 所有配置项来自环境变量，缺省值适合本机调试。

use crate::error::ConfigError;
use crate::logging::LogConfig;
#[cfg(feature = "realtime")]
use crate::realtime::WatchConfig;
use crate::store::RedisConfig;
use envconfig::Envconfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Envconfig, Debug, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    /// `/start` 未带目录参数时监控的目录
    #[envconfig(from = "RELAY_LOG_DIR", default = "/var/lib/mysql/relay")]
    pub relay_log_dir: String,

    #[envconfig(from = "RELAY_LOG_PREFIX", default = "relay-bin")]
    pub relay_log_prefix: String,

    #[envconfig(from = "WATCH_POLL_INTERVAL_MS", default = "200")]
    pub watch_poll_interval_ms: u64,

    #[envconfig(from = "REDIS_HOST", default = "127.0.0.1")]
    pub redis_host: String,

    #[envconfig(from = "REDIS_PORT", default = "6379")]
    pub redis_port: u16,

    #[envconfig(from = "REDIS_PASSWORD", default = "")]
    pub redis_password: String,

    #[envconfig(from = "REDIS_CLUSTER_USE", default = "false")]
    pub redis_cluster_use: bool,

    /// 逗号分隔的 `host:port` 列表
    #[envconfig(from = "REDIS_CLUSTER_NODES", default = "")]
    pub redis_cluster_nodes: String,

    #[envconfig(from = "REDIS_DATA_TIMEOUT_MS", default = "2000")]
    pub redis_data_timeout_ms: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// 为空时不写日志文件
    #[envconfig(from = "LOG_DIR", default = "")]
    pub log_dir: String,
}

impl Config {
    /// HTTP 服务监听地址
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn default_directory(&self) -> PathBuf {
        PathBuf::from(&self.relay_log_dir)
    }

    pub fn redis(&self) -> Result<RedisConfig, ConfigError> {
        let cluster_nodes = if self.redis_cluster_use {
            let nodes = parse_cluster_nodes(&self.redis_cluster_nodes)?;
            if nodes.is_empty() {
                return Err(ConfigError::EmptyCluster);
            }
            nodes
        } else {
            Vec::new()
        };

        Ok(RedisConfig {
            host: self.redis_host.clone(),
            port: self.redis_port,
            password: Some(self.redis_password.clone()).filter(|p| !p.is_empty()),
            cluster_nodes,
            data_timeout: Duration::from_millis(self.redis_data_timeout_ms),
        })
    }

    #[cfg(feature = "realtime")]
    pub fn watch(&self) -> WatchConfig {
        WatchConfig {
            prefix: self.relay_log_prefix.clone(),
            poll_interval: Duration::from_millis(self.watch_poll_interval_ms),
        }
    }

    pub fn logging(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            directory: Some(self.log_dir.trim())
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
        }
    }
}

/// 解析 `host:port,host:port`，忽略空项
fn parse_cluster_nodes(raw: &str) -> Result<Vec<(String, u16)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(|node| {
            let (host, port) = node
                .rsplit_once(':')
                .ok_or_else(|| ConfigError::InvalidClusterNode(node.to_string()))?;
            let port = port
                .parse()
                .map_err(|_| ConfigError::InvalidClusterNode(node.to_string()))?;
            if host.is_empty() {
                return Err(ConfigError::InvalidClusterNode(node.to_string()));
            }
            Ok((host.to_string(), port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::init_from_hashmap(&env).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.bind(), "0.0.0.0:8080");
        assert_eq!(config.default_directory(), PathBuf::from("/var/lib/mysql/relay"));

        let redis = config.redis().unwrap();
        assert_eq!(redis, RedisConfig::default());

        let logging = config.logging();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.directory, None);
    }

    #[cfg(feature = "realtime")]
    #[test]
    fn test_watch_config() {
        let config = config(&[("RELAY_LOG_PREFIX", "mysqld-relay"), ("WATCH_POLL_INTERVAL_MS", "50")]);
        let watch = config.watch();
        assert_eq!(watch.prefix, "mysqld-relay");
        assert_eq!(watch.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_cluster_nodes() {
        let config = config(&[
            ("REDIS_CLUSTER_USE", "true"),
            ("REDIS_CLUSTER_NODES", "10.0.0.1:7000, 10.0.0.2:7001,"),
            ("REDIS_PASSWORD", "secret"),
        ]);
        let redis = config.redis().unwrap();
        assert_eq!(
            redis.cluster_nodes,
            vec![("10.0.0.1".to_string(), 7000), ("10.0.0.2".to_string(), 7001)]
        );
        assert_eq!(redis.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_cluster_nodes_ignored_when_disabled() {
        let config = config(&[("REDIS_CLUSTER_NODES", "10.0.0.1:7000")]);
        assert!(config.redis().unwrap().cluster_nodes.is_empty());
    }

    #[test]
    fn test_invalid_cluster_configuration() {
        let empty = config(&[("REDIS_CLUSTER_USE", "true")]);
        assert!(matches!(empty.redis(), Err(ConfigError::EmptyCluster)));

        let bad = config(&[("REDIS_CLUSTER_USE", "true"), ("REDIS_CLUSTER_NODES", "10.0.0.1")]);
        assert!(matches!(bad.redis(), Err(ConfigError::InvalidClusterNode(_))));

        let bad_port = config(&[("REDIS_CLUSTER_USE", "true"), ("REDIS_CLUSTER_NODES", "h:port")]);
        assert!(matches!(bad_port.redis(), Err(ConfigError::InvalidClusterNode(_))));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let env: HashMap<String, String> =
            [("BIND_PORT".to_string(), "not-a-port".to_string())].into_iter().collect();
        assert!(Config::init_from_hashmap(&env).is_err());
    }
}
