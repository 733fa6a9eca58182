//! The narrow contract this core expects from the (out-of-scope) config
//! file collaborator: a typed struct plus a minimal default parser for the
//! options named in §6. A node program is free to populate `ClusterConfig`
//! by any other means — the core only depends on the struct.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Router,
    Worker,
}

impl FromStr for NodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ROUTER" => Ok(NodeType::Router),
            "WORKER" => Ok(NodeType::Worker),
            other => Err(Error::InvalidArgument(format!("unknown node.type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(Error::InvalidArgument(format!("unknown logging.level {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub cluster_routers: Vec<SocketAddr>,
    pub node_id: u16,
    pub node_type: NodeType,
    pub gossip_addr: SocketAddr,
    pub data_addr: SocketAddr,
    pub ingress_addr: Option<SocketAddr>,
    pub metrics_addr: Option<SocketAddr>,
    pub logging_level: LogLevel,
}

impl ClusterConfig {
    /// Parses the INI-like text described in §6:
    /// `key = value` lines, `#`/`;` comments, blank lines ignored,
    /// `cluster.routers` semicolon-separated.
    pub fn parse(text: &str) -> Result<Self> {
        let mut raw: HashMap<String, String> = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::InvalidArgument(format!("malformed config line {line:?}")))?;
            raw.insert(key.trim().to_string(), value.trim().to_string());
        }

        let get = |raw: &HashMap<String, String>, key: &str| -> Result<String> {
            raw.get(key)
                .cloned()
                .ok_or_else(|| Error::InvalidArgument(format!("missing required option {key:?}")))
        };
        let get_addr = |raw: &HashMap<String, String>, key: &str| -> Result<SocketAddr> {
            get(raw, key)?
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("{key} is not an ip:port")))
        };

        let cluster_name = get(&raw, "cluster.name")?;
        let cluster_routers = raw
            .get("cluster.routers")
            .map(|v| {
                v.split(';')
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.trim()
                            .parse()
                            .map_err(|_| Error::InvalidArgument(format!("bad seed address {s:?}")))
                    })
                    .collect::<Result<Vec<SocketAddr>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let node_id: u16 = get(&raw, "node.id")?
            .parse()
            .map_err(|_| Error::InvalidArgument("node.id must be a u16".into()))?;
        if node_id == 0 {
            return Err(Error::InvalidArgument("node.id must be nonzero".into()));
        }
        let node_type = get(&raw, "node.type")?.parse()?;

        let gossip_addr = get_addr(&raw, "node.gossip_addr")?;
        let data_addr = get_addr(&raw, "node.data_addr")?;
        let ingress_addr = raw.get("node.ingress_addr").map(|s| s.parse()).transpose().ok().flatten();
        let metrics_addr = raw.get("node.metrics_addr").map(|s| s.parse()).transpose().ok().flatten();

        let logging_level = raw
            .get("logging.level")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(LogLevel::Info);

        Ok(ClusterConfig {
            cluster_name,
            cluster_routers,
            node_id,
            node_type,
            gossip_addr,
            data_addr,
            ingress_addr,
            metrics_addr,
            logging_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
        # a comment
        cluster.name = demo
        cluster.routers = 127.0.0.1:10001;127.0.0.1:10002
        node.id = 1
        node.type = ROUTER
        node.gossip_addr = 127.0.0.1:10001
        node.data_addr = 127.0.0.1:20001
        logging.level = DEBUG
    ";

    #[test]
    fn parses_a_well_formed_config() {
        let cfg = ClusterConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.cluster_name, "demo");
        assert_eq!(cfg.cluster_routers.len(), 2);
        assert_eq!(cfg.node_id, 1);
        assert_eq!(cfg.node_type, NodeType::Router);
        assert_eq!(cfg.logging_level, LogLevel::Debug);
    }

    #[test]
    fn rejects_zero_node_id() {
        let text = SAMPLE.replace("node.id = 1", "node.id = 0");
        assert!(ClusterConfig::parse(&text).is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let text = SAMPLE.replace("cluster.name = demo", "");
        assert!(ClusterConfig::parse(&text).is_err());
    }
}
