//! Bootstrap configuration: environment variables, the `pre-conf` topology
//! document, and loading/parsing the attribute file.
//!
//! Grounded on `original_source/src/hb_cfgldr.cc`'s `init_sysvars` (a fixed
//! table of required env vars, all-or-nothing) and `init_params` (read a
//! JSON file, default path overridable by one of those vars).

use std::env;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attr::AttrTable;
use crate::error::{Error, Retcode, Result};

const DEFAULT_ATTR_PATH: &str = "hartebeest.json";

/// The three environment variables this library requires, plus the one
/// optional override.
#[derive(Debug, Clone)]
pub struct Env {
    pub nid: u32,
    pub participants: u32,
    pub exc_ip_port: String,
    pub conf_path: Option<String>,
}

impl Env {
    pub fn from_environment() -> Result<Self> {
        let nid = required_var("HARTEBEEST_NID")?
            .parse()
            .map_err(|_| Error::with_context(Retcode::EnvVarMissing, "HARTEBEEST_NID"))?;
        let participants = required_var("HARTEBEEST_PARTICIPANTS")?
            .parse()
            .map_err(|_| Error::with_context(Retcode::EnvVarMissing, "HARTEBEEST_PARTICIPANTS"))?;
        let exc_ip_port = required_var("HARTEBEEST_EXC_IP_PORT")?;
        let conf_path = env::var("HARTEBEEST_CONF_PATH").ok();

        tracing::info!(nid, participants, exc_ip_port = %exc_ip_port, "loaded environment");

        Ok(Self {
            nid,
            participants,
            exc_ip_port,
            conf_path,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::with_context(Retcode::EnvVarMissing, name))
}

/// Loads the attribute table, seeding defaults and overlaying whatever is
/// present in the configuration file at `path` (or `hartebeest.json` if
/// `path` is `None`).
pub fn load_attr_table(path: Option<&str>) -> Result<AttrTable> {
    let path = path.unwrap_or(DEFAULT_ATTR_PATH);
    let mut table = AttrTable::new();

    if !Path::new(path).exists() {
        tracing::warn!(path, "attribute file not found, using defaults");
        return Err(Error::with_context(Retcode::CfgFileMissing, path.to_owned()));
    }

    let text = fs::read_to_string(path).map_err(|_| Error::with_context(Retcode::CfgFileMissing, path.to_owned()))?;
    let doc: Value = serde_json::from_str(&text).map_err(|e| Error::with_context(Retcode::CfgParseError, e.to_string()))?;
    table.apply_overrides(&doc)?;

    Ok(table)
}

/// One entry of the `pre-conf` participant list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub nid: u32,
    pub ip: Ipv4Addr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// `pre-conf`: shared topology identical on every participant, plus the
/// index of *this* node within `participants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreConf {
    pub port: u16,
    pub index: usize,
    pub participants: Vec<Participant>,
}

impl PreConf {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|_| Error::with_context(Retcode::CfgFileMissing, path.as_ref().display().to_string()))?;
        serde_json::from_str(&text).map_err(|e| Error::with_context(Retcode::CfgParseError, e.to_string()))
    }

    #[must_use]
    pub fn this_node(&self) -> &Participant {
        &self.participants[self.index]
    }

    #[must_use]
    pub fn aggregator(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.nid == 0)
    }

    #[must_use]
    pub fn is_aggregator(&self) -> bool {
        self.this_node().nid == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_conf_round_trips_through_json() {
        let doc = r#"{
            "port": 9000,
            "index": 1,
            "participants": [
                {"nid": 0, "ip": "10.0.0.1"},
                {"nid": 1, "ip": "10.0.0.2", "alias": "peer-b"}
            ]
        }"#;
        let conf: PreConf = serde_json::from_str(doc).unwrap();
        assert_eq!(conf.this_node().nid, 1);
        assert_eq!(conf.aggregator().unwrap().ip, Ipv4Addr::new(10, 0, 0, 1));
        assert!(!conf.is_aggregator());
    }
}
