//! Transport-prefixed configuration attribute table consulted by the QP
//! state machine.
//!
//! Grounded on `original_source/src/hb_cfgldr.cc`'s `pdef_cq_attr` /
//! `pdef_qp_init_attr` / `pdef_qp_attr` seed arrays: this implementation
//! keeps the same flat `"transport:key"` namespacing and the same numeric
//! defaults, but resolves the seed's duplicate `max_dest_rd_atomic` entry
//! (see DESIGN.md) by seeding it once.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Retcode, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Rc,
    Uc,
    Ud,
}

impl Transport {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Rc => "rc",
            Self::Uc => "uc",
            Self::Ud => "ud",
        }
    }
}

/// A flat `name -> i64` map, seeded with defaults and optionally overridden
/// by a JSON configuration document.
#[derive(Clone)]
pub struct AttrTable {
    values: HashMap<String, i64>,
}

const IBV_MTU_4096: i64 = 5;

impl Default for AttrTable {
    fn default() -> Self {
        let mut values = HashMap::new();
        values.insert("cq_depth".to_owned(), 128);

        for t in [Transport::Rc, Transport::Uc, Transport::Ud] {
            let p = t.prefix();
            values.insert(format!("{p}:cap.max_send_wr"), 128);
            values.insert(format!("{p}:cap.max_recv_wr"), 128);
            values.insert(format!("{p}:cap.max_send_sge"), 16);
            values.insert(format!("{p}:cap.max_recv_sge"), 16);
            values.insert(format!("{p}:cap.max_inline_data"), 256);

            values.insert(format!("{p}:path_mtu"), IBV_MTU_4096);
            values.insert(format!("{p}:rq_psn"), 3185);
            values.insert(format!("{p}:sq_psn"), 3185);
            values.insert(format!("{p}:ah_attr.is_global"), 0);
            values.insert(format!("{p}:ah_attr.sl"), 0);
            values.insert(format!("{p}:ah_attr.src_path_bits"), 0);
            values.insert(format!("{p}:max_dest_rd_atomic"), 16);
            values.insert(format!("{p}:min_rnr_timer"), 12);
            values.insert(format!("{p}:timeout"), 14);
            values.insert(format!("{p}:retry_cnt"), 7);
            values.insert(format!("{p}:rnr_retry"), 7);
            values.insert(format!("{p}:max_rd_atomic"), 1);
        }

        Self { values }
    }
}

impl AttrTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays keys from a parsed configuration document onto the
    /// defaults. The document groups keys the same way the seed arrays are
    /// grouped (`cq_attr`, `qp_init_attr`, `qp_attr`), each a JSON object of
    /// `"rc:key"` -> integer.
    pub fn apply_overrides(&mut self, doc: &Value) -> Result<()> {
        for group in ["cq_attr", "qp_init_attr", "qp_attr"] {
            let Some(sub) = doc.get(group) else { continue };
            let Some(map) = sub.as_object() else {
                return Err(Error::with_context(Retcode::CfgParseError, group));
            };
            for (key, value) in map {
                let n = value
                    .as_i64()
                    .ok_or_else(|| Error::with_context(Retcode::CfgParseError, key.clone()))?;
                self.values.insert(key.clone(), n);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<i64> {
        self.values.get(key).copied()
    }

    pub fn get_required(&self, key: &str) -> Result<i64> {
        self.get(key)
            .ok_or_else(|| Error::with_context(Retcode::CfgParseError, key.to_owned()))
    }

    #[must_use]
    pub fn get_transport(&self, transport: Transport, key: &str) -> Option<i64> {
        self.get(&format!("{}:{key}", transport.prefix()))
    }

    pub fn get_transport_required(&self, transport: Transport, key: &str) -> Result<i64> {
        self.get_transport(transport, key)
            .ok_or_else(|| Error::with_context(Retcode::CfgParseError, format!("{}:{key}", transport.prefix())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let table = AttrTable::new();
        assert_eq!(table.get("cq_depth"), Some(128));
        assert_eq!(table.get_transport(Transport::Rc, "rq_psn"), Some(3185));
        assert_eq!(table.get_transport(Transport::Rc, "max_dest_rd_atomic"), Some(16));
        assert_eq!(table.get_transport(Transport::Rc, "timeout"), Some(14));
    }

    #[test]
    fn override_is_transport_scoped() {
        let mut table = AttrTable::new();
        let doc: Value = serde_json::from_str(r#"{"qp_attr": {"uc:rq_psn": 42}}"#).unwrap();
        table.apply_overrides(&doc).unwrap();
        assert_eq!(table.get_transport(Transport::Uc, "rq_psn"), Some(42));
        assert_eq!(table.get_transport(Transport::Rc, "rq_psn"), Some(3185));
    }
}
