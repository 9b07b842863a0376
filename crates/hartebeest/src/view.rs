//! The network view document produced by the socket exchanger: an ordered
//! set of node records, each an ordered set of PD records, each carrying
//! MR and QP records.
//!
//! Grounded on spec §6's `this-node-conf`/`post-conf` JSON shape. Field
//! names are intentionally short (`n`, `p`, `i`, `m`, `q`, `a`, `s`, `r`,
//! `l`), this naming is part of the external wire contract, not an
//! internal abbreviation to be expanded.

use serde::{Deserialize, Serialize};

use crate::pd::PdRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrRecord {
    pub i: String,
    pub a: u64,
    pub s: u64,
    pub r: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QpRecord {
    pub i: String,
    pub q: u32,
    pub p: u8,
    pub l: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdRecord {
    pub i: String,
    pub m: Vec<MrRecord>,
    pub q: Vec<QpRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub n: u32,
    pub p: Vec<PdRecord>,
}

/// The aggregator's broadcast document: every node's view, in the order the
/// aggregator received them.
pub type NetworkView = Vec<NodeView>;

/// Builds this node's view by walking its PD registry in insertion order.
#[must_use]
pub fn export_view(nid: u32, pds: &PdRegistry) -> NodeView {
    let p = pds
        .iter()
        .map(|(pd_name, entry)| {
            let m = entry
                .mrs
                .iter()
                .map(|(mr_name, mr)| MrRecord {
                    i: mr_name.to_owned(),
                    a: mr.addr(),
                    s: mr.length() as u64,
                    r: mr.rkey(),
                })
                .collect();
            let q = entry
                .qps
                .iter()
                .map(|(qp_name, qp)| QpRecord {
                    i: qp_name.to_owned(),
                    q: qp.qp_num(),
                    p: qp.raw_port_num(),
                    l: qp.raw_lid(),
                })
                .collect();
            PdRecord {
                i: pd_name.to_owned(),
                m,
                q,
            }
        })
        .collect();

    NodeView { n: nid, p }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_view_round_trips_through_json() {
        let view: NetworkView = vec![
            NodeView {
                n: 0,
                p: vec![PdRecord {
                    i: "pd-1".to_owned(),
                    m: vec![MrRecord { i: "mr-1".to_owned(), a: 0x1000, s: 512, r: 7 }],
                    q: vec![QpRecord { i: "qp-1".to_owned(), q: 42, p: 1, l: 3 }],
                }],
            },
            NodeView { n: 1, p: vec![] },
        ];

        let text = serde_json::to_string(&view).unwrap();
        let parsed: NetworkView = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, view);
    }
}
