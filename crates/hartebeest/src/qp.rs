//! Queue Pair State Machine: creation, the RESET→INIT→RTR→RTS connection
//! protocol, and the QP identity wire tuple.
//!
//! Grounded on `original_source/src/queues.hpp`'s `QueueManager` (CQ/QP
//! creation against a fixed, per-transport init attribute) and
//! `original_source/src/hb_qps.cc` (the INIT/RTR/RTS `ibv_modify_qp` calls
//! and their attribute masks), driven here through `rdma::qp::ModifyOptions`
//! instead of hand-built `ibv_qp_attr` structs.

use std::fmt;

use rdma::ah::AddressHandleOptions;
use rdma::device::Mtu;
use rdma::mr::AccessFlags;
use rdma::pd::ProtectionDomain;
use rdma::qp::{ModifyOptions, QueryOptions, QueuePair, QueuePairState, QueuePairType};
use rdma::wr::{Opcode, SendFlags, SendRequest, Sge};

use crate::attr::{AttrTable, Transport};
use crate::cache::ResourceCache;
use crate::device::Device;
use crate::error::{Error, Retcode, Result};
use crate::mr::{LocalMr, RemoteMr};

impl Transport {
    fn to_qp_type(self) -> QueuePairType {
        match self {
            Self::Rc => QueuePairType::RC,
            Self::Uc => QueuePairType::UC,
            Self::Ud => QueuePairType::UD,
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            Self::Rc => 0,
            Self::Uc => 1,
            Self::Ud => 2,
        }
    }

    fn from_wire(v: u32) -> Result<Self> {
        match v {
            0 => Ok(Self::Rc),
            1 => Ok(Self::Uc),
            2 => Ok(Self::Ud),
            _ => Err(Error::with_context(Retcode::ExchangeParseError, format!("unknown transport code {v}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpState {
    Reset,
    Init,
    Rtr,
    Rts,
    Error,
}

impl QpState {
    fn from_provider(s: QueuePairState) -> Self {
        match s {
            QueuePairState::Reset => Self::Reset,
            QueuePairState::Initialize => Self::Init,
            QueuePairState::ReadyToReceive => Self::Rtr,
            QueuePairState::ReadyToSend => Self::Rts,
            QueuePairState::SendQueueDrained
            | QueuePairState::SendQueueError
            | QueuePairState::Error
            | QueuePairState::Unknown => Self::Error,
        }
    }
}

/// A locally created, live queue pair driven through the connection
/// protocol.
pub struct LocalQp {
    name: String,
    transport: Transport,
    qp: QueuePair,
    port_num: u8,
    lid: u16,
    state: QpState,
}

impl LocalQp {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    #[must_use]
    pub fn qp_num(&self) -> u32 {
        self.qp.number().raw_value()
    }

    #[must_use]
    pub fn state(&self) -> QpState {
        self.state
    }

    #[must_use]
    pub fn raw_port_num(&self) -> u8 {
        self.port_num
    }

    #[must_use]
    pub fn raw_lid(&self) -> u16 {
        self.lid
    }

    /// Queries the provider's view of this QP's state and compares it with
    /// the shadow state tracked here, flagging any divergence.
    pub fn check_state_drift(&self) -> Result<()> {
        let mut opts = QueryOptions::default();
        opts.qp_state();
        let attr = self
            .qp
            .query(opts)
            .map_err(|e| Error::with_context(Retcode::ProviderRefused, e.to_string()))?;
        let provider_state = attr
            .qp_state()
            .map(QpState::from_provider)
            .ok_or_else(|| Error::new(Retcode::StateDrift))?;
        if provider_state != self.state {
            return Err(Error::with_context(
                Retcode::StateDrift,
                format!("shadow={:?} provider={:?}", self.state, provider_state),
            ));
        }
        Ok(())
    }

    /// RESET → INIT. A no-op if already in INIT (verbs permits re-issuing
    /// INIT with matching attributes).
    pub fn transition_init(&mut self) -> Result<()> {
        if self.state == QpState::Init {
            return Ok(());
        }

        let mut opts = ModifyOptions::default();
        opts.qp_state(QueuePairState::Initialize)
            .port_num(self.port_num)
            .pkey_index(0)
            .qp_access_flags(AccessFlags::LOCAL_WRITE | AccessFlags::REMOTE_WRITE | AccessFlags::REMOTE_READ);

        self.qp
            .modify(opts)
            .map_err(|e| Error::with_context(Retcode::TransitionInitFailed, e.to_string()))?;
        self.state = QpState::Init;
        Ok(())
    }

    /// INIT → RTR, consulting the attribute table under this QP's transport
    /// prefix and the chosen remote QP's identity tuple.
    pub fn transition_rtr(&mut self, attrs: &AttrTable, remote: &RemoteQp) -> Result<()> {
        if remote.lid == 0 {
            return Err(Error::with_context(Retcode::TransitionRtrFailed, "remote LID is 0"));
        }

        let t = self.transport;
        let path_mtu = mtu_from_attr(attrs.get_transport_required(t, "path_mtu")?)?;
        let rq_psn = attrs.get_transport_required(t, "rq_psn")? as u32;
        let min_rnr_timer = attrs.get_transport_required(t, "min_rnr_timer")? as u8;
        let max_dest_rd_atomic = attrs.get_transport_required(t, "max_dest_rd_atomic")? as u8;
        let sl = attrs.get_transport_required(t, "ah_attr.sl")? as u8;

        let mut ah = AddressHandleOptions::default();
        ah.dest_lid(remote.lid).service_level(sl).port_num(remote.port_id);

        let mut opts = ModifyOptions::default();
        opts.qp_state(QueuePairState::ReadyToReceive)
            .path_mtu(path_mtu)
            .dest_qp_num(remote.qp_num)
            .rq_psn(rq_psn)
            .max_dest_rd_atomic(max_dest_rd_atomic)
            .min_rnr_timer(min_rnr_timer)
            .ah_attr(ah);

        if self.transport == Transport::Ud {
            opts.qkey(0);
        }

        self.qp
            .modify(opts)
            .map_err(|e| Error::with_context(Retcode::TransitionRtrFailed, e.to_string()))?;
        self.state = QpState::Rtr;
        Ok(())
    }

    /// RTR → RTS, consulting the attribute table under this QP's transport
    /// prefix.
    pub fn transition_rts(&mut self, attrs: &AttrTable) -> Result<()> {
        let t = self.transport;
        let sq_psn = attrs.get_transport_required(t, "sq_psn")? as u32;
        let timeout = attrs.get_transport_required(t, "timeout")? as u8;
        let retry_cnt = attrs.get_transport_required(t, "retry_cnt")? as u8;
        let rnr_retry = attrs.get_transport_required(t, "rnr_retry")? as u8;
        let max_rd_atomic = attrs.get_transport_required(t, "max_rd_atomic")? as u8;

        let mut opts = ModifyOptions::default();
        opts.qp_state(QueuePairState::ReadyToSend)
            .sq_psn(sq_psn)
            .timeout(timeout)
            .retry_cnt(retry_cnt)
            .rnr_retry(rnr_retry)
            .max_rd_atomic(max_rd_atomic);

        self.qp
            .modify(opts)
            .map_err(|e| Error::with_context(Retcode::TransitionRtsFailed, e.to_string()))?;
        self.state = QpState::Rts;
        Ok(())
    }

    /// Runs RTR then RTS against `remote`. If RTR succeeds but RTS fails the
    /// QP is left in RTR; the caller decides whether to destroy or retry.
    pub fn connect(&mut self, attrs: &AttrTable, remote: &RemoteQp) -> Result<()> {
        self.transition_rtr(attrs, remote)?;
        self.transition_rts(attrs)
    }

    #[must_use]
    pub fn raw(&self) -> &QueuePair {
        &self.qp
    }

    /// Posts a one-sided RDMA_WRITE of the first `len` bytes of `local` to
    /// `remote`, signalled so a matching send-CQ completion is produced.
    ///
    /// Grounded on `original_source/src/hartebeest.cc`'s
    /// `rdma_post_single_fast`: a single-SGE send work request carrying the
    /// opcode, local lkey, and remote (addr, rkey) pair, nothing more. This
    /// crate does not build a data-plane abstraction beyond this primitive.
    pub fn post_rdma_write(&self, local: &LocalMr, remote: &RemoteMr, len: usize, wr_id: u64) -> Result<()> {
        self.post_rdma(Opcode::Write, local.addr(), local.lkey(), remote, len, wr_id)
    }

    /// Posts a one-sided RDMA_READ of `len` bytes from `remote` into
    /// `local`. See [`Self::post_rdma_write`].
    pub fn post_rdma_read(&self, local: &mut LocalMr, remote: &RemoteMr, len: usize, wr_id: u64) -> Result<()> {
        let (addr, lkey) = (local.addr(), local.lkey());
        self.post_rdma(Opcode::Read, addr, lkey, remote, len, wr_id)
    }

    fn post_rdma(&self, opcode: Opcode, local_addr: u64, lkey: u32, remote: &RemoteMr, len: usize, wr_id: u64) -> Result<()> {
        let sge = Sge {
            addr: local_addr,
            length: len as u32,
            lkey,
        };

        let mut wr = SendRequest::zeroed();
        wr.id(wr_id)
            .sg_list(std::slice::from_ref(&sge))
            .opcode(opcode)
            .send_flags(SendFlags::SIGNALED)
            .rdma_remote_addr(remote.addr)
            .rdma_rkey(remote.rkey);

        // SAFETY: `sge` stays alive for the duration of the call, `lkey`
        // belongs to `local_addr`'s registered MR, and `remote` carries a
        // valid (addr, rkey) pair obtained from a peer's exchanged view.
        unsafe { self.qp.post_send(&mut wr) }.map_err(|e| Error::with_context(Retcode::BadWorkRequest, e.to_string()))
    }

    /// Serialises this QP's identity as `name:qp_num_hex:port_id_hex:LID_hex:transport_hex`.
    #[must_use]
    pub fn serialize(&self) -> String {
        format!(
            "{}:{:x}:{:x}:{:x}:{:x}",
            self.name,
            self.qp_num(),
            self.port_num,
            self.lid,
            self.transport.to_wire()
        )
    }
}

fn mtu_from_attr(v: i64) -> Result<Mtu> {
    Ok(match v {
        1 => Mtu::Mtu256,
        2 => Mtu::Mtu512,
        3 => Mtu::Mtu1024,
        4 => Mtu::Mtu2048,
        5 => Mtu::Mtu4096,
        _ => return Err(Error::with_context(Retcode::CfgParseError, format!("invalid path_mtu value {v}"))),
    })
}

/// A QP identity obtained from a peer: no verbs-live handle, just enough to
/// complete a local QP's RTR transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteQp {
    pub qp_num: u32,
    pub port_id: u8,
    pub lid: u16,
    pub transport: Transport,
}

impl fmt::Display for RemoteQp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{:x}:{:x}:{:x}", self.qp_num, self.port_id, self.lid, self.transport.to_wire())
    }
}

/// Named remote QP identity, as produced by [`RemoteQpEntry::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteQpEntry {
    pub name: String,
    pub qp: RemoteQp,
}

impl RemoteQpEntry {
    /// Parses `name:qp_num_hex:port_id_hex:LID_hex:transport_hex`.
    /// Whitespace around fields is tolerated on read.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(':').map(str::trim).collect();
        let [name, qp_num, port_id, lid, transport] = parts.as_slice() else {
            return Err(Error::with_context(Retcode::ExchangeParseError, text.to_owned()));
        };
        let parse_hex = |field: &str, radix_bits: u32| -> Result<u64> {
            let v = u64::from_str_radix(field, 16).map_err(|_| Error::with_context(Retcode::ExchangeParseError, text.to_owned()))?;
            if radix_bits < 64 && v >= (1u64 << radix_bits) {
                return Err(Error::with_context(Retcode::ExchangeParseError, text.to_owned()));
            }
            Ok(v)
        };

        let qp_num = parse_hex(qp_num, 32)? as u32;
        let port_id = parse_hex(port_id, 8)? as u8;
        let lid = parse_hex(lid, 16)? as u16;
        let transport = Transport::from_wire(parse_hex(transport, 32)? as u32)?;

        Ok(Self {
            name: (*name).to_owned(),
            qp: RemoteQp {
                qp_num,
                port_id,
                lid,
                transport,
            },
        })
    }
}

/// PD-scoped registry of local queue pairs.
#[derive(Default)]
pub struct QpRegistry {
    cache: ResourceCache<LocalQp>,
}

pub struct QpCreateOptions {
    pub transport: Transport,
    pub cap: rdma::qp::QueuePairCapacity,
    pub sq_sig_all: bool,
}

impl QpRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        device: &Device,
        pd: &ProtectionDomain,
        send_cq: &rdma::cq::CompletionQueue,
        recv_cq: &rdma::cq::CompletionQueue,
        name: impl Into<String>,
        create_opts: QpCreateOptions,
    ) -> Result<()> {
        let name = name.into();
        if self.cache.contains(&name) {
            return Err(Error::with_context(Retcode::NameExists, name));
        }

        let mut opts = QueuePair::options();
        opts.pd(pd)
            .send_cq(send_cq)
            .recv_cq(recv_cq)
            .qp_type(create_opts.transport.to_qp_type())
            .sq_sig_all(create_opts.sq_sig_all)
            .cap(create_opts.cap);

        let qp = QueuePair::create(device.ctx(), opts).map_err(|e| Error::with_context(Retcode::ProviderRefused, e.to_string()))?;

        self.cache.register(
            name.clone(),
            LocalQp {
                name,
                transport: create_opts.transport,
                qp,
                port_num: device.port_num(),
                lid: device.lid(),
                state: QpState::Reset,
            },
        )
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LocalQp> {
        self.cache.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut LocalQp> {
        self.cache.get_mut(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LocalQp)> {
        self.cache.iter()
    }

    pub fn clear(&mut self) {
        let names: Vec<String> = self.cache.iter_rev().map(|(n, _)| n.to_owned()).collect();
        for name in names {
            self.cache.deregister(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_qp_round_trips() {
        let local = RemoteQpEntry {
            name: "qp-1".to_owned(),
            qp: RemoteQp {
                qp_num: 0x12,
                port_id: 1,
                lid: 7,
                transport: Transport::Rc,
            },
        };
        let text = format!("{}:{}", local.name, local.qp);
        let parsed = RemoteQpEntry::parse(&text).unwrap();
        assert_eq!(parsed, local);
    }

    #[test]
    fn remote_qp_rejects_oversized_fields() {
        // port_id is only 8 bits wide.
        assert!(RemoteQpEntry::parse("qp-1:12:abcd:7:0").is_err());
    }
}
