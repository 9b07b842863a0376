//! Two-node loopback demo built directly on the `hartebeest` library: each
//! participant creates one PD, one MR, two CQs, and one RC QP, bootstraps
//! over the socket exchanger, connects its QP to its peer's, and then
//! issues a single one-sided RDMA_WRITE or RDMA_READ.
//!
//! Grounded on `original_source/test/core-test.cc`, which wires the same
//! resources under the same names (`newcons-pd-*`, `newcons-mr-*`,
//! `newcons-qp-*`) and drives the identical push/fetch/connect/post/poll
//! sequence through the (now-retired) process-wide singleton.

use std::net::Ipv4Addr;
use std::time::Duration;
use std::{process, thread};

use anyhow::{bail, Context, Result};
use clap::Parser;

use hartebeest::attr::{AttrTable, Transport};
use hartebeest::config::{Participant, PreConf};
use hartebeest::device::Device;
use hartebeest::exchange;
use hartebeest::mr::RemoteMr;
use hartebeest::qp::{QpCreateOptions, RemoteQp};
use hartebeest::view::NetworkView;
use hartebeest::Node;
use rdma::qp::QueuePairCapacity;

const PD_NAME: &str = "pd-1";
const MR_NAME: &str = "mr-1";
const SEND_CQ: &str = "send-cq-1";
const RECV_CQ: &str = "recv-cq-1";
const QP_NAME: &str = "qp-1";
const MR_LEN: usize = 512;

#[derive(Debug, Clone, Copy)]
enum Op {
    Write,
    Read,
}

fn parse_op(s: &str) -> Result<Op> {
    match s {
        "write" => Ok(Op::Write),
        "read" => Ok(Op::Read),
        _ => bail!("unsupported op {s:?}, expected \"write\" or \"read\""),
    }
}

/// Runs one participant of the two-node demo. Launch with `--nid 0` on one
/// host and `--nid 1` on the other, pointed at each other's IP.
#[derive(Debug, clap::Parser)]
struct Args {
    /// This node's id: 0 is the aggregator, 1 is the peer.
    #[clap(long)]
    nid: u32,
    /// This node's reachable address.
    #[clap(long, default_value = "127.0.0.1")]
    ip: Ipv4Addr,
    /// The other participant's reachable address.
    #[clap(long, default_value = "127.0.0.1")]
    peer_ip: Ipv4Addr,
    /// TCP port used by the socket exchanger.
    #[clap(long, default_value = "28822")]
    port: u16,
    /// Which scenario to run (§8 scenarios 1 and 2): node 0 is the
    /// RDMA_WRITE initiator / RDMA_READ initiator, node 1 is its target.
    #[clap(long, parse(try_from_str = parse_op), default_value = "write")]
    op: Op,
    /// Device index to open.
    #[clap(long, default_value = "0")]
    device_index: usize,
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "hartebeest_node=info,hartebeest=info");
    }
    tracing_subscriber::fmt::init();

    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let pre = PreConf {
        port: args.port,
        index: args.nid as usize,
        participants: vec![
            Participant {
                nid: 0,
                ip: if args.nid == 0 { args.ip } else { args.peer_ip },
                alias: None,
            },
            Participant {
                nid: 1,
                ip: if args.nid == 1 { args.ip } else { args.peer_ip },
                alias: None,
            },
        ],
    };

    let device = Device::open(args.device_index).context("opening RDMA device")?;
    tracing::info!(nid = args.nid, port_num = device.port_num(), lid = device.lid(), "device bound");

    let mut node = Node::new(args.nid, device, AttrTable::new());
    let device = node.device().clone();

    node.pds_mut().create(&device, PD_NAME)?;
    node.pds_mut().allocate_mr(PD_NAME, MR_NAME, MR_LEN)?;

    node.cqs_mut().create(&device, SEND_CQ, 16)?;
    node.cqs_mut().create(&device, RECV_CQ, 16)?;

    let send_cq = node.cqs().get(SEND_CQ).expect("just created").clone();
    let recv_cq = node.cqs().get(RECV_CQ).expect("just created").clone();

    node.pds_mut().create_qp(
        &device,
        PD_NAME,
        &send_cq,
        &recv_cq,
        QP_NAME,
        QpCreateOptions {
            transport: Transport::Rc,
            cap: QueuePairCapacity {
                max_send_wr: 16,
                max_recv_wr: 16,
                max_send_sge: 1,
                max_recv_sge: 1,
                max_inline_data: 0,
            },
            sq_sig_all: true,
        },
    )?;

    with_qp(&mut node, |qp| qp.transition_init())?;

    let my_view = node.export_view();
    let post_conf_path = format!("post-conf-{}.json", args.nid);
    let network_view: NetworkView = exchange::run_socket_exchange(&pre, my_view, &post_conf_path)?;
    tracing::info!(nodes = network_view.len(), "bootstrap exchange complete");

    let peer_nid = 1 - args.nid;
    let peer = network_view
        .iter()
        .find(|n| n.n == peer_nid)
        .with_context(|| format!("peer node {peer_nid} missing from network view"))?;
    let peer_pd = peer.p.iter().find(|p| p.i == PD_NAME).context("peer pd-1 missing")?;
    let peer_mr = peer_pd.m.iter().find(|m| m.i == MR_NAME).context("peer mr-1 missing")?;
    let peer_qp = peer_pd.q.iter().find(|q| q.i == QP_NAME).context("peer qp-1 missing")?;

    let remote_mr = RemoteMr {
        name: MR_NAME.to_owned(),
        addr: peer_mr.a,
        length: peer_mr.s,
        lkey: 0,
        rkey: peer_mr.r,
    };
    let remote_qp = RemoteQp {
        qp_num: peer_qp.q,
        port_id: peer_qp.p,
        lid: peer_qp.l,
        transport: Transport::Rc,
    };

    let attrs = node.attrs().clone();
    with_qp(&mut node, |qp| qp.connect(&attrs, &remote_qp))?;
    tracing::info!("qp connected to peer");

    match (args.nid, args.op) {
        (0, Op::Write) => write_and_send(&mut node, b"I am hartebeest dummy.", &remote_mr)?,
        (1, Op::Write) => wait_for_payload(&mut node, b"I am hartebeest dummy.")?,
        (1, Op::Read) => stage_payload_and_idle(&mut node, b"Read me if you can")?,
        (0, Op::Read) => read_from_peer(&mut node, &remote_mr)?,
        _ => bail!("only nid 0 and 1 are supported by this demo"),
    }

    Ok(())
}

/// Looks up `pd-1`/`qp-1` and runs `f` against the live QP. Exists only to
/// avoid repeating the two-level registry lookup at every call site.
fn with_qp<T>(node: &mut Node, f: impl FnOnce(&mut hartebeest::qp::LocalQp) -> hartebeest::error::Result<T>) -> Result<T> {
    let pd = node.pds_mut().get_mut(PD_NAME).expect("pd-1 created earlier in run()");
    let qp = pd.qps.get_mut(QP_NAME).expect("qp-1 created earlier in run()");
    Ok(f(qp)?)
}

fn write_and_send(node: &mut Node, payload: &[u8], remote: &RemoteMr) -> Result<()> {
    {
        let pd = node.pds_mut().get_mut(PD_NAME).expect("pd-1 created earlier in run()");
        pd.mrs.get_mut(MR_NAME).expect("mr-1 created earlier in run()").as_mut_slice()[..payload.len()]
            .copy_from_slice(payload);

        let mr = pd.mrs.get(MR_NAME).expect("mr-1 created earlier in run()");
        let qp = pd.qps.get(QP_NAME).expect("qp-1 created earlier in run()");
        qp.post_rdma_write(mr, remote, payload.len(), 1)?;
    }
    node.cqs().poll_one(SEND_CQ)?;
    tracing::info!("RDMA_WRITE completed");
    Ok(())
}

fn read_from_peer(node: &mut Node, remote: &RemoteMr) -> Result<()> {
    let len = 100.min(remote.length as usize).min(MR_LEN);
    {
        let pd = node.pds_mut().get_mut(PD_NAME).expect("pd-1 created earlier in run()");
        let mr = pd.mrs.get_mut(MR_NAME).expect("mr-1 created earlier in run()");
        let qp = pd.qps.get(QP_NAME).expect("qp-1 created earlier in run()");
        qp.post_rdma_read(mr, remote, len, 1)?;
    }
    node.cqs().poll_one(SEND_CQ)?;

    let pd = node.pds_mut().get_mut(PD_NAME).expect("pd-1 created earlier in run()");
    let mr = pd.mrs.get(MR_NAME).expect("mr-1 created earlier in run()");
    tracing::info!(text = %String::from_utf8_lossy(&mr.as_slice()[..len]), "RDMA_READ completed");
    Ok(())
}

fn wait_for_payload(node: &mut Node, expected: &[u8]) -> Result<()> {
    loop {
        let pd = node.pds_mut().get_mut(PD_NAME).expect("pd-1 created earlier in run()");
        let mr = pd.mrs.get(MR_NAME).expect("mr-1 created earlier in run()");
        if &mr.as_slice()[..expected.len()] == expected {
            tracing::info!("observed peer's RDMA_WRITE");
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn stage_payload_and_idle(node: &mut Node, payload: &[u8]) -> Result<()> {
    let pd = node.pds_mut().get_mut(PD_NAME).expect("pd-1 created earlier in run()");
    pd.mrs.get_mut(MR_NAME).expect("mr-1 created earlier in run()").as_mut_slice()[..payload.len()]
        .copy_from_slice(payload);
    tracing::info!("payload staged for peer's RDMA_READ; idling so the buffer stays registered");
    thread::sleep(Duration::from_secs(3600));
    Ok(())
}
