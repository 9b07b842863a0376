//! Socket metadata exchanger: one designated node (nid 0) aggregates every
//! peer's serialised view, then broadcasts the combined network view back.
//!
//! Grounded on `original_source/src/rdma-conf.hpp`'s aggregator/peer
//! exchange loop: peers retry connecting once per second, send a 4-byte
//! node-id hello followed by their JSON view, and the aggregator reads each
//! peer's stream into a per-peer buffer, attempting to parse on every read
//! ("parse failures imply more to come"). This implementation polls all
//! peer sockets from one thread with short non-blocking reads in place of
//! the source's epoll wait, per §5's note that a single-thread
//! readiness-notification loop is the scheduling contract, not a specific
//! multiplexer API.

use std::fs;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use crate::config::PreConf;
use crate::error::{Error, Retcode, Result};
use crate::view::{NetworkView, NodeView};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the socket exchange for this node and writes `post-conf` to
/// `post_conf_path`. Returns the agreed network view.
pub fn run(pre: &PreConf, my_view: NodeView, post_conf_path: &str) -> Result<NetworkView> {
    if pre.is_aggregator() {
        run_aggregator(pre, my_view, post_conf_path)
    } else {
        run_peer(pre, my_view, post_conf_path)
    }
}

struct PeerConn {
    nid: Option<u32>,
    stream: TcpStream,
    hello_buf: Vec<u8>,
    buf: Vec<u8>,
    view: Option<NodeView>,
}

fn run_aggregator(pre: &PreConf, my_view: NodeView, post_conf_path: &str) -> Result<NetworkView> {
    let expected_peers = pre.participants.iter().filter(|p| p.nid != 0).count();

    let listener = TcpListener::bind(("0.0.0.0", pre.port)).map_err(|e| Error::with_context(Retcode::ExchangeSocketError, e.to_string()))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| Error::with_context(Retcode::ExchangeSocketError, e.to_string()))?;

    let mut conns: Vec<PeerConn> = Vec::with_capacity(expected_peers);
    let mut filled_views: Vec<NodeView> = vec![my_view];

    while filled_views.len() < expected_peers + 1 {
        while let Ok((stream, _addr)) = listener.accept() {
            stream.set_nonblocking(true).ok();
            conns.push(PeerConn {
                nid: None,
                stream,
                hello_buf: Vec::with_capacity(4),
                buf: Vec::new(),
                view: None,
            });
        }

        for conn in &mut conns {
            if conn.view.is_some() {
                continue;
            }

            let mut chunk = [0_u8; 4096];
            match conn.stream.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    if conn.nid.is_none() {
                        conn.hello_buf.extend_from_slice(&chunk[..n]);
                        if conn.hello_buf.len() >= 4 {
                            let mut nid_bytes = [0_u8; 4];
                            nid_bytes.copy_from_slice(&conn.hello_buf[..4]);
                            conn.nid = Some(u32::from_le_bytes(nid_bytes));
                            conn.buf.extend_from_slice(&conn.hello_buf[4..]);
                        }
                    } else {
                        conn.buf.extend_from_slice(&chunk[..n]);
                    }

                    if let Ok(text) = std::str::from_utf8(&conn.buf) {
                        if let Ok(view) = serde_json::from_str::<NodeView>(text) {
                            conn.view = Some(view.clone());
                            filled_views.push(view);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(Error::with_context(Retcode::ExchangeSocketError, e.to_string())),
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    fs::write(post_conf_path, serde_json::to_vec(&filled_views).unwrap())
        .map_err(|e| Error::with_context(Retcode::ExchangeSocketError, e.to_string()))?;

    let payload = serde_json::to_vec(&filled_views).map_err(|e| Error::with_context(Retcode::ExchangeParseError, e.to_string()))?;
    for conn in &mut conns {
        write_all_blocking(&mut conn.stream, &payload)?;
        conn.stream.shutdown(Shutdown::Both).ok();
    }

    Ok(filled_views)
}

fn run_peer(pre: &PreConf, my_view: NodeView, post_conf_path: &str) -> Result<NetworkView> {
    let aggregator = pre.aggregator().ok_or_else(|| Error::new(Retcode::ExchangeSocketError))?;
    let addr = (aggregator.ip, pre.port);

    let mut stream = loop {
        match TcpStream::connect(addr) {
            Ok(s) => break s,
            Err(_) => thread::sleep(RETRY_INTERVAL),
        }
    };

    let nid = pre.this_node().nid;
    write_all_blocking(&mut stream, &nid.to_le_bytes())?;

    let payload = serde_json::to_vec(&my_view).map_err(|e| Error::with_context(Retcode::ExchangeParseError, e.to_string()))?;
    write_all_blocking(&mut stream, &payload)?;
    stream.shutdown(Shutdown::Write).ok();

    let mut received = Vec::new();
    stream
        .read_to_end(&mut received)
        .map_err(|e| Error::with_context(Retcode::ExchangeSocketError, e.to_string()))?;

    let view: NetworkView =
        serde_json::from_slice(&received).map_err(|e| Error::with_context(Retcode::ExchangeParseError, e.to_string()))?;

    fs::write(post_conf_path, &received).map_err(|e| Error::with_context(Retcode::ExchangeSocketError, e.to_string()))?;

    Ok(view)
}

fn write_all_blocking(stream: &mut TcpStream, mut buf: &[u8]) -> Result<()> {
    stream.set_nonblocking(false).map_err(|e| Error::with_context(Retcode::ExchangeSocketError, e.to_string()))?;
    while !buf.is_empty() {
        let n = stream.write(buf).map_err(|e| Error::with_context(Retcode::ExchangeSocketError, e.to_string()))?;
        buf = &buf[n..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::PdRecord;

    #[test]
    fn node_view_serialises_to_expected_json_shape() {
        let view = NodeView {
            n: 0,
            p: vec![PdRecord {
                i: "pd-1".to_owned(),
                m: vec![],
                q: vec![],
            }],
        };
        let text = serde_json::to_string(&view).unwrap();
        assert!(text.starts_with(r#"{"n":0,"p":"#));
    }
}
