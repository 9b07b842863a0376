//! Memcached-backed resource exchanger: publishes/fetches MR and QP
//! identity tuples by name, and provides a generic bounded barrier used to
//! synchronise phases across participants.
//!
//! Grounded on `original_source/src/hb_memc.cc`'s `push`/`fetch`/`wait`/`del`
//! helpers, which spin against a shared memcached instance rather than
//! talking directly to peers. The retry bound (10,000 attempts, 500ms
//! apart) is carried over verbatim from that source.

use std::thread;
use std::time::Duration;

use memcache::Client;

use crate::error::{Error, Retcode, Result};
use crate::mr::{LocalMr, RemoteMr};
use crate::qp::{LocalQp, RemoteQpEntry};

const WAIT_ATTEMPTS: u32 = 10_000;
const WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// Thin wrapper around a memcached client used as the out-of-band rendezvous
/// point for MR and QP identity tuples.
pub struct KvExchanger {
    client: Client,
}

impl KvExchanger {
    pub fn connect(url: &str) -> Result<Self> {
        let client = Client::connect(url).map_err(|e| Error::with_context(Retcode::KvSetFailed, e.to_string()))?;
        Ok(Self { client })
    }

    /// Publishes `mr`'s serialised descriptor under `key`, per §4.7's
    /// `push-local-mr(key, pd-name, mr-name)` (the PD/MR lookup itself is the
    /// caller's: `mr` is already the resolved [`LocalMr`]).
    pub fn push_local_mr(&self, key: &str, mr: &LocalMr) -> Result<()> {
        self.push_general(key, &mr.serialize())
    }

    pub fn fetch_remote_mr(&self, key: &str) -> Result<RemoteMr> {
        let text = self.spin_fetch(key)?;
        RemoteMr::parse(&text)
    }

    /// Publishes `qp`'s identity tuple under `key`, per §4.7's
    /// `push-local-qp(key, pd-name, qp-name)`.
    pub fn push_local_qp(&self, key: &str, qp: &LocalQp) -> Result<()> {
        self.push_general(key, &qp.serialize())
    }

    pub fn fetch_remote_qp(&self, key: &str) -> Result<RemoteQpEntry> {
        let text = self.spin_fetch(key)?;
        RemoteQpEntry::parse(&text)
    }

    /// Spin-waits on `GET(key)` with no attempt bound, relying on every peer
    /// publishing its descriptor before fetching (§5: this asymmetry with
    /// [`Self::wait_general`] is deliberate, MR/QP bootstrap is assumed to
    /// make forward progress, so only the barrier reports `Timeout`).
    fn spin_fetch(&self, key: &str) -> Result<String> {
        loop {
            match self.client.get::<String>(key) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => return Err(Error::with_context(Retcode::KvGetFailed, e.to_string())),
            }
            thread::sleep(WAIT_INTERVAL);
        }
    }

    /// Unconditionally stores `value` under `key`.
    pub fn push_general(&self, key: &str, value: &str) -> Result<()> {
        tracing::debug!(key, "pushing kv entry");
        self.client
            .set(key, value, 0)
            .map_err(|e| Error::with_context(Retcode::KvSetFailed, e.to_string()))
    }

    /// Spins on `get` until `key` appears or the attempt budget is exhausted.
    pub fn wait_general(&self, key: &str) -> Result<String> {
        for attempt in 0..WAIT_ATTEMPTS {
            match self.client.get::<String>(key) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => return Err(Error::with_context(Retcode::KvGetFailed, e.to_string())),
            }
            if attempt % 100 == 0 && attempt > 0 {
                tracing::debug!(key, attempt, "still waiting on kv entry");
            }
            thread::sleep(WAIT_INTERVAL);
        }
        Err(Error::with_context(Retcode::Timeout, key.to_owned()))
    }

    /// Removes `key`, tolerating its prior absence.
    pub fn del_general(&self, key: &str) -> Result<()> {
        self.client
            .delete(key)
            .map(drop)
            .map_err(|e| Error::with_context(Retcode::KvDelFailed, e.to_string()))
    }
}
