//! Completion Queue Registry: process-global CQs bound to the device
//! context, with a busy-spin `poll_one`.
//!
//! Grounded on `original_source/src/queues.hpp`'s `QueueManager` CQ half
//! (`cqinfo_map`/`cq_list`, fixed `cq_depth`) and `hb_cqs.cc`'s poll loop.

use std::mem::MaybeUninit;

use rdma::cq::CompletionQueue;

use crate::cache::ResourceCache;
use crate::device::Device;
use crate::error::{Error, Retcode, Result};

#[derive(Default)]
pub struct CqRegistry {
    cache: ResourceCache<CompletionQueue>,
}

impl CqRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, device: &Device, name: impl Into<String>, depth: usize) -> Result<()> {
        let name = name.into();
        if self.cache.contains(&name) {
            return Err(Error::with_context(Retcode::NameExists, name));
        }

        let mut opts = CompletionQueue::options();
        opts.cqe(depth);

        let cq = CompletionQueue::create(device.ctx(), opts)
            .map_err(|e| Error::with_context(Retcode::ProviderRefused, e.to_string()))?;

        self.cache.register(name, cq)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CompletionQueue> {
        self.cache.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CompletionQueue)> {
        self.cache.iter()
    }

    pub fn clear(&mut self) {
        let names: Vec<String> = self.cache.iter_rev().map(|(n, _)| n.to_owned()).collect();
        for name in names {
            self.cache.deregister(&name);
        }
    }

    /// Spins until exactly one work completion is dequeued from `cq-name`,
    /// returning success only if its status is `SUCCESS`.
    pub fn poll_one(&self, name: &str) -> Result<()> {
        let cq = self.get(name).ok_or_else(|| Error::with_context(Retcode::NameMissing, name.to_owned()))?;

        let mut slot = [MaybeUninit::uninit()];
        loop {
            let completions = cq.poll(&mut slot).map_err(|e| Error::with_context(Retcode::ProviderRefused, e.to_string()))?;
            if let Some(wc) = completions.first() {
                return wc.status().map_err(|e| Error::with_context(Retcode::CompletionFailure, e.to_string()));
            }
        }
    }
}
