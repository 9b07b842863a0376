//! Protection Domain Registry: holds PDs and scopes an MR registry and a QP
//! registry to each one.
//!
//! Grounded on `original_source/src/prot-domain.hpp`'s `Pd` (owns its MRs
//! and QPs, destroys them before itself) with the cyclic PD<->QP
//! back-reference dropped per §9's re-architecture note: a `LocalQp` here
//! carries only the `(port_num, lid)` it needs, captured at creation.

use rdma::cq::CompletionQueue;
use rdma::pd::ProtectionDomain;

use crate::cache::ResourceCache;
use crate::device::Device;
use crate::error::{Error, Retcode, Result};
use crate::mr::MrRegistry;
use crate::qp::{QpCreateOptions, QpRegistry};

pub struct PdEntry {
    pd: ProtectionDomain,
    pub mrs: MrRegistry,
    pub qps: QpRegistry,
}

impl PdEntry {
    #[must_use]
    pub fn raw(&self) -> &ProtectionDomain {
        &self.pd
    }
}

impl Drop for PdEntry {
    fn drop(&mut self) {
        self.qps.clear();
        self.mrs.clear();
    }
}

#[derive(Default)]
pub struct PdRegistry {
    cache: ResourceCache<PdEntry>,
}

impl PdRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, device: &Device, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.cache.contains(&name) {
            return Err(Error::with_context(Retcode::NameExists, name));
        }

        let pd = ProtectionDomain::alloc(device.ctx()).map_err(|e| Error::with_context(Retcode::ProviderRefused, e.to_string()))?;

        self.cache.register(
            name,
            PdEntry {
                pd,
                mrs: MrRegistry::new(),
                qps: QpRegistry::new(),
            },
        )
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PdEntry> {
        self.cache.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PdEntry> {
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

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PdEntry)> {
        self.cache.iter()
    }

    /// Destroys a PD and, via `PdEntry`'s `Drop`, every MR and QP it owns,
    /// in reverse-registration order, before the PD itself.
    pub fn destroy(&mut self, name: &str) -> Result<()> {
        self.cache.deregister(name).map(drop).ok_or_else(|| Error::with_context(Retcode::NameMissing, name.to_owned()))
    }

    /// Allocates and registers an MR scoped to `pd_name`, per §4.2's
    /// `allocate-and-register(pd-name, mr-name, length, rights)`. Fails with
    /// [`Retcode::PdMissing`] if `pd_name` is unknown.
    pub fn allocate_mr(&mut self, pd_name: &str, mr_name: impl Into<String>, length: usize) -> Result<()> {
        let entry = self
            .cache
            .get_mut(pd_name)
            .ok_or_else(|| Error::with_context(Retcode::PdMissing, pd_name.to_owned()))?;
        let pd = entry.pd.clone();
        entry.mrs.allocate_and_register(&pd, mr_name, length)
    }

    /// Creates a QP scoped to `pd_name`, per §4.5. Fails with
    /// [`Retcode::PdMissing`] if `pd_name` is unknown.
    #[allow(clippy::too_many_arguments)]
    pub fn create_qp(
        &mut self,
        device: &Device,
        pd_name: &str,
        send_cq: &CompletionQueue,
        recv_cq: &CompletionQueue,
        qp_name: impl Into<String>,
        create_opts: QpCreateOptions,
    ) -> Result<()> {
        let entry = self
            .cache
            .get_mut(pd_name)
            .ok_or_else(|| Error::with_context(Retcode::PdMissing, pd_name.to_owned()))?;
        let pd = entry.pd.clone();
        entry.qps.create(device, &pd, send_cq, recv_cq, qp_name, create_opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_mr_on_unknown_pd_is_pd_missing() {
        let mut pds = PdRegistry::new();
        let err = pds.allocate_mr("no-such-pd", "mr-1", 512).unwrap_err();
        assert_eq!(err.code, Retcode::PdMissing);
    }
}
