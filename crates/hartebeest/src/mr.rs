//! Memory Region Registry: aligned-buffer allocation, verbs registration,
//! and the remote-MR wire tuple.
//!
//! Grounded on `original_source/src/mem-region.hpp`'s `MrManager`
//! (allocate-then-register, destroy in reverse order) and the tuple shape
//! implied by §6's `MrRecord {i, a, s, r}` used in the network view.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

use rdma::mr::{AccessFlags, MemoryRegion};
use rdma::pd::ProtectionDomain;

use crate::cache::ResourceCache;
use crate::error::{Error, Retcode, Result};

const ALIGNMENT: usize = 64;

/// The access rights every caller in this system registers buffers with.
pub fn default_access_flags() -> AccessFlags {
    AccessFlags::LOCAL_WRITE | AccessFlags::REMOTE_WRITE | AccessFlags::REMOTE_READ
}

/// A heap buffer aligned to [`ALIGNMENT`] bytes, zeroed on allocation.
struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

/// SAFETY: exclusively owned heap allocation
unsafe impl Send for AlignedBuffer {}
/// SAFETY: exclusively owned heap allocation
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    fn zeroed(len: usize) -> Result<Self> {
        let layout = Layout::from_size_align(len.max(1), ALIGNMENT).map_err(|_| Error::new(Retcode::Oom))?;
        // SAFETY: layout has non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| Error::new(Retcode::Oom))?;
        Ok(Self { ptr, len, layout })
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` bytes for the buffer's lifetime
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `ptr` is valid for `len` bytes for the buffer's lifetime
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`layout` came from a matching `alloc_zeroed` call
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// A locally owned, registered memory region.
///
/// Field order matters: Rust drops struct fields in declaration order, so
/// `mr` must precede `buf` here, otherwise the backing buffer would be freed
/// before `ibv_dereg_mr` runs on it.
pub struct LocalMr {
    name: String,
    mr: MemoryRegion,
    buf: AlignedBuffer,
}

impl LocalMr {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }

    #[must_use]
    pub fn addr(&self) -> u64 {
        self.mr.addr_u64()
    }

    #[must_use]
    pub fn length(&self) -> usize {
        self.mr.length()
    }

    #[must_use]
    pub fn lkey(&self) -> u32 {
        self.mr.lkey()
    }

    #[must_use]
    pub fn rkey(&self) -> u32 {
        self.mr.rkey()
    }

    /// Serialises this MR's addressing tuple as `name:addr_hex:length_hex:lkey_hex:rkey_hex`.
    #[must_use]
    pub fn serialize(&self) -> String {
        format!(
            "{}:{:x}:{:x}:{:x}:{:x}",
            self.name,
            self.addr(),
            self.length(),
            self.lkey(),
            self.rkey()
        )
    }
}

/// An MR identity obtained from a peer: no backing buffer, no owning PD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMr {
    pub name: String,
    pub addr: u64,
    pub length: u64,
    pub lkey: u32,
    pub rkey: u32,
}

impl fmt::Display for RemoteMr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:x}:{:x}:{:x}:{:x}", self.name, self.addr, self.length, self.lkey, self.rkey)
    }
}

impl RemoteMr {
    /// Parses the five `:`-separated fields produced by [`LocalMr::serialize`].
    /// Whitespace around fields is tolerated on read.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(':').map(str::trim).collect();
        let [name, addr, length, lkey, rkey] = parts.as_slice() else {
            return Err(Error::with_context(Retcode::ExchangeParseError, text.to_owned()));
        };
        let parse_hex = |field: &str| -> Result<u64> {
            u64::from_str_radix(field, 16).map_err(|_| Error::with_context(Retcode::ExchangeParseError, text.to_owned()))
        };
        Ok(Self {
            name: (*name).to_owned(),
            addr: parse_hex(addr)?,
            length: parse_hex(length)?,
            lkey: u32::try_from(parse_hex(lkey)?).map_err(|_| Error::with_context(Retcode::ExchangeParseError, text.to_owned()))?,
            rkey: u32::try_from(parse_hex(rkey)?).map_err(|_| Error::with_context(Retcode::ExchangeParseError, text.to_owned()))?,
        })
    }
}

/// PD-scoped registry of local memory regions.
#[derive(Default)]
pub struct MrRegistry {
    cache: ResourceCache<LocalMr>,
}

impl MrRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a 64-byte-aligned, zeroed buffer of `length` bytes and
    /// registers it against `pd` with [`default_access_flags`].
    pub fn allocate_and_register(&mut self, pd: &ProtectionDomain, name: impl Into<String>, length: usize) -> Result<()> {
        let name = name.into();
        if self.cache.contains(&name) {
            return Err(Error::with_context(Retcode::NameExists, name));
        }

        let mut buf = AlignedBuffer::zeroed(length)?;
        let addr = buf.as_mut_ptr();

        // SAFETY: `buf` outlives the MR (moved into `LocalMr` together) and is zeroed before use.
        let mr = unsafe { MemoryRegion::register(pd, addr, length, default_access_flags(), ()) }
            .map_err(|e| Error::with_context(Retcode::ProviderRefused, e.to_string()))?;

        self.cache.register(name.clone(), LocalMr { name, buf, mr })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LocalMr> {
        self.cache.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut LocalMr> {
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

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LocalMr)> {
        self.cache.iter()
    }

    /// Destroys every registered MR in reverse-registration order, then
    /// frees its buffer (dropping `LocalMr` does both: `mr` is declared
    /// before `buf`, so the verbs deregistration runs before the buffer is
    /// freed).
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
    fn remote_mr_round_trips() {
        let original = RemoteMr {
            name: "mr-1".to_owned(),
            addr: 0x7f00_1234,
            length: 512,
            lkey: 0xdead,
            rkey: 0xbeef,
        };
        let text = original.to_string();
        let parsed = RemoteMr::parse(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn remote_mr_tolerates_whitespace() {
        let parsed = RemoteMr::parse(" mr-1 : a : 200 : 1 : 2 ").unwrap();
        assert_eq!(parsed.name, "mr-1");
        assert_eq!(parsed.addr, 0xa);
        assert_eq!(parsed.length, 0x200);
    }

    #[test]
    fn remote_mr_rejects_malformed_text() {
        assert!(RemoteMr::parse("mr-1:only:three:fields").is_err());
        assert!(RemoteMr::parse("mr-1:zz:1:1:1").is_err());
    }
}
