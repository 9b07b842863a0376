use std::sync::Arc;

/// A verbs object that is reference-counted through an `Arc<Self::Owner>`.
///
/// # Safety
/// implementors must be newtype wrappers around `Arc<Self::Owner>` with no
/// other state, so that cloning the wrapper is equivalent to cloning the
/// underlying `Arc`.
pub unsafe trait Resource: Send + Sync + Sized {
    type Owner;

    fn as_owner(&self) -> &Arc<Self::Owner>;

    /// Clones the underlying owner reference, keeping the resource alive
    /// without exposing the wrapper type of the owning module.
    #[inline]
    fn strong_ref(&self) -> Arc<Self::Owner> {
        Arc::clone(self.as_owner())
    }
}
