//! Owned and derived handles
//!
//! An [`OwnedHandle`] is the only thing that ever frees a native object. It
//! owns a [`ValidityToken`] and reads the tokens of its ancestors. A
//! [`DerivedHandle`] never frees anything: it pairs a native pointer with the
//! [`TokenChain`] of the owners that free it, and re-checks that chain before
//! every use.

use crate::config;
use crate::error::{BindResult, MemoryError, ScopeError};
use crate::native;
use crate::token::{TokenChain, ValidityToken};
use irbind_sys::IrObjectKind;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Every kind of object a handle can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    Context,
    Module,
    Builder,
    Function,
    BasicBlock,
    Value,
    Type,
}

impl From<IrObjectKind> for ObjectKind {
    fn from(kind: IrObjectKind) -> Self {
        match kind {
            IrObjectKind::Context => ObjectKind::Context,
            IrObjectKind::Module => ObjectKind::Module,
            IrObjectKind::Builder => ObjectKind::Builder,
            IrObjectKind::Function => ObjectKind::Function,
            IrObjectKind::BasicBlock => ObjectKind::BasicBlock,
        }
    }
}

/// A raw native pointer that may cross threads.
///
/// The pointer is never dereferenced through this type; every use goes
/// through a validity check first.
pub struct NativePtr<T>(*mut T);

// SAFETY: the pointer is only an address here. Dereferencing happens in the
// native library, behind a token check, inside a native section, so no
// other thread can free the object or touch the library at the same time.
unsafe impl<T> Send for NativePtr<T> {}
unsafe impl<T> Sync for NativePtr<T> {}

impl<T> NativePtr<T> {
    pub fn new(raw: *mut T) -> Self {
        NativePtr(raw)
    }

    #[inline]
    pub fn get(&self) -> *mut T {
        self.0
    }

    pub fn addr(&self) -> usize {
        self.0 as usize
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl<T> Clone for NativePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NativePtr<T> {}

impl<T> fmt::Debug for NativePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0)
    }
}

/// A native object type that is freed explicitly
pub trait NativeResource {
    type Raw;
    const KIND: ObjectKind;

    /// Free `raw`.
    ///
    /// # Safety
    /// Called at most once per object, and only while every ancestor of the
    /// object is still alive.
    unsafe fn free(raw: *mut Self::Raw);
}

/// Outcome of a successful [`OwnedHandle::dispose`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// The native object was freed by this call.
    Freed,
    /// An ancestor had already freed the native object; nothing was freed.
    Orphaned,
}

/// Independently disposable wrapper around one native pointer
pub struct OwnedHandle<R: NativeResource> {
    ptr: AtomicPtr<R::Raw>,
    token: ValidityToken,
    ancestors: TokenChain,
    _resource: PhantomData<fn() -> R>,
}

impl<R: NativeResource> OwnedHandle<R> {
    /// Take ownership of `raw`, which lives inside the owners of `ancestors`.
    pub fn new(raw: *mut R::Raw, ancestors: TokenChain) -> Result<Self, MemoryError> {
        if raw.is_null() {
            return Err(MemoryError::NullHandle { kind: R::KIND });
        }
        Ok(OwnedHandle {
            ptr: AtomicPtr::new(raw),
            token: ValidityToken::new(R::KIND),
            ancestors,
            _resource: PhantomData,
        })
    }

    /// The native pointer, if this handle and all its ancestors are alive.
    ///
    /// Ancestors are checked first, so a handle whose owner was torn down
    /// reports that owner.
    #[inline]
    pub fn check_valid(&self) -> Result<*mut R::Raw, MemoryError> {
        self.ancestors.check(R::KIND)?;
        let raw = self.ptr.load(Ordering::Acquire);
        if raw.is_null() || !self.token.is_valid() {
            return Err(MemoryError::Disposed { kind: R::KIND });
        }
        Ok(raw)
    }

    pub fn is_valid(&self) -> bool {
        self.check_valid().is_ok()
    }

    pub fn token(&self) -> &ValidityToken {
        &self.token
    }

    pub fn ancestors(&self) -> &TokenChain {
        &self.ancestors
    }

    /// The chain handed to everything created inside this object.
    pub fn chain(&self) -> TokenChain {
        self.ancestors.with(&self.token)
    }

    /// Free the native object and invalidate this handle's token.
    ///
    /// Ancestor tokens are never touched. A second call fails with
    /// `ScopeError::AlreadyDisposed` and frees nothing.
    pub fn dispose(&self) -> BindResult<Disposal> {
        let _native = native::enter();
        let raw = self.ptr.swap(null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            return Err(ScopeError::AlreadyDisposed {
                kind: R::KIND,
                attempted: "dispose",
            }
            .into());
        }
        self.token.invalidate();

        if let Err(err) = self.ancestors.check(R::KIND) {
            if config::config().warn_on_orphan {
                log::warn!("{}: native {} was already freed with it", err, R::KIND);
            }
            return Ok(Disposal::Orphaned);
        }

        log::trace!("freeing native {} at {:p}", R::KIND, raw);
        // SAFETY: the swap above hands the pointer to exactly one caller, and
        // every ancestor was alive at the check.
        unsafe { R::free(raw) };
        Ok(Disposal::Freed)
    }
}

impl<R: NativeResource> Drop for OwnedHandle<R> {
    fn drop(&mut self) {
        if !self.ptr.load(Ordering::Acquire).is_null() {
            log::debug!("{} dropped without dispose, disposing", R::KIND);
            let _ = self.dispose();
        }
    }
}

impl<R: NativeResource> fmt::Debug for OwnedHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("kind", &R::KIND)
            .field("ptr", &self.ptr.load(Ordering::Relaxed))
            .field("valid", &self.token.is_valid())
            .field("ancestors", &self.ancestors.len())
            .finish()
    }
}

/// Non-disposable wrapper whose validity is entirely borrowed from its chain
///
/// Two derived handles are equal when they point at the same native address
/// through the same token chain, however they were obtained.
pub struct DerivedHandle<T> {
    ptr: NativePtr<T>,
    chain: TokenChain,
}

impl<T> DerivedHandle<T> {
    /// Chain `raw` to the owners in `chain`.
    pub fn new(raw: *mut T, chain: TokenChain, kind: ObjectKind) -> Result<Self, MemoryError> {
        if raw.is_null() {
            return Err(MemoryError::NullHandle { kind });
        }
        Ok(DerivedHandle {
            ptr: NativePtr::new(raw),
            chain,
        })
    }

    #[inline]
    pub fn check_valid(&self, kind: ObjectKind) -> Result<*mut T, MemoryError> {
        self.chain.check(kind)?;
        Ok(self.ptr.get())
    }

    pub fn chain(&self) -> &TokenChain {
        &self.chain
    }

    pub fn addr(&self) -> usize {
        self.ptr.addr()
    }
}

impl<T> Clone for DerivedHandle<T> {
    fn clone(&self) -> Self {
        DerivedHandle {
            ptr: self.ptr,
            chain: self.chain.clone(),
        }
    }
}

impl<T> PartialEq for DerivedHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr.addr() == other.ptr.addr() && self.chain == other.chain
    }
}

impl<T> Eq for DerivedHandle<T> {}

impl<T> Hash for DerivedHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.addr().hash(state);
        self.chain.hash(state);
    }
}

impl<T> fmt::Debug for DerivedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (chain of {})", self.ptr, self.chain.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static FREED: AtomicUsize = AtomicUsize::new(0);

    struct Blob;

    impl NativeResource for Blob {
        type Raw = u64;
        const KIND: ObjectKind = ObjectKind::Module;

        unsafe fn free(raw: *mut u64) {
            FREED.fetch_add(1, Ordering::SeqCst);
            drop(Box::from_raw(raw));
        }
    }

    fn blob(ancestors: TokenChain) -> OwnedHandle<Blob> {
        OwnedHandle::new(Box::into_raw(Box::new(7u64)), ancestors).unwrap()
    }

    #[test]
    fn test_null_is_rejected() {
        let err = OwnedHandle::<Blob>::new(null_mut(), TokenChain::empty()).unwrap_err();
        assert_eq!(err, MemoryError::NullHandle { kind: ObjectKind::Module });
    }

    #[test]
    fn test_dispose_then_check() {
        let handle = blob(TokenChain::empty());
        assert!(handle.check_valid().is_ok());
        let before = FREED.load(Ordering::SeqCst);
        assert_eq!(handle.dispose().unwrap(), Disposal::Freed);
        assert!(FREED.load(Ordering::SeqCst) > before);
        assert_eq!(
            handle.check_valid(),
            Err(MemoryError::Disposed { kind: ObjectKind::Module })
        );
        assert!(!handle.token().is_valid());

        let again = handle.dispose().unwrap_err();
        assert!(again.is_invalid_operation());
    }

    #[test]
    fn test_ancestor_death_dominates() {
        let parent = ValidityToken::new(ObjectKind::Context);
        let handle = blob(TokenChain::new([parent.clone()]));
        let raw = handle.check_valid().unwrap();
        parent.invalidate();
        assert_eq!(
            handle.check_valid(),
            Err(MemoryError::AncestorDisposed {
                kind: ObjectKind::Module,
                ancestor: ObjectKind::Context,
            })
        );
        // Own token is untouched until the handle itself is disposed.
        assert!(handle.token().is_valid());
        assert_eq!(handle.dispose().unwrap(), Disposal::Orphaned);
        assert!(!handle.token().is_valid());
        // the parent "freed" it; release the test allocation ourselves
        unsafe { drop(Box::from_raw(raw)) };
    }

    #[test]
    fn test_dispose_leaves_ancestors_alone() {
        let parent = ValidityToken::new(ObjectKind::Context);
        let handle = blob(TokenChain::new([parent.clone()]));
        handle.dispose().unwrap();
        assert!(parent.is_valid());
    }

    #[test]
    fn test_chain_includes_own_token() {
        let parent = ValidityToken::new(ObjectKind::Context);
        let handle = blob(TokenChain::new([parent.clone()]));
        let chain = handle.chain();
        assert_eq!(chain.len(), 2);
        assert!(chain.tokens()[0].same_as(&parent));
        assert!(chain.tokens()[1].same_as(handle.token()));
    }

    #[test]
    fn test_derived_equality_is_address_and_chain() {
        let token = ValidityToken::new(ObjectKind::Context);
        let mut slot = 0u8;
        let raw = &mut slot as *mut u8;
        let a = DerivedHandle::new(raw, TokenChain::new([token.clone()]), ObjectKind::Value).unwrap();
        let b = DerivedHandle::new(raw, TokenChain::new([token.clone()]), ObjectKind::Value).unwrap();
        let c = DerivedHandle::new(raw, TokenChain::empty(), ObjectKind::Value).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        token.invalidate();
        assert!(a.check_valid(ObjectKind::Value).is_err());
        assert!(c.check_valid(ObjectKind::Value).is_ok());
    }
}
