//! Validity tokens and token chains
//!
//! A [`ValidityToken`] is the liveness flag of one owned native object. It is
//! shared by reference with every handle built inside that object, so a
//! single `invalidate` is observed by all of them without any notification.
//! A [`TokenChain`] is the ordered set of tokens (root owner first) a handle
//! must find valid before it may touch its native pointer.

use crate::error::MemoryError;
use crate::handle::ObjectKind;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct TokenState {
    valid: AtomicBool,
    owner: ObjectKind,
}

/// Shared liveness flag of one owned native object
///
/// Transitions valid to invalid exactly once and never back. Clones share the
/// same flag; equality is identity of that flag.
///
/// # Example
/// ```
/// # use irbind::{ObjectKind, ValidityToken};
/// let token = ValidityToken::new(ObjectKind::Module);
/// let seen_by_child = token.clone();
/// assert!(token.invalidate());
/// assert!(!seen_by_child.is_valid());
/// assert!(!token.invalidate()); // idempotent
/// ```
#[derive(Debug, Clone)]
pub struct ValidityToken(Arc<TokenState>);

impl ValidityToken {
    pub fn new(owner: ObjectKind) -> Self {
        ValidityToken(Arc::new(TokenState {
            valid: AtomicBool::new(true),
            owner,
        }))
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    /// Marks the token dead. Returns `true` only for the call that actually
    /// flipped it.
    pub fn invalidate(&self) -> bool {
        self.0.valid.swap(false, Ordering::AcqRel)
    }

    /// Kind of the object whose lifetime this token tracks.
    pub fn owner(&self) -> ObjectKind {
        self.0.owner
    }

    pub fn same_as(&self, other: &ValidityToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for ValidityToken {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for ValidityToken {}

impl Hash for ValidityToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

/// Ordered, cheaply clonable list of tokens, root owner first
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenChain(Arc<[ValidityToken]>);

impl TokenChain {
    pub fn new(tokens: impl IntoIterator<Item = ValidityToken>) -> Self {
        TokenChain(tokens.into_iter().collect())
    }

    pub fn empty() -> Self {
        TokenChain(Arc::from(Vec::new()))
    }

    /// A new chain with `token` appended after the existing ones.
    pub fn with(&self, token: &ValidityToken) -> TokenChain {
        TokenChain(self.0.iter().chain(std::iter::once(token)).cloned().collect())
    }

    /// The chain narrowed to its root token only.
    pub fn root(&self) -> TokenChain {
        TokenChain(self.0.iter().take(1).cloned().collect())
    }

    pub fn tokens(&self) -> &[ValidityToken] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(ValidityToken::is_valid)
    }

    /// Fails on the first dead token, root first, naming its owner.
    pub fn check(&self, kind: ObjectKind) -> Result<(), MemoryError> {
        match self.0.iter().find(|t| !t.is_valid()) {
            Some(dead) => Err(MemoryError::AncestorDisposed {
                kind,
                ancestor: dead.owner(),
            }),
            None => Ok(()),
        }
    }

    /// True when both chains are rooted at the same token.
    pub fn same_root(&self, other: &TokenChain) -> bool {
        match (self.0.first(), other.0.first()) {
            (Some(a), Some(b)) => a.same_as(b),
            (None, None) => true,
            _ => false,
        }
    }
}
