//! Scoped resource managers
//!
//! A [`Manager`] mediates the creation and disposal of one owned resource:
//!
//! ```text
//! NotEntered --enter()--> Entered --exit()--> Disposed
//! NotEntered --dispose()--------------------> Disposed
//! ```
//!
//! Any other transition fails with a [`ScopeError`]. Transitions are taken
//! under a mutex, so of several threads racing to leave the same manager
//! exactly one succeeds and the resource is released once.

use crate::error::{BindResult, MemoryError, ScopeError};
use crate::handle::ObjectKind;
use std::fmt;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where a manager is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ScopeState {
    NotEntered,
    Entered,
    Disposed,
}

impl ScopeState {
    pub fn is_entered(&self) -> bool {
        matches!(self, Self::Entered)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}

/// Why a managed resource is being let go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// End of an entered scope
    Exit,
    /// Explicit `dispose()` without a scope
    Dispose,
    /// The manager itself was dropped while still holding the resource
    Drop,
}

/// A resource a [`Manager`] can hand out and take back
pub trait Managed: Clone {
    const KIND: ObjectKind;

    fn check_valid(&self) -> BindResult<()>;

    /// Free the native side of the resource.
    fn release(&self, how: Release) -> BindResult<()>;
}

type Acquirer<R> = Box<dyn Fn() -> BindResult<R> + Send + Sync>;

struct Slot<R> {
    state: ScopeState,
    resource: Option<R>,
}

/// Three-state guard around one owned resource
pub struct Manager<R: Managed> {
    slot: Mutex<Slot<R>>,
    acquire: Option<Acquirer<R>>,
}

impl<R: Managed> Manager<R> {
    /// A manager that creates its resource on `enter()`.
    pub fn new(acquire: impl Fn() -> BindResult<R> + Send + Sync + 'static) -> Self {
        Manager {
            slot: Mutex::new(Slot {
                state: ScopeState::NotEntered,
                resource: None,
            }),
            acquire: Some(Box::new(acquire)),
        }
    }

    /// A manager for a resource that already exists. `enter()` hands it out;
    /// `dispose()` without entering releases it.
    pub fn adopt(resource: R) -> Self {
        Manager {
            slot: Mutex::new(Slot {
                state: ScopeState::NotEntered,
                resource: Some(resource),
            }),
            acquire: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<R>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ScopeState {
        self.lock().state
    }

    /// Create (or hand out) the resource. If creation fails the manager
    /// stays `NotEntered`.
    pub fn enter(&self) -> BindResult<R> {
        let mut slot = self.lock();
        match slot.state {
            ScopeState::Entered => Err(ScopeError::AlreadyEntered { kind: R::KIND }.into()),
            ScopeState::Disposed => Err(ScopeError::AlreadyDisposed {
                kind: R::KIND,
                attempted: "enter",
            }
            .into()),
            ScopeState::NotEntered => {
                let resource = match (&slot.resource, &self.acquire) {
                    (Some(existing), _) => {
                        existing.check_valid()?;
                        existing.clone()
                    }
                    (None, Some(acquire)) => acquire()?,
                    (None, None) => return Err(MemoryError::Disposed { kind: R::KIND }.into()),
                };
                slot.resource = Some(resource.clone());
                slot.state = ScopeState::Entered;
                log::debug!("{} manager entered", R::KIND);
                Ok(resource)
            }
        }
    }

    /// Leave the scope and release the resource.
    pub fn exit(&self) -> BindResult<()> {
        let mut slot = self.lock();
        match slot.state {
            ScopeState::NotEntered => Err(ScopeError::NotEntered { kind: R::KIND }.into()),
            ScopeState::Disposed => Err(ScopeError::AlreadyDisposed {
                kind: R::KIND,
                attempted: "exit",
            }
            .into()),
            ScopeState::Entered => {
                slot.state = ScopeState::Disposed;
                log::debug!("{} manager exited", R::KIND);
                match slot.resource.take() {
                    Some(resource) => resource.release(Release::Exit),
                    None => Ok(()),
                }
            }
        }
    }

    /// Dispose without ever entering. Releases an adopted resource, if any.
    ///
    /// If the resource refuses to be released the error is returned and the
    /// manager stays `NotEntered`, still holding it.
    pub fn dispose(&self) -> BindResult<()> {
        let mut slot = self.lock();
        match slot.state {
            ScopeState::Entered => Err(ScopeError::DisposeWhileEntered {
                kind: R::KIND,
                state: slot.state,
            }
            .into()),
            ScopeState::Disposed => Err(ScopeError::AlreadyDisposed {
                kind: R::KIND,
                attempted: "dispose",
            }
            .into()),
            ScopeState::NotEntered => {
                // a refused release leaves the manager as it was
                if let Some(resource) = slot.resource.as_ref() {
                    resource.release(Release::Dispose)?;
                }
                slot.resource = None;
                slot.state = ScopeState::Disposed;
                log::debug!("{} manager disposed", R::KIND);
                Ok(())
            }
        }
    }

    /// Enter and get a guard that exits when dropped.
    ///
    /// # Example
    /// ```
    /// let ctx_manager = irbind::create_context();
    /// {
    ///     let ctx = ctx_manager.scope().unwrap();
    ///     let i32t = ctx.int32_type().unwrap();
    ///     assert_eq!(i32t.int_width().unwrap(), 32);
    /// }
    /// assert!(ctx_manager.state().is_disposed());
    /// ```
    pub fn scope(&self) -> BindResult<Scope<'_, R>> {
        let resource = self.enter()?;
        Ok(Scope {
            manager: self,
            resource,
        })
    }

    /// Run `f` inside an entered scope. The scope is exited whether or not
    /// `f` fails; the error from `f` wins over an error from exiting.
    pub fn with<T>(&self, f: impl FnOnce(&R) -> BindResult<T>) -> BindResult<T> {
        let resource = self.enter()?;
        let result = f(&resource);
        let exited = self.exit();
        let value = result?;
        exited?;
        Ok(value)
    }
}

impl<R: Managed> Drop for Manager<R> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if slot.state.is_disposed() {
            return;
        }
        slot.state = ScopeState::Disposed;
        if let Some(resource) = slot.resource.take() {
            log::debug!("{} manager dropped while holding its resource", R::KIND);
            if let Err(err) = resource.release(Release::Drop) {
                log::warn!("releasing {} on drop failed: {}", R::KIND, err);
            }
        }
    }
}

impl<R: Managed> fmt::Debug for Manager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("kind", &R::KIND)
            .field("state", &self.state())
            .finish()
    }
}

/// An entered scope. Exits its manager on drop.
pub struct Scope<'a, R: Managed> {
    manager: &'a Manager<R>,
    resource: R,
}

impl<R: Managed> Scope<'_, R> {
    pub fn resource(&self) -> &R {
        &self.resource
    }
}

impl<R: Managed> Deref for Scope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R: Managed> Drop for Scope<'_, R> {
    fn drop(&mut self) {
        if let Err(err) = self.manager.exit() {
            log::warn!("leaving {} scope failed: {}", R::KIND, err);
        }
    }
}
