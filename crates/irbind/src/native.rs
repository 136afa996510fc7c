//! Serialized access to the native library
//!
//! The library does no locking of its own. Every validity check that is
//! followed by a native call runs inside a [`NativeSection`], and so does
//! every free, so no other thread can dispose an object between the check
//! and the call, and no two threads touch native state at once.
//!
//! Sections nest on one thread: an accessor that calls other accessors
//! takes the lock once.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

lazy_static::lazy_static! {
    static ref NATIVE: Mutex<()> = Mutex::new(());
}

struct Held {
    depth: usize,
    guard: Option<MutexGuard<'static, ()>>,
}

thread_local! {
    static HELD: RefCell<Held> = const { RefCell::new(Held { depth: 0, guard: None }) };
}

/// Proof that this thread holds the native lock. Not `Send`.
pub(crate) struct NativeSection {
    _thread_bound: PhantomData<*const ()>,
}

/// Take the native lock, or join the section this thread already holds.
pub(crate) fn enter() -> NativeSection {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        if held.depth == 0 {
            held.guard = Some(NATIVE.lock().unwrap_or_else(PoisonError::into_inner));
        }
        held.depth += 1;
    });
    NativeSection {
        _thread_bound: PhantomData,
    }
}

impl Drop for NativeSection {
    fn drop(&mut self) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            held.depth -= 1;
            if held.depth == 0 {
                held.guard = None;
            }
        });
    }
}

#[cfg(test)]
fn depth() -> usize {
    HELD.with(|held| held.borrow().depth)
}
