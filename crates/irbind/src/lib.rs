//! Memory-safe handles over the `irbind-sys` IR library.
//!
//! Every native object is reached through a handle that checks, before any
//! native call, that the object and all of its owners are still alive. Owned
//! handles (contexts, modules, builders) free their object exactly once.
//! Everything else is a derived handle that carries the validity tokens of its
//! owners. Scoped acquisition goes through a [`Manager`].
//!
//! ```
//! let manager = irbind::create_context();
//! manager.with(|ctx| {
//!     let modules = ctx.create_module("demo");
//!     let module = modules.scope()?;
//!     let i32t = ctx.int32_type()?;
//!     let f = module.add_function("id", &ctx.function_type(&i32t, &[i32t.clone()], false)?)?;
//!     let builders = ctx.create_builder();
//!     let builder = builders.scope()?;
//!     builder.position_at_end(&f.append_basic_block("entry")?)?;
//!     builder.build_ret(&f.param(0)?)?;
//!     assert!(module.to_ir_string()?.contains("ret i32 %0"));
//!     Ok(())
//! })?;
//! # Ok::<(), irbind::BindError>(())
//! ```

pub mod block;
pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod function;
mod global;
pub mod handle;
pub mod manager;
pub mod module;
mod native;
pub mod token;
pub mod types;
pub mod value;

pub use crate::block::BasicBlock;
pub use crate::builder::{Builder, BuilderManager};
pub use crate::config::{Config, GlobalDisposePolicy};
pub use crate::context::{Context, ContextManager, MAX_INT_BITS};
pub use crate::error::{BindError, BindResult, GuardError, MemoryError, ScopeError};
pub use crate::function::{Function, Linkage};
pub use crate::global::global_context;
pub use crate::handle::{DerivedHandle, Disposal, NativePtr, NativeResource, ObjectKind, OwnedHandle};
pub use crate::manager::{Managed, Manager, Release, Scope, ScopeState};
pub use crate::module::{Module, ModuleManager};
pub use crate::token::{TokenChain, ValidityToken};
pub use crate::types::{Type, TypeKind};
pub use crate::value::{IntPredicate, Opcode, Value, ValueKind};

/// A manager that creates a fresh context on `enter()` and frees it on
/// `exit()`.
pub fn create_context() -> ContextManager {
    Manager::new(context::Context::create)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_scope_frees_on_exit() {
        let manager = create_context();
        let ctx = manager.enter().unwrap();
        let modules = ctx.create_module("m");
        let module = modules.enter().unwrap();
        manager.exit().unwrap();
        assert!(!ctx.is_valid());
        assert!(module.name().unwrap_err().is_use_after_free());
    }

    #[test]
    fn test_unentered_context_manager_creates_nothing() {
        let manager = create_context();
        let before = irbind_sys::ir_call_count();
        manager.dispose().unwrap();
        assert_eq!(irbind_sys::ir_call_count(), before);
        assert_eq!(manager.state(), ScopeState::Disposed);
    }
}
