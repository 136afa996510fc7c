//! The process-wide context
//!
//! The native library keeps one context alive for the whole process. It is
//! wrapped once, on first use, and every caller shares that wrapper. It is
//! never freed: see [`crate::config::GlobalDisposePolicy`] for what disposing
//! it does instead.

use crate::context::{Context, ContextManager};
use crate::error::{BindResult, MemoryError};
use crate::manager::Manager;
use irbind_sys as sys;

lazy_static::lazy_static! {
    static ref GLOBAL: Result<Context, MemoryError> =
        Context::from_raw(sys::ir_get_global_context(), true);
}

/// The shared wrapper around the library's global context.
pub fn global_context() -> BindResult<&'static Context> {
    GLOBAL.as_ref().map_err(|e| e.clone().into())
}

impl ContextManager {
    /// A manager over the global context. Leaving its scope keeps the context
    /// alive; `dispose()` follows the configured policy.
    pub fn global() -> BindResult<ContextManager> {
        Ok(Manager::adopt(global_context()?.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, Config, GlobalDisposePolicy};
    use crate::error::{BindError, ScopeError};
    use crate::manager::ScopeState;

    #[test]
    fn test_global_is_shared() {
        let a = global_context().unwrap();
        let b = global_context().unwrap();
        assert!(a.is_global());
        assert_eq!(a, b);
        assert!(a.int32_type().unwrap().is_same_context(&b.int32_type().unwrap()));
    }

    #[test]
    fn test_scope_exit_keeps_global_alive() {
        let manager = ContextManager::global().unwrap();
        {
            let ctx = manager.scope().unwrap();
            ctx.int8_type().unwrap();
        }
        assert_eq!(manager.state(), ScopeState::Disposed);
        assert!(global_context().unwrap().is_valid());
    }

    #[test]
    fn test_dispose_policy() {
        let ctx = global_context().unwrap();
        config::set_config(Config::default());
        let err = ctx.dispose().unwrap_err();
        assert!(matches!(err, BindError::Scope(ScopeError::GlobalContext)));

        config::set_config(Config {
            global_dispose: GlobalDisposePolicy::Ignore,
            ..Config::default()
        });
        ctx.dispose().unwrap();
        config::reset_config();
        assert!(ctx.is_valid());
    }
}
