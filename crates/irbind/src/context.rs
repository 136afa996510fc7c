//! Contexts: the root owned handle
//!
//! A context owns every type, constant, module and builder created in it.
//! Disposing it invalidates its token, which every one of those handles
//! carries at the root of its chain.

use crate::builder::{Builder, BuilderManager};
use crate::config::{self, GlobalDisposePolicy};
use crate::error::{BindResult, GuardError, MemoryError, ScopeError};
use crate::handle::{NativeResource, ObjectKind, OwnedHandle};
use crate::manager::{Managed, Manager, Release};
use crate::module::{Module, ModuleManager};
use crate::native;
use crate::token::{TokenChain, ValidityToken};
use crate::types::{Type, TypeKind};
use crate::value::Value;
use irbind_sys as sys;
use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

pub type ContextManager = Manager<Context>;

/// Largest integer width the library accepts.
pub const MAX_INT_BITS: u32 = 1 << 23;

pub struct NativeContext;

impl NativeResource for NativeContext {
    type Raw = sys::IrContext;
    const KIND: ObjectKind = ObjectKind::Context;

    unsafe fn free(raw: *mut sys::IrContext) {
        sys::ir_context_dispose(raw);
    }
}

type FreeListener = Box<dyn Fn(ObjectKind) + Send + Sync>;

struct ListenerSlot(Mutex<Option<FreeListener>>);

fn forward_free(kind: sys::IrObjectKind, user_data: *mut c_void) {
    // SAFETY: user_data is the boxed slot of the context that installed this
    // callback, and the slot is dropped only after the native context.
    let slot = unsafe { &*(user_data as *const ListenerSlot) };
    let listener = slot.0.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(listener) = listener.as_ref() {
        listener(kind.into());
    }
}

struct ContextInner {
    // Dropped before `listener`: the native teardown reports through it.
    handle: OwnedHandle<NativeContext>,
    listener: Box<ListenerSlot>,
    global: bool,
}

/// Handle to a native context
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn create() -> BindResult<Context> {
        let _native = native::enter();
        let raw = sys::ir_context_create();
        Ok(Context::from_raw(raw, false)?)
    }

    pub(crate) fn from_raw(raw: sys::IrContextRef, global: bool) -> Result<Context, MemoryError> {
        let _native = native::enter();
        let handle = OwnedHandle::new(raw, TokenChain::empty())?;
        let listener = Box::new(ListenerSlot(Mutex::new(None)));
        let user_data = &*listener as *const ListenerSlot as *mut c_void;
        unsafe {
            sys::ir_context_set_free_callback(raw, Some(forward_free as sys::IrFreeCallback), user_data)
        };
        log::debug!("created {}context at {:p}", if global { "global " } else { "" }, raw);
        Ok(Context {
            inner: Arc::new(ContextInner {
                handle,
                listener,
                global,
            }),
        })
    }

    pub(crate) fn raw(&self) -> BindResult<sys::IrContextRef> {
        Ok(self.inner.handle.check_valid()?)
    }

    pub fn check_valid(&self) -> BindResult<()> {
        self.raw().map(|_| ())
    }

    pub fn is_valid(&self) -> bool {
        self.inner.handle.is_valid()
    }

    pub fn is_global(&self) -> bool {
        self.inner.global
    }

    pub fn token(&self) -> &ValidityToken {
        self.inner.handle.token()
    }

    /// The chain given to everything created in this context.
    pub fn chain(&self) -> TokenChain {
        self.inner.handle.chain()
    }

    /// Free the context and everything in it.
    ///
    /// For the global context this follows `Config::global_dispose` and never
    /// frees anything.
    pub fn dispose(&self) -> BindResult<()> {
        if self.inner.global {
            return match config::config().global_dispose {
                GlobalDisposePolicy::Reject => {
                    log::warn!("rejected disposal of the global context");
                    Err(ScopeError::GlobalContext.into())
                }
                GlobalDisposePolicy::Ignore => {
                    log::debug!("ignored disposal of the global context");
                    Ok(())
                }
            };
        }
        self.inner.handle.dispose()?;
        Ok(())
    }

    /// Install `listener`, called once for every native object this context
    /// frees. It runs during disposal and must not call back into this
    /// context.
    pub fn on_native_free(&self, listener: impl Fn(ObjectKind) + Send + Sync + 'static) -> BindResult<()> {
        self.check_valid()?;
        *self.inner.listener.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(listener));
        Ok(())
    }

    fn wrap_type(&self, raw: sys::IrTypeRef) -> BindResult<Type> {
        Type::wrap(raw, self.chain())
    }

    fn own_type(&self, op: &'static str, ty: &Type) -> BindResult<sys::IrTypeRef> {
        let raw = ty.raw()?;
        if !ty.chain().same_root(&self.chain()) {
            return Err(GuardError::mismatch(op, "type belongs to another context").into());
        }
        Ok(raw)
    }

    // =========================================================================
    // Types
    // =========================================================================

    pub fn void_type(&self) -> BindResult<Type> {
        let _native = native::enter();
        let ctx = self.raw()?;
        self.wrap_type(unsafe { sys::ir_void_type(ctx) })
    }

    pub fn pointer_type(&self) -> BindResult<Type> {
        let _native = native::enter();
        let ctx = self.raw()?;
        self.wrap_type(unsafe { sys::ir_pointer_type(ctx) })
    }

    pub fn int_type(&self, bits: u32) -> BindResult<Type> {
        let _native = native::enter();
        let ctx = self.raw()?;
        if bits == 0 || bits > MAX_INT_BITS {
            return Err(GuardError::InvalidWidth { bits }.into());
        }
        self.wrap_type(unsafe { sys::ir_int_type(ctx, bits) })
    }

    pub fn int1_type(&self) -> BindResult<Type> {
        self.int_type(1)
    }

    pub fn int8_type(&self) -> BindResult<Type> {
        self.int_type(8)
    }

    pub fn int16_type(&self) -> BindResult<Type> {
        self.int_type(16)
    }

    pub fn int32_type(&self) -> BindResult<Type> {
        self.int_type(32)
    }

    pub fn int64_type(&self) -> BindResult<Type> {
        self.int_type(64)
    }

    pub fn function_type(&self, ret: &Type, params: &[Type], vararg: bool) -> BindResult<Type> {
        let _native = native::enter();
        self.raw()?;
        let ret_raw = self.own_type("function_type", ret)?;
        let mut raw_params = Vec::with_capacity(params.len());
        for p in params {
            let raw = self.own_type("function_type", p)?;
            if p.kind() == TypeKind::Void {
                return Err(GuardError::WrongTypeKind {
                    op: "function_type",
                    expected: "a non-void parameter".into(),
                    actual: p.kind().to_string(),
                }
                .into());
            }
            raw_params.push(raw);
        }
        self.wrap_type(unsafe { sys::ir_function_type(ret_raw, &raw_params, vararg) })
    }

    /// A literal (unnamed) struct type.
    pub fn struct_type(&self, elements: &[Type], packed: bool) -> BindResult<Type> {
        let _native = native::enter();
        let ctx = self.raw()?;
        let raw = elements
            .iter()
            .map(|e| self.own_type("struct_type", e))
            .collect::<BindResult<Vec<_>>>()?;
        self.wrap_type(unsafe { sys::ir_struct_type(ctx, &raw, packed) })
    }

    /// An opaque named struct; give it a body with [`Type::set_struct_body`].
    pub fn named_struct_type(&self, name: &str) -> BindResult<Type> {
        let _native = native::enter();
        let ctx = self.raw()?;
        self.wrap_type(unsafe { sys::ir_struct_create_named(ctx, name) })
    }

    pub fn get_type_by_name(&self, name: &str) -> BindResult<Option<Type>> {
        let _native = native::enter();
        let ctx = self.raw()?;
        let raw = unsafe { sys::ir_get_type_by_name(ctx, name) };
        if raw.is_null() {
            return Ok(None);
        }
        self.wrap_type(raw).map(Some)
    }

    // =========================================================================
    // Constants
    // =========================================================================

    pub fn const_int(&self, ty: &Type, value: u64, sign_extend: bool) -> BindResult<Value> {
        let _native = native::enter();
        self.raw()?;
        let raw = self.own_type("const_int", ty)?;
        ty.require(TypeKind::Integer, "const_int")?;
        Value::wrap(unsafe { sys::ir_const_int(raw, value, sign_extend) }, self.chain())
    }

    // =========================================================================
    // Children
    // =========================================================================

    /// A manager that creates the module `name` in this context on `enter()`.
    pub fn create_module(&self, name: &str) -> ModuleManager {
        let ctx = self.clone();
        let name = name.to_string();
        Manager::new(move || Module::create(&ctx, &name))
    }

    pub fn create_builder(&self) -> BuilderManager {
        let ctx = self.clone();
        Manager::new(move || Builder::create(&ctx))
    }
}

impl Managed for Context {
    const KIND: ObjectKind = ObjectKind::Context;

    fn check_valid(&self) -> BindResult<()> {
        Context::check_valid(self)
    }

    fn release(&self, how: Release) -> BindResult<()> {
        if self.inner.global && how != Release::Dispose {
            log::debug!("global context scope ended; the context stays alive");
            return Ok(());
        }
        self.dispose()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.token().same_as(other.token())
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("global", &self.inner.global)
            .field("handle", &self.inner.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> Context {
        Context::create().unwrap()
    }

    #[test]
    fn test_types_are_uniqued_per_context() {
        let ctx = context();
        assert_eq!(ctx.int32_type().unwrap(), ctx.int_type(32).unwrap());
        assert_ne!(ctx.int32_type().unwrap(), ctx.int64_type().unwrap());

        let other = context();
        assert_ne!(ctx.int32_type().unwrap(), other.int32_type().unwrap());
        ctx.dispose().unwrap();
        other.dispose().unwrap();
    }

    #[test]
    fn test_int_width_guard() {
        let ctx = context();
        let before = sys::ir_call_count();
        let err = ctx.int_type(0).unwrap_err();
        assert!(err.is_precondition_violation());
        assert_eq!(sys::ir_call_count(), before);
        assert!(ctx.int_type(MAX_INT_BITS + 1).is_err());
        ctx.dispose().unwrap();
    }

    #[test]
    fn test_function_type_guards() {
        let ctx = context();
        let other = context();
        let i32t = ctx.int32_type().unwrap();
        let void = ctx.void_type().unwrap();

        let fn_ty = ctx.function_type(&void, &[i32t.clone(), i32t.clone()], false).unwrap();
        assert_eq!(fn_ty.kind(), TypeKind::Function);
        assert_eq!(fn_ty.param_count().unwrap(), 2);

        let err = ctx.function_type(&i32t, &[void.clone()], false).unwrap_err();
        assert!(err.is_precondition_violation());

        let foreign = other.int32_type().unwrap();
        let err = ctx.function_type(&i32t, &[foreign], false).unwrap_err();
        assert!(err.to_string().contains("another context"));
        ctx.dispose().unwrap();
        other.dispose().unwrap();
    }

    #[test]
    fn test_named_structs() {
        let ctx = context();
        assert!(ctx.get_type_by_name("pair").unwrap().is_none());
        let pair = ctx.named_struct_type("pair").unwrap();
        let found = ctx.get_type_by_name("pair").unwrap().unwrap();
        assert_eq!(pair, found);
        assert_eq!(pair.struct_name().unwrap().as_deref(), Some("pair"));
        ctx.dispose().unwrap();
    }

    #[test]
    fn test_const_int_requires_integer_type() {
        let ctx = context();
        let i8t = ctx.int8_type().unwrap();
        let c = ctx.const_int(&i8t, 300, false).unwrap();
        assert_eq!(c.const_zext_value().unwrap(), 44);

        let ptr = ctx.pointer_type().unwrap();
        let before = sys::ir_call_count();
        assert!(ctx.const_int(&ptr, 1, false).unwrap_err().is_precondition_violation());
        assert_eq!(sys::ir_call_count(), before);
        ctx.dispose().unwrap();
    }

    #[test]
    fn test_dispose_invalidates_derived_types() {
        let ctx = context();
        let i32t = ctx.int32_type().unwrap();
        ctx.dispose().unwrap();
        assert!(i32t.int_width().unwrap_err().is_use_after_free());
        assert!(ctx.void_type().unwrap_err().is_use_after_free());
        assert!(ctx.dispose().unwrap_err().is_invalid_operation());
    }

    #[test]
    fn test_native_free_listener() {
        let ctx = context();
        let contexts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&contexts);
        ctx.on_native_free(move |kind| {
            if kind == ObjectKind::Context {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        ctx.dispose().unwrap();
        assert_eq!(contexts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_frees_native_context() {
        let freed = Arc::new(AtomicUsize::new(0));
        {
            let ctx = context();
            let seen = Arc::clone(&freed);
            ctx.on_native_free(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert_eq!(freed.load(Ordering::SeqCst), 1);
    }
}
