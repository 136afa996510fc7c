//! Modules: owned handles that live inside a context
//!
//! A module has its own token and reads its context's token. Functions,
//! globals, blocks and instructions created in it carry both, so either
//! disposal reaches them.

use crate::context::Context;
use crate::error::{BindResult, GuardError};
use crate::function::Function;
use crate::handle::{NativeResource, ObjectKind, OwnedHandle};
use crate::manager::{Managed, Manager, Release};
use crate::native;
use crate::token::{TokenChain, ValidityToken};
use crate::types::{Type, TypeKind};
use crate::value::Value;
use irbind_sys as sys;
use std::fmt;
use std::sync::Arc;

pub type ModuleManager = Manager<Module>;

pub struct NativeModule;

impl NativeResource for NativeModule {
    type Raw = sys::IrModule;
    const KIND: ObjectKind = ObjectKind::Module;

    unsafe fn free(raw: *mut sys::IrModule) {
        sys::ir_module_dispose(raw);
    }
}

struct ModuleInner {
    handle: OwnedHandle<NativeModule>,
    context: Context,
}

/// Handle to a native module
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

impl Module {
    pub(crate) fn create(ctx: &Context, name: &str) -> BindResult<Module> {
        let _native = native::enter();
        let raw_ctx = ctx.raw()?;
        let raw = unsafe { sys::ir_module_create(name, raw_ctx) };
        log::debug!("created module '{}' at {:p}", name, raw);
        Module::from_raw(raw, ctx)
    }

    fn from_raw(raw: sys::IrModuleRef, ctx: &Context) -> BindResult<Module> {
        Ok(Module {
            inner: Arc::new(ModuleInner {
                handle: OwnedHandle::new(raw, ctx.chain())?,
                context: ctx.clone(),
            }),
        })
    }

    pub(crate) fn raw(&self) -> BindResult<sys::IrModuleRef> {
        Ok(self.inner.handle.check_valid()?)
    }

    pub fn check_valid(&self) -> BindResult<()> {
        self.raw().map(|_| ())
    }

    pub fn is_valid(&self) -> bool {
        self.inner.handle.is_valid()
    }

    pub fn token(&self) -> &ValidityToken {
        self.inner.handle.token()
    }

    /// Context token followed by this module's token.
    pub fn chain(&self) -> TokenChain {
        self.inner.handle.chain()
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Free the module and everything in it. The context is untouched.
    pub fn dispose(&self) -> BindResult<()> {
        self.inner.handle.dispose()?;
        Ok(())
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn name(&self) -> BindResult<String> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_get_module_identifier(raw) })
    }

    pub fn set_name(&self, name: &str) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        unsafe { sys::ir_set_module_identifier(raw, name) };
        Ok(())
    }

    pub fn source_filename(&self) -> BindResult<String> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_get_source_file_name(raw) })
    }

    pub fn set_source_filename(&self, name: &str) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        unsafe { sys::ir_set_source_file_name(raw, name) };
        Ok(())
    }

    pub fn data_layout(&self) -> BindResult<String> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_get_data_layout(raw) })
    }

    pub fn set_data_layout(&self, layout: &str) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        unsafe { sys::ir_set_data_layout(raw, layout) };
        Ok(())
    }

    pub fn target_triple(&self) -> BindResult<String> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_get_target(raw) })
    }

    pub fn set_target_triple(&self, triple: &str) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        unsafe { sys::ir_set_target(raw, triple) };
        Ok(())
    }

    // =========================================================================
    // Functions and globals
    // =========================================================================

    fn own_type(&self, op: &'static str, ty: &Type) -> BindResult<sys::IrTypeRef> {
        let raw = ty.raw()?;
        if !ty.chain().same_root(&self.chain()) {
            return Err(GuardError::mismatch(op, "type belongs to another context").into());
        }
        Ok(raw)
    }

    pub fn add_function(&self, name: &str, fn_type: &Type) -> BindResult<Function> {
        let _native = native::enter();
        let raw = self.raw()?;
        let ty = self.own_type("add_function", fn_type)?;
        fn_type.require(TypeKind::Function, "add_function")?;
        Function::wrap(unsafe { sys::ir_add_function(raw, name, ty) }, self.chain())
    }

    pub fn get_function(&self, name: &str) -> BindResult<Option<Function>> {
        let _native = native::enter();
        let raw = self.raw()?;
        Function::wrap_opt(unsafe { sys::ir_get_named_function(raw, name) }, &self.chain())
    }

    pub fn functions(&self) -> BindResult<Vec<Function>> {
        let _native = native::enter();
        let raw = self.raw()?;
        let chain = self.chain();
        let mut out = Vec::new();
        let mut next = unsafe { sys::ir_get_first_function(raw) };
        while !next.is_null() {
            out.push(Function::wrap(next, chain.clone())?);
            next = unsafe { sys::ir_get_next_function(next) };
        }
        Ok(out)
    }

    pub fn function_count(&self) -> BindResult<usize> {
        Ok(self.functions()?.len())
    }

    pub fn add_global(&self, ty: &Type, name: &str) -> BindResult<Value> {
        let _native = native::enter();
        let raw = self.raw()?;
        let ty_raw = self.own_type("add_global", ty)?;
        if matches!(ty.kind(), TypeKind::Void | TypeKind::Function) {
            return Err(GuardError::WrongTypeKind {
                op: "add_global",
                expected: "a sized".into(),
                actual: ty.kind().to_string(),
            }
            .into());
        }
        Value::wrap(unsafe { sys::ir_add_global(raw, ty_raw, name) }, self.chain())
    }

    pub fn get_global(&self, name: &str) -> BindResult<Option<Value>> {
        let _native = native::enter();
        let raw = self.raw()?;
        Value::wrap_opt(unsafe { sys::ir_get_named_global(raw, name) }, &self.chain())
    }

    // =========================================================================
    // Whole-module operations
    // =========================================================================

    /// Deep copy into the same context. The copy exists as soon as this
    /// returns; the manager hands it out on `enter()` and frees it on
    /// `exit()`, or on `dispose()` if it is never entered.
    pub fn clone_module(&self) -> BindResult<ModuleManager> {
        let _native = native::enter();
        let raw = self.raw()?;
        let copy = unsafe { sys::ir_clone_module(raw) };
        log::debug!("cloned module {:p} into {:p}", raw, copy);
        Ok(Manager::adopt(Module::from_raw(copy, &self.inner.context)?))
    }

    pub fn to_ir_string(&self) -> BindResult<String> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_print_module_to_string(raw) })
    }
}

impl Managed for Module {
    const KIND: ObjectKind = ObjectKind::Module;

    fn check_valid(&self) -> BindResult<()> {
        Module::check_valid(self)
    }

    fn release(&self, _how: Release) -> BindResult<()> {
        self.dispose()
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.token().same_as(other.token())
    }
}

impl Eq for Module {}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("handle", &self.inner.handle).finish()
    }
}
