//! Opaque-handle IR library
//!
//! This crate is a small SSA IR library with a C-style surface: every object
//! is reached through a raw pointer, ownership is implicit and non-uniform,
//! and nothing here checks whether a pointer is still alive.
//!
//! Ownership rules:
//! - A context owns its types, its integer constants, and every module and
//!   builder created in it. `ir_context_dispose` frees all of them.
//! - A module owns its functions and globals; a function owns its parameters
//!   and basic blocks; a block owns its instructions. `ir_module_dispose`
//!   frees the whole tree.
//! - A builder is independent of modules but is freed with its context.
//!
//! Using any pointer after its owner was freed is undefined behaviour.
//! Calling an accessor on the wrong kind of object trips an internal
//! assertion, which aborts the calling operation with a panic.
#![allow(clippy::missing_safety_doc)]

use std::cell::Cell;
use std::ffi::c_void;

mod builder;
mod context;
mod module;
mod print;
mod types;
mod values;

pub use builder::*;
pub use context::*;
pub use module::*;
pub use print::*;
pub use types::*;
pub use values::*;

pub type IrContextRef = *mut IrContext;
pub type IrModuleRef = *mut IrModule;
pub type IrBuilderRef = *mut IrBuilder;
pub type IrTypeRef = *mut IrType;
pub type IrValueRef = *mut IrValue;
pub type IrBlockRef = *mut IrBlock;

/// Kind of object reported to a context's free callback.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrObjectKind {
    Context = 0,
    Module = 1,
    Builder = 2,
    Function = 3,
    BasicBlock = 4,
}

/// Called once for every context, module, builder, function and block the
/// library frees, just before the memory is released.
pub type IrFreeCallback = fn(kind: IrObjectKind, user_data: *mut c_void);

thread_local! {
    static CALLS: Cell<u64> = const { Cell::new(0) };
}

/// Number of library entry points called on the current thread.
pub fn ir_call_count() -> u64 {
    CALLS.with(|c| c.get())
}

pub(crate) fn enter_call() {
    CALLS.with(|c| c.set(c.get() + 1));
}

pub(crate) unsafe fn dealloc<T>(ptr: *mut T) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

pub(crate) fn alloc<T>(value: T) -> *mut T {
    Box::into_raw(Box::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Freed {
        modules: AtomicUsize,
        functions: AtomicUsize,
        blocks: AtomicUsize,
        builders: AtomicUsize,
        contexts: AtomicUsize,
    }

    fn count_free(kind: IrObjectKind, user_data: *mut c_void) {
        let freed = unsafe { &*(user_data as *const Freed) };
        let slot = match kind {
            IrObjectKind::Module => &freed.modules,
            IrObjectKind::Function => &freed.functions,
            IrObjectKind::BasicBlock => &freed.blocks,
            IrObjectKind::Builder => &freed.builders,
            IrObjectKind::Context => &freed.contexts,
        };
        slot.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn sample_module(ctx: IrContextRef, name: &str) -> IrModuleRef {
        let m = ir_module_create(name, ctx);
        let i32t = ir_int_type(ctx, 32);
        let fn_ty = ir_function_type(i32t, &[i32t, i32t], false);
        let f = ir_add_function(m, "sum", fn_ty);
        let entry = ir_append_basic_block(f, "entry");
        let b = ir_builder_create(ctx);
        ir_position_builder_at_end(b, entry);
        let s = ir_build_binop(b, IrOpcode::Add, ir_get_param(f, 0), ir_get_param(f, 1), "s");
        ir_build_ret(b, s);
        ir_builder_dispose(b);
        m
    }

    #[test]
    fn test_types_are_uniqued() {
        unsafe {
            let ctx = ir_context_create();
            assert_eq!(ir_int_type(ctx, 32), ir_int_type(ctx, 32));
            assert_ne!(ir_int_type(ctx, 32), ir_int_type(ctx, 64));
            let i8t = ir_int_type(ctx, 8);
            assert_eq!(ir_function_type(i8t, &[i8t], false), ir_function_type(i8t, &[i8t], false));
            assert_eq!(ir_const_int(i8t, 300, false), ir_const_int(i8t, 44, false));
            ir_context_dispose(ctx);
        }
    }

    #[test]
    fn test_context_dispose_frees_children() {
        let freed = Freed::default();
        unsafe {
            let ctx = ir_context_create();
            ir_context_set_free_callback(ctx, Some(count_free), &freed as *const Freed as *mut c_void);
            sample_module(ctx, "a");
            sample_module(ctx, "b");
            ir_builder_create(ctx);
            ir_context_dispose(ctx);
        }
        assert_eq!(freed.modules.load(Ordering::SeqCst), 2);
        assert_eq!(freed.functions.load(Ordering::SeqCst), 2);
        assert_eq!(freed.blocks.load(Ordering::SeqCst), 2);
        // one disposed explicitly per sample module, one freed with the context
        assert_eq!(freed.builders.load(Ordering::SeqCst), 3);
        assert_eq!(freed.contexts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_module_dispose_leaves_context() {
        let freed = Freed::default();
        unsafe {
            let ctx = ir_context_create();
            ir_context_set_free_callback(ctx, Some(count_free), &freed as *const Freed as *mut c_void);
            let m = sample_module(ctx, "a");
            ir_module_dispose(m);
            assert_eq!(freed.modules.load(Ordering::SeqCst), 1);
            let m2 = ir_module_create("b", ctx);
            assert_eq!(ir_get_module_identifier(m2), "b");
            ir_context_dispose(ctx);
        }
        assert_eq!(freed.modules.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clone_module_is_deep() {
        unsafe {
            let ctx = ir_context_create();
            let m = sample_module(ctx, "orig");
            let copy = ir_clone_module(m);
            let f = ir_get_named_function(m, "sum");
            let g = ir_get_named_function(copy, "sum");
            assert!(!g.is_null());
            assert_ne!(f, g);
            assert_eq!(ir_print_module_to_string(m), ir_print_module_to_string(copy));
            ir_module_dispose(m);
            assert_eq!(ir_count_basic_blocks(g), 1);
            ir_context_dispose(ctx);
        }
    }

    #[test]
    fn test_print_module() {
        unsafe {
            let ctx = ir_context_create();
            let m = sample_module(ctx, "demo");
            let text = ir_print_module_to_string(m);
            assert!(text.contains("; ModuleID = 'demo'"));
            assert!(text.contains("define i32 @sum(i32 %0, i32 %1) {"));
            assert!(text.contains("  %s = add i32 %0, %1"));
            assert!(text.contains("  ret i32 %s"));
            ir_context_dispose(ctx);
        }
    }

    #[test]
    fn test_call_counter_advances() {
        let before = ir_call_count();
        let ctx = ir_context_create();
        unsafe { ir_context_dispose(ctx) };
        assert_eq!(ir_call_count(), before + 2);
    }

    #[test]
    #[should_panic(expected = "not a branch")]
    fn test_condition_of_non_branch_asserts() {
        unsafe {
            let ctx = ir_context_create();
            let m = sample_module(ctx, "a");
            let f = ir_get_named_function(m, "sum");
            let entry = ir_get_first_basic_block(f);
            let add = ir_get_first_instruction(entry);
            ir_get_condition(add);
        }
    }
}
