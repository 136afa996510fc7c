use irbind::{
    create_context, BasicBlock, BindError, Context, Function, Module, ObjectKind, ScopeError, ScopeState, Value,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `define i32 @sum(i32, i32)` with one block that adds and returns.
fn build_sum(ctx: &Context, module: &Module) -> (Function, BasicBlock, Value) {
    let i32t = ctx.int32_type().unwrap();
    let fn_ty = ctx.function_type(&i32t, &[i32t.clone(), i32t.clone()], false).unwrap();
    let f = module.add_function("sum", &fn_ty).unwrap();
    let entry = f.append_basic_block("entry").unwrap();
    let builders = ctx.create_builder();
    let builder = builders.scope().unwrap();
    builder.position_at_end(&entry).unwrap();
    let add = builder
        .build_add(&f.param(0).unwrap(), &f.param(1).unwrap(), "s")
        .unwrap();
    builder.build_ret(&add).unwrap();
    (f, entry, add)
}

fn scope_error(err: BindError) -> ScopeError {
    match err {
        BindError::Scope(e) => e,
        other => panic!("expected a scope error, got {other}"),
    }
}

#[test]
fn test_context_dispose_reaches_every_derived_handle() {
    init();
    let manager = create_context();
    let ctx = manager.enter().unwrap();
    let modules = ctx.create_module("m");
    let module = modules.enter().unwrap();
    let (f, entry, add) = build_sum(&ctx, &module);
    let i64t = ctx.int64_type().unwrap();
    let seven = ctx.const_int(&i64t, 7, false).unwrap();
    let counter = module.add_global(&i64t, "counter").unwrap();

    manager.exit().unwrap();

    assert!(f.name().unwrap_err().is_use_after_free());
    assert!(entry.terminator().unwrap_err().is_use_after_free());
    assert!(add.opcode().unwrap_err().is_use_after_free());
    assert!(i64t.int_width().unwrap_err().is_use_after_free());
    assert!(seven.const_zext_value().unwrap_err().is_use_after_free());
    assert!(counter.type_of().unwrap_err().is_use_after_free());
    assert!(module.to_ir_string().unwrap_err().is_use_after_free());
}

#[test]
fn test_module_exit_keeps_context_usable() {
    init();
    let manager = create_context();
    let ctx = manager.enter().unwrap();

    let first = ctx.create_module("first");
    let module = first.enter().unwrap();
    let (f, entry, add) = build_sum(&ctx, &module);
    let i32t = ctx.int32_type().unwrap();
    let one = ctx.const_int(&i32t, 1, false).unwrap();
    first.exit().unwrap();

    assert!(entry.name().unwrap_err().is_use_after_free());
    assert!(f.param_count().unwrap_err().is_use_after_free());
    assert!(add.operand(0).unwrap_err().is_use_after_free());

    // types and constants belong to the context, not the module
    assert!(ctx.is_valid());
    assert_eq!(i32t.int_width().unwrap(), 32);
    assert_eq!(one.const_zext_value().unwrap(), 1);

    let second = ctx.create_module("second");
    let again = second.enter().unwrap();
    let (g, _, _) = build_sum(&ctx, &again);
    assert_eq!(g.param_count().unwrap(), 2);
    second.exit().unwrap();
    manager.exit().unwrap();
}

#[test]
fn test_ancestor_disposal_dominates() {
    init();
    let manager = create_context();
    let ctx = manager.enter().unwrap();
    let modules = ctx.create_module("child");
    let module = modules.enter().unwrap();
    let (f, entry, _) = build_sum(&ctx, &module);

    manager.exit().unwrap();

    // the module's own token was never touched
    assert!(module.token().is_valid());
    let err = module.name().unwrap_err();
    assert!(err.is_use_after_free());
    assert_eq!(err.to_string(), "module used after its context was disposed");
    assert!(f.entry_block().unwrap_err().is_use_after_free());
    assert!(entry.instructions().unwrap_err().is_use_after_free());

    // leaving the module scope afterwards does not free anything twice
    modules.exit().unwrap();
    assert_eq!(modules.state(), ScopeState::Disposed);
}

#[test]
fn test_double_dispose_frees_once() {
    init();
    let manager = create_context();
    let ctx = manager.enter().unwrap();
    let freed = Arc::new(AtomicUsize::new(0));
    let seen = freed.clone();
    ctx.on_native_free(move |kind| {
        if kind == ObjectKind::Module {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap();

    let modules = ctx.create_module("orig");
    let original = modules.enter().unwrap();
    let copy = original.clone_module().unwrap();

    copy.dispose().unwrap();
    assert_eq!(freed.load(Ordering::SeqCst), 1);
    let err = scope_error(copy.dispose().unwrap_err());
    assert_eq!(
        err,
        ScopeError::AlreadyDisposed {
            kind: ObjectKind::Module,
            attempted: "dispose"
        }
    );
    assert_eq!(freed.load(Ordering::SeqCst), 1);

    modules.exit().unwrap();
    assert_eq!(freed.load(Ordering::SeqCst), 2);
    manager.exit().unwrap();
    assert_eq!(freed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_dispose_has_one_winner() {
    init();
    let manager = create_context();
    let ctx = manager.enter().unwrap();
    let freed = Arc::new(AtomicUsize::new(0));
    let seen = freed.clone();
    ctx.on_native_free(move |kind| {
        if kind == ObjectKind::Module {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap();
    let modules = ctx.create_module("orig");
    let original = modules.enter().unwrap();
    let copy = Arc::new(original.clone_module().unwrap());

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let copy = copy.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                copy.dispose().is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
    modules.exit().unwrap();
    manager.exit().unwrap();
}

#[test]
fn test_accessors_race_module_exit() {
    init();
    let manager = create_context();
    let ctx = manager.enter().unwrap();
    let modules = ctx.create_module("shared");
    let module = modules.enter().unwrap();
    let barrier = Arc::new(Barrier::new(5));

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let module = module.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..200 {
                    let renamed = module.set_name(&format!("w{n}-{i}"));
                    let read = module.name();
                    match (renamed, read) {
                        (Ok(()), Ok(name)) => assert!(name.starts_with('w')),
                        (renamed, read) => {
                            for err in [renamed.err(), read.err()].into_iter().flatten() {
                                assert!(err.is_use_after_free(), "unexpected error: {err}");
                            }
                            return;
                        }
                    }
                }
            })
        })
        .collect();

    barrier.wait();
    modules.exit().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(module.name().unwrap_err().is_use_after_free());
    manager.exit().unwrap();
}

#[test]
fn test_second_enter_is_rejected() {
    init();
    let manager = create_context();
    let ctx = manager.enter().unwrap();

    let err = scope_error(manager.enter().unwrap_err());
    assert_eq!(err, ScopeError::AlreadyEntered { kind: ObjectKind::Context });
    // the first context is still fine
    assert_eq!(ctx.int8_type().unwrap().int_width().unwrap(), 8);

    manager.exit().unwrap();
    let err = scope_error(manager.enter().unwrap_err());
    assert_eq!(
        err,
        ScopeError::AlreadyDisposed {
            kind: ObjectKind::Context,
            attempted: "enter"
        }
    );
}

#[test]
fn test_exit_without_enter() {
    init();
    let manager = create_context();
    assert!(manager.exit().unwrap_err().is_invalid_operation());
    let ctx = manager.enter().unwrap();
    let err = scope_error(manager.dispose().unwrap_err());
    assert_eq!(
        err,
        ScopeError::DisposeWhileEntered {
            kind: ObjectKind::Context,
            state: ScopeState::Entered
        }
    );
    assert!(ctx.is_valid());
    manager.exit().unwrap();
    assert!(manager.exit().unwrap_err().is_invalid_operation());
}

#[test]
fn test_same_address_same_handle() {
    init();
    let manager = create_context();
    let ctx = manager.enter().unwrap();
    let modules = ctx.create_module("m");
    let module = modules.enter().unwrap();
    let (f, entry, add) = build_sum(&ctx, &module);

    let via_lookup = module.get_function("sum").unwrap().unwrap();
    let via_block = entry.parent().unwrap();
    assert_eq!(via_lookup, via_block);
    let mut functions = HashSet::new();
    functions.insert(f.clone());
    functions.insert(via_lookup);
    functions.insert(via_block);
    assert_eq!(functions.len(), 1);

    let via_terminator = entry.terminator().unwrap().unwrap().operand(0).unwrap();
    let via_first = entry.first_instruction().unwrap().unwrap();
    let values: HashSet<Value> = [add, via_terminator, via_first].into_iter().collect();
    assert_eq!(values.len(), 1);

    let i32t = ctx.int32_type().unwrap();
    assert_eq!(ctx.const_int(&i32t, 5, false).unwrap(), ctx.const_int(&i32t, 5, false).unwrap());
    manager.exit().unwrap();
}

#[test]
fn test_scope_guard_exits_on_drop() {
    init();
    let manager = create_context();
    let ctx = {
        let scope = manager.scope().unwrap();
        let ctx: Context = scope.resource().clone();
        assert!(ctx.is_valid());
        ctx
    };
    assert!(!ctx.is_valid());
    assert_eq!(manager.state(), ScopeState::Disposed);
}

#[test]
fn test_with_exits_after_error() {
    init();
    let manager = create_context();
    let err = manager
        .with(|ctx| {
            let i32t = ctx.int32_type()?;
            i32t.return_type()
        })
        .unwrap_err();
    assert!(err.is_precondition_violation());
    assert_eq!(manager.state(), ScopeState::Disposed);
}
