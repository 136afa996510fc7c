use irbind::config::{reset_config, set_config};
use irbind::{global_context, BindError, Config, ContextManager, GlobalDisposePolicy, ScopeError, ScopeState};
use pretty_assertions::assert_eq;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Both policies run in one test: the active configuration is process-wide.
#[test]
fn test_global_dispose_policies() {
    init();
    let ctx = global_context().unwrap();
    let i32t = ctx.int32_type().unwrap();

    set_config(Config {
        global_dispose: GlobalDisposePolicy::Reject,
        ..Config::default()
    });
    let manager = ContextManager::global().unwrap();
    let err = manager.dispose().unwrap_err();
    assert!(matches!(err, BindError::Scope(ScopeError::GlobalContext)));
    // the refusal does not use up the manager
    assert_eq!(manager.state(), ScopeState::NotEntered);
    assert!(ctx.is_valid());

    set_config(Config {
        global_dispose: GlobalDisposePolicy::Ignore,
        ..Config::default()
    });
    manager.dispose().unwrap();
    assert_eq!(manager.state(), ScopeState::Disposed);
    assert!(ctx.is_valid());
    reset_config();

    // nothing created in the global context was lost
    assert_eq!(i32t.int_width().unwrap(), 32);
}

#[test]
fn test_global_modules_are_independent() {
    init();
    let ctx = global_context().unwrap();
    let modules = ctx.create_module("on_global");
    let module = modules.enter().unwrap();
    let void = ctx.void_type().unwrap();
    let f = module.add_function("f", &ctx.function_type(&void, &[], false).unwrap()).unwrap();
    modules.exit().unwrap();

    assert!(f.name().unwrap_err().is_use_after_free());
    assert!(ctx.is_valid());
    assert!(void.to_ir_string().is_ok());
}

#[test]
fn test_global_scope_leaves_context_alive() {
    init();
    let manager = ContextManager::global().unwrap();
    manager
        .with(|ctx| {
            assert!(ctx.is_global());
            ctx.int64_type().map(|_| ())
        })
        .unwrap();
    assert!(global_context().unwrap().is_valid());
}
