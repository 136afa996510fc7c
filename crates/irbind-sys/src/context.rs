use crate::{
    alloc, dealloc, enter_call, module, IrBuilderRef, IrContextRef, IrFreeCallback, IrModuleRef,
    IrObjectKind, IrType, IrTypeKind, IrTypeRef, IrValueRef,
};
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

pub struct IrContext {
    state: Mutex<ContextState>,
    global: bool,
}

#[derive(Default)]
pub(crate) struct ContextState {
    pub(crate) types: Vec<IrTypeRef>,
    pub(crate) void_ty: Option<IrTypeRef>,
    pub(crate) ptr_ty: Option<IrTypeRef>,
    pub(crate) int_types: HashMap<u32, IrTypeRef>,
    pub(crate) fn_types: HashMap<(usize, Vec<usize>, bool), IrTypeRef>,
    pub(crate) literal_structs: HashMap<(Vec<usize>, bool), IrTypeRef>,
    pub(crate) named_structs: HashMap<String, IrTypeRef>,
    pub(crate) constants: HashMap<(usize, u64), IrValueRef>,
    pub(crate) modules: Vec<IrModuleRef>,
    pub(crate) builders: Vec<IrBuilderRef>,
    free_cb: Option<(IrFreeCallback, usize)>,
}

impl IrContext {
    pub(crate) fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static GLOBAL_CONTEXT: OnceLock<usize> = OnceLock::new();

pub fn ir_context_create() -> IrContextRef {
    enter_call();
    alloc(IrContext {
        state: Mutex::new(ContextState::default()),
        global: false,
    })
}

/// The process-wide context. It lives until the process exits and must
/// never be passed to `ir_context_dispose`.
pub fn ir_get_global_context() -> IrContextRef {
    enter_call();
    let addr = GLOBAL_CONTEXT.get_or_init(|| {
        alloc(IrContext {
            state: Mutex::new(ContextState::default()),
            global: true,
        }) as usize
    });
    *addr as IrContextRef
}

pub unsafe fn ir_context_is_global(ctx: IrContextRef) -> bool {
    enter_call();
    (*ctx).global
}

pub unsafe fn ir_context_set_free_callback(
    ctx: IrContextRef,
    callback: Option<IrFreeCallback>,
    user_data: *mut c_void,
) {
    enter_call();
    (*ctx).lock().free_cb = callback.map(|cb| (cb, user_data as usize));
}

/// Frees the context together with every builder, module, type and
/// constant created in it.
pub unsafe fn ir_context_dispose(ctx: IrContextRef) {
    enter_call();
    assert!(!(*ctx).global, "ir_context_dispose: cannot dispose the global context");

    let (builders, modules, constants, types) = {
        let mut state = (*ctx).lock();
        (
            std::mem::take(&mut state.builders),
            std::mem::take(&mut state.modules),
            std::mem::take(&mut state.constants),
            std::mem::take(&mut state.types),
        )
    };

    for b in builders {
        notify(ctx, IrObjectKind::Builder);
        dealloc(b);
    }
    for m in modules {
        module::free_module(m);
    }
    for (_, c) in constants {
        dealloc(c);
    }
    for t in types {
        dealloc(t);
    }
    notify(ctx, IrObjectKind::Context);
    dealloc(ctx);
}

pub(crate) unsafe fn notify(ctx: IrContextRef, kind: IrObjectKind) {
    let cb = (*ctx).lock().free_cb;
    if let Some((cb, user_data)) = cb {
        cb(kind, user_data as *mut c_void);
    }
}

pub(crate) unsafe fn intern_type(
    ctx: IrContextRef,
    state: &mut ContextState,
    kind: IrTypeKind,
    init: impl FnOnce(&mut IrType),
) -> IrTypeRef {
    let mut ty = IrType::blank(ctx, kind);
    init(&mut ty);
    let ptr = alloc(ty);
    state.types.push(ptr);
    ptr
}

pub unsafe fn ir_void_type(ctx: IrContextRef) -> IrTypeRef {
    enter_call();
    let mut state = (*ctx).lock();
    if let Some(t) = state.void_ty {
        return t;
    }
    let t = intern_type(ctx, &mut state, IrTypeKind::Void, |_| {});
    state.void_ty = Some(t);
    t
}

pub unsafe fn ir_pointer_type(ctx: IrContextRef) -> IrTypeRef {
    enter_call();
    let mut state = (*ctx).lock();
    if let Some(t) = state.ptr_ty {
        return t;
    }
    let t = intern_type(ctx, &mut state, IrTypeKind::Pointer, |_| {});
    state.ptr_ty = Some(t);
    t
}

pub unsafe fn ir_int_type(ctx: IrContextRef, bits: u32) -> IrTypeRef {
    enter_call();
    assert!(bits > 0 && bits <= (1 << 23), "ir_int_type: invalid bit width {}", bits);
    let mut state = (*ctx).lock();
    if let Some(t) = state.int_types.get(&bits) {
        return *t;
    }
    let t = intern_type(ctx, &mut state, IrTypeKind::Integer, |ty| ty.width = bits);
    state.int_types.insert(bits, t);
    t
}

pub unsafe fn ir_function_type(ret: IrTypeRef, params: &[IrTypeRef], vararg: bool) -> IrTypeRef {
    enter_call();
    let ctx = (*ret).context;
    for p in params {
        assert!((*(*p)).kind != IrTypeKind::Void, "ir_function_type: void parameter");
        assert!((*(*p)).context == ctx, "ir_function_type: parameter from another context");
    }
    let key = (ret as usize, params.iter().map(|p| *p as usize).collect(), vararg);
    let mut state = (*ctx).lock();
    if let Some(t) = state.fn_types.get(&key) {
        return *t;
    }
    let t = intern_type(ctx, &mut state, IrTypeKind::Function, |ty| {
        ty.ret = ret;
        ty.params = params.to_vec();
        ty.vararg = vararg;
    });
    state.fn_types.insert(key, t);
    t
}

pub unsafe fn ir_struct_type(ctx: IrContextRef, elements: &[IrTypeRef], packed: bool) -> IrTypeRef {
    enter_call();
    let key = (elements.iter().map(|e| *e as usize).collect(), packed);
    let mut state = (*ctx).lock();
    if let Some(t) = state.literal_structs.get(&key) {
        return *t;
    }
    let t = intern_type(ctx, &mut state, IrTypeKind::Struct, |ty| {
        ty.elements = elements.to_vec();
        ty.packed = packed;
    });
    state.literal_structs.insert(key, t);
    t
}

/// Creates an opaque named struct. Clashing names get a numeric suffix.
pub unsafe fn ir_struct_create_named(ctx: IrContextRef, name: &str) -> IrTypeRef {
    enter_call();
    let mut state = (*ctx).lock();
    let mut unique = name.to_string();
    let mut n = 0;
    while state.named_structs.contains_key(&unique) {
        unique = format!("{}.{}", name, n);
        n += 1;
    }
    let t = intern_type(ctx, &mut state, IrTypeKind::Struct, |ty| {
        ty.name = Some(unique.clone());
        ty.opaque = true;
    });
    state.named_structs.insert(unique, t);
    t
}

pub unsafe fn ir_get_type_by_name(ctx: IrContextRef, name: &str) -> IrTypeRef {
    enter_call();
    (*ctx)
        .lock()
        .named_structs
        .get(name)
        .copied()
        .unwrap_or(std::ptr::null_mut())
}

pub unsafe fn ir_const_int(ty: IrTypeRef, value: u64, sign_extend: bool) -> IrValueRef {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Integer, "ir_const_int: not an integer type");
    let width = (*ty).width;
    let bits = crate::values::truncate(value, width, sign_extend);
    let ctx = (*ty).context;
    let mut state = (*ctx).lock();
    if let Some(v) = state.constants.get(&(ty as usize, bits)) {
        return *v;
    }
    let v = alloc(crate::IrValue::constant_int(ty, bits));
    state.constants.insert((ty as usize, bits), v);
    v
}
