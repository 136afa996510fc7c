use crate::values::{free_function, new_function};
use crate::{
    alloc, context, dealloc, enter_call, IrBlockRef, IrContextRef, IrModuleRef, IrObjectKind,
    IrTypeKind, IrTypeRef, IrValue, IrValueKind, IrValueRef,
};
use std::collections::HashMap;
use std::ptr::null_mut;

pub struct IrModule {
    pub(crate) name: String,
    pub(crate) source_filename: String,
    pub(crate) data_layout: String,
    pub(crate) triple: String,
    pub(crate) context: IrContextRef,
    pub(crate) functions: Vec<IrValueRef>,
    pub(crate) globals: Vec<IrValueRef>,
}

pub unsafe fn ir_module_create(name: &str, ctx: IrContextRef) -> IrModuleRef {
    enter_call();
    let m = alloc(IrModule {
        name: name.to_string(),
        source_filename: name.to_string(),
        data_layout: String::new(),
        triple: String::new(),
        context: ctx,
        functions: Vec::new(),
        globals: Vec::new(),
    });
    (*ctx).lock().modules.push(m);
    m
}

/// Frees the module and everything it owns.
pub unsafe fn ir_module_dispose(m: IrModuleRef) {
    enter_call();
    let ctx = (*m).context;
    (*ctx).lock().modules.retain(|x| *x != m);
    free_module(m);
}

pub(crate) unsafe fn free_module(m: IrModuleRef) {
    for f in std::mem::take(&mut (*m).functions) {
        free_function(f);
    }
    for g in std::mem::take(&mut (*m).globals) {
        dealloc(g);
    }
    context::notify((*m).context, IrObjectKind::Module);
    dealloc(m);
}

pub unsafe fn ir_module_context(m: IrModuleRef) -> IrContextRef {
    enter_call();
    (*m).context
}

pub unsafe fn ir_get_module_identifier(m: IrModuleRef) -> String {
    enter_call();
    (*m).name.clone()
}

pub unsafe fn ir_set_module_identifier(m: IrModuleRef, name: &str) {
    enter_call();
    (*m).name = name.to_string();
}

pub unsafe fn ir_get_source_file_name(m: IrModuleRef) -> String {
    enter_call();
    (*m).source_filename.clone()
}

pub unsafe fn ir_set_source_file_name(m: IrModuleRef, name: &str) {
    enter_call();
    (*m).source_filename = name.to_string();
}

pub unsafe fn ir_get_data_layout(m: IrModuleRef) -> String {
    enter_call();
    (*m).data_layout.clone()
}

pub unsafe fn ir_set_data_layout(m: IrModuleRef, layout: &str) {
    enter_call();
    (*m).data_layout = layout.to_string();
}

pub unsafe fn ir_get_target(m: IrModuleRef) -> String {
    enter_call();
    (*m).triple.clone()
}

pub unsafe fn ir_set_target(m: IrModuleRef, triple: &str) {
    enter_call();
    (*m).triple = triple.to_string();
}

pub unsafe fn ir_add_function(m: IrModuleRef, name: &str, fn_ty: IrTypeRef) -> IrValueRef {
    enter_call();
    assert!((*fn_ty).kind == IrTypeKind::Function, "ir_add_function: not a function type");
    assert!((*fn_ty).context == (*m).context, "ir_add_function: type from another context");
    let f = new_function(m, name, fn_ty);
    (*m).functions.push(f);
    f
}

pub unsafe fn ir_get_named_function(m: IrModuleRef, name: &str) -> IrValueRef {
    enter_call();
    (*m)
        .functions
        .iter()
        .copied()
        .find(|f| (*(*f)).name == name)
        .unwrap_or(null_mut())
}

pub unsafe fn ir_get_first_function(m: IrModuleRef) -> IrValueRef {
    enter_call();
    (*m).functions.first().copied().unwrap_or(null_mut())
}

pub unsafe fn ir_get_next_function(f: IrValueRef) -> IrValueRef {
    enter_call();
    assert!((*f).kind == IrValueKind::Function, "ir_get_next_function: not a function");
    let functions = &(*(*f).module).functions;
    match functions.iter().position(|x| *x == f) {
        Some(pos) if pos + 1 < functions.len() => functions[pos + 1],
        _ => null_mut(),
    }
}

pub unsafe fn ir_add_global(m: IrModuleRef, ty: IrTypeRef, name: &str) -> IrValueRef {
    enter_call();
    assert!((*ty).kind != IrTypeKind::Void, "ir_add_global: void global");
    assert!((*ty).kind != IrTypeKind::Function, "ir_add_global: function-typed global");
    let ptr_ty = crate::ir_pointer_type((*m).context);
    let mut g = IrValue::blank(IrValueKind::GlobalVariable, ptr_ty);
    g.name = name.to_string();
    g.module = m;
    g.value_ty = ty;
    let g = alloc(g);
    (*m).globals.push(g);
    g
}

pub unsafe fn ir_global_value_type(g: IrValueRef) -> IrTypeRef {
    enter_call();
    assert!((*g).kind == IrValueKind::GlobalVariable, "ir_global_value_type: not a global variable");
    (*g).value_ty
}

pub unsafe fn ir_get_named_global(m: IrModuleRef, name: &str) -> IrValueRef {
    enter_call();
    (*m)
        .globals
        .iter()
        .copied()
        .find(|g| (*(*g)).name == name)
        .unwrap_or(null_mut())
}

/// Deep-copies a module into the same context. The copy is owned by the
/// context exactly like a module from `ir_module_create`.
pub unsafe fn ir_clone_module(m: IrModuleRef) -> IrModuleRef {
    enter_call();
    let src = &*m;
    let ctx = src.context;
    let copy = alloc(IrModule {
        name: src.name.clone(),
        source_filename: src.source_filename.clone(),
        data_layout: src.data_layout.clone(),
        triple: src.triple.clone(),
        context: ctx,
        functions: Vec::new(),
        globals: Vec::new(),
    });

    let mut values: HashMap<usize, IrValueRef> = HashMap::new();
    let mut blocks: HashMap<usize, IrBlockRef> = HashMap::new();

    for g in &src.globals {
        let mut ng = IrValue::blank(IrValueKind::GlobalVariable, (*(*g)).ty);
        ng.name = (*(*g)).name.clone();
        ng.value_ty = (*(*g)).value_ty;
        ng.module = copy;
        let ng = alloc(ng);
        (*copy).globals.push(ng);
        values.insert(*g as usize, ng);
    }

    // Declarations first so calls between functions resolve.
    for f in &src.functions {
        let Some(body) = (*(*f)).body.as_ref() else {
            continue;
        };
        let nf = new_function(copy, &(*(*f)).name, body.fn_ty);
        if let Some(nb) = (*nf).body.as_mut() {
            nb.linkage = body.linkage;
            nb.call_conv = body.call_conv;
            for (old, new) in body.params.iter().zip(nb.params.iter()) {
                (*(*new)).name = (*(*old)).name.clone();
                values.insert(*old as usize, *new);
            }
        }
        (*copy).functions.push(nf);
        values.insert(*f as usize, nf);
    }

    for f in &src.functions {
        let Some(body) = (*(*f)).body.as_ref() else {
            continue;
        };
        let nf = values[&(*f as usize)];
        for bb in &body.blocks {
            let nbb = crate::ir_append_basic_block(nf, &(*(*bb)).name);
            blocks.insert(*bb as usize, nbb);
            values.insert((*(*bb)).value as usize, (*nbb).value);
        }
        for bb in &body.blocks {
            let nbb = blocks[&(*bb as usize)];
            for inst in &(*(*bb)).instructions {
                let mut ni = IrValue::instruction(
                    (*(*inst)).opcode.unwrap_or(crate::IrOpcode::Ret),
                    (*(*inst)).ty,
                    &(*(*inst)).name,
                );
                ni.predicate = (*(*inst)).predicate;
                ni.block = nbb;
                let ni = alloc(ni);
                values.insert(*inst as usize, ni);
                (*nbb).instructions.push(ni);
            }
        }
        // Operands may refer forward, so remap once every instruction exists.
        for bb in &body.blocks {
            for inst in &(*(*bb)).instructions {
                let ni = values[&(*inst as usize)];
                (*ni).operands = (*(*inst))
                    .operands
                    .iter()
                    .map(|op| values.get(&(*op as usize)).copied().unwrap_or(*op))
                    .collect();
                (*ni).targets = (*(*inst))
                    .targets
                    .iter()
                    .map(|t| blocks.get(&(*t as usize)).copied().unwrap_or(*t))
                    .collect();
            }
        }
    }

    (*ctx).lock().modules.push(copy);
    copy
}
