use crate::values::type_kind;
use crate::{
    alloc, context, dealloc, enter_call, IrBlockRef, IrBuilderRef, IrContextRef, IrIntPredicate,
    IrObjectKind, IrOpcode, IrTypeKind, IrTypeRef, IrValue, IrValueRef,
};
use std::ptr::null_mut;

pub struct IrBuilder {
    context: IrContextRef,
    block: IrBlockRef,
}

pub unsafe fn ir_builder_create(ctx: IrContextRef) -> IrBuilderRef {
    enter_call();
    let b = alloc(IrBuilder {
        context: ctx,
        block: null_mut(),
    });
    (*ctx).lock().builders.push(b);
    b
}

pub unsafe fn ir_builder_dispose(b: IrBuilderRef) {
    enter_call();
    let ctx = (*b).context;
    (*ctx).lock().builders.retain(|x| *x != b);
    context::notify(ctx, IrObjectKind::Builder);
    dealloc(b);
}

pub unsafe fn ir_position_builder_at_end(b: IrBuilderRef, bb: IrBlockRef) {
    enter_call();
    (*b).block = bb;
}

pub unsafe fn ir_get_insert_block(b: IrBuilderRef) -> IrBlockRef {
    enter_call();
    (*b).block
}

pub unsafe fn ir_clear_insertion_position(b: IrBuilderRef) {
    enter_call();
    (*b).block = null_mut();
}

unsafe fn insert(b: IrBuilderRef, mut inst: IrValue, what: &str) -> IrValueRef {
    let bb = (*b).block;
    assert!(!bb.is_null(), "{}: builder has no insertion point", what);
    inst.block = bb;
    let ptr = alloc(inst);
    (*bb).instructions.push(ptr);
    ptr
}

pub unsafe fn ir_build_binop(
    b: IrBuilderRef,
    op: IrOpcode,
    lhs: IrValueRef,
    rhs: IrValueRef,
    name: &str,
) -> IrValueRef {
    enter_call();
    assert!(
        matches!(op, IrOpcode::Add | IrOpcode::Sub | IrOpcode::Mul),
        "ir_build_binop: not a binary opcode"
    );
    let ty = (*lhs).ty;
    assert!(ty == (*rhs).ty, "ir_build_binop: operand types differ");
    assert!(type_kind(ty) == IrTypeKind::Integer, "ir_build_binop: operands are not integers");
    let mut inst = IrValue::instruction(op, ty, name);
    inst.operands = vec![lhs, rhs];
    insert(b, inst, "ir_build_binop")
}

pub unsafe fn ir_build_icmp(
    b: IrBuilderRef,
    pred: IrIntPredicate,
    lhs: IrValueRef,
    rhs: IrValueRef,
    name: &str,
) -> IrValueRef {
    enter_call();
    assert!((*lhs).ty == (*rhs).ty, "ir_build_icmp: operand types differ");
    let i1 = crate::ir_int_type((*b).context, 1);
    let mut inst = IrValue::instruction(IrOpcode::ICmp, i1, name);
    inst.predicate = Some(pred);
    inst.operands = vec![lhs, rhs];
    insert(b, inst, "ir_build_icmp")
}

pub unsafe fn ir_build_br(b: IrBuilderRef, dest: IrBlockRef) -> IrValueRef {
    enter_call();
    let void = crate::ir_void_type((*b).context);
    let mut inst = IrValue::instruction(IrOpcode::Br, void, "");
    inst.targets = vec![dest];
    insert(b, inst, "ir_build_br")
}

pub unsafe fn ir_build_cond_br(
    b: IrBuilderRef,
    cond: IrValueRef,
    then_bb: IrBlockRef,
    else_bb: IrBlockRef,
) -> IrValueRef {
    enter_call();
    let cond_ty = (*cond).ty;
    assert!(
        type_kind(cond_ty) == IrTypeKind::Integer && (*cond_ty).width == 1,
        "ir_build_cond_br: condition is not i1"
    );
    let void = crate::ir_void_type((*b).context);
    let mut inst = IrValue::instruction(IrOpcode::Br, void, "");
    inst.operands = vec![cond];
    inst.targets = vec![then_bb, else_bb];
    insert(b, inst, "ir_build_cond_br")
}

pub unsafe fn ir_build_ret(b: IrBuilderRef, v: IrValueRef) -> IrValueRef {
    enter_call();
    let void = crate::ir_void_type((*b).context);
    let mut inst = IrValue::instruction(IrOpcode::Ret, void, "");
    inst.operands = vec![v];
    insert(b, inst, "ir_build_ret")
}

pub unsafe fn ir_build_ret_void(b: IrBuilderRef) -> IrValueRef {
    enter_call();
    let void = crate::ir_void_type((*b).context);
    insert(b, IrValue::instruction(IrOpcode::Ret, void, ""), "ir_build_ret_void")
}

/// The callee is stored as the last operand, after the arguments.
pub unsafe fn ir_build_call(
    b: IrBuilderRef,
    fn_ty: IrTypeRef,
    callee: IrValueRef,
    args: &[IrValueRef],
    name: &str,
) -> IrValueRef {
    enter_call();
    assert!(type_kind(fn_ty) == IrTypeKind::Function, "ir_build_call: not a function type");
    let params = &(*fn_ty).params;
    assert!(
        args.len() == params.len() || ((*fn_ty).vararg && args.len() >= params.len()),
        "ir_build_call: wrong number of arguments"
    );
    for (arg, param) in args.iter().zip(params.iter()) {
        assert!((*(*arg)).ty == *param, "ir_build_call: argument type mismatch");
    }
    let mut inst = IrValue::instruction(IrOpcode::Call, (*fn_ty).ret, name);
    inst.operands = args.to_vec();
    inst.operands.push(callee);
    insert(b, inst, "ir_build_call")
}
