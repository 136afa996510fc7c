use crate::{
    alloc, context, dealloc, enter_call, IrBlockRef, IrModuleRef, IrObjectKind, IrTypeKind,
    IrTypeRef, IrValueRef,
};
use std::ptr::null_mut;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrValueKind {
    Argument,
    BasicBlock,
    Function,
    GlobalVariable,
    ConstantInt,
    Instruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrOpcode {
    Add,
    Sub,
    Mul,
    ICmp,
    Br,
    Ret,
    Call,
}

impl IrOpcode {
    pub fn is_terminator(self) -> bool {
        matches!(self, IrOpcode::Br | IrOpcode::Ret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrIntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrLinkage {
    External,
    Internal,
    Private,
}

pub struct IrValue {
    pub(crate) kind: IrValueKind,
    pub(crate) ty: IrTypeRef,
    /// Pointee type of a global variable.
    pub(crate) value_ty: IrTypeRef,
    pub(crate) name: String,
    pub(crate) bits: u64,
    pub(crate) opcode: Option<IrOpcode>,
    pub(crate) predicate: Option<IrIntPredicate>,
    pub(crate) operands: Vec<IrValueRef>,
    pub(crate) targets: Vec<IrBlockRef>,
    /// Owning block for instructions, the block itself for block values.
    pub(crate) block: IrBlockRef,
    /// Owning function for arguments.
    pub(crate) owner: IrValueRef,
    /// Owning module for functions and globals.
    pub(crate) module: IrModuleRef,
    pub(crate) body: Option<FunctionBody>,
}

pub(crate) struct FunctionBody {
    pub(crate) fn_ty: IrTypeRef,
    pub(crate) params: Vec<IrValueRef>,
    pub(crate) blocks: Vec<IrBlockRef>,
    pub(crate) linkage: IrLinkage,
    pub(crate) call_conv: u32,
}

pub struct IrBlock {
    pub(crate) name: String,
    pub(crate) parent: IrValueRef,
    pub(crate) instructions: Vec<IrValueRef>,
    pub(crate) value: IrValueRef,
}

impl IrValue {
    pub(crate) fn blank(kind: IrValueKind, ty: IrTypeRef) -> Self {
        Self {
            kind,
            ty,
            value_ty: null_mut(),
            name: String::new(),
            bits: 0,
            opcode: None,
            predicate: None,
            operands: Vec::new(),
            targets: Vec::new(),
            block: null_mut(),
            owner: null_mut(),
            module: null_mut(),
            body: None,
        }
    }

    pub(crate) fn constant_int(ty: IrTypeRef, bits: u64) -> Self {
        let mut v = Self::blank(IrValueKind::ConstantInt, ty);
        v.bits = bits;
        v
    }

    pub(crate) fn instruction(opcode: IrOpcode, ty: IrTypeRef, name: &str) -> Self {
        let mut v = Self::blank(IrValueKind::Instruction, ty);
        v.opcode = Some(opcode);
        v.name = name.to_string();
        v
    }
}

pub(crate) fn truncate(value: u64, width: u32, _sign_extend: bool) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

pub(crate) unsafe fn new_function(module: IrModuleRef, name: &str, fn_ty: IrTypeRef) -> IrValueRef {
    let ctx = (*fn_ty).context;
    let ptr_ty = crate::ir_pointer_type(ctx);
    let mut f = IrValue::blank(IrValueKind::Function, ptr_ty);
    f.name = name.to_string();
    f.module = module;
    let f = alloc(f);
    let params = (*fn_ty)
        .params
        .iter()
        .map(|p| {
            let mut arg = IrValue::blank(IrValueKind::Argument, *p);
            arg.owner = f;
            alloc(arg)
        })
        .collect();
    (*f).body = Some(FunctionBody {
        fn_ty,
        params,
        blocks: Vec::new(),
        linkage: IrLinkage::External,
        call_conv: 0,
    });
    f
}

/// Frees a function with its parameters, blocks and instructions.
pub(crate) unsafe fn free_function(f: IrValueRef) {
    let ctx = (*(*f).ty).context;
    if let Some(body) = (*f).body.take() {
        for bb in body.blocks {
            free_block(bb);
        }
        for p in body.params {
            dealloc(p);
        }
    }
    context::notify(ctx, IrObjectKind::Function);
    dealloc(f);
}

pub(crate) unsafe fn free_block(bb: IrBlockRef) {
    let parent = (*bb).parent;
    for inst in std::mem::take(&mut (*bb).instructions) {
        dealloc(inst);
    }
    context::notify((*(*parent).ty).context, IrObjectKind::BasicBlock);
    dealloc((*bb).value);
    dealloc(bb);
}

unsafe fn body<'a>(f: IrValueRef, what: &str) -> &'a mut FunctionBody {
    assert!((*f).kind == IrValueKind::Function, "{}: not a function", what);
    match (*f).body.as_mut() {
        Some(b) => b,
        None => panic!("{}: function has no body", what),
    }
}

unsafe fn opcode_of(v: IrValueRef, what: &str) -> IrOpcode {
    assert!((*v).kind == IrValueKind::Instruction, "{}: not an instruction", what);
    match (*v).opcode {
        Some(op) => op,
        None => panic!("{}: instruction without opcode", what),
    }
}

// ---------------------------------------------------------------------------
// Generic values
// ---------------------------------------------------------------------------

pub unsafe fn ir_value_kind(v: IrValueRef) -> IrValueKind {
    enter_call();
    (*v).kind
}

pub unsafe fn ir_type_of(v: IrValueRef) -> IrTypeRef {
    enter_call();
    (*v).ty
}

pub unsafe fn ir_get_value_name(v: IrValueRef) -> String {
    enter_call();
    (*v).name.clone()
}

pub unsafe fn ir_set_value_name(v: IrValueRef, name: &str) {
    enter_call();
    (*v).name = name.to_string();
}

pub unsafe fn ir_is_constant(v: IrValueRef) -> bool {
    enter_call();
    matches!(
        (*v).kind,
        IrValueKind::ConstantInt | IrValueKind::Function | IrValueKind::GlobalVariable
    )
}

pub unsafe fn ir_const_int_zext_value(v: IrValueRef) -> u64 {
    enter_call();
    assert!((*v).kind == IrValueKind::ConstantInt, "ir_const_int_zext_value: not a constant int");
    (*v).bits
}

pub unsafe fn ir_const_int_sext_value(v: IrValueRef) -> i64 {
    enter_call();
    assert!((*v).kind == IrValueKind::ConstantInt, "ir_const_int_sext_value: not a constant int");
    let width = (*(*v).ty).width;
    if width >= 64 {
        (*v).bits as i64
    } else {
        let shift = 64 - width;
        (((*v).bits << shift) as i64) >> shift
    }
}

pub unsafe fn ir_num_operands(v: IrValueRef) -> u32 {
    enter_call();
    (*v).operands.len() as u32
}

pub unsafe fn ir_get_operand(v: IrValueRef, index: u32) -> IrValueRef {
    enter_call();
    let ops = &(*v).operands;
    assert!((index as usize) < ops.len(), "ir_get_operand: index out of range");
    ops[index as usize]
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

pub unsafe fn ir_instruction_opcode(v: IrValueRef) -> IrOpcode {
    enter_call();
    opcode_of(v, "ir_instruction_opcode")
}

pub unsafe fn ir_instruction_parent(v: IrValueRef) -> IrBlockRef {
    enter_call();
    opcode_of(v, "ir_instruction_parent");
    (*v).block
}

pub unsafe fn ir_next_instruction(v: IrValueRef) -> IrValueRef {
    enter_call();
    opcode_of(v, "ir_next_instruction");
    let insts = &(*(*v).block).instructions;
    match insts.iter().position(|i| *i == v) {
        Some(pos) if pos + 1 < insts.len() => insts[pos + 1],
        _ => null_mut(),
    }
}

pub unsafe fn ir_prev_instruction(v: IrValueRef) -> IrValueRef {
    enter_call();
    opcode_of(v, "ir_prev_instruction");
    let insts = &(*(*v).block).instructions;
    match insts.iter().position(|i| *i == v) {
        Some(pos) if pos > 0 => insts[pos - 1],
        _ => null_mut(),
    }
}

pub unsafe fn ir_is_conditional(br: IrValueRef) -> bool {
    enter_call();
    assert!(opcode_of(br, "ir_is_conditional") == IrOpcode::Br, "ir_is_conditional: not a branch");
    (*br).operands.len() == 1
}

pub unsafe fn ir_get_condition(br: IrValueRef) -> IrValueRef {
    enter_call();
    assert!(opcode_of(br, "ir_get_condition") == IrOpcode::Br, "ir_get_condition: not a branch");
    assert!((*br).operands.len() == 1, "ir_get_condition: unconditional branch");
    (&(*br).operands)[0]
}

pub unsafe fn ir_num_successors(term: IrValueRef) -> u32 {
    enter_call();
    let op = opcode_of(term, "ir_num_successors");
    assert!(op.is_terminator(), "ir_num_successors: not a terminator");
    (*term).targets.len() as u32
}

pub unsafe fn ir_get_successor(term: IrValueRef, index: u32) -> IrBlockRef {
    enter_call();
    let op = opcode_of(term, "ir_get_successor");
    assert!(op.is_terminator(), "ir_get_successor: not a terminator");
    let targets = &(*term).targets;
    assert!((index as usize) < targets.len(), "ir_get_successor: index out of range");
    targets[index as usize]
}

pub unsafe fn ir_icmp_predicate(v: IrValueRef) -> IrIntPredicate {
    enter_call();
    assert!(opcode_of(v, "ir_icmp_predicate") == IrOpcode::ICmp, "ir_icmp_predicate: not an icmp");
    match (*v).predicate {
        Some(p) => p,
        None => panic!("ir_icmp_predicate: icmp without predicate"),
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

pub unsafe fn ir_count_params(f: IrValueRef) -> u32 {
    enter_call();
    body(f, "ir_count_params").params.len() as u32
}

pub unsafe fn ir_get_param(f: IrValueRef, index: u32) -> IrValueRef {
    enter_call();
    let params = &body(f, "ir_get_param").params;
    assert!((index as usize) < params.len(), "ir_get_param: index out of range");
    params[index as usize]
}

pub unsafe fn ir_function_value_type(f: IrValueRef) -> IrTypeRef {
    enter_call();
    body(f, "ir_function_value_type").fn_ty
}

pub unsafe fn ir_global_parent(v: IrValueRef) -> IrModuleRef {
    enter_call();
    assert!(
        matches!((*v).kind, IrValueKind::Function | IrValueKind::GlobalVariable),
        "ir_global_parent: not a global value"
    );
    (*v).module
}

pub unsafe fn ir_get_linkage(f: IrValueRef) -> IrLinkage {
    enter_call();
    body(f, "ir_get_linkage").linkage
}

pub unsafe fn ir_set_linkage(f: IrValueRef, linkage: IrLinkage) {
    enter_call();
    body(f, "ir_set_linkage").linkage = linkage;
}

pub unsafe fn ir_get_call_conv(f: IrValueRef) -> u32 {
    enter_call();
    body(f, "ir_get_call_conv").call_conv
}

pub unsafe fn ir_set_call_conv(f: IrValueRef, cc: u32) {
    enter_call();
    body(f, "ir_set_call_conv").call_conv = cc;
}

pub unsafe fn ir_append_basic_block(f: IrValueRef, name: &str) -> IrBlockRef {
    enter_call();
    let b = body(f, "ir_append_basic_block");
    let label_ty = crate::ir_void_type((*(*f).ty).context);
    let bb = alloc(IrBlock {
        name: name.to_string(),
        parent: f,
        instructions: Vec::new(),
        value: null_mut(),
    });
    let mut value = IrValue::blank(IrValueKind::BasicBlock, label_ty);
    value.block = bb;
    (*bb).value = alloc(value);
    b.blocks.push(bb);
    bb
}

pub unsafe fn ir_count_basic_blocks(f: IrValueRef) -> u32 {
    enter_call();
    body(f, "ir_count_basic_blocks").blocks.len() as u32
}

pub unsafe fn ir_get_first_basic_block(f: IrValueRef) -> IrBlockRef {
    enter_call();
    body(f, "ir_get_first_basic_block")
        .blocks
        .first()
        .copied()
        .unwrap_or(null_mut())
}

pub unsafe fn ir_get_last_basic_block(f: IrValueRef) -> IrBlockRef {
    enter_call();
    body(f, "ir_get_last_basic_block")
        .blocks
        .last()
        .copied()
        .unwrap_or(null_mut())
}

// ---------------------------------------------------------------------------
// Basic blocks
// ---------------------------------------------------------------------------

pub unsafe fn ir_get_basic_block_name(bb: IrBlockRef) -> String {
    enter_call();
    (*bb).name.clone()
}

pub unsafe fn ir_get_basic_block_parent(bb: IrBlockRef) -> IrValueRef {
    enter_call();
    (*bb).parent
}

pub unsafe fn ir_get_next_basic_block(bb: IrBlockRef) -> IrBlockRef {
    enter_call();
    let blocks = &body((*bb).parent, "ir_get_next_basic_block").blocks;
    match blocks.iter().position(|b| *b == bb) {
        Some(pos) if pos + 1 < blocks.len() => blocks[pos + 1],
        _ => null_mut(),
    }
}

pub unsafe fn ir_get_previous_basic_block(bb: IrBlockRef) -> IrBlockRef {
    enter_call();
    let blocks = &body((*bb).parent, "ir_get_previous_basic_block").blocks;
    match blocks.iter().position(|b| *b == bb) {
        Some(pos) if pos > 0 => blocks[pos - 1],
        _ => null_mut(),
    }
}

/// The block's terminator, or null when the last instruction is not one.
pub unsafe fn ir_get_basic_block_terminator(bb: IrBlockRef) -> IrValueRef {
    enter_call();
    match (*bb).instructions.last() {
        Some(last) if (*(*last)).opcode.is_some_and(IrOpcode::is_terminator) => *last,
        _ => null_mut(),
    }
}

pub unsafe fn ir_get_first_instruction(bb: IrBlockRef) -> IrValueRef {
    enter_call();
    (*bb).instructions.first().copied().unwrap_or(null_mut())
}

pub unsafe fn ir_get_last_instruction(bb: IrBlockRef) -> IrValueRef {
    enter_call();
    (*bb).instructions.last().copied().unwrap_or(null_mut())
}

unsafe fn move_block(bb: IrBlockRef, anchor: IrBlockRef, after: bool, what: &str) {
    assert!((*bb).parent == (*anchor).parent, "{}: blocks belong to different functions", what);
    if bb == anchor {
        return;
    }
    let blocks = &mut body((*bb).parent, what).blocks;
    blocks.retain(|b| *b != bb);
    let pos = match blocks.iter().position(|b| *b == anchor) {
        Some(pos) => pos,
        None => panic!("{}: anchor block not in function", what),
    };
    blocks.insert(if after { pos + 1 } else { pos }, bb);
}

pub unsafe fn ir_move_basic_block_before(bb: IrBlockRef, anchor: IrBlockRef) {
    enter_call();
    move_block(bb, anchor, false, "ir_move_basic_block_before");
}

pub unsafe fn ir_move_basic_block_after(bb: IrBlockRef, anchor: IrBlockRef) {
    enter_call();
    move_block(bb, anchor, true, "ir_move_basic_block_after");
}

pub unsafe fn ir_basic_block_as_value(bb: IrBlockRef) -> IrValueRef {
    enter_call();
    (*bb).value
}

pub unsafe fn ir_value_as_basic_block(v: IrValueRef) -> IrBlockRef {
    enter_call();
    assert!((*v).kind == IrValueKind::BasicBlock, "ir_value_as_basic_block: not a basic block");
    (*v).block
}

pub(crate) unsafe fn type_kind(ty: IrTypeRef) -> IrTypeKind {
    (*ty).kind
}
