//! Value handles
//!
//! One [`Value`] type covers arguments, constants, globals, functions, block
//! labels and every instruction. Its [`ValueKind`] (including the opcode for
//! instructions) is read when the handle is created, and accessors that only
//! make sense for some kinds check it before any native call.

use crate::block::BasicBlock;
use crate::error::{BindResult, GuardError};
use crate::function::Function;
use crate::handle::{DerivedHandle, ObjectKind};
use crate::native;
use crate::token::TokenChain;
use crate::types::Type;
use irbind_sys as sys;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    ICmp,
    Br,
    Ret,
    Call,
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Br | Opcode::Ret)
    }

    pub fn is_binary(self) -> bool {
        matches!(self, Opcode::Add | Opcode::Sub | Opcode::Mul)
    }

    pub(crate) fn to_sys(self) -> sys::IrOpcode {
        match self {
            Opcode::Add => sys::IrOpcode::Add,
            Opcode::Sub => sys::IrOpcode::Sub,
            Opcode::Mul => sys::IrOpcode::Mul,
            Opcode::ICmp => sys::IrOpcode::ICmp,
            Opcode::Br => sys::IrOpcode::Br,
            Opcode::Ret => sys::IrOpcode::Ret,
            Opcode::Call => sys::IrOpcode::Call,
        }
    }
}

impl From<sys::IrOpcode> for Opcode {
    fn from(op: sys::IrOpcode) -> Self {
        match op {
            sys::IrOpcode::Add => Opcode::Add,
            sys::IrOpcode::Sub => Opcode::Sub,
            sys::IrOpcode::Mul => Opcode::Mul,
            sys::IrOpcode::ICmp => Opcode::ICmp,
            sys::IrOpcode::Br => Opcode::Br,
            sys::IrOpcode::Ret => Opcode::Ret,
            sys::IrOpcode::Call => Opcode::Call,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum IntPredicate {
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

impl IntPredicate {
    pub(crate) fn to_sys(self) -> sys::IrIntPredicate {
        match self {
            IntPredicate::Eq => sys::IrIntPredicate::Eq,
            IntPredicate::Ne => sys::IrIntPredicate::Ne,
            IntPredicate::Ugt => sys::IrIntPredicate::Ugt,
            IntPredicate::Uge => sys::IrIntPredicate::Uge,
            IntPredicate::Ult => sys::IrIntPredicate::Ult,
            IntPredicate::Ule => sys::IrIntPredicate::Ule,
            IntPredicate::Sgt => sys::IrIntPredicate::Sgt,
            IntPredicate::Sge => sys::IrIntPredicate::Sge,
            IntPredicate::Slt => sys::IrIntPredicate::Slt,
            IntPredicate::Sle => sys::IrIntPredicate::Sle,
        }
    }
}

impl From<sys::IrIntPredicate> for IntPredicate {
    fn from(p: sys::IrIntPredicate) -> Self {
        match p {
            sys::IrIntPredicate::Eq => IntPredicate::Eq,
            sys::IrIntPredicate::Ne => IntPredicate::Ne,
            sys::IrIntPredicate::Ugt => IntPredicate::Ugt,
            sys::IrIntPredicate::Uge => IntPredicate::Uge,
            sys::IrIntPredicate::Ult => IntPredicate::Ult,
            sys::IrIntPredicate::Ule => IntPredicate::Ule,
            sys::IrIntPredicate::Sgt => IntPredicate::Sgt,
            sys::IrIntPredicate::Sge => IntPredicate::Sge,
            sys::IrIntPredicate::Slt => IntPredicate::Slt,
            sys::IrIntPredicate::Sle => IntPredicate::Sle,
        }
    }
}

/// What a value is. Instructions carry their opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Argument,
    BasicBlock,
    Function,
    GlobalVariable,
    ConstantInt,
    Instruction(Opcode),
}

impl ValueKind {
    pub fn opcode(self) -> Option<Opcode> {
        match self {
            ValueKind::Instruction(op) => Some(op),
            _ => None,
        }
    }

    pub fn is_instruction(self) -> bool {
        matches!(self, ValueKind::Instruction(_))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Argument => write!(f, "argument"),
            ValueKind::BasicBlock => write!(f, "basic_block"),
            ValueKind::Function => write!(f, "function"),
            ValueKind::GlobalVariable => write!(f, "global_variable"),
            ValueKind::ConstantInt => write!(f, "constant_int"),
            ValueKind::Instruction(op) => write!(f, "{} instruction", op),
        }
    }
}

/// Handle to a native value
#[derive(Clone)]
pub struct Value {
    raw: DerivedHandle<sys::IrValue>,
    kind: ValueKind,
}

impl Value {
    /// Wrap a native value found through a handle with token chain `chain`.
    ///
    /// Constants belong to the context, not to any module, so they are
    /// narrowed to the chain's root.
    pub(crate) fn wrap(raw: sys::IrValueRef, chain: TokenChain) -> BindResult<Value> {
        let _native = native::enter();
        let handle = DerivedHandle::new(raw, chain.clone(), ObjectKind::Value)?;
        let ptr = handle.check_valid(ObjectKind::Value)?;
        let kind = match unsafe { sys::ir_value_kind(ptr) } {
            sys::IrValueKind::Argument => ValueKind::Argument,
            sys::IrValueKind::BasicBlock => ValueKind::BasicBlock,
            sys::IrValueKind::Function => ValueKind::Function,
            sys::IrValueKind::GlobalVariable => ValueKind::GlobalVariable,
            sys::IrValueKind::ConstantInt => {
                return Ok(Value {
                    raw: DerivedHandle::new(raw, chain.root(), ObjectKind::Value)?,
                    kind: ValueKind::ConstantInt,
                });
            }
            sys::IrValueKind::Instruction => {
                ValueKind::Instruction(unsafe { sys::ir_instruction_opcode(ptr) }.into())
            }
        };
        Ok(Value { raw: handle, kind })
    }

    pub(crate) fn wrap_opt(raw: sys::IrValueRef, chain: &TokenChain) -> BindResult<Option<Value>> {
        if raw.is_null() {
            return Ok(None);
        }
        Value::wrap(raw, chain.clone()).map(Some)
    }

    /// Wrap a native value pointer obtained outside this crate.
    ///
    /// # Safety
    /// `raw` must be alive for as long as every owner in `chain` is.
    pub unsafe fn from_raw(raw: sys::IrValueRef, chain: TokenChain) -> BindResult<Value> {
        Value::wrap(raw, chain)
    }

    pub(crate) fn raw(&self) -> BindResult<sys::IrValueRef> {
        Ok(self.raw.check_valid(ObjectKind::Value)?)
    }

    pub fn check_valid(&self) -> BindResult<()> {
        self.raw().map(|_| ())
    }

    pub fn chain(&self) -> &TokenChain {
        self.raw.chain()
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Validity first, then the kind guard.
    fn guarded(
        &self,
        op: &'static str,
        expected: &str,
        accepts: impl Fn(ValueKind) -> bool,
    ) -> BindResult<sys::IrValueRef> {
        let raw = self.raw()?;
        if !accepts(self.kind) {
            return Err(GuardError::WrongValueKind {
                op,
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            }
            .into());
        }
        Ok(raw)
    }

    fn instruction(&self, op: &'static str) -> BindResult<sys::IrValueRef> {
        self.guarded(op, "an instruction", ValueKind::is_instruction)
    }

    fn terminator(&self, op: &'static str) -> BindResult<sys::IrValueRef> {
        self.guarded(op, "a terminator instruction", |k| {
            k.opcode().is_some_and(Opcode::is_terminator)
        })
    }

    fn branch(&self, op: &'static str) -> BindResult<sys::IrValueRef> {
        self.guarded(op, "br instruction", |k| k == ValueKind::Instruction(Opcode::Br))
    }

    fn sibling(&self, raw: sys::IrValueRef) -> BindResult<Option<Value>> {
        Value::wrap_opt(raw, self.chain())
    }

    // =========================================================================
    // Any value
    // =========================================================================

    pub fn type_of(&self) -> BindResult<Type> {
        let _native = native::enter();
        let raw = self.raw()?;
        Type::wrap(unsafe { sys::ir_type_of(raw) }, self.chain().clone())
    }

    pub fn name(&self) -> BindResult<String> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_get_value_name(raw) })
    }

    pub fn set_name(&self, name: &str) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        unsafe { sys::ir_set_value_name(raw, name) };
        Ok(())
    }

    pub fn is_constant(&self) -> BindResult<bool> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_is_constant(raw) })
    }

    pub fn operand_count(&self) -> BindResult<u32> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_num_operands(raw) })
    }

    pub fn operand(&self, index: u32) -> BindResult<Value> {
        let _native = native::enter();
        let raw = self.raw()?;
        let len = unsafe { sys::ir_num_operands(raw) };
        if index >= len {
            return Err(GuardError::IndexOutOfRange {
                op: "operand",
                index,
                len,
            }
            .into());
        }
        Value::wrap(unsafe { sys::ir_get_operand(raw, index) }, self.chain().clone())
    }

    pub fn operands(&self) -> BindResult<Vec<Value>> {
        let _native = native::enter();
        (0..self.operand_count()?).map(|i| self.operand(i)).collect()
    }

    // =========================================================================
    // Constants
    // =========================================================================

    pub fn const_zext_value(&self) -> BindResult<u64> {
        let _native = native::enter();
        let raw = self.guarded("const_zext_value", "constant_int", |k| k == ValueKind::ConstantInt)?;
        Ok(unsafe { sys::ir_const_int_zext_value(raw) })
    }

    pub fn const_sext_value(&self) -> BindResult<i64> {
        let _native = native::enter();
        let raw = self.guarded("const_sext_value", "constant_int", |k| k == ValueKind::ConstantInt)?;
        Ok(unsafe { sys::ir_const_int_sext_value(raw) })
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    pub fn opcode(&self) -> BindResult<Opcode> {
        self.raw()?;
        match self.kind {
            ValueKind::Instruction(op) => Ok(op),
            other => Err(GuardError::WrongValueKind {
                op: "opcode",
                expected: "an instruction".into(),
                actual: other.to_string(),
            }
            .into()),
        }
    }

    pub fn instruction_parent(&self) -> BindResult<BasicBlock> {
        let _native = native::enter();
        let raw = self.instruction("instruction_parent")?;
        BasicBlock::wrap(unsafe { sys::ir_instruction_parent(raw) }, self.chain().clone())
    }

    pub fn next_instruction(&self) -> BindResult<Option<Value>> {
        let _native = native::enter();
        let raw = self.instruction("next_instruction")?;
        self.sibling(unsafe { sys::ir_next_instruction(raw) })
    }

    pub fn prev_instruction(&self) -> BindResult<Option<Value>> {
        let _native = native::enter();
        let raw = self.instruction("prev_instruction")?;
        self.sibling(unsafe { sys::ir_prev_instruction(raw) })
    }

    pub fn is_terminator(&self) -> bool {
        self.kind.opcode().is_some_and(Opcode::is_terminator)
    }

    pub fn is_conditional(&self) -> BindResult<bool> {
        let _native = native::enter();
        let raw = self.branch("is_conditional")?;
        Ok(unsafe { sys::ir_is_conditional(raw) })
    }

    /// The condition of a conditional branch.
    pub fn condition(&self) -> BindResult<Value> {
        let _native = native::enter();
        let raw = self.branch("condition")?;
        if !unsafe { sys::ir_is_conditional(raw) } {
            return Err(GuardError::WrongValueKind {
                op: "condition",
                expected: "conditional br instruction".into(),
                actual: "unconditional br instruction".into(),
            }
            .into());
        }
        Value::wrap(unsafe { sys::ir_get_condition(raw) }, self.chain().clone())
    }

    pub fn num_successors(&self) -> BindResult<u32> {
        let _native = native::enter();
        let raw = self.terminator("num_successors")?;
        Ok(unsafe { sys::ir_num_successors(raw) })
    }

    pub fn successor(&self, index: u32) -> BindResult<BasicBlock> {
        let _native = native::enter();
        let raw = self.terminator("successor")?;
        let len = unsafe { sys::ir_num_successors(raw) };
        if index >= len {
            return Err(GuardError::IndexOutOfRange {
                op: "successor",
                index,
                len,
            }
            .into());
        }
        BasicBlock::wrap(unsafe { sys::ir_get_successor(raw, index) }, self.chain().clone())
    }

    pub fn icmp_predicate(&self) -> BindResult<IntPredicate> {
        let _native = native::enter();
        let raw = self.guarded("icmp_predicate", "icmp instruction", |k| {
            k == ValueKind::Instruction(Opcode::ICmp)
        })?;
        Ok(unsafe { sys::ir_icmp_predicate(raw) }.into())
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub fn as_function(&self) -> BindResult<Function> {
        let raw = self.guarded("as_function", "function", |k| k == ValueKind::Function)?;
        Function::wrap(raw, self.chain().clone())
    }

    pub fn as_basic_block(&self) -> BindResult<BasicBlock> {
        let _native = native::enter();
        let raw = self.guarded("as_basic_block", "basic_block", |k| k == ValueKind::BasicBlock)?;
        BasicBlock::wrap(unsafe { sys::ir_value_as_basic_block(raw) }, self.chain().clone())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}, {:?})", self.kind, self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::module::Module;
    use pretty_assertions::assert_eq;

    struct Fixture {
        ctx: Context,
        module: Module,
    }

    fn fixture() -> Fixture {
        let ctx = Context::create().unwrap();
        let module = Module::create(&ctx, "values").unwrap();
        Fixture { ctx, module }
    }

    #[test]
    fn test_constant_accessors() {
        let f = fixture();
        let i8t = f.ctx.int8_type().unwrap();
        let minus_one = f.ctx.const_int(&i8t, u64::MAX, true).unwrap();
        assert_eq!(minus_one.kind(), ValueKind::ConstantInt);
        assert_eq!(minus_one.const_zext_value().unwrap(), 255);
        assert_eq!(minus_one.const_sext_value().unwrap(), -1);
        assert!(minus_one.is_constant().unwrap());
        assert_eq!(minus_one.type_of().unwrap(), i8t);

        let before = sys::ir_call_count();
        assert!(minus_one.opcode().unwrap_err().is_precondition_violation());
        assert!(minus_one.condition().unwrap_err().is_precondition_violation());
        assert_eq!(sys::ir_call_count(), before);
        f.ctx.dispose().unwrap();
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ValueKind::Instruction(Opcode::ICmp).to_string(), "icmp instruction");
        assert_eq!(ValueKind::GlobalVariable.to_string(), "global_variable");
        assert_eq!(IntPredicate::Sle.to_string(), "sle");
    }

    #[test]
    fn test_arguments_and_names() {
        let f = fixture();
        let i32t = f.ctx.int32_type().unwrap();
        let fn_ty = f.ctx.function_type(&i32t, &[i32t.clone()], false).unwrap();
        let func = f.module.add_function("id", &fn_ty).unwrap();
        let arg = func.param(0).unwrap();
        assert_eq!(arg.kind(), ValueKind::Argument);
        arg.set_name("x").unwrap();
        assert_eq!(arg.name().unwrap(), "x");
        assert_eq!(func.param(0).unwrap(), arg);
        assert!(arg.as_function().unwrap_err().is_precondition_violation());

        let as_value = func.as_value().unwrap();
        assert_eq!(as_value.kind(), ValueKind::Function);
        assert_eq!(as_value.as_function().unwrap(), func);
        f.ctx.dispose().unwrap();
    }

    #[test]
    fn test_module_disposal_reaches_values() {
        let f = fixture();
        let i32t = f.ctx.int32_type().unwrap();
        let fn_ty = f.ctx.function_type(&i32t, &[i32t.clone()], false).unwrap();
        let func = f.module.add_function("id", &fn_ty).unwrap();
        let arg = func.param(0).unwrap();
        let zero = f.ctx.const_int(&i32t, 0, false).unwrap();

        f.module.dispose().unwrap();
        assert!(arg.name().unwrap_err().is_use_after_free());
        // constants belong to the context
        assert_eq!(zero.const_zext_value().unwrap(), 0);
        f.ctx.dispose().unwrap();
        assert!(zero.const_zext_value().unwrap_err().is_use_after_free());
    }
}
