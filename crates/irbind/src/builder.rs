//! Instruction builders
//!
//! A builder is owned by its context but not by any module. Instructions it
//! creates inherit the token chain of the block it is positioned at, so
//! disposing that block's module invalidates them.
//!
//! The `build_*` methods only validate: handles alive, builder positioned,
//! operands with matching types that live in the insertion block's module
//! (constants only need the same context). Everything else is passed
//! straight through to the library.

use crate::block::BasicBlock;
use crate::context::Context;
use crate::error::{BindResult, GuardError};
use crate::function::Function;
use crate::handle::{NativeResource, ObjectKind, OwnedHandle};
use crate::manager::{Managed, Manager, Release};
use crate::native;
use crate::token::{TokenChain, ValidityToken};
use crate::types::{Type, TypeKind};
use crate::value::{IntPredicate, Opcode, Value};
use irbind_sys as sys;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type BuilderManager = Manager<Builder>;

pub struct NativeBuilder;

impl NativeResource for NativeBuilder {
    type Raw = sys::IrBuilder;
    const KIND: ObjectKind = ObjectKind::Builder;

    unsafe fn free(raw: *mut sys::IrBuilder) {
        sys::ir_builder_dispose(raw);
    }
}

struct BuilderInner {
    handle: OwnedHandle<NativeBuilder>,
    context: Context,
    position: Mutex<Option<BasicBlock>>,
}

/// Handle to a native instruction builder
#[derive(Clone)]
pub struct Builder {
    inner: Arc<BuilderInner>,
}

impl Builder {
    pub(crate) fn create(ctx: &Context) -> BindResult<Builder> {
        let _native = native::enter();
        let raw_ctx = ctx.raw()?;
        let raw = unsafe { sys::ir_builder_create(raw_ctx) };
        Ok(Builder {
            inner: Arc::new(BuilderInner {
                handle: OwnedHandle::new(raw, ctx.chain())?,
                context: ctx.clone(),
                position: Mutex::new(None),
            }),
        })
    }

    pub(crate) fn raw(&self) -> BindResult<sys::IrBuilderRef> {
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

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn dispose(&self) -> BindResult<()> {
        self.inner.handle.dispose()?;
        Ok(())
    }

    fn position(&self) -> MutexGuard<'_, Option<BasicBlock>> {
        self.inner.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Positioning
    // =========================================================================

    pub fn position_at_end(&self, block: &BasicBlock) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        let bb = block.raw()?;
        if !block.chain().same_root(&self.inner.context.chain()) {
            return Err(GuardError::mismatch("position_at_end", "block belongs to another context").into());
        }
        let mut position = self.position();
        unsafe { sys::ir_position_builder_at_end(raw, bb) };
        *position = Some(block.clone());
        Ok(())
    }

    /// The block the builder appends to, if positioned.
    pub fn insert_block(&self) -> BindResult<Option<BasicBlock>> {
        self.raw()?;
        Ok(self.position().clone())
    }

    pub fn clear_position(&self) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        let mut position = self.position();
        unsafe { sys::ir_clear_insertion_position(raw) };
        *position = None;
        Ok(())
    }

    /// Builder pointer plus the live block it is positioned at.
    fn insertion(&self, op: &'static str) -> BindResult<(sys::IrBuilderRef, BasicBlock)> {
        let raw = self.raw()?;
        let block = self.position().clone().ok_or(GuardError::NotPositioned { op })?;
        block.check_valid()?;
        Ok((raw, block))
    }

    /// Whether something with token chain `chain` may be referenced from
    /// `block`. Constants and types only need the same context; everything
    /// else must live in the block's module.
    fn local_to(op: &'static str, what: &str, chain: &TokenChain, block: &BasicBlock) -> BindResult<()> {
        if !chain.same_root(block.chain()) {
            return Err(GuardError::mismatch(op, format!("{} belongs to another context", what)).into());
        }
        if chain.len() > 1 && chain != block.chain() {
            return Err(GuardError::mismatch(op, format!("{} belongs to another module", what)).into());
        }
        Ok(())
    }

    fn operand(&self, op: &'static str, block: &BasicBlock, v: &Value) -> BindResult<sys::IrValueRef> {
        let raw = v.raw()?;
        Self::local_to(op, "operand", v.chain(), block)?;
        Ok(raw)
    }

    fn target(&self, op: &'static str, block: &BasicBlock, bb: &BasicBlock) -> BindResult<sys::IrBlockRef> {
        let raw = bb.raw()?;
        Self::local_to(op, "target block", bb.chain(), block)?;
        Ok(raw)
    }

    fn same_types(op: &'static str, lhs: &Type, rhs: &Type) -> BindResult<()> {
        if lhs != rhs {
            return Err(GuardError::mismatch(
                op,
                format!(
                    "operand types differ ({} vs {})",
                    lhs.to_ir_string()?,
                    rhs.to_ir_string()?
                ),
            )
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // Arithmetic and comparison
    // =========================================================================

    fn build_binop(&self, op: &'static str, opcode: Opcode, lhs: &Value, rhs: &Value, name: &str) -> BindResult<Value> {
        let _native = native::enter();
        let (raw, block) = self.insertion(op)?;
        let l = self.operand(op, &block, lhs)?;
        let r = self.operand(op, &block, rhs)?;
        let ty = lhs.type_of()?;
        Self::same_types(op, &ty, &rhs.type_of()?)?;
        ty.require(TypeKind::Integer, op)?;
        let inst = unsafe { sys::ir_build_binop(raw, opcode.to_sys(), l, r, name) };
        Value::wrap(inst, block.chain().clone())
    }

    pub fn build_add(&self, lhs: &Value, rhs: &Value, name: &str) -> BindResult<Value> {
        self.build_binop("build_add", Opcode::Add, lhs, rhs, name)
    }

    pub fn build_sub(&self, lhs: &Value, rhs: &Value, name: &str) -> BindResult<Value> {
        self.build_binop("build_sub", Opcode::Sub, lhs, rhs, name)
    }

    pub fn build_mul(&self, lhs: &Value, rhs: &Value, name: &str) -> BindResult<Value> {
        self.build_binop("build_mul", Opcode::Mul, lhs, rhs, name)
    }

    pub fn build_icmp(&self, pred: IntPredicate, lhs: &Value, rhs: &Value, name: &str) -> BindResult<Value> {
        let _native = native::enter();
        let op = "build_icmp";
        let (raw, block) = self.insertion(op)?;
        let l = self.operand(op, &block, lhs)?;
        let r = self.operand(op, &block, rhs)?;
        let ty = lhs.type_of()?;
        Self::same_types(op, &ty, &rhs.type_of()?)?;
        ty.require(TypeKind::Integer, op)?;
        let inst = unsafe { sys::ir_build_icmp(raw, pred.to_sys(), l, r, name) };
        Value::wrap(inst, block.chain().clone())
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    pub fn build_br(&self, dest: &BasicBlock) -> BindResult<Value> {
        let _native = native::enter();
        let (raw, block) = self.insertion("build_br")?;
        let dest = self.target("build_br", &block, dest)?;
        let inst = unsafe { sys::ir_build_br(raw, dest) };
        Value::wrap(inst, block.chain().clone())
    }

    pub fn build_cond_br(&self, cond: &Value, then_bb: &BasicBlock, else_bb: &BasicBlock) -> BindResult<Value> {
        let _native = native::enter();
        let op = "build_cond_br";
        let (raw, block) = self.insertion(op)?;
        let c = self.operand(op, &block, cond)?;
        let then_raw = self.target(op, &block, then_bb)?;
        let else_raw = self.target(op, &block, else_bb)?;
        let cond_ty = cond.type_of()?;
        if !cond_ty.is_bool()? {
            return Err(GuardError::WrongTypeKind {
                op,
                expected: "an i1 condition".into(),
                actual: cond_ty.to_ir_string()?,
            }
            .into());
        }
        let inst = unsafe { sys::ir_build_cond_br(raw, c, then_raw, else_raw) };
        Value::wrap(inst, block.chain().clone())
    }

    pub fn build_ret(&self, v: &Value) -> BindResult<Value> {
        let _native = native::enter();
        let (raw, block) = self.insertion("build_ret")?;
        let v = self.operand("build_ret", &block, v)?;
        let inst = unsafe { sys::ir_build_ret(raw, v) };
        Value::wrap(inst, block.chain().clone())
    }

    pub fn build_ret_void(&self) -> BindResult<Value> {
        let _native = native::enter();
        let (raw, block) = self.insertion("build_ret_void")?;
        let inst = unsafe { sys::ir_build_ret_void(raw) };
        Value::wrap(inst, block.chain().clone())
    }

    /// Call `callee` with `args`, which must match its parameter types.
    pub fn build_call(&self, callee: &Function, args: &[Value], name: &str) -> BindResult<Value> {
        let _native = native::enter();
        let op = "build_call";
        let (raw, block) = self.insertion(op)?;
        let callee_raw = callee.raw()?;
        Self::local_to(op, "callee", callee.chain(), &block)?;
        let fn_ty = callee.function_type()?;
        let params = fn_ty.param_types()?;
        let vararg = fn_ty.is_vararg()?;
        if args.len() < params.len() || (!vararg && args.len() != params.len()) {
            return Err(GuardError::mismatch(
                op,
                format!("expected {} arguments, got {}", params.len(), args.len()),
            )
            .into());
        }
        let mut raw_args = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            raw_args.push(self.operand(op, &block, arg)?);
            if let Some(param) = params.get(i) {
                let arg_ty = arg.type_of()?;
                if &arg_ty != param {
                    return Err(GuardError::mismatch(
                        op,
                        format!(
                            "argument {} has type {}, expected {}",
                            i,
                            arg_ty.to_ir_string()?,
                            param.to_ir_string()?
                        ),
                    )
                    .into());
                }
            }
        }
        let fn_raw = fn_ty.raw()?;
        let inst = unsafe { sys::ir_build_call(raw, fn_raw, callee_raw, &raw_args, name) };
        Value::wrap(inst, block.chain().clone())
    }
}

impl Managed for Builder {
    const KIND: ObjectKind = ObjectKind::Builder;

    fn check_valid(&self) -> BindResult<()> {
        Builder::check_valid(self)
    }

    fn release(&self, _how: Release) -> BindResult<()> {
        self.dispose()
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("handle", &self.inner.handle)
            .field("position", &*self.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::value::ValueKind;
    use pretty_assertions::assert_eq;

    struct Fixture {
        ctx: Context,
        module: Module,
        builder: Builder,
        func: Function,
        entry: BasicBlock,
    }

    fn fixture() -> Fixture {
        let ctx = Context::create().unwrap();
        let module = Module::create(&ctx, "b").unwrap();
        let builder = Builder::create(&ctx).unwrap();
        let i32t = ctx.int32_type().unwrap();
        let fn_ty = ctx.function_type(&i32t, &[i32t.clone(), i32t.clone()], false).unwrap();
        let func = module.add_function("f", &fn_ty).unwrap();
        let entry = func.append_basic_block("entry").unwrap();
        Fixture {
            ctx,
            module,
            builder,
            func,
            entry,
        }
    }

    #[test]
    fn test_unpositioned_builder_is_guarded() {
        let f = fixture();
        let a = f.func.param(0).unwrap();
        let before = sys::ir_call_count();
        let err = f.builder.build_add(&a, &a, "x").unwrap_err();
        assert_eq!(sys::ir_call_count(), before);
        assert_eq!(err.to_string(), "build_add: builder is not positioned at a basic block");
        f.ctx.dispose().unwrap();
    }

    #[test]
    fn test_build_straight_line_function() {
        let f = fixture();
        f.builder.position_at_end(&f.entry).unwrap();
        assert_eq!(f.builder.insert_block().unwrap(), Some(f.entry.clone()));
        let a = f.func.param(0).unwrap();
        let b = f.func.param(1).unwrap();
        let sum = f.builder.build_add(&a, &b, "sum").unwrap();
        let prod = f.builder.build_mul(&sum, &b, "prod").unwrap();
        let ret = f.builder.build_ret(&prod).unwrap();

        assert_eq!(sum.kind(), ValueKind::Instruction(Opcode::Add));
        assert_eq!(sum.instruction_parent().unwrap(), f.entry);
        assert_eq!(prod.operand(0).unwrap(), sum);
        assert_eq!(f.entry.terminator().unwrap(), Some(ret.clone()));
        assert_eq!(ret.num_successors().unwrap(), 0);
        assert_eq!(f.entry.instructions().unwrap(), vec![sum, prod, ret]);

        let text = f.module.to_ir_string().unwrap();
        assert!(text.contains("%sum = add i32 %0, %1"));
        assert!(text.contains("%prod = mul i32 %sum, %1"));
        f.ctx.dispose().unwrap();
    }

    #[test]
    fn test_operand_type_mismatch() {
        let f = fixture();
        f.builder.position_at_end(&f.entry).unwrap();
        let a = f.func.param(0).unwrap();
        let i8t = f.ctx.int8_type().unwrap();
        let small = f.ctx.const_int(&i8t, 1, false).unwrap();
        let err = f.builder.build_sub(&a, &small, "").unwrap_err();
        assert_eq!(err.to_string(), "build_sub: operand types differ (i32 vs i8)");
        f.ctx.dispose().unwrap();
    }

    #[test]
    fn test_conditional_branch() {
        let f = fixture();
        let then_bb = f.func.append_basic_block("then").unwrap();
        let else_bb = f.func.append_basic_block("else").unwrap();
        f.builder.position_at_end(&f.entry).unwrap();
        let a = f.func.param(0).unwrap();
        let b = f.func.param(1).unwrap();

        let err = f.builder.build_cond_br(&a, &then_bb, &else_bb).unwrap_err();
        assert!(err.to_string().contains("i1 condition"));

        let cmp = f.builder.build_icmp(IntPredicate::Slt, &a, &b, "lt").unwrap();
        assert_eq!(cmp.icmp_predicate().unwrap(), IntPredicate::Slt);
        let br = f.builder.build_cond_br(&cmp, &then_bb, &else_bb).unwrap();
        assert!(br.is_conditional().unwrap());
        assert_eq!(br.condition().unwrap(), cmp);
        assert_eq!(br.num_successors().unwrap(), 2);
        assert_eq!(br.successor(1).unwrap(), else_bb);
        assert!(br.successor(2).unwrap_err().is_precondition_violation());

        f.builder.position_at_end(&then_bb).unwrap();
        let jump = f.builder.build_br(&else_bb).unwrap();
        assert!(!jump.is_conditional().unwrap());
        assert!(jump.condition().unwrap_err().is_precondition_violation());
        f.ctx.dispose().unwrap();
    }

    #[test]
    fn test_call_arity_and_types() {
        let f = fixture();
        f.builder.position_at_end(&f.entry).unwrap();
        let a = f.func.param(0).unwrap();
        let err = f.builder.build_call(&f.func, &[a.clone()], "r").unwrap_err();
        assert_eq!(err.to_string(), "build_call: expected 2 arguments, got 1");

        let i8t = f.ctx.int8_type().unwrap();
        let byte = f.ctx.const_int(&i8t, 7, false).unwrap();
        let err = f.builder.build_call(&f.func, &[a.clone(), byte], "r").unwrap_err();
        assert!(err.to_string().contains("argument 1 has type i8, expected i32"));

        let call = f.builder.build_call(&f.func, &[a.clone(), a], "r").unwrap();
        assert_eq!(call.opcode().unwrap(), Opcode::Call);
        assert_eq!(call.type_of().unwrap(), f.ctx.int32_type().unwrap());
        f.ctx.dispose().unwrap();
    }

    #[test]
    fn test_position_in_disposed_module() {
        let f = fixture();
        f.builder.position_at_end(&f.entry).unwrap();
        f.module.dispose().unwrap();
        let before = sys::ir_call_count();
        let err = f.builder.build_ret_void().unwrap_err();
        assert_eq!(sys::ir_call_count(), before);
        assert!(err.is_use_after_free());
        // the builder itself is still fine
        f.builder.clear_position().unwrap();
        assert_eq!(f.builder.insert_block().unwrap(), None);
        f.ctx.dispose().unwrap();
    }
}
