//! Basic block handles

use crate::error::{BindResult, GuardError};
use crate::function::Function;
use crate::handle::{DerivedHandle, ObjectKind};
use crate::native;
use crate::token::TokenChain;
use crate::value::Value;
use irbind_sys as sys;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Handle to a basic block inside a function
#[derive(Clone)]
pub struct BasicBlock {
    raw: DerivedHandle<sys::IrBlock>,
}

impl BasicBlock {
    pub(crate) fn wrap(raw: sys::IrBlockRef, chain: TokenChain) -> BindResult<BasicBlock> {
        Ok(BasicBlock {
            raw: DerivedHandle::new(raw, chain, ObjectKind::BasicBlock)?,
        })
    }

    pub(crate) fn wrap_opt(raw: sys::IrBlockRef, chain: &TokenChain) -> BindResult<Option<BasicBlock>> {
        if raw.is_null() {
            return Ok(None);
        }
        BasicBlock::wrap(raw, chain.clone()).map(Some)
    }

    pub(crate) fn raw(&self) -> BindResult<sys::IrBlockRef> {
        Ok(self.raw.check_valid(ObjectKind::BasicBlock)?)
    }

    pub fn check_valid(&self) -> BindResult<()> {
        self.raw().map(|_| ())
    }

    pub fn chain(&self) -> &TokenChain {
        self.raw.chain()
    }

    pub fn name(&self) -> BindResult<String> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_get_basic_block_name(raw) })
    }

    pub fn parent(&self) -> BindResult<Function> {
        let _native = native::enter();
        let raw = self.raw()?;
        Function::wrap(unsafe { sys::ir_get_basic_block_parent(raw) }, self.chain().clone())
    }

    pub fn next_block(&self) -> BindResult<Option<BasicBlock>> {
        let _native = native::enter();
        let raw = self.raw()?;
        BasicBlock::wrap_opt(unsafe { sys::ir_get_next_basic_block(raw) }, self.chain())
    }

    pub fn prev_block(&self) -> BindResult<Option<BasicBlock>> {
        let _native = native::enter();
        let raw = self.raw()?;
        BasicBlock::wrap_opt(unsafe { sys::ir_get_previous_basic_block(raw) }, self.chain())
    }

    /// The terminator, or `None` while the block is still open.
    pub fn terminator(&self) -> BindResult<Option<Value>> {
        let _native = native::enter();
        let raw = self.raw()?;
        Value::wrap_opt(unsafe { sys::ir_get_basic_block_terminator(raw) }, self.chain())
    }

    pub fn first_instruction(&self) -> BindResult<Option<Value>> {
        let _native = native::enter();
        let raw = self.raw()?;
        Value::wrap_opt(unsafe { sys::ir_get_first_instruction(raw) }, self.chain())
    }

    pub fn last_instruction(&self) -> BindResult<Option<Value>> {
        let _native = native::enter();
        let raw = self.raw()?;
        Value::wrap_opt(unsafe { sys::ir_get_last_instruction(raw) }, self.chain())
    }

    pub fn instructions(&self) -> BindResult<Vec<Value>> {
        let _native = native::enter();
        let mut out = Vec::new();
        let mut next = self.first_instruction()?;
        while let Some(inst) = next {
            next = inst.next_instruction()?;
            out.push(inst);
        }
        Ok(out)
    }

    fn same_function(&self, op: &'static str, anchor: &BasicBlock) -> BindResult<(sys::IrBlockRef, sys::IrBlockRef)> {
        let _native = native::enter();
        let raw = self.raw()?;
        let anchor_raw = anchor.raw()?;
        let parents = unsafe {
            (
                sys::ir_get_basic_block_parent(raw),
                sys::ir_get_basic_block_parent(anchor_raw),
            )
        };
        if parents.0 != parents.1 {
            return Err(GuardError::mismatch(op, "blocks belong to different functions").into());
        }
        Ok((raw, anchor_raw))
    }

    pub fn move_before(&self, anchor: &BasicBlock) -> BindResult<()> {
        let _native = native::enter();
        let (raw, anchor) = self.same_function("move_before", anchor)?;
        unsafe { sys::ir_move_basic_block_before(raw, anchor) };
        Ok(())
    }

    pub fn move_after(&self, anchor: &BasicBlock) -> BindResult<()> {
        let _native = native::enter();
        let (raw, anchor) = self.same_function("move_after", anchor)?;
        unsafe { sys::ir_move_basic_block_after(raw, anchor) };
        Ok(())
    }

    pub fn as_value(&self) -> BindResult<Value> {
        let _native = native::enter();
        let raw = self.raw()?;
        Value::wrap(unsafe { sys::ir_basic_block_as_value(raw) }, self.chain().clone())
    }
}

impl PartialEq for BasicBlock {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for BasicBlock {}

impl Hash for BasicBlock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Debug for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BasicBlock({:?})", self.raw)
    }
}
