//! Function handles
//!
//! Functions live inside a module, so a [`Function`] carries the context and
//! module tokens. Parameters and blocks obtained from it inherit that chain.

use crate::block::BasicBlock;
use crate::error::{BindResult, GuardError};
use crate::handle::{DerivedHandle, ObjectKind};
use crate::native;
use crate::token::TokenChain;
use crate::types::Type;
use crate::value::Value;
use irbind_sys as sys;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Linkage {
    External,
    Internal,
    Private,
}

impl From<sys::IrLinkage> for Linkage {
    fn from(linkage: sys::IrLinkage) -> Self {
        match linkage {
            sys::IrLinkage::External => Linkage::External,
            sys::IrLinkage::Internal => Linkage::Internal,
            sys::IrLinkage::Private => Linkage::Private,
        }
    }
}

impl From<Linkage> for sys::IrLinkage {
    fn from(linkage: Linkage) -> Self {
        match linkage {
            Linkage::External => sys::IrLinkage::External,
            Linkage::Internal => sys::IrLinkage::Internal,
            Linkage::Private => sys::IrLinkage::Private,
        }
    }
}

/// Handle to a function in a module
#[derive(Clone)]
pub struct Function {
    raw: DerivedHandle<sys::IrValue>,
}

impl Function {
    pub(crate) fn wrap(raw: sys::IrValueRef, chain: TokenChain) -> BindResult<Function> {
        Ok(Function {
            raw: DerivedHandle::new(raw, chain, ObjectKind::Function)?,
        })
    }

    pub(crate) fn wrap_opt(raw: sys::IrValueRef, chain: &TokenChain) -> BindResult<Option<Function>> {
        if raw.is_null() {
            return Ok(None);
        }
        Function::wrap(raw, chain.clone()).map(Some)
    }

    pub(crate) fn raw(&self) -> BindResult<sys::IrValueRef> {
        Ok(self.raw.check_valid(ObjectKind::Function)?)
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
        Ok(unsafe { sys::ir_get_value_name(raw) })
    }

    pub fn function_type(&self) -> BindResult<Type> {
        let _native = native::enter();
        let raw = self.raw()?;
        Type::wrap(unsafe { sys::ir_function_value_type(raw) }, self.chain().clone())
    }

    pub fn return_type(&self) -> BindResult<Type> {
        self.function_type()?.return_type()
    }

    pub fn as_value(&self) -> BindResult<Value> {
        let raw = self.raw()?;
        Value::wrap(raw, self.chain().clone())
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    pub fn param_count(&self) -> BindResult<u32> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_count_params(raw) })
    }

    pub fn param(&self, index: u32) -> BindResult<Value> {
        let _native = native::enter();
        let raw = self.raw()?;
        let len = unsafe { sys::ir_count_params(raw) };
        if index >= len {
            return Err(GuardError::IndexOutOfRange {
                op: "param",
                index,
                len,
            }
            .into());
        }
        Value::wrap(unsafe { sys::ir_get_param(raw, index) }, self.chain().clone())
    }

    pub fn params(&self) -> BindResult<Vec<Value>> {
        (0..self.param_count()?).map(|i| self.param(i)).collect()
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    pub fn append_basic_block(&self, name: &str) -> BindResult<BasicBlock> {
        let _native = native::enter();
        let raw = self.raw()?;
        BasicBlock::wrap(unsafe { sys::ir_append_basic_block(raw, name) }, self.chain().clone())
    }

    pub fn basic_block_count(&self) -> BindResult<u32> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_count_basic_blocks(raw) })
    }

    pub fn entry_block(&self) -> BindResult<Option<BasicBlock>> {
        let _native = native::enter();
        let raw = self.raw()?;
        BasicBlock::wrap_opt(unsafe { sys::ir_get_first_basic_block(raw) }, self.chain())
    }

    pub fn last_block(&self) -> BindResult<Option<BasicBlock>> {
        let _native = native::enter();
        let raw = self.raw()?;
        BasicBlock::wrap_opt(unsafe { sys::ir_get_last_basic_block(raw) }, self.chain())
    }

    pub fn basic_blocks(&self) -> BindResult<Vec<BasicBlock>> {
        let _native = native::enter();
        let mut blocks = Vec::new();
        let mut next = self.entry_block()?;
        while let Some(bb) = next {
            next = bb.next_block()?;
            blocks.push(bb);
        }
        Ok(blocks)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn linkage(&self) -> BindResult<Linkage> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_get_linkage(raw) }.into())
    }

    pub fn set_linkage(&self, linkage: Linkage) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        unsafe { sys::ir_set_linkage(raw, linkage.into()) };
        Ok(())
    }

    pub fn calling_conv(&self) -> BindResult<u32> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_get_call_conv(raw) })
    }

    pub fn set_calling_conv(&self, cc: u32) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.raw()?;
        unsafe { sys::ir_set_call_conv(raw, cc) };
        Ok(())
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Function {}

impl Hash for Function {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({:?})", self.raw)
    }
}
