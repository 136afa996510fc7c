//! Type handles
//!
//! Types are uniqued per context and live exactly as long as it does, so a
//! [`Type`] carries only the context token.

use crate::error::{BindResult, GuardError};
use crate::handle::{DerivedHandle, ObjectKind};
use crate::native;
use crate::token::TokenChain;
use irbind_sys as sys;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TypeKind {
    Void,
    Integer,
    Pointer,
    Function,
    Struct,
}

impl From<sys::IrTypeKind> for TypeKind {
    fn from(kind: sys::IrTypeKind) -> Self {
        match kind {
            sys::IrTypeKind::Void => TypeKind::Void,
            sys::IrTypeKind::Integer => TypeKind::Integer,
            sys::IrTypeKind::Pointer => TypeKind::Pointer,
            sys::IrTypeKind::Function => TypeKind::Function,
            sys::IrTypeKind::Struct => TypeKind::Struct,
        }
    }
}

/// Handle to a native type
///
/// The kind is read once when the handle is created; kind-specific
/// accessors check it before calling into the library.
#[derive(Clone)]
pub struct Type {
    raw: DerivedHandle<sys::IrType>,
    kind: TypeKind,
}

impl Type {
    /// Wrap a native type pointer owned by the context at the root of `chain`.
    pub(crate) fn wrap(raw: sys::IrTypeRef, chain: TokenChain) -> BindResult<Type> {
        let _native = native::enter();
        let raw = DerivedHandle::new(raw, chain.root(), ObjectKind::Type)?;
        let ptr = raw.check_valid(ObjectKind::Type)?;
        let kind = unsafe { sys::ir_type_kind(ptr) }.into();
        Ok(Type { raw, kind })
    }

    /// Wrap a native type pointer obtained outside this crate.
    ///
    /// # Safety
    /// `raw` must be a live type of the context whose token is at the root of
    /// `chain`.
    pub unsafe fn from_raw(raw: sys::IrTypeRef, chain: TokenChain) -> BindResult<Type> {
        Type::wrap(raw, chain)
    }

    pub(crate) fn raw(&self) -> BindResult<sys::IrTypeRef> {
        Ok(self.raw.check_valid(ObjectKind::Type)?)
    }

    pub fn check_valid(&self) -> BindResult<()> {
        self.raw().map(|_| ())
    }

    pub fn chain(&self) -> &TokenChain {
        self.raw.chain()
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub(crate) fn require(&self, kind: TypeKind, op: &'static str) -> BindResult<()> {
        if self.kind != kind {
            return Err(GuardError::WrongTypeKind {
                op,
                expected: kind.to_string(),
                actual: self.kind.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Validity first, then kind.
    fn guarded(&self, kind: TypeKind, op: &'static str) -> BindResult<sys::IrTypeRef> {
        let raw = self.raw()?;
        self.require(kind, op)?;
        Ok(raw)
    }

    fn wrap_related(&self, raw: sys::IrTypeRef) -> BindResult<Type> {
        Type::wrap(raw, self.chain().clone())
    }

    pub fn is_same_context(&self, other: &Type) -> bool {
        self.chain().same_root(other.chain())
    }

    /// True for `i1`.
    pub fn is_bool(&self) -> BindResult<bool> {
        Ok(self.kind == TypeKind::Integer && self.int_width()? == 1)
    }

    pub fn int_width(&self) -> BindResult<u32> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Integer, "int_width")?;
        Ok(unsafe { sys::ir_int_type_width(raw) })
    }

    // =========================================================================
    // Function types
    // =========================================================================

    pub fn return_type(&self) -> BindResult<Type> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Function, "return_type")?;
        self.wrap_related(unsafe { sys::ir_function_return_type(raw) })
    }

    pub fn param_count(&self) -> BindResult<u32> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Function, "param_count")?;
        Ok(unsafe { sys::ir_function_param_count(raw) })
    }

    pub fn param_types(&self) -> BindResult<Vec<Type>> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Function, "param_types")?;
        unsafe { sys::ir_function_param_types(raw) }
            .into_iter()
            .map(|p| self.wrap_related(p))
            .collect()
    }

    pub fn is_vararg(&self) -> BindResult<bool> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Function, "is_vararg")?;
        Ok(unsafe { sys::ir_function_is_vararg(raw) })
    }

    // =========================================================================
    // Struct types
    // =========================================================================

    pub fn element_count(&self) -> BindResult<u32> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Struct, "element_count")?;
        Ok(unsafe { sys::ir_struct_element_count(raw) })
    }

    pub fn element_type(&self, index: u32) -> BindResult<Type> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Struct, "element_type")?;
        let len = unsafe { sys::ir_struct_element_count(raw) };
        if index >= len {
            return Err(GuardError::IndexOutOfRange {
                op: "element_type",
                index,
                len,
            }
            .into());
        }
        self.wrap_related(unsafe { sys::ir_struct_element_type(raw, index) })
    }

    /// Name of a named struct, `None` for a literal struct.
    pub fn struct_name(&self) -> BindResult<Option<String>> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Struct, "struct_name")?;
        Ok(unsafe { sys::ir_struct_name(raw) })
    }

    pub fn is_packed(&self) -> BindResult<bool> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Struct, "is_packed")?;
        Ok(unsafe { sys::ir_struct_is_packed(raw) })
    }

    pub fn is_opaque(&self) -> BindResult<bool> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Struct, "is_opaque")?;
        Ok(unsafe { sys::ir_struct_is_opaque(raw) })
    }

    /// Give an opaque named struct its elements. A body can be set once.
    pub fn set_struct_body(&self, elements: &[Type], packed: bool) -> BindResult<()> {
        let _native = native::enter();
        let raw = self.guarded(TypeKind::Struct, "set_struct_body")?;
        let mut raw_elements = Vec::with_capacity(elements.len());
        for e in elements {
            let element = e.raw()?;
            if !self.is_same_context(e) {
                return Err(
                    GuardError::mismatch("set_struct_body", "element type belongs to another context").into(),
                );
            }
            raw_elements.push(element);
        }
        if !unsafe { sys::ir_struct_is_opaque(raw) } {
            return Err(GuardError::mismatch("set_struct_body", "struct body already set").into());
        }
        unsafe { sys::ir_struct_set_body(raw, &raw_elements, packed) };
        Ok(())
    }

    /// Textual form, e.g. `i32` or `{ i8, ptr }`.
    pub fn to_ir_string(&self) -> BindResult<String> {
        let _native = native::enter();
        let raw = self.raw()?;
        Ok(unsafe { sys::ir_print_type_to_string(raw) })
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({}, {:?})", self.kind, self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_guards_stop_native_calls() {
        let ctx = Context::create().unwrap();
        let i32t = ctx.int32_type().unwrap();

        let before = sys::ir_call_count();
        let err = i32t.element_count().unwrap_err();
        assert_eq!(sys::ir_call_count(), before);
        assert_eq!(
            err.to_string(),
            "element_count requires struct type, but the type is integer"
        );
        assert!(i32t.return_type().unwrap_err().is_precondition_violation());
        assert!(ctx.void_type().unwrap().int_width().is_err());
        ctx.dispose().unwrap();
    }

    #[test]
    fn test_function_type_accessors() {
        let ctx = Context::create().unwrap();
        let i8t = ctx.int8_type().unwrap();
        let ptr = ctx.pointer_type().unwrap();
        let fn_ty = ctx.function_type(&i8t, &[ptr.clone()], true).unwrap();
        assert_eq!(fn_ty.return_type().unwrap(), i8t);
        assert_eq!(fn_ty.param_types().unwrap(), vec![ptr]);
        assert!(fn_ty.is_vararg().unwrap());
        assert_eq!(fn_ty.to_ir_string().unwrap(), "i8 (ptr, ...)");
        ctx.dispose().unwrap();
    }

    #[test]
    fn test_struct_body() {
        let ctx = Context::create().unwrap();
        let node = ctx.named_struct_type("node").unwrap();
        assert!(node.is_opaque().unwrap());
        let i64t = ctx.int64_type().unwrap();
        let ptr = ctx.pointer_type().unwrap();
        node.set_struct_body(&[i64t.clone(), ptr], false).unwrap();
        assert!(!node.is_opaque().unwrap());
        assert_eq!(node.element_count().unwrap(), 2);
        assert_eq!(node.element_type(0).unwrap(), i64t);

        let err = node.element_type(2).unwrap_err();
        assert!(err.to_string().contains("index 2 out of range"));
        let err = node.set_struct_body(&[], false).unwrap_err();
        assert!(err.to_string().contains("already set"));
        ctx.dispose().unwrap();
    }

    #[test]
    fn test_literal_struct() {
        let ctx = Context::create().unwrap();
        let i1 = ctx.int1_type().unwrap();
        let packed = ctx.struct_type(&[i1.clone(), i1], true).unwrap();
        assert!(packed.is_packed().unwrap());
        assert_eq!(packed.struct_name().unwrap(), None);
        assert_eq!(packed.to_ir_string().unwrap(), "<{ i1, i1 }>");
        ctx.dispose().unwrap();
    }
}
