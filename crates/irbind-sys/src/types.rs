use crate::{enter_call, IrContextRef, IrTypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrTypeKind {
    Void,
    Integer,
    Pointer,
    Function,
    Struct,
}

pub struct IrType {
    pub(crate) kind: IrTypeKind,
    pub(crate) context: IrContextRef,
    pub(crate) width: u32,
    pub(crate) ret: IrTypeRef,
    pub(crate) params: Vec<IrTypeRef>,
    pub(crate) vararg: bool,
    pub(crate) elements: Vec<IrTypeRef>,
    pub(crate) packed: bool,
    pub(crate) name: Option<String>,
    pub(crate) opaque: bool,
}

impl IrType {
    pub(crate) fn blank(context: IrContextRef, kind: IrTypeKind) -> Self {
        Self {
            kind,
            context,
            width: 0,
            ret: std::ptr::null_mut(),
            params: Vec::new(),
            vararg: false,
            elements: Vec::new(),
            packed: false,
            name: None,
            opaque: false,
        }
    }
}

pub unsafe fn ir_type_kind(ty: IrTypeRef) -> IrTypeKind {
    enter_call();
    (*ty).kind
}

pub unsafe fn ir_type_context(ty: IrTypeRef) -> IrContextRef {
    enter_call();
    (*ty).context
}

pub unsafe fn ir_int_type_width(ty: IrTypeRef) -> u32 {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Integer, "ir_int_type_width: not an integer type");
    (*ty).width
}

pub unsafe fn ir_function_return_type(ty: IrTypeRef) -> IrTypeRef {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Function, "ir_function_return_type: not a function type");
    (*ty).ret
}

pub unsafe fn ir_function_param_count(ty: IrTypeRef) -> u32 {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Function, "ir_function_param_count: not a function type");
    (*ty).params.len() as u32
}

pub unsafe fn ir_function_param_types(ty: IrTypeRef) -> Vec<IrTypeRef> {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Function, "ir_function_param_types: not a function type");
    (*ty).params.clone()
}

pub unsafe fn ir_function_is_vararg(ty: IrTypeRef) -> bool {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Function, "ir_function_is_vararg: not a function type");
    (*ty).vararg
}

pub unsafe fn ir_struct_element_count(ty: IrTypeRef) -> u32 {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Struct, "ir_struct_element_count: not a struct type");
    (*ty).elements.len() as u32
}

pub unsafe fn ir_struct_element_type(ty: IrTypeRef, index: u32) -> IrTypeRef {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Struct, "ir_struct_element_type: not a struct type");
    let elements = &(*ty).elements;
    assert!((index as usize) < elements.len(), "ir_struct_element_type: index out of range");
    elements[index as usize]
}

pub unsafe fn ir_struct_name(ty: IrTypeRef) -> Option<String> {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Struct, "ir_struct_name: not a struct type");
    (*ty).name.clone()
}

pub unsafe fn ir_struct_is_packed(ty: IrTypeRef) -> bool {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Struct, "ir_struct_is_packed: not a struct type");
    (*ty).packed
}

pub unsafe fn ir_struct_is_opaque(ty: IrTypeRef) -> bool {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Struct, "ir_struct_is_opaque: not a struct type");
    (*ty).opaque
}

/// Gives an opaque named struct its body. Literal structs and structs that
/// already have a body are rejected.
pub unsafe fn ir_struct_set_body(ty: IrTypeRef, elements: &[IrTypeRef], packed: bool) {
    enter_call();
    assert!((*ty).kind == IrTypeKind::Struct, "ir_struct_set_body: not a struct type");
    assert!((*ty).opaque, "ir_struct_set_body: struct body already set");
    (*ty).elements = elements.to_vec();
    (*ty).packed = packed;
    (*ty).opaque = false;
}
