use crate::{
    enter_call, IrBlockRef, IrIntPredicate, IrModuleRef, IrOpcode, IrTypeKind, IrTypeRef,
    IrValueKind, IrValueRef,
};
use std::collections::HashMap;
use std::fmt::Write;

pub unsafe fn ir_print_type_to_string(ty: IrTypeRef) -> String {
    enter_call();
    type_str(ty)
}

pub unsafe fn ir_print_module_to_string(m: IrModuleRef) -> String {
    enter_call();
    let m = &*m;
    let mut out = String::new();
    let _ = writeln!(out, "; ModuleID = '{}'", m.name);
    let _ = writeln!(out, "source_filename = \"{}\"", m.source_filename);
    if !m.data_layout.is_empty() {
        let _ = writeln!(out, "target datalayout = \"{}\"", m.data_layout);
    }
    if !m.triple.is_empty() {
        let _ = writeln!(out, "target triple = \"{}\"", m.triple);
    }
    for g in &m.globals {
        let _ = writeln!(
            out,
            "\n@{} = global {} zeroinitializer",
            (*(*g)).name,
            type_str((*(*g)).value_ty)
        );
    }
    for f in &m.functions {
        out.push('\n');
        print_function(&mut out, *f);
    }
    out
}

unsafe fn type_str(ty: IrTypeRef) -> String {
    let t = &*ty;
    match t.kind {
        IrTypeKind::Void => "void".to_string(),
        IrTypeKind::Integer => format!("i{}", t.width),
        IrTypeKind::Pointer => "ptr".to_string(),
        IrTypeKind::Function => {
            let mut params: Vec<String> = t.params.iter().map(|p| type_str(*p)).collect();
            if t.vararg {
                params.push("...".to_string());
            }
            format!("{} ({})", type_str(t.ret), params.join(", "))
        }
        IrTypeKind::Struct => {
            if let Some(name) = &t.name {
                return format!("%{}", name);
            }
            let elems: Vec<String> = t.elements.iter().map(|e| type_str(*e)).collect();
            if t.packed {
                format!("<{{ {} }}>", elems.join(", "))
            } else {
                format!("{{ {} }}", elems.join(", "))
            }
        }
    }
}

fn predicate_str(p: IrIntPredicate) -> &'static str {
    match p {
        IrIntPredicate::Eq => "eq",
        IrIntPredicate::Ne => "ne",
        IrIntPredicate::Ugt => "ugt",
        IrIntPredicate::Uge => "uge",
        IrIntPredicate::Ult => "ult",
        IrIntPredicate::Ule => "ule",
        IrIntPredicate::Sgt => "sgt",
        IrIntPredicate::Sge => "sge",
        IrIntPredicate::Slt => "slt",
        IrIntPredicate::Sle => "sle",
    }
}

struct Slots {
    names: HashMap<usize, String>,
    next: u32,
}

impl Slots {
    fn assign(&mut self, key: usize, name: &str) {
        let label = if name.is_empty() {
            let n = self.next;
            self.next += 1;
            n.to_string()
        } else {
            name.to_string()
        };
        self.names.insert(key, label);
    }

    fn get(&self, key: usize) -> String {
        self.names.get(&key).cloned().unwrap_or_else(|| "?".to_string())
    }
}

unsafe fn operand(v: IrValueRef, slots: &Slots) -> String {
    let val = &*v;
    match val.kind {
        IrValueKind::ConstantInt => {
            if (*val.ty).width == 1 {
                (if val.bits == 1 { "true" } else { "false" }).to_string()
            } else {
                crate::ir_const_int_sext_value(v).to_string()
            }
        }
        IrValueKind::Function | IrValueKind::GlobalVariable => format!("@{}", val.name),
        IrValueKind::BasicBlock => format!("%{}", slots.get(val.block as usize)),
        IrValueKind::Argument | IrValueKind::Instruction => format!("%{}", slots.get(v as usize)),
    }
}

unsafe fn typed(v: IrValueRef, slots: &Slots) -> String {
    format!("{} {}", type_str((*v).ty), operand(v, slots))
}

unsafe fn label(bb: IrBlockRef, slots: &Slots) -> String {
    format!("label %{}", slots.get(bb as usize))
}

unsafe fn print_function(out: &mut String, f: IrValueRef) {
    let func = &*f;
    let Some(body) = func.body.as_ref() else {
        return;
    };
    let fn_ty = &*body.fn_ty;
    let mut slots = Slots {
        names: HashMap::new(),
        next: 0,
    };
    for p in &body.params {
        slots.assign(*p as usize, &(*(*p)).name);
    }
    for bb in &body.blocks {
        slots.assign(*bb as usize, &(*(*bb)).name);
        for inst in &(*(*bb)).instructions {
            if (*(*(*inst)).ty).kind != IrTypeKind::Void {
                slots.assign(*inst as usize, &(*(*inst)).name);
            }
        }
    }

    let params: Vec<String> = body.params.iter().map(|p| typed(*p, &slots)).collect();
    let keyword = if body.blocks.is_empty() { "declare" } else { "define" };
    let _ = write!(out, "{} {} @{}({})", keyword, type_str(fn_ty.ret), func.name, params.join(", "));
    if body.blocks.is_empty() {
        out.push('\n');
        return;
    }
    out.push_str(" {\n");
    for (i, bb) in body.blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}:", slots.get(*bb as usize));
        for inst in &(*(*bb)).instructions {
            let _ = writeln!(out, "  {}", instruction_str(*inst, &slots));
        }
    }
    out.push_str("}\n");
}

unsafe fn instruction_str(v: IrValueRef, slots: &Slots) -> String {
    let inst = &*v;
    let ops = &inst.operands;
    let lhs = if (*inst.ty).kind != IrTypeKind::Void {
        format!("%{} = ", slots.get(v as usize))
    } else {
        String::new()
    };
    let body = match inst.opcode {
        Some(op @ (IrOpcode::Add | IrOpcode::Sub | IrOpcode::Mul)) => {
            let mnemonic = match op {
                IrOpcode::Add => "add",
                IrOpcode::Sub => "sub",
                _ => "mul",
            };
            format!("{} {}, {}", mnemonic, typed(ops[0], slots), operand(ops[1], slots))
        }
        Some(IrOpcode::ICmp) => format!(
            "icmp {} {}, {}",
            inst.predicate.map(predicate_str).unwrap_or("eq"),
            typed(ops[0], slots),
            operand(ops[1], slots)
        ),
        Some(IrOpcode::Br) if ops.is_empty() => format!("br {}", label(inst.targets[0], slots)),
        Some(IrOpcode::Br) => format!(
            "br {}, {}, {}",
            typed(ops[0], slots),
            label(inst.targets[0], slots),
            label(inst.targets[1], slots)
        ),
        Some(IrOpcode::Ret) if ops.is_empty() => "ret void".to_string(),
        Some(IrOpcode::Ret) => format!("ret {}", typed(ops[0], slots)),
        Some(IrOpcode::Call) => {
            let (callee, args) = ops.split_at(ops.len() - 1);
            let args: Vec<String> = args.iter().map(|a| typed(*a, slots)).collect();
            format!(
                "call {} {}({})",
                type_str(inst.ty),
                operand(callee[0], slots),
                args.join(", ")
            )
        }
        None => "<invalid>".to_string(),
    };
    format!("{}{}", lhs, body)
}
