//! disasm.rs — désassembleur texte, utilisé par `--disassemble` et par
//! `DEBUG_PRINT_CODE`/`DEBUG_TRACE_EXECUTION` côté VM.

use crate::chunk::{describe_upvalues, Chunk};
use crate::heap::Heap;
use crate::op::Op;

pub fn disassemble_chunk(chunk: &Chunk, heap: &Heap, name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("== {name} ==\n"));
    for (offset, op) in chunk.ops().iter().enumerate() {
        out.push_str(&disassemble_instruction(chunk, heap, offset, op));
        out.push('\n');
    }
    out
}

pub fn disassemble_instruction(chunk: &Chunk, heap: &Heap, offset: usize, op: &Op) -> String {
    let line = chunk.line_at(offset);
    let line_col = if offset > 0 && chunk.line_at(offset - 1) == line {
        "   |".to_string()
    } else {
        format!("{line:4}")
    };
    let prefix = format!("{offset:04} {line_col} ");

    match op {
        Op::Constant(idx) => format_const(&prefix, op, chunk, heap, usize::from(*idx)),
        Op::ConstantLong(idx) => format_const(&prefix, op, chunk, heap, *idx as usize),
        Op::GetLocal(s) | Op::SetLocal(s) => format!("{prefix}{:<18} {s}", op.mnemonic()),
        Op::GetUpvalue(s) | Op::SetUpvalue(s) => format!("{prefix}{:<18} {s}", op.mnemonic()),
        Op::GetGlobal(idx) | Op::DefineGlobal(idx) | Op::SetGlobal(idx) => {
            format_const(&prefix, op, chunk, heap, usize::from(*idx))
        }
        Op::GetProperty(idx) | Op::SetProperty(idx) | Op::GetSuper(idx) | Op::Class(idx) | Op::Method(idx) => {
            format_const(&prefix, op, chunk, heap, usize::from(*idx))
        }
        Op::Jump(d) => format!("{prefix}{:<18} -> {}", op.mnemonic(), offset as isize + 1 + isize::from(*d)),
        Op::JumpIfFalse(d) => format!("{prefix}{:<18} -> {}", op.mnemonic(), offset as isize + 1 + isize::from(*d)),
        Op::Loop(d) => format!("{prefix}{:<18} -> {}", op.mnemonic(), offset as isize + 1 - isize::from(*d)),
        Op::Call(argc) => format!("{prefix}{:<18} ({argc} args)", op.mnemonic()),
        Op::Invoke(idx, argc) | Op::SuperInvoke(idx, argc) => {
            let name = const_display(chunk, heap, usize::from(*idx));
            format!("{prefix}{:<18} ({argc} args) {name}", op.mnemonic())
        }
        Op::Closure(idx, caps) => {
            let name = const_display(chunk, heap, *idx as usize);
            if caps.is_empty() {
                format!("{prefix}{:<18} {name}", op.mnemonic())
            } else {
                format!("{prefix}{:<18} {name}  [{}]", op.mnemonic(), describe_upvalues(caps))
            }
        }
        _ => format!("{prefix}{}", op.mnemonic()),
    }
}

fn format_const(prefix: &str, op: &Op, chunk: &Chunk, heap: &Heap, idx: usize) -> String {
    format!("{prefix}{:<18} {idx:4} '{}'", op.mnemonic(), const_display(chunk, heap, idx))
}

fn const_display(chunk: &Chunk, heap: &Heap, idx: usize) -> String {
    chunk.constants().get(idx).map_or_else(|| "?".to_string(), |v| v.display(heap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn disassembles_a_simple_chunk() {
        let mut heap = Heap::new();
        let mut chunk = Chunk::new(None);
        chunk.write_constant(Value::Number(1.0), 123).unwrap();
        chunk.write_op(Op::Return, 123);
        let out = chunk.disassemble(&heap, "test");
        assert!(out.contains("== test =="));
        assert!(out.contains("OP_CONSTANT"));
        assert!(out.contains("OP_RETURN"));
        let _ = &mut heap;
    }
}
