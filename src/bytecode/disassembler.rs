//! Bytecode disassembler for debugging.

use std::fmt::Write;

use crate::bytecode::chunk::{Chunk, Constant};
use crate::bytecode::instruction::Instr;

/// Disassemble a chunk and its nested chunks into readable output.
pub fn disassemble(chunk: &Chunk) -> String {
    let mut output = String::new();
    disassemble_into(chunk, "main", &mut output);
    output
}

fn disassemble_into(chunk: &Chunk, name: &str, output: &mut String) {
    writeln!(
        output,
        "== {} (params: {}, locals: {}{}) ==",
        name,
        chunk.num_params,
        chunk.num_locals,
        if chunk.is_vararg { ", vararg" } else { "" }
    )
    .unwrap();

    for (offset, instr) in chunk.code.iter().enumerate() {
        disassemble_instruction(chunk, offset, *instr, output);
    }

    for (i, proto) in chunk.protos.iter().enumerate() {
        writeln!(output).unwrap();
        disassemble_into(proto, &format!("{}:proto[{}]", name, i), output);
    }
}

fn disassemble_instruction(chunk: &Chunk, offset: usize, instr: Instr, output: &mut String) {
    write!(output, "{:04} {:<10}", offset, instr.mnemonic()).unwrap();

    match instr {
        Instr::LoadK(idx) => {
            writeln!(output, " {} ({})", idx, constant_str(chunk, idx)).unwrap()
        }
        Instr::LoadBool(b) => writeln!(output, " {}", b).unwrap(),

        Instr::GetGlobal(idx)
        | Instr::SetGlobal(idx)
        | Instr::GetField(idx)
        | Instr::SetField(idx)
        | Instr::SelfField(idx) => {
            writeln!(output, " {} ({})", idx, constant_str(chunk, idx)).unwrap()
        }

        Instr::GetLocal(slot) | Instr::SetLocal(slot) => writeln!(output, " {}", slot).unwrap(),

        Instr::Eq { invert } | Instr::Lt { invert } | Instr::Le { invert } => {
            writeln!(output, "{}", if invert { " inv" } else { "" }).unwrap()
        }

        Instr::Jmp(target) | Instr::JmpIfFalse(target) => {
            writeln!(output, " -> {}", target).unwrap()
        }

        Instr::Call { nargs, nret } => writeln!(output, " args={} rets={}", nargs, nret).unwrap(),
        Instr::Return(nret) => writeln!(output, " {}", nret).unwrap(),

        Instr::ForPrep { slot, target } | Instr::ForLoop { slot, target } => {
            writeln!(output, " slot={} -> {}", slot, target).unwrap()
        }

        Instr::Closure(idx) => {
            writeln!(output, " {} ({})", idx, constant_str(chunk, idx)).unwrap()
        }

        _ => writeln!(output).unwrap(),
    }
}

fn constant_str(chunk: &Chunk, idx: u16) -> String {
    match chunk.constants.get(idx as usize) {
        Some(Constant::Number(n)) => format!("{}", n),
        Some(Constant::Str(s)) => {
            if s.len() > 20 {
                format!("\"{}...\"", &s[..20])
            } else {
                format!("\"{}\"", s)
            }
        }
        Some(Constant::Bool(b)) => format!("{}", b),
        Some(Constant::Proto(i)) => format!("<proto {}>", i),
        None => format!("?{}", idx),
    }
}
