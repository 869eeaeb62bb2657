//! Disassembly of compiled rules.
//!
//! One line per op:
//!
//! ```text
//!  0. [-1,  1]  and        $[this](Likes, $x)
//!  1. [ 0,  2]  yield
//! ```
//!
//! With a profile, each line is prefixed by the op's fresh and redo counts.

use std::fmt::Write;

use quarry_storage::World;

use crate::compiler::Program;
use crate::op::{EXHAUSTED, Op, OpKind, Ref};
use crate::vm::OpProfile;

pub(crate) fn disassemble(program: &Program, world: &World, profile: Option<&[OpProfile]>) -> String {
    let mut out = String::new();
    if profile.is_some() {
        out.push_str(" fresh   redo\n");
    }
    for (ip, op) in program.ops.iter().enumerate() {
        if let Some(counts) = profile.and_then(|p| p.get(ip)) {
            let _ = write!(out, "{:>6} {:>6}  ", counts.fresh, counts.redo);
        }
        let _ = write!(
            out,
            "{ip:>2}. [{:>2}, {:>2}]  {:<10}",
            op.prev,
            op.next,
            op.kind.name()
        );
        let operands = operands(program, world, op);
        if !operands.is_empty() {
            out.push(' ');
            out.push_str(&operands);
        }
        out.push('\n');
    }
    out
}

fn operand(program: &Program, world: &World, r: Ref) -> String {
    match r {
        Ref::None => String::new(),
        Ref::Entity(e) => world.path(e),
        Ref::Var(v) => program
            .vars
            .get(usize::from(v))
            .map_or_else(|| format!("$?{v}"), |var| var.label()),
    }
}

fn operands(program: &Program, world: &World, op: &Op) -> String {
    let show = |r| operand(program, world, r);
    let mut out = match op.kind {
        OpKind::Union => {
            let heads: Vec<String> = op.branches.iter().map(ToString::to_string).collect();
            return format!("[{}]", heads.join(", "));
        }
        OpKind::JmpCondFalse | OpKind::SetCond => return format!("-> {}", op.other),
        OpKind::End if op.other != EXHAUSTED => return format!("redo -> {}", op.other),
        OpKind::JmpNotSet => {
            let guard: Vec<String> = op.guard.iter().map(|v| show(Ref::Var(v))).collect();
            return format!("{} -> {}", guard.join(", "), op.other);
        }
        OpKind::Each | OpKind::Store | OpKind::Lookup | OpKind::Contain | OpKind::SetThis => {
            format!("{} <- {}", show(op.src), show(op.first))
        }
        OpKind::Reset => show(op.src),
        _ if op.src.is_none() && op.first.is_none() => String::new(),
        _ if op.kind.is_predicate() => {
            let rhs = op
                .text
                .as_ref()
                .map_or_else(|| show(op.second), |text| format!("\"{text}\""));
            let cmp = match op.kind {
                OpKind::PredEq | OpKind::PredEqName => "==",
                OpKind::PredNeq | OpKind::PredNeqName => "!=",
                OpKind::PredEqMatch => "~=",
                _ => "!~=",
            };
            format!("{} {cmp} {rhs}", show(op.src))
        }
        _ => {
            let first = show(op.first);
            if op.second.is_none() {
                format!("{}({first})", show(op.src))
            } else {
                format!("{}({first}, {})", show(op.src), show(op.second))
            }
        }
    };
    if let Some(rel) = op.trav {
        let _ = write!(out, " up {}", world.path(rel));
    }
    if let Some(field) = op.field {
        let _ = write!(out, "  #{field}");
    }
    out
}
