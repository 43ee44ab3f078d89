/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Brisk compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

use crate::ast::{Node, NodeKind};
use crate::bytecode::Bytecode;
use crate::checker::TypeChecker;
use crate::compiler::Compiler;
use crate::diagnostic::CompileError;
use crate::expand::expand_tree;
use crate::linker::link;
use crate::optimizer::optimize_program;
use crate::target::TargetDescription;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Collect the tree after each pass and the final disassembly.
    pub dump: bool,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub bytecode: Bytecode,
    /// Evaluation stack slots the program needs.
    pub stack_depth: usize,
    pub dump: Option<String>,
}

/// Expansion, type check, optimization, code generation and linking, in
/// that order. The first error aborts.
pub fn compile(
    program: Node,
    target: &TargetDescription,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    let mut dump = options.dump.then(String::new);

    let expanded = expand_tree(program)?;
    record(&mut dump, "expanded tree", || expanded.dump());
    check_addresses(&expanded, target)?;

    TypeChecker::check(&expanded)?;

    let optimized = optimize_program(expanded)?;
    record(&mut dump, "optimized tree", || optimized.dump());

    let stack_depth = optimized.stack_depth();
    debug!(stack_depth, available = target.stack_size, "stack depth");
    if stack_depth > target.stack_size {
        return Err(CompileError::StackOverflow {
            required: stack_depth,
            available: target.stack_size,
        });
    }

    let prelink = Compiler::new().compile(&optimized)?;
    let bytecode = link(prelink, target)?;
    record(&mut dump, "bytecode", || bytecode.disassemble());

    Ok(CompileOutput {
        bytecode,
        stack_depth,
        dump,
    })
}

fn record(dump: &mut Option<String>, title: &str, render: impl FnOnce() -> String) {
    if let Some(out) = dump {
        out.push_str(&format!("# {}\n", title));
        out.push_str(&render());
        out.push('\n');
    }
}

/// Every variable access must land inside the target's variable memory.
fn check_addresses(node: &Node, target: &TargetDescription) -> Result<(), CompileError> {
    let limit = target.variables_size;
    let out_of_range = |first: u16, size: u16| first as usize + size as usize > limit;
    let bad = match &node.kind {
        NodeKind::Store { addr } | NodeKind::Load { addr } => {
            out_of_range(*addr, 1).then_some(*addr)
        }
        NodeKind::ArrayRead { array, .. } | NodeKind::ArrayWrite { array, .. } => {
            out_of_range(array.addr, array.size).then_some(array.addr)
        }
        NodeKind::Emit {
            array_addr,
            array_size,
            ..
        } => out_of_range(*array_addr, *array_size).then_some(*array_addr),
        NodeKind::Call { arg_addrs, .. } => arg_addrs.iter().copied().find(|a| out_of_range(*a, 1)),
        _ => None,
    };
    if let Some(addr) = bad {
        return Err(CompileError::structural(
            node.pos,
            format!(
                "variable at address {} lies outside the {} words of target memory",
                addr, limit
            ),
        ));
    }
    for child in node.children() {
        check_addresses(child, target)?;
    }
    Ok(())
}
