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

//! Tree-to-tree rewrites on a type-checked tree: constant folding, dead
//! branch elimination, pushing `not` inward and fusing comparisons into the
//! VM's conditional branch. Runs bottom-up. Every user-visible fault has
//! already been reported by the checker, so the only errors raised here are
//! internal ones.

use crate::ast::{ArrayRef, Node, NodeKind, SourcePos};
use crate::diagnostic::CompileError;
use crate::ops::{BinaryOp, UnaryOp};
use tracing::debug;

pub fn optimize_program(root: Node) -> Result<Node, CompileError> {
    debug!("optimization");
    let pos = root.pos;
    optimize(root)?.ok_or_else(|| CompileError::internal(pos, "program elided"))
}

/// Optimizes `node`. `None` means the node has no effect and must be dropped
/// from its parent.
pub fn optimize(node: Node) -> Result<Option<Node>, CompileError> {
    let Node { pos, kind } = node;
    let node = match kind {
        NodeKind::Block(stmts) => {
            let stmts = optimize_statements(stmts)?;
            if stmts.is_empty() {
                debug!(%pos, "empty block elided");
                return Ok(None);
            }
            Node::block(pos, stmts)
        }
        NodeKind::Program(stmts) => Node::program(pos, optimize_statements(stmts)?),
        NodeKind::Assignment { target, value } => {
            let value = optimize_expr(*value)?;
            let target = optimize_expr(*target)?;
            Node::assign(pos, target, value)
        }
        NodeKind::IfWhen {
            cond,
            then_block,
            else_block,
            edge_sensitive,
            end_line,
        } => {
            return optimize_if_when(
                pos,
                optimize_expr(*cond)?,
                optimize_block(*then_block)?,
                optimize_block(*else_block)?,
                edge_sensitive,
                end_line,
            )
        }
        NodeKind::FoldedIfWhen {
            op,
            left,
            right,
            then_block,
            else_block,
            edge_sensitive,
            end_line,
        } => Node::new(
            pos,
            NodeKind::FoldedIfWhen {
                op,
                left: Box::new(optimize_expr(*left)?),
                right: Box::new(optimize_expr(*right)?),
                then_block: Box::new(optimize_block(*then_block)?),
                else_block: Box::new(optimize_block(*else_block)?),
                edge_sensitive,
                end_line,
            },
        ),
        NodeKind::While { cond, body } => {
            return optimize_while(pos, optimize_expr(*cond)?, optimize_block(*body)?)
        }
        NodeKind::FoldedWhile {
            op,
            left,
            right,
            body,
        } => Node::new(
            pos,
            NodeKind::FoldedWhile {
                op,
                left: Box::new(optimize_expr(*left)?),
                right: Box::new(optimize_expr(*right)?),
                body: Box::new(optimize_block(*body)?),
            },
        ),
        NodeKind::Emit {
            event_id,
            array_addr,
            array_size,
            args,
        } => Node::emit(pos, event_id, array_addr, array_size, optimize_statements(args)?),
        NodeKind::Call {
            func_id,
            arg_addrs,
            args,
        } => Node::call(pos, func_id, arg_addrs, optimize_statements(args)?),
        NodeKind::BinaryArithmetic { op, left, right } => {
            optimize_binary(pos, op, optimize_expr(*left)?, optimize_expr(*right)?)?
        }
        NodeKind::UnaryArithmetic { op, operand } => {
            optimize_unary(pos, op, optimize_expr(*operand)?)?
        }
        NodeKind::ArrayWrite { array, index } => {
            let index = optimize_expr(*index)?;
            match index.as_immediate() {
                Some(value) => {
                    let addr = direct_address(pos, &array, value)?;
                    debug!(%pos, array = %array.name, addr, "constant index write becomes store");
                    Node::store(pos, addr)
                }
                None => Node::array_write(pos, array, index),
            }
        }
        NodeKind::ArrayRead { array, index } => {
            let index = optimize_expr(*index)?;
            match index.as_immediate() {
                Some(value) => {
                    let addr = direct_address(pos, &array, value)?;
                    debug!(%pos, array = %array.name, addr, "constant index read becomes load");
                    Node::load(pos, addr)
                }
                None => Node::array_read(pos, array, index),
            }
        }
        vector @ (NodeKind::StaticVector(_) | NodeKind::MemoryVector { .. }) => {
            return Err(CompileError::internal(
                pos,
                format!("{} reached the optimizer unexpanded", vector.name()),
            ))
        }
        leaf @ (NodeKind::EventDecl { .. }
        | NodeKind::SubDecl { .. }
        | NodeKind::CallSub { .. }
        | NodeKind::Immediate(_)
        | NodeKind::Store { .. }
        | NodeKind::Load { .. }
        | NodeKind::Return) => Node::new(pos, leaf),
    };
    Ok(Some(node))
}

fn optimize_statements(stmts: Vec<Node>) -> Result<Vec<Node>, CompileError> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        if let Some(stmt) = optimize(stmt)? {
            out.push(stmt);
        }
    }
    Ok(out)
}

fn optimize_expr(node: Node) -> Result<Node, CompileError> {
    let pos = node.pos;
    let name = node.kind_name();
    optimize(node)?.ok_or_else(|| CompileError::internal(pos, format!("{} elided", name)))
}

/// Branch bodies are never dropped from their parent; an elided body becomes
/// an empty block.
fn optimize_block(node: Node) -> Result<Node, CompileError> {
    let pos = node.pos;
    Ok(optimize(node)?.unwrap_or_else(|| Node::block(pos, Vec::new())))
}

fn elide_if_empty(node: Node) -> Option<Node> {
    if node.is_empty_block() {
        None
    } else {
        Some(node)
    }
}

fn optimize_if_when(
    pos: SourcePos,
    cond: Node,
    then_block: Node,
    else_block: Node,
    edge_sensitive: bool,
    end_line: u32,
) -> Result<Option<Node>, CompileError> {
    if let Some(value) = cond.as_immediate() {
        // A constant true `when` still fires once, so only its false case folds.
        if !edge_sensitive || value == 0 {
            let taken = if value != 0 { then_block } else { else_block };
            debug!(%pos, value, edge_sensitive, "constant condition, keeping taken branch only");
            return Ok(elide_if_empty(taken));
        }
    }

    if then_block.is_empty_block() && else_block.is_empty_block() {
        debug!(%pos, "conditional with empty branches elided");
        return Ok(None);
    }

    let node = match cond.kind {
        NodeKind::BinaryArithmetic { op, left, right } if op.is_comparison() => {
            debug!(%pos, %op, "comparison folded into conditional branch");
            Node::new(
                pos,
                NodeKind::FoldedIfWhen {
                    op,
                    left,
                    right,
                    then_block: Box::new(then_block),
                    else_block: Box::new(else_block),
                    edge_sensitive,
                    end_line,
                },
            )
        }
        kind => Node::new(
            pos,
            NodeKind::IfWhen {
                cond: Box::new(Node::new(cond.pos, kind)),
                then_block: Box::new(then_block),
                else_block: Box::new(else_block),
                edge_sensitive,
                end_line,
            },
        ),
    };
    Ok(Some(node))
}

fn optimize_while(pos: SourcePos, cond: Node, body: Node) -> Result<Option<Node>, CompileError> {
    if cond.as_immediate() == Some(0) {
        debug!(%pos, "loop with false condition elided");
        return Ok(None);
    }

    let node = match cond.kind {
        NodeKind::BinaryArithmetic { op, left, right } if op.is_comparison() => {
            debug!(%pos, %op, "comparison folded into loop branch");
            Node::new(
                pos,
                NodeKind::FoldedWhile {
                    op,
                    left,
                    right,
                    body: Box::new(body),
                },
            )
        }
        kind => Node::while_loop(pos, Node::new(cond.pos, kind), body),
    };
    Ok(Some(node))
}

fn optimize_binary(
    pos: SourcePos,
    op: BinaryOp,
    left: Node,
    right: Node,
) -> Result<Node, CompileError> {
    match (left.as_immediate(), right.as_immediate()) {
        (Some(a), Some(b)) => {
            let value = op.apply(a, b).ok_or_else(|| {
                let message = format!("constant {} by zero reached the optimizer", op);
                CompileError::internal(pos, message)
            })?;
            debug!(%pos, %op, a, b, value, "constant folded");
            Ok(Node::immediate(pos, value))
        }
        _ => Ok(Node::binary(pos, op, left, right)),
    }
}

fn optimize_unary(pos: SourcePos, op: UnaryOp, operand: Node) -> Result<Node, CompileError> {
    if let Some(a) = operand.as_immediate() {
        let value = op.apply(a);
        debug!(%pos, %op, a, value, "constant folded");
        return Ok(Node::immediate(pos, value));
    }
    if op == UnaryOp::Not {
        debug!(%pos, operand = operand.kind_name(), "negation pushed inward");
        return negate(operand);
    }
    Ok(Node::unary(pos, op, operand))
}

/// Boolean negation without a `not` node: comparisons are inverted and
/// `and`/`or` swapped with both sides negated.
fn negate(node: Node) -> Result<Node, CompileError> {
    let Node { pos, kind } = node;
    match kind {
        NodeKind::BinaryArithmetic { op, left, right } => {
            if let Some(inverse) = op.inverted() {
                return Ok(Node::new(
                    pos,
                    NodeKind::BinaryArithmetic {
                        op: inverse,
                        left,
                        right,
                    },
                ));
            }
            let swapped = match op {
                BinaryOp::And => BinaryOp::Or,
                BinaryOp::Or => BinaryOp::And,
                _ => {
                    return Err(CompileError::internal(
                        pos,
                        format!("cannot negate non-boolean operator {}", op),
                    ))
                }
            };
            Ok(Node::binary(pos, swapped, negate(*left)?, negate(*right)?))
        }
        NodeKind::UnaryArithmetic {
            op: UnaryOp::Not,
            operand,
        } => Ok(*operand),
        NodeKind::Immediate(value) => Ok(Node::immediate(pos, (value == 0) as i16)),
        other => Err(CompileError::internal(
            pos,
            format!("cannot negate {}", other.name()),
        )),
    }
}

fn direct_address(pos: SourcePos, array: &ArrayRef, index: i16) -> Result<u16, CompileError> {
    if !array.contains(index as i32) {
        return Err(CompileError::internal(
            pos,
            format!("constant index {} outside array {} survived checking", index, array.name),
        ));
    }
    array.addr.checked_add(index as u16).ok_or_else(|| {
        CompileError::internal(pos, format!("array {} overflows the address space", array.name))
    })
}

// ============================================================================
// STACK DEPTH
// ============================================================================

impl Node {
    /// Evaluation stack slots needed to run this node, assuming the stack
    /// holds nothing of interest when it starts.
    pub fn stack_depth(&self) -> usize {
        match &self.kind {
            NodeKind::Block(stmts)
            | NodeKind::Program(stmts)
            | NodeKind::Emit { args: stmts, .. } => max_depth(stmts),
            NodeKind::Assignment { target, value } => value.stack_depth().max(target.stack_depth()),
            NodeKind::IfWhen {
                cond,
                then_block,
                else_block,
                ..
            } => cond
                .stack_depth()
                .max(2)
                .max(then_block.stack_depth())
                .max(else_block.stack_depth()),
            NodeKind::FoldedIfWhen {
                left,
                right,
                then_block,
                else_block,
                ..
            } => left
                .stack_depth()
                .max(right.stack_depth() + 1)
                .max(then_block.stack_depth())
                .max(else_block.stack_depth()),
            NodeKind::While { cond, body } => cond.stack_depth().max(2).max(body.stack_depth()),
            NodeKind::FoldedWhile {
                left, right, body, ..
            } => left
                .stack_depth()
                .max(right.stack_depth() + 1)
                .max(body.stack_depth()),
            NodeKind::BinaryArithmetic { left, right, .. } => {
                left.stack_depth().max(right.stack_depth() + 1)
            }
            NodeKind::UnaryArithmetic { operand, .. } => operand.stack_depth(),
            NodeKind::Immediate(_) | NodeKind::Load { .. } | NodeKind::Store { .. } => 1,
            NodeKind::ArrayWrite { index, .. } => 1 + index.stack_depth(),
            NodeKind::ArrayRead { index, .. } => index.stack_depth(),
            NodeKind::Call {
                arg_addrs, args, ..
            } => max_depth(args).max(arg_addrs.len()),
            NodeKind::EventDecl { .. }
            | NodeKind::SubDecl { .. }
            | NodeKind::CallSub { .. }
            | NodeKind::Return => 0,
            NodeKind::StaticVector(values) => values.len(),
            NodeKind::MemoryVector { index, .. } => {
                1 + index.as_ref().map(|i| i.stack_depth()).unwrap_or(0)
            }
        }
    }
}

fn max_depth(nodes: &[Node]) -> usize {
    nodes.iter().map(Node::stack_depth).max().unwrap_or(0)
}
