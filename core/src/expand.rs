/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * Tree expansion for the Brisk compiler.
 *
 * Lowers the vector-shaped nodes produced by the parser (memory views,
 * array literals, whole-array assignments) into scalar nodes the emitter
 * understands. After this pass no `MemoryVector` or `StaticVector` is left
 * in the tree.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 */

use crate::ast::{broadcast_size, ArrayRef, Node, NodeKind, SourcePos};
use crate::diagnostic::CompileError;
use crate::ops::BinaryOp;
use crate::types::ReturnType;
use tracing::debug;

// =============================================================================
// Entry points
// =============================================================================

pub fn expand_tree(root: Node) -> Result<Node, CompileError> {
    debug!("tree expansion");
    let expanded = expand(root, 0)?;
    if let Some(vector) = first_vector(&expanded) {
        return Err(CompileError::internal(
            vector.pos,
            format!("{} survived expansion", vector.kind_name()),
        ));
    }
    Ok(expanded)
}

/// Expands `node`, selecting element `index` of vector-valued expressions.
/// Single-element vectors broadcast: they yield their only element for any
/// index.
pub fn expand(node: Node, index: usize) -> Result<Node, CompileError> {
    let Node { pos, kind } = node;
    let kind = match kind {
        NodeKind::Block(stmts) => NodeKind::Block(expand_statements(stmts)?),
        NodeKind::Program(stmts) => NodeKind::Program(expand_statements(stmts)?),
        NodeKind::Assignment { target, value } => return expand_assignment(pos, *target, *value),
        NodeKind::IfWhen {
            cond,
            then_block,
            else_block,
            edge_sensitive,
            end_line,
        } => NodeKind::IfWhen {
            cond: Box::new(expand_scalar(*cond)?),
            then_block: Box::new(expand(*then_block, 0)?),
            else_block: Box::new(expand(*else_block, 0)?),
            edge_sensitive,
            end_line,
        },
        NodeKind::FoldedIfWhen {
            op,
            left,
            right,
            then_block,
            else_block,
            edge_sensitive,
            end_line,
        } => NodeKind::FoldedIfWhen {
            op,
            left: Box::new(expand_scalar(*left)?),
            right: Box::new(expand_scalar(*right)?),
            then_block: Box::new(expand(*then_block, 0)?),
            else_block: Box::new(expand(*else_block, 0)?),
            edge_sensitive,
            end_line,
        },
        NodeKind::While { cond, body } => NodeKind::While {
            cond: Box::new(expand_scalar(*cond)?),
            body: Box::new(expand(*body, 0)?),
        },
        NodeKind::FoldedWhile {
            op,
            left,
            right,
            body,
        } => NodeKind::FoldedWhile {
            op,
            left: Box::new(expand_scalar(*left)?),
            right: Box::new(expand_scalar(*right)?),
            body: Box::new(expand(*body, 0)?),
        },
        NodeKind::Emit {
            event_id,
            array_addr,
            array_size,
            args,
        } => NodeKind::Emit {
            event_id,
            array_addr,
            array_size,
            args: flatten(expand_statements(args)?),
        },
        NodeKind::Call {
            func_id,
            arg_addrs,
            args,
        } => NodeKind::Call {
            func_id,
            arg_addrs,
            args: flatten(expand_statements(args)?),
        },
        NodeKind::BinaryArithmetic { op, left, right } => {
            let size = broadcast_size(left.vector_size()?, right.vector_size()?)
                .ok_or_else(|| CompileError::structural(pos, "size mismatch between operands"))?;
            // Boolean operators keep their node so the checker still sees them.
            if integer_only(op.signature()) {
                if let (NodeKind::StaticVector(a), NodeKind::StaticVector(b)) =
                    (&left.kind, &right.kind)
                {
                    if let Some(values) = fold_static(op, a, b, size) {
                        debug!(%pos, ?values, "literal vector arithmetic folded");
                        return static_element(pos, &values, index);
                    }
                }
            }
            NodeKind::BinaryArithmetic {
                op,
                left: Box::new(expand(*left, index)?),
                right: Box::new(expand(*right, index)?),
            }
        }
        NodeKind::UnaryArithmetic { op, operand } => {
            if let NodeKind::StaticVector(values) = &operand.kind {
                if integer_only(op.signature()) {
                    let values: Vec<i16> = values.iter().map(|v| op.apply(*v)).collect();
                    return static_element(pos, &values, index);
                }
            }
            NodeKind::UnaryArithmetic {
                op,
                operand: Box::new(expand(*operand, index)?),
            }
        }
        NodeKind::StaticVector(values) => return static_element(pos, &values, index),
        NodeKind::MemoryVector {
            array,
            index: access,
            write,
        } => return expand_memory_vector(pos, array, access.map(|b| *b), write, index),
        NodeKind::ArrayWrite { array, index: idx } => NodeKind::ArrayWrite {
            array,
            index: Box::new(expand_scalar(*idx)?),
        },
        NodeKind::ArrayRead { array, index: idx } => NodeKind::ArrayRead {
            array,
            index: Box::new(expand_scalar(*idx)?),
        },
        leaf @ (NodeKind::EventDecl { .. }
        | NodeKind::SubDecl { .. }
        | NodeKind::CallSub { .. }
        | NodeKind::Immediate(_)
        | NodeKind::Store { .. }
        | NodeKind::Load { .. }
        | NodeKind::Return) => leaf,
    };
    Ok(Node::new(pos, kind))
}

/// Builds `target = target op rhs`. The read side is derived from the write
/// target, so the target must be readable without re-evaluating anything.
pub fn compound_assignment(
    pos: SourcePos,
    op: BinaryOp,
    target: Node,
    rhs: Node,
) -> Result<Node, CompileError> {
    let read = match &target.kind {
        NodeKind::Store { addr } => Node::load(target.pos, *addr),
        NodeKind::MemoryVector { array, index, .. } => {
            if let Some(access) = index {
                if !is_constant_access(access) {
                    return Err(CompileError::structural(
                        target.pos,
                        format!(
                            "operation not permitted on array {} with a non-constant index",
                            array.name
                        ),
                    ));
                }
            }
            Node::new(
                target.pos,
                NodeKind::MemoryVector {
                    array: array.clone(),
                    index: index.clone(),
                    write: false,
                },
            )
        }
        NodeKind::ArrayWrite { .. } => Node::array_read_from_write(&target)?,
        other => {
            return Err(CompileError::structural(
                target.pos,
                format!("cannot assign to {}", other.name()),
            ))
        }
    };
    Ok(Node::assign(pos, target, Node::binary(pos, op, read, rhs)))
}

// =============================================================================
// Helpers
// =============================================================================

fn expand_statements(stmts: Vec<Node>) -> Result<Vec<Node>, CompileError> {
    stmts.into_iter().map(|s| expand(s, 0)).collect()
}

/// Payload-filling assignments of `emit` and native calls stay a flat list.
fn flatten(stmts: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt.kind {
            NodeKind::Block(inner) => out.extend(inner),
            kind => out.push(Node::new(stmt.pos, kind)),
        }
    }
    out
}

fn expand_scalar(node: Node) -> Result<Node, CompileError> {
    let size = node.vector_size()?;
    if size != 1 {
        return Err(CompileError::structural(
            node.pos,
            format!("expecting a single value, found an array of size {}", size),
        ));
    }
    expand(node, 0)
}

fn expand_assignment(pos: SourcePos, target: Node, value: Node) -> Result<Node, CompileError> {
    let target = match target.kind {
        NodeKind::MemoryVector { array, index, .. } => Node::new(
            target.pos,
            NodeKind::MemoryVector {
                array,
                index,
                write: true,
            },
        ),
        NodeKind::Store { .. } | NodeKind::ArrayWrite { .. } => target,
        other => {
            return Err(CompileError::structural(
                target.pos,
                format!("cannot assign to {}", other.name()),
            ))
        }
    };

    let size = target.vector_size()?;
    let value_size = value.vector_size()?;
    if value_size != size && value_size != 1 {
        return Err(CompileError::structural(
            pos,
            format!(
                "size mismatch: assigning {} values to an array of size {}",
                value_size, size
            ),
        ));
    }

    if size == 1 {
        return Ok(Node::assign(pos, expand(target, 0)?, expand(value, 0)?));
    }

    debug!(%pos, size, "vector assignment split into scalar assignments");
    let mut stmts = Vec::with_capacity(size);
    for i in 0..size {
        stmts.push(Node::assign(
            pos,
            expand(target.clone(), i)?,
            expand(value.clone(), i)?,
        ));
    }
    Ok(Node::block(pos, stmts))
}

fn expand_memory_vector(
    pos: SourcePos,
    array: ArrayRef,
    access: Option<Node>,
    write: bool,
    index: usize,
) -> Result<Node, CompileError> {
    let Some(access) = access else {
        let offset = element(pos, index, array.size as usize)?;
        return direct(pos, &array, offset as i32, write);
    };

    match access.kind {
        NodeKind::Immediate(value) => constant_access(pos, &array, value as i32, write),
        NodeKind::StaticVector(ref bounds) if bounds.len() == 1 => {
            constant_access(pos, &array, bounds[0] as i32, write)
        }
        NodeKind::StaticVector(ref bounds) if bounds.len() == 2 => {
            let (start, end) = (bounds[0] as i32, bounds[1] as i32);
            check_index(access.pos, &array, start)?;
            check_index(access.pos, &array, end)?;
            if end < start {
                return Err(CompileError::OutOfBounds {
                    pos: access.pos,
                    name: array.name.clone(),
                    index: end,
                    size: array.size,
                });
            }
            let offset = start + element(pos, index, (end - start + 1) as usize)? as i32;
            direct(pos, &array, offset, write)
        }
        NodeKind::StaticVector(_) => Err(CompileError::structural(
            access.pos,
            "array index must be a single value or a range",
        )),
        _ => {
            let expr = expand_scalar(access)?;
            debug!(%pos, array = %array.name, write, "computed index kept as indirect access");
            Ok(if write {
                Node::array_write(pos, array, expr)
            } else {
                Node::array_read(pos, array, expr)
            })
        }
    }
}

fn constant_access(
    pos: SourcePos,
    array: &ArrayRef,
    index: i32,
    write: bool,
) -> Result<Node, CompileError> {
    check_index(pos, array, index)?;
    direct(pos, array, index, write)
}

fn check_index(pos: SourcePos, array: &ArrayRef, index: i32) -> Result<(), CompileError> {
    if array.contains(index) {
        Ok(())
    } else {
        Err(CompileError::OutOfBounds {
            pos,
            name: array.name.clone(),
            index,
            size: array.size,
        })
    }
}

fn direct(
    pos: SourcePos,
    array: &ArrayRef,
    offset: i32,
    write: bool,
) -> Result<Node, CompileError> {
    let addr = array.addr.checked_add(offset as u16).ok_or_else(|| {
        CompileError::structural(
            pos,
            format!(
                "element {} of array {} lies beyond the address space",
                offset, array.name
            ),
        )
    })?;
    Ok(if write {
        Node::store(pos, addr)
    } else {
        Node::load(pos, addr)
    })
}

/// Which element of a `len`-sized vector serves expansion index `index`.
fn element(pos: SourcePos, index: usize, len: usize) -> Result<usize, CompileError> {
    if len == 1 {
        Ok(0)
    } else if index < len {
        Ok(index)
    } else {
        Err(CompileError::internal(
            pos,
            format!("expansion index {} beyond vector of size {}", index, len),
        ))
    }
}

fn static_element(pos: SourcePos, values: &[i16], index: usize) -> Result<Node, CompileError> {
    if values.is_empty() {
        return Err(CompileError::structural(pos, "empty array constructor"));
    }
    let i = element(pos, index, values.len())?;
    Ok(Node::immediate(pos, values[i]))
}

fn fold_static(op: BinaryOp, a: &[i16], b: &[i16], size: usize) -> Option<Vec<i16>> {
    let pick = |v: &[i16], i: usize| if v.len() == 1 { v[0] } else { v[i] };
    (0..size).map(|i| op.apply(pick(a, i), pick(b, i))).collect()
}

fn integer_only((operand, result): (ReturnType, ReturnType)) -> bool {
    operand == ReturnType::Int && result == ReturnType::Int
}

fn first_vector(node: &Node) -> Option<&Node> {
    if node.is_vector() {
        return Some(node);
    }
    node.children().into_iter().find_map(first_vector)
}

fn is_constant_access(access: &Node) -> bool {
    matches!(access.kind, NodeKind::Immediate(_) | NodeKind::StaticVector(_))
}
