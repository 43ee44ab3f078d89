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

use crate::diagnostic::CompileError;
use crate::ops::{BinaryOp, UnaryOp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Line/column provenance of a node, 1-based. `0:0` marks generated code.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub const fn new(line: u32, column: u32) -> Self {
        SourcePos { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A named window of variable memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayRef {
    pub addr: u16,
    pub size: u16,
    pub name: String,
}

impl ArrayRef {
    pub fn new(addr: u16, size: u16, name: impl Into<String>) -> Self {
        ArrayRef {
            addr,
            size,
            name: name.into(),
        }
    }

    pub fn contains(&self, index: i32) -> bool {
        index >= 0 && index < self.size as i32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub pos: SourcePos,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Block(Vec<Node>),
    Program(Vec<Node>),
    Assignment {
        target: Box<Node>,
        value: Box<Node>,
    },
    IfWhen {
        cond: Box<Node>,
        then_block: Box<Node>,
        else_block: Box<Node>,
        edge_sensitive: bool,
        #[serde(default)]
        end_line: u32,
    },
    FoldedIfWhen {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
        then_block: Box<Node>,
        else_block: Box<Node>,
        edge_sensitive: bool,
        #[serde(default)]
        end_line: u32,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    FoldedWhile {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
        body: Box<Node>,
    },
    EventDecl {
        event_id: u16,
    },
    Emit {
        event_id: u16,
        array_addr: u16,
        array_size: u16,
        #[serde(default)]
        args: Vec<Node>,
    },
    SubDecl {
        sub_id: u16,
    },
    CallSub {
        sub_id: u16,
    },
    BinaryArithmetic {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    UnaryArithmetic {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Immediate(i16),
    Store {
        addr: u16,
    },
    Load {
        addr: u16,
    },
    ArrayWrite {
        array: ArrayRef,
        index: Box<Node>,
    },
    ArrayRead {
        array: ArrayRef,
        index: Box<Node>,
    },
    Call {
        func_id: u16,
        #[serde(default)]
        arg_addrs: Vec<u16>,
        #[serde(default)]
        args: Vec<Node>,
    },
    Return,
    StaticVector(Vec<i16>),
    /// Generic view over variable memory. The optional index is an
    /// expression, a one-element `StaticVector` constant, or a two-element
    /// `StaticVector` inclusive range.
    MemoryVector {
        array: ArrayRef,
        #[serde(default)]
        index: Option<Box<Node>>,
        write: bool,
    },
}

/// Number of children a node kind owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic,
    /// Zero or one child.
    Optional,
}

impl Arity {
    pub fn admits(self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => n == count,
            Arity::Variadic => true,
            Arity::Optional => count <= 1,
        }
    }
}

impl NodeKind {
    pub fn arity(&self) -> Arity {
        match self {
            NodeKind::Block(_)
            | NodeKind::Program(_)
            | NodeKind::Emit { .. }
            | NodeKind::Call { .. } => Arity::Variadic,
            NodeKind::Assignment { .. } => Arity::Fixed(2),
            NodeKind::IfWhen { .. } => Arity::Fixed(3),
            NodeKind::FoldedIfWhen { .. } => Arity::Fixed(4),
            NodeKind::While { .. } => Arity::Fixed(2),
            NodeKind::FoldedWhile { .. } => Arity::Fixed(3),
            NodeKind::BinaryArithmetic { .. } => Arity::Fixed(2),
            NodeKind::UnaryArithmetic { .. }
            | NodeKind::ArrayWrite { .. }
            | NodeKind::ArrayRead { .. } => Arity::Fixed(1),
            NodeKind::MemoryVector { .. } => Arity::Optional,
            NodeKind::EventDecl { .. }
            | NodeKind::SubDecl { .. }
            | NodeKind::CallSub { .. }
            | NodeKind::Immediate(_)
            | NodeKind::Store { .. }
            | NodeKind::Load { .. }
            | NodeKind::Return
            | NodeKind::StaticVector(_) => Arity::Fixed(0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Block(_) => "block",
            NodeKind::Program(_) => "program",
            NodeKind::Assignment { .. } => "assignment",
            NodeKind::IfWhen { .. } => "if/when",
            NodeKind::FoldedIfWhen { .. } => "folded if/when",
            NodeKind::While { .. } => "while",
            NodeKind::FoldedWhile { .. } => "folded while",
            NodeKind::EventDecl { .. } => "event declaration",
            NodeKind::Emit { .. } => "emit",
            NodeKind::SubDecl { .. } => "subroutine declaration",
            NodeKind::CallSub { .. } => "subroutine call",
            NodeKind::BinaryArithmetic { .. } => "binary arithmetic",
            NodeKind::UnaryArithmetic { .. } => "unary arithmetic",
            NodeKind::Immediate(_) => "immediate",
            NodeKind::Store { .. } => "store",
            NodeKind::Load { .. } => "load",
            NodeKind::ArrayWrite { .. } => "array write",
            NodeKind::ArrayRead { .. } => "array read",
            NodeKind::Call { .. } => "native call",
            NodeKind::Return => "return",
            NodeKind::StaticVector(_) => "static vector",
            NodeKind::MemoryVector { .. } => "memory vector",
        }
    }
}

// ============================================================================
// CONSTRUCTORS
// ============================================================================

impl Node {
    pub fn new(pos: SourcePos, kind: NodeKind) -> Self {
        Node { pos, kind }
    }

    pub fn program(pos: SourcePos, statements: Vec<Node>) -> Self {
        Node::new(pos, NodeKind::Program(statements))
    }

    pub fn block(pos: SourcePos, statements: Vec<Node>) -> Self {
        Node::new(pos, NodeKind::Block(statements))
    }

    pub fn assign(pos: SourcePos, target: Node, value: Node) -> Self {
        Node::new(
            pos,
            NodeKind::Assignment {
                target: Box::new(target),
                value: Box::new(value),
            },
        )
    }

    /// A missing false branch is stored as an empty block.
    pub fn if_when(
        pos: SourcePos,
        cond: Node,
        then_block: Node,
        else_block: Option<Node>,
        edge_sensitive: bool,
        end_line: u32,
    ) -> Self {
        let else_block = else_block.unwrap_or_else(|| Node::block(pos, Vec::new()));
        Node::new(
            pos,
            NodeKind::IfWhen {
                cond: Box::new(cond),
                then_block: Box::new(then_block),
                else_block: Box::new(else_block),
                edge_sensitive,
                end_line,
            },
        )
    }

    pub fn while_loop(pos: SourcePos, cond: Node, body: Node) -> Self {
        Node::new(
            pos,
            NodeKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
        )
    }

    pub fn event(pos: SourcePos, event_id: u16) -> Self {
        Node::new(pos, NodeKind::EventDecl { event_id })
    }

    pub fn emit(
        pos: SourcePos,
        event_id: u16,
        array_addr: u16,
        array_size: u16,
        args: Vec<Node>,
    ) -> Self {
        Node::new(
            pos,
            NodeKind::Emit {
                event_id,
                array_addr,
                array_size,
                args,
            },
        )
    }

    pub fn sub_decl(pos: SourcePos, sub_id: u16) -> Self {
        Node::new(pos, NodeKind::SubDecl { sub_id })
    }

    pub fn call_sub(pos: SourcePos, sub_id: u16) -> Self {
        Node::new(pos, NodeKind::CallSub { sub_id })
    }

    pub fn binary(pos: SourcePos, op: BinaryOp, left: Node, right: Node) -> Self {
        Node::new(
            pos,
            NodeKind::BinaryArithmetic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    pub fn unary(pos: SourcePos, op: UnaryOp, operand: Node) -> Self {
        Node::new(
            pos,
            NodeKind::UnaryArithmetic {
                op,
                operand: Box::new(operand),
            },
        )
    }

    pub fn immediate(pos: SourcePos, value: i16) -> Self {
        Node::new(pos, NodeKind::Immediate(value))
    }

    pub fn store(pos: SourcePos, addr: u16) -> Self {
        Node::new(pos, NodeKind::Store { addr })
    }

    pub fn load(pos: SourcePos, addr: u16) -> Self {
        Node::new(pos, NodeKind::Load { addr })
    }

    pub fn array_write(pos: SourcePos, array: ArrayRef, index: Node) -> Self {
        Node::new(
            pos,
            NodeKind::ArrayWrite {
                array,
                index: Box::new(index),
            },
        )
    }

    pub fn array_read(pos: SourcePos, array: ArrayRef, index: Node) -> Self {
        Node::new(
            pos,
            NodeKind::ArrayRead {
                array,
                index: Box::new(index),
            },
        )
    }

    pub fn call(pos: SourcePos, func_id: u16, arg_addrs: Vec<u16>, args: Vec<Node>) -> Self {
        Node::new(
            pos,
            NodeKind::Call {
                func_id,
                arg_addrs,
                args,
            },
        )
    }

    pub fn ret(pos: SourcePos) -> Self {
        Node::new(pos, NodeKind::Return)
    }

    pub fn static_vector(pos: SourcePos, values: Vec<i16>) -> Self {
        Node::new(pos, NodeKind::StaticVector(values))
    }

    pub fn memory_vector(
        pos: SourcePos,
        array: ArrayRef,
        index: Option<Node>,
        write: bool,
    ) -> Self {
        Node::new(
            pos,
            NodeKind::MemoryVector {
                array,
                index: index.map(Box::new),
                write,
            },
        )
    }

    /// Builds the read counterpart of an array write, for compound
    /// assignments. Only a constant index can be read back: evaluating a
    /// computed index a second time is not allowed.
    pub fn array_read_from_write(write: &Node) -> Result<Node, CompileError> {
        match &write.kind {
            NodeKind::ArrayWrite { array, index } => match index.kind {
                NodeKind::Immediate(_) => {
                    Ok(Node::array_read(write.pos, array.clone(), (**index).clone()))
                }
                _ => Err(CompileError::structural(
                    write.pos,
                    format!(
                        "operation not permitted on array {} with a non-constant index",
                        array.name
                    ),
                )),
            },
            other => Err(CompileError::structural(
                write.pos,
                format!("expected an array write, found {}", other.name()),
            )),
        }
    }
}

// ============================================================================
// QUERIES
// ============================================================================

impl Node {
    pub fn arity(&self) -> Arity {
        self.kind.arity()
    }

    /// Children in evaluation order.
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Block(nodes)
            | NodeKind::Program(nodes)
            | NodeKind::Emit { args: nodes, .. }
            | NodeKind::Call { args: nodes, .. } => nodes.iter().collect(),
            NodeKind::Assignment { target, value } => vec![&**value, &**target],
            NodeKind::IfWhen {
                cond,
                then_block,
                else_block,
                ..
            } => vec![&**cond, &**then_block, &**else_block],
            NodeKind::FoldedIfWhen {
                left,
                right,
                then_block,
                else_block,
                ..
            } => vec![&**left, &**right, &**then_block, &**else_block],
            NodeKind::While { cond, body } => vec![&**cond, &**body],
            NodeKind::FoldedWhile {
                left, right, body, ..
            } => vec![&**left, &**right, &**body],
            NodeKind::BinaryArithmetic { left, right, .. } => vec![&**left, &**right],
            NodeKind::UnaryArithmetic { operand, .. } => vec![&**operand],
            NodeKind::ArrayWrite { index, .. } | NodeKind::ArrayRead { index, .. } => {
                vec![&**index]
            }
            NodeKind::MemoryVector { index, .. } => index.iter().map(|n| &**n).collect(),
            NodeKind::EventDecl { .. }
            | NodeKind::SubDecl { .. }
            | NodeKind::CallSub { .. }
            | NodeKind::Immediate(_)
            | NodeKind::Store { .. }
            | NodeKind::Load { .. }
            | NodeKind::Return
            | NodeKind::StaticVector(_) => Vec::new(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Vector nodes only exist before tree expansion.
    pub fn is_vector(&self) -> bool {
        matches!(self.kind, NodeKind::StaticVector(_) | NodeKind::MemoryVector { .. })
    }

    /// Number of scalar elements the expression yields once expanded.
    pub fn vector_size(&self) -> Result<usize, CompileError> {
        match &self.kind {
            NodeKind::StaticVector(values) => {
                if values.is_empty() {
                    Err(CompileError::structural(self.pos, "empty array constructor"))
                } else {
                    Ok(values.len())
                }
            }
            NodeKind::MemoryVector { array, index, .. } => match index.as_deref().map(|n| &n.kind) {
                None => Ok(array.size as usize),
                Some(NodeKind::StaticVector(bounds)) if bounds.len() == 2 => {
                    let (start, end) = (bounds[0] as i32, bounds[1] as i32);
                    if end < start {
                        return Err(CompileError::OutOfBounds {
                            pos: self.pos,
                            name: array.name.clone(),
                            index: end,
                            size: array.size,
                        });
                    }
                    Ok((end - start + 1) as usize)
                }
                Some(_) => Ok(1),
            },
            NodeKind::BinaryArithmetic { left, right, .. } => {
                let (l, r) = (left.vector_size()?, right.vector_size()?);
                broadcast_size(l, r).ok_or_else(|| {
                    CompileError::structural(
                        self.pos,
                        format!("size mismatch between operands: {} and {}", l, r),
                    )
                })
            }
            NodeKind::UnaryArithmetic { operand, .. } => operand.vector_size(),
            _ => Ok(1),
        }
    }

    pub fn as_immediate(&self) -> Option<i16> {
        match self.kind {
            NodeKind::Immediate(value) => Some(value),
            _ => None,
        }
    }

    /// Value of an expression built only from immediates, as the VM would
    /// compute it. `None` when it depends on memory or divides by zero.
    pub fn constant_value(&self) -> Option<i16> {
        match &self.kind {
            NodeKind::Immediate(value) => Some(*value),
            NodeKind::BinaryArithmetic { op, left, right } => {
                op.apply(left.constant_value()?, right.constant_value()?)
            }
            NodeKind::UnaryArithmetic { op, operand } => Some(op.apply(operand.constant_value()?)),
            _ => None,
        }
    }

    pub fn is_empty_block(&self) -> bool {
        matches!(&self.kind, NodeKind::Block(stmts) if stmts.is_empty())
    }

    /// Indented rendering of the whole subtree, one node per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&self.to_string());
        out.push('\n');
        // Assignment lists its target first in dumps, unlike evaluation order.
        if let NodeKind::Assignment { target, value } = &self.kind {
            target.dump_into(out, depth + 1);
            value.dump_into(out, depth + 1);
            return;
        }
        for child in self.children() {
            child.dump_into(out, depth + 1);
        }
    }
}

/// Size of a binary result, broadcasting single elements.
pub fn broadcast_size(left: usize, right: usize) -> Option<usize> {
    if left == right || right == 1 {
        Some(left)
    } else if left == 1 {
        Some(right)
    } else {
        None
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Block(_) => write!(f, "Block"),
            NodeKind::Program(_) => write!(f, "Program"),
            NodeKind::Assignment { .. } => write!(f, "Assign"),
            NodeKind::IfWhen {
                edge_sensitive,
                end_line,
                ..
            } => {
                let keyword = if *edge_sensitive { "When" } else { "If" };
                write!(f, "{}: end line {}", keyword, end_line)
            }
            NodeKind::FoldedIfWhen {
                op,
                edge_sensitive,
                end_line,
                ..
            } => {
                let keyword = if *edge_sensitive { "when" } else { "if" };
                write!(f, "Folded {} {}: end line {}", keyword, op, end_line)
            }
            NodeKind::While { .. } => write!(f, "While"),
            NodeKind::FoldedWhile { op, .. } => write!(f, "Folded while {}", op),
            NodeKind::EventDecl { event_id } => write!(f, "Event: {}", event_id),
            NodeKind::Emit {
                event_id,
                array_addr,
                array_size,
                ..
            } => write!(
                f,
                "Emit: {}, payload at {} size {}",
                event_id, array_addr, array_size
            ),
            NodeKind::SubDecl { sub_id } => write!(f, "Sub: {}", sub_id),
            NodeKind::CallSub { sub_id } => write!(f, "CallSub: {}", sub_id),
            NodeKind::BinaryArithmetic { op, .. } => write!(f, "BinaryArithmetic: {}", op),
            NodeKind::UnaryArithmetic { op, .. } => write!(f, "UnaryArithmetic: {}", op),
            NodeKind::Immediate(value) => write!(f, "Immediate: {}", value),
            NodeKind::Store { addr } => write!(f, "Store: addr {}", addr),
            NodeKind::Load { addr } => write!(f, "Load: addr {}", addr),
            NodeKind::ArrayWrite { array, .. } => {
                write!(f, "ArrayWrite: {} at {} size {}", array.name, array.addr, array.size)
            }
            NodeKind::ArrayRead { array, .. } => {
                write!(f, "ArrayRead: {} at {} size {}", array.name, array.addr, array.size)
            }
            NodeKind::Call {
                func_id, arg_addrs, ..
            } => write!(f, "Call: native {}, args {:?}", func_id, arg_addrs),
            NodeKind::Return => write!(f, "Return"),
            NodeKind::StaticVector(values) => write!(f, "StaticVector: {:?}", values),
            NodeKind::MemoryVector { array, write, .. } => {
                let mode = if *write { "write" } else { "read" };
                write!(
                    f,
                    "MemoryVector ({}): {} at {} size {}",
                    mode, array.name, array.addr, array.size
                )
            }
        }
    }
}
