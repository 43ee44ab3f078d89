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

//! Reference tree interpreter, used to check that rewrites keep the meaning
//! of the tree they rewrite.

use crate::ast::{Node, NodeKind, SourcePos};
use crate::ops::BinaryOp;
use crate::runtime::{EmittedEvent, Memory, NativeCall, RuntimeError};
use std::collections::HashMap;

const LOOP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    Return,
}

pub struct Interpreter {
    pub memory: Memory,
    pub emitted: Vec<EmittedEvent>,
    pub native_calls: Vec<NativeCall>,
    // Edge detector state of each `when`, keyed by its position.
    was_true: HashMap<SourcePos, bool>,
    iterations: usize,
}

impl Interpreter {
    pub fn new(memory: Memory) -> Self {
        Interpreter {
            memory,
            emitted: Vec::new(),
            native_calls: Vec::new(),
            was_true: HashMap::new(),
            iterations: 0,
        }
    }

    /// Runs a statement. A `Program` runs its init section, the statements
    /// before the first declaration.
    pub fn exec(&mut self, node: &Node) -> Result<Flow, RuntimeError> {
        match &node.kind {
            NodeKind::Program(stmts) => {
                for stmt in stmts {
                    if matches!(stmt.kind, NodeKind::EventDecl { .. } | NodeKind::SubDecl { .. }) {
                        break;
                    }
                    if self.exec(stmt)? == Flow::Return {
                        break;
                    }
                }
                Ok(Flow::Next)
            }
            NodeKind::Block(stmts) => {
                for stmt in stmts {
                    if self.exec(stmt)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                }
                Ok(Flow::Next)
            }
            NodeKind::Assignment { target, value } => {
                let value = self.eval(value)?;
                match &target.kind {
                    NodeKind::Store { addr } => self.memory.write(*addr, value)?,
                    NodeKind::ArrayWrite { array, index } => {
                        let index = self.eval(index)?;
                        let addr = Memory::element_addr(array.addr, array.size, index)?;
                        self.memory.write(addr, value)?;
                    }
                    other => {
                        let message = format!("assignment to {}", other.name());
                        return Err(RuntimeError::Unsupported(message));
                    }
                }
                Ok(Flow::Next)
            }
            NodeKind::IfWhen {
                cond,
                then_block,
                else_block,
                edge_sensitive,
                ..
            } => {
                let holds = self.eval(cond)? != 0;
                self.branch(node.pos, holds, *edge_sensitive, then_block, else_block)
            }
            NodeKind::FoldedIfWhen {
                op,
                left,
                right,
                then_block,
                else_block,
                edge_sensitive,
                ..
            } => {
                let holds = self.compare(*op, left, right)? != 0;
                self.branch(node.pos, holds, *edge_sensitive, then_block, else_block)
            }
            NodeKind::While { cond, body } => {
                while self.eval(cond)? != 0 {
                    self.tick()?;
                    if self.exec(body)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                }
                Ok(Flow::Next)
            }
            NodeKind::FoldedWhile {
                op,
                left,
                right,
                body,
            } => {
                while self.compare(*op, left, right)? != 0 {
                    self.tick()?;
                    if self.exec(body)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                }
                Ok(Flow::Next)
            }
            NodeKind::Emit {
                event_id,
                array_addr,
                array_size,
                args,
            } => {
                for arg in args {
                    self.exec(arg)?;
                }
                let payload = self.memory.window(*array_addr, *array_size)?;
                self.emitted.push(EmittedEvent {
                    id: *event_id,
                    payload,
                });
                Ok(Flow::Next)
            }
            NodeKind::Call {
                func_id,
                arg_addrs,
                args,
            } => {
                for arg in args {
                    self.exec(arg)?;
                }
                self.native_calls.push(NativeCall {
                    id: *func_id,
                    arg_addrs: arg_addrs.clone(),
                });
                Ok(Flow::Next)
            }
            NodeKind::Return => Ok(Flow::Return),
            other => Err(RuntimeError::Unsupported(format!("statement {}", other.name()))),
        }
    }

    pub fn eval(&self, node: &Node) -> Result<i16, RuntimeError> {
        match &node.kind {
            NodeKind::Immediate(value) => Ok(*value),
            NodeKind::Load { addr } => self.memory.read(*addr),
            NodeKind::ArrayRead { array, index } => {
                let index = self.eval(index)?;
                self.memory.read(Memory::element_addr(array.addr, array.size, index)?)
            }
            NodeKind::BinaryArithmetic { op, left, right } => self.compare(*op, left, right),
            NodeKind::UnaryArithmetic { op, operand } => Ok(op.apply(self.eval(operand)?)),
            other => Err(RuntimeError::Unsupported(format!("expression {}", other.name()))),
        }
    }

    fn compare(&self, op: BinaryOp, left: &Node, right: &Node) -> Result<i16, RuntimeError> {
        let a = self.eval(left)?;
        let b = self.eval(right)?;
        op.apply(a, b).ok_or(RuntimeError::DivisionByZero)
    }

    fn branch(
        &mut self,
        pos: SourcePos,
        holds: bool,
        edge_sensitive: bool,
        then_block: &Node,
        else_block: &Node,
    ) -> Result<Flow, RuntimeError> {
        let fire = if edge_sensitive {
            let was_true = self.was_true.insert(pos, holds).unwrap_or(false);
            holds && !was_true
        } else {
            holds
        };
        if fire {
            self.exec(then_block)
        } else {
            self.exec(else_block)
        }
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.iterations += 1;
        if self.iterations > LOOP_LIMIT {
            return Err(RuntimeError::StepLimit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ArrayRef;
    use crate::ops::UnaryOp;

    fn p(line: u32) -> SourcePos {
        SourcePos::new(line, 1)
    }

    #[test]
    fn test_eval_arithmetic() {
        let interp = Interpreter::new(Memory::new(4));
        let expr = Node::binary(
            p(1),
            BinaryOp::Sub,
            Node::immediate(p(1), 10),
            Node::unary(p(1), UnaryOp::Abs, Node::immediate(p(1), -3)),
        );
        assert_eq!(interp.eval(&expr), Ok(7));
        let div = Node::binary(
            p(1),
            BinaryOp::Div,
            Node::immediate(p(1), 1),
            Node::immediate(p(1), 0),
        );
        assert_eq!(interp.eval(&div), Err(RuntimeError::DivisionByZero));
    }

    #[test]
    fn test_when_fires_on_rising_edge_only() {
        let when = Node::if_when(
            p(1),
            Node::binary(p(1), BinaryOp::BiggerThan, Node::load(p(1), 0), Node::immediate(p(1), 0)),
            Node::block(
                p(2),
                vec![Node::assign(
                    p(2),
                    Node::store(p(2), 1),
                    Node::binary(
                        p(2),
                        BinaryOp::Add,
                        Node::load(p(2), 1),
                        Node::immediate(p(2), 1),
                    ),
                )],
            ),
            None,
            true,
            3,
        );
        let mut interp = Interpreter::new(Memory::new(4));
        for value in [1, 1, 0, 1, 1] {
            interp.memory.write(0, value).unwrap();
            interp.exec(&when).unwrap();
        }
        assert_eq!(interp.memory.read(1), Ok(2));
    }

    #[test]
    fn test_array_access_and_emit() {
        let a = ArrayRef::new(4, 2, "a");
        let program = Node::program(
            p(1),
            vec![
                Node::assign(
                    p(1),
                    Node::array_write(p(1), a.clone(), Node::immediate(p(1), 1)),
                    Node::immediate(p(1), 9),
                ),
                Node::emit(p(2), 3, 4, 2, vec![]),
                Node::ret(p(3)),
                Node::emit(p(4), 4, 0, 0, vec![]),
                Node::event(p(5), 1),
                Node::emit(p(6), 5, 0, 0, vec![]),
            ],
        );
        let mut interp = Interpreter::new(Memory::new(8));
        interp.exec(&program).unwrap();
        assert_eq!(
            interp.emitted,
            vec![EmittedEvent {
                id: 3,
                payload: vec![0, 9]
            }]
        );
        let bad = Node::array_read(p(7), a, Node::immediate(p(7), 2));
        assert!(matches!(interp.eval(&bad), Err(RuntimeError::IndexOutOfBounds { .. })));
    }

    #[test]
    fn test_infinite_loop_hits_limit() {
        let forever = Node::while_loop(p(1), Node::immediate(p(1), 1), Node::block(p(1), vec![]));
        let mut interp = Interpreter::new(Memory::new(1));
        assert_eq!(interp.exec(&forever), Err(RuntimeError::StepLimit));
    }
}
