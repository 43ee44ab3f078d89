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

use crate::ast::{ArrayRef, Node, NodeKind};
use crate::diagnostic::CompileError;
use crate::ops::BinaryOp;
use crate::types::ReturnType;
use tracing::debug;

/// Bottom-up type inference over an expanded tree. Also rejects the
/// statically detectable run-time faults: constant out-of-bounds indices and
/// constant zero divisors.
pub struct TypeChecker;

impl TypeChecker {
    pub fn check(node: &Node) -> Result<ReturnType, CompileError> {
        debug!("type checking");
        TypeChecker::type_of(node)
    }

    fn type_of(node: &Node) -> Result<ReturnType, CompileError> {
        match &node.kind {
            NodeKind::Block(stmts) | NodeKind::Program(stmts) => {
                for stmt in stmts {
                    TypeChecker::expect(stmt, ReturnType::Unit)?;
                }
                Ok(ReturnType::Unit)
            }
            NodeKind::Assignment { target, value } => {
                if !matches!(
                    target.kind,
                    NodeKind::Store { .. } | NodeKind::ArrayWrite { .. }
                ) {
                    return Err(CompileError::internal(
                        target.pos,
                        format!("assignment to {}", target.kind_name()),
                    ));
                }
                TypeChecker::expect(value, ReturnType::Int)?;
                TypeChecker::expect(target, ReturnType::Unit)?;
                Ok(ReturnType::Unit)
            }
            NodeKind::IfWhen {
                cond,
                then_block,
                else_block,
                ..
            } => {
                TypeChecker::expect(cond, ReturnType::Bool)?;
                TypeChecker::expect(then_block, ReturnType::Unit)?;
                TypeChecker::expect(else_block, ReturnType::Unit)?;
                Ok(ReturnType::Unit)
            }
            NodeKind::FoldedIfWhen {
                op,
                left,
                right,
                then_block,
                else_block,
                ..
            } => {
                TypeChecker::folded_operands(node, *op, left, right)?;
                TypeChecker::expect(then_block, ReturnType::Unit)?;
                TypeChecker::expect(else_block, ReturnType::Unit)?;
                Ok(ReturnType::Unit)
            }
            NodeKind::While { cond, body } => {
                TypeChecker::expect(cond, ReturnType::Bool)?;
                TypeChecker::expect(body, ReturnType::Unit)?;
                Ok(ReturnType::Unit)
            }
            NodeKind::FoldedWhile {
                op,
                left,
                right,
                body,
            } => {
                TypeChecker::folded_operands(node, *op, left, right)?;
                TypeChecker::expect(body, ReturnType::Unit)?;
                Ok(ReturnType::Unit)
            }
            NodeKind::Emit { args, .. } | NodeKind::Call { args, .. } => {
                for arg in args {
                    TypeChecker::expect(arg, ReturnType::Unit)?;
                }
                Ok(ReturnType::Unit)
            }
            NodeKind::EventDecl { .. }
            | NodeKind::SubDecl { .. }
            | NodeKind::CallSub { .. }
            | NodeKind::Return
            | NodeKind::Store { .. } => Ok(ReturnType::Unit),
            NodeKind::BinaryArithmetic { op, left, right } => {
                let (operand, result) = op.signature();
                TypeChecker::expect(left, operand)?;
                TypeChecker::expect(right, operand)?;
                let divides = matches!(op, BinaryOp::Div | BinaryOp::Mod);
                if divides && right.constant_value() == Some(0) {
                    return Err(CompileError::DivisionByZero { pos: node.pos });
                }
                Ok(result)
            }
            NodeKind::UnaryArithmetic { op, operand } => {
                let (expected, result) = op.signature();
                TypeChecker::expect(operand, expected)?;
                Ok(result)
            }
            NodeKind::Immediate(_) | NodeKind::Load { .. } => Ok(ReturnType::Int),
            NodeKind::ArrayWrite { array, index } => {
                TypeChecker::check_index(node, array, index)?;
                Ok(ReturnType::Unit)
            }
            NodeKind::ArrayRead { array, index } => {
                TypeChecker::check_index(node, array, index)?;
                Ok(ReturnType::Int)
            }
            NodeKind::StaticVector(_) | NodeKind::MemoryVector { .. } => Err(CompileError::internal(
                node.pos,
                format!("{} reached type checking unexpanded", node.kind_name()),
            )),
        }
    }

    fn expect(node: &Node, expected: ReturnType) -> Result<(), CompileError> {
        let found = TypeChecker::type_of(node)?;
        if found == expected {
            Ok(())
        } else {
            Err(CompileError::type_mismatch(node.pos, expected, found))
        }
    }

    fn folded_operands(
        node: &Node,
        op: BinaryOp,
        left: &Node,
        right: &Node,
    ) -> Result<(), CompileError> {
        if !op.is_comparison() {
            return Err(CompileError::internal(
                node.pos,
                format!("folded branch on non-comparison operator {}", op),
            ));
        }
        TypeChecker::expect(left, ReturnType::Int)?;
        TypeChecker::expect(right, ReturnType::Int)
    }

    fn check_index(node: &Node, array: &ArrayRef, index: &Node) -> Result<(), CompileError> {
        TypeChecker::expect(index, ReturnType::Int)?;
        if let Some(value) = index.constant_value() {
            if !array.contains(value as i32) {
                return Err(CompileError::OutOfBounds {
                    pos: node.pos,
                    name: array.name.clone(),
                    index: value as i32,
                    size: array.size,
                });
            }
        }
        Ok(())
    }
}
