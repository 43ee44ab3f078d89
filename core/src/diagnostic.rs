/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Brisk compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * Diagnostics raised by the middle end. The first error aborts the
 * compilation; nothing is recovered locally.
 */

use crate::ast::SourcePos;
use crate::types::ReturnType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The tree cannot be lowered to concrete nodes.
    #[error("{pos}: {message}")]
    Structural { pos: SourcePos, message: String },

    #[error("{pos}: expecting {expected} type, found {found} type instead")]
    Type {
        pos: SourcePos,
        expected: ReturnType,
        found: ReturnType,
    },

    #[error("{pos}: index {index} out of bounds for array {name} of size {size}")]
    OutOfBounds {
        pos: SourcePos,
        name: String,
        index: i32,
        size: u16,
    },

    #[error("{pos}: division by zero")]
    DivisionByZero { pos: SourcePos },

    #[error("execution stack will overflow: {required} slots required, {available} available")]
    StackOverflow { required: usize, available: usize },

    #[error("script too big for target bytecode size: {size} words, {capacity} available")]
    ProgramTooLarge { size: usize, capacity: usize },

    /// An earlier pass handed over a tree it should never have produced.
    #[error("{pos}: internal compiler error: {message}")]
    Internal { pos: SourcePos, message: String },
}

impl CompileError {
    pub fn structural(pos: SourcePos, message: impl Into<String>) -> Self {
        CompileError::Structural {
            pos,
            message: message.into(),
        }
    }

    pub fn internal(pos: SourcePos, message: impl Into<String>) -> Self {
        CompileError::Internal {
            pos,
            message: message.into(),
        }
    }

    pub fn type_mismatch(pos: SourcePos, expected: ReturnType, found: ReturnType) -> Self {
        CompileError::Type {
            pos,
            expected,
            found,
        }
    }

    /// Source position of the offending construct. Link-level resource
    /// errors have none.
    pub fn pos(&self) -> Option<SourcePos> {
        match self {
            CompileError::Structural { pos, .. }
            | CompileError::Type { pos, .. }
            | CompileError::OutOfBounds { pos, .. }
            | CompileError::DivisionByZero { pos }
            | CompileError::Internal { pos, .. } => Some(*pos),
            CompileError::StackOverflow { .. } | CompileError::ProgramTooLarge { .. } => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal { .. })
    }
}
