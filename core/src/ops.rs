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

//! Operator enumerations shared by every pass.
//!
//! The discriminants are the operator codes understood by the VM's
//! `BINARY_ARITHMETIC`, `UNARY_ARITHMETIC` and `CONDITIONAL_BRANCH`
//! instructions. Constant evaluation mirrors the VM exactly: every value is a
//! 16-bit two's complement integer and every operation wraps.

use crate::types::ReturnType;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum BinaryOp {
    ShiftLeft = 0,
    ShiftRight = 1,
    Add = 2,
    Sub = 3,
    Mult = 4,
    Div = 5,
    Mod = 6,
    BitOr = 7,
    BitXor = 8,
    BitAnd = 9,
    Equal = 10,
    NotEqual = 11,
    BiggerThan = 12,
    BiggerEqual = 13,
    SmallerThan = 14,
    SmallerEqual = 15,
    Or = 16,
    And = 17,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 18] = [
        BinaryOp::ShiftLeft,
        BinaryOp::ShiftRight,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mult,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::BitAnd,
        BinaryOp::Equal,
        BinaryOp::NotEqual,
        BinaryOp::BiggerThan,
        BinaryOp::BiggerEqual,
        BinaryOp::SmallerThan,
        BinaryOp::SmallerEqual,
        BinaryOp::Or,
        BinaryOp::And,
    ];

    pub const COMPARISONS: [BinaryOp; 6] = [
        BinaryOp::Equal,
        BinaryOp::NotEqual,
        BinaryOp::BiggerThan,
        BinaryOp::BiggerEqual,
        BinaryOp::SmallerThan,
        BinaryOp::SmallerEqual,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<BinaryOp> {
        BinaryOp::ALL.get(code as usize).copied()
    }

    pub fn is_comparison(self) -> bool {
        BinaryOp::COMPARISONS.contains(&self)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::Or | BinaryOp::And)
    }

    /// The comparison that holds exactly when `self` does not.
    pub fn inverted(self) -> Option<BinaryOp> {
        let inverse = match self {
            BinaryOp::Equal => BinaryOp::NotEqual,
            BinaryOp::NotEqual => BinaryOp::Equal,
            BinaryOp::BiggerThan => BinaryOp::SmallerEqual,
            BinaryOp::BiggerEqual => BinaryOp::SmallerThan,
            BinaryOp::SmallerThan => BinaryOp::BiggerEqual,
            BinaryOp::SmallerEqual => BinaryOp::BiggerThan,
            _ => return None,
        };
        Some(inverse)
    }

    /// Operand and result types: `(operand, result)`.
    pub fn signature(self) -> (ReturnType, ReturnType) {
        if self.is_logical() {
            (ReturnType::Bool, ReturnType::Bool)
        } else if self.is_comparison() {
            (ReturnType::Int, ReturnType::Bool)
        } else {
            (ReturnType::Int, ReturnType::Int)
        }
    }

    /// Evaluates the operator the way the VM does. `None` on a zero divisor.
    pub fn apply(self, a: i16, b: i16) -> Option<i16> {
        let value = match self {
            BinaryOp::ShiftLeft => a.wrapping_shl(b as u32),
            BinaryOp::ShiftRight => a.wrapping_shr(b as u32),
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mult => a.wrapping_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return None;
                }
                a.wrapping_rem(b)
            }
            BinaryOp::BitOr => a | b,
            BinaryOp::BitXor => a ^ b,
            BinaryOp::BitAnd => a & b,
            BinaryOp::Equal => (a == b) as i16,
            BinaryOp::NotEqual => (a != b) as i16,
            BinaryOp::BiggerThan => (a > b) as i16,
            BinaryOp::BiggerEqual => (a >= b) as i16,
            BinaryOp::SmallerThan => (a < b) as i16,
            BinaryOp::SmallerEqual => (a <= b) as i16,
            BinaryOp::Or => (a != 0 || b != 0) as i16,
            BinaryOp::And => (a != 0 && b != 0) as i16,
        };
        Some(value)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mult => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::BiggerThan => ">",
            BinaryOp::BiggerEqual => ">=",
            BinaryOp::SmallerThan => "<",
            BinaryOp::SmallerEqual => "<=",
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum UnaryOp {
    Neg = 0,
    Abs = 1,
    BitNot = 2,
    Not = 3,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 4] = [UnaryOp::Neg, UnaryOp::Abs, UnaryOp::BitNot, UnaryOp::Not];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<UnaryOp> {
        UnaryOp::ALL.get(code as usize).copied()
    }

    pub fn signature(self) -> (ReturnType, ReturnType) {
        match self {
            UnaryOp::Not => (ReturnType::Bool, ReturnType::Bool),
            _ => (ReturnType::Int, ReturnType::Int),
        }
    }

    pub fn apply(self, a: i16) -> i16 {
        match self {
            UnaryOp::Neg => a.wrapping_neg(),
            UnaryOp::Abs => a.wrapping_abs(),
            UnaryOp::BitNot => !a,
            UnaryOp::Not => (a == 0) as i16,
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Abs => "abs",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "not",
        };
        f.write_str(text)
    }
}
