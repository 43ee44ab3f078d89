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

pub mod ast;
pub mod bytecode;
pub mod checker;
pub mod compiler;
pub mod diagnostic;
#[cfg(test)]
pub mod eval; // tree-walking reference for optimizer tests
pub mod expand;
pub mod linker;
pub mod loader;
pub mod ops;
pub mod optimizer;
pub mod pipeline;
#[cfg(test)]
pub mod runtime;
pub mod target;
pub mod types;
#[cfg(test)]
pub mod vm;

pub use ast::{ArrayRef, Node, NodeKind, SourcePos};
pub use bytecode::Bytecode;
pub use diagnostic::CompileError;
pub use pipeline::{compile, CompileOptions, CompileOutput};
pub use target::TargetDescription;
