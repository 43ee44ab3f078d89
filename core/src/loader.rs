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

use crate::ast::{Node, NodeKind, SourcePos};
use serde_json::from_str;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("JSON Parse Error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("{pos}: malformed tree: {message}")]
    Malformed { pos: SourcePos, message: String },
}

/// Reads a parsed program handed over as JSON.
pub fn load_program(json: &str) -> Result<Node, LoadError> {
    let node: Node = from_str(json)?;
    verify_shape(&node)?;
    Ok(node)
}

/// The root must be a program and declarations may only appear directly
/// under it.
fn verify_shape(root: &Node) -> Result<(), LoadError> {
    let NodeKind::Program(stmts) = &root.kind else {
        return Err(LoadError::Malformed {
            pos: root.pos,
            message: format!("root must be a program, found {}", root.kind_name()),
        });
    };
    for stmt in stmts {
        if matches!(stmt.kind, NodeKind::EventDecl { .. } | NodeKind::SubDecl { .. }) {
            continue;
        }
        verify_nested(stmt)?;
    }
    Ok(())
}

fn verify_nested(node: &Node) -> Result<(), LoadError> {
    if matches!(
        node.kind,
        NodeKind::Program(_) | NodeKind::EventDecl { .. } | NodeKind::SubDecl { .. }
    ) {
        return Err(LoadError::Malformed {
            pos: node.pos,
            message: format!("{} not allowed here", node.kind_name()),
        });
    }
    for child in node.children() {
        verify_nested(child)?;
    }
    Ok(())
}
