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

use serde::{Deserialize, Serialize};

/// Resource limits of the VM the program will run on. All sizes are in
/// 16-bit words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetDescription {
    /// Capacity of the bytecode memory, vector table included.
    pub bytecode_size: usize,
    /// Depth of the evaluation stack.
    pub stack_size: usize,
    /// Number of variable slots.
    pub variables_size: usize,
}

impl Default for TargetDescription {
    fn default() -> Self {
        TargetDescription {
            bytecode_size: 1536,
            stack_size: 32,
            variables_size: 620,
        }
    }
}

impl TargetDescription {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let target = TargetDescription::default();
        assert_eq!(target.bytecode_size, 1536);
        assert_eq!(target.stack_size, 32);
        assert_eq!(target.variables_size, 620);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let target = TargetDescription::from_json(r#"{ "stack_size": 8 }"#).unwrap();
        assert_eq!(target.stack_size, 8);
        assert_eq!(target.bytecode_size, 1536);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(TargetDescription::from_json(r#"{ "stack": 8 }"#).is_err());
        assert!(TargetDescription::from_json(r#"{ "stack_size": -1 }"#).is_err());
    }
}
