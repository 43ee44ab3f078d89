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

//! Run-time state shared by the tree interpreter and the reference VM.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("memory access at {0} out of range")]
    BadAddress(usize),
    #[error("array index {index} out of bounds for size {size}")]
    IndexOutOfBounds { index: i16, size: u16 },
    #[error("division by zero")]
    DivisionByZero,
    #[error("step limit exceeded")]
    StepLimit,
    #[error("evaluation stack overflow at depth {0}")]
    StackOverflow(usize),
    #[error("evaluation stack underflow")]
    StackUnderflow,
    #[error("invalid instruction {word:#06x} at {pc}")]
    InvalidInstruction { word: u16, pc: usize },
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// An `emit` as observed at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub id: u16,
    pub payload: Vec<i16>,
}

/// A native function call: its id and the argument addresses in declaration
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCall {
    pub id: u16,
    pub arg_addrs: Vec<u16>,
}

/// Flat variable memory, zero-initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    slots: Vec<i16>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Memory {
            slots: vec![0; size],
        }
    }

    pub fn read(&self, addr: u16) -> Result<i16, RuntimeError> {
        self.slots
            .get(addr as usize)
            .copied()
            .ok_or(RuntimeError::BadAddress(addr as usize))
    }

    pub fn write(&mut self, addr: u16, value: i16) -> Result<(), RuntimeError> {
        let slot = self
            .slots
            .get_mut(addr as usize)
            .ok_or(RuntimeError::BadAddress(addr as usize))?;
        *slot = value;
        Ok(())
    }

    pub fn window(&self, addr: u16, size: u16) -> Result<Vec<i16>, RuntimeError> {
        let start = addr as usize;
        let end = start + size as usize;
        self.slots
            .get(start..end)
            .map(|s| s.to_vec())
            .ok_or(RuntimeError::BadAddress(end))
    }

    /// Address of `array[index]` after a run-time bounds check.
    pub fn element_addr(addr: u16, size: u16, index: i16) -> Result<u16, RuntimeError> {
        if index < 0 || index as u16 >= size {
            return Err(RuntimeError::IndexOutOfBounds { index, size });
        }
        Ok(addr + index as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_bounds() {
        let mut memory = Memory::new(4);
        memory.write(3, 7).unwrap();
        assert_eq!(memory.read(3), Ok(7));
        assert_eq!(memory.write(4, 1), Err(RuntimeError::BadAddress(4)));
        assert_eq!(memory.window(2, 2), Ok(vec![0, 7]));
        assert!(memory.window(3, 2).is_err());
    }

    #[test]
    fn test_element_addr() {
        assert_eq!(Memory::element_addr(10, 4, 3), Ok(13));
        assert!(Memory::element_addr(10, 4, 4).is_err());
        assert!(Memory::element_addr(10, 4, -1).is_err());
    }
}
