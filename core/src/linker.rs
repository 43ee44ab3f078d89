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

//! Turns per-section code into one relocated image.
//!
//! Image layout:
//!
//! ```text
//! [0]            vector table size (1 + 2 * events)
//! [1 .. table]   (event id, address) pairs, ascending ids
//! [table ..]     event handlers, same order, each ending in STOP
//! [..]           subroutines, ascending ids, each ending in SUB_RET
//! ```

use crate::ast::SourcePos;
use crate::bytecode::{
    argument, encode_relative, for_each_instruction, Bytecode, BytecodeVector, Opcode,
    PreLinkBytecode, MAX_ADDRESS,
};
use crate::diagnostic::CompileError;
use crate::target::TargetDescription;
use std::collections::BTreeMap;
use tracing::debug;

pub fn link(
    prelink: PreLinkBytecode,
    target: &TargetDescription,
) -> Result<Bytecode, CompileError> {
    debug!("linking");
    let PreLinkBytecode {
        mut events,
        mut subroutines,
    } = prelink;

    // Handlers without code need neither a vector nor a STOP.
    events.retain(|_, code| !code.is_empty());
    for code in events.values_mut() {
        terminate(code, Opcode::Stop)?;
    }
    for code in subroutines.values_mut() {
        terminate(code, Opcode::SubRet)?;
    }

    let table_size = 1 + 2 * events.len();
    let size = table_size
        + events.values().map(BytecodeVector::len).sum::<usize>()
        + subroutines.values().map(BytecodeVector::len).sum::<usize>();
    if size > target.bytecode_size {
        return Err(CompileError::ProgramTooLarge {
            size,
            capacity: target.bytecode_size,
        });
    }

    let mut words = vec![0u16; table_size];
    let mut lines = vec![0u32; table_size];
    words[0] = table_size as u16;
    for (slot, (id, code)) in events.iter().enumerate() {
        words[1 + 2 * slot] = *id;
        words[2 + 2 * slot] = words.len() as u16;
        append(&mut words, &mut lines, code);
    }

    let mut addresses = BTreeMap::new();
    for (id, code) in &subroutines {
        addresses.insert(*id, words.len() as u16);
        append(&mut words, &mut lines, code);
    }

    resolve_calls(&mut words, &lines, table_size, &addresses)?;
    debug!(size = words.len(), events = events.len(), subroutines = addresses.len(), "linked");

    Ok(Bytecode {
        words,
        lines,
        subroutines: addresses,
    })
}

/// Appends the terminal instruction and points every return at it.
fn terminate(code: &mut BytecodeVector, terminal: Opcode) -> Result<(), CompileError> {
    let line = code.last_line();
    code.set_source_line(line);
    code.write(terminal.word(0));
    let end = code.len() - 1;

    let words = code.words();
    let mut returns = Vec::new();
    for_each_instruction(&words, 0, |pc, opcode| {
        if opcode == Opcode::Jump && argument(words[pc]) == 0 {
            returns.push(pc);
        }
    })
    .map_err(|pc| invalid_word(words[pc], line))?;

    for pc in returns {
        let offset = encode_relative(end as isize - pc as isize).ok_or_else(|| {
            CompileError::internal(
                SourcePos::new(code.elements[pc].line, 0),
                "return too far from the end of its section",
            )
        })?;
        code.patch(pc, Opcode::Jump.word(offset));
    }
    Ok(())
}

fn append(words: &mut Vec<u16>, lines: &mut Vec<u32>, code: &BytecodeVector) {
    for element in &code.elements {
        words.push(element.word);
        lines.push(element.line);
    }
}

fn resolve_calls(
    words: &mut [u16],
    lines: &[u32],
    start: usize,
    addresses: &BTreeMap<u16, u16>,
) -> Result<(), CompileError> {
    let mut calls = Vec::new();
    for_each_instruction(words, start, |pc, opcode| {
        if opcode == Opcode::SubCall {
            calls.push(pc);
        }
    })
    .map_err(|pc| invalid_word(words[pc], lines[pc]))?;

    for pc in calls {
        let pos = SourcePos::new(lines[pc], 0);
        let id = argument(words[pc]);
        let addr = *addresses.get(&id).ok_or_else(|| {
            CompileError::internal(pos, format!("call to undefined subroutine {}", id))
        })?;
        if addr as usize > MAX_ADDRESS {
            return Err(CompileError::internal(
                pos,
                format!("subroutine {} at {} is out of call range", id, addr),
            ));
        }
        words[pc] = Opcode::SubCall.word(addr);
    }
    Ok(())
}

fn invalid_word(word: u16, line: u32) -> CompileError {
    CompileError::internal(
        SourcePos::new(line, 0),
        format!("invalid instruction word {:#06x}", word),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::INIT_EVENT;

    fn section(words: &[u16]) -> BytecodeVector {
        let mut code = BytecodeVector::new();
        code.set_source_line(1);
        code.write_all(words);
        code
    }

    #[test]
    #[rustfmt::skip]
    fn test_layout() {
        let mut prelink = PreLinkBytecode::default();
        prelink.events.insert(INIT_EVENT, section(&[0x1001, 0x4000]));
        prelink.events.insert(2, section(&[0xD007]));
        prelink.events.insert(5, BytecodeVector::new());
        prelink.subroutines.insert(7, section(&[0x3000]));

        let bytecode = link(prelink, &TargetDescription::default()).unwrap();
        assert_eq!(
            bytecode.words,
            vec![
                5, 2, 5, INIT_EVENT, 7,
                0xD00A, 0x0000,
                0x1001, 0x4000, 0x0000,
                0x3000, 0xE000,
            ]
        );
        assert_eq!(bytecode.subroutines.get(&7), Some(&10));
        assert_eq!(bytecode.event_address(5), None);
        assert_eq!(bytecode.lines.len(), bytecode.words.len());
    }

    #[test]
    fn test_returns_jump_to_section_end() {
        let mut prelink = PreLinkBytecode::default();
        // a large immediate whose value looks like a return must be left alone
        prelink.events.insert(1, section(&[0x9000, 0x2000, 0x9000, 0x4000, 0x9000]));
        prelink.subroutines.insert(0, section(&[0x9000]));
        let bytecode = link(prelink, &TargetDescription::default()).unwrap();
        assert_eq!(
            bytecode.words,
            vec![3, 1, 3, 0x9005, 0x2000, 0x9000, 0x4000, 0x9001, 0x0000, 0x9001, 0xE000]
        );
    }

    #[test]
    fn test_undefined_subroutine_is_internal() {
        let mut prelink = PreLinkBytecode::default();
        prelink.events.insert(INIT_EVENT, section(&[0xD003]));
        let err = link(prelink, &TargetDescription::default()).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_program_too_large() {
        let mut prelink = PreLinkBytecode::default();
        prelink.events.insert(INIT_EVENT, section(&[0x1001; 10]));
        let target = TargetDescription {
            bytecode_size: 12,
            ..TargetDescription::default()
        };
        // 3 table words + 10 + STOP
        assert_eq!(
            link(prelink, &target),
            Err(CompileError::ProgramTooLarge {
                size: 14,
                capacity: 12
            })
        );
    }

    #[test]
    fn test_empty_program_links_to_bare_table() {
        let bytecode = link(PreLinkBytecode::default(), &TargetDescription::default()).unwrap();
        assert_eq!(bytecode.words, vec![1]);
        assert!(bytecode.events().is_empty());
    }
}
