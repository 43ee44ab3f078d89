use crate::ops::{BinaryOp, UnaryOp};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Pseudo event holding the code that precedes the first declaration.
pub const INIT_EVENT: u16 = 0xFFFF;

pub const ARGUMENT_MASK: u16 = 0x0FFF;
pub const BRANCH_OPERATOR_MASK: u16 = 0x00FF;
/// Set on a conditional branch that only fires on a false to true edge.
pub const BRANCH_WHEN_BIT: u16 = 1 << 8;
/// Edge detector state, written back into the instruction by the VM.
pub const BRANCH_WAS_TRUE_BIT: u16 = 1 << 9;

pub const SMALL_IMMEDIATE_MIN: i16 = -2048;
pub const SMALL_IMMEDIATE_MAX: i16 = 2047;

/// Largest address a 12-bit argument can hold.
pub const MAX_ADDRESS: usize = ARGUMENT_MASK as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    Stop = 0x0,
    SmallImmediate = 0x1,
    LargeImmediate = 0x2,
    Load = 0x3,
    Store = 0x4,
    LoadIndirect = 0x5,
    StoreIndirect = 0x6,
    UnaryArithmetic = 0x7,
    BinaryArithmetic = 0x8,
    Jump = 0x9,
    ConditionalBranch = 0xA,
    Emit = 0xB,
    NativeCall = 0xC,
    SubCall = 0xD,
    SubRet = 0xE,
}

impl Opcode {
    /// Instruction word carrying `arg` in its low 12 bits.
    pub fn word(self, arg: u16) -> u16 {
        ((self as u16) << 12) | (arg & ARGUMENT_MASK)
    }

    pub fn decode(word: u16) -> Option<Opcode> {
        let opcode = match word >> 12 {
            0x0 => Opcode::Stop,
            0x1 => Opcode::SmallImmediate,
            0x2 => Opcode::LargeImmediate,
            0x3 => Opcode::Load,
            0x4 => Opcode::Store,
            0x5 => Opcode::LoadIndirect,
            0x6 => Opcode::StoreIndirect,
            0x7 => Opcode::UnaryArithmetic,
            0x8 => Opcode::BinaryArithmetic,
            0x9 => Opcode::Jump,
            0xA => Opcode::ConditionalBranch,
            0xB => Opcode::Emit,
            0xC => Opcode::NativeCall,
            0xD => Opcode::SubCall,
            0xE => Opcode::SubRet,
            _ => return None,
        };
        Some(opcode)
    }

    /// Number of words the instruction occupies, including its own.
    pub fn size(self) -> usize {
        match self {
            Opcode::LargeImmediate
            | Opcode::LoadIndirect
            | Opcode::StoreIndirect
            | Opcode::ConditionalBranch => 2,
            Opcode::Emit => 3,
            _ => 1,
        }
    }
}

pub fn argument(word: u16) -> u16 {
    word & ARGUMENT_MASK
}

/// The 12-bit argument read as two's complement.
pub fn signed_argument(word: u16) -> i16 {
    ((word << 4) as i16) >> 4
}

/// 12-bit field for a relative jump, `None` when out of range.
pub fn encode_relative(offset: isize) -> Option<u16> {
    if offset < SMALL_IMMEDIATE_MIN as isize || offset > SMALL_IMMEDIATE_MAX as isize {
        return None;
    }
    Some((offset as i16 as u16) & ARGUMENT_MASK)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateEncoding {
    Small(u16),
    Large([u16; 2]),
}

impl ImmediateEncoding {
    pub fn words(&self) -> &[u16] {
        match self {
            ImmediateEncoding::Small(word) => std::slice::from_ref(word),
            ImmediateEncoding::Large(words) => words,
        }
    }
}

/// Compact form when the value fits 12 signed bits. Depends on the value only.
pub fn encode_immediate(value: i16) -> ImmediateEncoding {
    if (SMALL_IMMEDIATE_MIN..=SMALL_IMMEDIATE_MAX).contains(&value) {
        ImmediateEncoding::Small(Opcode::SmallImmediate.word(value as u16))
    } else {
        ImmediateEncoding::Large([Opcode::LargeImmediate.word(0), value as u16])
    }
}

/// Calls `f(pc, opcode)` for each instruction start. Fails with the offset
/// of the first word that is not a valid opcode.
pub fn for_each_instruction(
    words: &[u16],
    start: usize,
    mut f: impl FnMut(usize, Opcode),
) -> Result<(), usize> {
    let mut pc = start;
    while pc < words.len() {
        let opcode = Opcode::decode(words[pc]).ok_or(pc)?;
        f(pc, opcode);
        pc += opcode.size();
    }
    Ok(())
}

/// One word of code with the source line it was emitted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytecodeElement {
    pub word: u16,
    pub line: u32,
}

/// Code of one section (an event handler or a subroutine) before linking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BytecodeVector {
    pub elements: Vec<BytecodeElement>,
    current_line: u32,
}

impl BytecodeVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source line for subsequent writes
    pub fn set_source_line(&mut self, line: u32) {
        self.current_line = line;
    }

    pub fn write(&mut self, word: u16) {
        tracing::trace!(at = self.elements.len(), word, line = self.current_line, "emit");
        self.elements.push(BytecodeElement {
            word,
            line: self.current_line,
        });
    }

    pub fn write_all(&mut self, words: &[u16]) {
        for word in words {
            self.write(*word);
        }
    }

    /// Overwrites a previously written placeholder.
    pub fn patch(&mut self, at: usize, word: u16) {
        if let Some(element) = self.elements.get_mut(at) {
            element.word = word;
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn words(&self) -> Vec<u16> {
        self.elements.iter().map(|e| e.word).collect()
    }

    pub fn last_line(&self) -> u32 {
        self.elements.last().map(|e| e.line).unwrap_or(self.current_line)
    }
}

/// Emitter output: one code vector per event and per subroutine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreLinkBytecode {
    pub events: BTreeMap<u16, BytecodeVector>,
    pub subroutines: BTreeMap<u16, BytecodeVector>,
}

/// Linked program image: event vector table followed by code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bytecode {
    pub words: Vec<u16>,
    pub lines: Vec<u32>,
    /// Subroutine id to absolute address.
    pub subroutines: BTreeMap<u16, u16>,
}

impl Bytecode {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn vector_table_size(&self) -> usize {
        self.words.first().copied().unwrap_or(0) as usize
    }

    /// `(event id, address)` pairs of the vector table.
    pub fn events(&self) -> Vec<(u16, u16)> {
        let end = self.vector_table_size().min(self.words.len());
        self.words
            .get(1..end)
            .unwrap_or(&[])
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    pub fn event_address(&self, id: u16) -> Option<u16> {
        self.events()
            .into_iter()
            .find(|(event, _)| *event == id)
            .map(|(_, addr)| addr)
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let events = self.events();
        out.push_str(&format!("vector table: {} words\n", self.vector_table_size()));

        let mut labels: HashMap<usize, String> = HashMap::new();
        for (id, addr) in &events {
            let name = event_name(*id);
            out.push_str(&format!("{} -> {}\n", name, addr));
            labels.insert(*addr as usize, name);
        }
        for (id, addr) in &self.subroutines {
            labels.insert(*addr as usize, format!("sub {}", id));
        }

        let mut pc = self.vector_table_size();
        while pc < self.words.len() {
            if let Some(label) = labels.get(&pc) {
                out.push_str(&format!("{}:\n", label));
            }
            let (text, size) = self.instruction_text(pc);
            out.push_str(&format!("{}: {}\n", pc, text));
            pc += size;
        }
        out
    }

    fn instruction_text(&self, pc: usize) -> (String, usize) {
        let word = self.words[pc];
        let arg = argument(word);
        let extra = |i: usize| self.words.get(pc + i).copied().unwrap_or(0);
        let Some(opcode) = Opcode::decode(word) else {
            return (format!("invalid {:#06x}", word), 1);
        };
        let text = match opcode {
            Opcode::Stop => "stop".to_string(),
            Opcode::SmallImmediate => format!("small_imm {}", signed_argument(word)),
            Opcode::LargeImmediate => format!("large_imm {}", extra(1) as i16),
            Opcode::Load => format!("load {}", arg),
            Opcode::Store => format!("store {}", arg),
            Opcode::LoadIndirect => format!("load_ind {} size {}", arg, extra(1)),
            Opcode::StoreIndirect => format!("store_ind {} size {}", arg, extra(1)),
            Opcode::UnaryArithmetic => match UnaryOp::from_code(arg) {
                Some(op) => format!("unary {}", op),
                None => format!("unary ?{}", arg),
            },
            Opcode::BinaryArithmetic => match BinaryOp::from_code(arg) {
                Some(op) => format!("binary {}", op),
                None => format!("binary ?{}", arg),
            },
            Opcode::Jump => {
                let offset = signed_argument(word) as isize;
                format!("jump {:+} -> {}", offset, pc as isize + offset)
            }
            Opcode::ConditionalBranch => {
                let op = BinaryOp::from_code(word & BRANCH_OPERATOR_MASK)
                    .map(|op| op.to_string())
                    .unwrap_or_else(|| "?".to_string());
                let kind = if word & BRANCH_WHEN_BIT != 0 { "when" } else { "if" };
                let disp = extra(1) as i16 as isize;
                format!("{} {} else -> {}", kind, op, pc as isize + disp)
            }
            Opcode::Emit => format!("emit {} addr {} size {}", arg, extra(1), extra(2)),
            Opcode::NativeCall => format!("ncall {}", arg),
            Opcode::SubCall => format!("scall {}", arg),
            Opcode::SubRet => "ret".to_string(),
        };
        (text, opcode.size().min(self.words.len() - pc))
    }
}

fn event_name(id: u16) -> String {
    if id == INIT_EVENT {
        "init".to_string()
    } else {
        format!("event {}", id)
    }
}
