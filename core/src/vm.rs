use crate::bytecode::{
    argument, signed_argument, Bytecode, Opcode, BRANCH_OPERATOR_MASK, BRANCH_WAS_TRUE_BIT,
    BRANCH_WHEN_BIT,
};
use crate::ops::{BinaryOp, UnaryOp};
use crate::runtime::{EmittedEvent, Memory, NativeCall, RuntimeError};

const STEP_LIMIT: usize = 1_000_000;

/// Reference interpreter for linked bytecode. Keeps the edge detector bits
/// of `when` branches in the code itself, the way the target does.
pub struct VM {
    pub code: Vec<u16>,
    pub memory: Memory,
    pub stack: Vec<i16>,
    pub stack_size: usize,
    /// Deepest evaluation stack seen so far.
    pub max_depth: usize,
    pub emitted: Vec<EmittedEvent>,
    pub native_calls: Vec<NativeCall>,
    frames: Vec<usize>,
    events: Vec<(u16, u16)>,
}

impl VM {
    pub fn new(bytecode: &Bytecode, memory_size: usize, stack_size: usize) -> Self {
        Self {
            code: bytecode.words.clone(),
            memory: Memory::new(memory_size),
            stack: Vec::new(),
            stack_size,
            max_depth: 0,
            emitted: Vec::new(),
            native_calls: Vec::new(),
            frames: Vec::new(),
            events: bytecode.events(),
        }
    }

    /// Runs the handler of `event`. Events without a handler do nothing.
    pub fn run_event(&mut self, event: u16) -> Result<(), RuntimeError> {
        let Some(&(_, addr)) = self.events.iter().find(|(id, _)| *id == event) else {
            return Ok(());
        };
        self.run(addr as usize)
    }

    fn run(&mut self, mut ip: usize) -> Result<(), RuntimeError> {
        for _ in 0..STEP_LIMIT {
            let word = self.fetch(ip)?;
            let op = Opcode::decode(word).ok_or(RuntimeError::InvalidInstruction { word, pc: ip })?;
            let arg = argument(word);

            match op {
                Opcode::Stop => {
                    if !self.stack.is_empty() {
                        return Err(RuntimeError::Unsupported(format!(
                            "{} values left on the stack",
                            self.stack.len()
                        )));
                    }
                    return Ok(());
                }
                Opcode::SmallImmediate => {
                    self.push(signed_argument(word))?;
                    ip += 1;
                }
                Opcode::LargeImmediate => {
                    let value = self.fetch(ip + 1)? as i16;
                    self.push(value)?;
                    ip += 2;
                }
                Opcode::Load => {
                    let value = self.memory.read(arg)?;
                    self.push(value)?;
                    ip += 1;
                }
                Opcode::Store => {
                    let value = self.pop()?;
                    self.memory.write(arg, value)?;
                    ip += 1;
                }
                Opcode::LoadIndirect => {
                    let size = self.fetch(ip + 1)?;
                    let index = self.pop()?;
                    let value = self.memory.read(Memory::element_addr(arg, size, index)?)?;
                    self.push(value)?;
                    ip += 2;
                }
                Opcode::StoreIndirect => {
                    let size = self.fetch(ip + 1)?;
                    let index = self.pop()?;
                    let value = self.pop()?;
                    self.memory.write(Memory::element_addr(arg, size, index)?, value)?;
                    ip += 2;
                }
                Opcode::UnaryArithmetic => {
                    let op = UnaryOp::from_code(arg)
                        .ok_or(RuntimeError::InvalidInstruction { word, pc: ip })?;
                    let a = self.pop()?;
                    self.push(op.apply(a))?;
                    ip += 1;
                }
                Opcode::BinaryArithmetic => {
                    let op = BinaryOp::from_code(arg)
                        .ok_or(RuntimeError::InvalidInstruction { word, pc: ip })?;
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(op.apply(a, b).ok_or(RuntimeError::DivisionByZero)?)?;
                    ip += 1;
                }
                Opcode::Jump => {
                    ip = offset(ip, signed_argument(word) as isize);
                }
                Opcode::ConditionalBranch => {
                    let op = BinaryOp::from_code(word & BRANCH_OPERATOR_MASK)
                        .ok_or(RuntimeError::InvalidInstruction { word, pc: ip })?;
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let holds = op.apply(a, b).ok_or(RuntimeError::DivisionByZero)? != 0;
                    let displacement = self.fetch(ip + 1)? as i16 as isize;
                    let when = word & BRANCH_WHEN_BIT != 0;
                    let was_true = word & BRANCH_WAS_TRUE_BIT != 0;
                    if holds {
                        self.code[ip] |= BRANCH_WAS_TRUE_BIT;
                        ip = if when && was_true { offset(ip, displacement) } else { ip + 2 };
                    } else {
                        self.code[ip] &= !BRANCH_WAS_TRUE_BIT;
                        ip = offset(ip, displacement);
                    }
                }
                Opcode::Emit => {
                    let addr = self.fetch(ip + 1)?;
                    let size = self.fetch(ip + 2)?;
                    let payload = self.memory.window(addr, size)?;
                    self.emitted.push(EmittedEvent { id: arg, payload });
                    ip += 3;
                }
                Opcode::NativeCall => {
                    // Argument addresses were pushed last to first.
                    let mut arg_addrs = Vec::new();
                    while let Some(addr) = self.stack.pop() {
                        arg_addrs.push(addr as u16);
                    }
                    self.native_calls.push(NativeCall { id: arg, arg_addrs });
                    ip += 1;
                }
                Opcode::SubCall => {
                    self.frames.push(ip + 1);
                    ip = arg as usize;
                }
                Opcode::SubRet => {
                    ip = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
                }
            }
        }
        Err(RuntimeError::StepLimit)
    }

    fn fetch(&self, ip: usize) -> Result<u16, RuntimeError> {
        self.code.get(ip).copied().ok_or(RuntimeError::BadAddress(ip))
    }

    fn push(&mut self, value: i16) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.stack_size {
            return Err(RuntimeError::StackOverflow(self.stack.len() + 1));
        }
        self.stack.push(value);
        self.max_depth = self.max_depth.max(self.stack.len());
        Ok(())
    }

    fn pop(&mut self) -> Result<i16, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }
}

fn offset(ip: usize, delta: isize) -> usize {
    (ip as isize + delta) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::INIT_EVENT;
    use std::collections::BTreeMap;

    fn image(words: Vec<u16>) -> Bytecode {
        let lines = vec![0; words.len()];
        Bytecode {
            words,
            lines,
            subroutines: BTreeMap::new(),
        }
    }

    #[test]
    #[rustfmt::skip]
    fn test_arithmetic_and_store() {
        // x = (3 + 4) * -2
        let bytecode = image(vec![
            3, INIT_EVENT, 3,
            0x1003, 0x1004, 0x8002, 0x1FFE, 0x8004, 0x4000, 0x0000,
        ]);
        let mut vm = VM::new(&bytecode, 4, 8);
        vm.run_event(INIT_EVENT).unwrap();
        assert_eq!(vm.memory.read(0), Ok(-14));
        assert_eq!(vm.max_depth, 2);
    }

    #[test]
    #[rustfmt::skip]
    fn test_when_branch_tracks_edges() {
        // when m0 > 0 do m1 = m1 + 1
        let bytecode = image(vec![
            3, 1, 3,
            0x3000, 0x1000, 0xA10C, 6,
            0x3001, 0x1001, 0x8002, 0x4001,
            0x0000,
        ]);
        let mut vm = VM::new(&bytecode, 4, 8);
        for value in [1, 1, 0, 1] {
            vm.memory.write(0, value).unwrap();
            vm.run_event(1).unwrap();
        }
        assert_eq!(vm.memory.read(1), Ok(2));
    }

    #[test]
    fn test_stack_limit() {
        let bytecode = image(vec![3, 1, 3, 0x1001, 0x1002, 0x1003, 0x8002, 0x8002, 0x4000, 0x0000]);
        let mut vm = VM::new(&bytecode, 1, 2);
        assert_eq!(vm.run_event(1), Err(RuntimeError::StackOverflow(3)));
    }

    #[test]
    fn test_missing_handler_is_a_no_op() {
        let mut vm = VM::new(&image(vec![1]), 1, 1);
        assert_eq!(vm.run_event(9), Ok(()));
    }
}
