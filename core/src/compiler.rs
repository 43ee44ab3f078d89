use crate::ast::{Node, NodeKind, SourcePos};
use crate::bytecode::{
    encode_immediate, encode_relative, BytecodeVector, Opcode, PreLinkBytecode, BRANCH_WHEN_BIT,
    INIT_EVENT,
};
use crate::diagnostic::CompileError;
use crate::ops::BinaryOp;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Event(u16),
    Subroutine(u16),
}

/// Walks an optimized program into per-section code. Jumps inside a section
/// are patched as soon as their target is known; subroutine calls and
/// returns are left for the linker.
pub struct Compiler {
    bytecode: PreLinkBytecode,
    current: Section,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            bytecode: PreLinkBytecode::default(),
            current: Section::Event(INIT_EVENT),
        }
    }

    pub fn compile(mut self, program: &Node) -> Result<PreLinkBytecode, CompileError> {
        debug!("code generation");
        let NodeKind::Program(stmts) = &program.kind else {
            return Err(CompileError::internal(
                program.pos,
                format!("code generation expects a program, found {}", program.kind_name()),
            ));
        };

        self.bytecode.events.insert(INIT_EVENT, BytecodeVector::new());
        for stmt in stmts {
            match &stmt.kind {
                NodeKind::EventDecl { event_id } => {
                    Compiler::open(&mut self.bytecode.events, *event_id, stmt.pos)?;
                    self.current = Section::Event(*event_id);
                }
                NodeKind::SubDecl { sub_id } => {
                    Compiler::open(&mut self.bytecode.subroutines, *sub_id, stmt.pos)?;
                    self.current = Section::Subroutine(*sub_id);
                }
                _ => {
                    let out = self.section()?;
                    Compiler::visit(stmt, out)?;
                }
            }
        }
        Ok(self.bytecode)
    }

    fn open(
        sections: &mut BTreeMap<u16, BytecodeVector>,
        id: u16,
        pos: SourcePos,
    ) -> Result<(), CompileError> {
        match sections.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(BytecodeVector::new());
                Ok(())
            }
            Entry::Occupied(_) => Err(CompileError::internal(
                pos,
                format!("section {} declared twice", id),
            )),
        }
    }

    fn section(&mut self) -> Result<&mut BytecodeVector, CompileError> {
        let section = match self.current {
            Section::Event(id) => self.bytecode.events.get_mut(&id),
            Section::Subroutine(id) => self.bytecode.subroutines.get_mut(&id),
        };
        section.ok_or_else(|| {
            CompileError::internal(SourcePos::default(), "current section missing")
        })
    }

    fn visit(node: &Node, out: &mut BytecodeVector) -> Result<(), CompileError> {
        out.set_source_line(node.pos.line);
        match &node.kind {
            NodeKind::Block(stmts) => {
                for stmt in stmts {
                    Compiler::visit(stmt, out)?;
                }
            }
            NodeKind::Assignment { target, value } => {
                Compiler::visit(value, out)?;
                Compiler::visit(target, out)?;
            }
            NodeKind::IfWhen {
                cond,
                then_block,
                else_block,
                edge_sensitive,
                end_line,
            } => {
                Compiler::visit(cond, out)?;
                out.set_source_line(node.pos.line);
                out.write_all(encode_immediate(0).words());
                Compiler::branch(
                    node.pos,
                    BinaryOp::NotEqual,
                    *edge_sensitive,
                    *end_line,
                    then_block,
                    else_block,
                    out,
                )?;
            }
            NodeKind::FoldedIfWhen {
                op,
                left,
                right,
                then_block,
                else_block,
                edge_sensitive,
                end_line,
            } => {
                Compiler::visit(left, out)?;
                Compiler::visit(right, out)?;
                Compiler::branch(
                    node.pos,
                    *op,
                    *edge_sensitive,
                    *end_line,
                    then_block,
                    else_block,
                    out,
                )?;
            }
            NodeKind::While { cond, body } => {
                let start = out.len();
                Compiler::visit(cond, out)?;
                out.set_source_line(node.pos.line);
                out.write_all(encode_immediate(0).words());
                Compiler::loop_body(node.pos, BinaryOp::NotEqual, start, body, out)?;
            }
            NodeKind::FoldedWhile {
                op,
                left,
                right,
                body,
            } => {
                let start = out.len();
                Compiler::visit(left, out)?;
                Compiler::visit(right, out)?;
                Compiler::loop_body(node.pos, *op, start, body, out)?;
            }
            NodeKind::Emit {
                event_id,
                array_addr,
                array_size,
                args,
            } => {
                for arg in args {
                    Compiler::visit(arg, out)?;
                }
                out.set_source_line(node.pos.line);
                out.write(Opcode::Emit.word(*event_id));
                out.write(*array_addr);
                out.write(*array_size);
            }
            NodeKind::Call {
                func_id,
                arg_addrs,
                args,
            } => {
                for arg in args {
                    Compiler::visit(arg, out)?;
                }
                out.set_source_line(node.pos.line);
                for addr in arg_addrs.iter().rev() {
                    out.write_all(encode_immediate(*addr as i16).words());
                }
                out.write(Opcode::NativeCall.word(*func_id));
            }
            NodeKind::CallSub { sub_id } => out.write(Opcode::SubCall.word(*sub_id)),
            // Offset filled in by the linker once the section end is known.
            NodeKind::Return => out.write(Opcode::Jump.word(0)),
            NodeKind::BinaryArithmetic { op, left, right } => {
                Compiler::visit(left, out)?;
                Compiler::visit(right, out)?;
                out.set_source_line(node.pos.line);
                out.write(Opcode::BinaryArithmetic.word(op.code()));
            }
            NodeKind::UnaryArithmetic { op, operand } => {
                Compiler::visit(operand, out)?;
                out.set_source_line(node.pos.line);
                out.write(Opcode::UnaryArithmetic.word(op.code()));
            }
            NodeKind::Immediate(value) => out.write_all(encode_immediate(*value).words()),
            NodeKind::Store { addr } => out.write(Opcode::Store.word(*addr)),
            NodeKind::Load { addr } => out.write(Opcode::Load.word(*addr)),
            NodeKind::ArrayWrite { array, index } => {
                Compiler::visit(index, out)?;
                out.set_source_line(node.pos.line);
                out.write(Opcode::StoreIndirect.word(array.addr));
                out.write(array.size);
            }
            NodeKind::ArrayRead { array, index } => {
                Compiler::visit(index, out)?;
                out.set_source_line(node.pos.line);
                out.write(Opcode::LoadIndirect.word(array.addr));
                out.write(array.size);
            }
            NodeKind::Program(_)
            | NodeKind::EventDecl { .. }
            | NodeKind::SubDecl { .. }
            | NodeKind::StaticVector(_)
            | NodeKind::MemoryVector { .. } => {
                return Err(CompileError::internal(
                    node.pos,
                    format!("cannot generate code for nested {}", node.kind_name()),
                ))
            }
        }
        Ok(())
    }

    /// Branch on the two operands already on the stack. Falls through into
    /// the true block when the condition holds; the displacement word
    /// selects the false block otherwise.
    #[allow(clippy::too_many_arguments)]
    fn branch(
        pos: SourcePos,
        op: BinaryOp,
        edge_sensitive: bool,
        end_line: u32,
        then_block: &Node,
        else_block: &Node,
        out: &mut BytecodeVector,
    ) -> Result<(), CompileError> {
        let mut branch = Opcode::ConditionalBranch.word(op.code());
        if edge_sensitive {
            branch |= BRANCH_WHEN_BIT;
        }
        out.set_source_line(pos.line);
        let branch_at = out.len();
        out.write(branch);
        out.write(0); // placeholder

        Compiler::visit(then_block, out)?;

        if else_block.is_empty_block() {
            out.patch(branch_at + 1, displacement(branch_at, out.len()));
            return Ok(());
        }

        out.set_source_line(end_line);
        let jump_at = out.len();
        out.write(Opcode::Jump.word(0)); // placeholder
        out.patch(branch_at + 1, displacement(branch_at, out.len()));
        Compiler::visit(else_block, out)?;
        let offset = relative(pos, jump_at, out.len())?;
        out.patch(jump_at, Opcode::Jump.word(offset));
        Ok(())
    }

    fn loop_body(
        pos: SourcePos,
        op: BinaryOp,
        start: usize,
        body: &Node,
        out: &mut BytecodeVector,
    ) -> Result<(), CompileError> {
        out.set_source_line(pos.line);
        let branch_at = out.len();
        out.write(Opcode::ConditionalBranch.word(op.code()));
        out.write(0); // placeholder

        Compiler::visit(body, out)?;

        out.set_source_line(pos.line);
        let jump_at = out.len();
        let offset = relative(pos, jump_at, start)?;
        out.write(Opcode::Jump.word(offset));
        out.patch(branch_at + 1, displacement(branch_at, out.len()));
        Ok(())
    }
}

fn displacement(from: usize, to: usize) -> u16 {
    (to as isize - from as isize) as i16 as u16
}

fn relative(pos: SourcePos, from: usize, to: usize) -> Result<u16, CompileError> {
    let offset = to as isize - from as isize;
    encode_relative(offset).ok_or_else(|| {
        CompileError::internal(pos, format!("jump of {} words does not fit", offset))
    })
}
