// A function is the unit of compilation. It owns every table its instructions index into:
// the register file with its tuples, the immediate value table and the label to block map.
// Functions are built in two phases. A `FunctionBuilder` accumulates registers, values and
// instructions and records misuse (index overflow, labels bound twice) without failing
// early; `finish` reports the first problem or freezes everything into an immutable
// `Function`. After that point only read accessors exist, all of them bounds checked.

//! Functions, basic blocks and the function builder.

use super::error::{IrError, IrResult};
use super::instruction::{Instruction, LabelIndex, LabelInstruction, ValueIndex};
use super::register::{Register, RegisterFile, RegisterIndex, TupleIndex};
use super::types::RegisterFamily;
use super::value::Value;
use std::fmt;

/// Program-order sequence number of an instruction in its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub u32);

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Straight-line sequence of instructions. The first instruction is always
/// the label of the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    label: LabelIndex,
    insns: Vec<Instruction>,
}

impl BasicBlock {
    pub fn label(&self) -> LabelIndex {
        self.label
    }

    pub fn insns(&self) -> &[Instruction] {
        &self.insns
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }
}

/// Immutable IR function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: String,
    file: RegisterFile,
    values: Vec<Value>,
    /// Block bound to each label.
    label_blocks: Vec<u32>,
    blocks: Vec<BasicBlock>,
    /// Id of the first instruction of each block.
    block_starts: Vec<u32>,
    insn_num: u32,
    inputs: Vec<RegisterIndex>,
    outputs: Vec<RegisterIndex>,
    simd_width: Option<u32>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SIMD width requested by the front end, if any.
    pub fn simd_width(&self) -> Option<u32> {
        self.simd_width
    }

    pub fn register_file(&self) -> &RegisterFile {
        &self.file
    }

    pub fn reg_num(&self) -> usize {
        self.file.reg_num()
    }

    pub fn tuple_num(&self) -> usize {
        self.file.tuple_num()
    }

    pub fn value_num(&self) -> usize {
        self.values.len()
    }

    pub fn label_num(&self) -> usize {
        self.label_blocks.len()
    }

    pub fn inputs(&self) -> &[RegisterIndex] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[RegisterIndex] {
        &self.outputs
    }

    pub fn is_output(&self, reg: RegisterIndex) -> bool {
        self.outputs.contains(&reg)
    }

    pub fn get_register(&self, index: RegisterIndex) -> IrResult<Register> {
        self.file.get(index)
    }

    /// Register at position `which` of `tuple`.
    pub fn get_register_index(&self, tuple: TupleIndex, which: u32) -> IrResult<RegisterIndex> {
        self.file.get_tuple_entry(tuple, which)
    }

    pub fn tuple(&self, tuple: TupleIndex) -> IrResult<&[RegisterIndex]> {
        self.file.tuple(tuple)
    }

    pub fn get_value(&self, index: ValueIndex) -> IrResult<Value> {
        self.values
            .get(index.index())
            .copied()
            .ok_or(IrError::OutOfRange {
                what: "value",
                index: index.0 as u32,
                len: self.values.len() as u32,
            })
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block_num(&self) -> usize {
        self.blocks.len()
    }

    /// Index of the block bound to `label`.
    pub fn label_block(&self, label: LabelIndex) -> IrResult<usize> {
        self.label_blocks
            .get(label.index())
            .map(|&b| b as usize)
            .ok_or(IrError::OutOfRange {
                what: "label",
                index: label.0 as u32,
                len: self.label_blocks.len() as u32,
            })
    }

    /// Total number of instructions, labels included.
    pub fn insn_num(&self) -> u32 {
        self.insn_num
    }

    /// Id of instruction `index` of block `block`.
    pub fn insn_id(&self, block: usize, index: usize) -> IrResult<InsnId> {
        let start = *self.block_starts.get(block).ok_or(IrError::OutOfRange {
            what: "block",
            index: block as u32,
            len: self.blocks.len() as u32,
        })?;
        let len = self.blocks[block].len();
        if index >= len {
            return Err(IrError::OutOfRange {
                what: "instruction",
                index: index as u32,
                len: len as u32,
            });
        }
        Ok(InsnId(start + index as u32))
    }

    pub fn insn(&self, id: InsnId) -> IrResult<&Instruction> {
        let out_of_range = IrError::OutOfRange {
            what: "instruction",
            index: id.0,
            len: self.insn_num,
        };
        if id.0 >= self.insn_num {
            return Err(out_of_range);
        }
        // Last block starting at or before `id`.
        let block = self.block_starts.partition_point(|&start| start <= id.0) - 1;
        self.blocks[block]
            .insns
            .get((id.0 - self.block_starts[block]) as usize)
            .ok_or(out_of_range)
    }

    /// All instructions in program order.
    pub fn insns(&self) -> impl Iterator<Item = (InsnId, &Instruction)> + '_ {
        self.blocks
            .iter()
            .flat_map(|block| block.insns.iter())
            .enumerate()
            .map(|(i, insn)| (InsnId(i as u32), insn))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".function {}", self.name)?;
        if let Some(w) = self.simd_width {
            write!(f, " simd{w}")?;
        }
        writeln!(f)?;

        let list = |regs: &[RegisterIndex]| {
            regs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(" ")
        };
        writeln!(f, ".inputs {}", list(&self.inputs))?;
        writeln!(f, ".outputs {}", list(&self.outputs))?;
        for i in 0..self.file.reg_num() {
            if let Ok(reg) = self.file.get(RegisterIndex(i as u16)) {
                let uniform = if reg.uniform { ".uniform" } else { "" };
                writeln!(f, ".reg {}:{}{}", reg.index, reg.family, uniform)?;
            }
        }
        for t in 0..self.file.tuple_num() {
            let tuple = TupleIndex(t as u16);
            if let Ok(regs) = self.file.tuple(tuple) {
                writeln!(f, ".tuple {} = {{{}}}", tuple, list(regs))?;
            }
        }
        for (i, value) in self.values.iter().enumerate() {
            writeln!(f, ".value ${i} = {value}:{}", value.ty())?;
        }

        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for insn in block.insns.iter().skip(1) {
                writeln!(f, "    {insn}")?;
            }
        }
        Ok(())
    }
}

/// Incrementally builds a [`Function`].
///
/// Misuse is recorded and reported by [`finish`](Self::finish), so building
/// code does not need to handle errors at every step.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    file: RegisterFile,
    values: Vec<Value>,
    label_blocks: Vec<Option<u32>>,
    blocks: Vec<BasicBlock>,
    inputs: Vec<RegisterIndex>,
    outputs: Vec<RegisterIndex>,
    simd_width: Option<u32>,
    error: Option<IrError>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: RegisterFile::new(),
            values: Vec::new(),
            label_blocks: Vec::new(),
            blocks: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            simd_width: None,
            error: None,
        }
    }

    fn fail(&mut self, error: IrError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn new_reg(&mut self, family: RegisterFamily, uniform: bool) -> RegisterIndex {
        match self.file.append(family, uniform) {
            Some(index) => index,
            None => {
                self.fail(IrError::TooMany { what: "registers" });
                RegisterIndex(u16::MAX)
            }
        }
    }

    /// New per-lane register.
    pub fn reg(&mut self, family: RegisterFamily) -> RegisterIndex {
        self.new_reg(family, false)
    }

    /// New register holding one value shared by all lanes.
    pub fn uniform_reg(&mut self, family: RegisterFamily) -> RegisterIndex {
        self.new_reg(family, true)
    }

    /// New immutable tuple holding `regs` in order.
    pub fn tuple(&mut self, regs: &[RegisterIndex]) -> TupleIndex {
        match self.file.append_tuple(regs) {
            Some(index) => index,
            None => {
                self.fail(IrError::TooMany { what: "tuples" });
                TupleIndex(u16::MAX)
            }
        }
    }

    /// Add an immediate to the value table.
    pub fn immediate(&mut self, value: Value) -> ValueIndex {
        match u16::try_from(self.values.len()) {
            Ok(index) => {
                self.values.push(value);
                ValueIndex(index)
            }
            Err(_) => {
                self.fail(IrError::TooMany { what: "values" });
                ValueIndex(u16::MAX)
            }
        }
    }

    /// New label, not bound to any block yet.
    pub fn new_label(&mut self) -> LabelIndex {
        match u16::try_from(self.label_blocks.len()) {
            Ok(index) => {
                self.label_blocks.push(None);
                LabelIndex(index)
            }
            Err(_) => {
                self.fail(IrError::TooMany { what: "labels" });
                LabelIndex(u16::MAX)
            }
        }
    }

    /// Start a new block bound to `label`. The label instruction is appended
    /// as its first instruction.
    pub fn start_block(&mut self, label: LabelIndex) {
        let block = self.blocks.len() as u32;
        match self.label_blocks.get(label.index()).copied() {
            None => {
                let len = self.label_blocks.len() as u32;
                self.fail(IrError::OutOfRange {
                    what: "label",
                    index: label.0 as u32,
                    len,
                });
            }
            Some(Some(_)) => self.fail(IrError::LabelAlreadyBound(label)),
            Some(None) => {
                self.label_blocks[label.index()] = Some(block);
                self.blocks.push(BasicBlock {
                    label,
                    insns: vec![Instruction::label(label)],
                });
            }
        }
    }

    /// Append an instruction to the current block. A label instruction starts
    /// a new block instead.
    pub fn append(&mut self, insn: Instruction) {
        if let Some(label) = insn.try_cast::<LabelInstruction>() {
            self.start_block(label.label());
            return;
        }
        if self.blocks.is_empty() {
            let entry = self.new_label();
            self.start_block(entry);
        }
        if let Some(block) = self.blocks.last_mut() {
            block.insns.push(insn);
        }
    }

    /// Declare `reg` as the next kernel argument.
    pub fn input(&mut self, reg: RegisterIndex) {
        self.inputs.push(reg);
    }

    /// Declare `reg` as live out of the function.
    pub fn output(&mut self, reg: RegisterIndex) {
        self.outputs.push(reg);
    }

    pub fn simd_width(&mut self, width: u32) {
        self.simd_width = Some(width);
    }

    /// Freeze the function.
    pub fn finish(self) -> IrResult<Function> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut label_blocks = Vec::with_capacity(self.label_blocks.len());
        for (i, block) in self.label_blocks.iter().enumerate() {
            match block {
                Some(block) => label_blocks.push(*block),
                None => return Err(IrError::UnboundLabel(LabelIndex(i as u16))),
            }
        }

        let mut block_starts = Vec::with_capacity(self.blocks.len());
        let mut insn_num: u32 = 0;
        for block in &self.blocks {
            block_starts.push(insn_num);
            insn_num = u32::try_from(block.insns.len())
                .ok()
                .and_then(|len| insn_num.checked_add(len))
                .ok_or(IrError::TooMany {
                    what: "instructions",
                })?;
        }

        Ok(Function {
            name: self.name,
            file: self.file,
            values: self.values,
            label_blocks,
            blocks: self.blocks,
            block_starts,
            insn_num,
            inputs: self.inputs,
            outputs: self.outputs,
            simd_width: self.simd_width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Opcode, Type};

    fn two_blocks() -> Function {
        let mut b = FunctionBuilder::new("two");
        let x = b.reg(RegisterFamily::DWord);
        let y = b.reg(RegisterFamily::DWord);
        let exit = b.new_label();
        b.append(Instruction::mov(Type::U32, y, x));
        b.append(Instruction::bra(exit));
        b.start_block(exit);
        b.append(Instruction::add(Type::U32, y, y, x));
        b.finish().unwrap()
    }

    #[test]
    fn test_implicit_entry_block() {
        let func = two_blocks();
        assert_eq!(func.block_num(), 2);
        assert_eq!(func.label_num(), 2);
        assert_eq!(func.blocks()[0].insns()[0].opcode(), Opcode::Label);
        assert_eq!(func.label_block(LabelIndex(0)).unwrap(), 1);
        assert_eq!(func.label_block(LabelIndex(1)).unwrap(), 0);
    }

    #[test]
    fn test_insn_ids_follow_program_order() {
        let func = two_blocks();
        assert_eq!(func.insn_num(), 5);
        let ops: Vec<_> = func.insns().map(|(_, i)| i.opcode()).collect();
        assert_eq!(
            ops,
            [Opcode::Label, Opcode::Mov, Opcode::Bra, Opcode::Label, Opcode::Add]
        );
        let id = func.insn_id(1, 1).unwrap();
        assert_eq!(id, InsnId(4));
        assert_eq!(func.insn(id).unwrap().opcode(), Opcode::Add);
        assert!(func.insn(InsnId(5)).is_err());
        assert!(func.insn_id(1, 2).is_err());
    }

    #[test]
    fn test_unbound_label() {
        let mut b = FunctionBuilder::new("f");
        let l = b.new_label();
        b.append(Instruction::bra(l));
        let err = b.finish().unwrap_err();
        assert_eq!(err, IrError::UnboundLabel(l));
    }

    #[test]
    fn test_label_bound_twice() {
        let mut b = FunctionBuilder::new("f");
        let l = b.new_label();
        b.start_block(l);
        b.start_block(l);
        assert_eq!(b.finish().unwrap_err(), IrError::LabelAlreadyBound(l));
    }

    #[test]
    fn test_value_out_of_range() {
        let mut b = FunctionBuilder::new("f");
        let v = b.immediate(Value::U32(3));
        let func = b.finish().unwrap();
        assert_eq!(func.get_value(v).unwrap(), Value::U32(3));
        assert!(func.get_value(ValueIndex(1)).is_err());
    }

    #[test]
    fn test_display_lists_blocks() {
        let text = two_blocks().to_string();
        assert!(text.starts_with(".function two"));
        assert!(text.contains("L1:\n    mov.u32 %1 %0\n    bra L0\n"));
        assert!(text.contains("L0:\n    add.u32 %1 %1 %0\n"));
    }
}
