// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Block translation driver. Decodes guest instructions from a start
//! address into one [`TranslationBlock`], stopping at control
//! transfers, the instruction budget, a page boundary, or a debug
//! stop. The per-set decoders live in the submodules; this module owns
//! the shared emission context and the block epilogue.

pub mod a64;
pub mod arm;
pub mod thumb;

use armature_common::{next_page_start, VAddr};

use crate::alu::Cond;
use crate::debug::BreakpointSet;
use crate::memory::{CodeFetch, FetchFault};
use crate::op::{
    ExceptionCause, ExitReason, Label, Op, Reg, TranslateError, TranslationBlock, NUM_TEMPS,
};
use crate::state::{CpuState, ExecMode};

/// Default instruction budget per block.
pub const MAX_BLOCK_INSNS: u32 = 128;

/// Everything the translator needs to know about the context it is
/// translating for. Captured up front; the decoders never touch live
/// state.
#[derive(Debug, Clone)]
pub struct TranslateParams {
    pub pc: VAddr,
    pub exec: ExecMode,
    /// Translating for an unprivileged context.
    pub user: bool,
    pub vfp_enabled: bool,
    /// Short-vector length/stride fields from the float status word.
    pub vec_len: u8,
    pub vec_stride: u8,
    /// Conditional-execution state entering the block (compact
    /// encoding only).
    pub condexec: u8,
    /// Stop after one instruction and raise a debug stop.
    pub single_step: bool,
    pub big_endian: bool,
    /// Instruction budget; zero means [`MAX_BLOCK_INSNS`].
    pub max_insns: u32,
}

impl TranslateParams {
    pub fn new(pc: VAddr, exec: ExecMode) -> Self {
        Self {
            pc,
            exec,
            user: false,
            vfp_enabled: true,
            vec_len: 0,
            vec_stride: 0,
            condexec: 0,
            single_step: false,
            big_endian: false,
            max_insns: 0,
        }
    }

    /// Capture translation-relevant state from a context.
    pub fn from_state(state: &CpuState) -> Self {
        let mut p = Self::new(state.pc(), state.exec);
        p.user = state.mode.is_user();
        p.vfp_enabled = state.vfp_enabled;
        p.vec_len = state.fpscr.len;
        p.vec_stride = state.fpscr.stride;
        p.condexec = state.condexec;
        p.big_endian = state.big_endian;
        p
    }
}

/// How the instruction just decoded left the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockEnd {
    /// The program counter was written from a dynamic value.
    Jump,
    /// Other state changed such that the dispatcher must re-resolve.
    Update,
    /// A direct-linked exit was already emitted.
    Branched,
    /// An exception op was emitted.
    Raised,
}

/// Per-block emission context shared by the decoders.
pub(crate) struct BlockCtx<'a> {
    pub ops: Vec<Op>,
    /// Block start address.
    pub start: VAddr,
    /// Next fetch address; already advanced past the instruction being
    /// decoded.
    pub pc: VAddr,
    /// Address of the instruction being decoded.
    pub insn_start: VAddr,
    pub exec: ExecMode,
    pub user: bool,
    pub vfp_enabled: bool,
    pub vec_len: u8,
    pub vec_stride: u8,
    /// Conditional-execution state (compact encoding). The top four
    /// bits are the current condition.
    pub itstate: u8,
    /// Set by the decoder when the instruction wrote `itstate` itself,
    /// suppressing the end-of-instruction advance.
    pub it_insn: bool,
    pub single_step: bool,
    pub end: Option<BlockEnd>,
    /// Open conditional-skip label, closed after the instruction.
    pub condjmp: Option<Label>,
    fetch: &'a dyn CodeFetch,
    next_label: u32,
    next_tmp: u8,
}

impl<'a> BlockCtx<'a> {
    fn new(params: &TranslateParams, fetch: &'a dyn CodeFetch) -> Self {
        Self {
            ops: Vec::new(),
            start: params.pc,
            pc: params.pc,
            insn_start: params.pc,
            exec: params.exec,
            user: params.user,
            vfp_enabled: params.vfp_enabled,
            vec_len: params.vec_len,
            vec_stride: params.vec_stride,
            itstate: params.condexec,
            it_insn: false,
            single_step: params.single_step,
            end: None,
            condjmp: None,
            fetch,
            next_label: 0,
            next_tmp: 0,
        }
    }

    #[inline]
    pub fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn label(&mut self) -> Label {
        let l = Label(self.next_label);
        self.next_label += 1;
        l
    }

    /// Allocate a scratch temporary. Reset between instructions; the
    /// last index is the reserved discard register.
    pub fn tmp(&mut self) -> Reg {
        debug_assert!(self.next_tmp < NUM_TEMPS - 1);
        let t = Reg::Tmp(self.next_tmp);
        self.next_tmp = (self.next_tmp + 1) % (NUM_TEMPS - 1);
        t
    }

    fn reset_tmps(&mut self) {
        self.next_tmp = 0;
    }

    /// Load a constant into a fresh temporary.
    pub fn mov_imm(&mut self, value: impl Into<u64>) -> Reg {
        let t = self.tmp();
        self.emit(Op::MovImm { dst: t, value: value.into() });
        t
    }

    /// `base + value` in 32-bit space, emitted only when the
    /// displacement is nonzero.
    pub fn add_imm(&mut self, base: Reg, value: i32) -> Reg {
        if value == 0 {
            return base;
        }
        let off = self.mov_imm(value.unsigned_abs());
        let dst = self.tmp();
        let op = if value < 0 {
            crate::op::AluOp::Sub
        } else {
            crate::op::AluOp::Add
        };
        self.emit(Op::Alu {
            op,
            w: crate::op::OpWidth::W32,
            set_flags: false,
            dst,
            a: base,
            b: off,
        });
        dst
    }

    /// Fetch the next instruction word, advancing the cursor.
    pub fn fetch32(&mut self) -> Result<u32, FetchFault> {
        let insn = self.fetch.fetch32(self.pc)?;
        self.pc += 4;
        Ok(insn)
    }

    pub fn fetch16(&mut self) -> Result<u16, FetchFault> {
        let insn = self.fetch.fetch16(self.pc)?;
        self.pc += 2;
        Ok(insn)
    }

    /// Materialize a source register into a fresh location. Reading
    /// the program counter yields the architectural fetch-ahead value
    /// (instruction address plus 8, or plus 4 in the compact
    /// encoding).
    pub fn load_reg(&mut self, reg: u32) -> Reg {
        let t = self.tmp();
        if reg == 15 && self.exec != ExecMode::A64 {
            let ahead = if self.exec == ExecMode::Arm { 4 } else { 2 };
            self.emit(Op::MovImm { dst: t, value: self.pc + ahead });
        } else {
            self.emit(Op::Mov { dst: t, src: Reg::Arch(reg as u8) });
        }
        t
    }

    /// Write a general register. Writing the program counter ends the
    /// block with a dynamic jump; the written value's bit 1 is
    /// ignored by the backend in the fixed-width set.
    pub fn store_reg(&mut self, reg: u32, src: Reg) {
        self.emit(Op::Mov { dst: Reg::Arch(reg as u8), src });
        if reg == 15 && self.exec != ExecMode::A64 {
            self.end = Some(BlockEnd::Jump);
        }
    }

    /// Write a general register; a program-counter write goes through
    /// the interworking transfer instead of a plain jump.
    pub fn store_reg_bx(&mut self, reg: u32, src: Reg) {
        if reg == 15 && self.exec != ExecMode::A64 {
            self.gen_bx(src);
        } else {
            self.store_reg(reg, src);
        }
    }

    pub fn gen_bx(&mut self, src: Reg) {
        self.emit(Op::Bx { src });
        self.end = Some(BlockEnd::Jump);
    }

    /// Emit a direct-linked exit. Linking is only allowed when the
    /// destination shares a page with the block start; otherwise the
    /// exit stays dynamic so a remap of the far page cannot leave a
    /// stale link.
    pub fn gen_goto_block(&mut self, slot: u8, dest: VAddr) {
        let page = self.start & !armature_common::PAGE_MASK;
        if dest & !armature_common::PAGE_MASK == page {
            self.emit(Op::GotoBlock { slot, dest });
        } else {
            self.emit(Op::SetPc { value: dest });
            self.emit(Op::ExitDynamic);
        }
    }

    /// Direct branch to `dest`, honoring single-step.
    pub fn gen_jmp(&mut self, dest: VAddr) {
        if self.single_step {
            self.emit(Op::SetPc { value: dest });
            self.emit(Op::Exception { cause: ExceptionCause::Debug });
            self.end = Some(BlockEnd::Raised);
        } else {
            self.gen_goto_block(0, dest);
            self.end = Some(BlockEnd::Branched);
        }
    }

    /// Commit conditional-execution state if any, set the program
    /// counter to the faulting/trapping address, and raise.
    pub fn gen_exception(&mut self, pc: VAddr, cause: ExceptionCause) {
        if self.itstate != 0 {
            self.emit(Op::SetCondexec { bits: self.itstate as u32 });
        }
        self.emit(Op::SetPc { value: pc });
        self.emit(Op::Exception { cause });
        self.end = Some(BlockEnd::Raised);
    }

    /// Undefined encoding: the program counter reports the offending
    /// instruction's own address.
    pub fn gen_undefined(&mut self) {
        self.gen_exception(self.insn_start, ExceptionCause::Undefined);
    }

    /// Open a conditional skip around the rest of the instruction.
    pub fn gen_condjmp(&mut self, cond: Cond) {
        let l = self.label();
        self.emit(Op::CondSkip { cond, dest: l });
        self.condjmp = Some(l);
    }

    /// Condition governing the current compact-encoding instruction,
    /// if inside a conditional-execution block.
    pub fn it_cond(&self) -> Option<Cond> {
        if self.itstate & 0xf != 0 {
            Some(Cond::from_bits((self.itstate >> 4) as u32))
        } else {
            None
        }
    }

    fn advance_itstate(&mut self) {
        if self.itstate & 7 == 0 {
            self.itstate = 0;
        } else {
            self.itstate = (self.itstate & 0xe0) | ((self.itstate << 1) & 0x1f);
        }
    }
}

/// Translate one block for the given context parameters.
///
/// Guest-visible faults (undefined encodings, fetch failures) are
/// represented inside the returned block; the error path is reserved
/// for structural violations in the emitted stream.
pub fn translate_block(
    params: &TranslateParams,
    fetch: &dyn CodeFetch,
    breakpoints: &dyn BreakpointSet,
) -> Result<TranslationBlock, TranslateError> {
    let mut ctx = BlockCtx::new(params, fetch);
    let page_end = next_page_start(params.pc);
    let budget = if params.max_insns == 0 {
        MAX_BLOCK_INSNS
    } else {
        params.max_insns
    };
    let mut insn_count = 0u32;

    loop {
        ctx.insn_start = ctx.pc;
        ctx.reset_tmps();

        if breakpoints.contains(ctx.pc) {
            ctx.gen_exception(ctx.pc, ExceptionCause::Debug);
            // Advance past the breakpoint address so invalidating it
            // finds this block by range.
            ctx.pc += if ctx.exec == ExecMode::Thumb { 2 } else { 4 };
            insn_count += 1;
            break;
        }

        match ctx.exec {
            ExecMode::Arm => arm::disas_insn(&mut ctx),
            ExecMode::Thumb => thumb::disas_insn(&mut ctx),
            ExecMode::A64 => a64::disas_insn(&mut ctx),
        }
        insn_count += 1;

        if ctx.exec == ExecMode::Thumb {
            if ctx.it_insn {
                ctx.it_insn = false;
            } else if ctx.itstate != 0 {
                ctx.advance_itstate();
            }
        }

        // Close the conditional skip unless the body ended the block;
        // then the fail path stays open for the epilogue.
        if ctx.end.is_none() {
            if let Some(l) = ctx.condjmp.take() {
                ctx.emit(Op::Label(l));
            }
        }

        if ctx.end.is_some()
            || insn_count >= budget
            || ctx.pc >= page_end
            || params.single_step
        {
            break;
        }
    }

    let exit = emit_epilogue(&mut ctx);

    let block = TranslationBlock {
        start: params.pc,
        exec: params.exec,
        ops: ctx.ops,
        insn_count,
        byte_len: (ctx.pc - params.pc) as u32,
        exit,
    };
    block.validate()?;
    log::trace!(
        "translated block at {:#x}: {} insns, {} ops",
        block.start,
        block.insn_count,
        block.ops.len()
    );
    Ok(block)
}

fn emit_epilogue(ctx: &mut BlockCtx<'_>) -> ExitReason {
    // Leftover IT state when the block was cut short (page end,
    // budget, single step) must survive into the next block.
    let commit_itstate = ctx.exec == ExecMode::Thumb
        && ctx.itstate != 0
        && ctx.end != Some(BlockEnd::Raised);
    if commit_itstate {
        ctx.emit(Op::SetCondexec { bits: ctx.itstate as u32 });
    }
    let mut exit = match ctx.end {
        None => {
            // Fell off the end: link to the next instruction.
            if ctx.single_step {
                ctx.emit(Op::SetPc { value: ctx.pc });
                ctx.emit(Op::Exception { cause: ExceptionCause::Debug });
                ExitReason::Exception
            } else {
                ctx.gen_goto_block(0, ctx.pc);
                ExitReason::Linked
            }
        }
        Some(BlockEnd::Jump) | Some(BlockEnd::Update) => {
            if ctx.single_step {
                ctx.emit(Op::Exception { cause: ExceptionCause::Debug });
                ExitReason::Exception
            } else {
                ctx.emit(Op::ExitDynamic);
                ExitReason::Dynamic
            }
        }
        Some(BlockEnd::Branched) => ExitReason::Linked,
        Some(BlockEnd::Raised) => ExitReason::Exception,
    };

    // Close out the not-taken path of a trailing conditional.
    if let Some(l) = ctx.condjmp.take() {
        ctx.emit(Op::Label(l));
        if commit_itstate {
            ctx.emit(Op::SetCondexec { bits: ctx.itstate as u32 });
        }
        if ctx.single_step {
            ctx.emit(Op::SetPc { value: ctx.pc });
            ctx.emit(Op::Exception { cause: ExceptionCause::Debug });
        } else {
            ctx.gen_goto_block(1, ctx.pc);
        }
        if exit == ExitReason::Exception {
            // The taken path raised but the fall-through continues.
            exit = ExitReason::Linked;
        }
    }
    exit
}
