// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The target-neutral operation stream the decoders emit. One guest
//! instruction becomes a short sequence of these; a block of decoded
//! instructions becomes a [`TranslationBlock`].
//!
//! Guest-visible faults are never errors at this level: an undefined
//! encoding or a failed code fetch is represented in the stream as an
//! [`Op::Exception`]. [`TranslateError`] is reserved for violations of
//! the stream's own invariants, caught by [`TranslationBlock::validate`].

use armature_common::VAddr;
use thiserror::Error;

use crate::alu::{Cond, ShiftKind};
use crate::lanes::LaneWidth;
use crate::state::ExecMode;

/// Number of scratch temporaries a block may use.
pub const NUM_TEMPS: u8 = 8;

/// A value location: an architectural register or a block-local
/// temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    /// Architectural register by number. In 32-bit modes index 15 is
    /// the program counter; writing it transfers control.
    Arch(u8),
    Tmp(u8),
}

/// Scratch temporary that discards writes; stands in for the wide
/// encoding's zero-register destination.
pub const DISCARD: Reg = Reg::Tmp(NUM_TEMPS - 1);

/// Operation width for the scalar integer ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpWidth {
    W32,
    W64,
}

/// Scalar ALU operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    And,
    Bic,
    Orr,
    Orn,
    Eor,
    Eon,
    Add,
    Adc,
    Sub,
    Sbc,
}

impl AluOp {
    /// Logical operators set N and Z from the result and take C from
    /// the operand shifter; arithmetic operators produce full NZCV.
    #[inline]
    pub fn is_logical(self) -> bool {
        !matches!(self, Self::Add | Self::Adc | Self::Sub | Self::Sbc)
    }
}

/// Shift amount source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftAmount {
    Imm(u8),
    Reg(Reg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendKind {
    Sxtb,
    Sxth,
    Sxtw,
    Uxtb,
    Uxth,
    Uxtw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevKind {
    /// Byte-reverse each 32-bit unit.
    Rev32,
    /// Byte-reverse each 16-bit unit.
    Rev16,
    /// Byte-reverse the low halfword and sign-extend.
    Revsh,
    /// Byte-reverse the full 64-bit value.
    Rev64,
}

/// Memory access width. `Double` is a single 64-bit access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemWidth {
    Byte,
    Half,
    Word,
    Double,
}

impl MemWidth {
    #[inline]
    pub fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
            Self::Double => 8,
        }
    }
}

/// Cause carried by an exception-raising operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCause {
    /// Undefined or unpredictable encoding.
    Undefined,
    /// Service-call trap.
    SoftwareInterrupt,
    /// Code fetch failed during translation.
    PrefetchAbort,
    /// Architectural breakpoint instruction.
    Breakpoint,
    /// Host-requested debug stop (breakpoint table or single-step).
    Debug,
}

/// Branch label, local to one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecBinKind {
    Add,
    Sub,
    QAdd,
    QSub,
    Shl,
    Rshl,
    QShl,
    QRshl,
    Ceq,
    Cge,
    Cgt,
    Max,
    Min,
    Abd,
    Mul,
    /// Widening multiply: destination lanes are double width.
    Mull,
    And,
    Orr,
    Eor,
    Bic,
    Orn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecUnKind {
    Neg,
    Abs,
    Mvn,
    /// Truncating narrow to half-width lanes.
    Narrow,
    /// Saturating narrow.
    NarrowSat,
    /// Saturating narrow of signed lanes to unsigned half-width.
    NarrowSatUnsigned,
    /// Widen the low half of the source to double-width lanes.
    WidenLow,
    WidenHigh,
}

/// In-place lane permutation over a register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermKind {
    Zip,
    Uzp,
    Trn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatBinKind {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatUnKind {
    Mov,
    Abs,
    Neg,
    Sqrt,
}

/// One operation.
///
/// Scalar ops at `W32` read and write the low 32 bits of their
/// locations with the upper half zeroed on write. Vector ops name
/// 64-bit vector registers by index; the `q` flag extends the
/// operation over the odd successor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Scalar data movement and arithmetic.
    MovImm { dst: Reg, value: u64 },
    Mov { dst: Reg, src: Reg },
    Alu { op: AluOp, w: OpWidth, set_flags: bool, dst: Reg, a: Reg, b: Reg },
    Shift {
        kind: ShiftKind,
        w: OpWidth,
        /// Update the carry flag from the shifter carry-out.
        set_carry: bool,
        dst: Reg,
        src: Reg,
        amount: ShiftAmount,
    },
    Extend { kind: ExtendKind, dst: Reg, src: Reg },
    CountLeadingZeros { w: OpWidth, dst: Reg, src: Reg },
    ByteReverse { kind: RevKind, dst: Reg, src: Reg },
    Mul { w: OpWidth, set_flags: bool, dst: Reg, a: Reg, b: Reg },
    MulLong {
        signed: bool,
        accumulate: bool,
        set_flags: bool,
        dst_lo: Reg,
        dst_hi: Reg,
        a: Reg,
        b: Reg,
    },
    /// The two signed 16x16 products of the halfword pairs, optionally
    /// with the halves of `b` swapped. Each product fits 32 bits.
    MulDual { swap: bool, dst_a: Reg, dst_b: Reg, a: Reg, b: Reg },
    /// Wrapping 32-bit add that raises sticky Q on signed overflow.
    AddSetQ { dst: Reg, a: Reg, b: Reg },
    /// Scalar saturating add, doubling `b` first when `double`. Sets Q
    /// on clamp.
    SatAdd { double: bool, dst: Reg, a: Reg, b: Reg },
    SatSub { double: bool, dst: Reg, a: Reg, b: Reg },
    Div { signed: bool, w: OpWidth, dst: Reg, a: Reg, b: Reg },

    // Memory.
    Load {
        width: MemWidth,
        signed: bool,
        /// Force the unprivileged access path.
        user: bool,
        dst: Reg,
        addr: Reg,
    },
    Store { width: MemWidth, user: bool, src: Reg, addr: Reg },
    /// Begin/end of an atomic read-modify-write window.
    AtomicBegin,
    AtomicEnd,

    // Status registers.
    ReadCpsr { dst: Reg },
    WriteCpsr { src: Reg, mask: u32 },
    ReadSpsr { dst: Reg },
    WriteSpsr { src: Reg, mask: u32 },
    /// Exception return: restore CPSR from SPSR, switching mode and
    /// instruction set.
    RestoreCpsrFromSpsr,
    /// User-bank register access for the privileged block-transfer
    /// forms.
    ReadUserReg { dst: Reg, reg: u8 },
    WriteUserReg { reg: u8, src: Reg },
    /// Commit the conditional-execution field before a mid-sequence
    /// exception.
    SetCondexec { bits: u32 },
    /// Privileged system/coprocessor register access.
    CpRead { cp: u8, reg: u16, dst: Reg },
    CpWrite { cp: u8, reg: u16, src: Reg },

    // Control flow.
    Label(Label),
    /// Transfer to `dest` when `cond` FAILS; the fall-through path is
    /// the conditional body.
    CondSkip { cond: Cond, dest: Label },
    BranchZero { src: Reg, if_zero: bool, dest: Label },
    SetPc { value: VAddr },
    /// Indirect transfer. In 32-bit modes bit 0 of the target selects
    /// the compact instruction set.
    Bx { src: Reg },
    Exception { cause: ExceptionCause },
    /// Direct-linked exit to `dest` through link slot `slot`.
    GotoBlock { slot: u8, dest: VAddr },
    /// Unlinked exit; the dispatcher re-resolves from state.
    ExitDynamic,

    // Vector unit.
    VecMovImm { dst: u8, q: bool, value: u64 },
    VecBin {
        kind: VecBinKind,
        width: LaneWidth,
        signed: bool,
        q: bool,
        dst: u8,
        a: u8,
        b: u8,
    },
    VecUn { kind: VecUnKind, width: LaneWidth, signed: bool, q: bool, dst: u8, src: u8 },
    VecPerm { kind: PermKind, width: LaneWidth, q: bool, a: u8, b: u8 },
    /// Broadcast a general register into every lane.
    VecDupGp { width: LaneWidth, q: bool, dst: u8, src: Reg },

    // Float unit. Register numbers are single or double indices per
    // the `double` flag; `len`/`stride` carry the short-vector state.
    FloatBin {
        kind: FloatBinKind,
        double: bool,
        len: u8,
        stride: u8,
        dst: u8,
        a: u8,
        b: u8,
    },
    FloatUn { kind: FloatUnKind, double: bool, len: u8, stride: u8, dst: u8, src: u8 },
    /// Compare, writing the float status flags. The signaling form
    /// raises invalid on any unordered pair.
    FloatCmp { double: bool, signaling: bool, a: u8, b: u8 },
    /// Compare against zero.
    FloatCmpZero { double: bool, signaling: bool, a: u8 },
    /// Copy the float status flags into the condition flags.
    VfpStatusToFlags,
    FloatToGp { dst: Reg, src: u8 },
    GpToFloat { dst: u8, src: Reg },
    FloatLoad { double: bool, dst: u8, addr: Reg },
    FloatStore { double: bool, src: u8, addr: Reg },
    ReadFpscr { dst: Reg },
    WriteFpscr { src: Reg },
}

/// Why a block stopped translating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Ends in direct-linked exits (fall-through or a fixed branch).
    Linked,
    /// Ends in a dynamic exit; the target is only known at run time.
    Dynamic,
    /// Ends by raising an exception.
    Exception,
}

/// A decoded, self-contained block of guest code.
#[derive(Debug, Clone)]
pub struct TranslationBlock {
    /// Guest address of the first instruction.
    pub start: VAddr,
    /// Instruction set the block was decoded for.
    pub exec: ExecMode,
    pub ops: Vec<Op>,
    pub insn_count: u32,
    /// Guest bytes consumed.
    pub byte_len: u32,
    pub exit: ExitReason,
}

/// Violation of the operation stream's structural invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("architectural register index {0} out of range")]
    BadRegister(u8),
    #[error("temporary index {0} out of range")]
    BadTemp(u8),
    #[error("vector register index {0} out of range")]
    BadVecRegister(u8),
    #[error("branch to undefined label {0}")]
    UndefinedLabel(u32),
}

impl TranslationBlock {
    /// Check register indices and label resolution over the whole
    /// stream.
    pub fn validate(&self) -> Result<(), TranslateError> {
        let arch_limit = match self.exec {
            ExecMode::A64 => 32,
            _ => 16,
        };
        let check = |r: Reg| -> Result<(), TranslateError> {
            match r {
                Reg::Arch(i) if i >= arch_limit => Err(TranslateError::BadRegister(i)),
                Reg::Tmp(i) if i >= NUM_TEMPS => Err(TranslateError::BadTemp(i)),
                _ => Ok(()),
            }
        };
        let check_v = |i: u8| -> Result<(), TranslateError> {
            if i >= 64 {
                Err(TranslateError::BadVecRegister(i))
            } else {
                Ok(())
            }
        };

        let mut defined = Vec::new();
        let mut used = Vec::new();
        for op in &self.ops {
            match *op {
                Op::MovImm { dst, .. } => check(dst)?,
                Op::Mov { dst, src } => {
                    check(dst)?;
                    check(src)?;
                }
                Op::Alu { dst, a, b, .. } => {
                    check(dst)?;
                    check(a)?;
                    check(b)?;
                }
                Op::Shift { dst, src, amount, .. } => {
                    check(dst)?;
                    check(src)?;
                    if let ShiftAmount::Reg(r) = amount {
                        check(r)?;
                    }
                }
                Op::Extend { dst, src, .. }
                | Op::CountLeadingZeros { dst, src, .. }
                | Op::ByteReverse { dst, src, .. } => {
                    check(dst)?;
                    check(src)?;
                }
                Op::Mul { dst, a, b, .. } | Op::Div { dst, a, b, .. } => {
                    check(dst)?;
                    check(a)?;
                    check(b)?;
                }
                Op::MulLong { dst_lo, dst_hi, a, b, .. } => {
                    check(dst_lo)?;
                    check(dst_hi)?;
                    check(a)?;
                    check(b)?;
                }
                Op::MulDual { dst_a, dst_b, a, b, .. } => {
                    check(dst_a)?;
                    check(dst_b)?;
                    check(a)?;
                    check(b)?;
                }
                Op::AddSetQ { dst, a, b }
                | Op::SatAdd { dst, a, b, .. }
                | Op::SatSub { dst, a, b, .. } => {
                    check(dst)?;
                    check(a)?;
                    check(b)?;
                }
                Op::Load { dst, addr, .. } => {
                    check(dst)?;
                    check(addr)?;
                }
                Op::Store { src, addr, .. } => {
                    check(src)?;
                    check(addr)?;
                }
                Op::ReadCpsr { dst } | Op::ReadSpsr { dst } | Op::ReadFpscr { dst } => {
                    check(dst)?
                }
                Op::WriteCpsr { src, .. } | Op::WriteSpsr { src, .. } | Op::WriteFpscr { src } => {
                    check(src)?
                }
                Op::ReadUserReg { dst, reg } => {
                    check(dst)?;
                    check(Reg::Arch(reg))?;
                }
                Op::WriteUserReg { reg, src } => {
                    check(src)?;
                    check(Reg::Arch(reg))?;
                }
                Op::CpRead { dst, .. } => check(dst)?,
                Op::CpWrite { src, .. } => check(src)?,
                Op::Label(l) => defined.push(l.0),
                Op::CondSkip { dest, .. } => used.push(dest.0),
                Op::BranchZero { src, dest, .. } => {
                    check(src)?;
                    used.push(dest.0);
                }
                Op::Bx { src } => check(src)?,
                Op::VecMovImm { dst, .. } => check_v(dst)?,
                Op::VecBin { dst, a, b, .. } => {
                    check_v(dst)?;
                    check_v(a)?;
                    check_v(b)?;
                }
                Op::VecUn { dst, src, .. } => {
                    check_v(dst)?;
                    check_v(src)?;
                }
                Op::VecPerm { a, b, .. } => {
                    check_v(a)?;
                    check_v(b)?;
                }
                Op::VecDupGp { dst, src, .. } => {
                    check_v(dst)?;
                    check(src)?;
                }
                Op::FloatBin { dst, a, b, .. } => {
                    check_v(dst)?;
                    check_v(a)?;
                    check_v(b)?;
                }
                Op::FloatUn { dst, src, .. } => {
                    check_v(dst)?;
                    check_v(src)?;
                }
                Op::FloatCmp { a, b, .. } => {
                    check_v(a)?;
                    check_v(b)?;
                }
                Op::FloatCmpZero { a, .. } => check_v(a)?,
                Op::FloatToGp { dst, src } => {
                    check(dst)?;
                    check_v(src)?;
                }
                Op::GpToFloat { dst, src } => {
                    check_v(dst)?;
                    check(src)?;
                }
                Op::FloatLoad { dst, addr, .. } => {
                    check_v(dst)?;
                    check(addr)?;
                }
                Op::FloatStore { src, addr, .. } => {
                    check_v(src)?;
                    check(addr)?;
                }
                Op::SetPc { .. }
                | Op::Exception { .. }
                | Op::GotoBlock { .. }
                | Op::ExitDynamic
                | Op::AtomicBegin
                | Op::AtomicEnd
                | Op::RestoreCpsrFromSpsr
                | Op::SetCondexec { .. }
                | Op::VfpStatusToFlags => {}
            }
        }
        for id in used {
            if !defined.contains(&id) {
                return Err(TranslateError::UndefinedLabel(id));
            }
        }
        Ok(())
    }
}
