// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Decoder for the fixed-width 32-bit instruction set. Each
//! instruction is classified from its fixed fields and lowered onto
//! the emission context; conditional instructions are bracketed by a
//! skip that transfers when the condition fails.

use crate::addr::{block_layout, BlockMode};
use crate::alu::{decode_imm_shift, Cond, ShiftKind};
use crate::lanes::LaneWidth;
use crate::op::{
    AluOp, ExceptionCause, ExtendKind, FloatBinKind, FloatUnKind, MemWidth, Op, OpWidth, Reg,
    ShiftAmount, VecBinKind, DISCARD,
};
use crate::state::Psr;

use super::{BlockCtx, BlockEnd};

const W: OpWidth = OpWidth::W32;

pub(crate) fn disas_insn(ctx: &mut BlockCtx<'_>) {
    let insn = match ctx.fetch32() {
        Ok(insn) => insn,
        Err(fault) => {
            ctx.gen_exception(fault.addr, ExceptionCause::PrefetchAbort);
            return;
        }
    };
    let cond = insn >> 28;
    if cond == 0xf {
        disas_uncond(ctx, insn);
        return;
    }
    if cond != 0xe {
        ctx.gen_condjmp(Cond::from_bits(cond));
    }
    disas_cond(ctx, insn);
}

fn disas_cond(ctx: &mut BlockCtx<'_>, insn: u32) {
    match (insn >> 25) & 7 {
        0 => {
            if insn & 0x90 == 0x90 {
                if insn & 0x60 == 0 {
                    disas_mul_swp(ctx, insn);
                } else {
                    disas_extra_ldst(ctx, insn);
                }
            } else if insn & 0x0190_0000 == 0x0100_0000 {
                // Compare opcodes without S: the miscellaneous space.
                disas_misc(ctx, insn);
            } else {
                disas_dp(ctx, insn);
            }
        }
        1 => {
            if insn & 0x0fb0_f000 == 0x0320_f000 {
                disas_msr_imm(ctx, insn);
            } else if insn & 0x0190_0000 == 0x0100_0000 {
                // Compare opcodes without S and no MSR form.
                ctx.gen_undefined();
            } else {
                disas_dp(ctx, insn);
            }
        }
        2 => disas_ldst_word(ctx, insn),
        3 => {
            if insn & 0x10 == 0 {
                disas_ldst_word(ctx, insn);
            } else {
                // Media space, not provided by this core.
                ctx.gen_undefined();
            }
        }
        4 => disas_block_ldst(ctx, insn),
        5 => disas_branch(ctx, insn),
        6 => disas_coproc_ldst(ctx, insn),
        _ => {
            if insn & 0x0100_0000 != 0 {
                // Service call returns to the following instruction.
                ctx.gen_exception(ctx.pc, ExceptionCause::SoftwareInterrupt);
            } else {
                disas_coproc(ctx, insn);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Data processing
// ---------------------------------------------------------------------------

/// Materialize the second operand, updating the carry flag from the
/// shifter when a flag-setting logical operation follows.
fn shifter_operand(ctx: &mut BlockCtx<'_>, insn: u32, logic_cc: bool) -> Reg {
    if insn & (1 << 25) != 0 {
        let imm8 = insn & 0xff;
        let rotate = (insn >> 8) & 0xf;
        if rotate == 0 || !logic_cc {
            ctx.mov_imm(imm8.rotate_right(rotate * 2))
        } else {
            // A rotated immediate feeds its top bit into carry; emit
            // the rotation so the flag update happens at run time.
            let t = ctx.mov_imm(imm8);
            ctx.emit(Op::Shift {
                kind: ShiftKind::Ror,
                w: W,
                set_carry: true,
                dst: t,
                src: t,
                amount: ShiftAmount::Imm((rotate * 2) as u8),
            });
            t
        }
    } else {
        let v = ctx.load_reg(insn & 0xf);
        if insn & (1 << 4) != 0 {
            let amount = ctx.load_reg((insn >> 8) & 0xf);
            let kind = match (insn >> 5) & 3 {
                0 => ShiftKind::Lsl,
                1 => ShiftKind::Lsr,
                2 => ShiftKind::Asr,
                _ => ShiftKind::Ror,
            };
            ctx.emit(Op::Shift {
                kind,
                w: W,
                set_carry: logic_cc,
                dst: v,
                src: v,
                amount: ShiftAmount::Reg(amount),
            });
        } else {
            let (kind, amount) = decode_imm_shift((insn >> 5) & 3, (insn >> 7) & 0x1f);
            if !(kind == ShiftKind::Lsl && amount == 0) {
                ctx.emit(Op::Shift {
                    kind,
                    w: W,
                    set_carry: logic_cc,
                    dst: v,
                    src: v,
                    amount: ShiftAmount::Imm(amount as u8),
                });
            }
        }
        v
    }
}

fn disas_dp(ctx: &mut BlockCtx<'_>, insn: u32) {
    let set_flags = insn & (1 << 20) != 0;
    let opcode = (insn >> 21) & 0xf;
    let rn = (insn >> 16) & 0xf;
    let rd = (insn >> 12) & 0xf;
    let logic = matches!(opcode, 0 | 1 | 8 | 9 | 12 | 13 | 14 | 15);
    let logic_cc = set_flags && logic;

    let b = shifter_operand(ctx, insn, logic_cc);
    let t = ctx.tmp();
    let alu = |ctx: &mut BlockCtx<'_>, op: AluOp, dst: Reg, a: Reg, b: Reg, flags: bool| {
        ctx.emit(Op::Alu { op, w: W, set_flags: flags, dst, a, b });
    };
    match opcode {
        0 | 1 | 2 | 4 | 5 | 6 | 12 | 14 => {
            let a = ctx.load_reg(rn);
            let op = match opcode {
                0 => AluOp::And,
                1 => AluOp::Eor,
                2 => AluOp::Sub,
                4 => AluOp::Add,
                5 => AluOp::Adc,
                6 => AluOp::Sbc,
                12 => AluOp::Orr,
                _ => AluOp::Bic,
            };
            alu(ctx, op, t, a, b, set_flags);
        }
        // Reversed subtracts swap the operands.
        3 => {
            let a = ctx.load_reg(rn);
            alu(ctx, AluOp::Sub, t, b, a, set_flags);
        }
        7 => {
            let a = ctx.load_reg(rn);
            alu(ctx, AluOp::Sbc, t, b, a, set_flags);
        }
        // Compare opcodes only produce flags.
        8 | 9 | 10 | 11 => {
            let a = ctx.load_reg(rn);
            let op = match opcode {
                8 => AluOp::And,
                9 => AluOp::Eor,
                10 => AluOp::Sub,
                _ => AluOp::Add,
            };
            alu(ctx, op, DISCARD, a, b, true);
            return;
        }
        13 => {
            if set_flags {
                alu(ctx, AluOp::Orr, t, b, b, true);
            } else {
                ctx.emit(Op::Mov { dst: t, src: b });
            }
        }
        _ => {
            let zero = ctx.mov_imm(0u32);
            alu(ctx, AluOp::Orn, t, zero, b, set_flags);
        }
    }
    ctx.store_reg(rd, t);
    if rd == 15 && set_flags {
        // Exception return form: flags come from the saved status
        // word, not the computation.
        ctx.emit(Op::RestoreCpsrFromSpsr);
        ctx.end = Some(BlockEnd::Update);
    }
}

fn disas_msr_imm(ctx: &mut BlockCtx<'_>, insn: u32) {
    let spsr = insn & (1 << 22) != 0;
    let fields = (insn >> 16) & 0xf;
    if fields == 0 {
        // Hint space.
        return;
    }
    let value = ctx.mov_imm((insn & 0xff).rotate_right(((insn >> 8) & 0xf) * 2));
    gen_msr(ctx, value, fields, spsr);
}

fn msr_mask(ctx: &BlockCtx<'_>, fields: u32, spsr: bool) -> u32 {
    let mut mask = 0u32;
    if fields & 1 != 0 {
        mask |= 0xff;
    }
    if fields & 2 != 0 {
        mask |= 0xff00;
    }
    if fields & 4 != 0 {
        mask |= 0xff_0000;
    }
    if fields & 8 != 0 {
        mask |= 0xf000_0000;
    }
    // Unprivileged writes only reach the flag byte.
    if !spsr && ctx.user {
        mask &= Psr::FLAG_FIELD.bits();
    }
    mask
}

fn gen_msr(ctx: &mut BlockCtx<'_>, value: Reg, fields: u32, spsr: bool) {
    // The saved status word is only reachable from privileged modes.
    if spsr && ctx.user {
        ctx.gen_undefined();
        return;
    }
    let mask = msr_mask(ctx, fields, spsr);
    if spsr {
        ctx.emit(Op::WriteSpsr { src: value, mask });
    } else {
        ctx.emit(Op::WriteCpsr { src: value, mask });
        if mask & !Psr::FLAG_FIELD.bits() != 0 {
            // Mode or instruction-set bits may have changed.
            ctx.end = Some(BlockEnd::Update);
        }
    }
}

// ---------------------------------------------------------------------------
// Miscellaneous space (S=0 compare opcodes)
// ---------------------------------------------------------------------------

fn disas_misc(ctx: &mut BlockCtx<'_>, insn: u32) {
    let op2 = (insn >> 4) & 0xf;
    let rm = insn & 0xf;
    let rd = (insn >> 12) & 0xf;
    match op2 {
        0 => {
            if insn & (1 << 21) != 0 {
                // MSR (register).
                let value = ctx.load_reg(rm);
                gen_msr(ctx, value, (insn >> 16) & 0xf, insn & (1 << 22) != 0);
            } else {
                // MRS.
                let spsr = insn & (1 << 22) != 0;
                if spsr && ctx.user {
                    ctx.gen_undefined();
                    return;
                }
                let t = ctx.tmp();
                if spsr {
                    ctx.emit(Op::ReadSpsr { dst: t });
                } else {
                    ctx.emit(Op::ReadCpsr { dst: t });
                }
                ctx.store_reg(rd, t);
            }
        }
        1 => {
            if insn & (1 << 22) != 0 {
                // CLZ.
                let v = ctx.load_reg(rm);
                let t = ctx.tmp();
                ctx.emit(Op::CountLeadingZeros { w: W, dst: t, src: v });
                ctx.store_reg(rd, t);
            } else {
                let target = ctx.load_reg(rm);
                ctx.gen_bx(target);
            }
        }
        3 => {
            // BLX (register): link to the following instruction.
            let target = ctx.load_reg(rm);
            let lr = ctx.mov_imm(ctx.pc as u32);
            ctx.store_reg(14, lr);
            ctx.gen_bx(target);
        }
        5 => disas_sat_arith(ctx, insn),
        7 => ctx.gen_exception(ctx.insn_start, ExceptionCause::Breakpoint),
        8 | 0xa | 0xc | 0xe => disas_halfword_mul(ctx, insn),
        _ => ctx.gen_undefined(),
    }
}

/// QADD/QSUB and their doubling forms. All saturate in signed 32-bit
/// space and raise sticky Q on clamp.
fn disas_sat_arith(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rd = (insn >> 12) & 0xf;
    let a = ctx.load_reg(insn & 0xf);
    let b = ctx.load_reg((insn >> 16) & 0xf);
    let t = ctx.tmp();
    let double = insn & (1 << 22) != 0;
    if insn & (1 << 21) != 0 {
        ctx.emit(Op::SatSub { double, dst: t, a, b });
    } else {
        ctx.emit(Op::SatAdd { double, dst: t, a, b });
    }
    ctx.store_reg(rd, t);
}

/// Extract a signed halfword operand: `top` selects the high half.
fn half_operand(ctx: &mut BlockCtx<'_>, reg: u32, top: bool) -> Reg {
    let v = ctx.load_reg(reg);
    if top {
        ctx.emit(Op::Shift {
            kind: ShiftKind::Asr,
            w: W,
            set_carry: false,
            dst: v,
            src: v,
            amount: ShiftAmount::Imm(16),
        });
    } else {
        ctx.emit(Op::Extend { kind: ExtendKind::Sxth, dst: v, src: v });
    }
    v
}

fn disas_halfword_mul(ctx: &mut BlockCtx<'_>, insn: u32) {
    let op = (insn >> 21) & 3;
    let rd = (insn >> 16) & 0xf;
    let rn = (insn >> 12) & 0xf;
    let rs = (insn >> 8) & 0xf;
    let rm = insn & 0xf;
    let x = insn & (1 << 5) != 0;
    let y = insn & (1 << 6) != 0;
    match op {
        0 => {
            // SMLA<x><y>: wrapping accumulate with sticky Q.
            let a = half_operand(ctx, rm, x);
            let b = half_operand(ctx, rs, y);
            let prod = ctx.tmp();
            ctx.emit(Op::Mul { w: W, set_flags: false, dst: prod, a, b });
            let acc = ctx.load_reg(rn);
            let t = ctx.tmp();
            ctx.emit(Op::AddSetQ { dst: t, a: prod, b: acc });
            ctx.store_reg(rd, t);
        }
        1 => {
            // SMULW<y>/SMLAW<y>: (rm * top-or-bottom half of rs) with
            // the low 16 bits of the 48-bit product dropped.
            let a = ctx.load_reg(rm);
            ctx.emit(Op::Extend { kind: ExtendKind::Sxtw, dst: a, src: a });
            let b = half_operand(ctx, rs, y);
            ctx.emit(Op::Extend { kind: ExtendKind::Sxtw, dst: b, src: b });
            let prod = ctx.tmp();
            ctx.emit(Op::Mul { w: OpWidth::W64, set_flags: false, dst: prod, a, b });
            ctx.emit(Op::Shift {
                kind: ShiftKind::Asr,
                w: OpWidth::W64,
                set_carry: false,
                dst: prod,
                src: prod,
                amount: ShiftAmount::Imm(16),
            });
            if !x {
                let acc = ctx.load_reg(rn);
                let t = ctx.tmp();
                ctx.emit(Op::AddSetQ { dst: t, a: prod, b: acc });
                ctx.store_reg(rd, t);
            } else {
                ctx.store_reg(rd, prod);
            }
        }
        2 => {
            // SMLAL<x><y>: widen the 32-bit product and add into the
            // 64-bit accumulator pair.
            let a = half_operand(ctx, rm, x);
            let b = half_operand(ctx, rs, y);
            let prod = ctx.tmp();
            ctx.emit(Op::Mul { w: W, set_flags: false, dst: prod, a, b });
            ctx.emit(Op::Extend { kind: ExtendKind::Sxtw, dst: prod, src: prod });
            let acc = pack_pair(ctx, rn, rd);
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: AluOp::Add, w: OpWidth::W64, set_flags: false, dst: t, a: acc, b: prod });
            store_pair(ctx, rn, rd, t);
        }
        _ => {
            // SMUL<x><y>.
            let a = half_operand(ctx, rm, x);
            let b = half_operand(ctx, rs, y);
            let t = ctx.tmp();
            ctx.emit(Op::Mul { w: W, set_flags: false, dst: t, a, b });
            ctx.store_reg(rd, t);
        }
    }
}

/// Combine a lo/hi register pair into one 64-bit temporary.
fn pack_pair(ctx: &mut BlockCtx<'_>, lo: u32, hi: u32) -> Reg {
    let l = ctx.load_reg(lo);
    let h = ctx.load_reg(hi);
    ctx.emit(Op::Shift {
        kind: ShiftKind::Lsl,
        w: OpWidth::W64,
        set_carry: false,
        dst: h,
        src: h,
        amount: ShiftAmount::Imm(32),
    });
    let t = ctx.tmp();
    ctx.emit(Op::Alu { op: AluOp::Orr, w: OpWidth::W64, set_flags: false, dst: t, a: h, b: l });
    t
}

fn store_pair(ctx: &mut BlockCtx<'_>, lo: u32, hi: u32, value: Reg) {
    ctx.store_reg(lo, value);
    let h = ctx.tmp();
    ctx.emit(Op::Shift {
        kind: ShiftKind::Lsr,
        w: OpWidth::W64,
        set_carry: false,
        dst: h,
        src: value,
        amount: ShiftAmount::Imm(32),
    });
    ctx.store_reg(hi, h);
}

// ---------------------------------------------------------------------------
// Multiplies and swap
// ---------------------------------------------------------------------------

fn disas_mul_swp(ctx: &mut BlockCtx<'_>, insn: u32) {
    let set_flags = insn & (1 << 20) != 0;
    match (insn >> 23) & 3 {
        0 => {
            // MUL/MLA; rd and rn swap positions relative to the other
            // data-processing forms.
            let rd = (insn >> 16) & 0xf;
            let a = ctx.load_reg(insn & 0xf);
            let b = ctx.load_reg((insn >> 8) & 0xf);
            let t = ctx.tmp();
            ctx.emit(Op::Mul { w: W, set_flags: set_flags && insn & (1 << 21) == 0, dst: t, a, b });
            if insn & (1 << 21) != 0 {
                let acc = ctx.load_reg((insn >> 12) & 0xf);
                ctx.emit(Op::Alu { op: AluOp::Add, w: W, set_flags, dst: t, a: t, b: acc });
            }
            ctx.store_reg(rd, t);
        }
        1 => {
            // UMULL/SMULL/UMLAL/SMLAL.
            let rd_hi = (insn >> 16) & 0xf;
            let rd_lo = (insn >> 12) & 0xf;
            let a = ctx.load_reg(insn & 0xf);
            let b = ctx.load_reg((insn >> 8) & 0xf);
            let (lo, hi) = (ctx.tmp(), ctx.tmp());
            let accumulate = insn & (1 << 21) != 0;
            if accumulate {
                // Pre-load the accumulator halves so the multiply op
                // can fold them in.
                ctx.emit(Op::Mov { dst: lo, src: Reg::Arch(rd_lo as u8) });
                ctx.emit(Op::Mov { dst: hi, src: Reg::Arch(rd_hi as u8) });
            }
            ctx.emit(Op::MulLong {
                signed: insn & (1 << 22) != 0,
                accumulate,
                set_flags,
                dst_lo: lo,
                dst_hi: hi,
                a,
                b,
            });
            ctx.store_reg(rd_lo, lo);
            ctx.store_reg(rd_hi, hi);
        }
        2 => {
            // SWP/SWPB: one atomic window around the load and store.
            let rn = (insn >> 16) & 0xf;
            let rd = (insn >> 12) & 0xf;
            let width = if insn & (1 << 22) != 0 { MemWidth::Byte } else { MemWidth::Word };
            let addr = ctx.load_reg(rn);
            let new = ctx.load_reg(insn & 0xf);
            let old = ctx.tmp();
            ctx.emit(Op::AtomicBegin);
            ctx.emit(Op::Load { width, signed: false, user: ctx.user, dst: old, addr });
            ctx.emit(Op::Store { width, user: ctx.user, src: new, addr });
            ctx.emit(Op::AtomicEnd);
            ctx.store_reg(rd, old);
        }
        _ => ctx.gen_undefined(),
    }
}

// ---------------------------------------------------------------------------
// Loads and stores
// ---------------------------------------------------------------------------

/// Offset operand for the halfword/dual transfer forms: split 8-bit
/// immediate or a register.
fn extra_offset(ctx: &mut BlockCtx<'_>, insn: u32) -> Reg {
    if insn & (1 << 22) != 0 {
        ctx.mov_imm((insn & 0xf) | ((insn >> 4) & 0xf0))
    } else {
        ctx.load_reg(insn & 0xf)
    }
}

fn apply_offset(ctx: &mut BlockCtx<'_>, base: Reg, offset: Reg, up: bool) -> Reg {
    let t = ctx.tmp();
    let op = if up { AluOp::Add } else { AluOp::Sub };
    ctx.emit(Op::Alu { op, w: W, set_flags: false, dst: t, a: base, b: offset });
    t
}

fn disas_extra_ldst(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rn = (insn >> 16) & 0xf;
    let rd = (insn >> 12) & 0xf;
    let load = insn & (1 << 20) != 0;
    let sh = (insn >> 5) & 3;
    let pre = insn & (1 << 24) != 0;
    let up = insn & (1 << 23) != 0;
    let wback = insn & (1 << 21) != 0 || !pre;

    let base = ctx.load_reg(rn);
    let offset = extra_offset(ctx, insn);
    let addr = if pre { apply_offset(ctx, base, offset, up) } else { base };

    let user = ctx.user;
    if load {
        let (width, signed) = match sh {
            1 => (MemWidth::Half, false),
            2 => (MemWidth::Byte, true),
            _ => (MemWidth::Half, true),
        };
        let t = ctx.tmp();
        ctx.emit(Op::Load { width, signed, user, dst: t, addr });
        gen_writeback(ctx, rn, base, addr, offset, up, pre, wback);
        ctx.store_reg(rd, t);
    } else if sh == 1 {
        let v = ctx.load_reg(rd);
        ctx.emit(Op::Store { width: MemWidth::Half, user, src: v, addr });
        gen_writeback(ctx, rn, base, addr, offset, up, pre, wback);
    } else {
        // Dual transfer: an even/odd register pair, two word
        // accesses.
        if rd & 1 != 0 {
            ctx.gen_undefined();
            return;
        }
        let addr2 = ctx.add_imm(addr, 4);
        if sh == 2 {
            let (t0, t1) = (ctx.tmp(), ctx.tmp());
            ctx.emit(Op::Load { width: MemWidth::Word, signed: false, user, dst: t0, addr });
            ctx.emit(Op::Load { width: MemWidth::Word, signed: false, user, dst: t1, addr: addr2 });
            gen_writeback(ctx, rn, base, addr, offset, up, pre, wback);
            ctx.store_reg(rd, t0);
            ctx.store_reg(rd + 1, t1);
        } else {
            let v0 = ctx.load_reg(rd);
            let v1 = ctx.load_reg(rd + 1);
            ctx.emit(Op::Store { width: MemWidth::Word, user, src: v0, addr });
            ctx.emit(Op::Store { width: MemWidth::Word, user, src: v1, addr: addr2 });
            gen_writeback(ctx, rn, base, addr, offset, up, pre, wback);
        }
    }
}

/// Base register update for the indexed forms. Runs before the loaded
/// value is committed so a load into the base wins.
fn gen_writeback(
    ctx: &mut BlockCtx<'_>,
    rn: u32,
    base: Reg,
    addr: Reg,
    offset: Reg,
    up: bool,
    pre: bool,
    wback: bool,
) {
    if !wback {
        return;
    }
    let wb = if pre { addr } else { apply_offset(ctx, base, offset, up) };
    ctx.store_reg(rn, wb);
}

fn disas_ldst_word(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rn = (insn >> 16) & 0xf;
    let rd = (insn >> 12) & 0xf;
    let load = insn & (1 << 20) != 0;
    let byte = insn & (1 << 22) != 0;
    let pre = insn & (1 << 24) != 0;
    let up = insn & (1 << 23) != 0;
    let wbit = insn & (1 << 21) != 0;
    // Post-indexed with W selects the unprivileged-access form.
    let user = ctx.user || (!pre && wbit);
    let wback = !pre || wbit;
    let width = if byte { MemWidth::Byte } else { MemWidth::Word };

    let base = ctx.load_reg(rn);
    let offset = if insn & (1 << 25) != 0 {
        let v = ctx.load_reg(insn & 0xf);
        let (kind, amount) = decode_imm_shift((insn >> 5) & 3, (insn >> 7) & 0x1f);
        if !(kind == ShiftKind::Lsl && amount == 0) {
            ctx.emit(Op::Shift {
                kind,
                w: W,
                set_carry: false,
                dst: v,
                src: v,
                amount: ShiftAmount::Imm(amount as u8),
            });
        }
        v
    } else {
        ctx.mov_imm(insn & 0xfff)
    };
    let addr = if pre { apply_offset(ctx, base, offset, up) } else { base };

    if load {
        let t = ctx.tmp();
        ctx.emit(Op::Load { width, signed: false, user, dst: t, addr });
        gen_writeback(ctx, rn, base, addr, offset, up, pre, wback);
        // A word load into the program counter interworks.
        ctx.store_reg_bx(rd, t);
    } else {
        let v = ctx.load_reg(rd);
        ctx.emit(Op::Store { width, user, src: v, addr });
        gen_writeback(ctx, rn, base, addr, offset, up, pre, wback);
    }
}

fn disas_block_ldst(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rn = (insn >> 16) & 0xf;
    let load = insn & (1 << 20) != 0;
    let wbit = insn & (1 << 21) != 0;
    let sbit = insn & (1 << 22) != 0;
    let list = insn & 0xffff;
    let count = list.count_ones();
    if count == 0 || rn == 15 {
        ctx.gen_undefined();
        return;
    }
    let mode = BlockMode::from_pu(insn & (1 << 24) != 0, insn & (1 << 23) != 0);
    let layout = block_layout(mode, count);

    // S-bit forms: with the program counter loaded this is the
    // status-restoring return; otherwise the transfer uses the user
    // register bank.
    let restore_spsr = sbit && load && list & 0x8000 != 0;
    let user_bank = sbit && !restore_spsr;
    // Both S-bit forms are privileged, and the user-bank transfer has
    // no writeback form.
    if sbit && (ctx.user || (user_bank && wbit)) {
        ctx.gen_undefined();
        return;
    }

    // The address register walks the transfer in place so the scratch
    // bank stays bounded for long register lists.
    let base = ctx.load_reg(rn);
    let addr = ctx.add_imm(base, layout.start_offset);
    let step = ctx.mov_imm(4u32);
    let data = ctx.tmp();
    let mut loaded_base: Option<Reg> = None;
    let mut first = true;

    for i in 0..16u32 {
        if list & (1 << i) == 0 {
            continue;
        }
        if !first {
            ctx.emit(Op::Alu {
                op: AluOp::Add,
                w: W,
                set_flags: false,
                dst: addr,
                a: addr,
                b: step,
            });
        }
        first = false;
        if load {
            let dst = if i == rn {
                // Deferred: the loaded value overrides writeback.
                let held = ctx.tmp();
                loaded_base = Some(held);
                held
            } else {
                data
            };
            ctx.emit(Op::Load { width: MemWidth::Word, signed: false, user: ctx.user, dst, addr });
            if user_bank && i >= 8 && i < 15 {
                ctx.emit(Op::WriteUserReg { reg: i as u8, src: dst });
            } else if i == 15 && !restore_spsr {
                ctx.store_reg_bx(15, dst);
            } else if i != rn {
                ctx.store_reg(i, dst);
            }
        } else {
            if user_bank && i >= 8 && i < 15 {
                ctx.emit(Op::ReadUserReg { dst: data, reg: i as u8 });
            } else if i == 15 {
                ctx.emit(Op::MovImm { dst: data, value: ctx.pc + 4 });
            } else {
                ctx.emit(Op::Mov { dst: data, src: Reg::Arch(i as u8) });
            }
            ctx.emit(Op::Store { width: MemWidth::Word, user: ctx.user, src: data, addr });
        }
    }

    if wbit {
        // Final address plus a constant recovers the writeback value.
        let delta = layout.writeback_offset - layout.start_offset - 4 * (count as i32 - 1);
        let wb = ctx.add_imm(addr, delta);
        ctx.store_reg(rn, wb);
    }
    if let Some(t) = loaded_base {
        ctx.store_reg(rn, t);
    }
    if restore_spsr {
        ctx.emit(Op::RestoreCpsrFromSpsr);
        ctx.end = Some(BlockEnd::Update);
    }
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

fn disas_branch(ctx: &mut BlockCtx<'_>, insn: u32) {
    let offset = ((insn as i32) << 8) >> 6; // sign-extended imm24 * 4
    if insn & (1 << 24) != 0 {
        let lr = ctx.mov_imm(ctx.pc as u32);
        ctx.store_reg(14, lr);
    }
    let dest = ctx
        .pc
        .wrapping_add(4)
        .wrapping_add(offset as i64 as u64) as u32;
    ctx.gen_jmp(dest as u64);
}

// ---------------------------------------------------------------------------
// Unconditional space
// ---------------------------------------------------------------------------

fn disas_uncond(ctx: &mut BlockCtx<'_>, insn: u32) {
    if insn & 0x0e00_0000 == 0x0a00_0000 {
        // BLX (immediate): link, then switch to the compact set.
        let offset = (((insn as i32) << 8) >> 6) | (((insn >> 24) & 1) << 1) as i32;
        let lr = ctx.mov_imm(ctx.pc as u32);
        ctx.store_reg(14, lr);
        let dest = ctx
            .pc
            .wrapping_add(4)
            .wrapping_add(offset as i64 as u64);
        let target = ctx.mov_imm(dest as u32 | 1);
        ctx.gen_bx(target);
    } else if insn & 0x0e00_0000 == 0x0200_0000 {
        disas_neon_data(ctx, insn);
    } else if insn & 0x0d70_f000 == 0x0550_f000 {
        // Preload hint.
    } else if insn & 0x0fff_fff0 == 0x057f_f010
        || insn & 0x0fff_fff0 == 0x057f_f040
        || insn & 0x0fff_fff0 == 0x057f_f050
        || insn & 0x0fff_fff0 == 0x057f_f060
    {
        // CLREX and barriers: accesses are already globally ordered.
    } else if insn & 0x0fff_0000 == 0x0101_0000 {
        // SETEND: only the little-endian form is supported.
        if insn & (1 << 9) != 0 {
            ctx.gen_undefined();
        }
    } else if insn & 0x0ff0_0000 == 0x0100_0000 {
        // CPS: interrupt masks are not modeled.
    } else if insn & 0x0e50_ffff == 0x0810_0a00 {
        disas_rfe(ctx, insn);
    } else {
        ctx.gen_undefined();
    }
}

/// RFE: reload the program counter and status word from a privileged
/// stack frame.
fn disas_rfe(ctx: &mut BlockCtx<'_>, insn: u32) {
    if ctx.user {
        ctx.gen_undefined();
        return;
    }
    let rn = (insn >> 16) & 0xf;
    let mode = BlockMode::from_pu(insn & (1 << 24) != 0, insn & (1 << 23) != 0);
    let layout = block_layout(mode, 2);
    let base = ctx.load_reg(rn);
    let addr = ctx.add_imm(base, layout.start_offset);
    let (new_pc, new_cpsr) = (ctx.tmp(), ctx.tmp());
    ctx.emit(Op::Load { width: MemWidth::Word, signed: false, user: false, dst: new_pc, addr });
    let addr2 = ctx.add_imm(addr, 4);
    ctx.emit(Op::Load { width: MemWidth::Word, signed: false, user: false, dst: new_cpsr, addr: addr2 });
    if insn & (1 << 21) != 0 {
        let wb = ctx.add_imm(base, layout.writeback_offset);
        ctx.store_reg(rn, wb);
    }
    ctx.emit(Op::WriteCpsr { src: new_cpsr, mask: u32::MAX });
    ctx.store_reg(15, new_pc);
    ctx.end = Some(BlockEnd::Update);
}

// ---------------------------------------------------------------------------
// Coprocessor and extension dispatch
// ---------------------------------------------------------------------------

fn disas_coproc(ctx: &mut BlockCtx<'_>, insn: u32) {
    match (insn >> 8) & 0xf {
        10 | 11 => disas_vfp(ctx, insn),
        15 => disas_cp15(ctx, insn),
        _ => ctx.gen_undefined(),
    }
}

fn disas_coproc_ldst(ctx: &mut BlockCtx<'_>, insn: u32) {
    match (insn >> 8) & 0xf {
        10 | 11 => disas_vfp_ldst(ctx, insn),
        _ => ctx.gen_undefined(),
    }
}

fn disas_cp15(ctx: &mut BlockCtx<'_>, insn: u32) {
    // System control space is privileged and register-transfer only.
    if ctx.user || insn & 0x10 == 0 {
        ctx.gen_undefined();
        return;
    }
    let rd = (insn >> 12) & 0xf;
    let reg = (((insn >> 21) & 7) << 12 | ((insn >> 16) & 0xf) << 8 | (insn & 0xf) << 4
        | ((insn >> 5) & 7)) as u16;
    if insn & (1 << 20) != 0 {
        let t = ctx.tmp();
        ctx.emit(Op::CpRead { cp: 15, reg, dst: t });
        ctx.store_reg(rd, t);
    } else {
        let v = ctx.load_reg(rd);
        ctx.emit(Op::CpWrite { cp: 15, reg, src: v });
        // Control writes can remap or retime anything; re-resolve.
        ctx.end = Some(BlockEnd::Update);
    }
}

// ---------------------------------------------------------------------------
// Float unit
// ---------------------------------------------------------------------------

fn vfp_sreg(insn: u32, pos: u32, lowbit: u32) -> u8 {
    ((((insn >> pos) & 0xf) << 1) | ((insn >> lowbit) & 1)) as u8
}

fn vfp_dreg(insn: u32, pos: u32, highbit: u32) -> u8 {
    (((insn >> pos) & 0xf) | (((insn >> highbit) & 1) << 4)) as u8
}

fn vfp_regs(insn: u32, double: bool) -> (u8, u8, u8) {
    if double {
        (vfp_dreg(insn, 12, 22), vfp_dreg(insn, 16, 7), vfp_dreg(insn, 0, 5))
    } else {
        (vfp_sreg(insn, 12, 22), vfp_sreg(insn, 16, 7), vfp_sreg(insn, 0, 5))
    }
}

/// Expand the 8-bit float immediate: sign, inverted-then-replicated
/// exponent MSB, and a 4-bit mantissa.
fn vfp_expand_imm(imm8: u32, double: bool) -> u64 {
    let sign = (imm8 >> 7) as u64;
    let exp_high = ((imm8 >> 6) & 1) as u64;
    let exp_rest = ((imm8 >> 4) & 3) as u64;
    let frac = (imm8 & 0xf) as u64;
    if double {
        (sign << 63)
            | ((exp_high ^ 1) << 62)
            | (if exp_high != 0 { 0xff << 54 } else { 0 })
            | (exp_rest << 52)
            | (frac << 48)
    } else {
        (sign << 31)
            | ((exp_high ^ 1) << 30)
            | (if exp_high != 0 { 0x1f << 25 } else { 0 })
            | (exp_rest << 23)
            | (frac << 19)
    }
}

fn disas_vfp(ctx: &mut BlockCtx<'_>, insn: u32) {
    if !ctx.vfp_enabled {
        ctx.gen_undefined();
        return;
    }
    if insn & 0x10 != 0 {
        disas_vfp_xfer(ctx, insn);
        return;
    }
    let double = insn & (1 << 8) != 0;
    let (d, n, m) = vfp_regs(insn, double);
    let (len, stride) = (ctx.vec_len, ctx.vec_stride);
    let bin = |kind: FloatBinKind| Op::FloatBin { kind, double, len, stride, dst: d, a: n, b: m };
    let un = |kind: FloatUnKind, dst: u8, src: u8| Op::FloatUn {
        kind,
        double,
        len,
        stride,
        dst,
        src,
    };
    match ((insn >> 20) & 0xb, insn & (1 << 6) != 0) {
        (0x3, false) => ctx.emit(bin(FloatBinKind::Add)),
        (0x3, true) => ctx.emit(bin(FloatBinKind::Sub)),
        (0x2, false) => ctx.emit(bin(FloatBinKind::Mul)),
        (0x2, true) => {
            // Negated multiply.
            ctx.emit(bin(FloatBinKind::Mul));
            ctx.emit(un(FloatUnKind::Neg, d, d));
        }
        (0x8, false) => ctx.emit(bin(FloatBinKind::Div)),
        (0xb, false) => {
            // VMOV (immediate).
            let imm8 = ((insn >> 12) & 0xf0) | (insn & 0xf);
            let value = vfp_expand_imm(imm8, double);
            if double {
                ctx.emit(Op::VecMovImm { dst: d, q: false, value });
            } else {
                let t = ctx.mov_imm(value as u32);
                ctx.emit(Op::GpToFloat { dst: d, src: t });
            }
        }
        (0xb, true) => {
            let opc2 = (insn >> 16) & 0xf;
            let e = insn & (1 << 7) != 0;
            match opc2 {
                0 => {
                    if e {
                        ctx.emit(un(FloatUnKind::Abs, d, m));
                    } else {
                        ctx.emit(un(FloatUnKind::Mov, d, m));
                    }
                }
                1 => {
                    if e {
                        ctx.emit(un(FloatUnKind::Sqrt, d, m));
                    } else {
                        ctx.emit(un(FloatUnKind::Neg, d, m));
                    }
                }
                4 => ctx.emit(Op::FloatCmp { double, signaling: e, a: d, b: m }),
                5 => ctx.emit(Op::FloatCmpZero { double, signaling: e, a: d }),
                _ => ctx.gen_undefined(),
            }
        }
        _ => ctx.gen_undefined(),
    }
}

fn disas_vfp_xfer(ctx: &mut BlockCtx<'_>, insn: u32) {
    let to_gp = insn & (1 << 20) != 0;
    let rt = (insn >> 12) & 0xf;
    if insn & 0x0fe0_0fff == 0x0ee0_0a10 {
        // VMSR/VMRS on the status word; transfers targeting the
        // program-counter slot copy the compare flags instead.
        let sysreg = (insn >> 16) & 0xf;
        if sysreg != 1 {
            ctx.gen_undefined();
            return;
        }
        if to_gp {
            if rt == 15 {
                ctx.emit(Op::VfpStatusToFlags);
            } else {
                let t = ctx.tmp();
                ctx.emit(Op::ReadFpscr { dst: t });
                ctx.store_reg(rt, t);
            }
        } else {
            let v = ctx.load_reg(rt);
            ctx.emit(Op::WriteFpscr { src: v });
            // Short-vector fields feed translation; stop here.
            ctx.end = Some(BlockEnd::Update);
        }
    } else if insn & 0x0fe0_0f7f == 0x0e00_0a10 {
        // Single-precision transfer to/from a general register.
        let s = vfp_sreg(insn, 16, 7);
        if to_gp {
            let t = ctx.tmp();
            ctx.emit(Op::FloatToGp { dst: t, src: s });
            ctx.store_reg(rt, t);
        } else {
            let v = ctx.load_reg(rt);
            ctx.emit(Op::GpToFloat { dst: s, src: v });
        }
    } else {
        ctx.gen_undefined();
    }
}

fn disas_vfp_ldst(ctx: &mut BlockCtx<'_>, insn: u32) {
    if !ctx.vfp_enabled {
        ctx.gen_undefined();
        return;
    }
    let double = insn & (1 << 8) != 0;
    let rn = (insn >> 16) & 0xf;
    let load = insn & (1 << 20) != 0;
    let pre = insn & (1 << 24) != 0;
    let up = insn & (1 << 23) != 0;
    let wbit = insn & (1 << 21) != 0;
    let fd = if double { vfp_dreg(insn, 12, 22) } else { vfp_sreg(insn, 12, 22) };
    let base = ctx.load_reg(rn);

    if pre && !wbit {
        // VLDR/VSTR.
        let offset = ((insn & 0xff) * 4) as i32;
        let addr = ctx.add_imm(base, if up { offset } else { -offset });
        if load {
            ctx.emit(Op::FloatLoad { double, dst: fd, addr });
        } else {
            ctx.emit(Op::FloatStore { double, src: fd, addr });
        }
    } else if wbit || !pre {
        // VLDM/VSTM over a contiguous register range.
        let step = if double { 8 } else { 4 };
        let count = if double { (insn & 0xff) / 2 } else { insn & 0xff };
        if count == 0 || fd as u32 + count > 32 {
            ctx.gen_undefined();
            return;
        }
        let span = (count * step) as i32;
        let addr = if up { base } else { ctx.add_imm(base, -span) };
        let stride = ctx.mov_imm(step);
        for i in 0..count {
            if i != 0 {
                // In place, keeping the scratch bank bounded.
                ctx.emit(Op::Alu {
                    op: AluOp::Add,
                    w: W,
                    set_flags: false,
                    dst: addr,
                    a: addr,
                    b: stride,
                });
            }
            let reg = fd + i as u8;
            if load {
                ctx.emit(Op::FloatLoad { double, dst: reg, addr });
            } else {
                ctx.emit(Op::FloatStore { double, src: reg, addr });
            }
        }
        if wbit {
            // Final address plus a constant recovers the writeback
            // value for both directions.
            let delta = if up {
                step as i32
            } else {
                -((count as i32 - 1) * step as i32)
            };
            let wb = ctx.add_imm(addr, delta);
            ctx.store_reg(rn, wb);
        }
    } else {
        ctx.gen_undefined();
    }
}

// ---------------------------------------------------------------------------
// Vector unit
// ---------------------------------------------------------------------------

fn neon_reg(insn: u32, pos: u32, highbit: u32) -> u8 {
    (((insn >> pos) & 0xf) | (((insn >> highbit) & 1) << 4)) as u8
}

/// Three-registers-same-length vector operations. Anything outside
/// the supported rows is undefined.
fn disas_neon_data(ctx: &mut BlockCtx<'_>, insn: u32) {
    if !ctx.vfp_enabled {
        ctx.gen_undefined();
        return;
    }
    if insn & (1 << 23) != 0 {
        // Shift-immediate, long/narrow and misc spaces.
        ctx.gen_undefined();
        return;
    }
    let unsigned = insn & (1 << 24) != 0;
    let size = (insn >> 20) & 3;
    let q = insn & (1 << 6) != 0;
    let b = insn & (1 << 4) != 0;
    let opc = (insn >> 8) & 0xf;
    let d = neon_reg(insn, 12, 22);
    let n = neon_reg(insn, 16, 7);
    let m = neon_reg(insn, 0, 5);
    if q && (d | n | m) & 1 != 0 {
        ctx.gen_undefined();
        return;
    }
    let width = match size {
        0 => LaneWidth::W8,
        1 => LaneWidth::W16,
        2 => LaneWidth::W32,
        _ => LaneWidth::W64,
    };
    let signed = !unsigned;
    let vb = |kind: VecBinKind, a: u8, b_reg: u8| Op::VecBin {
        kind,
        width,
        signed,
        q,
        dst: d,
        a,
        b: b_reg,
    };
    match (opc, b) {
        (0x0, true) => ctx.emit(vb(VecBinKind::QAdd, n, m)),
        (0x2, true) => ctx.emit(vb(VecBinKind::QSub, n, m)),
        (0x3, false) if size < 3 => ctx.emit(vb(VecBinKind::Cgt, n, m)),
        (0x3, true) if size < 3 => ctx.emit(vb(VecBinKind::Cge, n, m)),
        // The shift family takes its per-lane amounts from the first
        // source register.
        (0x4, false) => ctx.emit(vb(VecBinKind::Shl, m, n)),
        (0x4, true) => ctx.emit(vb(VecBinKind::QShl, m, n)),
        (0x5, false) => ctx.emit(vb(VecBinKind::Rshl, m, n)),
        (0x5, true) => ctx.emit(vb(VecBinKind::QRshl, m, n)),
        (0x6, false) if size < 3 => ctx.emit(vb(VecBinKind::Max, n, m)),
        (0x6, true) if size < 3 => ctx.emit(vb(VecBinKind::Min, n, m)),
        (0x7, false) if size < 3 => ctx.emit(vb(VecBinKind::Abd, n, m)),
        (0x8, false) => {
            if unsigned {
                ctx.emit(vb(VecBinKind::Sub, n, m));
            } else {
                ctx.emit(vb(VecBinKind::Add, n, m));
            }
        }
        (0x8, true) if unsigned && size < 3 => ctx.emit(vb(VecBinKind::Ceq, n, m)),
        (0x9, true) if !unsigned && size < 3 => ctx.emit(vb(VecBinKind::Mul, n, m)),
        (0x1, true) => {
            let kind = match (unsigned, size) {
                (false, 0) => VecBinKind::And,
                (false, 1) => VecBinKind::Bic,
                (false, 2) => VecBinKind::Orr,
                (false, 3) => VecBinKind::Orn,
                (true, 0) => VecBinKind::Eor,
                _ => {
                    ctx.gen_undefined();
                    return;
                }
            };
            ctx.emit(vb(kind, n, m));
        }
        _ => ctx.gen_undefined(),
    }
}
