// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Decoder for the 64-bit instruction set. Covers the integer
//! data-processing groups, branches, exception generation, system
//! moves, and the general-register load/store forms. Advanced SIMD and
//! floating point in this set are not provided and fall to the
//! undefined path.
//!
//! Register 31 is resolved per operand: stack pointer where the
//! encoding says so, otherwise the zero register (reads materialize
//! zero, writes are dropped).

use crate::alu::Cond;
use crate::op::{
    AluOp, ExceptionCause, ExtendKind, MemWidth, Op, OpWidth, Reg, RevKind, ShiftAmount, DISCARD,
};

use super::{BlockCtx, BlockEnd};

#[inline]
fn opw(sf: bool) -> OpWidth {
    if sf {
        OpWidth::W64
    } else {
        OpWidth::W32
    }
}

/// Read a general register, resolving 31 to the zero register.
fn read_gp(ctx: &mut BlockCtx<'_>, r: u32) -> Reg {
    if r == 31 {
        ctx.mov_imm(0u64)
    } else {
        ctx.load_reg(r)
    }
}

/// Read a general register, resolving 31 to the stack pointer.
fn read_gp_sp(ctx: &mut BlockCtx<'_>, r: u32) -> Reg {
    ctx.load_reg(r)
}

/// Write a general register, dropping writes to the zero register.
fn write_gp(ctx: &mut BlockCtx<'_>, r: u32, src: Reg) {
    if r != 31 {
        ctx.store_reg(r, src);
    }
}

/// Write a general register, resolving 31 to the stack pointer.
fn write_gp_sp(ctx: &mut BlockCtx<'_>, r: u32, src: Reg) {
    ctx.store_reg(r, src);
}

/// 64-bit `base + disp` into a fresh temporary.
fn add_imm64(ctx: &mut BlockCtx<'_>, base: Reg, disp: i64) -> Reg {
    if disp == 0 {
        return base;
    }
    let off = ctx.mov_imm(disp.unsigned_abs());
    let dst = ctx.tmp();
    let op = if disp < 0 { AluOp::Sub } else { AluOp::Add };
    ctx.emit(Op::Alu { op, w: OpWidth::W64, set_flags: false, dst, a: base, b: off });
    dst
}

/// Logical flag-setting forms leave carry and overflow clear.
fn clear_cv(ctx: &mut BlockCtx<'_>) {
    let zero = ctx.mov_imm(0u32);
    ctx.emit(Op::WriteCpsr { src: zero, mask: 0x3000_0000 });
}

/// Decode a bitmask immediate field. Returns the replicated pattern,
/// or `None` for a reserved encoding.
pub(crate) fn decode_bit_masks(n: u32, imms: u32, immr: u32, width: u32) -> Option<u64> {
    let combined = (n << 6) | (!imms & 0x3f);
    if combined == 0 {
        return None;
    }
    let len = 31 - combined.leading_zeros();
    let esize = 1u32 << len;
    if esize > width {
        return None;
    }
    let levels = esize - 1;
    let s = imms & levels;
    let r = immr & levels;
    if s == levels {
        return None;
    }
    let welem: u64 = (1u64 << (s + 1)) - 1;
    let elem = if r == 0 {
        welem
    } else {
        let emask = if esize == 64 { u64::MAX } else { (1u64 << esize) - 1 };
        ((welem >> r) | (welem << (esize - r))) & emask
    };
    let mut pattern = elem;
    let mut filled = esize;
    while filled < width {
        pattern |= pattern << filled;
        filled *= 2;
    }
    if width == 32 {
        pattern &= 0xffff_ffff;
    }
    Some(pattern)
}

pub(crate) fn disas_insn(ctx: &mut BlockCtx<'_>) {
    let insn = match ctx.fetch32() {
        Ok(insn) => insn,
        Err(fault) => {
            ctx.gen_exception(fault.addr, ExceptionCause::PrefetchAbort);
            return;
        }
    };
    match (insn >> 25) & 0xf {
        8 | 9 => disas_dp_imm(ctx, insn),
        10 | 11 => disas_branch(ctx, insn),
        4 | 6 | 12 | 14 => disas_ldst(ctx, insn),
        5 | 13 => disas_dp_reg(ctx, insn),
        _ => ctx.gen_undefined(),
    }
}

fn disas_dp_imm(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rd = insn & 0x1f;
    let rn = (insn >> 5) & 0x1f;
    let sf = insn & (1 << 31) != 0;
    match (insn >> 23) & 7 {
        0 | 1 => {
            // Fetch-relative address generation.
            let imm = ((((insn >> 5) & 0x7ffff) << 2 | (insn >> 29) & 3) as i64) << 43 >> 43;
            let value = if insn & (1 << 31) != 0 {
                ((ctx.insn_start as i64 & !0xfff) + (imm << 12)) as u64
            } else {
                (ctx.insn_start as i64 + imm) as u64
            };
            let t = ctx.mov_imm(value);
            write_gp(ctx, rd, t);
        }
        2 => {
            let mut imm = ((insn >> 10) & 0xfff) as u64;
            if insn & (1 << 22) != 0 {
                imm <<= 12;
            }
            let set_flags = insn & (1 << 29) != 0;
            let op = if insn & (1 << 30) != 0 { AluOp::Sub } else { AluOp::Add };
            let a = read_gp_sp(ctx, rn);
            let b = ctx.mov_imm(imm);
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op, w: opw(sf), set_flags, dst: t, a, b });
            if set_flags {
                write_gp(ctx, rd, t);
            } else {
                write_gp_sp(ctx, rd, t);
            }
        }
        4 => {
            let n = (insn >> 22) & 1;
            if !sf && n != 0 {
                ctx.gen_undefined();
                return;
            }
            let width = if sf { 64 } else { 32 };
            let mask = match decode_bit_masks(n, (insn >> 10) & 0x3f, (insn >> 16) & 0x3f, width) {
                Some(m) => m,
                None => {
                    ctx.gen_undefined();
                    return;
                }
            };
            let opc = (insn >> 29) & 3;
            let set_flags = opc == 3;
            let op = match opc {
                0 | 3 => AluOp::And,
                1 => AluOp::Orr,
                _ => AluOp::Eor,
            };
            let a = read_gp(ctx, rn);
            let b = ctx.mov_imm(mask);
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op, w: opw(sf), set_flags, dst: t, a, b });
            if set_flags {
                clear_cv(ctx);
                write_gp(ctx, rd, t);
            } else {
                write_gp_sp(ctx, rd, t);
            }
        }
        // The upper half of the shift field is reserved.
        3 => ctx.gen_undefined(),
        5 => disas_movw(ctx, insn),
        6 => disas_bitfield(ctx, insn),
        _ => {
            // Extract: concatenated pair shifted down by the low
            // operand's bit index.
            if (insn >> 29) & 3 != 0 {
                ctx.gen_undefined();
                return;
            }
            let imms = (insn >> 10) & 0x3f;
            let width: u32 = if sf { 64 } else { 32 };
            if (insn >> 22) & 1 != sf as u32 || imms >= width {
                ctx.gen_undefined();
                return;
            }
            let rm = (insn >> 16) & 0x1f;
            let lo = read_gp(ctx, rn);
            if imms == 0 {
                write_gp(ctx, rd, lo);
                return;
            }
            ctx.emit(Op::Shift {
                kind: crate::alu::ShiftKind::Lsr,
                w: opw(sf),
                set_carry: false,
                dst: lo,
                src: lo,
                amount: ShiftAmount::Imm(imms as u8),
            });
            let hi = read_gp(ctx, rm);
            ctx.emit(Op::Shift {
                kind: crate::alu::ShiftKind::Lsl,
                w: opw(sf),
                set_carry: false,
                dst: hi,
                src: hi,
                amount: ShiftAmount::Imm((width - imms) as u8),
            });
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: AluOp::Orr, w: opw(sf), set_flags: false, dst: t, a: lo, b: hi });
            write_gp(ctx, rd, t);
        }
    }
}

fn disas_movw(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rd = insn & 0x1f;
    let sf = insn & (1 << 31) != 0;
    let shift = ((insn >> 21) & 3) * 16;
    if !sf && shift >= 32 {
        ctx.gen_undefined();
        return;
    }
    let imm = (((insn >> 5) & 0xffff) as u64) << shift;
    match (insn >> 29) & 3 {
        0 => {
            let value = if sf { !imm } else { !imm & 0xffff_ffff };
            let t = ctx.mov_imm(value);
            write_gp(ctx, rd, t);
        }
        2 => {
            let t = ctx.mov_imm(imm);
            write_gp(ctx, rd, t);
        }
        3 => {
            // Keep the other halfwords of the destination.
            let old = read_gp(ctx, rd);
            let hole = ctx.mov_imm(0xffffu64 << shift);
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: AluOp::Bic, w: opw(sf), set_flags: false, dst: t, a: old, b: hole });
            let field = ctx.mov_imm(imm);
            ctx.emit(Op::Alu { op: AluOp::Orr, w: opw(sf), set_flags: false, dst: t, a: t, b: field });
            write_gp(ctx, rd, t);
        }
        _ => ctx.gen_undefined(),
    }
}

fn disas_bitfield(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rd = insn & 0x1f;
    let rn = (insn >> 5) & 0x1f;
    let sf = insn & (1 << 31) != 0;
    let width: u32 = if sf { 64 } else { 32 };
    let immr = (insn >> 16) & 0x3f;
    let imms = (insn >> 10) & 0x3f;
    let n = (insn >> 22) & 1;
    if n != sf as u32 || immr >= width || imms >= width {
        ctx.gen_undefined();
        return;
    }
    let w = opw(sf);
    let opc = (insn >> 29) & 3;
    let shift_by = |ctx: &mut BlockCtx<'_>, r: Reg, amount: u32, kind: crate::alu::ShiftKind| {
        if amount != 0 {
            ctx.emit(Op::Shift {
                kind,
                w,
                set_carry: false,
                dst: r,
                src: r,
                amount: ShiftAmount::Imm(amount as u8),
            });
        }
    };
    use crate::alu::ShiftKind::{Asr, Lsl, Lsr};
    match opc {
        1 => {
            // Insert into the existing destination value.
            let (fmask, lsb, src_shift) = if imms >= immr {
                let len = imms - immr + 1;
                let wmask = if len == 64 { u64::MAX } else { (1u64 << len) - 1 };
                (wmask, 0u32, immr)
            } else {
                let wmask = (1u64 << (imms + 1)) - 1;
                (wmask << (width - immr), width - immr, 0)
            };
            let field = read_gp(ctx, rn);
            shift_by(ctx, field, src_shift, Lsr);
            if lsb != 0 {
                shift_by(ctx, field, lsb, Lsl);
            }
            let m = ctx.mov_imm(fmask);
            ctx.emit(Op::Alu { op: AluOp::And, w, set_flags: false, dst: field, a: field, b: m });
            let old = read_gp(ctx, rd);
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: AluOp::Bic, w, set_flags: false, dst: t, a: old, b: m });
            ctx.emit(Op::Alu { op: AluOp::Orr, w, set_flags: false, dst: t, a: t, b: field });
            write_gp(ctx, rd, t);
        }
        0 | 2 => {
            let signed = opc == 0;
            let v = read_gp(ctx, rn);
            if imms >= immr {
                // Extract a field down to bit zero.
                let top = width - 1 - imms;
                shift_by(ctx, v, top, Lsl);
                shift_by(ctx, v, top + immr, if signed { Asr } else { Lsr });
            } else {
                // Place a field at a higher bit position.
                let top = width - 1 - imms;
                shift_by(ctx, v, top, Lsl);
                shift_by(ctx, v, top, if signed { Asr } else { Lsr });
                shift_by(ctx, v, width - immr, Lsl);
            }
            write_gp(ctx, rd, v);
        }
        _ => ctx.gen_undefined(),
    }
}

fn disas_branch(ctx: &mut BlockCtx<'_>, insn: u32) {
    if (insn >> 26) & 0x1f == 5 {
        // Direct branch, with or without link.
        let offset = (((insn & 0x03ff_ffff) as i64) << 38 >> 36) as u64;
        if insn & (1 << 31) != 0 {
            let lr = ctx.mov_imm(ctx.pc);
            ctx.store_reg(30, lr);
        }
        ctx.gen_jmp(ctx.insn_start.wrapping_add(offset));
    } else if (insn >> 25) & 0x3f == 0x1a {
        // Compare and branch on zero.
        let sf = insn & (1 << 31) != 0;
        let if_zero = insn & (1 << 24) == 0;
        let offset = (((insn >> 5) & 0x7ffff) as i64) << 45 >> 43;
        let mut v = read_gp(ctx, insn & 0x1f);
        if !sf {
            let t = ctx.tmp();
            ctx.emit(Op::Extend { kind: ExtendKind::Uxtw, dst: t, src: v });
            v = t;
        }
        let skip = ctx.label();
        ctx.emit(Op::BranchZero { src: v, if_zero: !if_zero, dest: skip });
        ctx.condjmp = Some(skip);
        ctx.gen_jmp(ctx.insn_start.wrapping_add(offset as u64));
    } else if (insn >> 25) & 0x3f == 0x1b {
        // Test bit and branch.
        let bit = ((insn >> 31) << 5) | ((insn >> 19) & 0x1f);
        let if_zero = insn & (1 << 24) == 0;
        let offset = (((insn >> 5) & 0x3fff) as i64) << 50 >> 48;
        let v = read_gp(ctx, insn & 0x1f);
        ctx.emit(Op::Shift {
            kind: crate::alu::ShiftKind::Lsr,
            w: OpWidth::W64,
            set_carry: false,
            dst: v,
            src: v,
            amount: ShiftAmount::Imm(bit as u8),
        });
        let one = ctx.mov_imm(1u64);
        ctx.emit(Op::Alu { op: AluOp::And, w: OpWidth::W64, set_flags: false, dst: v, a: v, b: one });
        let skip = ctx.label();
        ctx.emit(Op::BranchZero { src: v, if_zero: !if_zero, dest: skip });
        ctx.condjmp = Some(skip);
        ctx.gen_jmp(ctx.insn_start.wrapping_add(offset as u64));
    } else if (insn >> 24) & 0xff == 0x54 && insn & (1 << 4) == 0 {
        let cond = insn & 0xf;
        let offset = (((insn >> 5) & 0x7ffff) as i64) << 45 >> 43;
        if cond < 14 {
            ctx.gen_condjmp(Cond::from_bits(cond));
        }
        ctx.gen_jmp(ctx.insn_start.wrapping_add(offset as u64));
    } else if (insn >> 24) & 0xff == 0xd4 {
        match ((insn >> 21) & 7, insn & 0x1f) {
            (0, 1) => ctx.gen_exception(ctx.pc, ExceptionCause::SoftwareInterrupt),
            (1, 0) => ctx.gen_exception(ctx.insn_start, ExceptionCause::Breakpoint),
            _ => ctx.gen_undefined(),
        }
    } else if (insn >> 22) & 0x3ff == 0x354 {
        disas_system(ctx, insn);
    } else if (insn >> 25) & 0x7f == 0x6b {
        // Register-indirect branch.
        let rn = (insn >> 5) & 0x1f;
        if insn & 0x1f != 0 || (insn >> 10) & 0x3f != 0 || (insn >> 16) & 0x1f != 0x1f {
            ctx.gen_undefined();
            return;
        }
        let target = read_gp(ctx, rn);
        match (insn >> 21) & 0xf {
            0 => ctx.gen_bx(target),
            1 => {
                let lr = ctx.mov_imm(ctx.pc);
                ctx.store_reg(30, lr);
                ctx.gen_bx(target);
            }
            2 => ctx.gen_bx(target),
            _ => ctx.gen_undefined(),
        }
    } else {
        ctx.gen_undefined();
    }
}

fn disas_system(ctx: &mut BlockCtx<'_>, insn: u32) {
    let op0 = (insn >> 19) & 3;
    let crn = (insn >> 12) & 0xf;
    if op0 == 0 {
        // Hints, barriers, and immediate status-field writes take no
        // modeled effect.
        match crn {
            2 | 3 | 4 => {}
            _ => ctx.gen_undefined(),
        }
        return;
    }
    if op0 < 2 {
        // System instruction space (cache and TLB maintenance): no
        // modeled effect.
        return;
    }
    // Register moves to and from the system register file.
    let reg = (((insn >> 19) & 3) << 14
        | ((insn >> 16) & 7) << 11
        | crn << 7
        | ((insn >> 8) & 0xf) << 3
        | (insn >> 5) & 7) as u16;
    let rt = insn & 0x1f;
    if insn & (1 << 21) != 0 {
        let t = ctx.tmp();
        ctx.emit(Op::CpRead { cp: 0, reg, dst: t });
        write_gp(ctx, rt, t);
    } else {
        let src = read_gp(ctx, rt);
        ctx.emit(Op::CpWrite { cp: 0, reg, src });
        ctx.end = Some(BlockEnd::Update);
    }
}

fn disas_ldst(ctx: &mut BlockCtx<'_>, insn: u32) {
    if insn & (1 << 26) != 0 {
        // SIMD register file transfers are not provided.
        ctx.gen_undefined();
        return;
    }
    match (insn >> 27) & 7 {
        1 => disas_exclusive(ctx, insn),
        3 => disas_ldst_literal(ctx, insn),
        5 => disas_ldst_pair(ctx, insn),
        7 => disas_ldst_single(ctx, insn),
        _ => ctx.gen_undefined(),
    }
}

fn disas_ldst_literal(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rt = insn & 0x1f;
    let offset = (((insn >> 5) & 0x7ffff) as i64) << 45 >> 43;
    let addr = ctx.mov_imm(ctx.insn_start.wrapping_add(offset as u64));
    let (width, signed) = match insn >> 30 {
        0 => (MemWidth::Word, false),
        1 => (MemWidth::Double, false),
        2 => (MemWidth::Word, true),
        _ => {
            // Prefetch hint: no effect.
            return;
        }
    };
    let t = ctx.tmp();
    ctx.emit(Op::Load { width, signed, user: ctx.user, dst: t, addr });
    write_gp(ctx, rt, t);
}

fn disas_exclusive(ctx: &mut BlockCtx<'_>, insn: u32) {
    let size = insn >> 30;
    let width = match size {
        0 => MemWidth::Byte,
        1 => MemWidth::Half,
        2 => MemWidth::Word,
        _ => MemWidth::Double,
    };
    let rt = insn & 0x1f;
    let rn = (insn >> 5) & 0x1f;
    let load = insn & (1 << 22) != 0;
    // Ordered variants carry the same transfer with no exclusivity.
    let ordered = insn & (1 << 23) != 0;
    if insn & (1 << 21) != 0 {
        // Pair exclusives are not provided.
        ctx.gen_undefined();
        return;
    }
    let addr = read_gp_sp(ctx, rn);
    if load {
        let t = ctx.tmp();
        ctx.emit(Op::Load { width, signed: false, user: ctx.user, dst: t, addr });
        write_gp(ctx, rt, t);
    } else {
        let v = read_gp(ctx, rt);
        if ordered {
            ctx.emit(Op::Store { width, user: ctx.user, src: v, addr });
        } else {
            // The exclusive store always succeeds: translated code is
            // the only mutator within the atomic window.
            let rs = (insn >> 16) & 0x1f;
            ctx.emit(Op::AtomicBegin);
            ctx.emit(Op::Store { width, user: ctx.user, src: v, addr });
            ctx.emit(Op::AtomicEnd);
            let status = ctx.mov_imm(0u32);
            write_gp(ctx, rs, status);
        }
    }
}

fn disas_ldst_pair(ctx: &mut BlockCtx<'_>, insn: u32) {
    let opc = insn >> 30;
    let load = insn & (1 << 22) != 0;
    let (width, scale, signed) = match opc {
        0 => (MemWidth::Word, 4i64, false),
        1 => {
            if !load {
                ctx.gen_undefined();
                return;
            }
            (MemWidth::Word, 4, true)
        }
        2 => (MemWidth::Double, 8, false),
        _ => {
            ctx.gen_undefined();
            return;
        }
    };
    let imm = ((((insn >> 15) & 0x7f) as i64) << 57 >> 57) * scale;
    let rt = insn & 0x1f;
    let rt2 = (insn >> 10) & 0x1f;
    let rn = (insn >> 5) & 0x1f;
    let index = (insn >> 23) & 3;
    let base = read_gp_sp(ctx, rn);
    let addr = if index == 1 { base } else { add_imm64(ctx, base, imm) };
    let addr2 = add_imm64(ctx, addr, scale);
    // Resolve writeback while the base value is still live.
    let writeback = match index {
        1 => Some(add_imm64(ctx, base, imm)),
        3 => Some(addr),
        _ => None,
    };
    if load {
        let t1 = ctx.tmp();
        ctx.emit(Op::Load { width, signed, user: ctx.user, dst: t1, addr });
        let t2 = ctx.tmp();
        ctx.emit(Op::Load { width, signed, user: ctx.user, dst: t2, addr: addr2 });
        // Writeback before the destination stores keeps a loaded base
        // as the winner.
        if let Some(wb) = writeback {
            write_gp_sp(ctx, rn, wb);
        }
        write_gp(ctx, rt, t1);
        write_gp(ctx, rt2, t2);
    } else {
        let v1 = read_gp(ctx, rt);
        ctx.emit(Op::Store { width, user: ctx.user, src: v1, addr });
        let v2 = read_gp(ctx, rt2);
        ctx.emit(Op::Store { width, user: ctx.user, src: v2, addr: addr2 });
        if let Some(wb) = writeback {
            write_gp_sp(ctx, rn, wb);
        }
    }
}

fn disas_ldst_single(ctx: &mut BlockCtx<'_>, insn: u32) {
    let size = insn >> 30;
    let opc = (insn >> 22) & 3;
    let rt = insn & 0x1f;
    let rn = (insn >> 5) & 0x1f;
    let width = match size {
        0 => MemWidth::Byte,
        1 => MemWidth::Half,
        2 => MemWidth::Word,
        _ => MemWidth::Double,
    };
    // opc 2/3 are the sign-extending loads to 64- or 32-bit targets.
    let (load, signed, to32) = match opc {
        0 => (false, false, false),
        1 => (true, false, false),
        2 => {
            if size == 3 {
                // Prefetch hint: no effect.
                return;
            }
            (true, true, false)
        }
        _ => {
            if size >= 2 {
                ctx.gen_undefined();
                return;
            }
            (true, true, true)
        }
    };

    let base = read_gp_sp(ctx, rn);
    let (addr, writeback) = if insn & (1 << 24) != 0 {
        // Scaled unsigned offset.
        let imm = (((insn >> 10) & 0xfff) as i64) << size;
        (add_imm64(ctx, base, imm), None)
    } else {
        let mode = (insn >> 10) & 3;
        match mode {
            0 => {
                // Unscaled signed offset.
                let imm = (((insn >> 12) & 0x1ff) as i64) << 55 >> 55;
                (add_imm64(ctx, base, imm), None)
            }
            1 | 3 => {
                // Post- or pre-indexed with writeback.
                let imm = (((insn >> 12) & 0x1ff) as i64) << 55 >> 55;
                let ea = add_imm64(ctx, base, imm);
                if mode == 1 {
                    (base, Some(ea))
                } else {
                    (ea, Some(ea))
                }
            }
            _ => {
                // Register offset with extend and optional scaling.
                if insn & (1 << 21) == 0 {
                    ctx.gen_undefined();
                    return;
                }
                let option = (insn >> 13) & 7;
                let rm = (insn >> 16) & 0x1f;
                let mut off = read_gp(ctx, rm);
                let kind = match option {
                    2 => Some(ExtendKind::Uxtw),
                    3 | 7 => None,
                    6 => Some(ExtendKind::Sxtw),
                    _ => {
                        ctx.gen_undefined();
                        return;
                    }
                };
                if let Some(kind) = kind {
                    let t = ctx.tmp();
                    ctx.emit(Op::Extend { kind, dst: t, src: off });
                    off = t;
                }
                if insn & (1 << 12) != 0 && size != 0 {
                    ctx.emit(Op::Shift {
                        kind: crate::alu::ShiftKind::Lsl,
                        w: OpWidth::W64,
                        set_carry: false,
                        dst: off,
                        src: off,
                        amount: ShiftAmount::Imm(size as u8),
                    });
                }
                let ea = ctx.tmp();
                ctx.emit(Op::Alu {
                    op: AluOp::Add,
                    w: OpWidth::W64,
                    set_flags: false,
                    dst: ea,
                    a: base,
                    b: off,
                });
                (ea, None)
            }
        }
    };

    if load {
        let t = ctx.tmp();
        ctx.emit(Op::Load { width, signed, user: ctx.user, dst: t, addr });
        if signed && to32 {
            // Sign-extending load with a 32-bit destination clears
            // the upper half.
            ctx.emit(Op::Extend { kind: ExtendKind::Uxtw, dst: t, src: t });
        }
        if let Some(wb) = writeback {
            write_gp_sp(ctx, rn, wb);
        }
        write_gp(ctx, rt, t);
    } else {
        let v = read_gp(ctx, rt);
        ctx.emit(Op::Store { width, user: ctx.user, src: v, addr });
        if let Some(wb) = writeback {
            write_gp_sp(ctx, rn, wb);
        }
    }
}

fn disas_dp_reg(ctx: &mut BlockCtx<'_>, insn: u32) {
    if insn & (1 << 28) != 0 {
        let sub = (insn >> 21) & 0xf;
        if sub & 8 != 0 {
            disas_dp_3src(ctx, insn);
        } else {
            match sub {
                0 => disas_adc_sbc(ctx, insn),
                2 => disas_ccmp(ctx, insn),
                4 => disas_condsel(ctx, insn),
                6 => {
                    if insn & (1 << 30) != 0 {
                        disas_dp_1src(ctx, insn);
                    } else {
                        disas_dp_2src(ctx, insn);
                    }
                }
                _ => ctx.gen_undefined(),
            }
        }
    } else if insn & (1 << 24) != 0 {
        disas_addsub_reg(ctx, insn);
    } else {
        disas_logical_reg(ctx, insn);
    }
}

fn shifted_operand(ctx: &mut BlockCtx<'_>, insn: u32, sf: bool, allow_ror: bool) -> Option<Reg> {
    let rm = (insn >> 16) & 0x1f;
    let amount = (insn >> 10) & 0x3f;
    let width: u32 = if sf { 64 } else { 32 };
    if amount >= width {
        return None;
    }
    let kind = match (insn >> 22) & 3 {
        0 => crate::alu::ShiftKind::Lsl,
        1 => crate::alu::ShiftKind::Lsr,
        2 => crate::alu::ShiftKind::Asr,
        _ => {
            if !allow_ror {
                return None;
            }
            crate::alu::ShiftKind::Ror
        }
    };
    let v = read_gp(ctx, rm);
    if amount != 0 {
        ctx.emit(Op::Shift {
            kind,
            w: opw(sf),
            set_carry: false,
            dst: v,
            src: v,
            amount: ShiftAmount::Imm(amount as u8),
        });
    }
    Some(v)
}

fn disas_logical_reg(ctx: &mut BlockCtx<'_>, insn: u32) {
    let sf = insn & (1 << 31) != 0;
    let b = match shifted_operand(ctx, insn, sf, true) {
        Some(r) => r,
        None => {
            ctx.gen_undefined();
            return;
        }
    };
    let invert = insn & (1 << 21) != 0;
    let opc = (insn >> 29) & 3;
    let set_flags = opc == 3;
    let op = match (opc, invert) {
        (0, false) | (3, false) => AluOp::And,
        (0, true) | (3, true) => AluOp::Bic,
        (1, false) => AluOp::Orr,
        (1, true) => AluOp::Orn,
        (2, false) => AluOp::Eor,
        _ => AluOp::Eon,
    };
    let a = read_gp(ctx, (insn >> 5) & 0x1f);
    let t = ctx.tmp();
    ctx.emit(Op::Alu { op, w: opw(sf), set_flags, dst: t, a, b });
    if set_flags {
        clear_cv(ctx);
    }
    write_gp(ctx, insn & 0x1f, t);
}

fn disas_addsub_reg(ctx: &mut BlockCtx<'_>, insn: u32) {
    let sf = insn & (1 << 31) != 0;
    let set_flags = insn & (1 << 29) != 0;
    let op = if insn & (1 << 30) != 0 { AluOp::Sub } else { AluOp::Add };
    let rd = insn & 0x1f;
    let rn = (insn >> 5) & 0x1f;
    if insn & (1 << 21) != 0 && (insn >> 22) & 3 == 0 {
        // Extended register: the base may be the stack pointer.
        let option = (insn >> 13) & 7;
        let shift = (insn >> 10) & 7;
        if shift > 4 {
            ctx.gen_undefined();
            return;
        }
        let rm = (insn >> 16) & 0x1f;
        let mut b = read_gp(ctx, rm);
        let kind = match option {
            0 => Some(ExtendKind::Uxtb),
            1 => Some(ExtendKind::Uxth),
            2 => Some(ExtendKind::Uxtw),
            4 => Some(ExtendKind::Sxtb),
            5 => Some(ExtendKind::Sxth),
            6 => Some(ExtendKind::Sxtw),
            _ => None,
        };
        if let Some(kind) = kind {
            let t = ctx.tmp();
            ctx.emit(Op::Extend { kind, dst: t, src: b });
            b = t;
        }
        if shift != 0 {
            ctx.emit(Op::Shift {
                kind: crate::alu::ShiftKind::Lsl,
                w: opw(sf),
                set_carry: false,
                dst: b,
                src: b,
                amount: ShiftAmount::Imm(shift as u8),
            });
        }
        let a = read_gp_sp(ctx, rn);
        let t = ctx.tmp();
        ctx.emit(Op::Alu { op, w: opw(sf), set_flags, dst: t, a, b });
        if set_flags {
            write_gp(ctx, rd, t);
        } else {
            write_gp_sp(ctx, rd, t);
        }
    } else if insn & (1 << 21) == 0 {
        let b = match shifted_operand(ctx, insn, sf, false) {
            Some(r) => r,
            None => {
                ctx.gen_undefined();
                return;
            }
        };
        let a = read_gp(ctx, rn);
        let t = ctx.tmp();
        ctx.emit(Op::Alu { op, w: opw(sf), set_flags, dst: t, a, b });
        write_gp(ctx, rd, t);
    } else {
        ctx.gen_undefined();
    }
}

fn disas_adc_sbc(ctx: &mut BlockCtx<'_>, insn: u32) {
    if (insn >> 10) & 0x3f != 0 {
        ctx.gen_undefined();
        return;
    }
    let sf = insn & (1 << 31) != 0;
    let set_flags = insn & (1 << 29) != 0;
    let op = if insn & (1 << 30) != 0 { AluOp::Sbc } else { AluOp::Adc };
    let a = read_gp(ctx, (insn >> 5) & 0x1f);
    let b = read_gp(ctx, (insn >> 16) & 0x1f);
    let t = ctx.tmp();
    ctx.emit(Op::Alu { op, w: opw(sf), set_flags, dst: t, a, b });
    write_gp(ctx, insn & 0x1f, t);
}

fn disas_ccmp(ctx: &mut BlockCtx<'_>, insn: u32) {
    if insn & (1 << 29) == 0 || insn & (1 << 10) != 0 || insn & (1 << 4) != 0 {
        ctx.gen_undefined();
        return;
    }
    let sf = insn & (1 << 31) != 0;
    let op = if insn & (1 << 30) != 0 { AluOp::Sub } else { AluOp::Add };
    let cond = Cond::from_bits((insn >> 12) & 0xf);
    let nzcv = insn & 0xf;
    // On a passing condition the comparison runs; otherwise the
    // immediate flag value is installed.
    let fail = ctx.label();
    let done = ctx.label();
    ctx.emit(Op::CondSkip { cond, dest: fail });
    let a = read_gp(ctx, (insn >> 5) & 0x1f);
    let b = if insn & (1 << 11) != 0 {
        ctx.mov_imm(((insn >> 16) & 0x1f) as u64)
    } else {
        read_gp(ctx, (insn >> 16) & 0x1f)
    };
    ctx.emit(Op::Alu { op, w: opw(sf), set_flags: true, dst: DISCARD, a, b });
    ctx.emit(Op::CondSkip { cond: Cond::Nv, dest: done });
    ctx.emit(Op::Label(fail));
    let imm = ctx.mov_imm(nzcv << 28);
    ctx.emit(Op::WriteCpsr { src: imm, mask: 0xf000_0000 });
    ctx.emit(Op::Label(done));
}

fn disas_condsel(ctx: &mut BlockCtx<'_>, insn: u32) {
    if insn & (1 << 29) != 0 || (insn >> 11) & 1 != 0 {
        ctx.gen_undefined();
        return;
    }
    let sf = insn & (1 << 31) != 0;
    let cond = Cond::from_bits((insn >> 12) & 0xf);
    let negate = insn & (1 << 30) != 0;
    let increment = insn & (1 << 10) != 0;
    let rm = (insn >> 16) & 0x1f;
    let w = opw(sf);

    // Build the fail-path value first, then overwrite it on a passing
    // condition.
    let t = ctx.tmp();
    let m = read_gp(ctx, rm);
    match (negate, increment) {
        (false, false) => ctx.emit(Op::Mov { dst: t, src: m }),
        (false, true) => {
            let one = ctx.mov_imm(1u64);
            ctx.emit(Op::Alu { op: AluOp::Add, w, set_flags: false, dst: t, a: m, b: one });
        }
        (true, false) => {
            let zero = ctx.mov_imm(0u64);
            ctx.emit(Op::Alu { op: AluOp::Orn, w, set_flags: false, dst: t, a: zero, b: m });
        }
        (true, true) => {
            let zero = ctx.mov_imm(0u64);
            ctx.emit(Op::Alu { op: AluOp::Sub, w, set_flags: false, dst: t, a: zero, b: m });
        }
    }
    let skip = ctx.label();
    ctx.emit(Op::CondSkip { cond, dest: skip });
    let n = read_gp(ctx, (insn >> 5) & 0x1f);
    ctx.emit(Op::Mov { dst: t, src: n });
    ctx.emit(Op::Label(skip));
    write_gp(ctx, insn & 0x1f, t);
}

fn disas_dp_2src(ctx: &mut BlockCtx<'_>, insn: u32) {
    if insn & (1 << 29) != 0 {
        ctx.gen_undefined();
        return;
    }
    let sf = insn & (1 << 31) != 0;
    let opcode = (insn >> 10) & 0x3f;
    let rd = insn & 0x1f;
    let a = read_gp(ctx, (insn >> 5) & 0x1f);
    let b = read_gp(ctx, (insn >> 16) & 0x1f);
    let w = opw(sf);
    match opcode {
        2 | 3 => {
            let t = ctx.tmp();
            ctx.emit(Op::Div { signed: opcode == 3, w, dst: t, a, b });
            write_gp(ctx, rd, t);
        }
        8 | 9 | 10 | 11 => {
            // Variable shifts take the amount modulo the width.
            let kind = match opcode {
                8 => crate::alu::ShiftKind::Lsl,
                9 => crate::alu::ShiftKind::Lsr,
                10 => crate::alu::ShiftKind::Asr,
                _ => crate::alu::ShiftKind::Ror,
            };
            let mask = ctx.mov_imm(if sf { 63u64 } else { 31 });
            ctx.emit(Op::Alu { op: AluOp::And, w, set_flags: false, dst: b, a: b, b: mask });
            ctx.emit(Op::Shift { kind, w, set_carry: false, dst: a, src: a, amount: ShiftAmount::Reg(b) });
            write_gp(ctx, rd, a);
        }
        _ => ctx.gen_undefined(),
    }
}

fn disas_dp_1src(ctx: &mut BlockCtx<'_>, insn: u32) {
    if (insn >> 16) & 0x1f != 0 || insn & (1 << 29) != 0 {
        ctx.gen_undefined();
        return;
    }
    let sf = insn & (1 << 31) != 0;
    let rd = insn & 0x1f;
    let v = read_gp(ctx, (insn >> 5) & 0x1f);
    let t = ctx.tmp();
    match ((insn >> 10) & 0x3f, sf) {
        (4, _) => ctx.emit(Op::CountLeadingZeros { w: opw(sf), dst: t, src: v }),
        (1, _) => ctx.emit(Op::ByteReverse { kind: RevKind::Rev16, dst: t, src: v }),
        (2, false) => ctx.emit(Op::ByteReverse { kind: RevKind::Rev32, dst: t, src: v }),
        (3, true) => ctx.emit(Op::ByteReverse { kind: RevKind::Rev64, dst: t, src: v }),
        _ => {
            ctx.gen_undefined();
            return;
        }
    }
    write_gp(ctx, rd, t);
}

fn disas_dp_3src(ctx: &mut BlockCtx<'_>, insn: u32) {
    let sf = insn & (1 << 31) != 0;
    let op31 = (insn >> 21) & 7;
    let sub = insn & (1 << 15) != 0;
    let rd = insn & 0x1f;
    let ra = (insn >> 10) & 0x1f;
    let rn = (insn >> 5) & 0x1f;
    let rm = (insn >> 16) & 0x1f;
    match op31 {
        0 => {
            // Multiply with addend.
            let a = read_gp(ctx, rn);
            let b = read_gp(ctx, rm);
            let prod = ctx.tmp();
            ctx.emit(Op::Mul { w: opw(sf), set_flags: false, dst: prod, a, b });
            let acc = read_gp(ctx, ra);
            let t = ctx.tmp();
            let op = if sub { AluOp::Sub } else { AluOp::Add };
            ctx.emit(Op::Alu { op, w: opw(sf), set_flags: false, dst: t, a: acc, b: prod });
            write_gp(ctx, rd, t);
        }
        1 | 5 => {
            // Widening multiply with addend.
            if !sf {
                ctx.gen_undefined();
                return;
            }
            let kind = if op31 == 1 { ExtendKind::Sxtw } else { ExtendKind::Uxtw };
            let a = read_gp(ctx, rn);
            ctx.emit(Op::Extend { kind, dst: a, src: a });
            let b = read_gp(ctx, rm);
            ctx.emit(Op::Extend { kind, dst: b, src: b });
            let prod = ctx.tmp();
            ctx.emit(Op::Mul { w: OpWidth::W64, set_flags: false, dst: prod, a, b });
            let acc = read_gp(ctx, ra);
            let t = ctx.tmp();
            let op = if sub { AluOp::Sub } else { AluOp::Add };
            ctx.emit(Op::Alu { op, w: OpWidth::W64, set_flags: false, dst: t, a: acc, b: prod });
            write_gp(ctx, rd, t);
        }
        2 | 6 => {
            // High half of the full 128-bit product.
            if !sf || sub || ra != 0x1f {
                ctx.gen_undefined();
                return;
            }
            let a = read_gp(ctx, rn);
            let b = read_gp(ctx, rm);
            let hi = ctx.tmp();
            ctx.emit(Op::MulLong {
                signed: op31 == 2,
                accumulate: false,
                set_flags: false,
                dst_lo: DISCARD,
                dst_hi: hi,
                a,
                b,
            });
            write_gp(ctx, rd, hi);
        }
        _ => ctx.gen_undefined(),
    }
}
