// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Decoder for the compact 16-bit instruction set. Inside a
//! conditional-execution block each instruction is bracketed by a skip
//! on the block's current condition and stops setting flags; the
//! driver advances the conditional-execution field afterwards.
//!
//! The long branch-and-link forms are decoded as two independent
//! halfwords: the prefix deposits a partial link value, the suffix
//! completes the transfer. A pair that straddles a page boundary
//! therefore behaves exactly like the architecture's split execution.

use crate::alu::{decode_imm_shift, Cond, ShiftKind};
use crate::op::{
    AluOp, ExceptionCause, ExtendKind, MemWidth, Op, OpWidth, Reg, RevKind, ShiftAmount, DISCARD,
};

use super::BlockCtx;

const W: OpWidth = OpWidth::W32;

pub(crate) fn disas_insn(ctx: &mut BlockCtx<'_>) {
    let insn = match ctx.fetch16() {
        Ok(insn) => insn as u32,
        Err(fault) => {
            ctx.gen_exception(fault.addr, ExceptionCause::PrefetchAbort);
            return;
        }
    };
    let in_it = if let Some(cond) = ctx.it_cond() {
        if cond != Cond::Al {
            ctx.gen_condjmp(cond);
        }
        true
    } else {
        false
    };

    match insn >> 12 {
        0 | 1 => disas_shift_addsub(ctx, insn, in_it),
        2 | 3 => disas_imm8(ctx, insn, in_it),
        4 => {
            if insn & 0xf800 == 0x4800 {
                // Literal load: the base is the word-aligned fetch
                // address.
                let rd = (insn >> 8) & 7;
                let addr = ((ctx.pc + 2) & !3) + ((insn & 0xff) * 4) as u64;
                let a = ctx.mov_imm(addr);
                let t = ctx.tmp();
                ctx.emit(Op::Load {
                    width: MemWidth::Word,
                    signed: false,
                    user: ctx.user,
                    dst: t,
                    addr: a,
                });
                ctx.store_reg(rd, t);
            } else if insn & 0xfc00 == 0x4400 {
                disas_hireg(ctx, insn);
            } else {
                disas_dp_reg(ctx, insn, in_it);
            }
        }
        5 => disas_ldst_reg(ctx, insn),
        6 | 7 | 8 => disas_ldst_imm(ctx, insn),
        9 => disas_ldst_sp(ctx, insn),
        10 => disas_addr_gen(ctx, insn),
        11 => disas_misc(ctx, insn),
        12 => disas_block(ctx, insn),
        13 => disas_cond_branch(ctx, insn),
        14 => {
            if insn & (1 << 11) == 0 {
                // Unconditional branch.
                let offset = (((insn & 0x7ff) as i32) << 21) >> 20;
                ctx.gen_jmp(ctx.pc.wrapping_add(2).wrapping_add(offset as i64 as u64));
            } else {
                // BLX suffix: complete the link pair into the
                // fixed-width set.
                if insn & 1 != 0 {
                    ctx.gen_undefined();
                    return;
                }
                let t = ctx.load_reg(14);
                let off = ctx.mov_imm(((insn & 0x7ff) << 1) as u32);
                let dest = ctx.tmp();
                ctx.emit(Op::Alu { op: AluOp::Add, w: W, set_flags: false, dst: dest, a: t, b: off });
                let mask = ctx.mov_imm(3u32);
                ctx.emit(Op::Alu { op: AluOp::Bic, w: W, set_flags: false, dst: dest, a: dest, b: mask });
                let lr = ctx.mov_imm(ctx.pc as u32 | 1);
                ctx.store_reg(14, lr);
                ctx.gen_bx(dest);
            }
        }
        _ => {
            if insn & (1 << 11) == 0 {
                // BL prefix: deposit the high part of the link.
                let offset = ((((insn & 0x7ff) as i32) << 21) >> 21) << 12;
                let lr = ctx.mov_imm((ctx.pc as u32).wrapping_add(2).wrapping_add(offset as u32));
                ctx.store_reg(14, lr);
            } else {
                // BL suffix: branch and leave the return address, with
                // the compact-set bit kept in the target.
                let t = ctx.load_reg(14);
                let off = ctx.mov_imm((((insn & 0x7ff) << 1) | 1) as u32);
                let dest = ctx.tmp();
                ctx.emit(Op::Alu { op: AluOp::Add, w: W, set_flags: false, dst: dest, a: t, b: off });
                let lr = ctx.mov_imm(ctx.pc as u32 | 1);
                ctx.store_reg(14, lr);
                ctx.gen_bx(dest);
            }
        }
    }
}

/// Emit the N/Z update for a result that only produced a value.
fn gen_nz(ctx: &mut BlockCtx<'_>, v: Reg) {
    ctx.emit(Op::Alu { op: AluOp::Orr, w: W, set_flags: true, dst: v, a: v, b: v });
}

fn disas_shift_addsub(ctx: &mut BlockCtx<'_>, insn: u32, in_it: bool) {
    let rd = insn & 7;
    if insn & 0x1800 == 0x1800 {
        let a = ctx.load_reg((insn >> 3) & 7);
        let b = if insn & (1 << 10) != 0 {
            ctx.mov_imm((insn >> 6) & 7)
        } else {
            ctx.load_reg((insn >> 6) & 7)
        };
        let op = if insn & (1 << 9) != 0 { AluOp::Sub } else { AluOp::Add };
        let t = ctx.tmp();
        ctx.emit(Op::Alu { op, w: W, set_flags: !in_it, dst: t, a, b });
        ctx.store_reg(rd, t);
    } else {
        let (kind, amount) = decode_imm_shift((insn >> 11) & 3, (insn >> 6) & 0x1f);
        let v = ctx.load_reg((insn >> 3) & 7);
        if !(kind == ShiftKind::Lsl && amount == 0) {
            ctx.emit(Op::Shift {
                kind,
                w: W,
                set_carry: !in_it,
                dst: v,
                src: v,
                amount: ShiftAmount::Imm(amount as u8),
            });
        }
        if !in_it {
            gen_nz(ctx, v);
        }
        ctx.store_reg(rd, v);
    }
}

fn disas_imm8(ctx: &mut BlockCtx<'_>, insn: u32, in_it: bool) {
    let rd = (insn >> 8) & 7;
    let imm = ctx.mov_imm(insn & 0xff);
    match (insn >> 11) & 3 {
        0 => {
            if !in_it {
                gen_nz(ctx, imm);
            }
            ctx.store_reg(rd, imm);
        }
        1 => {
            let a = ctx.load_reg(rd);
            ctx.emit(Op::Alu { op: AluOp::Sub, w: W, set_flags: true, dst: DISCARD, a, b: imm });
        }
        op => {
            let a = ctx.load_reg(rd);
            let alu = if op == 2 { AluOp::Add } else { AluOp::Sub };
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: alu, w: W, set_flags: !in_it, dst: t, a, b: imm });
            ctx.store_reg(rd, t);
        }
    }
}

fn disas_hireg(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rd = (insn & 7) | ((insn >> 4) & 8);
    let rm = (insn >> 3) & 0xf;
    match (insn >> 8) & 3 {
        0 => {
            let a = ctx.load_reg(rd);
            let b = ctx.load_reg(rm);
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: AluOp::Add, w: W, set_flags: false, dst: t, a, b });
            ctx.store_reg(rd, t);
        }
        1 => {
            let a = ctx.load_reg(rd);
            let b = ctx.load_reg(rm);
            ctx.emit(Op::Alu { op: AluOp::Sub, w: W, set_flags: true, dst: DISCARD, a, b });
        }
        2 => {
            let v = ctx.load_reg(rm);
            ctx.store_reg(rd, v);
        }
        _ => {
            let target = ctx.load_reg(rm);
            if insn & (1 << 7) != 0 {
                // BLX: link past this halfword, staying compact.
                let lr = ctx.mov_imm(ctx.pc as u32 | 1);
                ctx.store_reg(14, lr);
            }
            ctx.gen_bx(target);
        }
    }
}

fn disas_dp_reg(ctx: &mut BlockCtx<'_>, insn: u32, in_it: bool) {
    let rd = insn & 7;
    let rm = (insn >> 3) & 7;
    let op = (insn >> 6) & 0xf;
    match op {
        // Register-amount shifts carry out into the flags.
        2 | 3 | 4 | 7 => {
            let kind = match op {
                2 => ShiftKind::Lsl,
                3 => ShiftKind::Lsr,
                4 => ShiftKind::Asr,
                _ => ShiftKind::Ror,
            };
            let v = ctx.load_reg(rd);
            let amount = ctx.load_reg(rm);
            ctx.emit(Op::Shift {
                kind,
                w: W,
                set_carry: !in_it,
                dst: v,
                src: v,
                amount: ShiftAmount::Reg(amount),
            });
            if !in_it {
                gen_nz(ctx, v);
            }
            ctx.store_reg(rd, v);
        }
        8 | 10 | 11 => {
            let a = ctx.load_reg(rd);
            let b = ctx.load_reg(rm);
            let alu = match op {
                8 => AluOp::And,
                10 => AluOp::Sub,
                _ => AluOp::Add,
            };
            ctx.emit(Op::Alu { op: alu, w: W, set_flags: true, dst: DISCARD, a, b });
        }
        9 => {
            // Negate.
            let zero = ctx.mov_imm(0u32);
            let b = ctx.load_reg(rm);
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: AluOp::Sub, w: W, set_flags: !in_it, dst: t, a: zero, b });
            ctx.store_reg(rd, t);
        }
        13 => {
            let a = ctx.load_reg(rd);
            let b = ctx.load_reg(rm);
            let t = ctx.tmp();
            ctx.emit(Op::Mul { w: W, set_flags: !in_it, dst: t, a, b });
            ctx.store_reg(rd, t);
        }
        15 => {
            let zero = ctx.mov_imm(0u32);
            let b = ctx.load_reg(rm);
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: AluOp::Orn, w: W, set_flags: !in_it, dst: t, a: zero, b });
            ctx.store_reg(rd, t);
        }
        _ => {
            let a = ctx.load_reg(rd);
            let b = ctx.load_reg(rm);
            let alu = match op {
                0 => AluOp::And,
                1 => AluOp::Eor,
                5 => AluOp::Adc,
                6 => AluOp::Sbc,
                12 => AluOp::Orr,
                _ => AluOp::Bic,
            };
            let t = ctx.tmp();
            ctx.emit(Op::Alu { op: alu, w: W, set_flags: !in_it, dst: t, a, b });
            ctx.store_reg(rd, t);
        }
    }
}

fn disas_ldst_reg(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rd = insn & 7;
    let base = ctx.load_reg((insn >> 3) & 7);
    let off = ctx.load_reg((insn >> 6) & 7);
    let addr = ctx.tmp();
    ctx.emit(Op::Alu { op: AluOp::Add, w: W, set_flags: false, dst: addr, a: base, b: off });
    let user = ctx.user;
    match (insn >> 9) & 7 {
        0 => gen_store(ctx, rd, MemWidth::Word, addr),
        1 => gen_store(ctx, rd, MemWidth::Half, addr),
        2 => gen_store(ctx, rd, MemWidth::Byte, addr),
        3 => gen_load(ctx, rd, MemWidth::Byte, true, user, addr),
        4 => gen_load(ctx, rd, MemWidth::Word, false, user, addr),
        5 => gen_load(ctx, rd, MemWidth::Half, false, user, addr),
        6 => gen_load(ctx, rd, MemWidth::Byte, false, user, addr),
        _ => gen_load(ctx, rd, MemWidth::Half, true, user, addr),
    }
}

fn gen_load(ctx: &mut BlockCtx<'_>, rd: u32, width: MemWidth, signed: bool, user: bool, addr: Reg) {
    let t = ctx.tmp();
    ctx.emit(Op::Load { width, signed, user, dst: t, addr });
    ctx.store_reg(rd, t);
}

fn gen_store(ctx: &mut BlockCtx<'_>, rd: u32, width: MemWidth, addr: Reg) {
    let v = ctx.load_reg(rd);
    ctx.emit(Op::Store { width, user: ctx.user, src: v, addr });
}

fn disas_ldst_imm(ctx: &mut BlockCtx<'_>, insn: u32) {
    let (width, scale) = match insn >> 12 {
        6 => (MemWidth::Word, 4),
        7 => (MemWidth::Byte, 1),
        _ => (MemWidth::Half, 2),
    };
    let rd = insn & 7;
    let base = ctx.load_reg((insn >> 3) & 7);
    let addr = ctx.add_imm(base, (((insn >> 6) & 0x1f) * scale) as i32);
    if insn & (1 << 11) != 0 {
        gen_load(ctx, rd, width, false, ctx.user, addr);
    } else {
        gen_store(ctx, rd, width, addr);
    }
}

fn disas_ldst_sp(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rd = (insn >> 8) & 7;
    let base = ctx.load_reg(13);
    let addr = ctx.add_imm(base, ((insn & 0xff) * 4) as i32);
    if insn & (1 << 11) != 0 {
        gen_load(ctx, rd, MemWidth::Word, false, ctx.user, addr);
    } else {
        gen_store(ctx, rd, MemWidth::Word, addr);
    }
}

/// Address generation: stack or aligned fetch address plus immediate.
fn disas_addr_gen(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rd = (insn >> 8) & 7;
    let imm = ((insn & 0xff) * 4) as i32;
    if insn & (1 << 11) != 0 {
        let sp = ctx.load_reg(13);
        let t = ctx.add_imm(sp, imm);
        ctx.store_reg(rd, t);
    } else {
        let t = ctx.mov_imm((((ctx.pc + 2) & !3) as u32).wrapping_add(imm as u32));
        ctx.store_reg(rd, t);
    }
}

fn disas_misc(ctx: &mut BlockCtx<'_>, insn: u32) {
    if insn & 0xff00 == 0xb000 {
        // Stack adjustment.
        let imm = ((insn & 0x7f) * 4) as i32;
        let sp = ctx.load_reg(13);
        let t = ctx.add_imm(sp, if insn & (1 << 7) != 0 { -imm } else { imm });
        ctx.store_reg(13, t);
    } else if insn & 0xf600 == 0xb400 {
        disas_push_pop(ctx, insn);
    } else if insn & 0xf500 == 0xb100 {
        // Compare-and-branch never executes conditionally.
        let taken_if_zero = insn & (1 << 11) == 0;
        let offset = (((insn >> 3) & 0x1f) << 1 | ((insn >> 9) & 1) << 6) as u64;
        let v = ctx.load_reg(insn & 7);
        let skip = ctx.label();
        ctx.emit(Op::BranchZero { src: v, if_zero: !taken_if_zero, dest: skip });
        ctx.condjmp = Some(skip);
        ctx.gen_jmp(ctx.pc + 2 + offset);
    } else if insn & 0xff00 == 0xb200 {
        let kind = match (insn >> 6) & 3 {
            0 => ExtendKind::Sxth,
            1 => ExtendKind::Sxtb,
            2 => ExtendKind::Uxth,
            _ => ExtendKind::Uxtb,
        };
        let v = ctx.load_reg((insn >> 3) & 7);
        let t = ctx.tmp();
        ctx.emit(Op::Extend { kind, dst: t, src: v });
        ctx.store_reg(insn & 7, t);
    } else if insn & 0xff00 == 0xba00 {
        let kind = match (insn >> 6) & 3 {
            0 => RevKind::Rev32,
            1 => RevKind::Rev16,
            3 => RevKind::Revsh,
            _ => {
                ctx.gen_undefined();
                return;
            }
        };
        let v = ctx.load_reg((insn >> 3) & 7);
        let t = ctx.tmp();
        ctx.emit(Op::ByteReverse { kind, dst: t, src: v });
        ctx.store_reg(insn & 7, t);
    } else if insn & 0xff00 == 0xbe00 {
        ctx.gen_exception(ctx.insn_start, ExceptionCause::Breakpoint);
    } else if insn & 0xff00 == 0xbf00 {
        if insn & 0xf != 0 {
            // Open a conditional-execution block; the driver applies
            // and advances the state from here on.
            ctx.itstate = (insn & 0xff) as u8;
            ctx.it_insn = true;
        }
        // Zero mask: hint space, no effect.
    } else if insn & 0xffe8 == 0xb660 {
        // Interrupt-mask changes are not modeled.
    } else {
        ctx.gen_undefined();
    }
}

fn disas_push_pop(ctx: &mut BlockCtx<'_>, insn: u32) {
    let pop = insn & (1 << 11) != 0;
    let list = insn & 0xff;
    let extra = insn & (1 << 8) != 0;
    let count = list.count_ones() + extra as u32;
    if count == 0 {
        ctx.gen_undefined();
        return;
    }
    // Walk the transfer with one in-place address register so the
    // scratch bank stays bounded.
    let step = ctx.mov_imm(4u32);
    let data = ctx.tmp();
    let bump = |ctx: &mut BlockCtx<'_>, addr: Reg| {
        ctx.emit(Op::Alu { op: AluOp::Add, w: W, set_flags: false, dst: addr, a: addr, b: step });
    };
    if pop {
        let addr = ctx.load_reg(13);
        let mut first = true;
        let mut pc_value: Option<Reg> = None;
        for i in 0..8u32 {
            if list & (1 << i) == 0 {
                continue;
            }
            if !first {
                bump(ctx, addr);
            }
            first = false;
            ctx.emit(Op::Load { width: MemWidth::Word, signed: false, user: ctx.user, dst: data, addr });
            ctx.store_reg(i, data);
        }
        if extra {
            if !first {
                bump(ctx, addr);
            }
            let held = ctx.tmp();
            ctx.emit(Op::Load { width: MemWidth::Word, signed: false, user: ctx.user, dst: held, addr });
            pc_value = Some(held);
        }
        let wb = ctx.add_imm(addr, 4);
        ctx.store_reg(13, wb);
        if let Some(t) = pc_value {
            // Popping the program counter interworks.
            ctx.gen_bx(t);
        }
    } else {
        let sp = ctx.load_reg(13);
        let addr = ctx.add_imm(sp, -((count * 4) as i32));
        let mut first = true;
        for i in 0..8u32 {
            if list & (1 << i) == 0 {
                continue;
            }
            if !first {
                bump(ctx, addr);
            }
            first = false;
            ctx.emit(Op::Mov { dst: data, src: Reg::Arch(i as u8) });
            ctx.emit(Op::Store { width: MemWidth::Word, user: ctx.user, src: data, addr });
        }
        if extra {
            if !first {
                bump(ctx, addr);
            }
            ctx.emit(Op::Mov { dst: data, src: Reg::Arch(14) });
            ctx.emit(Op::Store { width: MemWidth::Word, user: ctx.user, src: data, addr });
        }
        // Recover the lowest address from the final one.
        let wb = ctx.add_imm(addr, -4 * (count as i32 - 1));
        ctx.store_reg(13, wb);
    }
}

fn disas_block(ctx: &mut BlockCtx<'_>, insn: u32) {
    let rn = (insn >> 8) & 7;
    let list = insn & 0xff;
    let load = insn & (1 << 11) != 0;
    if list == 0 {
        ctx.gen_undefined();
        return;
    }
    let addr = ctx.load_reg(rn);
    let step = ctx.mov_imm(4u32);
    let data = ctx.tmp();
    let mut first = true;
    let mut loaded_base: Option<Reg> = None;
    for i in 0..8u32 {
        if list & (1 << i) == 0 {
            continue;
        }
        if !first {
            ctx.emit(Op::Alu { op: AluOp::Add, w: W, set_flags: false, dst: addr, a: addr, b: step });
        }
        first = false;
        if load {
            let dst = if i == rn {
                let held = ctx.tmp();
                loaded_base = Some(held);
                held
            } else {
                data
            };
            ctx.emit(Op::Load { width: MemWidth::Word, signed: false, user: ctx.user, dst, addr });
            if i != rn {
                ctx.store_reg(i, dst);
            }
        } else {
            ctx.emit(Op::Mov { dst: data, src: Reg::Arch(i as u8) });
            ctx.emit(Op::Store { width: MemWidth::Word, user: ctx.user, src: data, addr });
        }
    }
    if let Some(t) = loaded_base {
        // The loaded value overrides writeback.
        ctx.store_reg(rn, t);
    } else {
        let wb = ctx.add_imm(addr, 4);
        ctx.store_reg(rn, wb);
    }
}

fn disas_cond_branch(ctx: &mut BlockCtx<'_>, insn: u32) {
    let cond = (insn >> 8) & 0xf;
    match cond {
        0xf => {
            // Service call returns to the following instruction.
            ctx.gen_exception(ctx.pc, ExceptionCause::SoftwareInterrupt);
        }
        0xe => ctx.gen_undefined(),
        _ => {
            ctx.gen_condjmp(Cond::from_bits(cond));
            let offset = (((insn & 0xff) as i32) << 24) >> 23;
            ctx.gen_jmp(ctx.pc.wrapping_add(2).wrapping_add(offset as i64 as u64));
        }
    }
}
