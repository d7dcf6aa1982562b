// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Test-only reference evaluator for translated blocks. Walks the
//! operation stream against a [`CpuState`] and a [`FlatMemory`] so the
//! decoder tests can assert on architectural outcomes instead of op
//! shapes.

use std::collections::HashMap;

use parking_lot::MutexGuard;

use crate::alu::{self, ShiftKind};
use crate::lanes::{self, LaneWidth};
use crate::memory::{atomic_section, FlatMemory, MemoryAccess};
use crate::op::{
    AluOp, ExceptionCause, ExtendKind, FloatBinKind, FloatUnKind, Op, OpWidth, PermKind, Reg,
    RevKind, ShiftAmount, TranslationBlock, VecBinKind, VecUnKind, NUM_TEMPS,
};
use crate::state::{CpuState, ExecMode};
use armature_common::VAddr;

/// How a block's execution finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Reached a direct-linked exit; the program counter was set to
    /// the link target.
    Linked { slot: u8, dest: VAddr },
    /// Reached the dynamic exit; the program counter was set earlier
    /// in the stream.
    Dynamic,
    /// Raised an exception.
    Raised(ExceptionCause),
}

struct Exec<'a> {
    state: &'a mut CpuState,
    mem: &'a mut FlatMemory,
    wide: bool,
    tmps: [u64; NUM_TEMPS as usize],
    atomic: Option<MutexGuard<'static, ()>>,
}

impl Exec<'_> {
    fn read(&self, r: Reg) -> u64 {
        match r {
            Reg::Tmp(i) => self.tmps[i as usize],
            Reg::Arch(i) if self.wide => self.state.xreg(i as u32),
            Reg::Arch(i) => self.state.reg(i as u32) as u64,
        }
    }

    fn write(&mut self, r: Reg, value: u64) {
        match r {
            Reg::Tmp(i) => self.tmps[i as usize] = value,
            Reg::Arch(i) if self.wide => self.state.set_xreg(i as u32, value),
            Reg::Arch(i) => self.state.set_reg(i as u32, value as u32),
        }
    }

    fn data_addr(&self, r: Reg) -> VAddr {
        let v = self.read(r);
        if self.wide {
            v
        } else {
            v as u32 as VAddr
        }
    }

    fn shift_amount(&self, amount: ShiftAmount) -> u32 {
        match amount {
            ShiftAmount::Imm(n) => n as u32,
            ShiftAmount::Reg(r) => self.read(r) as u32,
        }
    }
}

/// Run one block to its exit. Data aborts are not modeled at this
/// level; a faulting access panics the test.
pub fn exec_block(state: &mut CpuState, mem: &mut FlatMemory, block: &TranslationBlock) -> Outcome {
    let mut labels: HashMap<u32, usize> = HashMap::new();
    for (i, op) in block.ops.iter().enumerate() {
        if let Op::Label(l) = op {
            labels.insert(l.0, i);
        }
    }

    // The incoming conditional-execution state is consumed by decode;
    // a SetCondexec in the stream re-commits any remainder.
    state.condexec = 0;

    let mut e = Exec {
        state,
        mem,
        wide: block.exec == ExecMode::A64,
        tmps: [0; NUM_TEMPS as usize],
        atomic: None,
    };

    let mut ip = 0usize;
    while ip < block.ops.len() {
        let op = block.ops[ip];
        ip += 1;
        match op {
            Op::MovImm { dst, value } => e.write(dst, value),
            Op::Mov { dst, src } => {
                let v = e.read(src);
                e.write(dst, v);
            }
            Op::Alu { op, w, set_flags, dst, a, b } => {
                exec_alu(&mut e, op, w, set_flags, dst, a, b);
            }
            Op::Shift { kind, w, set_carry, dst, src, amount } => {
                let val = e.read(src);
                let amt = e.shift_amount(amount);
                match w {
                    OpWidth::W32 => {
                        let cin = e.state.flags.c;
                        let (res, cout) = match amount {
                            ShiftAmount::Imm(_) => alu::shift_imm(kind, val as u32, amt, cin),
                            ShiftAmount::Reg(_) => alu::shift_reg(kind, val as u32, amt, cin),
                        };
                        if set_carry {
                            e.state.flags.c = cout;
                        }
                        e.write(dst, res as u64);
                    }
                    OpWidth::W64 => {
                        let amt = amt & 63;
                        let res = match kind {
                            ShiftKind::Lsl => val << amt,
                            ShiftKind::Lsr => val >> amt,
                            ShiftKind::Asr => ((val as i64) >> amt) as u64,
                            ShiftKind::Ror => val.rotate_right(amt),
                            ShiftKind::Rrx => (val >> 1) | ((e.state.flags.c as u64) << 63),
                        };
                        e.write(dst, res);
                    }
                }
            }
            Op::Extend { kind, dst, src } => {
                let v = e.read(src);
                let r = match kind {
                    ExtendKind::Sxtb => v as u8 as i8 as i64 as u64,
                    ExtendKind::Sxth => v as u16 as i16 as i64 as u64,
                    ExtendKind::Sxtw => v as u32 as i32 as i64 as u64,
                    ExtendKind::Uxtb => v & 0xff,
                    ExtendKind::Uxth => v & 0xffff,
                    ExtendKind::Uxtw => v & 0xffff_ffff,
                };
                e.write(dst, r);
            }
            Op::CountLeadingZeros { w, dst, src } => {
                let v = e.read(src);
                let r = match w {
                    OpWidth::W32 => (v as u32).leading_zeros() as u64,
                    OpWidth::W64 => v.leading_zeros() as u64,
                };
                e.write(dst, r);
            }
            Op::ByteReverse { kind, dst, src } => {
                let v = e.read(src);
                let r = match kind {
                    RevKind::Rev32 => {
                        ((v as u32).swap_bytes() as u64)
                            | (((v >> 32) as u32).swap_bytes() as u64) << 32
                    }
                    RevKind::Rev16 => {
                        ((v & 0x00ff_00ff_00ff_00ff) << 8) | ((v >> 8) & 0x00ff_00ff_00ff_00ff)
                    }
                    RevKind::Revsh => (v as u16).swap_bytes() as i16 as i32 as u32 as u64,
                    RevKind::Rev64 => v.swap_bytes(),
                };
                e.write(dst, r);
            }
            Op::Mul { w, set_flags, dst, a, b } => {
                let (av, bv) = (e.read(a), e.read(b));
                let r = match w {
                    OpWidth::W32 => (av as u32).wrapping_mul(bv as u32) as u64,
                    OpWidth::W64 => av.wrapping_mul(bv),
                };
                e.write(dst, r);
                if set_flags {
                    match w {
                        OpWidth::W32 => e.state.flags.set_nz32(r as u32),
                        OpWidth::W64 => e.state.flags.set_nz64(r),
                    }
                }
            }
            Op::MulLong { signed, accumulate, set_flags, dst_lo, dst_hi, a, b } => {
                exec_mul_long(&mut e, signed, accumulate, set_flags, dst_lo, dst_hi, a, b);
            }
            Op::MulDual { swap, dst_a, dst_b, a, b } => {
                let (av, bv) = (e.read(a) as u32, e.read(b) as u32);
                let al = av as u16 as i16 as i32;
                let ah = (av >> 16) as u16 as i16 as i32;
                let (bl, bh) = {
                    let lo = bv as u16 as i16 as i32;
                    let hi = (bv >> 16) as u16 as i16 as i32;
                    if swap {
                        (hi, lo)
                    } else {
                        (lo, hi)
                    }
                };
                e.write(dst_a, al.wrapping_mul(bl) as u32 as u64);
                e.write(dst_b, ah.wrapping_mul(bh) as u32 as u64);
            }
            Op::AddSetQ { dst, a, b } => {
                let (r, q) = alu::add_setq(e.read(a) as u32, e.read(b) as u32);
                e.write(dst, r as u64);
                e.state.flags.q |= q;
            }
            Op::SatAdd { double, dst, a, b } => {
                let (av, bv) = (e.read(a) as u32 as i32, e.read(b) as u32 as i32);
                let (r, q) = if double {
                    lanes::sat_double_add(av, bv)
                } else {
                    lanes::sat_add(av, bv)
                };
                e.write(dst, r as u32 as u64);
                e.state.flags.q |= q;
            }
            Op::SatSub { double, dst, a, b } => {
                let (av, bv) = (e.read(a) as u32 as i32, e.read(b) as u32 as i32);
                let (r, q) = if double {
                    lanes::sat_double_sub(av, bv)
                } else {
                    lanes::sat_sub(av, bv)
                };
                e.write(dst, r as u32 as u64);
                e.state.flags.q |= q;
            }
            Op::Div { signed, w, dst, a, b } => {
                let (av, bv) = (e.read(a), e.read(b));
                let r = match (w, signed) {
                    // Division by zero yields zero; the signed overflow
                    // case wraps to the minimum.
                    (OpWidth::W32, false) => {
                        let b = bv as u32;
                        if b == 0 { 0 } else { (av as u32 / b) as u64 }
                    }
                    (OpWidth::W32, true) => {
                        let (a, b) = (av as u32 as i32, bv as u32 as i32);
                        if b == 0 { 0 } else { a.wrapping_div(b) as u32 as u64 }
                    }
                    (OpWidth::W64, false) => {
                        if bv == 0 { 0 } else { av / bv }
                    }
                    (OpWidth::W64, true) => {
                        let (a, b) = (av as i64, bv as i64);
                        if b == 0 { 0 } else { a.wrapping_div(b) as u64 }
                    }
                };
                e.write(dst, r);
            }
            Op::Load { width, signed, user: _, dst, addr } => {
                let a = e.data_addr(addr);
                let bytes = width.bytes();
                let raw = e
                    .mem
                    .read_scalar(a, bytes, e.state.big_endian)
                    .unwrap_or_else(|f| panic!("unmodeled data fault: {f}"));
                let v = if signed {
                    let shift = 64 - bytes * 8;
                    ((raw << shift) as i64 >> shift) as u64
                } else {
                    raw
                };
                e.write(dst, v);
            }
            Op::Store { width, user: _, src, addr } => {
                let a = e.data_addr(addr);
                let v = e.read(src);
                e.mem
                    .write_scalar(a, width.bytes(), e.state.big_endian, v)
                    .unwrap_or_else(|f| panic!("unmodeled data fault: {f}"));
            }
            Op::AtomicBegin => e.atomic = Some(atomic_section()),
            Op::AtomicEnd => e.atomic = None,
            Op::ReadCpsr { dst } => {
                let v = e.state.cpsr() as u64;
                e.write(dst, v);
            }
            Op::WriteCpsr { src, mask } => {
                let v = e.read(src) as u32;
                e.state.set_cpsr(v, mask);
            }
            Op::ReadSpsr { dst } => {
                let v = e.state.spsr as u64;
                e.write(dst, v);
            }
            Op::WriteSpsr { src, mask } => {
                let v = e.read(src) as u32;
                e.state.spsr = (e.state.spsr & !mask) | (v & mask);
            }
            Op::RestoreCpsrFromSpsr => {
                let spsr = e.state.spsr;
                e.state.set_cpsr(spsr, 0xffff_ffff);
            }
            Op::ReadUserReg { dst, reg } => {
                let v = e.state.user_reg(reg as u32) as u64;
                e.write(dst, v);
            }
            Op::WriteUserReg { reg, src } => {
                let v = e.read(src) as u32;
                e.state.set_user_reg(reg as u32, v);
            }
            Op::SetCondexec { bits } => e.state.condexec = bits as u8,
            // No system register file is modeled here; reads produce
            // zero and writes vanish.
            Op::CpRead { dst, .. } => e.write(dst, 0),
            Op::CpWrite { .. } => {}
            Op::Label(_) => {}
            Op::CondSkip { cond, dest } => {
                if !cond.passed(&e.state.flags) {
                    ip = labels[&dest.0];
                }
            }
            Op::BranchZero { src, if_zero, dest } => {
                if (e.read(src) == 0) == if_zero {
                    ip = labels[&dest.0];
                }
            }
            Op::SetPc { value } => e.state.set_pc(value),
            Op::Bx { src } => {
                let v = e.read(src);
                if e.wide {
                    e.state.set_pc(v);
                } else if v & 1 != 0 {
                    e.state.exec = ExecMode::Thumb;
                    e.state.set_pc(v & !1);
                } else {
                    e.state.exec = ExecMode::Arm;
                    e.state.set_pc(v & !3);
                }
            }
            Op::Exception { cause } => return Outcome::Raised(cause),
            Op::GotoBlock { slot, dest } => {
                e.state.set_pc(dest);
                return Outcome::Linked { slot, dest };
            }
            Op::ExitDynamic => return Outcome::Dynamic,
            Op::VecMovImm { dst, q, value } => {
                e.state.set_dreg(dst as u32, value);
                if q {
                    e.state.set_dreg(dst as u32 + 1, value);
                }
            }
            Op::VecBin { kind, width, signed, q, dst, a, b } => {
                exec_vec_bin(&mut e, kind, width, signed, q, dst, a, b);
            }
            Op::VecUn { kind, width, signed, q, dst, src } => {
                exec_vec_un(&mut e, kind, width, signed, q, dst, src);
            }
            Op::VecPerm { kind, width, q, a, b } => exec_vec_perm(&mut e, kind, width, q, a, b),
            Op::VecDupGp { width, q, dst, src } => {
                let bits = width.bits();
                let mask = lane_mask(bits);
                let mut r = 0u64;
                for i in 0..(64 / bits) {
                    r |= (e.read(src) & mask) << (i * bits);
                }
                e.state.set_dreg(dst as u32, r);
                if q {
                    e.state.set_dreg(dst as u32 + 1, r);
                }
            }
            Op::FloatBin { kind, double, len, stride, dst, a, b } => {
                exec_float_bin(&mut e, kind, double, len, stride, dst, a, b);
            }
            Op::FloatUn { kind, double, len, stride, dst, src } => {
                exec_float_un(&mut e, kind, double, len, stride, dst, src);
            }
            Op::FloatCmp { double, signaling, a, b } => {
                let (rel, invalid) = if double {
                    let (x, y) = (
                        f64::from_bits(e.state.dreg(a as u32)),
                        f64::from_bits(e.state.dreg(b as u32)),
                    );
                    lanes::cmp_f64(x, y, signaling)
                } else {
                    let (x, y) = (
                        f32::from_bits(e.state.sreg(a as u32)),
                        f32::from_bits(e.state.sreg(b as u32)),
                    );
                    lanes::cmp_f32(x, y, signaling)
                };
                set_fpscr_rel(e.state, rel, invalid);
            }
            Op::FloatCmpZero { double, signaling, a } => {
                let (rel, invalid) = if double {
                    lanes::cmp_f64(f64::from_bits(e.state.dreg(a as u32)), 0.0, signaling)
                } else {
                    lanes::cmp_f32(f32::from_bits(e.state.sreg(a as u32)), 0.0, signaling)
                };
                set_fpscr_rel(e.state, rel, invalid);
            }
            Op::VfpStatusToFlags => {
                e.state.flags.n = e.state.fpscr.n;
                e.state.flags.z = e.state.fpscr.z;
                e.state.flags.c = e.state.fpscr.c;
                e.state.flags.v = e.state.fpscr.v;
            }
            Op::FloatToGp { dst, src } => {
                let v = e.state.sreg(src as u32) as u64;
                e.write(dst, v);
            }
            Op::GpToFloat { dst, src } => {
                let v = e.read(src) as u32;
                e.state.set_sreg(dst as u32, v);
            }
            Op::FloatLoad { double, dst, addr } => {
                let a = e.data_addr(addr);
                let bytes = if double { 8 } else { 4 };
                let v = e
                    .mem
                    .read_scalar(a, bytes, e.state.big_endian)
                    .unwrap_or_else(|f| panic!("unmodeled data fault: {f}"));
                if double {
                    e.state.set_dreg(dst as u32, v);
                } else {
                    e.state.set_sreg(dst as u32, v as u32);
                }
            }
            Op::FloatStore { double, src, addr } => {
                let a = e.data_addr(addr);
                let (bytes, v) = if double {
                    (8, e.state.dreg(src as u32))
                } else {
                    (4, e.state.sreg(src as u32) as u64)
                };
                e.mem
                    .write_scalar(a, bytes, e.state.big_endian, v)
                    .unwrap_or_else(|f| panic!("unmodeled data fault: {f}"));
            }
            Op::ReadFpscr { dst } => {
                let v = e.state.fpscr.word() as u64;
                e.write(dst, v);
            }
            Op::WriteFpscr { src } => {
                let v = e.read(src) as u32;
                e.state.fpscr.set_word(v);
            }
        }
    }
    panic!("block ran off the end of its op stream");
}

fn exec_alu(e: &mut Exec<'_>, op: AluOp, w: OpWidth, set_flags: bool, dst: Reg, a: Reg, b: Reg) {
    let (av, bv) = (e.read(a), e.read(b));
    let cin = e.state.flags.c;
    if op.is_logical() {
        let r = match op {
            AluOp::And => av & bv,
            AluOp::Bic => av & !bv,
            AluOp::Orr => av | bv,
            AluOp::Orn => av | !bv,
            AluOp::Eor => av ^ bv,
            AluOp::Eon => av ^ !bv,
            _ => unreachable!(),
        };
        match w {
            OpWidth::W32 => {
                let r = r as u32;
                e.write(dst, r as u64);
                if set_flags {
                    e.state.flags.set_nz32(r);
                }
            }
            OpWidth::W64 => {
                e.write(dst, r);
                if set_flags {
                    e.state.flags.set_nz64(r);
                }
            }
        }
    } else {
        match w {
            OpWidth::W32 => {
                let (a32, b32) = (av as u32, bv as u32);
                let (r, f) = match op {
                    AluOp::Add => alu::adc_flags32(a32, b32, false),
                    AluOp::Adc => alu::adc_flags32(a32, b32, cin),
                    AluOp::Sub => alu::sbc_flags32(a32, b32, true),
                    AluOp::Sbc => alu::sbc_flags32(a32, b32, cin),
                    _ => unreachable!(),
                };
                e.write(dst, r as u64);
                if set_flags {
                    e.state.flags.n = f.n;
                    e.state.flags.z = f.z;
                    e.state.flags.c = f.c;
                    e.state.flags.v = f.v;
                }
            }
            OpWidth::W64 => {
                let (r, f) = match op {
                    AluOp::Add => alu::adc_flags64(av, bv, false),
                    AluOp::Adc => alu::adc_flags64(av, bv, cin),
                    AluOp::Sub => alu::sbc_flags64(av, bv, true),
                    AluOp::Sbc => alu::sbc_flags64(av, bv, cin),
                    _ => unreachable!(),
                };
                e.write(dst, r);
                if set_flags {
                    e.state.flags.n = f.n;
                    e.state.flags.z = f.z;
                    e.state.flags.c = f.c;
                    e.state.flags.v = f.v;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn exec_mul_long(
    e: &mut Exec<'_>,
    signed: bool,
    accumulate: bool,
    set_flags: bool,
    dst_lo: Reg,
    dst_hi: Reg,
    a: Reg,
    b: Reg,
) {
    let (av, bv) = (e.read(a), e.read(b));
    if e.wide {
        let p: i128 = if signed {
            (av as i64 as i128) * (bv as i64 as i128)
        } else {
            (av as u128 * bv as u128) as i128
        };
        e.write(dst_lo, p as u64);
        e.write(dst_hi, (p >> 64) as u64);
    } else {
        // Operands are 32-bit register values; the accumulate forms
        // preload the destination temps with the running pair.
        let p: u64 = if signed {
            ((av as u32 as i32 as i64) * (bv as u32 as i32 as i64)) as u64
        } else {
            (av as u32 as u64) * (bv as u32 as u64)
        };
        let mut v = p;
        if accumulate {
            let acc = ((e.read(dst_hi) as u32 as u64) << 32) | e.read(dst_lo) as u32 as u64;
            v = v.wrapping_add(acc);
        }
        e.write(dst_lo, v as u32 as u64);
        e.write(dst_hi, (v >> 32) as u64);
        if set_flags {
            e.state.flags.set_nz64(v);
        }
    }
}

#[inline]
fn lane_mask(bits: u32) -> u64 {
    if bits == 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn lane_get(raw: u64, bits: u32, idx: u32, signed: bool) -> i128 {
    let v = (raw >> (idx * bits)) & lane_mask(bits);
    if signed {
        let shift = 64 - bits;
        (((v << shift) as i64) >> shift) as i128
    } else {
        v as i128
    }
}

fn lane_put(out: &mut u64, bits: u32, idx: u32, v: i128) {
    *out |= ((v as u64) & lane_mask(bits)) << (idx * bits);
}

fn lane_clamp(v: i128, bits: u32, signed: bool) -> (i128, bool) {
    let (min, max) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if v < min {
        (min, true)
    } else if v > max {
        (max, true)
    } else {
        (v, false)
    }
}

/// Per-lane shift with the vector boundary rules, dispatched to the
/// generic lane helpers by width and signedness.
fn lane_shift(kind: VecBinKind, width: LaneWidth, signed: bool, raw: u64, s: i8) -> (u64, bool) {
    fn go<T: lanes::Lane>(kind: VecBinKind, v: T, s: i8) -> (T, bool) {
        match kind {
            VecBinKind::Shl => (lanes::vshl(v, s), false),
            VecBinKind::Rshl => (lanes::vrshl(v, s), false),
            VecBinKind::QShl => lanes::vqshl(v, s),
            VecBinKind::QRshl => lanes::vqrshl(v, s),
            _ => unreachable!(),
        }
    }
    match (width, signed) {
        (LaneWidth::W8, true) => {
            let (r, q) = go(kind, raw as u8 as i8, s);
            (r as u8 as u64, q)
        }
        (LaneWidth::W8, false) => {
            let (r, q) = go(kind, raw as u8, s);
            (r as u64, q)
        }
        (LaneWidth::W16, true) => {
            let (r, q) = go(kind, raw as u16 as i16, s);
            (r as u16 as u64, q)
        }
        (LaneWidth::W16, false) => {
            let (r, q) = go(kind, raw as u16, s);
            (r as u64, q)
        }
        (LaneWidth::W32, true) => {
            let (r, q) = go(kind, raw as u32 as i32, s);
            (r as u32 as u64, q)
        }
        (LaneWidth::W32, false) => {
            let (r, q) = go(kind, raw as u32, s);
            (r as u64, q)
        }
        (LaneWidth::W64, true) => {
            let (r, q) = go(kind, raw as i64, s);
            (r as u64, q)
        }
        (LaneWidth::W64, false) => go(kind, raw, s),
    }
}

#[allow(clippy::too_many_arguments)]
fn exec_vec_bin(
    e: &mut Exec<'_>,
    kind: VecBinKind,
    width: LaneWidth,
    signed: bool,
    q: bool,
    dst: u8,
    a: u8,
    b: u8,
) {
    if kind == VecBinKind::Mull {
        // Widening: one source register pair's worth of double-width
        // lanes lands in the destination pair.
        let bits = width.bits();
        let dbits = bits * 2;
        let (av, bv) = (e.state.dreg(a as u32), e.state.dreg(b as u32));
        let mut out = [0u64; 2];
        for i in 0..(64 / bits) {
            let p = lane_get(av, bits, i, signed) * lane_get(bv, bits, i, signed);
            let reg = (i * dbits) / 64;
            lane_put(&mut out[reg as usize], dbits, i % (64 / dbits), p);
        }
        e.state.set_dreg(dst as u32, out[0]);
        e.state.set_dreg(dst as u32 + 1, out[1]);
        return;
    }

    let regs = if q { 2 } else { 1 };
    let bits = width.bits();
    for r in 0..regs {
        let av = e.state.dreg((a + r) as u32);
        let bv = e.state.dreg((b + r) as u32);
        let out = match kind {
            VecBinKind::And => av & bv,
            VecBinKind::Orr => av | bv,
            VecBinKind::Eor => av ^ bv,
            VecBinKind::Bic => av & !bv,
            VecBinKind::Orn => av | !bv,
            VecBinKind::Shl | VecBinKind::Rshl | VecBinKind::QShl | VecBinKind::QRshl => {
                let mut out = 0u64;
                for i in 0..(64 / bits) {
                    let s = lane_get(bv, bits, i, false) as u8 as i8;
                    let (lv, qc) = lane_shift(kind, width, signed, (av >> (i * bits)) & lane_mask(bits), s);
                    e.state.fpscr.qc |= qc;
                    lane_put(&mut out, bits, i, lv as i128);
                }
                out
            }
            _ => {
                let mut out = 0u64;
                for i in 0..(64 / bits) {
                    let x = lane_get(av, bits, i, signed);
                    let y = lane_get(bv, bits, i, signed);
                    let v = match kind {
                        VecBinKind::Add => x + y,
                        VecBinKind::Sub => x - y,
                        VecBinKind::Mul => x * y,
                        VecBinKind::QAdd => {
                            let (v, qc) = lane_clamp(x + y, bits, signed);
                            e.state.fpscr.qc |= qc;
                            v
                        }
                        VecBinKind::QSub => {
                            let (v, qc) = lane_clamp(x - y, bits, signed);
                            e.state.fpscr.qc |= qc;
                            v
                        }
                        VecBinKind::Ceq => -((x == y) as i128),
                        VecBinKind::Cge => -((x >= y) as i128),
                        VecBinKind::Cgt => -((x > y) as i128),
                        VecBinKind::Max => x.max(y),
                        VecBinKind::Min => x.min(y),
                        VecBinKind::Abd => (x - y).abs(),
                        _ => unreachable!(),
                    };
                    lane_put(&mut out, bits, i, v);
                }
                out
            }
        };
        e.state.set_dreg((dst + r) as u32, out);
    }
}

fn exec_vec_un(
    e: &mut Exec<'_>,
    kind: VecUnKind,
    width: LaneWidth,
    signed: bool,
    q: bool,
    dst: u8,
    src: u8,
) {
    let bits = width.bits();
    match kind {
        VecUnKind::Neg | VecUnKind::Abs | VecUnKind::Mvn => {
            let regs = if q { 2 } else { 1 };
            for r in 0..regs {
                let sv = e.state.dreg((src + r) as u32);
                let out = if kind == VecUnKind::Mvn {
                    !sv
                } else {
                    let mut out = 0u64;
                    for i in 0..(64 / bits) {
                        let x = lane_get(sv, bits, i, true);
                        let v = if kind == VecUnKind::Neg { -x } else { x.abs() };
                        lane_put(&mut out, bits, i, v);
                    }
                    out
                };
                e.state.set_dreg((dst + r) as u32, out);
            }
        }
        VecUnKind::Narrow | VecUnKind::NarrowSat | VecUnKind::NarrowSatUnsigned => {
            // `width` names the source lanes; the destination halves
            // them, collapsing the source pair into one register.
            let hbits = bits / 2;
            let mut out = 0u64;
            for i in 0..(128 / bits) {
                let sv = e.state.dreg((src + (i * bits / 64) as u8) as u32);
                let x = lane_get(sv, bits, i % (64 / bits), signed);
                let v = match kind {
                    VecUnKind::Narrow => x,
                    VecUnKind::NarrowSat => {
                        let (v, qc) = lane_clamp(x, hbits, signed);
                        e.state.fpscr.qc |= qc;
                        v
                    }
                    VecUnKind::NarrowSatUnsigned => {
                        let (v, qc) = lane_clamp(x, hbits, false);
                        e.state.fpscr.qc |= qc;
                        v
                    }
                    _ => unreachable!(),
                };
                lane_put(&mut out, hbits, i, v);
            }
            e.state.set_dreg(dst as u32, out);
        }
        VecUnKind::WidenLow | VecUnKind::WidenHigh => {
            // `width` names the source lanes; the destination pair
            // holds them doubled.
            let dbits = bits * 2;
            let sv = if kind == VecUnKind::WidenLow {
                e.state.dreg(src as u32)
            } else {
                e.state.dreg(src as u32 + 1)
            };
            let mut out = [0u64; 2];
            for i in 0..(64 / bits) {
                let x = lane_get(sv, bits, i, signed);
                let reg = (i * dbits) / 64;
                lane_put(&mut out[reg as usize], dbits, i % (64 / dbits), x);
            }
            e.state.set_dreg(dst as u32, out[0]);
            e.state.set_dreg(dst as u32 + 1, out[1]);
        }
    }
}

fn exec_vec_perm(e: &mut Exec<'_>, kind: PermKind, width: LaneWidth, q: bool, a: u8, b: u8) {
    let bits = width.bits();
    let regs = if q { 2u32 } else { 1 };
    let per_reg = 64 / bits;
    let n = (per_reg * regs) as usize;

    let collect = |e: &Exec<'_>, base: u8| -> Vec<u64> {
        (0..n)
            .map(|i| {
                let reg = base as u32 + i as u32 / per_reg;
                lane_get(e.state.dreg(reg), bits, i as u32 % per_reg, false) as u64
            })
            .collect()
    };
    let av = collect(e, a);
    let bv = collect(e, b);

    let mut ra = vec![0u64; n];
    let mut rb = vec![0u64; n];
    match kind {
        PermKind::Zip => {
            for i in 0..n {
                ra[i] = if i % 2 == 0 { av[i / 2] } else { bv[i / 2] };
                rb[i] = if i % 2 == 0 { av[(n + i) / 2] } else { bv[(n + i) / 2] };
            }
        }
        PermKind::Uzp => {
            for i in 0..n {
                let src = 2 * i;
                ra[i] = if src < n { av[src] } else { bv[src - n] };
                let src = 2 * i + 1;
                rb[i] = if src < n { av[src] } else { bv[src - n] };
            }
        }
        PermKind::Trn => {
            for i in (0..n).step_by(2) {
                ra[i] = av[i];
                ra[i + 1] = bv[i];
                rb[i] = av[i + 1];
                rb[i + 1] = bv[i + 1];
            }
        }
    }

    let scatter = |e: &mut Exec<'_>, base: u8, vals: &[u64]| {
        for r in 0..regs {
            let mut out = 0u64;
            for i in 0..per_reg {
                lane_put(&mut out, bits, i, vals[(r * per_reg + i) as usize] as i128);
            }
            e.state.set_dreg(base as u32 + r, out);
        }
    };
    scatter(e, a, &ra);
    scatter(e, b, &rb);
}

/// Step a register number to the next element of a short vector,
/// wrapping within its bank.
fn vfp_step(reg: u8, step: u8, double: bool) -> u8 {
    if double {
        (reg & !3) | ((reg + step) & 3)
    } else {
        (reg & !7) | ((reg + step) & 7)
    }
}

fn vfp_scalar_bank(reg: u8, double: bool) -> bool {
    if double {
        reg < 4
    } else {
        reg < 8
    }
}

#[allow(clippy::too_many_arguments)]
fn exec_float_bin(
    e: &mut Exec<'_>,
    kind: FloatBinKind,
    double: bool,
    len: u8,
    stride: u8,
    dst: u8,
    a: u8,
    b: u8,
) {
    let step = if stride == 0 { 1 } else { 2 };
    // A destination in the scalar bank ignores the vector length; an
    // operand in the scalar bank stays fixed across the iterations.
    let iters = if vfp_scalar_bank(dst, double) { 1 } else { len as u32 + 1 };
    let b_scalar = vfp_scalar_bank(b, double);
    let (mut d, mut x, mut y) = (dst, a, b);
    for _ in 0..iters {
        if double {
            let (av, bv) = (
                f64::from_bits(e.state.dreg(x as u32)),
                f64::from_bits(e.state.dreg(y as u32)),
            );
            let r = match kind {
                FloatBinKind::Add => av + bv,
                FloatBinKind::Sub => av - bv,
                FloatBinKind::Mul => av * bv,
                FloatBinKind::Div => av / bv,
            };
            e.state.set_dreg(d as u32, r.to_bits());
        } else {
            let (av, bv) = (
                f32::from_bits(e.state.sreg(x as u32)),
                f32::from_bits(e.state.sreg(y as u32)),
            );
            let r = match kind {
                FloatBinKind::Add => av + bv,
                FloatBinKind::Sub => av - bv,
                FloatBinKind::Mul => av * bv,
                FloatBinKind::Div => av / bv,
            };
            e.state.set_sreg(d as u32, r.to_bits());
        }
        d = vfp_step(d, step, double);
        x = vfp_step(x, step, double);
        if !b_scalar {
            y = vfp_step(y, step, double);
        }
    }
}

fn exec_float_un(
    e: &mut Exec<'_>,
    kind: FloatUnKind,
    double: bool,
    len: u8,
    stride: u8,
    dst: u8,
    src: u8,
) {
    let step = if stride == 0 { 1 } else { 2 };
    let iters = if vfp_scalar_bank(dst, double) { 1 } else { len as u32 + 1 };
    let src_scalar = vfp_scalar_bank(src, double);
    let (mut d, mut s) = (dst, src);
    for _ in 0..iters {
        if double {
            let v = f64::from_bits(e.state.dreg(s as u32));
            let r = match kind {
                FloatUnKind::Mov => v,
                FloatUnKind::Abs => v.abs(),
                FloatUnKind::Neg => -v,
                FloatUnKind::Sqrt => v.sqrt(),
            };
            e.state.set_dreg(d as u32, r.to_bits());
        } else {
            let v = f32::from_bits(e.state.sreg(s as u32));
            let r = match kind {
                FloatUnKind::Mov => v,
                FloatUnKind::Abs => v.abs(),
                FloatUnKind::Neg => -v,
                FloatUnKind::Sqrt => v.sqrt(),
            };
            e.state.set_sreg(d as u32, r.to_bits());
        }
        d = vfp_step(d, step, double);
        if !src_scalar {
            s = vfp_step(s, step, double);
        }
    }
}

fn set_fpscr_rel(state: &mut CpuState, rel: lanes::FloatRelation, invalid: bool) {
    let f = lanes::relation_flags(rel);
    state.fpscr.n = f.n;
    state.fpscr.z = f.z;
    state.fpscr.c = f.c;
    state.fpscr.v = f.v;
    state.fpscr.invalid |= invalid;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::Cond;
    use crate::debug::{BreakpointSet, Breakpoints, NoBreakpoints};
    use crate::op::{ExitReason, Label};
    use crate::translate::{translate_block, TranslateParams};

    fn arm_image(base: VAddr, words: &[u32]) -> FlatMemory {
        let mut m = FlatMemory::load(base, &[]);
        for &w in words {
            m.push_word(w);
        }
        m
    }

    fn thumb_image(base: VAddr, halves: &[u16]) -> FlatMemory {
        let mut m = FlatMemory::load(base, &[]);
        for &h in halves {
            m.push_half(h);
        }
        m
    }

    /// Translate and execute blocks from the current program counter
    /// until one raises.
    fn run_to_trap(
        state: &mut CpuState,
        mem: &mut FlatMemory,
        bps: &dyn BreakpointSet,
        single_step: bool,
    ) -> ExceptionCause {
        for _ in 0..64 {
            let mut p = TranslateParams::from_state(state);
            p.single_step = single_step;
            let block = translate_block(&p, mem, bps).unwrap();
            match exec_block(state, mem, &block) {
                Outcome::Raised(cause) => return cause,
                Outcome::Linked { .. } | Outcome::Dynamic => {}
            }
        }
        panic!("no trap within 64 blocks");
    }

    fn ir_block(exec: ExecMode, mut ops: Vec<Op>) -> TranslationBlock {
        ops.push(Op::ExitDynamic);
        let block = TranslationBlock {
            start: 0x1000,
            exec,
            insn_count: 1,
            byte_len: 4,
            exit: ExitReason::Dynamic,
            ops,
        };
        block.validate().unwrap();
        block
    }

    const SVC_ARM: u32 = 0xef00_0000;
    const SVC_THUMB: u16 = 0xdf00;
    const SVC_A64: u32 = 0xd400_0001;

    #[test]
    fn test_arm_straight_line() {
        // mov r0, #1; add r0, r0, #2; svc 0
        let mut mem = arm_image(0x8000, &[0xe3a0_0001, 0xe280_0002, SVC_ARM]);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        let cause = run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(cause, ExceptionCause::SoftwareInterrupt);
        assert_eq!(state.reg(0), 3);
        // Service trap reports the following instruction.
        assert_eq!(state.pc(), 0x800c);
    }

    #[test]
    fn test_arm_condition_grid() {
        // mov<cc> r1, #1; svc 0
        for cond in 0u32..15 {
            let insn = (cond << 28) | 0x03a0_1001;
            let mut mem = arm_image(0x8000, &[insn, SVC_ARM]);
            for nzcv in 0u32..16 {
                let mut state = CpuState::new();
                state.set_pc(0x8000);
                state.flags.n = nzcv & 8 != 0;
                state.flags.z = nzcv & 4 != 0;
                state.flags.c = nzcv & 2 != 0;
                state.flags.v = nzcv & 1 != 0;
                let expect = Cond::from_bits(cond).passed(&state.flags);
                run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
                assert_eq!(
                    state.reg(1) == 1,
                    expect,
                    "cond {cond:#x} flags {nzcv:#06b}"
                );
            }
        }
    }

    #[test]
    fn test_arm_shifter_carry() {
        // movs r0, r1, lsr #32; svc 0
        let mut mem = arm_image(0x8000, &[0xe1b0_0021, SVC_ARM]);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        state.set_reg(1, 0x8000_0001);
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(state.reg(0), 0);
        assert!(state.flags.z);
        assert!(state.flags.c);

        // movs r0, r1, rrx; svc 0
        let mut mem = arm_image(0x8000, &[0xe1b0_0061, SVC_ARM]);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        state.set_reg(1, 1);
        state.flags.c = false;
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(state.reg(0), 0);
        assert!(state.flags.c);
    }

    #[test]
    fn test_arm_qadd_saturates() {
        // qadd r0, r1, r2; svc 0
        let mut mem = arm_image(0x8000, &[0xe102_0051, SVC_ARM]);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        state.set_reg(1, 0x7fff_ffff);
        state.set_reg(2, 1);
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(state.reg(0), 0x7fff_ffff);
        assert!(state.flags.q);
    }

    #[test]
    fn test_arm_ldm_base_in_list() {
        // ldmia r0!, {r0, r1}; svc 0 -- the loaded value wins over
        // writeback. One flat span holds both code and data.
        let mut mem = FlatMemory::new(0x8000, 0x2000);
        mem.write_scalar(0x8000, 4, false, 0xe8b0_0003).unwrap();
        mem.write_scalar(0x8004, 4, false, SVC_ARM as u64).unwrap();
        mem.write_scalar(0x9000, 4, false, 0x1111).unwrap();
        mem.write_scalar(0x9004, 4, false, 0x2222).unwrap();
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        state.set_reg(0, 0x9000);
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(state.reg(0), 0x1111);
        assert_eq!(state.reg(1), 0x2222);
    }

    #[test]
    fn test_arm_umull() {
        // umull r0, r1, r2, r3; svc 0
        let mut mem = arm_image(0x8000, &[0xe081_0392, SVC_ARM]);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        state.set_reg(2, 0xffff_ffff);
        state.set_reg(3, 2);
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(state.reg(0), 0xffff_fffe);
        assert_eq!(state.reg(1), 1);
    }

    #[test]
    fn test_arm_swp_exchanges() {
        // swp r0, r1, [r2]; svc 0
        let mut mem = FlatMemory::new(0x8000, 0x2000);
        mem.write_scalar(0x8000, 4, false, 0xe102_0091).unwrap();
        mem.write_scalar(0x8004, 4, false, SVC_ARM as u64).unwrap();
        mem.write_scalar(0x9000, 4, false, 0xaaaa).unwrap();
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        state.set_reg(1, 0xbbbb);
        state.set_reg(2, 0x9000);
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(state.reg(0), 0xaaaa);
        assert_eq!(mem.read_scalar(0x9000, 4, false).unwrap(), 0xbbbb);
    }

    #[test]
    fn test_arm_bx_switches_sets() {
        // bx r1
        let mut mem = arm_image(0x8000, &[0xe12f_ff11]);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        state.set_reg(1, 0x9001);
        let p = TranslateParams::from_state(&state);
        let block = translate_block(&p, &mem, &NoBreakpoints).unwrap();
        assert_eq!(exec_block(&mut state, &mut mem, &block), Outcome::Dynamic);
        assert_eq!(state.exec, ExecMode::Thumb);
        assert_eq!(state.pc(), 0x9000);
    }

    #[test]
    fn test_thumb_it_block_selects() {
        // cmp r0, #0; ite eq; mov r1, #1; mov r1, #2; svc 0
        let halves = [0x2800u16, 0xbf0c, 0x2101, 0x2102, SVC_THUMB];
        for (r0, want) in [(0u32, 1u32), (5, 2)] {
            let mut mem = thumb_image(0x8000, &halves);
            let mut state = CpuState::new();
            state.exec = ExecMode::Thumb;
            state.set_pc(0x8000);
            state.set_reg(0, r0);
            run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
            assert_eq!(state.reg(1), want, "r0 = {r0}");
            assert_eq!(state.condexec, 0);
        }
    }

    #[test]
    fn test_thumb_bl_pair() {
        // bl +4 encoded as a prefix/suffix pair.
        let mut mem = thumb_image(0x8000, &[0xf000, 0xf802]);
        let mut state = CpuState::new();
        state.exec = ExecMode::Thumb;
        state.set_pc(0x8000);
        let p = TranslateParams::from_state(&state);
        let block = translate_block(&p, &mem, &NoBreakpoints).unwrap();
        exec_block(&mut state, &mut mem, &block);
        assert_eq!(state.reg(14), 0x8005);
        assert_eq!(state.pc(), 0x8008);
        assert_eq!(state.exec, ExecMode::Thumb);
    }

    #[test]
    fn test_a64_csel_and_ccmp() {
        // cmp x0, #1; csel x2, x0, x1, eq; ccmp x0, x1, #4, ne; svc 0
        let words = [0xf100_041fu32, 0x9a81_0002, 0xfa41_1004, SVC_A64];
        let mut mem = arm_image(0x4_0000, &words);
        let mut state = CpuState::new();
        state.exec = ExecMode::A64;
        state.set_pc(0x4_0000);
        state.set_xreg(0, 1);
        state.set_xreg(1, 7);
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        // x0 == 1: eq passed, so x2 takes x0. ne then fails and the
        // immediate flags (just Z) land.
        assert_eq!(state.xreg(2), 1);
        assert!(state.flags.z);
        assert!(!state.flags.c);

        let mut state = CpuState::new();
        state.exec = ExecMode::A64;
        state.set_pc(0x4_0000);
        state.set_xreg(0, 5);
        state.set_xreg(1, 5);
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        // x0 != 1: x2 takes x1; ne passes so ccmp compares 5 with 5.
        assert_eq!(state.xreg(2), 5);
        assert!(state.flags.z);
        assert!(state.flags.c);
    }

    #[test]
    fn test_a64_countdown_loop() {
        // movz x0, #3; loop: sub x0, x0, #1; cbnz x0, loop; svc 0
        let words = [0xd280_0060u32, 0xd100_0400, 0xb5ff_ffe0, SVC_A64];
        let mut mem = arm_image(0x4_0000, &words);
        let mut state = CpuState::new();
        state.exec = ExecMode::A64;
        state.set_pc(0x4_0000);
        let cause = run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(cause, ExceptionCause::SoftwareInterrupt);
        assert_eq!(state.xreg(0), 0);
    }

    #[test]
    fn test_a64_ldp_stp_roundtrip() {
        // stp x0, x1, [sp, #-16]!; ldp x2, x3, [sp], #16; svc 0
        let words = [0xa9bf_07e0u32, 0xa8c1_0fe2, SVC_A64];
        let mut mem = FlatMemory::new(0x4_0000, 0x2000);
        for (i, w) in words.iter().enumerate() {
            mem.write_scalar(0x4_0000 + i as u64 * 4, 4, false, *w as u64)
                .unwrap();
        }
        let mut state = CpuState::new();
        state.exec = ExecMode::A64;
        state.set_pc(0x4_0000);
        state.set_xreg(31, 0x4_1000);
        state.set_xreg(0, 0x1122_3344_5566_7788);
        state.set_xreg(1, 0x99aa_bbcc_ddee_ff00);
        run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(state.xreg(2), 0x1122_3344_5566_7788);
        assert_eq!(state.xreg(3), 0x99aa_bbcc_ddee_ff00);
        assert_eq!(state.xreg(31), 0x4_1000);
    }

    #[test]
    fn test_breakpoint_traps_before_decode() {
        let mut mem = arm_image(0x8000, &[0xe3a0_0001, SVC_ARM]);
        let mut bps = Breakpoints::new();
        bps.insert(0x8000);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        let cause = run_to_trap(&mut state, &mut mem, &bps, false);
        assert_eq!(cause, ExceptionCause::Debug);
        assert_eq!(state.pc(), 0x8000);
        assert_eq!(state.reg(0), 0);
    }

    #[test]
    fn test_single_step_stops_after_one() {
        let mut mem = arm_image(0x8000, &[0xe3a0_0001, 0xe3a0_1002, SVC_ARM]);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        let cause = run_to_trap(&mut state, &mut mem, &NoBreakpoints, true);
        assert_eq!(cause, ExceptionCause::Debug);
        assert_eq!(state.pc(), 0x8004);
        assert_eq!(state.reg(0), 1);
        assert_eq!(state.reg(1), 0);
    }

    #[test]
    fn test_w32_write_zeroes_upper() {
        let block = ir_block(
            ExecMode::A64,
            vec![
                Op::MovImm { dst: Reg::Tmp(0), value: 0xffff_ffff_ffff_ffff },
                Op::MovImm { dst: Reg::Tmp(1), value: 1 },
                Op::Alu {
                    op: AluOp::Add,
                    w: OpWidth::W32,
                    set_flags: false,
                    dst: Reg::Arch(0),
                    a: Reg::Tmp(0),
                    b: Reg::Tmp(1),
                },
            ],
        );
        let mut state = CpuState::new();
        state.exec = ExecMode::A64;
        let mut mem = FlatMemory::new(0, 16);
        exec_block(&mut state, &mut mem, &block);
        assert_eq!(state.xreg(0), 0);
    }

    #[test]
    fn test_cond_skip_transfers_on_fail() {
        let block = ir_block(
            ExecMode::Arm,
            vec![
                Op::CondSkip { cond: Cond::Eq, dest: Label(0) },
                Op::MovImm { dst: Reg::Arch(0), value: 1 },
                Op::Label(Label(0)),
            ],
        );
        let mut mem = FlatMemory::new(0, 16);
        let mut state = CpuState::new();
        state.flags.z = false;
        exec_block(&mut state, &mut mem, &block);
        assert_eq!(state.reg(0), 0);
        let mut state = CpuState::new();
        state.flags.z = true;
        exec_block(&mut state, &mut mem, &block);
        assert_eq!(state.reg(0), 1);
    }

    #[test]
    fn test_vec_qadd_lane_saturation() {
        let mut state = CpuState::new();
        state.set_dreg(0, 0x7fff_0001_8000_fffe);
        state.set_dreg(1, 0x0001_0001_ffff_ffff);
        let block = ir_block(
            ExecMode::Arm,
            vec![Op::VecBin {
                kind: VecBinKind::QAdd,
                width: LaneWidth::W16,
                signed: true,
                q: false,
                dst: 2,
                a: 0,
                b: 1,
            }],
        );
        let mut mem = FlatMemory::new(0, 16);
        exec_block(&mut state, &mut mem, &block);
        // 0x7fff+1 clamps, 1+1=2, -32768-1 clamps, -2-1=-3.
        assert_eq!(state.dreg(2), 0x7fff_0002_8000_fffd);
        assert!(state.fpscr.qc);
    }

    #[test]
    fn test_vec_shift_negative_goes_right() {
        let mut state = CpuState::new();
        state.set_dreg(0, 0x0000_0010_0000_0010);
        state.set_dreg(1, 0x0000_00ff_0000_0001);
        let block = ir_block(
            ExecMode::Arm,
            vec![Op::VecBin {
                kind: VecBinKind::Shl,
                width: LaneWidth::W32,
                signed: false,
                q: false,
                dst: 2,
                a: 0,
                b: 1,
            }],
        );
        let mut mem = FlatMemory::new(0, 16);
        exec_block(&mut state, &mut mem, &block);
        // Lane 0 shifts left by 1, lane 1 right by 1.
        assert_eq!(state.dreg(2), 0x0000_0008_0000_0020);
    }

    #[test]
    fn test_vec_zip_interleaves() {
        let mut state = CpuState::new();
        state.set_dreg(0, 0x0706_0504_0302_0100);
        state.set_dreg(1, 0x0f0e_0d0c_0b0a_0908);
        let block = ir_block(
            ExecMode::Arm,
            vec![Op::VecPerm { kind: PermKind::Zip, width: LaneWidth::W8, q: false, a: 0, b: 1 }],
        );
        let mut mem = FlatMemory::new(0, 16);
        exec_block(&mut state, &mut mem, &block);
        assert_eq!(state.dreg(0), 0x0b03_0a02_0901_0800);
        assert_eq!(state.dreg(1), 0x0f07_0e06_0d05_0c04);
    }

    #[test]
    fn test_vec_orn_complements_second_operand() {
        // vorn d2, d0, d1; svc 0
        let mut mem = arm_image(0x8000, &[0xf230_2111, SVC_ARM]);
        let mut state = CpuState::new();
        state.set_pc(0x8000);
        state.set_dreg(0, 0xff00_ff00_0f0f_0f0f);
        state.set_dreg(1, 0x0123_4567_89ab_cdef);
        let cause = run_to_trap(&mut state, &mut mem, &NoBreakpoints, false);
        assert_eq!(cause, ExceptionCause::SoftwareInterrupt);
        assert_eq!(state.dreg(2), 0xffdc_ff98_7f5f_3f1f);
    }

    #[test]
    fn test_vec_narrow_saturates() {
        let mut state = CpuState::new();
        // Source pair of signed words: 0x10000, -40000, 5, -5.
        state.set_dreg(0, ((-40000i32 as u32 as u64) << 32) | 0x0001_0000);
        state.set_dreg(1, ((-5i32 as u32 as u64) << 32) | 5);
        let block = ir_block(
            ExecMode::Arm,
            vec![Op::VecUn {
                kind: VecUnKind::NarrowSat,
                width: LaneWidth::W32,
                signed: true,
                q: true,
                dst: 2,
                src: 0,
            }],
        );
        let mut mem = FlatMemory::new(0, 16);
        exec_block(&mut state, &mut mem, &block);
        assert_eq!(state.dreg(2), 0xfffb_0005_8000_7fff);
        assert!(state.fpscr.qc);
    }

    #[test]
    fn test_float_short_vector_replicates() {
        let mut state = CpuState::new();
        state.set_sreg(16, 1.5f32.to_bits());
        state.set_sreg(17, 2.5f32.to_bits());
        state.set_sreg(24, 10.0f32.to_bits());
        state.set_sreg(25, 20.0f32.to_bits());
        let block = ir_block(
            ExecMode::Arm,
            vec![Op::FloatBin {
                kind: FloatBinKind::Add,
                double: false,
                len: 1,
                stride: 0,
                dst: 8,
                a: 16,
                b: 24,
            }],
        );
        let mut mem = FlatMemory::new(0, 16);
        exec_block(&mut state, &mut mem, &block);
        assert_eq!(f32::from_bits(state.sreg(8)), 11.5);
        assert_eq!(f32::from_bits(state.sreg(9)), 22.5);
    }

    #[test]
    fn test_float_cmp_unordered_flags() {
        let mut state = CpuState::new();
        state.set_sreg(0, f32::NAN.to_bits());
        state.set_sreg(1, 1.0f32.to_bits());
        let block = ir_block(
            ExecMode::Arm,
            vec![
                Op::FloatCmp { double: false, signaling: false, a: 0, b: 1 },
                Op::VfpStatusToFlags,
            ],
        );
        let mut mem = FlatMemory::new(0, 16);
        exec_block(&mut state, &mut mem, &block);
        assert!(state.flags.c && state.flags.v);
        assert!(!state.flags.z && !state.flags.n);
        // Rust's NAN is quiet; the quiet compare leaves invalid clear.
        assert!(!state.fpscr.invalid);

        let block = ir_block(
            ExecMode::Arm,
            vec![Op::FloatCmp { double: false, signaling: true, a: 0, b: 1 }],
        );
        exec_block(&mut state, &mut mem, &block);
        assert!(state.fpscr.invalid);
    }
}
