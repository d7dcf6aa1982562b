// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Scalar integer semantics shared by the decoders and backends:
//! condition evaluation, the barrel shifter with its immediate-zero
//! redefinitions, and flag-producing add/subtract.

use crate::state::Flags;

/// Condition selector, 4 bits as encoded in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    Eq = 0x0,
    Ne = 0x1,
    Cs = 0x2,
    Cc = 0x3,
    Mi = 0x4,
    Pl = 0x5,
    Vs = 0x6,
    Vc = 0x7,
    Hi = 0x8,
    Ls = 0x9,
    Ge = 0xa,
    Lt = 0xb,
    Gt = 0xc,
    Le = 0xd,
    Al = 0xe,
    /// Reserved selector; never passes.
    Nv = 0xf,
}

impl Cond {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0xf {
            0x0 => Self::Eq,
            0x1 => Self::Ne,
            0x2 => Self::Cs,
            0x3 => Self::Cc,
            0x4 => Self::Mi,
            0x5 => Self::Pl,
            0x6 => Self::Vs,
            0x7 => Self::Vc,
            0x8 => Self::Hi,
            0x9 => Self::Ls,
            0xa => Self::Ge,
            0xb => Self::Lt,
            0xc => Self::Gt,
            0xd => Self::Le,
            0xe => Self::Al,
            _ => Self::Nv,
        }
    }

    /// The opposite selector (flip of the low bit). Used to branch
    /// around conditional bodies.
    #[inline]
    pub fn invert(self) -> Self {
        Self::from_bits(self as u32 ^ 1)
    }

    /// Evaluate against the cached flags.
    pub fn passed(self, f: &Flags) -> bool {
        match self {
            Self::Eq => f.z,
            Self::Ne => !f.z,
            Self::Cs => f.c,
            Self::Cc => !f.c,
            Self::Mi => f.n,
            Self::Pl => !f.n,
            Self::Vs => f.v,
            Self::Vc => !f.v,
            Self::Hi => f.c && !f.z,
            Self::Ls => !f.c || f.z,
            Self::Ge => f.n == f.v,
            Self::Lt => f.n != f.v,
            Self::Gt => !f.z && f.n == f.v,
            Self::Le => f.z || f.n != f.v,
            Self::Al => true,
            Self::Nv => false,
        }
    }
}

/// Shift operator. `Rrx` is the one-bit rotate-through-carry form that
/// the immediate encoding reaches via rotate-by-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
    Rrx,
}

/// Decode an immediate shift field, applying the architectural
/// redefinitions of amount zero: a right-shift amount of zero encodes a
/// shift by 32, and rotate by zero encodes `Rrx`.
pub fn decode_imm_shift(op: u32, amount: u32) -> (ShiftKind, u32) {
    match op & 3 {
        0 => (ShiftKind::Lsl, amount),
        1 => (ShiftKind::Lsr, if amount == 0 { 32 } else { amount }),
        2 => (ShiftKind::Asr, if amount == 0 { 32 } else { amount }),
        _ => {
            if amount == 0 {
                (ShiftKind::Rrx, 1)
            } else {
                (ShiftKind::Ror, amount)
            }
        }
    }
}

/// Apply an immediate-form shift. `amount` is the decoded amount
/// (1-32 after [`decode_imm_shift`]; 0 is the identity). Returns the
/// result and the carry-out; with amount zero the carry-out is the
/// carry-in, untouched.
pub fn shift_imm(kind: ShiftKind, value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    match kind {
        ShiftKind::Lsl => match amount {
            0 => (value, carry_in),
            1..=31 => (value << amount, value & (1 << (32 - amount)) != 0),
            32 => (0, value & 1 != 0),
            _ => (0, false),
        },
        ShiftKind::Lsr => match amount {
            0 => (value, carry_in),
            1..=31 => (value >> amount, value & (1 << (amount - 1)) != 0),
            32 => (0, value & 0x8000_0000 != 0),
            _ => (0, false),
        },
        ShiftKind::Asr => match amount {
            0 => (value, carry_in),
            1..=31 => (
                ((value as i32) >> amount) as u32,
                value & (1 << (amount - 1)) != 0,
            ),
            // 32 and beyond fill with the sign bit.
            _ => {
                let sign = value & 0x8000_0000 != 0;
                (if sign { u32::MAX } else { 0 }, sign)
            }
        },
        ShiftKind::Ror => {
            if amount == 0 {
                (value, carry_in)
            } else {
                let r = value.rotate_right(amount & 0x1f);
                (r, r & 0x8000_0000 != 0)
            }
        }
        ShiftKind::Rrx => (
            (value >> 1) | ((carry_in as u32) << 31),
            value & 1 != 0,
        ),
    }
}

/// Apply a register-form shift. Only the low byte of `amount`
/// participates; amounts of 32 and above follow the boundary rules
/// (logical shifts drain to zero, arithmetic right fills with the sign
/// bit, rotate wraps modulo 32 but a nonzero multiple of 32 still
/// updates the carry from bit 31).
pub fn shift_reg(kind: ShiftKind, value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    let amount = amount & 0xff;
    if amount == 0 {
        return (value, carry_in);
    }
    match kind {
        ShiftKind::Lsl => match amount {
            1..=31 => (value << amount, value & (1 << (32 - amount)) != 0),
            32 => (0, value & 1 != 0),
            _ => (0, false),
        },
        ShiftKind::Lsr => match amount {
            1..=31 => (value >> amount, value & (1 << (amount - 1)) != 0),
            32 => (0, value & 0x8000_0000 != 0),
            _ => (0, false),
        },
        ShiftKind::Asr => {
            if amount < 32 {
                (
                    ((value as i32) >> amount) as u32,
                    value & (1 << (amount - 1)) != 0,
                )
            } else {
                let sign = value & 0x8000_0000 != 0;
                (if sign { u32::MAX } else { 0 }, sign)
            }
        }
        ShiftKind::Ror => {
            if amount & 0x1f == 0 {
                (value, value & 0x8000_0000 != 0)
            } else {
                let r = value.rotate_right(amount & 0x1f);
                (r, r & 0x8000_0000 != 0)
            }
        }
        // Register amounts never encode Rrx.
        ShiftKind::Rrx => shift_imm(ShiftKind::Rrx, value, 1, carry_in),
    }
}

/// Expand a rotated 8-bit immediate from a data-processing encoding.
/// Returns the value and, when the rotation is nonzero, the carry-out
/// that a flag-setting logical operation takes from the expansion.
pub fn expand_imm(imm8: u32, rotate: u32) -> (u32, Option<bool>) {
    let value = imm8.rotate_right(rotate * 2);
    if rotate == 0 {
        (value, None)
    } else {
        (value, Some(value & 0x8000_0000 != 0))
    }
}

/// Flag-producing 32-bit add: result plus full NZCV.
pub fn add_flags32(a: u32, b: u32) -> (u32, Flags) {
    adc_flags32(a, b, false)
}

/// Flag-producing 32-bit add with carry-in.
pub fn adc_flags32(a: u32, b: u32, carry_in: bool) -> (u32, Flags) {
    let wide = a as u64 + b as u64 + carry_in as u64;
    let result = wide as u32;
    let mut f = Flags::default();
    f.set_nz32(result);
    f.c = wide > u32::MAX as u64;
    f.v = (!(a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    (result, f)
}

/// Flag-producing 32-bit subtract. Carry is the no-borrow convention.
pub fn sub_flags32(a: u32, b: u32) -> (u32, Flags) {
    sbc_flags32(a, b, true)
}

/// Flag-producing 32-bit subtract with borrow (`carry_in` false
/// borrows one).
pub fn sbc_flags32(a: u32, b: u32, carry_in: bool) -> (u32, Flags) {
    let (result, f) = adc_flags32(a, !b, carry_in);
    (result, f)
}

/// Flag-producing 64-bit add with carry-in, for the wide encoding.
pub fn adc_flags64(a: u64, b: u64, carry_in: bool) -> (u64, Flags) {
    let wide = a as u128 + b as u128 + carry_in as u128;
    let result = wide as u64;
    let mut f = Flags::default();
    f.set_nz64(result);
    f.c = wide > u64::MAX as u128;
    f.v = (!(a ^ b) & (a ^ result)) & (1 << 63) != 0;
    (result, f)
}

pub fn sbc_flags64(a: u64, b: u64, carry_in: bool) -> (u64, Flags) {
    adc_flags64(a, !b, carry_in)
}

/// Wrapping signed add that reports overflow without clamping. The
/// dual-multiply accumulate forms use this: the result wraps but the
/// sticky saturation flag must still be raised.
#[inline]
pub fn add_setq(a: u32, b: u32) -> (u32, bool) {
    let result = a.wrapping_add(b);
    let overflow = (!(a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    (result, overflow)
}

/// Sum or difference of the two signed 16x16 products of the halfword
/// pairs of `a` and `b`, optionally with the halves of `b` swapped.
/// The i64 result cannot overflow.
pub fn mul_dual_s16(a: u32, b: u32, swap: bool, subtract: bool) -> i64 {
    let al = a as u16 as i16 as i64;
    let ah = (a >> 16) as u16 as i16 as i64;
    let (bl, bh) = if swap {
        ((b >> 16) as u16 as i16 as i64, b as u16 as i16 as i64)
    } else {
        (b as u16 as i16 as i64, (b >> 16) as u16 as i16 as i64)
    };
    if subtract {
        al * bl - ah * bh
    } else {
        al * bl + ah * bh
    }
}
