// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Architectural state: general registers, cached condition flags,
//! processor mode, and the vector/float register bank.
//!
//! The flag bits are stored decomposed ([`Flags`]); the packed CPSR word
//! only exists transiently when [`CpuState::cpsr`] composes it or
//! [`CpuState::set_cpsr`] scatters it back. There is never more than one
//! authoritative copy.

use armature_common::VAddr;

use crate::lanes::LaneWidth;

bitflags::bitflags! {
    /// Bit masks for fields of the program status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Psr: u32 {
        const N = 1 << 31;
        const Z = 1 << 30;
        const C = 1 << 29;
        const V = 1 << 28;
        const Q = 1 << 27;
        const THUMB = 1 << 5;
        const MODE = 0x1f;
        /// Flag byte written by MSR field mask bit 3.
        const FLAG_FIELD = 0xf000_0000;
        /// Control byte written by MSR field mask bit 0.
        const CONTROL_FIELD = 0xff;
    }
}

/// Cached condition flags: negative, zero, carry, overflow, plus the
/// sticky saturation flag Q.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
    /// Sticky: set by saturating operations, cleared only by an
    /// explicit status-register write.
    pub q: bool,
}

impl Flags {
    /// Set N and Z from a 32-bit result, leaving C and V alone.
    #[inline]
    pub fn set_nz32(&mut self, result: u32) {
        self.n = result & 0x8000_0000 != 0;
        self.z = result == 0;
    }

    /// Set N and Z from a 64-bit result.
    #[inline]
    pub fn set_nz64(&mut self, result: u64) {
        self.n = result & (1 << 63) != 0;
        self.z = result == 0;
    }
}

/// Processor mode as encoded in CPSR[4:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    User = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Supervisor = 0x13,
    Abort = 0x17,
    Undefined = 0x1b,
    System = 0x1f,
}

impl CpuMode {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0x1f {
            0x10 => Some(Self::User),
            0x11 => Some(Self::Fiq),
            0x12 => Some(Self::Irq),
            0x13 => Some(Self::Supervisor),
            0x17 => Some(Self::Abort),
            0x1b => Some(Self::Undefined),
            0x1f => Some(Self::System),
            _ => None,
        }
    }

    #[inline]
    pub fn is_user(self) -> bool {
        matches!(self, Self::User)
    }
}

/// Which instruction encoding the processor is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Fixed-width 32-bit encoding.
    Arm,
    /// Compressed 16/32-bit encoding.
    Thumb,
    /// 64-bit encoding.
    A64,
}

// ---------------------------------------------------------------------------
// Vector/float register bank
// ---------------------------------------------------------------------------

/// One 128-bit vector storage cell, reinterpretable as 8/16/32/64-bit
/// lanes or as single/double floats. Reinterpretation never converts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VecReg(pub [u64; 2]);

impl VecReg {
    /// Number of lanes of `width` in the full 128-bit cell.
    #[inline]
    pub fn lane_count(width: LaneWidth) -> usize {
        128 / width.bits() as usize
    }

    /// Read lane `idx` zero-extended. `idx` counts from the least
    /// significant end.
    pub fn lane(&self, width: LaneWidth, idx: usize) -> u64 {
        let bits = width.bits() as usize;
        let per_word = 64 / bits;
        let word = self.0[idx / per_word];
        let shift = (idx % per_word) * bits;
        if bits == 64 {
            word
        } else {
            (word >> shift) & ((1u64 << bits) - 1)
        }
    }

    /// Read lane `idx` sign-extended to i64.
    pub fn lane_signed(&self, width: LaneWidth, idx: usize) -> i64 {
        let bits = width.bits() as u32;
        let v = self.lane(width, idx);
        ((v << (64 - bits)) as i64) >> (64 - bits)
    }

    /// Write lane `idx`, truncating `value` to the lane width.
    pub fn set_lane(&mut self, width: LaneWidth, idx: usize, value: u64) {
        let bits = width.bits() as usize;
        let per_word = 64 / bits;
        let shift = (idx % per_word) * bits;
        let word = &mut self.0[idx / per_word];
        if bits == 64 {
            *word = value;
        } else {
            let mask = ((1u64 << bits) - 1) << shift;
            *word = (*word & !mask) | ((value << shift) & mask);
        }
    }

    #[inline]
    pub fn f32_lane(&self, idx: usize) -> f32 {
        f32::from_bits(self.lane(LaneWidth::W32, idx) as u32)
    }

    #[inline]
    pub fn set_f32_lane(&mut self, idx: usize, value: f32) {
        self.set_lane(LaneWidth::W32, idx, value.to_bits() as u64);
    }

    #[inline]
    pub fn f64_lane(&self, idx: usize) -> f64 {
        f64::from_bits(self.lane(LaneWidth::W64, idx))
    }

    #[inline]
    pub fn set_f64_lane(&mut self, idx: usize, value: f64) {
        self.set_lane(LaneWidth::W64, idx, value.to_bits());
    }
}

/// Floating-point status and control word, stored decomposed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fpscr {
    /// Compare result flags (separate from the CPSR cache; a status
    /// transfer copies them across).
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
    /// Sticky saturation from vector saturating ops.
    pub qc: bool,
    /// Cumulative invalid-operation flag from signaling compares.
    pub invalid: bool,
    /// Short-vector length field (0 = scalar).
    pub len: u8,
    /// Short-vector stride field.
    pub stride: u8,
}

impl Fpscr {
    /// Compose the architectural status word.
    pub fn word(&self) -> u32 {
        let mut w = 0u32;
        if self.n {
            w |= 1 << 31;
        }
        if self.z {
            w |= 1 << 30;
        }
        if self.c {
            w |= 1 << 29;
        }
        if self.v {
            w |= 1 << 28;
        }
        if self.qc {
            w |= 1 << 27;
        }
        w |= ((self.stride as u32) & 3) << 20;
        w |= ((self.len as u32) & 7) << 16;
        if self.invalid {
            w |= 1;
        }
        w
    }

    pub fn set_word(&mut self, w: u32) {
        self.n = w & (1 << 31) != 0;
        self.z = w & (1 << 30) != 0;
        self.c = w & (1 << 29) != 0;
        self.v = w & (1 << 28) != 0;
        self.qc = w & (1 << 27) != 0;
        self.stride = ((w >> 20) & 3) as u8;
        self.len = ((w >> 16) & 7) as u8;
        self.invalid = w & 1 != 0;
    }
}

// ---------------------------------------------------------------------------
// CPU state
// ---------------------------------------------------------------------------

/// Full architectural state for one guest processor context.
///
/// Allocated once per context and exclusively owned by it; a translation
/// pass for a different context must never touch it.
#[derive(Debug, Clone)]
pub struct CpuState {
    /// 32-bit mode general registers r0-r14 plus the program counter in
    /// `regs[15]`.
    pub regs: [u32; 16],
    /// User-bank copies of r8-r14, visible to the S-bit forms of
    /// multiple-register transfers from privileged modes.
    pub user_bank: [u32; 7],
    /// Cached condition flags (the authoritative copy).
    pub flags: Flags,
    pub mode: CpuMode,
    pub exec: ExecMode,
    /// Saved status register for the current privileged mode.
    pub spsr: u32,
    /// Conditional-execution state (compact encoding): current
    /// condition in bits [7:4], continuation mask below.
    pub condexec: u8,
    /// 64-bit mode general registers x0-x30.
    pub x: [u64; 31],
    /// 64-bit mode stack pointer.
    pub sp: u64,
    /// 64-bit mode program counter.
    pub pc64: u64,
    /// Vector/float register bank.
    pub v: [VecReg; 32],
    pub fpscr: Fpscr,
    /// Vector/float unit enablement.
    pub vfp_enabled: bool,
    /// Guest data endianness.
    pub big_endian: bool,
}

impl Default for CpuState {
    fn default() -> Self {
        Self {
            regs: [0; 16],
            user_bank: [0; 7],
            flags: Flags::default(),
            mode: CpuMode::Supervisor,
            exec: ExecMode::Arm,
            spsr: 0,
            condexec: 0,
            x: [0; 31],
            sp: 0,
            pc64: 0,
            v: [VecReg::default(); 32],
            fpscr: Fpscr::default(),
            vfp_enabled: true,
            big_endian: false,
        }
    }
}

impl CpuState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a 32-bit mode general register. Index 15 reads the program
    /// counter as stored (callers add the architectural fetch offset).
    #[inline]
    pub fn reg(&self, index: u32) -> u32 {
        self.regs[index as usize]
    }

    /// Set a 32-bit mode general register. Reads back exactly what was
    /// written.
    #[inline]
    pub fn set_reg(&mut self, index: u32, value: u32) {
        self.regs[index as usize] = value;
    }

    /// Get a 64-bit mode register. Index 31 reads SP.
    #[inline]
    pub fn xreg(&self, index: u32) -> u64 {
        if index == 31 {
            self.sp
        } else {
            self.x[index as usize]
        }
    }

    /// Set a 64-bit mode register. Index 31 sets SP.
    #[inline]
    pub fn set_xreg(&mut self, index: u32, value: u64) {
        if index == 31 {
            self.sp = value;
        } else {
            self.x[index as usize] = value;
        }
    }

    /// Program counter for the active execution mode.
    #[inline]
    pub fn pc(&self) -> VAddr {
        match self.exec {
            ExecMode::A64 => self.pc64,
            _ => self.regs[15] as VAddr,
        }
    }

    #[inline]
    pub fn set_pc(&mut self, value: VAddr) {
        match self.exec {
            ExecMode::A64 => self.pc64 = value,
            _ => self.regs[15] = value as u32,
        }
    }

    /// Compose the packed CPSR word from the decomposed state.
    pub fn cpsr(&self) -> u32 {
        let mut w = self.mode as u32;
        if self.flags.n {
            w |= Psr::N.bits();
        }
        if self.flags.z {
            w |= Psr::Z.bits();
        }
        if self.flags.c {
            w |= Psr::C.bits();
        }
        if self.flags.v {
            w |= Psr::V.bits();
        }
        if self.flags.q {
            w |= Psr::Q.bits();
        }
        if self.exec == ExecMode::Thumb {
            w |= Psr::THUMB.bits();
        }
        w
    }

    /// Scatter `value` into the decomposed state, touching only the
    /// bits selected by `mask`.
    pub fn set_cpsr(&mut self, value: u32, mask: u32) {
        if mask & Psr::N.bits() != 0 {
            self.flags.n = value & Psr::N.bits() != 0;
        }
        if mask & Psr::Z.bits() != 0 {
            self.flags.z = value & Psr::Z.bits() != 0;
        }
        if mask & Psr::C.bits() != 0 {
            self.flags.c = value & Psr::C.bits() != 0;
        }
        if mask & Psr::V.bits() != 0 {
            self.flags.v = value & Psr::V.bits() != 0;
        }
        if mask & Psr::Q.bits() != 0 {
            self.flags.q = value & Psr::Q.bits() != 0;
        }
        if mask & Psr::THUMB.bits() != 0 {
            self.exec = if value & Psr::THUMB.bits() != 0 {
                ExecMode::Thumb
            } else {
                ExecMode::Arm
            };
        }
        if mask & Psr::MODE.bits() != 0 {
            if let Some(mode) = CpuMode::from_bits(value) {
                self.mode = mode;
            }
        }
    }

    /// User-bank view of r8-r14, used by S-bit multiple transfers.
    #[inline]
    pub fn user_reg(&self, index: u32) -> u32 {
        if self.mode.is_user() || index < 8 {
            self.regs[index as usize]
        } else {
            self.user_bank[index as usize - 8]
        }
    }

    #[inline]
    pub fn set_user_reg(&mut self, index: u32, value: u32) {
        if self.mode.is_user() || index < 8 {
            self.regs[index as usize] = value;
        } else {
            self.user_bank[index as usize - 8] = value;
        }
    }

    /// Double-precision view of the vector bank (32-bit mode register
    /// numbering: d0-d31 over the 128-bit cells).
    #[inline]
    pub fn dreg(&self, index: u32) -> u64 {
        self.v[(index >> 1) as usize].0[(index & 1) as usize]
    }

    #[inline]
    pub fn set_dreg(&mut self, index: u32, value: u64) {
        self.v[(index >> 1) as usize].0[(index & 1) as usize] = value;
    }

    /// Single-precision view (s0-s31), packed pairwise into d registers.
    #[inline]
    pub fn sreg(&self, index: u32) -> u32 {
        let d = self.dreg(index >> 1);
        (d >> ((index & 1) * 32)) as u32
    }

    #[inline]
    pub fn set_sreg(&mut self, index: u32, value: u32) {
        let shift = (index & 1) * 32;
        let mask = 0xffff_ffffu64 << shift;
        let d = self.dreg(index >> 1);
        self.set_dreg(index >> 1, (d & !mask) | ((value as u64) << shift));
    }
}
