// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Process-status core-dump notes. Two fixed layouts, one per
//! register width; every field is serialized explicitly in the guest's
//! byte order so the offsets below hold on any host.

use armature_common::ProcessId;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::state::CpuState;

/// Narrow note: 12-byte signal info, current signal, pending/held
/// masks, four id fields starting with the pid, four time fields, then
/// 18 general-register words (r0-r15, the packed status word, and the
/// original r0), and a trailing fp-valid word.
pub const NOTE32_SIZE: usize = 148;
pub const NOTE32_PID_OFFSET: usize = 24;
pub const NOTE32_REGS_OFFSET: usize = 72;

/// Wide note: same shape with 8-byte masks and times, then 34 register
/// doublewords (x0-x30, sp, pc, pstate).
pub const NOTE64_SIZE: usize = 392;
pub const NOTE64_PID_OFFSET: usize = 32;
pub const NOTE64_REGS_OFFSET: usize = 112;

fn put_u16<B: ByteOrder>(out: &mut Vec<u8>, v: u16) {
    let mut b = [0u8; 2];
    B::write_u16(&mut b, v);
    out.extend_from_slice(&b);
}

fn put_u32<B: ByteOrder>(out: &mut Vec<u8>, v: u32) {
    let mut b = [0u8; 4];
    B::write_u32(&mut b, v);
    out.extend_from_slice(&b);
}

fn put_u64<B: ByteOrder>(out: &mut Vec<u8>, v: u64) {
    let mut b = [0u8; 8];
    B::write_u64(&mut b, v);
    out.extend_from_slice(&b);
}

/// Serialize the narrow process-status note for `state`.
pub fn write_note32(state: &CpuState, pid: ProcessId, signal: u32, out: &mut Vec<u8>) {
    if state.big_endian {
        emit32::<BigEndian>(state, pid, signal, out);
    } else {
        emit32::<LittleEndian>(state, pid, signal, out);
    }
}

fn emit32<B: ByteOrder>(state: &CpuState, pid: ProcessId, signal: u32, out: &mut Vec<u8>) {
    let start = out.len();
    // Signal info: number, code, errno.
    put_u32::<B>(out, signal);
    put_u32::<B>(out, 0);
    put_u32::<B>(out, 0);
    put_u16::<B>(out, signal as u16);
    put_u16::<B>(out, 0);
    // Pending and held masks.
    put_u32::<B>(out, 0);
    put_u32::<B>(out, 0);
    debug_assert_eq!(out.len() - start, NOTE32_PID_OFFSET);
    put_u32::<B>(out, pid);
    put_u32::<B>(out, 0); // ppid
    put_u32::<B>(out, 0); // pgrp
    put_u32::<B>(out, 0); // sid
    // User/system/cumulative times, unreported.
    for _ in 0..8 {
        put_u32::<B>(out, 0);
    }
    debug_assert_eq!(out.len() - start, NOTE32_REGS_OFFSET);
    for i in 0..16 {
        put_u32::<B>(out, state.regs[i]);
    }
    put_u32::<B>(out, state.cpsr());
    put_u32::<B>(out, state.regs[0]); // original r0
    put_u32::<B>(out, 0); // fp-valid
    debug_assert_eq!(out.len() - start, NOTE32_SIZE);
}

/// Serialize the wide process-status note for `state`.
pub fn write_note64(state: &CpuState, pid: ProcessId, signal: u32, out: &mut Vec<u8>) {
    if state.big_endian {
        emit64::<BigEndian>(state, pid, signal, out);
    } else {
        emit64::<LittleEndian>(state, pid, signal, out);
    }
}

fn emit64<B: ByteOrder>(state: &CpuState, pid: ProcessId, signal: u32, out: &mut Vec<u8>) {
    let start = out.len();
    put_u32::<B>(out, signal);
    put_u32::<B>(out, 0);
    put_u32::<B>(out, 0);
    put_u16::<B>(out, signal as u16);
    put_u16::<B>(out, 0);
    put_u64::<B>(out, 0); // pending mask
    put_u64::<B>(out, 0); // held mask
    debug_assert_eq!(out.len() - start, NOTE64_PID_OFFSET);
    put_u32::<B>(out, pid);
    put_u32::<B>(out, 0);
    put_u32::<B>(out, 0);
    put_u32::<B>(out, 0);
    for _ in 0..8 {
        put_u64::<B>(out, 0);
    }
    debug_assert_eq!(out.len() - start, NOTE64_REGS_OFFSET);
    for i in 0..31 {
        put_u64::<B>(out, state.x[i]);
    }
    put_u64::<B>(out, state.sp);
    put_u64::<B>(out, state.pc64);
    put_u64::<B>(out, state.cpsr() as u64); // pstate
    put_u32::<B>(out, 0); // fp-valid
    put_u32::<B>(out, 0); // tail padding
    debug_assert_eq!(out.len() - start, NOTE64_SIZE);
}
