// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Instruction-level CPU core: decoders for the three instruction
//! sets, the translated-block representation, and the supporting
//! arithmetic, vector-lane, and addressing helpers.

pub mod addr;
pub mod alu;
pub mod coredump;
pub mod debug;
pub mod lanes;
pub mod memory;
pub mod op;
pub mod state;
pub mod translate;

pub use state::CpuState;

#[cfg(test)]
mod testexec;
