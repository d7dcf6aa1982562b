// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Guest memory interfaces: the code-fetch surface the translator
//! pulls instruction words through, the data access surface backends
//! execute against, and the global atomic window for modeled
//! read-modify-write instructions.

use armature_common::VAddr;
use byteorder::ByteOrder;
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

/// A code fetch failed. The translator turns this into an emitted
/// prefetch-abort, never an error return.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("instruction fetch fault at {addr:#x}")]
pub struct FetchFault {
    pub addr: VAddr,
}

/// A data access failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFault {
    #[error("data abort at {addr:#x}")]
    DataAbort { addr: VAddr },
    #[error("unprivileged access denied at {addr:#x}")]
    Privilege { addr: VAddr },
}

/// Instruction fetch surface. Halfword fetches serve the compact
/// encoding; both return host-order values from guest little-endian
/// storage.
pub trait CodeFetch {
    fn fetch16(&self, addr: VAddr) -> Result<u16, FetchFault>;
    fn fetch32(&self, addr: VAddr) -> Result<u32, FetchFault>;
}

/// Data access surface for executing translated blocks.
pub trait MemoryAccess {
    fn read(&self, addr: VAddr, buf: &mut [u8]) -> Result<(), MemoryFault>;
    fn write(&mut self, addr: VAddr, buf: &[u8]) -> Result<(), MemoryFault>;

    fn read_scalar(&self, addr: VAddr, bytes: u32, big_endian: bool) -> Result<u64, MemoryFault> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf[..bytes as usize])?;
        Ok(if big_endian {
            byteorder::BigEndian::read_uint(&buf[..bytes as usize], bytes as usize)
        } else {
            byteorder::LittleEndian::read_uint(&buf[..bytes as usize], bytes as usize)
        })
    }

    fn write_scalar(
        &mut self,
        addr: VAddr,
        bytes: u32,
        big_endian: bool,
        value: u64,
    ) -> Result<(), MemoryFault> {
        let mut buf = [0u8; 8];
        if big_endian {
            byteorder::BigEndian::write_uint(&mut buf[..bytes as usize], value, bytes as usize);
        } else {
            byteorder::LittleEndian::write_uint(&mut buf[..bytes as usize], value, bytes as usize);
        }
        self.write(addr, &buf[..bytes as usize])
    }
}

/// One flat span of guest memory starting at `base`. Backs the tests
/// and small standalone guests.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    base: VAddr,
    data: Vec<u8>,
}

impl FlatMemory {
    pub fn new(base: VAddr, size: usize) -> Self {
        Self { base, data: vec![0; size] }
    }

    pub fn load(base: VAddr, image: &[u8]) -> Self {
        Self { base, data: image.to_vec() }
    }

    fn offset(&self, addr: VAddr, len: usize) -> Option<usize> {
        let off = addr.checked_sub(self.base)? as usize;
        if off + len <= self.data.len() {
            Some(off)
        } else {
            None
        }
    }

    /// Append little-endian instruction words, for building test
    /// images.
    pub fn push_word(&mut self, word: u32) {
        self.data.extend_from_slice(&word.to_le_bytes());
    }

    pub fn push_half(&mut self, half: u16) {
        self.data.extend_from_slice(&half.to_le_bytes());
    }
}

impl CodeFetch for FlatMemory {
    fn fetch16(&self, addr: VAddr) -> Result<u16, FetchFault> {
        let off = self.offset(addr, 2).ok_or(FetchFault { addr })?;
        Ok(byteorder::LittleEndian::read_u16(&self.data[off..]))
    }

    fn fetch32(&self, addr: VAddr) -> Result<u32, FetchFault> {
        let off = self.offset(addr, 4).ok_or(FetchFault { addr })?;
        Ok(byteorder::LittleEndian::read_u32(&self.data[off..]))
    }
}

impl MemoryAccess for FlatMemory {
    fn read(&self, addr: VAddr, buf: &mut [u8]) -> Result<(), MemoryFault> {
        let off = self
            .offset(addr, buf.len())
            .ok_or(MemoryFault::DataAbort { addr })?;
        buf.copy_from_slice(&self.data[off..off + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: VAddr, buf: &[u8]) -> Result<(), MemoryFault> {
        let off = self
            .offset(addr, buf.len())
            .ok_or(MemoryFault::DataAbort { addr })?;
        self.data[off..off + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

static ATOMIC_LOCK: Mutex<()> = Mutex::new(());

/// Enter the global atomic window. Modeled read-modify-write
/// instructions hold this guard across their load and store so no
/// other context's window interleaves.
pub fn atomic_section() -> MutexGuard<'static, ()> {
    ATOMIC_LOCK.lock()
}
