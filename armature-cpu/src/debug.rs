// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host debug hooks. The translator consults a breakpoint set before
//! decoding each instruction; a hit replaces the instruction with a
//! debug trap.

use std::collections::BTreeSet;

use armature_common::VAddr;

/// Membership query the translator performs per instruction.
pub trait BreakpointSet {
    fn contains(&self, addr: VAddr) -> bool;
}

/// The empty set, for callers without a debugger attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBreakpoints;

impl BreakpointSet for NoBreakpoints {
    #[inline]
    fn contains(&self, _addr: VAddr) -> bool {
        false
    }
}

/// Mutable breakpoint table. Blocks translated while an address was
/// present must be discarded when it is removed; the translator
/// guarantees a block containing a hit covers at least one byte at the
/// breakpoint address, so address-range invalidation finds it.
#[derive(Debug, Clone, Default)]
pub struct Breakpoints {
    addrs: BTreeSet<VAddr>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a breakpoint. Returns false if it was already present.
    pub fn insert(&mut self, addr: VAddr) -> bool {
        let inserted = self.addrs.insert(addr);
        if inserted {
            log::debug!("breakpoint set at {addr:#x}");
        }
        inserted
    }

    pub fn remove(&mut self, addr: VAddr) -> bool {
        let removed = self.addrs.remove(&addr);
        if removed {
            log::debug!("breakpoint cleared at {addr:#x}");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.addrs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = VAddr> + '_ {
        self.addrs.iter().copied()
    }
}

impl BreakpointSet for Breakpoints {
    #[inline]
    fn contains(&self, addr: VAddr) -> bool {
        self.addrs.contains(&addr)
    }
}
