// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Addressing-mode resolution: single-transfer index modes and the
//! block-transfer layout math. Everything here is pure arithmetic over
//! the decoded fields; the decoders turn the results into emitted
//! operations.

/// Index mode of a single load/store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Base plus offset, base unchanged.
    Offset,
    /// Base plus offset, updated base written back.
    PreIndex,
    /// Access at the base, then write back base plus offset.
    PostIndex,
}

impl IndexMode {
    /// Decode from the P and W encoding bits. P clear always
    /// post-indexes; P set with W set pre-indexes.
    pub fn from_pw(p: bool, w: bool) -> Self {
        match (p, w) {
            (false, _) => Self::PostIndex,
            (true, false) => Self::Offset,
            (true, true) => Self::PreIndex,
        }
    }

    #[inline]
    pub fn writes_back(self) -> bool {
        !matches!(self, Self::Offset)
    }
}

/// Resolve a single transfer: the effective address and the
/// written-back base, if any. `offset` is already signed by the U bit.
pub fn single_transfer(base: u32, offset: i32, mode: IndexMode) -> (u32, Option<u32>) {
    let indexed = base.wrapping_add(offset as u32);
    match mode {
        IndexMode::Offset => (indexed, None),
        IndexMode::PreIndex => (indexed, Some(indexed)),
        IndexMode::PostIndex => (base, Some(indexed)),
    }
}

/// Direction and timing of a block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    IncrementAfter,
    IncrementBefore,
    DecrementAfter,
    DecrementBefore,
}

impl BlockMode {
    /// Decode from the P (before) and U (increment) bits.
    pub fn from_pu(p: bool, u: bool) -> Self {
        match (p, u) {
            (false, true) => Self::IncrementAfter,
            (true, true) => Self::IncrementBefore,
            (false, false) => Self::DecrementAfter,
            (true, false) => Self::DecrementBefore,
        }
    }
}

/// Resolved layout of a block transfer of `count` words: where the
/// lowest-addressed access sits relative to the base, and how far the
/// written-back base moves. Transfers always walk upward in memory
/// from `start_offset`, lowest register number first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub start_offset: i32,
    pub writeback_offset: i32,
}

/// Compute the transfer window for a block mode. Decrement modes place
/// the window below the base (before: starting at `base - 4n`; after:
/// at `base - 4(n-1)`), increment-before starts one word above the
/// base.
pub fn block_layout(mode: BlockMode, count: u32) -> BlockLayout {
    let span = 4 * count as i32;
    match mode {
        BlockMode::IncrementAfter => BlockLayout {
            start_offset: 0,
            writeback_offset: span,
        },
        BlockMode::IncrementBefore => BlockLayout {
            start_offset: 4,
            writeback_offset: span,
        },
        BlockMode::DecrementAfter => BlockLayout {
            start_offset: -(span - 4),
            writeback_offset: -span,
        },
        BlockMode::DecrementBefore => BlockLayout {
            start_offset: -span,
            writeback_offset: -span,
        },
    }
}
