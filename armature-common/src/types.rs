// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Virtual address in guest memory. Wide enough for both operating
/// widths; 32-bit mode addresses occupy the low half.
pub type VAddr = u64;

/// Process ID, as reported in core-dump notes.
pub type ProcessId = u32;

/// Guest page size (4 KiB).
pub const PAGE_SIZE: usize = 0x1000;

/// Page size as u64 for address math.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// Page mask for alignment checks.
pub const PAGE_MASK: u64 = PAGE_SIZE_U64 - 1;

/// Align a value down to the given alignment.
#[inline]
pub const fn align_down(value: u64, alignment: u64) -> u64 {
    value & !(alignment - 1)
}

/// Start of the page following the one containing `addr`.
#[inline]
pub const fn next_page_start(addr: u64) -> u64 {
    align_down(addr, PAGE_SIZE_U64) + PAGE_SIZE_U64
}

/// Check if a value is page-aligned.
#[inline]
pub const fn is_page_aligned(value: u64) -> bool {
    value & PAGE_MASK == 0
}
