// SPDX-FileCopyrightText: 2026 armature contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Element-wise lane semantics for the vector/float unit: saturating
//! arithmetic, the signed-shift family (positive amounts shift left,
//! negative shift right), width conversions, and ordered/unordered
//! float compares.
//!
//! Everything is computed in an i128 accumulator so rounding biases and
//! saturation checks never themselves overflow. Saturating operations
//! report the clamp in their return value; callers fold it into the
//! sticky QC flag.

use crate::state::Flags;

/// Lane element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneWidth {
    W8,
    W16,
    W32,
    W64,
}

impl LaneWidth {
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// The next width up, for widening operations. W64 has none.
    pub fn doubled(self) -> Option<Self> {
        match self {
            Self::W8 => Some(Self::W16),
            Self::W16 => Some(Self::W32),
            Self::W32 => Some(Self::W64),
            Self::W64 => None,
        }
    }

    /// The next width down, for narrowing operations.
    pub fn halved(self) -> Option<Self> {
        match self {
            Self::W8 => None,
            Self::W16 => Some(Self::W8),
            Self::W32 => Some(Self::W16),
            Self::W64 => Some(Self::W32),
        }
    }
}

/// A lane element type. Implemented for the eight fixed-width integer
/// types; the generic operations below are written once against this.
pub trait Lane: Copy + PartialOrd + core::fmt::Debug {
    const BITS: i32;
    const SIGNED: bool;

    fn to_i128(self) -> i128;
    /// Truncating conversion back from the accumulator.
    fn wrap_i128(v: i128) -> Self;
    /// Clamping conversion; the flag reports whether clamping occurred.
    fn clamp_i128(v: i128) -> (Self, bool);
}

macro_rules! impl_lane {
    ($($t:ty => $signed:expr),* $(,)?) => {
        $(
            impl Lane for $t {
                const BITS: i32 = <$t>::BITS as i32;
                const SIGNED: bool = $signed;

                #[inline]
                fn to_i128(self) -> i128 {
                    self as i128
                }

                #[inline]
                fn wrap_i128(v: i128) -> Self {
                    v as Self
                }

                #[inline]
                fn clamp_i128(v: i128) -> (Self, bool) {
                    if v < Self::MIN as i128 {
                        (Self::MIN, true)
                    } else if v > Self::MAX as i128 {
                        (Self::MAX, true)
                    } else {
                        (v as Self, false)
                    }
                }
            }
        )*
    };
}

impl_lane! {
    i8 => true, i16 => true, i32 => true, i64 => true,
    u8 => false, u16 => false, u32 => false, u64 => false,
}

/// Saturating add. The flag is true when the result was clamped.
#[inline]
pub fn sat_add<T: Lane>(a: T, b: T) -> (T, bool) {
    T::clamp_i128(a.to_i128() + b.to_i128())
}

/// Saturating subtract.
#[inline]
pub fn sat_sub<T: Lane>(a: T, b: T) -> (T, bool) {
    T::clamp_i128(a.to_i128() - b.to_i128())
}

/// Saturating double-then-add, the `a + 2*b` form of the scalar
/// saturating multiplies. Both the doubling and the add can clamp.
pub fn sat_double_add<T: Lane>(a: T, b: T) -> (T, bool) {
    let (doubled, q1) = T::clamp_i128(b.to_i128() * 2);
    let (result, q2) = sat_add(a, doubled);
    (result, q1 || q2)
}

pub fn sat_double_sub<T: Lane>(a: T, b: T) -> (T, bool) {
    let (doubled, q1) = T::clamp_i128(b.to_i128() * 2);
    let (result, q2) = sat_sub(a, doubled);
    (result, q1 || q2)
}

/// Plain lane shift by a signed amount: positive shifts left, negative
/// shifts right. Amounts at or beyond the lane width drain to zero for
/// left and logical-right cases; an arithmetic right shift that far
/// fills with the sign bit.
pub fn vshl<T: Lane>(val: T, shift: i8) -> T {
    let s = shift as i32;
    if s >= T::BITS {
        T::wrap_i128(0)
    } else if s <= -T::BITS {
        if T::SIGNED {
            T::wrap_i128(val.to_i128() >> (T::BITS - 1))
        } else {
            T::wrap_i128(0)
        }
    } else if s < 0 {
        T::wrap_i128(val.to_i128() >> -s)
    } else {
        T::wrap_i128(val.to_i128() << s)
    }
}

/// Rounding lane shift: a right shift adds half of the discarded
/// weight before shifting. A right shift by exactly the lane width
/// leaves just the rounding bit (zero for signed lanes); anything
/// further is zero. Computed in the accumulator, so the case where the
/// bias carry would overflow a 64-bit intermediate still comes out
/// exact.
pub fn vrshl<T: Lane>(val: T, shift: i8) -> T {
    let s = shift as i32;
    if s >= T::BITS || s < -T::BITS {
        T::wrap_i128(0)
    } else if s < 0 {
        T::wrap_i128((val.to_i128() + (1i128 << (-s - 1))) >> -s)
    } else {
        T::wrap_i128(val.to_i128() << s)
    }
}

/// Saturating lane shift. Left shifts clamp when significant bits
/// would be lost; right shifts truncate and never clamp.
pub fn vqshl<T: Lane>(val: T, shift: i8) -> (T, bool) {
    let s = shift as i32;
    if s >= T::BITS {
        if val.to_i128() == 0 {
            (T::wrap_i128(0), false)
        } else if val.to_i128() < 0 {
            T::clamp_i128(i128::MIN)
        } else {
            T::clamp_i128(i128::MAX)
        }
    } else if s <= -T::BITS {
        if T::SIGNED {
            (T::wrap_i128(val.to_i128() >> (T::BITS - 1)), false)
        } else {
            (T::wrap_i128(0), false)
        }
    } else if s < 0 {
        (T::wrap_i128(val.to_i128() >> -s), false)
    } else {
        T::clamp_i128(val.to_i128() << s)
    }
}

/// Saturating rounding lane shift.
pub fn vqrshl<T: Lane>(val: T, shift: i8) -> (T, bool) {
    let s = shift as i32;
    if s >= T::BITS {
        if val.to_i128() == 0 {
            (T::wrap_i128(0), false)
        } else if val.to_i128() < 0 {
            T::clamp_i128(i128::MIN)
        } else {
            T::clamp_i128(i128::MAX)
        }
    } else if s < -T::BITS {
        (T::wrap_i128(0), false)
    } else if s < 0 {
        (T::wrap_i128((val.to_i128() + (1i128 << (-s - 1))) >> -s), false)
    } else {
        T::clamp_i128(val.to_i128() << s)
    }
}

/// Narrow a wide lane to a narrower type with saturation. Works across
/// signedness: a signed wide value narrowed to an unsigned type clamps
/// negatives to zero.
#[inline]
pub fn narrow_sat<W: Lane, N: Lane>(val: W) -> (N, bool) {
    N::clamp_i128(val.to_i128())
}

/// Widening multiply; the product of two lanes always fits the
/// accumulator.
#[inline]
pub fn widen_mul<T: Lane>(a: T, b: T) -> i128 {
    a.to_i128() * b.to_i128()
}

/// Absolute difference, computed wide so the asymmetric extreme does
/// not overflow.
#[inline]
pub fn abd<T: Lane>(a: T, b: T) -> i128 {
    (a.to_i128() - b.to_i128()).abs()
}

// ---------------------------------------------------------------------------
// Float compares
// ---------------------------------------------------------------------------

/// Outcome of a float compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatRelation {
    Equal,
    Less,
    Greater,
    /// At least one operand was NaN.
    Unordered,
}

#[inline]
fn is_signaling_f32(x: f32) -> bool {
    x.is_nan() && x.to_bits() & (1 << 22) == 0
}

#[inline]
fn is_signaling_f64(x: f64) -> bool {
    x.is_nan() && x.to_bits() & (1 << 51) == 0
}

/// Compare two singles. The quiet form (`signaling` false) raises the
/// invalid-operation flag only for signaling NaN operands; the
/// signaling form raises it for any unordered pair.
pub fn cmp_f32(a: f32, b: f32, signaling: bool) -> (FloatRelation, bool) {
    match a.partial_cmp(&b) {
        Some(core::cmp::Ordering::Equal) => (FloatRelation::Equal, false),
        Some(core::cmp::Ordering::Less) => (FloatRelation::Less, false),
        Some(core::cmp::Ordering::Greater) => (FloatRelation::Greater, false),
        None => {
            let invalid = signaling || is_signaling_f32(a) || is_signaling_f32(b);
            (FloatRelation::Unordered, invalid)
        }
    }
}

/// Compare two doubles; same contract as [`cmp_f32`].
pub fn cmp_f64(a: f64, b: f64, signaling: bool) -> (FloatRelation, bool) {
    match a.partial_cmp(&b) {
        Some(core::cmp::Ordering::Equal) => (FloatRelation::Equal, false),
        Some(core::cmp::Ordering::Less) => (FloatRelation::Less, false),
        Some(core::cmp::Ordering::Greater) => (FloatRelation::Greater, false),
        None => {
            let invalid = signaling || is_signaling_f64(a) || is_signaling_f64(b);
            (FloatRelation::Unordered, invalid)
        }
    }
}

/// Map a compare outcome onto condition flags: equal sets Z and C,
/// less sets N, greater sets C, unordered sets C and V.
pub fn relation_flags(rel: FloatRelation) -> Flags {
    let mut f = Flags::default();
    match rel {
        FloatRelation::Equal => {
            f.z = true;
            f.c = true;
        }
        FloatRelation::Less => f.n = true,
        FloatRelation::Greater => f.c = true,
        FloatRelation::Unordered => {
            f.c = true;
            f.v = true;
        }
    }
    f
}
