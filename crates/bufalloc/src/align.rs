//! Alignment arithmetic shared by every allocator in this crate.
//!
//! All alignments handled here must be powers of two, which lets the modulo
//! be computed with a single mask (`value & (align - 1)`).

use snafu::ensure;

use crate::error::{AllocError, InvalidAlignmentSnafu};

/// Alignment used by the `alloc`/`resize` convenience methods.
///
/// Two pointer widths, which is enough for every primitive type on the
/// supported targets.
pub const DEFAULT_ALIGNMENT: usize = 2 * size_of::<*const ()>();

/// Returns `true` if `x` has at most one bit set.
///
/// `0` is treated as aligned by convention; use [`validate_align`] when an
/// alignment argument must be rejected for being zero.
#[must_use]
pub const fn is_power_of_two(x: usize) -> bool {
    (x & x.wrapping_sub(1)) == 0
}

/// Checks that `align` is usable as an alignment (nonzero power of two).
pub fn validate_align(align: usize) -> Result<(), AllocError> {
    ensure!(
        align != 0 && is_power_of_two(align),
        InvalidAlignmentSnafu { align }
    );
    Ok(())
}

/// Rounds `value` up to the next multiple of `align`.
///
/// Returns `None` if the result does not fit in `usize`.
///
/// # Panics
///
/// Panics if `align` is zero or not a power of two.
#[must_use]
pub const fn checked_align_forward(value: usize, align: usize) -> Option<usize> {
    assert!(
        align != 0 && is_power_of_two(align),
        "alignment must be a power of two"
    );

    let modulo = value & (align - 1);
    if modulo == 0 {
        return Some(value);
    }
    value.checked_add(align - modulo)
}

/// Rounds `value` up to the next multiple of `align`.
///
/// The result `r` satisfies `r % align == 0`, `r >= value` and
/// `r - value < align`.
///
/// # Panics
///
/// Panics if `align` is zero or not a power of two, or if the aligned value
/// overflows `usize`.
#[must_use]
pub const fn align_forward(value: usize, align: usize) -> usize {
    match checked_align_forward(value, align) {
        Some(aligned) => aligned,
        None => panic!("aligned value overflows usize"),
    }
}

/// Rounds a length up to the next multiple of `align`.
///
/// Used for chunk sizes rather than addresses.
///
/// # Panics
///
/// Same conditions as [`align_forward`].
#[must_use]
pub const fn align_forward_size(size: usize, align: usize) -> usize {
    align_forward(size, align)
}

/// Moves `ptr` forward to the next address that is a multiple of `align`.
///
/// The returned pointer keeps the provenance of `ptr`.
///
/// # Panics
///
/// Same conditions as [`align_forward`].
#[must_use]
pub fn align_forward_ptr(ptr: *mut u8, align: usize) -> *mut u8 {
    ptr.map_addr(|addr| align_forward(addr, align))
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_is_power_of_two() {
        for shift in 0..usize::BITS {
            assert!(is_power_of_two(1 << shift));
        }
        assert!(is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(!is_power_of_two(12));
        assert!(!is_power_of_two(usize::MAX));
    }

    #[test]
    fn test_validate_align() {
        assert!(validate_align(1).is_ok());
        assert!(validate_align(128).is_ok());
        assert!(validate_align(0).unwrap_err().is_invalid_alignment());
        assert!(validate_align(24).unwrap_err().is_invalid_alignment());
    }

    #[test]
    fn test_align_forward() {
        assert_eq!(align_forward(0, 8), 0);
        assert_eq!(align_forward(1, 8), 8);
        assert_eq!(align_forward(8, 8), 8);
        assert_eq!(align_forward(9, 8), 16);
        assert_eq!(align_forward(1000, 16), 1008);
        assert_eq!(align_forward(37, 1), 37);
    }

    #[test]
    fn test_align_forward_size() {
        assert_eq!(align_forward_size(8, 16), 16);
        assert_eq!(align_forward_size(24, 8), 24);
        assert_eq!(align_forward_size(25, 32), 32);
    }

    #[test]
    fn test_align_forward_ptr() {
        let mut bytes = [0_u8; 64];
        let base = bytes.as_mut_ptr();
        for offset in 0..32 {
            let ptr = base.wrapping_add(offset);
            let aligned = align_forward_ptr(ptr, 16);
            assert_eq!(aligned.addr() % 16, 0);
            assert!(aligned >= ptr);
            assert!(aligned.addr() - ptr.addr() < 16);
        }
    }

    #[test]
    fn test_checked_align_forward_overflow() {
        assert_eq!(checked_align_forward(usize::MAX, 1), Some(usize::MAX));
        assert_eq!(checked_align_forward(usize::MAX, 2), None);
        assert_eq!(checked_align_forward(usize::MAX - 15, 16), Some(usize::MAX - 15));
    }

    #[test]
    #[should_panic = "alignment must be a power of two"]
    fn test_align_forward_rejects_non_power_of_two() {
        let _ = align_forward(10, 12);
    }

    #[test]
    #[should_panic = "alignment must be a power of two"]
    fn test_align_forward_rejects_zero() {
        let _ = align_forward(10, 0);
    }

    proptest! {
        #[test]
        fn aligned_value_is_nearest_multiple(value in 0..usize::MAX / 2, shift in 0_u32..16) {
            let align = 1_usize << shift;
            let aligned = align_forward(value, align);
            prop_assert_eq!(aligned % align, 0);
            prop_assert!(aligned >= value);
            prop_assert!(aligned - value < align);
        }

        #[test]
        fn aligning_twice_is_identity(value in 0..usize::MAX / 2, shift in 0_u32..16) {
            let align = 1_usize << shift;
            let aligned = align_forward(value, align);
            prop_assert_eq!(align_forward(aligned, align), aligned);
        }
    }
}
