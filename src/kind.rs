use std::fmt;

use crate::errors::{MirrorError, Result};

/// Packed managed encoding of a logical `false`.
pub const MANAGED_FALSE: u8 = 0;
/// Packed managed encoding of a logical `true`.
pub const MANAGED_TRUE: u8 = 1;
/// Packed managed encoding of a missing logical value.
pub const MANAGED_NA: u8 = 255;

/// Native sentinel for a missing integer or logical value.
pub const NATIVE_NA: i32 = i32::MIN;

/// Element kinds that can be mirrored into native memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Integer,
    Real,
    Raw,
    /// Packed one-byte-per-element booleans with a missing-value sentinel.
    Logical,
    /// Immutable text, handed out as a NUL-terminated copy.
    Char,
}

impl ElementKind {
    pub const ALL: [ElementKind; 5] = [
        ElementKind::Integer,
        ElementKind::Real,
        ElementKind::Raw,
        ElementKind::Logical,
        ElementKind::Char,
    ];

    /// Decode the type code used by the C ABI.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            13 => Ok(ElementKind::Integer),
            14 => Ok(ElementKind::Real),
            24 => Ok(ElementKind::Raw),
            10 => Ok(ElementKind::Logical),
            9 => Ok(ElementKind::Char),
            other => Err(MirrorError::UnexpectedKind(other.to_string())),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ElementKind::Integer => 13,
            ElementKind::Real => 14,
            ElementKind::Raw => 24,
            ElementKind::Logical => 10,
            ElementKind::Char => 9,
        }
    }

    /// Size in bytes of one element as seen by native code.
    pub fn native_width(self) -> usize {
        match self {
            ElementKind::Integer | ElementKind::Logical => std::mem::size_of::<i32>(),
            ElementKind::Real => std::mem::size_of::<f64>(),
            ElementKind::Raw | ElementKind::Char => std::mem::size_of::<u8>(),
        }
    }

    /// Whether the mirror is backed by a managed primitive array.
    pub fn has_backing_array(self) -> bool {
        !matches!(self, ElementKind::Char)
    }

    /// Whether extraction can hand out the runtime's pinned storage directly.
    pub fn is_pass_through(self) -> bool {
        matches!(
            self,
            ElementKind::Integer | ElementKind::Real | ElementKind::Raw
        )
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Integer => "integer",
            ElementKind::Real => "real",
            ElementKind::Raw => "raw",
            ElementKind::Logical => "logical",
            ElementKind::Char => "char",
        };
        f.write_str(name)
    }
}

/// Widen one packed managed logical to its native representation.
#[inline]
pub fn widen_logical(value: u8) -> i32 {
    match value {
        MANAGED_FALSE => 0,
        MANAGED_TRUE => 1,
        _ => NATIVE_NA,
    }
}

/// Narrow one native logical back to the packed managed encoding.
///
/// The flag is `false` when the value had to be stored as missing.
#[inline]
pub fn narrow_logical(value: i32) -> (u8, bool) {
    match value {
        0 => (MANAGED_FALSE, true),
        1 => (MANAGED_TRUE, true),
        _ => (MANAGED_NA, false),
    }
}

/// Widen a packed slice into `dst`. Lengths must match.
pub fn widen_logicals(src: &[u8], dst: &mut [i32]) {
    debug_assert_eq!(src.len(), dst.len());
    for (out, &value) in dst.iter_mut().zip(src) {
        *out = widen_logical(value);
    }
}

/// Narrow native logicals into `dst`, returning whether every value was 0 or 1.
pub fn narrow_logicals(src: &[i32], dst: &mut [u8]) -> bool {
    debug_assert_eq!(src.len(), dst.len());
    let mut complete = true;
    for (out, &value) in dst.iter_mut().zip(src) {
        let (byte, exact) = narrow_logical(value);
        *out = byte;
        complete &= exact;
    }
    complete
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(matches!(
            ElementKind::from_code(19),
            Err(MirrorError::UnexpectedKind(_))
        ));
    }

    #[test]
    fn test_native_width() {
        assert_eq!(ElementKind::Integer.native_width(), 4);
        assert_eq!(ElementKind::Logical.native_width(), 4);
        assert_eq!(ElementKind::Real.native_width(), 8);
        assert_eq!(ElementKind::Raw.native_width(), 1);
    }

    #[test]
    fn test_display_uses_lowercase_names() {
        let names: Vec<String> = ElementKind::ALL.iter().map(|kind| kind.to_string()).collect();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"logical".to_string()));
        assert_eq!(format!("{:?}", ElementKind::Real), "Real");
    }

    #[test]
    fn test_widen_maps_unknown_bytes_to_na() {
        assert_eq!(widen_logical(0), 0);
        assert_eq!(widen_logical(1), 1);
        assert_eq!(widen_logical(MANAGED_NA), NATIVE_NA);
        assert_eq!(widen_logical(7), NATIVE_NA);
    }

    #[test]
    fn test_narrow_flags_out_of_range() {
        let mut packed = [0u8; 4];
        assert!(narrow_logicals(&[0, 1, 1, 0], &mut packed));
        assert_eq!(packed, [0, 1, 1, 0]);

        assert!(!narrow_logicals(&[0, NATIVE_NA, 42, 1], &mut packed));
        assert_eq!(packed, [0, MANAGED_NA, MANAGED_NA, 1]);
    }
}
