//! Element type system for tilr matrices
//!
//! This module provides the `ElementType` enum representing the closed set of
//! tile element types, along with the `Element` trait connecting them to Rust
//! scalar types and the `dispatch_element!` macro for runtime dispatch.

pub mod complex;
mod element;

pub use complex::{Complex64, Complex128};
pub use element::Element;

use std::fmt;

/// Element types supported by tiled matrices
///
/// This is a closed set: every tile of a matrix holds elements of exactly one
/// of these types, and the tag selects the byte layout of any tile that is
/// packed for transfer between processes. Using an enum (rather than generics
/// on the matrix) keeps graph builders monomorphic; typed access happens at
/// the tile-view level.
///
/// # Discriminant Values (Serialization Stability)
///
/// The discriminant values are **stable**: F32=0, F64=1, C64=2, C128=3,
/// I32=4. Existing values are never changed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    /// 32-bit floating point
    F32 = 0,
    /// 64-bit floating point
    F64 = 1,
    /// 64-bit complex (two f32: re, im)
    C64 = 2,
    /// 128-bit complex (two f64: re, im)
    C128 = 3,
    /// 32-bit signed integer
    I32 = 4,
}

impl ElementType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::C128 => 16,
            Self::F64 | Self::C64 => 8,
            Self::F32 | Self::I32 => 4,
        }
    }

    /// Returns true if this is a complex number type
    #[inline]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::C64 | Self::C128)
    }

    /// Returns true if this is a floating point type (real, not complex)
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns true if this is an integer type
    #[inline]
    pub const fn is_int(self) -> bool {
        matches!(self, Self::I32)
    }

    /// Short name for display (e.g., "f64", "c128")
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::C64 => "c64",
            Self::C128 => "c128",
            Self::I32 => "i32",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Macro for runtime element-type dispatch to typed code.
///
/// Takes an `ElementType` value and executes a code block with `T` bound to
/// the corresponding Rust type. The set is closed, so every arm is covered
/// and no error case exists.
///
/// ```ignore
/// dispatch_element!(view.dtype(), T => {
///     let s = view.as_slice::<T>();
///     // ...
/// });
/// ```
#[macro_export]
macro_rules! dispatch_element {
    ($dtype:expr, $T:ident => $body:block) => {
        match $dtype {
            $crate::dtype::ElementType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::ElementType::F64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::ElementType::C64 => {
                type $T = $crate::dtype::Complex64;
                $body
            }
            $crate::dtype::ElementType::C128 => {
                type $T = $crate::dtype::Complex128;
                $body
            }
            $crate::dtype::ElementType::I32 => {
                type $T = i32;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_size() {
        assert_eq!(ElementType::F32.size_in_bytes(), 4);
        assert_eq!(ElementType::F64.size_in_bytes(), 8);
        assert_eq!(ElementType::C64.size_in_bytes(), 8);
        assert_eq!(ElementType::C128.size_in_bytes(), 16);
        assert_eq!(ElementType::I32.size_in_bytes(), 4);
    }

    #[test]
    fn test_element_type_categories() {
        assert!(ElementType::C64.is_complex());
        assert!(ElementType::C128.is_complex());
        assert!(!ElementType::F64.is_complex());
        assert!(ElementType::F32.is_float());
        assert!(!ElementType::I32.is_float());
        assert!(ElementType::I32.is_int());
    }

    #[test]
    fn test_dispatch_covers_every_type() {
        for dtype in [
            ElementType::F32,
            ElementType::F64,
            ElementType::C64,
            ElementType::C128,
            ElementType::I32,
        ] {
            let size = dispatch_element!(dtype, T => { std::mem::size_of::<T>() });
            assert_eq!(size, dtype.size_in_bytes());
        }
    }

    #[test]
    fn test_short_names() {
        assert_eq!(ElementType::F64.short_name(), "f64");
        assert_eq!(ElementType::C128.to_string(), "c128");
    }
}
