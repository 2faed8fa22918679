//! Element trait for mapping Rust types to ElementType

use super::ElementType;
use bytemuck::{Pod, Zeroable};
use std::ops::{Add, Div, Mul, Sub};

/// Trait for types that can be elements of a tiled matrix
///
/// This trait connects Rust's type system to tilr's runtime element-type
/// tags. It is implemented for exactly the closed set of supported types:
/// `f32`, `f64`, [`Complex64`](super::Complex64),
/// [`Complex128`](super::Complex128), and `i32`.
///
/// # Bounds
/// - `Copy + Clone + Send + Sync + 'static` - Basic trait requirements
/// - `Pod + Zeroable` - Safe memory transmutation (bytemuck)
/// - `Add + Sub + Mul + Div` - Arithmetic operations (Output = Self)
/// - `PartialOrd` - Comparison for max-style reductions
pub trait Element:
    Copy
    + Clone
    + Send
    + Sync
    + Pod
    + Zeroable
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + PartialOrd
{
    /// The corresponding ElementType for this Rust type
    const DTYPE: ElementType;

    /// Convert to f64 for generic numeric operations
    ///
    /// For complex types this returns the **magnitude** (|z|), not the real
    /// part, consistent with `PartialOrd` comparing by magnitude. Reduction
    /// kernels rely on this: `x.to_f64().abs()` is the absolute value for
    /// every supported type.
    fn to_f64(self) -> f64;

    /// Convert from f64 to this type
    ///
    /// For complex types this creates a real number (imaginary part = 0).
    fn from_f64(v: f64) -> Self;

    /// Zero value
    fn zero() -> Self;

    /// One value
    fn one() -> Self;
}

impl Element for f32 {
    const DTYPE: ElementType = ElementType::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }
}

impl Element for f64 {
    const DTYPE: ElementType = ElementType::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }
}

impl Element for i32 {
    const DTYPE: ElementType = ElementType::I32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as i32
    }

    #[inline]
    fn zero() -> Self {
        0
    }

    #[inline]
    fn one() -> Self {
        1
    }
}

impl Element for super::complex::Complex64 {
    const DTYPE: ElementType = ElementType::C64;

    /// Returns magnitude (|z|) - a lossy conversion.
    /// For the real part, use `.re` directly.
    #[inline]
    fn to_f64(self) -> f64 {
        self.magnitude() as f64
    }

    /// Creates a real complex number (im = 0)
    #[inline]
    fn from_f64(v: f64) -> Self {
        Self::new(v as f32, 0.0)
    }

    #[inline]
    fn zero() -> Self {
        Self::ZERO
    }

    #[inline]
    fn one() -> Self {
        Self::ONE
    }
}

impl Element for super::complex::Complex128 {
    const DTYPE: ElementType = ElementType::C128;

    /// Returns magnitude (|z|) - a lossy conversion.
    /// For the real part, use `.re` directly.
    #[inline]
    fn to_f64(self) -> f64 {
        self.magnitude()
    }

    /// Creates a real complex number (im = 0)
    #[inline]
    fn from_f64(v: f64) -> Self {
        Self::new(v, 0.0)
    }

    #[inline]
    fn zero() -> Self {
        Self::ZERO
    }

    #[inline]
    fn one() -> Self {
        Self::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Complex64, Complex128};
    use super::*;

    #[test]
    fn test_element_dtype() {
        assert_eq!(f32::DTYPE, ElementType::F32);
        assert_eq!(f64::DTYPE, ElementType::F64);
        assert_eq!(Complex64::DTYPE, ElementType::C64);
        assert_eq!(Complex128::DTYPE, ElementType::C128);
        assert_eq!(i32::DTYPE, ElementType::I32);
    }

    #[test]
    fn test_element_conversions() {
        assert_eq!(f32::from_f64(2.5).to_f64(), 2.5f32 as f64);
        assert_eq!(i32::from_f64(42.0), 42);
    }

    #[test]
    fn test_complex_to_f64_is_magnitude() {
        let z = Complex128::new(3.0, 4.0);
        assert_eq!(z.to_f64(), 5.0);
        let w = Complex64::new(0.0, -2.0);
        assert_eq!(w.to_f64(), 2.0);
    }
}
