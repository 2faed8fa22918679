//! Stock per-tile operators
//!
//! Ready-made operator values for the common cases: copying `A` into `B`,
//! scaled accumulation, and in-place scaling. All of them work over the
//! logical extent of a tile only, so padding rows and columns of edge tiles
//! are never touched.

use crate::dispatch_element;
use crate::dtype::Element;
use crate::matrix::{TileView, TileViewMut};
use crate::ops::{BinaryTileOp, UnaryTileOp};
use std::any::Any;
use std::sync::Arc;

/// Scalar argument blob for [`scaled_add_operator`] and [`scale_operator`]
#[derive(Copy, Clone, Debug)]
pub struct ScaleArgs {
    /// Scale factor applied to the source operand
    pub alpha: f64,
}

fn alpha_of(args: &(dyn Any + Send + Sync)) -> f64 {
    // operators without a ScaleArgs blob behave as alpha = 1
    args.downcast_ref::<ScaleArgs>().map_or(1.0, |s| s.alpha)
}

fn for_each_logical<T: Element>(
    a: &TileView<'_>,
    b: &mut TileViewMut<'_>,
    mut f: impl FnMut(T, &mut T),
) {
    let rows = a.rows().min(b.rows());
    let cols = a.cols().min(b.cols());
    let (sa, sb) = (a.stride(), b.stride());
    let src = a.as_slice::<T>();
    let dst = b.as_slice_mut::<T>();
    for i in 0..rows {
        for j in 0..cols {
            f(src[i * sa + j], &mut dst[i * sb + j]);
        }
    }
}

/// Operator that overwrites the `B` tile with the `A` tile
pub fn copy_operator() -> BinaryTileOp {
    Arc::new(|_ctx, a, b, _args, _region, _m, _n| {
        debug_assert_eq!(a.dtype(), b.dtype());
        dispatch_element!(a.dtype(), T => {
            for_each_logical::<T>(a, b, |x, y| *y = x);
        });
    })
}

/// Operator computing `B += alpha * A`, with `alpha` taken from [`ScaleArgs`]
pub fn scaled_add_operator() -> BinaryTileOp {
    Arc::new(|_ctx, a, b, args, _region, _m, _n| {
        debug_assert_eq!(a.dtype(), b.dtype());
        let alpha = alpha_of(args);
        dispatch_element!(a.dtype(), T => {
            let alpha = T::from_f64(alpha);
            for_each_logical::<T>(a, b, |x, y| *y = *y + alpha * x);
        });
    })
}

/// In-place operator computing `A *= alpha`, with `alpha` taken from [`ScaleArgs`]
pub fn scale_operator() -> UnaryTileOp {
    Arc::new(|_ctx, a, args, _region, _m, _n| {
        let alpha = alpha_of(args);
        dispatch_element!(a.dtype(), T => {
            let alpha = T::from_f64(alpha);
            let (rows, cols, stride) = (a.rows(), a.cols(), a.stride());
            let s = a.as_slice_mut::<T>();
            for i in 0..rows {
                for j in 0..cols {
                    s[i * stride + j] = s[i * stride + j] * alpha;
                }
            }
        });
    })
}
