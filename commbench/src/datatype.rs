//! Element types that can be moved by a transport and the reduction
//! operators applied to them.
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Reduction operator for all-reduce.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    #[default]
    Sum,
    Max,
    Min,
}

/// Marker for types the active transports know how to put on the wire.
#[cfg(feature = "rsmpi")]
pub trait Transferable: mpi::traits::Equivalence {}
#[cfg(feature = "rsmpi")]
impl<T: mpi::traits::Equivalence> Transferable for T {}

/// Marker for types the active transports know how to put on the wire.
#[cfg(not(feature = "rsmpi"))]
pub trait Transferable {}
#[cfg(not(feature = "rsmpi"))]
impl<T> Transferable for T {}

/// Plain element type of a payload buffer.
pub trait Element:
    Transferable + Copy + Default + Debug + PartialEq + Send + Sync + 'static
{
    /// Name used in reports.
    const NAME: &'static str;

    /// Value used to fill buffers (usually the rank of the sender).
    fn from_index(index: usize) -> Self;

    /// Apply the reduction operator to a pair of values.
    fn combine(self, other: Self, op: ReduceOp) -> Self;
}

macro_rules! float_element {
    ($ty:ty, $name:expr) => {
        impl Element for $ty {
            const NAME: &'static str = $name;

            fn from_index(index: usize) -> Self {
                index as $ty
            }

            fn combine(self, other: Self, op: ReduceOp) -> Self {
                match op {
                    ReduceOp::Sum => self + other,
                    ReduceOp::Max => self.max(other),
                    ReduceOp::Min => self.min(other),
                }
            }
        }
    };
}

// Integer sums wrap, matching what the wire-level reductions do.
macro_rules! int_element {
    ($ty:ty, $name:expr) => {
        impl Element for $ty {
            const NAME: &'static str = $name;

            fn from_index(index: usize) -> Self {
                index as $ty
            }

            fn combine(self, other: Self, op: ReduceOp) -> Self {
                match op {
                    ReduceOp::Sum => self.wrapping_add(other),
                    ReduceOp::Max => self.max(other),
                    ReduceOp::Min => self.min(other),
                }
            }
        }
    };
}

float_element!(f32, "f32");
float_element!(f64, "f64");
int_element!(i32, "i32");
int_element!(i64, "i64");
int_element!(u8, "u8");

/// Fold `other` into `acc` element-wise.
pub fn reduce_into<T: Element>(acc: &mut [T], other: &[T], op: ReduceOp) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a = a.combine(*b, op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_sum_and_max() {
        let mut acc = vec![1.0f32, 5.0, -2.0];
        reduce_into(&mut acc, &[2.0, 1.0, 4.0], ReduceOp::Sum);
        assert_eq!(acc, vec![3.0, 6.0, 2.0]);
        reduce_into(&mut acc, &[0.0, 7.0, 1.0], ReduceOp::Max);
        assert_eq!(acc, vec![3.0, 7.0, 2.0]);
    }

    #[test]
    fn integer_sum_wraps() {
        assert_eq!(250u8.combine(10, ReduceOp::Sum), 4);
        assert_eq!(i32::MAX.combine(1, ReduceOp::Sum), i32::MIN);
        assert_eq!(3i64.combine(-8, ReduceOp::Min), -8);
    }
}
