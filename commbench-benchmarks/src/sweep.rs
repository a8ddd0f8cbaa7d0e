//! Message size sweep generation.
use crate::op::OpKind;
use crate::{BenchError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How element counts grow with the exponent.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepScale {
    /// `2^e` elements.
    #[default]
    Exponential,

    /// `e * linear_unit` elements.
    Linear,
}

/// Bounds of a size sweep.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SweepSpec {
    pub min_exponent: u32,
    pub max_exponent: u32,
    pub stride: u32,
    pub scale: SweepScale,
    pub linear_unit: usize,
}

/// Per-device memory available to the benchmark buffers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MemoryBudget {
    /// Total memory of the device holding the buffers.
    pub device_bytes: u64,

    /// Fraction of `device_bytes` the buffers may use.
    pub mem_factor: f64,
}

impl MemoryBudget {
    /// Bytes all local buffers may occupy together.
    pub fn usable_bytes(&self) -> u64 {
        (self.device_bytes as f64 * self.mem_factor) as u64
    }

    /// Largest per-buffer element count that keeps every local buffer for
    /// `op` within budget.
    pub fn max_elements(&self, op: OpKind, element_size: usize, world_size: usize) -> usize {
        let per_element = (element_size * op.buffer_factor(world_size)) as u64;
        if per_element == 0 {
            return 0;
        }
        usize::try_from(self.usable_bytes() / per_element).unwrap_or(usize::MAX)
    }

    /// Whether `elements` fits the budget for `op`.
    pub fn admits(&self, op: OpKind, elements: usize, element_size: usize, world_size: usize) -> bool {
        elements <= self.max_elements(op, element_size, world_size)
    }
}

/// Element count for a single exponent, `None` if it overflows.
fn element_count(spec: &SweepSpec, exponent: u32) -> Option<usize> {
    match spec.scale {
        SweepScale::Exponential => 1usize.checked_shl(exponent),
        SweepScale::Linear => (exponent as usize).checked_mul(spec.linear_unit),
    }
}

/// Element count used when not scanning: `2^exponent`.
pub fn fixed_elements(exponent: u32) -> Result<usize> {
    1usize.checked_shl(exponent).ok_or_else(|| {
        BenchError::Configuration(format!("2^{} elements overflows usize", exponent))
    })
}

/// Produce the strictly increasing element counts to benchmark for `op`,
/// clipped to what `budget` admits.
pub fn sweep_sizes(
    spec: &SweepSpec,
    budget: &MemoryBudget,
    op: OpKind,
    element_size: usize,
    world_size: usize,
) -> Result<Vec<usize>> {
    if spec.min_exponent > spec.max_exponent {
        return Err(BenchError::Configuration(format!(
            "minimum exponent {} exceeds maximum exponent {}",
            spec.min_exponent, spec.max_exponent
        )));
    }
    if spec.stride == 0 {
        return Err(BenchError::Configuration("sweep stride must be positive".to_string()));
    }
    if spec.scale == SweepScale::Linear && spec.linear_unit == 0 {
        return Err(BenchError::Configuration("linear sweep unit must be positive".to_string()));
    }

    let limit = budget.max_elements(op, element_size, world_size);
    let sizes: Vec<usize> = (spec.min_exponent..=spec.max_exponent)
        .step_by(spec.stride as usize)
        .map_while(|e| element_count(spec, e))
        .filter(|&count| count > 0)
        .take_while(|&count| count <= limit)
        .collect();

    if sizes.is_empty() {
        return Err(BenchError::Configuration(format!(
            "memory budget of {} bytes admits no {} payload between exponents {} and {}",
            budget.usable_bytes(),
            op,
            spec.min_exponent,
            spec.max_exponent
        )));
    }
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    fn spec(min: u32, max: u32) -> SweepSpec {
        SweepSpec {
            min_exponent: min,
            max_exponent: max,
            stride: 1,
            scale: SweepScale::Exponential,
            linear_unit: 1,
        }
    }

    fn budget(device_bytes: u64) -> MemoryBudget {
        MemoryBudget {
            device_bytes,
            mem_factor: 1.0,
        }
    }

    #[test]
    fn exponential_sweep_is_powers_of_two() {
        let sizes = sweep_sizes(&spec(2, 6), &budget(GIB), OpKind::Broadcast, 4, 2).unwrap();
        assert_eq!(sizes, vec![4, 8, 16, 32, 64]);
    }

    #[test]
    fn sweep_respects_budget_for_every_op() {
        let mem = MemoryBudget {
            device_bytes: 1 << 20,
            mem_factor: 0.3,
        };
        for op in OpKind::ALL {
            for world_size in [2, 3, 4, 8] {
                let sizes = sweep_sizes(&spec(0, 40), &mem, op, 4, world_size).unwrap();
                assert!(!sizes.is_empty());
                assert!(sizes.windows(2).all(|w| w[0] < w[1]));
                for &count in &sizes {
                    let bytes = (count * 4 * op.buffer_factor(world_size)) as u64;
                    assert!(bytes <= mem.usable_bytes(), "{} {} {}", op, world_size, count);
                }
            }
        }
    }

    #[test]
    fn all_gather_budget_scales_with_world_size() {
        // 1 MiB total, f32, 4 ranks: 5 buffers of 4 bytes per element.
        let sizes = sweep_sizes(&spec(0, 30), &budget(1 << 20), OpKind::AllGather, 4, 4).unwrap();
        assert_eq!(*sizes.last().unwrap(), 1 << 15);
        let sizes = sweep_sizes(&spec(0, 30), &budget(1 << 20), OpKind::AllReduce, 4, 4).unwrap();
        assert_eq!(*sizes.last().unwrap(), 1 << 17);
    }

    #[test]
    fn stride_skips_exponents() {
        let mut s = spec(1, 9);
        s.stride = 4;
        let sizes = sweep_sizes(&s, &budget(GIB), OpKind::AllReduce, 4, 2).unwrap();
        assert_eq!(sizes, vec![2, 32, 512]);
    }

    #[test]
    fn linear_sweep_skips_zero() {
        let s = SweepSpec {
            min_exponent: 0,
            max_exponent: 3,
            stride: 1,
            scale: SweepScale::Linear,
            linear_unit: 1000,
        };
        let sizes = sweep_sizes(&s, &budget(GIB), OpKind::AllGather, 4, 2).unwrap();
        assert_eq!(sizes, vec![1000, 2000, 3000]);
    }

    #[test]
    fn sweep_is_restartable() {
        let a = sweep_sizes(&spec(3, 12), &budget(GIB), OpKind::AllToAll, 8, 4).unwrap();
        let b = sweep_sizes(&spec(3, 12), &budget(GIB), OpKind::AllToAll, 8, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn oversized_exponents_stop_the_sweep() {
        let sizes = sweep_sizes(&spec(60, 80), &budget(u64::MAX), OpKind::Pt2pt, 1, 2).unwrap();
        assert_eq!(sizes.last().copied(), Some(1usize << 63));
    }

    #[test]
    fn invalid_bounds_are_configuration_errors() {
        assert!(matches!(
            sweep_sizes(&spec(8, 4), &budget(GIB), OpKind::AllReduce, 4, 2),
            Err(BenchError::Configuration(_))
        ));
        let mut s = spec(1, 4);
        s.stride = 0;
        assert!(matches!(
            sweep_sizes(&s, &budget(GIB), OpKind::AllReduce, 4, 2),
            Err(BenchError::Configuration(_))
        ));
    }

    #[test]
    fn empty_budget_is_configuration_error() {
        assert!(matches!(
            sweep_sizes(&spec(10, 20), &budget(1024), OpKind::AllReduce, 4, 2),
            Err(BenchError::Configuration(_))
        ));
    }

    #[test]
    fn fixed_size_is_power_of_two() {
        assert_eq!(fixed_elements(10).unwrap(), 1024);
        assert!(fixed_elements(200).is_err());
    }
}
