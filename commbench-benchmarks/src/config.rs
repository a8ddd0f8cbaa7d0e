//! Benchmark options and validated configuration.
use crate::format::{MetricFormatter, RateUnit};
use crate::op::OpKind;
use crate::sweep::{MemoryBudget, SweepScale, SweepSpec};
use crate::{BenchError, Result};
use clap::ValueEnum;
use commbench::{ExecMode, ReduceOp};
use serde::Deserialize;
use std::path::PathBuf;

/// Element type of the payload buffers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    #[default]
    F32,
    F64,
    I32,
    I64,
    U8,
}

/// Options as read from an options file or the command line.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkOptions {
    /// Operations to run, all of them when empty.
    pub ops: Vec<OpKind>,
    pub scan: bool,
    pub min_exponent: u32,
    pub max_exponent: u32,
    pub stride: u32,
    pub scale: SweepScale,
    pub linear_unit: usize,
    /// Exponent of the element count used when not scanning.
    pub elements_exponent: u32,
    pub mem_factor: f64,
    pub device_memory: u64,
    pub warmups: usize,
    pub trials: usize,
    pub async_op: bool,
    pub raw: bool,
    pub debug: bool,
    pub bw_unit: RateUnit,
    pub dtype: Dtype,
    pub reduce_op: ReduceOp,
    pub output_json: Option<PathBuf>,
}

impl Default for BenchmarkOptions {
    fn default() -> BenchmarkOptions {
        BenchmarkOptions {
            ops: vec![],
            scan: false,
            min_exponent: 1,
            max_exponent: 24,
            stride: 1,
            scale: SweepScale::Exponential,
            linear_unit: 1_000_000,
            elements_exponent: 24,
            mem_factor: 0.3,
            device_memory: 16 << 30,
            warmups: 5,
            trials: 50,
            async_op: false,
            raw: false,
            debug: false,
            bw_unit: RateUnit::Gbps,
            dtype: Dtype::F32,
            reduce_op: ReduceOp::Sum,
            output_json: None,
        }
    }
}

/// Payload selection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PayloadMode {
    /// A single run of `2^exponent` elements.
    Fixed { exponent: u32 },

    /// A sweep over increasing sizes.
    Scan(SweepSpec),
}

/// Validated, read-only configuration of one invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkConfig {
    pub ops: Vec<OpKind>,
    pub payload: PayloadMode,
    pub budget: MemoryBudget,
    pub warmups: usize,
    pub trials: usize,
    pub mode: ExecMode,
    pub raw: bool,
    pub debug: bool,
    pub bw_unit: RateUnit,
    pub dtype: Dtype,
    pub reduce_op: ReduceOp,
    pub output_json: Option<PathBuf>,
}

impl BenchmarkConfig {
    pub fn from_options(opts: BenchmarkOptions) -> Result<BenchmarkConfig> {
        if opts.trials == 0 {
            return Err(BenchError::Configuration("trials must be positive".to_string()));
        }
        if !(opts.mem_factor > 0.0 && opts.mem_factor <= 1.0) {
            return Err(BenchError::Configuration(format!(
                "mem_factor must be in (0, 1], got {}",
                opts.mem_factor
            )));
        }
        let payload = if opts.scan {
            if opts.min_exponent > opts.max_exponent {
                return Err(BenchError::Configuration(format!(
                    "minimum exponent {} exceeds maximum exponent {}",
                    opts.min_exponent, opts.max_exponent
                )));
            }
            if opts.stride == 0 {
                return Err(BenchError::Configuration("stride must be positive".to_string()));
            }
            PayloadMode::Scan(SweepSpec {
                min_exponent: opts.min_exponent,
                max_exponent: opts.max_exponent,
                stride: opts.stride,
                scale: opts.scale,
                linear_unit: opts.linear_unit,
            })
        } else {
            PayloadMode::Fixed {
                exponent: opts.elements_exponent,
            }
        };

        let mut ops = vec![];
        for op in opts.ops {
            if !ops.contains(&op) {
                ops.push(op);
            }
        }
        if ops.is_empty() {
            ops = OpKind::ALL.to_vec();
        }

        Ok(BenchmarkConfig {
            ops,
            payload,
            budget: MemoryBudget {
                device_bytes: opts.device_memory,
                mem_factor: opts.mem_factor,
            },
            warmups: opts.warmups,
            trials: opts.trials,
            mode: ExecMode::from_async_flag(opts.async_op),
            raw: opts.raw,
            debug: opts.debug,
            bw_unit: opts.bw_unit,
            dtype: opts.dtype,
            reduce_op: opts.reduce_op,
            output_json: opts.output_json,
        })
    }

    pub fn formatter(&self) -> MetricFormatter {
        MetricFormatter::new(self.raw, self.bw_unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_every_op_once() {
        let config = BenchmarkConfig::from_options(BenchmarkOptions::default()).unwrap();
        assert_eq!(config.ops, OpKind::ALL.to_vec());
        assert_eq!(config.payload, PayloadMode::Fixed { exponent: 24 });
        assert_eq!(config.mode, ExecMode::Blocking);
        assert_eq!((config.warmups, config.trials), (5, 50));
    }

    #[test]
    fn options_from_yaml() {
        let yaml = "
ops: [all_gather, pt2pt, all_gather]
scan: true
min_exponent: 4
max_exponent: 12
async_op: true
bw_unit: GBps
dtype: f64
";
        let opts: BenchmarkOptions = serde_yaml::from_str(yaml).unwrap();
        let config = BenchmarkConfig::from_options(opts).unwrap();
        assert_eq!(config.ops, vec![OpKind::AllGather, OpKind::Pt2pt]);
        assert_eq!(config.mode, ExecMode::Async);
        assert_eq!(config.bw_unit, RateUnit::GBps);
        assert_eq!(config.dtype, Dtype::F64);
        match config.payload {
            PayloadMode::Scan(spec) => {
                assert_eq!((spec.min_exponent, spec.max_exponent, spec.stride), (4, 12, 1));
            }
            other => panic!("unexpected payload mode {:?}", other),
        }
    }

    #[test]
    fn unknown_op_in_yaml_is_rejected() {
        let result: std::result::Result<BenchmarkOptions, _> = serde_yaml::from_str("ops: [reduce_scatter]");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_options_are_configuration_errors() {
        let mut opts = BenchmarkOptions::default();
        opts.trials = 0;
        assert!(matches!(BenchmarkConfig::from_options(opts), Err(BenchError::Configuration(_))));

        let mut opts = BenchmarkOptions::default();
        opts.scan = true;
        opts.min_exponent = 10;
        opts.max_exponent = 2;
        assert!(matches!(BenchmarkConfig::from_options(opts), Err(BenchError::Configuration(_))));

        let mut opts = BenchmarkOptions::default();
        opts.mem_factor = 1.5;
        assert!(matches!(BenchmarkConfig::from_options(opts), Err(BenchError::Configuration(_))));
    }
}
