use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

mod buffer;
pub use buffer::{BufferDesc, Payload};
mod bw;
pub use bw::{bandwidth, bus_factor, traffic_bytes, Bandwidth};
pub mod collect;
pub use collect::{LogAggregator, LogRecord, RunMetadata};
mod config;
pub use config::{BenchmarkConfig, BenchmarkOptions, Dtype, PayloadMode};
mod error;
pub use error::{BenchError, Result};
mod format;
pub use format::{human_bytes, parse_human_bytes, MetricFormatter, RateUnit};
mod harness;
pub use harness::TrialHarness;
mod launch;
pub use launch::{launch, RankTask};
mod op;
pub use op::OpKind;
mod probe;
pub use probe::{all_gather_probe, ProbeReport};
mod report;
pub use report::Reporter;
mod runner;
pub use runner::{check_world_size, run_benchmarks, OperationRunner, SweepReport};
mod sample;
pub use sample::{MetricSample, TrialResult};
mod sweep;
pub use sweep::{fixed_elements, sweep_sizes, MemoryBudget, SweepScale, SweepSpec};

/// Benchmark args. Anything given here overrides the options file.
#[derive(Parser, Debug)]
#[command(about = "Measure collective communication bandwidth")]
pub struct BenchArgs {
    /// Path for benchmark options file (YAML).
    #[arg(short, long)]
    pub options_path: Option<PathBuf>,

    /// Transport to run over.
    #[arg(value_enum, short, long, default_value_t = TransportKind::Local)]
    pub transport: TransportKind,

    /// Number of ranks for the local transport.
    #[arg(long, default_value_t = 2)]
    pub local_ranks: usize,

    /// Operations to benchmark, comma separated (default: all).
    #[arg(value_enum, long, value_delimiter = ',')]
    pub ops: Vec<OpKind>,

    /// Sweep over payload sizes instead of running a single size.
    #[arg(long)]
    pub scan: bool,

    #[arg(long)]
    pub min_exponent: Option<u32>,

    #[arg(long)]
    pub max_exponent: Option<u32>,

    #[arg(long)]
    pub stride: Option<u32>,

    /// Spacing of sweep sizes.
    #[arg(value_enum, long)]
    pub scale: Option<SweepScale>,

    /// Element count step for linear sweeps.
    #[arg(long)]
    pub linear_unit: Option<usize>,

    /// Single-run payload is `2^elements_exponent` elements.
    #[arg(long)]
    pub elements_exponent: Option<u32>,

    #[arg(long)]
    pub warmups: Option<usize>,

    #[arg(long)]
    pub trials: Option<usize>,

    /// Issue non-blocking calls and wait before stopping the timer.
    #[arg(long)]
    pub async_op: bool,

    /// Print raw numbers instead of human-readable units.
    #[arg(long)]
    pub raw: bool,

    /// Print input and result buffers of every rank.
    #[arg(long)]
    pub debug: bool,

    /// Fraction of device memory the payload buffers may take.
    #[arg(long)]
    pub mem_factor: Option<f64>,

    /// Device memory, in bytes or with a unit (e.g. "16 GB").
    #[arg(long, value_parser = parse_byte_size)]
    pub device_memory: Option<u64>,

    #[arg(value_enum, long)]
    pub dtype: Option<Dtype>,

    #[arg(value_enum, long)]
    pub bw_unit: Option<RateUnit>,

    /// Write all samples as JSON to this path.
    #[arg(long)]
    pub output_json: Option<PathBuf>,
}

/// Transport the benchmark runs over.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// One thread per rank inside this process.
    Local,

    /// MPI world, requires the `rsmpi` feature.
    Mpi,
}

impl BenchArgs {
    /// Merge the options file (if any) with the command line.
    pub fn options(&self) -> Result<BenchmarkOptions> {
        let mut opts = match &self.options_path {
            Some(path) => load_options(path)?,
            None => BenchmarkOptions::default(),
        };
        if !self.ops.is_empty() {
            opts.ops = self.ops.clone();
        }
        opts.scan |= self.scan;
        opts.async_op |= self.async_op;
        opts.raw |= self.raw;
        opts.debug |= self.debug;
        override_with(&mut opts.min_exponent, self.min_exponent);
        override_with(&mut opts.max_exponent, self.max_exponent);
        override_with(&mut opts.stride, self.stride);
        override_with(&mut opts.scale, self.scale);
        override_with(&mut opts.linear_unit, self.linear_unit);
        override_with(&mut opts.elements_exponent, self.elements_exponent);
        override_with(&mut opts.warmups, self.warmups);
        override_with(&mut opts.trials, self.trials);
        override_with(&mut opts.mem_factor, self.mem_factor);
        override_with(&mut opts.device_memory, self.device_memory);
        override_with(&mut opts.dtype, self.dtype);
        override_with(&mut opts.bw_unit, self.bw_unit);
        if self.output_json.is_some() {
            opts.output_json = self.output_json.clone();
        }
        Ok(opts)
    }

    pub fn config(&self) -> Result<BenchmarkConfig> {
        BenchmarkConfig::from_options(self.options()?)
    }
}

fn override_with<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

/// Parse a byte count given either as a plain integer or as `<value> <unit>`.
pub fn parse_byte_size(s: &str) -> std::result::Result<u64, String> {
    if let Ok(bytes) = s.trim().parse::<u64>() {
        return Ok(bytes);
    }
    parse_human_bytes(s)
        .filter(|bytes| bytes.is_finite() && *bytes >= 0.0)
        .map(|bytes| bytes as u64)
        .ok_or_else(|| format!("invalid byte size: {:?}", s))
}

/// Load benchmark options from a file path.
pub fn load_options<P, T>(path: P) -> Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let fp = std::fs::File::open(path)?;
    Ok(serde_yaml::from_reader(fp)?)
}
