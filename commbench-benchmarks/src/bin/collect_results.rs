use clap::Parser;
use commbench_benchmarks::collect::write_json;
use commbench_benchmarks::{LogAggregator, Result, RunMetadata};
use log::error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Collect benchmark run logs under a directory into one JSON file.
#[derive(Parser)]
struct CollectArgs {
    /// Directory to search for log files.
    root: PathBuf,

    /// Output JSON path.
    #[arg(short, long, default_value = "benchmark_data.json")]
    output: PathBuf,

    /// Total payload of the runs, attached to every record.
    #[arg(long)]
    total_payload: Option<u64>,

    /// Warmup steps of the runs, attached to every record.
    #[arg(long)]
    warmup_steps: Option<u64>,

    /// Trials of the runs, attached to every record.
    #[arg(long)]
    trials: Option<u64>,
}

fn run(args: &CollectArgs) -> Result<usize> {
    let aggregator = LogAggregator::with_metadata(RunMetadata {
        total_payload: args.total_payload,
        warmup_steps: args.warmup_steps,
        trials: args.trials,
    });
    let records = aggregator.aggregate_dir(&args.root)?;
    let mut out = BufWriter::new(File::create(&args.output)?);
    write_json(&records, &mut out)?;
    out.flush()?;
    Ok(records.len())
}

fn main() {
    env_logger::init();
    let args = CollectArgs::parse();
    match run(&args) {
        Ok(count) => println!("Data extracted and saved to {} ({} records)", args.output.display(), count),
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
}
