use clap::Parser;
use commbench::communicator::Communicator;
use commbench_benchmarks::{all_gather_probe, parse_byte_size, RankTask, Result, TransportKind};
use log::error;

/// Time individual all-gathers and print them in the run log format.
#[derive(Parser)]
struct ProbeArgs {
    /// Total bytes gathered, split evenly across ranks.
    #[arg(short, long, default_value = "1073741824", value_parser = parse_byte_size)]
    bytes: u64,

    /// Number of all-gathers to run.
    #[arg(short, long, default_value_t = 20)]
    iterations: usize,

    /// Transport to run over.
    #[arg(value_enum, short, long, default_value_t = TransportKind::Local)]
    transport: TransportKind,

    /// Number of ranks for the local transport.
    #[arg(long, default_value_t = 2)]
    local_ranks: usize,
}

struct Probe {
    bytes: usize,
    iterations: usize,
}

impl RankTask for Probe {
    fn run<C: Communicator>(&self, comm: &C) -> Result<()> {
        let report = all_gather_probe(comm, self.bytes, self.iterations)?;
        if comm.rank() == 0 {
            println!("{}", report);
        }
        Ok(())
    }
}

fn main() {
    env_logger::init();
    let args = ProbeArgs::parse();
    let probe = Probe {
        bytes: args.bytes as usize,
        iterations: args.iterations,
    };
    if let Err(err) = commbench_benchmarks::launch(args.transport, args.local_ranks, &probe) {
        error!("{}", err);
        std::process::exit(1);
    }
}
