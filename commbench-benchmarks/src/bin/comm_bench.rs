use clap::Parser;
use commbench::communicator::Communicator;
use commbench_benchmarks::{run_benchmarks, BenchArgs, BenchmarkConfig, RankTask, Reporter, Result};
use log::error;

struct Sweep<'a> {
    config: &'a BenchmarkConfig,
}

impl<'a> RankTask for Sweep<'a> {
    fn run<C: Communicator>(&self, comm: &C) -> Result<()> {
        let mut reporter = Reporter::for_rank(std::io::stdout(), self.config.formatter(), comm.rank());
        run_benchmarks(comm, self.config, &mut reporter)?;
        Ok(())
    }
}

fn run(args: &BenchArgs) -> Result<()> {
    let config = args.config()?;
    commbench_benchmarks::launch(args.transport, args.local_ranks, &Sweep { config: &config })
}

fn main() {
    env_logger::init();
    let args = BenchArgs::parse();
    if let Err(err) = run(&args) {
        error!("{}", err);
        std::process::exit(1);
    }
}
