use std::fs::{create_dir_all, File, OpenOptions};

use arrrg::CommandLine;
use biometrics::Collector;
use tracing_subscriber::EnvFilter;

use kvshim_bench::config::BenchmarkOptions;
use kvshim_bench::metrics::{self, JsonEmitter};
use kvshim_bench::{run_benchmark, Error};

const USAGE: &str = "USAGE: kvshim-bench --workload NAME --backend NAME [--options]";

fn dump_biometrics(collector: &Collector, path: &str) -> Result<(), Error> {
    let mut emitter = JsonEmitter::new(File::create(path)?);
    collector.emit(&mut emitter)?;
    Ok(())
}

fn run(options: &BenchmarkOptions) -> Result<(), Error> {
    let config = options.try_into_config()?;
    let path = options.data_path();
    create_dir_all(&path)?;
    let output = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&options.out)?;
    let collector = Collector::new();
    kvshim::register_biometrics(&collector);
    metrics::register_biometrics(&collector);
    let result = run_benchmark(&config, &path, output);
    if !options.metrics.is_empty() {
        if let Err(err) = dump_biometrics(&collector, &options.metrics) {
            tracing::warn!(error = %err, path = %options.metrics, "could not write biometrics");
        }
    }
    let summary = result?;
    println!(
        "{} on {}: {} operations ({} failed) in {:.3}s, stopped by {}",
        config.workload,
        config.backend,
        summary.executed,
        summary.failed,
        summary.elapsed.as_secs_f64(),
        summary.stop.name(),
    );
    Ok(())
}

/////////////////////////////////////////////// main ///////////////////////////////////////////////

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let (options, free) = BenchmarkOptions::from_command_line_relaxed(USAGE);
    if !free.is_empty() {
        eprintln!("kvshim-bench takes no positional arguments");
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    if let Err(err) = run(&options) {
        tracing::error!(error = %err, "benchmark failed");
        eprintln!("{}", err);
        std::process::exit(err.exit_code());
    }
}
