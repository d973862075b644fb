// Spool demo
//
// Runs one result-returning task and a batch of fire-and-forget tasks on a
// pool, then times the shutdown.

use std::{
    process::ExitCode,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use clap::Parser;
use spool::{prelude::*, thread_pool::available_workers, timer::ScopedTimer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spool")]
#[command(about = "Run a few demo tasks on a fixed-size worker pool")]
#[command(version)]
struct Cli {
    /// Parallel degree of the program (number of worker threads)
    #[arg(short = 'n', long, default_value_t = available_workers())]
    parallel_degree: usize,

    /// How long the result-returning task sleeps, in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,

    /// Number of fire-and-forget counter tasks
    #[arg(long, default_value_t = 100)]
    tasks: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let pool = ThreadPool::new(cli.parallel_degree)?;

    let delay = cli.delay_ms;
    let sleeper = pool.submit(move || {
        thread::sleep(Duration::from_millis(delay));
        delay
    })?;

    match sleeper.get() {
        Ok(value) => println!("Value got: {value}"),
        Err(err) => println!("Task failed: {err}"),
    }

    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..cli.tasks {
        let counter = Arc::clone(&counter);
        pool.execute(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })?;
    }

    {
        let _timer = ScopedTimer::new("shutdown");
        pool.shutdown()?;
    }

    println!("Counter: {}", counter.load(Ordering::Relaxed));
    Ok(())
}
