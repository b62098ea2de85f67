use clap::Parser;
use redbench::append_command;
use redbench::metrics::Summary;
use redbench_common::telemetry::init_tracing;
use redbench::workload::{Command, CommandWorkload, KeySpace};
use redbench::{Bench, FailurePolicy, Options};
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "redbench", about = "Pipelined load generator for key-value servers")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Server address as host:port (overrides --host and --port)
    #[arg(short, long)]
    server: Option<String>,

    /// Number of concurrent connections
    #[arg(short, long, default_value_t = 50)]
    clients: usize,

    /// Total number of requests per test
    #[arg(short = 'n', long, default_value_t = 100_000)]
    requests: u64,

    /// Pipeline <numreq> requests per round-trip (1 = no pipelining)
    #[arg(short = 'P', long, default_value_t = 1)]
    pipeline: usize,

    /// Maximum aggregate throughput in requests/s (0 = unlimited)
    #[arg(short = 'l', long, default_value_t = 0.0)]
    rate_limit: f64,

    /// Size of SET/LPUSH/... values in bytes
    #[arg(short = 'd', long, default_value_t = 16)]
    data_size: usize,

    /// Number of distinct random keys
    #[arg(short = 'r', long, default_value_t = 10_000)]
    key_space: u64,

    /// Number of distinct random hash fields and set members
    #[arg(short = 'f', long, default_value_t = 100)]
    field_space: u64,

    /// Comma separated list of tests to run
    #[arg(short = 't', long, default_value = "set")]
    tests: String,

    /// Runtime worker threads (default: logical CPU count)
    #[arg(long)]
    threads: Option<usize>,

    /// Password sent with AUTH on every connection before the test starts
    #[arg(long)]
    auth: Option<String>,

    /// Keep the remaining connections running when one fails
    #[arg(long)]
    tolerate_errors: bool,

    /// Cancel each test after this many seconds
    #[arg(long)]
    time_limit: Option<f64>,

    /// Seed for the key generators
    #[arg(long)]
    seed: Option<u64>,

    /// Print one JSON summary per test
    #[arg(long)]
    json: bool,

    /// Print only the throughput of each test
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_tracing(args.verbose) {
        eprintln!("Failed to initialise logging: {e}");
    }

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(threads) = args.threads {
        builder.worker_threads(threads.max(1));
    }
    let runtime = builder.enable_all().build().unwrap_or_else(|e| {
        eprintln!("Failed to start runtime: {e}");
        process::exit(3);
    });

    let exit_code = runtime.block_on(run_tests(&args));
    process::exit(exit_code);
}

async fn run_tests(args: &Args) -> i32 {
    let addr = args
        .server
        .clone()
        .unwrap_or_else(|| format!("{}:{}", args.host, args.port));
    let options = build_options(args);
    let space = KeySpace::new(args.key_space, args.field_space, args.data_size);

    let mut exit_code = 0;
    for name in args.tests.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let Some(command) = Command::from_name(name) else {
            tracing::warn!(test = name, "unknown test, skipping");
            continue;
        };
        let label = command.as_name().to_uppercase();
        let workload = Arc::new(CommandWorkload::new(command, space.clone()));

        match Bench::new(&label, &addr, options.clone(), workload).run().await {
            Ok(summary) => {
                print_summary(args, &summary);
                if summary.incomplete || summary.errors > 0 {
                    exit_code = 1;
                }
            }
            Err(e) => {
                eprintln!("{label}: {e}");
                return 3;
            }
        }
    }
    exit_code
}

fn build_options(args: &Args) -> Options {
    let mut setup = Vec::new();
    if let Some(password) = &args.auth {
        let mut auth = Vec::new();
        append_command(&mut auth, ["AUTH", password.as_str()]);
        setup.push(auth);
    }

    Options {
        clients: args.clients,
        requests: args.requests,
        pipeline: args.pipeline,
        rate_limit: (args.rate_limit > 0.0).then_some(args.rate_limit),
        failure_policy: if args.tolerate_errors {
            FailurePolicy::Tolerate
        } else {
            FailurePolicy::AbortOnFirstError
        },
        time_limit: args
            .time_limit
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64),
        setup,
        seed: args.seed,
        progress_interval: (!args.quiet && !args.json).then_some(Duration::from_secs(1)),
        ..Options::default()
    }
}

fn print_summary(args: &Args, summary: &Summary) {
    if args.json {
        match serde_json::to_string(summary) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Failed to encode summary: {e}"),
        }
        return;
    }
    if args.quiet {
        println!("{}: {:.2} requests per second", summary.name, summary.throughput_rps);
        return;
    }

    println!("====== {} ======", summary.name);
    println!(
        "  {} requests completed in {:.2} seconds",
        summary.completed, summary.elapsed_secs
    );
    println!("  {} parallel clients", summary.clients);
    println!("  pipeline depth {}", summary.pipeline);
    println!();
    println!("  Batch latency mean:  {:.3} ms", ns_to_ms(summary.mean_latency_ns));
    println!("  Batch latency p50:   {:.3} ms", ns_to_ms(summary.p50_latency_ns));
    println!("  Batch latency p99:   {:.3} ms", ns_to_ms(summary.p99_latency_ns));
    println!();
    println!("  Errors:              {}", summary.errors);
    println!(
        "  Error replies:       {} ({:.3}%)",
        summary.error_replies,
        summary.error_reply_rate() * 100.0
    );
    if summary.incomplete {
        println!(
            "  INCOMPLETE ({:?}): {} of {} requests completed",
            summary.state, summary.completed, summary.requested
        );
    }
    println!("{:.2} requests per second", summary.throughput_rps);
    println!();
}

fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}
