use rand::rngs::StdRng;
use redbench::workload::{Command, CommandWorkload, KeySpace};
use redbench::{append_command, run, run_blocking, BenchError, FailurePolicy, Options, RunState};
use redbench_server::{Server, ServerConfig};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::timeout;

const SERVER_READY_TIMEOUT: Duration = Duration::from_secs(60);
const RUN_TIMEOUT: Duration = Duration::from_secs(30);

async fn start_server(reply: &[u8], close_after: Option<u64>) -> SocketAddr {
    let (ready_tx, ready_rx) = oneshot::channel();

    let server = Server::new(ServerConfig {
        address: "127.0.0.1:0".parse().unwrap(),
        reply: reply.to_vec(),
        close_after,
    });

    tokio::spawn(async move {
        server.run(ready_tx).await.expect("server failed");
    });

    timeout(SERVER_READY_TIMEOUT, ready_rx)
        .await
        .expect("server did not start within 60 seconds")
        .expect("server ready signal dropped")
}

fn ping(buf: &mut Vec<u8>, _rng: &mut StdRng) {
    append_command(buf, ["PING"]);
}

fn options(clients: usize, requests: u64, pipeline: usize) -> Options {
    Options {
        clients,
        requests,
        pipeline,
        seed: Some(7),
        ..Options::default()
    }
}

#[tokio::test]
async fn test_single_client_ping() {
    let addr = start_server(b"+PONG\r\n", None).await;

    let summary = timeout(RUN_TIMEOUT, run("PING", &addr.to_string(), &options(1, 3, 1), ping))
        .await
        .expect("run hung")
        .expect("run failed");

    assert_eq!(summary.name, "PING");
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.state, RunState::Completed);
    assert!(!summary.incomplete);
    assert!(summary.throughput_rps > 0.0);
}

#[tokio::test]
async fn test_uneven_budget_is_fully_spent() {
    let addr = start_server(b"+PONG\r\n", None).await;

    let summary = run("PING", &addr.to_string(), &options(4, 10, 1), ping).await.expect("run failed");

    assert_eq!(summary.clients, 4);
    assert_eq!(summary.sent, 10);
    assert_eq!(summary.completed, 10);
    assert_eq!(summary.errors, 0);
}

#[tokio::test]
async fn test_pipelined_run_with_named_workloads() {
    let addr = start_server(b"+OK\r\n", None).await;
    let space = KeySpace::new(1_000, 100, 32);

    for command in [Command::Set, Command::HMSet, Command::LRange] {
        let workload = CommandWorkload::new(command, space.clone());
        let summary = run(command.as_name(), &addr.to_string(), &options(8, 1_003, 16), workload)
            .await
            .expect("run failed");

        assert_eq!(summary.completed, 1_003, "{}", command.as_name());
        assert_eq!(summary.errors, 0);
        assert!(summary.bytes_written > 0);
        assert_eq!(summary.bytes_read, 1_003 * 5);
    }
}

#[tokio::test]
async fn test_zero_requests_completes_immediately() {
    let addr = start_server(b"+PONG\r\n", None).await;

    let summary = run("PING", &addr.to_string(), &options(3, 0, 1), ping).await.expect("run failed");

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.state, RunState::Completed);
    assert!(!summary.incomplete);
}

#[tokio::test]
async fn test_server_closing_connection_is_reported() {
    let addr = start_server(b"+PONG\r\n", Some(5)).await;

    let summary = timeout(RUN_TIMEOUT, run("PING", &addr.to_string(), &options(1, 10, 1), ping))
        .await
        .expect("run hung")
        .expect("run failed");

    assert_eq!(summary.completed, 5);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.failed_workers, 1);
    assert_eq!(summary.state, RunState::Aborted);
    assert!(summary.incomplete);
}

#[tokio::test]
async fn test_tolerant_policy_lets_other_workers_finish() {
    // Every connection is closed after 5 replies; shares of 4 fit, shares of 6 do not.
    let addr = start_server(b"+PONG\r\n", Some(5)).await;
    let opts = Options {
        failure_policy: FailurePolicy::Tolerate,
        ..options(3, 16, 1)
    };

    let summary = timeout(RUN_TIMEOUT, run("PING", &addr.to_string(), &opts, ping))
        .await
        .expect("run hung")
        .expect("run failed");

    // shares are 6, 5, 5: the first worker fails after 5 replies, the others finish.
    assert_eq!(summary.completed, 15);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.state, RunState::Completed);
    assert!(summary.incomplete);
}

#[tokio::test]
async fn test_time_limit_cancels_blocked_workers() {
    // The server never answers, so every worker blocks on its first read.
    let addr = start_server(b"", None).await;
    let opts = Options {
        time_limit: Some(Duration::from_millis(200)),
        ..options(4, 1_000, 10)
    };

    let started = Instant::now();
    let summary = timeout(RUN_TIMEOUT, run("PING", &addr.to_string(), &opts, ping))
        .await
        .expect("run hung")
        .expect("run failed");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.sent, 40);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.state, RunState::Aborted);
    assert!(summary.incomplete);
}

#[tokio::test]
async fn test_panicking_worker_cancels_the_run() {
    // The server never answers, so the other workers only stop when cancelled.
    let addr = start_server(b"", None).await;
    let tripped = Arc::new(AtomicBool::new(false));
    let trip = Arc::clone(&tripped);
    let workload = move |buf: &mut Vec<u8>, _rng: &mut StdRng| {
        if !trip.swap(true, Ordering::SeqCst) {
            panic!("workload failed on its first request");
        }
        append_command(buf, ["PING"]);
    };

    let started = Instant::now();
    let summary = timeout(RUN_TIMEOUT, run("PING", &addr.to_string(), &options(4, 400_000, 1), workload))
        .await
        .expect("run hung after a worker panicked")
        .expect("run failed");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.state, RunState::Aborted);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.failed_workers, 1);
    assert!(summary.incomplete);
}

#[tokio::test]
async fn test_panicking_worker_cancels_a_tolerant_run() {
    let addr = start_server(b"", None).await;
    let tripped = Arc::new(AtomicBool::new(false));
    let trip = Arc::clone(&tripped);
    let workload = move |buf: &mut Vec<u8>, _rng: &mut StdRng| {
        if !trip.swap(true, Ordering::SeqCst) {
            panic!("workload failed on its first request");
        }
        append_command(buf, ["PING"]);
    };
    let opts = Options {
        failure_policy: FailurePolicy::Tolerate,
        ..options(3, 300, 1)
    };

    let mut bench = redbench::Bench::new("PING", &addr.to_string(), opts, Arc::new(workload));
    let summary = timeout(RUN_TIMEOUT, bench.run())
        .await
        .expect("run hung after a worker panicked")
        .expect("run failed");

    assert_eq!(bench.state(), RunState::Aborted);
    assert_eq!(summary.failed_workers, 1);
    assert!(summary.incomplete);
}

#[tokio::test]
async fn test_rate_limit_bounds_pipelined_throughput() {
    let addr = start_server(b"+OK\r\n", None).await;
    // 100 requests at 200/s in batches of 10: at least ~0.5s.
    let opts = Options {
        rate_limit: Some(200.0),
        ..options(1, 100, 10)
    };

    let started = Instant::now();
    let summary = run("PING", &addr.to_string(), &opts, ping).await.expect("run failed");
    let elapsed = started.elapsed();

    assert_eq!(summary.completed, 100);
    assert!(elapsed >= Duration::from_millis(490), "rate limit bypassed: {elapsed:?}");
    assert!(summary.elapsed_secs >= 0.49);
}

#[tokio::test]
async fn test_rate_limit_is_shared_by_all_clients() {
    let addr = start_server(b"+OK\r\n", None).await;
    let opts = Options {
        rate_limit: Some(400.0),
        ..options(4, 200, 5)
    };

    let started = Instant::now();
    let summary = run("PING", &addr.to_string(), &opts, ping).await.expect("run failed");

    assert_eq!(summary.completed, 200);
    assert!(started.elapsed() >= Duration::from_millis(490));
}

#[tokio::test]
async fn test_error_replies_are_counted() {
    let addr = start_server(b"-ERR wrong type\r\n", None).await;

    let summary = run("PING", &addr.to_string(), &options(2, 20, 4), ping).await.expect("run failed");

    assert_eq!(summary.completed, 20);
    assert_eq!(summary.error_replies, 20);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.error_reply_rate(), 1.0);
}

#[tokio::test]
async fn test_rejected_setup_fails_before_running() {
    let addr = start_server(b"-ERR invalid password\r\n", None).await;
    let mut auth = Vec::new();
    append_command(&mut auth, ["AUTH", "nope"]);
    let opts = Options {
        setup: vec![auth],
        ..options(2, 10, 1)
    };

    let result = run("PING", &addr.to_string(), &opts, ping).await;
    assert!(matches!(result, Err(BenchError::Connect { .. })));
}

#[test]
fn test_blocking_entry_point() {
    // The server needs a runtime of its own while run_blocking owns another.
    let server_runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = server_runtime.block_on(start_server(b"+PONG\r\n", None));

    let summary = run_blocking("PING", &addr.to_string(), &options(2, 50, 5), ping).expect("run failed");

    assert_eq!(summary.completed, 50);
    assert_eq!(summary.state, RunState::Completed);
}
