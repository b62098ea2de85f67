use redbench::bench::shares;
use redbench::{Bench, BenchError, ConfigError, Options, RunState};
use std::sync::Arc;

fn ping(buf: &mut Vec<u8>, _rng: &mut rand::rngs::StdRng) {
    redbench::append_command(buf, ["PING"]);
}

#[test]
fn test_shares_spread_remainder_over_first_workers() {
    assert_eq!(shares(10, 4), vec![3, 3, 2, 2]);
    assert_eq!(shares(3, 1), vec![3]);
    assert_eq!(shares(2, 5), vec![1, 1, 0, 0, 0]);
    assert_eq!(shares(0, 3), vec![0, 0, 0]);
    assert!(shares(7, 0).is_empty());
}

#[test]
fn test_shares_sum_to_total_and_differ_by_at_most_one() {
    for workers in 1..=17 {
        for total in 0..300u64 {
            let s = shares(total, workers);
            assert_eq!(s.len(), workers);
            assert_eq!(s.iter().sum::<u64>(), total, "total={total} workers={workers}");
            let max = *s.iter().max().unwrap();
            let min = *s.iter().min().unwrap();
            assert!(max - min <= 1, "total={total} workers={workers} shares={s:?}");
        }
    }
}

#[tokio::test]
async fn test_invalid_options_fail_before_connecting() {
    // Nothing listens on port 1; validation must fail first.
    let options = Options { clients: 0, ..Options::default() };
    let mut bench = Bench::new("PING", "127.0.0.1:1", options, Arc::new(ping));
    let result = bench.run().await;
    assert!(matches!(result, Err(BenchError::Config(ConfigError::InvalidConcurrency(0)))));
    assert_eq!(bench.state(), RunState::Idle);
}

#[tokio::test]
async fn test_unreachable_target_fails_before_running() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let options = Options { clients: 2, requests: 10, ..Options::default() };
    let mut bench = Bench::new("PING", &format!("127.0.0.1:{port}"), options, Arc::new(ping));
    let result = bench.run().await;
    assert!(matches!(result, Err(BenchError::Connect { .. })));
    assert_eq!(bench.state(), RunState::Idle);
}
