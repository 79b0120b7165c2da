//! Integration tests for the public surface: options snapping, hop
//! rendering, and resolution failures.
//!
//! Live traceroute scenarios need CAP_NET_RAW and network access, so they
//! are `#[ignore]`d by default; run them with `cargo test -- --ignored`
//! under sudo.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use hoptrace::{run, run_blocking, Addr, Hop, Options};

#[test]
fn default_options_snap_to_documented_values() {
    let options = Options::default();
    assert_eq!(options.port(), 33434);
    assert_eq!(options.max_hops(), 32);
    assert_eq!(options.start_ttl(), 1);
    assert_eq!(options.timeout(), Duration::from_millis(200));
    assert_eq!(options.retries(), 2);
}

#[test]
fn oversized_max_hops_clamps() {
    let options = Options {
        max_hops: Some(1000),
        ..Options::default()
    };
    assert_eq!(options.max_hops(), 63);
}

#[test]
fn options_survive_serialization() {
    let options = Options {
        max_hops: Some(16),
        timeout: Some(Duration::from_millis(500)),
        retries: Some(0),
        ..Options::default()
    };
    let json = serde_json::to_string(&options).unwrap();
    let back: Options = serde_json::from_str(&json).unwrap();
    assert_eq!(back.max_hops(), 16);
    assert_eq!(back.timeout(), Duration::from_millis(500));
    assert_eq!(back.retries(), 0);
}

fn sample_hop(success: bool, step: u8) -> Hop {
    Hop {
        success,
        src: Addr {
            host: None,
            ip: Ipv4Addr::new(192, 168, 1, 2),
        },
        dst: Addr {
            host: None,
            ip: Ipv4Addr::new(8, 8, 8, 8),
        },
        node: Addr {
            host: None,
            ip: if success {
                Ipv4Addr::new(10, 0, 0, 1)
            } else {
                Ipv4Addr::UNSPECIFIED
            },
        },
        step,
        id: "100|8.8.8.8|33434|33434".to_string(),
        dst_port: 33434,
        sent: Utc::now(),
        received: success.then(Utc::now),
        elapsed: Duration::from_millis(8),
        icmp_type: if success { 11 } else { 0 },
    }
}

#[test]
fn hop_renders_success_and_silence() {
    assert_eq!(
        sample_hop(true, 2).to_human(),
        "2   10.0.0.1 (10.0.0.1)  8ms"
    );
    assert_eq!(sample_hop(false, 9).to_human(), "9   *");
}

#[test]
fn hop_json_round_trips() {
    let hop = sample_hop(true, 4);
    let parsed: Hop = serde_json::from_str(&hop.to_json(false)).unwrap();
    assert_eq!(parsed.step, 4);
    assert_eq!(parsed.node.ip, hop.node.ip);
    assert!(parsed.success);
    assert!(parsed.received.is_some());
}

#[test]
fn hop_sequences_keep_strictly_increasing_steps() {
    // the shape every run produces: TTL order, unanswered steps included
    let hops: Vec<Hop> = [
        (true, 1u8),
        (true, 2),
        (false, 3),
        (true, 4),
        (true, 5),
    ]
    .into_iter()
    .map(|(success, step)| sample_hop(success, step))
    .collect();

    for pair in hops.windows(2) {
        assert!(pair[0].step < pair[1].step);
    }
    let start_ttl = Options::default().start_ttl();
    let max_hops = Options::default().max_hops();
    assert!(hops
        .iter()
        .all(|h| (start_ttl..=max_hops).contains(&h.step)));
    // unanswered steps never carry a responder
    for hop in hops.iter().filter(|h| !h.success) {
        assert_eq!(hop.node.ip, Ipv4Addr::UNSPECIFIED);
        assert!(hop.received.is_none());
    }
}

#[test]
fn unresolvable_target_fails_before_any_socket() {
    // no raw-socket privileges needed: the failure comes from resolution
    let result = run_blocking("266.266.266.266", Options::default());
    assert!(result.is_err());
}

#[tokio::test]
async fn unresolvable_target_fails_streaming() {
    let result = run(
        "266.266.266.266",
        Options::default(),
        CancellationToken::new(),
    )
    .await;
    assert!(result.is_err());
}

#[test]
#[ignore = "requires CAP_NET_RAW and network access"]
fn trace_reaches_public_dns() {
    let target = Ipv4Addr::new(8, 8, 8, 8);
    let hops = run_blocking("8.8.8.8", Options::default()).unwrap();

    assert!(!hops.is_empty());
    assert!(hops.iter().any(|h| h.success));
    // strictly increasing steps within bounds
    for pair in hops.windows(2) {
        assert!(pair[0].step < pair[1].step);
    }
    assert!(hops.iter().all(|h| (1..=32).contains(&h.step)));
    // the run ends at the destination or at the hop ceiling
    let last = hops.last().unwrap();
    assert!(last.node.ip == target || last.step == 32);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires CAP_NET_RAW and network access"]
async fn concurrent_flows_stay_isolated() {
    let targets = ["google.com", "8.8.8.8", "1.1.1.1", "yahoo.com", "9.9.9.9"];

    let mut handles = Vec::new();
    for target in targets {
        let options = Options {
            max_hops: Some(32),
            ..Options::default()
        };
        handles.push(tokio::spawn(async move {
            let mut rx = run(target, options, CancellationToken::new())
                .await
                .expect("flow setup");
            let mut hops = Vec::new();
            while let Some(hop) = rx.recv().await {
                hops.push(hop);
            }
            hops
        }));
    }

    for handle in handles {
        let hops = handle.await.unwrap();
        assert!(!hops.is_empty(), "a flow produced no hops");
        assert!(hops.iter().any(|h| h.success));
        // every reply a flow sees was quoted back for its own destination
        let dst = hops[0].dst.ip;
        for hop in hops.iter().filter(|h| h.success) {
            assert_eq!(hop.dst.ip, dst);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires CAP_NET_RAW and network access"]
async fn cancellation_closes_the_stream_promptly() {
    let cancel = CancellationToken::new();
    let mut rx = run("8.8.8.8", Options::default(), cancel.clone())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    cancel.cancel();
    let cancelled_at = Instant::now();

    // drain whatever is in flight; closure must follow within roughly one
    // receive window plus one probe send
    while rx.recv().await.is_some() {}
    assert!(cancelled_at.elapsed() < Duration::from_secs(2));
}
