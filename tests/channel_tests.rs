//! Integration tests for the value channel
//!
//! These tests verify:
//! - FIFO delivery across queued values and waiting receivers
//! - End-of-stream reaching every waiting and future receiver
//! - Cancellation semantics, including races against concurrent sends
//! - Monitor pumping in channel order

use gfxterm::channel::{ChannelMonitor, ChannelRegistry, MonitorNotice, ReceiveResult};
use proptest::prelude::*;
use std::sync::mpsc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread")]
async fn test_queued_values_then_eof() {
    let registry = ChannelRegistry::new(Handle::current());
    let (tx, rx) = registry.channel::<u32>();

    for v in 0..10 {
        tx.send(v);
    }
    tx.send_eof();

    for expected in 0..10 {
        match rx.receive().await {
            ReceiveResult::Item(v) => assert_eq!(v, expected),
            other => panic!("expected item, got {:?}", other),
        }
    }
    assert!(matches!(rx.receive().await, ReceiveResult::Eof));
    assert!(matches!(rx.receive().await, ReceiveResult::Eof));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_eof_reaches_every_waiting_receiver() {
    let registry = ChannelRegistry::new(Handle::current());
    let (tx, rx) = registry.channel::<u32>();

    let (out_tx, out_rx) = mpsc::channel();
    for _ in 0..3 {
        let out = out_tx.clone();
        rx.receive_with_callback(
            move |result| {
                out.send(matches!(result, ReceiveResult::Eof)).unwrap();
            },
            CancellationToken::new(),
        );
    }

    tx.send_eof();

    for _ in 0..3 {
        assert!(out_rx.recv_timeout(WAIT).unwrap());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pre_cancelled_token_yields_cancelled() {
    let registry = ChannelRegistry::new(Handle::current());
    let (tx, rx) = registry.channel::<u32>();

    let token = CancellationToken::new();
    token.cancel();

    let (out_tx, out_rx) = mpsc::channel();
    rx.receive_with_callback(
        move |result| {
            out_tx.send(result).unwrap();
        },
        token,
    );

    let result = out_rx.recv_timeout(WAIT).unwrap();
    assert!(matches!(result, ReceiveResult::Cancelled));
    tx.send_eof();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pre_cancelled_token_still_takes_queued_value() {
    let registry = ChannelRegistry::new(Handle::current());
    let (tx, rx) = registry.channel::<u32>();

    // A queued value wins over cancellation: the registration never waits.
    tx.send(11);
    let token = CancellationToken::new();
    token.cancel();

    let (out_tx, out_rx) = mpsc::channel();
    rx.receive_with_callback(
        move |result| {
            out_tx.send(result).unwrap();
        },
        token,
    );

    let result = out_rx.recv_timeout(WAIT).unwrap();
    assert!(matches!(result, ReceiveResult::Item(11)));
    tx.send_eof();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_cancel_race_yields_exactly_one_outcome() {
    let registry = ChannelRegistry::new(Handle::current());

    for _ in 0..100 {
        let (tx, rx) = registry.channel::<u32>();
        let token = CancellationToken::new();

        let (out_tx, out_rx) = mpsc::channel();
        rx.receive_with_callback(
            move |result| {
                out_tx.send(result).unwrap();
            },
            token.clone(),
        );

        let racer = tokio::spawn({
            let token = token.clone();
            async move {
                token.cancel();
            }
        });
        tx.send(5);

        match out_rx.recv_timeout(WAIT).unwrap() {
            ReceiveResult::Item(v) => assert_eq!(v, 5),
            ReceiveResult::Cancelled => {
                // The value must still be queued for the next receive.
                match rx.receive().await {
                    ReceiveResult::Item(v) => assert_eq!(v, 5),
                    other => panic!("value lost to cancellation: {:?}", other),
                }
            }
            ReceiveResult::Eof => panic!("spurious eof"),
        }

        racer.await.unwrap();
        tx.send_eof();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_monitor_preserves_channel_order() {
    let registry = ChannelRegistry::new(Handle::current());
    let (tx, rx) = registry.channel::<u32>();

    let (out_tx, out_rx) = mpsc::channel();
    let _monitor = ChannelMonitor::start(rx, move |notice| {
        let tag = match notice {
            MonitorNotice::Item(v) => i64::from(v),
            MonitorNotice::Eof => -1,
        };
        out_tx.send(tag).unwrap();
    });

    for v in 0..20 {
        tx.send(v);
    }
    tx.send_eof();

    let mut seen = Vec::new();
    for _ in 0..21 {
        seen.push(out_rx.recv_timeout(WAIT).unwrap());
    }
    let mut expected: Vec<i64> = (0..20).collect();
    expected.push(-1);
    assert_eq!(seen, expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// FIFO law: whatever the interleaving of early registrations and
    /// sends, the k-th registration observes the k-th sent value.
    #[test]
    fn test_fifo_law_over_interleavings(
        values in proptest::collection::vec(any::<u32>(), 0..24),
        early in 0usize..4,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let registry = ChannelRegistry::new(Handle::current());
            let (tx, rx) = registry.channel::<u32>();

            let early = early.min(values.len());
            let (out_tx, out_rx) = mpsc::channel();
            for slot in 0..early {
                let out = out_tx.clone();
                rx.receive_with_callback(
                    move |result| match result {
                        ReceiveResult::Item(v) => out.send((slot, v)).unwrap(),
                        other => panic!("expected item, got {:?}", other),
                    },
                    CancellationToken::new(),
                );
            }

            for &v in &values {
                tx.send(v);
            }

            // Early registrations pair with the first sends in order;
            // deliveries run concurrently, so match by slot.
            for _ in 0..early {
                let (slot, v) = out_rx.recv_timeout(WAIT).unwrap();
                assert_eq!(v, values[slot]);
            }

            // The remainder drains strictly in order.
            for expected in &values[early..] {
                match rx.receive().await {
                    ReceiveResult::Item(v) => assert_eq!(v, *expected),
                    other => panic!("expected item, got {:?}", other),
                }
            }

            tx.send_eof();
            assert!(matches!(rx.receive().await, ReceiveResult::Eof));
        });
    }
}
