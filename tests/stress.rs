//! Stress tests for the feed core
//!
//! Run with: cargo test --release stress -- --ignored

use quakesr::*;
use quakesr_testdata::{scan_payload, ScanConfig, ScanGenerator};
use std::time::Instant;

fn generator(points: usize, iterations: usize) -> ScanGenerator {
    ScanGenerator::new(
        ScanConfig::new()
            .with_points(points)
            .with_iterations(iterations)
            .with_seed(99),
    )
    .unwrap()
}

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_aggregation() {
    let mut gen = generator(512, 8);
    let batches: Vec<RawScanBatch> = (0..100)
        .map(|_| RawScanBatch::from_rows(&gen.signal_rows()).unwrap())
        .collect();

    let mut agg = RunningAggregator::new();
    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        agg.update(Stream::Signal, &batches[i % batches.len()]).unwrap();
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Absorbed {} scans of 512x8 in {:?}", iterations, elapsed);
    println!("Rate: {:.0} scans/second", rate);

    assert_eq!(agg.count(Stream::Signal), (iterations * 8) as u64);
    assert!(
        rate > 1_000.0,
        "Should absorb at least 1k scans/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_feed_dispatch() {
    let feed = ScanFeed::new(FeedConfig::new("lab/esr")).unwrap();
    let handle = feed.handle();
    let mut gen = generator(128, 4);

    let bodies: Vec<(String, Vec<u8>)> = (0..50)
        .flat_map(|_| {
            let signal = scan_payload(&gen.signal_rows()).to_string().into_bytes();
            let reference = scan_payload(&gen.reference_rows()).to_string().into_bytes();
            [
                ("lab/esr/scan/peak/peakdata".to_string(), signal),
                ("lab/esr/scan/peak/zeropeakdata".to_string(), reference),
            ]
        })
        .collect();

    let messages = 20_000;
    let start = Instant::now();

    for i in 0..messages {
        let (topic, body) = &bodies[i % bodies.len()];
        let report = feed.deliver_bytes(topic, body);
        assert_eq!(report.failed, 0);
    }

    let elapsed = start.elapsed();
    let rate = messages as f64 / elapsed.as_secs_f64();

    println!("Dispatched {} scan messages in {:?}", messages, elapsed);
    println!("Rate: {:.0} messages/second", rate);

    let running = handle.running();
    assert_eq!(running.signal_count + running.reference_count, (messages * 4) as u64);
    assert!(
        rate > 500.0,
        "Should dispatch at least 500 msg/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_concurrent_consumer() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    let feed = ScanFeed::new(FeedConfig::new("lab/esr")).unwrap();
    let handle = feed.handle();
    let done = Arc::new(AtomicBool::new(false));
    let mut gen = generator(64, 2);
    let body = scan_payload(&gen.signal_rows()).to_string().into_bytes();

    let consumer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut seen = 0u64;
            while !done.load(Ordering::SeqCst) {
                if let Some(running) = handle.take_running() {
                    // every snapshot is internally consistent
                    let signal = running.signal.unwrap();
                    assert_eq!(signal.channel.len(), 64);
                    assert_eq!(signal.errors.unwrap().len(), 64);
                    assert!(running.signal_count >= seen);
                    seen = running.signal_count;
                }
            }
            seen
        })
    };

    let messages = 20_000;
    let start = Instant::now();
    for _ in 0..messages {
        feed.deliver_bytes("lab/esr/scan/peak/peakdata", &body);
    }
    done.store(true, Ordering::SeqCst);
    let seen = consumer.join().unwrap();

    println!(
        "Delivered {} messages with a polling consumer in {:?} (last count seen {})",
        messages,
        start.elapsed(),
        seen
    );
    assert!(seen <= (messages * 2) as u64);
}
