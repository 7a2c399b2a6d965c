//! Registry and routing benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use seatsync_core::{ClientInfo, Hub, MatchRouter, Message, Registry};
use serde_json::json;
use std::sync::Arc;

/// Claim and release churn on a shared registry.
fn bench_claim_release(c: &mut Criterion) {
    let registry = Registry::new();

    c.bench_function("claim_release", |b| {
        b.iter(|| {
            registry.claim("conn", ClientInfo::player("match", "0"));
            registry.release(black_box("conn"));
        });
    });
}

/// `send_all` across a match with N occupied seats.
fn bench_send_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_all");

    for seats in [2usize, 8, 32] {
        let hub = Arc::new(Hub::new());
        let registry = Arc::new(Registry::new());
        let mut inboxes = Vec::with_capacity(seats);
        for seat in 0..seats {
            let conn = format!("conn-{seat}");
            registry.claim(&conn, ClientInfo::player("match", seat.to_string()));
            inboxes.push(hub.register(&conn).1);
        }
        let router = MatchRouter::new("match", hub, registry);

        group.bench_with_input(BenchmarkId::from_parameter(seats), &seats, |b, _| {
            b.iter(|| {
                let reached = router.send_all(|p| Message::new("update", vec![json!(p)]));
                for inbox in &mut inboxes {
                    while inbox.try_recv().is_ok() {}
                }
                reached
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_claim_release, bench_send_all);
criterion_main!(benches);
