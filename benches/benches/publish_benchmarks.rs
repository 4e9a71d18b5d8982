use std::{
    hint::black_box,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion};
use logmux::{InMemoryBroker, Mux, RawCodec};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_sync_publish(c: &mut Criterion) {
    let rt = runtime();
    let mux = rt.block_on(async { Mux::new(Arc::new(InMemoryBroker::new(8)), RawCodec).unwrap() });
    let publisher = mux.new_sync_publisher("bench").unwrap();
    let payload = Bytes::from_static(b"payload");

    c.bench_function("sync_publish_no_watchers", |b| {
        let publisher = &publisher;
        let payload = &payload;
        b.to_async(&rt).iter(move || async move {
            black_box(publisher.publish("key", payload.clone()).await.unwrap());
        })
    });
}

fn bench_async_publish(c: &mut Criterion) {
    let rt = runtime();
    let acked = Arc::new(AtomicU64::new(0));
    let counter = acked.clone();
    let mux = rt.block_on(async { Mux::new(Arc::new(InMemoryBroker::new(8)), RawCodec).unwrap() });
    let publisher = mux
        .new_async_publisher_to_partition(
            "bench",
            0,
            move |_msg| {
                counter.fetch_add(1, Ordering::Relaxed);
            },
            |_err| {},
        )
        .unwrap();
    let publisher = publisher.as_async().unwrap().clone();
    let payload = Bytes::from_static(b"payload");

    c.bench_function("async_publish_enqueue", |b| {
        b.iter(|| publisher.publish(black_box("key"), payload.clone()))
    });
    black_box(acked.load(Ordering::Relaxed));
}

fn bench_publish_with_watchers(c: &mut Criterion) {
    let rt = runtime();
    let mux = rt.block_on(async {
        let mux = Mux::new(Arc::new(InMemoryBroker::new(4)), RawCodec).unwrap();
        for i in 0..10 {
            mux.new_watcher(&format!("watcher-{i}"))
                .unwrap()
                .watch(
                    |msg: logmux::Message<Bytes>| {
                        black_box(msg);
                    },
                    ["bench"],
                )
                .unwrap();
        }
        mux
    });
    let publisher = mux.new_sync_publisher("bench").unwrap();
    let payload = Bytes::from_static(b"payload");

    c.bench_function("sync_publish_10_watchers", |b| {
        let publisher = &publisher;
        let payload = &payload;
        b.to_async(&rt).iter(move || async move {
            black_box(publisher.publish("key", payload.clone()).await.unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_sync_publish,
    bench_async_publish,
    bench_publish_with_watchers
);
criterion_main!(benches);
