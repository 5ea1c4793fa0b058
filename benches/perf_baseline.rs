use std::hint::black_box;
use std::io::Cursor;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use gallery_viewer::image_decode::{decode_page, natord};
use gallery_viewer::notify::{Notify, NotifyKey, NotifyTaskPool, PageEvent, Relay};
use gallery_viewer::Ticket;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_fn(width, height, |x, y| image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode bench image");
    out.into_inner()
}

fn bench_relay(c: &mut Criterion) {
    c.bench_function("relay_post_and_drain_1k", |b| {
        let relay = Relay::new();
        let sender = relay.sender();
        b.iter(|| {
            for i in 0..1000u64 {
                if i % 4 == 0 {
                    sender.post_task(NotifyKey::CurrentIndex, i as i64);
                } else {
                    sender.post_page(PageEvent::Wait(Ticket::new(i as usize, i)));
                }
            }
            let mut drained = 0usize;
            while let Some(message) = relay.try_next() {
                if let Notify::Task(task) = message {
                    relay.recycle(task);
                }
                drained += 1;
            }
            black_box(drained)
        });
    });
}

fn bench_pool(c: &mut Criterion) {
    let pool = NotifyTaskPool::default();
    c.bench_function("notify_pool_acquire_release", |b| {
        b.iter(|| {
            let mut task = pool.acquire();
            task.set_data(NotifyKey::Size, black_box(12));
            pool.release(task);
        })
    });
    c.bench_function("notify_pool_overflow", |b| {
        b.iter(|| {
            let tasks: Vec<_> = (0..8).map(|_| pool.acquire()).collect();
            for task in tasks {
                pool.release(task);
            }
            black_box(pool.idle())
        })
    });
}

fn bench_decode(c: &mut Criterion) {
    let bytes = png_bytes(1024, 1536);
    c.bench_function("decode_page_png_1024x1536", |b| {
        b.iter(|| decode_page(black_box(&bytes), 0).map(|p| p.width))
    });
    c.bench_function("decode_page_png_downscaled_512", |b| {
        b.iter(|| decode_page(black_box(&bytes), 512).map(|p| p.height))
    });
}

fn bench_natural_sort(c: &mut Criterion) {
    let names: Vec<String> = (0..2000).rev().map(|i| format!("chapter{}/page{}.jpg", i / 40, i)).collect();
    c.bench_function("natural_sort_2000_names", |b| {
        b.iter_batched(
            || names.clone(),
            |mut names| {
                names.sort_by(|a, b| natord::compare(a, b));
                names
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_relay, bench_pool, bench_decode, bench_natural_sort);
criterion_main!(benches);
