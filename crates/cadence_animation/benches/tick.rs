//! Scheduler tick benchmarks
//!
//! Measures one `update_animations_time` pass over many running animations.
//!
//! Run with: `cargo bench --bench tick`

use cadence_animation::{LeafAnimation, UnifiedTimer};
use cadence_core::{EventLoop, ManualClock};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::rc::Rc;

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_animations_time");

    let clock = Rc::new(ManualClock::new());
    let event_loop = EventLoop::current();
    event_loop.set_clock(clock.clone());

    for count in [10usize, 100, 1_000] {
        let animations: Vec<LeafAnimation> = (0..count)
            .map(|_| {
                let animation = LeafAnimation::with_callback(1_000, |_, time| {
                    black_box(time);
                });
                animation.set_loop_count(-1);
                animation.start();
                animation
            })
            .collect();
        event_loop.process_events();

        let timer = UnifiedTimer::instance();
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |bench, _| {
            bench.iter(|| {
                clock.advance(16);
                timer.update_animations_time();
            });
        });

        for animation in &animations {
            animation.stop();
        }
        event_loop.process_events();
    }

    group.finish();
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
