//! Render loop throughput: one tick over a full batch of log lines.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use update_manager::events::CommandChannel;
use update_manager::metrics::Metrics;
use update_manager::render::{
    DisplayError, DisplaySink, RenderPolicy, RenderScheduler, SchedulerConfig,
};

struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn append_log(&mut self, line: &str) -> Result<(), DisplayError> {
        black_box(line);
        Ok(())
    }

    fn replace_log(&mut self, lines: &[&str]) -> Result<(), DisplayError> {
        black_box(lines);
        Ok(())
    }

    fn set_progress(&mut self, percent: u8) -> Result<(), DisplayError> {
        black_box(percent);
        Ok(())
    }

    fn set_status(&mut self, text: &str) -> Result<(), DisplayError> {
        black_box(text);
        Ok(())
    }

    fn set_controls_enabled(&mut self, enabled: bool) -> Result<(), DisplayError> {
        black_box(enabled);
        Ok(())
    }
}

fn loaded_scheduler(policy: RenderPolicy) -> RenderScheduler {
    let config = SchedulerConfig {
        batch_cap: 500,
        ..SchedulerConfig::default()
    };
    let scheduler = RenderScheduler::new(CommandChannel::new(), config, policy, Arc::new(Metrics::new()));
    let sender = scheduler.sender();
    for i in 0..500 {
        sender.log(format!("[{i}/500] Installing windows10.0-kb{}-x64.msu...", 5_000_000 + i));
        if i % 10 == 0 {
            sender.progress(i / 5);
        }
    }
    scheduler
}

fn bench_render_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_tick");
    for (name, policy) in [
        ("immediate", RenderPolicy::Immediate),
        ("windowed", RenderPolicy::Windowed { window: 100 }),
    ] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || loaded_scheduler(policy),
                |mut scheduler| scheduler.tick(&mut NullDisplay),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_render_tick);
criterion_main!(benches);
