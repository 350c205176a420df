//! 周期执行框架
//!
//! 执行循环以绝对锚点推进：`next_tick += period`，不随单拍抖动
//! 漂移。某一拍超限时告警并把锚点重置到当前时刻，下一拍照常
//! 执行，绝不跳拍。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use motus_protocol::tcode::{AXIS_COUNT, TCodeState};
use parking_lot::Mutex;
use spin_sleep::SpinSleeper;
use tracing::{debug, info, warn};

/// 运动拓扑执行器
///
/// 每拍先 `compute`（6 维插值向量 → 输出目标），后 `execute`
/// （目标 → 硬件）。两个阶段在同一线程内串行，实现无须加锁。
pub trait Executor: Send {
    /// 解算一拍的输出目标
    fn compute(&mut self, axes: &[f32; AXIS_COUNT]);

    /// 把目标写到硬件；输出失败在实现内告警，不中断循环
    fn execute(&mut self);

    /// 进入周期循环前的准备
    fn on_start(&mut self) {}

    /// 循环退出后的清理
    fn on_stop(&mut self) {}
}

/// 统计报告间隔
const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct CycleStats {
    cycles: u64,
    total_us: u64,
    max_us: u64,
}

impl CycleStats {
    fn record(&mut self, spent: Duration) {
        let us = spent.as_micros() as u64;
        self.cycles += 1;
        self.total_us += us;
        self.max_us = self.max_us.max(us);
    }

    fn report_and_reset(&mut self) {
        if self.cycles > 0 {
            debug!(
                "executor loop: {} cycles, avg {} µs, max {} µs",
                self.cycles,
                self.total_us / self.cycles,
                self.max_us
            );
        }
        *self = Self::default();
    }
}

/// 周期执行循环句柄
pub struct ExecutorRunner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ExecutorRunner {
    /// 启动执行线程
    ///
    /// 每拍从共享轴状态取插值向量，交给执行器的 compute/execute。
    pub fn spawn(
        mut executor: Box<dyn Executor>,
        state: Arc<Mutex<TCodeState>>,
        frequency_hz: u32,
    ) -> Self {
        let period = Duration::from_secs_f64(1.0 / frequency_hz.max(1) as f64);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            info!(
                "executor loop started: {} Hz ({} µs period)",
                frequency_hz.max(1),
                period.as_micros()
            );
            executor.on_start();

            let sleeper = SpinSleeper::default();
            let mut stats = CycleStats::default();
            let mut report_at = Instant::now() + STATS_INTERVAL;
            let mut next_tick = Instant::now() + period;

            while !stop_flag.load(Ordering::Relaxed) {
                let now = Instant::now();
                if next_tick > now {
                    sleeper.sleep(next_tick - now);
                }

                let began = Instant::now();
                let axes = state.lock().interpolate();
                executor.compute(&axes);
                executor.execute();
                let spent = began.elapsed();
                stats.record(spent);

                if spent > period {
                    warn!(
                        "cycle overran: {} µs spent, {} µs period",
                        spent.as_micros(),
                        period.as_micros()
                    );
                    // 锚点重置到当前时刻，下一拍从现在起算
                    next_tick = Instant::now() + period;
                } else {
                    next_tick += period;
                }

                if Instant::now() >= report_at {
                    stats.report_and_reset();
                    report_at += STATS_INTERVAL;
                }
            }

            executor.on_stop();
            info!("executor loop stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// 请求循环退出并等待线程结束
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExecutorRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingExecutor {
        computes: Arc<Mutex<u64>>,
        executes: Arc<Mutex<u64>>,
        last_axes: Arc<Mutex<[f32; AXIS_COUNT]>>,
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }

    impl Executor for CountingExecutor {
        fn compute(&mut self, axes: &[f32; AXIS_COUNT]) {
            *self.computes.lock() += 1;
            *self.last_axes.lock() = *axes;
        }

        fn execute(&mut self) {
            // execute 必须不早于 compute
            assert!(*self.computes.lock() > *self.executes.lock());
            *self.executes.lock() += 1;
        }

        fn on_start(&mut self) {
            self.started.store(true, Ordering::Relaxed);
        }

        fn on_stop(&mut self) {
            self.stopped.store(true, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_runner_ticks_at_frequency() {
        let computes = Arc::new(Mutex::new(0u64));
        let executes = Arc::new(Mutex::new(0u64));
        let last_axes = Arc::new(Mutex::new([0.0; AXIS_COUNT]));
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));

        let executor = CountingExecutor {
            computes: Arc::clone(&computes),
            executes: Arc::clone(&executes),
            last_axes: Arc::clone(&last_axes),
            started: Arc::clone(&started),
            stopped: Arc::clone(&stopped),
        };

        let state = Arc::new(Mutex::new(TCodeState::new()));
        state.lock().preprocess("L0999");

        let mut runner = ExecutorRunner::spawn(Box::new(executor), state, 200);
        std::thread::sleep(Duration::from_millis(100));
        runner.stop();

        assert!(started.load(Ordering::Relaxed));
        assert!(stopped.load(Ordering::Relaxed));

        let n = *computes.lock();
        // 200 Hz 下 100 ms 名义 20 拍，放宽到一半以上
        assert!(n >= 10, "too few cycles: {n}");
        assert_eq!(n, *executes.lock());
        assert!((last_axes.lock()[0] - 0.999).abs() < 1e-6);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let state = Arc::new(Mutex::new(TCodeState::new()));
        let executor = CountingExecutor {
            computes: Arc::default(),
            executes: Arc::default(),
            last_axes: Arc::new(Mutex::new([0.0; AXIS_COUNT])),
            started: Arc::default(),
            stopped: Arc::default(),
        };
        let mut runner = ExecutorRunner::spawn(Box::new(executor), state, 50);
        runner.stop();
        runner.stop();
    }
}
