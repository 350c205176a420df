//! 总线占用统计
//!
//! 按帧累计线上位数（含位填充估计），每秒输出一次占用率。
//! 占用率不封顶：最坏情况位填充估计下可能超过 100%，
//! 该读数用于提示总线接近饱和，不做钳制。

use std::time::{Duration, Instant};

use motus_can::MotusFrame;
use motus_protocol::ctw::frame_bits;
use tracing::info;

/// 报告间隔
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// 统计窗口
#[derive(Debug)]
pub struct BusStats {
    bits_sent: u64,
    bits_received: u64,
    frames_sent: u64,
    frames_received: u64,
    window_start: Instant,
}

impl Default for BusStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BusStats {
    pub fn new() -> Self {
        Self {
            bits_sent: 0,
            bits_received: 0,
            frames_sent: 0,
            frames_received: 0,
            window_start: Instant::now(),
        }
    }

    pub fn record_sent(&mut self, frame: &MotusFrame) {
        self.bits_sent += frame_bits(frame.len as usize, frame.is_extended) as u64;
        self.frames_sent += 1;
    }

    pub fn record_received(&mut self, frame: &MotusFrame) {
        self.bits_received += frame_bits(frame.len as usize, frame.is_extended) as u64;
        self.frames_received += 1;
    }

    /// 当前窗口的占用率（%）
    pub fn utilization_percent(&self, bitrate: u32) -> f64 {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed <= 0.0 || bitrate == 0 {
            return 0.0;
        }
        (self.bits_sent + self.bits_received) as f64 / (bitrate as f64 * elapsed) * 100.0
    }

    /// 窗口满一秒时输出报告并重开窗口，返回本窗口的占用率
    pub fn maybe_report(&mut self, bitrate: u32) -> Option<f64> {
        if self.window_start.elapsed() < REPORT_INTERVAL {
            return None;
        }
        let percent = self.utilization_percent(bitrate);
        info!(
            "CAN bus utilization: {:.1}% ({} tx / {} rx frames)",
            percent, self.frames_sent, self.frames_received
        );
        self.reset();
        Some(percent)
    }

    fn reset(&mut self) {
        self.bits_sent = 0;
        self.bits_received = 0;
        self.frames_sent = 0;
        self.frames_received = 0;
        self.window_start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_accumulate() {
        let mut stats = BusStats::new();
        let frame = MotusFrame::new_standard(0x123, &[0; 8]);
        stats.record_sent(&frame);
        stats.record_received(&frame);
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.frames_received, 1);
        assert!(stats.bits_sent > 0);
        assert_eq!(stats.bits_sent, stats.bits_received);
    }

    #[test]
    fn test_no_report_before_interval() {
        let mut stats = BusStats::new();
        assert!(stats.maybe_report(1_000_000).is_none());
    }

    #[test]
    fn test_percent_not_capped() {
        let mut stats = BusStats::new();
        let frame = MotusFrame::new_standard(0x123, &[0; 8]);
        for _ in 0..10_000 {
            stats.record_sent(&frame);
        }
        std::thread::sleep(Duration::from_millis(10));
        // 1 kbit/s 的名义波特率下远超 100%
        assert!(stats.utilization_percent(1_000) > 100.0);
    }
}
