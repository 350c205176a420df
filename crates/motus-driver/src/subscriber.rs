//! 统一的后台接收组件
//!
//! 一个线程持续从 RX 半端收帧，逐帧交给分类闭包；超时只是
//! 检查退出标志的机会，不是错误。总线方言只提供分类逻辑，
//! 不各自维护接收循环。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use motus_can::{CanError, MotusFrame, RxAdapter};
use tracing::{debug, warn};

/// 接收循环每轮的等待上限，保证退出标志能及时生效
const POLL_TIMEOUT: Duration = Duration::from_millis(2);

/// 后台接收线程句柄
pub struct FeedbackSubscriber {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FeedbackSubscriber {
    /// 启动接收线程
    ///
    /// `classifier` 对每个收到的有效帧被调用一次；它通常持有
    /// 反馈缓存和请求关联表的共享句柄。
    pub fn spawn<R, F>(mut rx: R, mut classifier: F) -> Self
    where
        R: RxAdapter + 'static,
        F: FnMut(&MotusFrame) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            debug!("feedback subscriber started");
            while !stop_flag.load(Ordering::Relaxed) {
                match rx.receive_timeout(POLL_TIMEOUT) {
                    Ok(frame) => classifier(&frame),
                    Err(CanError::Timeout) => continue,
                    Err(CanError::NotStarted) => {
                        debug!("CAN adapter gone, feedback subscriber exiting");
                        break;
                    },
                    Err(e) => {
                        warn!("CAN receive error in feedback subscriber: {}", e);
                        continue;
                    },
                }
            }
            debug!("feedback subscriber stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// 请求线程退出并等待其结束
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FeedbackSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}
