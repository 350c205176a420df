//! 传输层数据包与指令解析线程
//!
//! 所有传输通道（串口、TCP、UDP、WebSocket、BLE、Handy）把收到的
//! 原始字节封装成 [`DataPacket`] 投入同一条指令队列；解析线程
//! 逐包取出、剥掉行尾、拦截版本握手，其余交给 TCode 状态机。
//! 握手应答原样回写到数据包携带的回写通道，绝不进入解析器。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use motus_protocol::tcode::{HANDSHAKE_REPLY, TCodeState, is_handshake};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// 数据包来源通道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSource {
    Uart,
    Tcp,
    Udp,
    WebSocket,
    Ble,
    Handy,
}

/// 一包来自传输层的原始指令字节
#[derive(Debug, Clone)]
pub struct DataPacket {
    pub source: PacketSource,
    pub payload: Vec<u8>,
    /// 回写通道（握手应答用）；无回写能力的来源为 None
    pub reply: Option<Sender<String>>,
}

/// 创建指令队列（多生产者单消费者）
pub fn command_queue() -> (Sender<DataPacket>, Receiver<DataPacket>) {
    unbounded()
}

/// 每轮等待上限，保证退出标志及时生效
const RECV_TIMEOUT: Duration = Duration::from_millis(10);

/// 指令解析线程句柄
pub struct ParserThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ParserThread {
    /// 启动解析线程：有包就解析，与执行节拍解耦
    pub fn spawn(queue: Receiver<DataPacket>, state: Arc<Mutex<TCodeState>>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            debug!("parser thread started");
            while !stop_flag.load(Ordering::Relaxed) {
                match queue.recv_timeout(RECV_TIMEOUT) {
                    Ok(packet) => handle_packet(&packet, &state),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("command queue closed, parser thread exiting");
                        break;
                    },
                }
            }
            debug!("parser thread stopped");
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

impl Drop for ParserThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 处理一包指令
///
/// 握手行（整行 `D1`）只触发应答，不改写轴状态；
/// 其余行剥掉 CR/LF 后整行送入状态机。
fn handle_packet(packet: &DataPacket, state: &Mutex<TCodeState>) {
    let text = String::from_utf8_lossy(&packet.payload);
    let line = text.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return;
    }

    if is_handshake(line) {
        debug!("handshake from {:?}", packet.source);
        if let Some(reply) = &packet.reply
            && reply.send(HANDSHAKE_REPLY.to_string()).is_err()
        {
            warn!("handshake reply channel closed ({:?})", packet.source);
        }
        return;
    }

    state.lock().preprocess(line);
}
