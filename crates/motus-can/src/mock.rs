//! 进程内回环 CAN 总线（测试 / 仿真后端）
//!
//! `mock_bus_pair()` 返回互为对端的两个适配器：一端 `send` 的帧
//! 会出现在另一端的 `receive` 中，语义上等价于一段双节点 CAN 总线。
//! 无硬件依赖，用于驱动层和执行器层的单元测试。

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, unbounded};
use tracing::trace;

use crate::{CanAdapter, CanError, MotusFrame, RxAdapter, SplittableAdapter, TxAdapter};

/// 回环总线的一端
#[derive(Debug)]
pub struct MockCanAdapter {
    tx: Sender<MotusFrame>,
    rx: Receiver<MotusFrame>,
    read_timeout: Duration,
}

/// 创建互联的一对回环适配器
pub fn mock_bus_pair() -> (MockCanAdapter, MockCanAdapter) {
    let (a_tx, b_rx) = unbounded();
    let (b_tx, a_rx) = unbounded();
    (
        MockCanAdapter {
            tx: a_tx,
            rx: a_rx,
            read_timeout: Duration::from_millis(2),
        },
        MockCanAdapter {
            tx: b_tx,
            rx: b_rx,
            read_timeout: Duration::from_millis(2),
        },
    )
}

impl MockCanAdapter {
    /// 当前读超时
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// 尚未被本端取走的帧数
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl CanAdapter for MockCanAdapter {
    fn send(&mut self, frame: MotusFrame) -> Result<(), CanError> {
        trace!("mock send: ID=0x{:X}, len={}", frame.id, frame.len);
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CanError::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Err(CanError::NotStarted),
        }
    }

    fn receive(&mut self) -> Result<MotusFrame, CanError> {
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(CanError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(CanError::NotStarted),
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}

/// 回环总线的接收半端
#[derive(Debug)]
pub struct MockRxAdapter {
    rx: Receiver<MotusFrame>,
    read_timeout: Duration,
}

/// 回环总线的发送半端
#[derive(Debug, Clone)]
pub struct MockTxAdapter {
    tx: Sender<MotusFrame>,
}

impl RxAdapter for MockRxAdapter {
    fn receive(&mut self) -> Result<MotusFrame, CanError> {
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(CanError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(CanError::NotStarted),
        }
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<MotusFrame, CanError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(CanError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(CanError::NotStarted),
        }
    }
}

impl TxAdapter for MockTxAdapter {
    fn send(&mut self, frame: MotusFrame) -> Result<(), CanError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CanError::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Err(CanError::NotStarted),
        }
    }
}

impl SplittableAdapter for MockCanAdapter {
    type RxAdapter = MockRxAdapter;
    type TxAdapter = MockTxAdapter;

    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        Ok((
            MockRxAdapter {
                rx: self.rx,
                read_timeout: self.read_timeout,
            },
            MockTxAdapter { tx: self.tx },
        ))
    }
}
