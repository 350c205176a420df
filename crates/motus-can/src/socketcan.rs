//! SocketCAN CAN 适配器实现
//!
//! 基于 Linux 内核 SocketCAN 子系统。接口波特率等配置由系统工具
//! （`ip link set can0 type can bitrate 1000000`）完成，不在应用层设置。
//!
//! ## 限制
//!
//! - 仅限 Linux 平台
//! - 接口必须已存在且处于 UP 状态
//! - 可能需要 `dialout` 组权限或 `sudo`

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket, StandardId};
use tracing::{trace, warn};

use crate::{CanAdapter, CanError, MotusFrame, RxAdapter, SplittableAdapter, TxAdapter};

/// SocketCAN 适配器
#[derive(Debug)]
pub struct SocketCanAdapter {
    socket: CanSocket,
    interface: String,
    read_timeout: Duration,
}

impl SocketCanAdapter {
    /// 打开指定 CAN 接口（如 "can0" / "vcan0"）
    ///
    /// 默认读超时 2ms，保证后台接收线程能及时响应退出信号。
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        let socket = CanSocket::open(&interface).map_err(|e| {
            CanError::Device(
                format!("Failed to open CAN interface '{}': {}", interface, e).into(),
            )
        })?;

        let read_timeout = Duration::from_millis(2);
        socket.set_read_timeout(read_timeout).map_err(CanError::Io)?;

        trace!("SocketCAN interface '{}' opened", interface);

        Ok(Self {
            socket,
            interface,
            read_timeout,
        })
    }

    /// 接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 当前读超时
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// 设置读超时
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), CanError> {
        self.socket.set_read_timeout(timeout).map_err(CanError::Io)?;
        self.read_timeout = timeout;
        Ok(())
    }

    fn now_us() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

fn to_can_frame(frame: &MotusFrame) -> Result<CanFrame, CanError> {
    if frame.is_extended {
        ExtendedId::new(frame.id)
            .and_then(|id| CanFrame::new(id, frame.data_slice()))
            .ok_or_else(|| {
                CanError::Device(
                    format!("Failed to create extended frame with ID 0x{:X}", frame.id).into(),
                )
            })
    } else {
        StandardId::new(frame.id as u16)
            .and_then(|id| CanFrame::new(id, frame.data_slice()))
            .ok_or_else(|| {
                CanError::Device(
                    format!("Failed to create standard frame with ID 0x{:X}", frame.id).into(),
                )
            })
    }
}

fn from_can_frame(can_frame: &CanFrame, timestamp_us: u64) -> MotusFrame {
    let id_bits = if can_frame.is_extended() {
        can_frame.raw_id() & 0x1FFF_FFFF
    } else {
        can_frame.raw_id() & 0x7FF
    };

    let mut data = [0u8; 8];
    let payload = can_frame.data();
    let len = payload.len().min(8);
    data[..len].copy_from_slice(&payload[..len]);

    MotusFrame {
        id: id_bits,
        data,
        len: len as u8,
        is_extended: can_frame.is_extended(),
        timestamp_us,
    }
}

fn read_one(socket: &CanSocket, interface: &str) -> Result<MotusFrame, CanError> {
    loop {
        let can_frame = match socket.read_frame() {
            Ok(frame) => frame,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(CanError::Timeout);
            },
            Err(e) => return Err(CanError::Io(e)),
        };

        if can_frame.is_error_frame() {
            warn!("CAN error frame received on '{}', ignoring", interface);
            continue;
        }

        let frame = from_can_frame(&can_frame, SocketCanAdapter::now_us());
        trace!(
            "Received CAN frame: ID=0x{:X}, len={}, timestamp_us={}",
            frame.id, frame.len, frame.timestamp_us
        );
        return Ok(frame);
    }
}

/// SocketCAN 接收半端（独立 socket，可与发送端并发使用）
#[derive(Debug)]
pub struct SocketCanRxAdapter {
    socket: CanSocket,
    interface: String,
    read_timeout: Duration,
}

/// SocketCAN 发送半端
#[derive(Debug)]
pub struct SocketCanTxAdapter {
    socket: CanSocket,
    interface: String,
}

impl RxAdapter for SocketCanRxAdapter {
    fn receive(&mut self) -> Result<MotusFrame, CanError> {
        read_one(&self.socket, &self.interface)
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<MotusFrame, CanError> {
        if timeout != self.read_timeout {
            self.socket.set_read_timeout(timeout).map_err(CanError::Io)?;
            self.read_timeout = timeout;
        }
        read_one(&self.socket, &self.interface)
    }
}

impl TxAdapter for SocketCanTxAdapter {
    fn send(&mut self, frame: MotusFrame) -> Result<(), CanError> {
        let can_frame = to_can_frame(&frame)?;
        self.socket.write_frame(&can_frame).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "SocketCAN transmit error on '{}': {}",
                self.interface, e
            )))
        })
    }
}

impl SplittableAdapter for SocketCanAdapter {
    type RxAdapter = SocketCanRxAdapter;
    type TxAdapter = SocketCanTxAdapter;

    /// 分离为独立的 RX 和 TX 适配器
    ///
    /// 内核允许同一接口打开多个 raw socket，发送端另开一个
    /// socket，两端互不影响超时设置。
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        let tx_socket = CanSocket::open(&self.interface).map_err(|e| {
            CanError::Device(
                format!(
                    "Failed to open TX socket on CAN interface '{}': {}",
                    self.interface, e
                )
                .into(),
            )
        })?;

        Ok((
            SocketCanRxAdapter {
                socket: self.socket,
                interface: self.interface.clone(),
                read_timeout: self.read_timeout,
            },
            SocketCanTxAdapter {
                socket: tx_socket,
                interface: self.interface,
            },
        ))
    }
}

impl CanAdapter for SocketCanAdapter {
    fn send(&mut self, frame: MotusFrame) -> Result<(), CanError> {
        let can_frame = to_can_frame(&frame)?;

        self.socket.write_frame(&can_frame).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "SocketCAN transmit error: {}",
                e
            )))
        })?;

        trace!("Sent CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(())
    }

    /// 接收帧（阻塞直到收到有效数据帧或超时），自动跳过错误帧
    fn receive(&mut self) -> Result<MotusFrame, CanError> {
        read_one(&self.socket, &self.interface)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if let Err(e) = self.set_read_timeout(timeout) {
            warn!("Failed to set receive timeout: {}", e);
        }
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<MotusFrame, CanError> {
        let old_timeout = self.read_timeout;
        self.set_read_timeout(timeout)?;
        let result = self.receive();
        let _ = self.set_read_timeout(old_timeout);
        result
    }
}
