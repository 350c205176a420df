//! # Motus Driver Layer
//!
//! CAN 电机驱动：在适配层之上实现两种总线方言。
//!
//! - [`CtwBus`]：CANsimple/SDO 方言（位置环伺服，SDO 端点读写 +
//!   编码器反馈缓存 + 总线占用统计）
//! - [`MitBus`]：MIT 力控方言（动态控制帧 + 状态回包 + 故障字）
//!
//! 接收侧统一由 [`FeedbackSubscriber`] 承载：一个后台线程 +
//! 一个帧分类闭包，总线只提供分类逻辑，不各自维护接收循环。

pub mod ctw;
pub mod feedback;
pub mod mit;
pub mod stats;
pub mod subscriber;

pub use ctw::{CtwBus, CtwConfig};
pub use feedback::{FeedbackCache, MAX_NODES, MotorFeedback};
pub use mit::MitBus;
pub use stats::BusStats;
pub use subscriber::FeedbackSubscriber;

use motus_can::CanError;
use motus_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Can(#[from] CanError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid response from node {node_id}: {detail}")]
    InvalidResponse { node_id: u8, detail: String },

    #[error("node {node_id} did not respond within {timeout_ms} ms")]
    Timeout { node_id: u8, timeout_ms: u64 },
}
