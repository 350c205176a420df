//! 电机反馈缓存
//!
//! 后台接收线程是唯一写入方；控制循环按值拷贝读出，
//! 不跨层共享引用。

/// 总线上最多支持的节点数（节点号 1..=8）
pub const MAX_NODES: usize = 8;

/// 单个电机的最新反馈快照
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorFeedback {
    /// 位置估计（rad 或圈，随控制器配置）
    pub position: f32,
    /// 速度估计
    pub velocity: f32,
    /// 力矩估计
    pub torque: f32,
    /// 当前轴状态机状态
    pub axis_state: u8,
    /// 电机是否上电闭环
    pub motor_armed: bool,
    /// 故障字（无故障为 0）
    pub fault_code: u64,
    /// 最后一次更新的时间戳（µs，0 表示从未收到反馈）
    pub last_update_us: u64,
}

/// 全部节点的反馈缓存
#[derive(Debug, Default)]
pub struct FeedbackCache {
    nodes: [MotorFeedback; MAX_NODES],
}

impl FeedbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读出节点反馈的拷贝；节点号超出 1..=8 返回 None
    pub fn get(&self, node_id: u8) -> Option<MotorFeedback> {
        if (1..=MAX_NODES as u8).contains(&node_id) {
            Some(self.nodes[(node_id - 1) as usize])
        } else {
            None
        }
    }

    /// 原位更新节点反馈；节点号非法时静默忽略
    pub fn update(&mut self, node_id: u8, f: impl FnOnce(&mut MotorFeedback)) {
        if (1..=MAX_NODES as u8).contains(&node_id) {
            f(&mut self.nodes[(node_id - 1) as usize]);
        }
    }
}
