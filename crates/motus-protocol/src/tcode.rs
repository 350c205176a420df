//! TCode 运动指令文法与时间插值
//!
//! 指令流是以空格分隔的 ASCII token，每个 token 匹配五步文法：
//! 轴字母 → 单个轴编号数字 → 数值数字串（按十进制位数归一化，
//! `"500"` → 0.500）→ 可选扩展字母 → 可选扩展数字串。
//! 扩展类型 `I` 表示从上一条指令值到本条指令值按毫秒时长线性插值。
//!
//! 六个逻辑轴（L0/L1/L2/R0/R1/R2）各自保存 `current`/`last` 两条指令，
//! `interpolate()` 每次调用根据单调时钟计算出 6 维插值向量。

use std::time::Instant;

/// 协议版本握手指令（不进入轴状态）
pub const HANDSHAKE_COMMAND: &str = "D1";

/// 握手应答，原样回写到来源传输通道
pub const HANDSHAKE_REPLY: &str = "TCode v0.3\n";

/// 判断一行输入是否为版本握手
///
/// 只有整行恰好是 `D1`（允许尾随 CR/LF）才算握手，
/// 握手行绝不进入 TCode 解析器。
pub fn is_handshake(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']) == HANDSHAKE_COMMAND
}

/// 逻辑轴标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    L0,
    L1,
    L2,
    R0,
    R1,
    R2,
}

/// 轴数量（插值向量维度）
pub const AXIS_COUNT: usize = 6;

impl Axis {
    /// 插值向量中的下标：[L0, L1, L2, R0, R1, R2]
    pub const fn index(self) -> usize {
        match self {
            Axis::L0 => 0,
            Axis::L1 => 1,
            Axis::L2 => 2,
            Axis::R0 => 3,
            Axis::R1 => 4,
            Axis::R2 => 5,
        }
    }

    /// 从轴字母和编号字符路由（字母大小写不敏感）
    ///
    /// 不认识的字母或编号返回 `None`，调用方静默丢弃。
    pub fn from_type_num(axis_type: char, axis_num: char) -> Option<Axis> {
        match (axis_type.to_ascii_uppercase(), axis_num) {
            ('L', '0') => Some(Axis::L0),
            ('L', '1') => Some(Axis::L1),
            ('L', '2') => Some(Axis::L2),
            ('R', '0') => Some(Axis::R0),
            ('R', '1') => Some(Axis::R1),
            ('R', '2') => Some(Axis::R2),
            _ => None,
        }
    }
}

/// 一条已解析的轴指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TCodeCommand {
    /// 轴类型字母（L/R），未匹配到为 None
    pub axis_type: Option<char>,
    /// 轴编号字符（'0'-'2'），未匹配到为 None
    pub axis_num: Option<char>,
    /// 归一化轴值：数字串 / 10^位数，"5"→0.5，"500"→0.500
    pub axis_value: f32,
    /// 扩展类型字母，'I' 表示按时长插值
    pub extend_type: Option<char>,
    /// 扩展数值（'I' 时为插值时长毫秒），溢出时饱和
    pub extend_value: u16,
    /// 解析时刻的单调微秒时间戳
    pub receive_time_us: u64,
}

impl TCodeCommand {
    /// 轴状态的初始指令：居中 (0.5)，无扩展
    fn centered() -> Self {
        Self {
            axis_type: None,
            axis_num: None,
            axis_value: 0.5,
            extend_type: None,
            extend_value: 0,
            receive_time_us: 0,
        }
    }

    /// 是否带按时长插值的扩展（extend_type 为 I/i 且时长非零）
    fn has_interpolation(&self) -> bool {
        self.extend_value > 0
            && matches!(self.extend_type, Some(c) if c.eq_ignore_ascii_case(&'I'))
    }
}

/// 解析单个 token（五步文法）
///
/// 每一步都是可选的前缀匹配：不匹配的前导字符让对应字段保持默认值，
/// 解析永不失败。数字串在 u64 中饱和累加，绝不 panic。
pub fn match_token(token: &str) -> TCodeCommand {
    let bytes = token.as_bytes();
    let mut i = 0;

    let mut cmd = TCodeCommand {
        axis_type: None,
        axis_num: None,
        axis_value: 0.0,
        extend_type: None,
        extend_value: 0,
        receive_time_us: 0,
    };

    // 第一步：轴类型（字母）
    if i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        cmd.axis_type = Some(bytes[i] as char);
        i += 1;
    }

    // 第二步：轴编号（单个数字）
    if i < bytes.len() && bytes[i].is_ascii_digit() {
        cmd.axis_num = Some(bytes[i] as char);
        i += 1;
    }

    // 第三步：轴值（数字串，按位数归一化）
    let mut value: u64 = 0;
    let mut digits: u32 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add((bytes[i] - b'0') as u64);
        digits += 1;
        i += 1;
    }
    if digits > 0 {
        cmd.axis_value = (value as f64 / 10f64.powi(digits as i32)) as f32;
    }

    // 第四步：扩展类型（字母，可选）
    if i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        cmd.extend_type = Some(bytes[i] as char);
        i += 1;

        // 第五步：扩展值（数字串，可选，饱和到 u16）
        let mut extend: u32 = 0;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            extend = extend
                .saturating_mul(10)
                .saturating_add((bytes[i] - b'0') as u32);
            i += 1;
        }
        cmd.extend_value = extend.min(u16::MAX as u32) as u16;
    }

    cmd
}

/// 单轴的 current/last 指令对
#[derive(Debug, Clone, Copy)]
struct AxisSlot {
    current: TCodeCommand,
    last: TCodeCommand,
}

impl AxisSlot {
    fn new() -> Self {
        Self {
            current: TCodeCommand::centered(),
            last: TCodeCommand::centered(),
        }
    }

    /// 单轴插值：带 I 扩展时从 last 线性过渡到 current，否则直接取 current
    ///
    /// t 按 (now - receiveTime) / duration 计算并钳制到 [0,1]，
    /// 超过时长后恒等于 current，绝不外推。
    fn interpolate_at(&self, now_us: u64) -> f32 {
        if !self.current.has_interpolation() {
            return self.current.axis_value;
        }

        let duration_us = self.current.extend_value as u64 * 1000;
        let elapsed_us = now_us.saturating_sub(self.current.receive_time_us);
        let t = (elapsed_us as f32 / duration_us as f32).clamp(0.0, 1.0);

        self.last.axis_value + (self.current.axis_value - self.last.axis_value) * t
    }
}

/// 六轴 TCode 状态机
///
/// 状态只被 `preprocess`/`process_token` 改写，`interpolate` 只读。
/// 本类型自身不加锁；跨线程共享时由持有者用互斥锁保护
/// （解析线程写 / 控制循环读）。
#[derive(Debug)]
pub struct TCodeState {
    axes: [AxisSlot; AXIS_COUNT],
    epoch: Instant,
}

impl Default for TCodeState {
    fn default() -> Self {
        Self::new()
    }
}

impl TCodeState {
    /// 创建状态机，所有轴初始化为居中 (0.5)
    pub fn new() -> Self {
        Self {
            axes: [AxisSlot::new(); AXIS_COUNT],
            epoch: Instant::now(),
        }
    }

    /// 当前单调微秒时间戳（相对状态机创建时刻）
    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// 处理一整行指令：按空格拆分后逐个 token 处理
    pub fn preprocess(&mut self, line: &str) {
        let now_us = self.now_us();
        for token in line.split(' ') {
            if !token.is_empty() {
                self.process_token_at(token, now_us);
            }
        }
    }

    /// 处理单个 token（使用当前时钟打时间戳）
    pub fn process_token(&mut self, token: &str) {
        self.process_token_at(token, self.now_us());
    }

    /// 处理单个 token，显式给定接收时间戳
    ///
    /// 解析结果路由到对应轴：原 current 退为 last，新指令成为 current。
    /// 路由不到的 token 静默丢弃。
    pub fn process_token_at(&mut self, token: &str, now_us: u64) {
        let mut cmd = match_token(token);
        cmd.receive_time_us = now_us;

        let (Some(axis_type), Some(axis_num)) = (cmd.axis_type, cmd.axis_num) else {
            return;
        };
        let Some(axis) = Axis::from_type_num(axis_type, axis_num) else {
            return;
        };

        let slot = &mut self.axes[axis.index()];
        slot.last = slot.current;
        slot.current = cmd;
    }

    /// 计算 6 维插值向量 [L0, L1, L2, R0, R1, R2]
    pub fn interpolate(&self) -> [f32; AXIS_COUNT] {
        self.interpolate_at(self.now_us())
    }

    /// 在给定时刻计算插值向量
    pub fn interpolate_at(&self, now_us: u64) -> [f32; AXIS_COUNT] {
        let mut out = [0.0f32; AXIS_COUNT];
        for (i, slot) in self.axes.iter().enumerate() {
            out[i] = slot.interpolate_at(now_us);
        }
        out
    }

    /// 某一轴的当前指令（只读）
    pub fn current(&self, axis: Axis) -> &TCodeCommand {
        &self.axes[axis.index()].current
    }

    /// 某一轴的上一条指令（只读）
    pub fn last(&self, axis: Axis) -> &TCodeCommand {
        &self.axes[axis.index()].last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_basic_token() {
        let cmd = match_token("L0500");
        assert_eq!(cmd.axis_type, Some('L'));
        assert_eq!(cmd.axis_num, Some('0'));
        assert_eq!(cmd.axis_value, 0.500);
        assert_eq!(cmd.extend_type, None);
        assert_eq!(cmd.extend_value, 0);
    }

    #[test]
    fn test_match_digit_count_normalization() {
        // 位数决定精度："5" 和 "500" 都是 0.5，但来自不同位数
        assert_eq!(match_token("L05").axis_value, 0.5);
        assert_eq!(match_token("L0500").axis_value, 0.500);
        assert_eq!(match_token("R125").axis_value, 0.25);
        assert_eq!(match_token("R1999").axis_value, 0.999);
    }

    #[test]
    fn test_match_with_extension() {
        let cmd = match_token("R1250I300");
        assert_eq!(cmd.axis_type, Some('R'));
        assert_eq!(cmd.axis_num, Some('1'));
        assert_eq!(cmd.axis_value, 0.250);
        assert_eq!(cmd.extend_type, Some('I'));
        assert_eq!(cmd.extend_value, 300);
    }

    #[test]
    fn test_match_garbage_keeps_defaults() {
        let cmd = match_token("!!");
        assert_eq!(cmd.axis_type, None);
        assert_eq!(cmd.axis_num, None);
        assert_eq!(cmd.axis_value, 0.0);
    }

    #[test]
    fn test_match_extend_value_saturates() {
        let cmd = match_token("L0500I99999999999999");
        assert_eq!(cmd.extend_value, u16::MAX);
    }

    #[test]
    fn test_axis_routing_case_insensitive() {
        assert_eq!(Axis::from_type_num('l', '0'), Some(Axis::L0));
        assert_eq!(Axis::from_type_num('r', '2'), Some(Axis::R2));
        assert_eq!(Axis::from_type_num('L', '3'), None);
        assert_eq!(Axis::from_type_num('X', '0'), None);
    }

    #[test]
    fn test_state_initial_center() {
        let state = TCodeState::new();
        assert_eq!(state.interpolate_at(0), [0.5; 6]);
    }

    #[test]
    fn test_process_token_shifts_current_to_last() {
        let mut state = TCodeState::new();
        state.process_token_at("L0100", 1_000);
        state.process_token_at("L0900", 2_000);
        assert_eq!(state.last(Axis::L0).axis_value, 0.100);
        assert_eq!(state.current(Axis::L0).axis_value, 0.900);
    }

    #[test]
    fn test_interpolate_without_extension_is_immediate() {
        let mut state = TCodeState::new();
        state.process_token_at("L0250", 1_000);
        assert_eq!(state.interpolate_at(1_000)[0], 0.250);
        assert_eq!(state.interpolate_at(999_000)[0], 0.250);
    }

    #[test]
    fn test_interpolate_zero_duration_is_immediate() {
        let mut state = TCodeState::new();
        state.process_token_at("L0750I0", 1_000);
        // 时长为 0：立即取 current，不能出现除零
        assert_eq!(state.interpolate_at(1_000)[0], 0.750);
    }

    #[test]
    fn test_interpolate_endpoints() {
        let mut state = TCodeState::new();
        state.process_token_at("L0000", 0);
        state.process_token_at("L0999I1000", 0);

        // t<=0 返回 last，t>=duration 返回 current
        assert_eq!(state.interpolate_at(0)[0], 0.000);
        assert_eq!(state.interpolate_at(1_000_000)[0], 0.999);
        assert_eq!(state.interpolate_at(1_500_000)[0], 0.999);
    }

    #[test]
    fn test_interpolate_monotonic_ramp() {
        let mut state = TCodeState::new();
        state.preprocess("L0000 R0500");
        state.process_token_at("L0999I1000", 0);

        let mut prev = -1.0f32;
        for ms in [0u64, 250, 500, 750, 1000, 1500] {
            let v = state.interpolate_at(ms * 1000)[0];
            assert!(v >= prev, "interpolation must be monotonic: {v} < {prev}");
            prev = v;
        }
        assert_eq!(state.interpolate_at(500_000)[0], 0.999 * 0.5);
    }

    #[test]
    fn test_unknown_axis_dropped() {
        let mut state = TCodeState::new();
        state.process_token_at("V0500", 1_000);
        state.process_token_at("L9500", 1_000);
        assert_eq!(state.interpolate_at(1_000), [0.5; 6]);
    }

    #[test]
    fn test_handshake_detection() {
        assert!(is_handshake("D1"));
        assert!(is_handshake("D1\r\n"));
        assert!(is_handshake("D1\n"));
        assert!(!is_handshake("D10"));
        assert!(!is_handshake("L0500"));
        assert!(!is_handshake("D1 L0500"));
    }

    #[test]
    fn test_handshake_not_forwarded_semantics() {
        // 握手行不应改变轴状态（由调用方先行拦截）
        let mut state = TCodeState::new();
        let line = "D1\r\n";
        assert!(is_handshake(line));
        // 调用方拦截后不调用 preprocess，轴状态保持初始值
        assert_eq!(state.interpolate_at(0), [0.5; 6]);
        // 反例：如果误送入解析器，D1 不是合法轴也不会污染状态
        state.preprocess("D1");
        assert_eq!(state.interpolate_at(0), [0.5; 6]);
    }
}
