// ==========================================
// 排班草案引擎 - 外部排序预言机接口
// ==========================================
// 职责: 定义可选的外部排序器 (如语言模型打分服务)
// 红线: 预言机只能对已通过硬约束的候选重新排序/补充理由
// 红线: 超时或失败时静默回退规则排序,不向调用方抛错
// ==========================================

use crate::domain::draft::{DateRange, SpecialEvent, StaffNote};
use crate::domain::shift::Shift;
use crate::domain::staff::StaffCandidate;
use crate::engine::strategy::AssignmentStrategy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 预言机上下文 (整次生成共享)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleContext {
    pub business_id: String,
    pub date_range: DateRange,
    pub strategy: AssignmentStrategy,
    pub special_events: Vec<SpecialEvent>,
    pub staff_notes: Vec<StaffNote>,
}

/// 预言机建议 (按返回顺序即排名)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSuggestion {
    pub staff_id: String,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("预言机调用超时 ({0} ms)")]
    Timeout(u64),

    #[error("预言机不可用: {0}")]
    Unavailable(String),

    #[error("预言机返回无效结果: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait RankingOracle: Send + Sync {
    /// 对候选员工排序
    ///
    /// # 参数
    /// - shift: 待分配班次
    /// - candidates: 已通过硬约束的候选
    /// - context: 生成上下文
    ///
    /// # 返回
    /// - Ok: 有序建议 (可只包含部分候选)
    /// - Err: 调用失败
    async fn rank(
        &self,
        shift: &Shift,
        candidates: &[StaffCandidate],
        context: &OracleContext,
    ) -> Result<Vec<OracleSuggestion>, OracleError>;

    fn name(&self) -> &str {
        "ranking-oracle"
    }
}

/// 本次生成的预言机状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OracleStatus {
    /// 未配置预言机
    NotConfigured,
    /// 全部调用成功 (calls 为实际产生建议的调用次数)
    Succeeded { calls: usize },
    /// 出现失败,已回退规则排序
    FellBack { reason: String },
}

impl OracleStatus {
    /// 预言机至少参与过一次排序且从未失败
    pub fn is_ai_assisted(&self) -> bool {
        matches!(self, OracleStatus::Succeeded { calls } if *calls > 0)
    }
}
