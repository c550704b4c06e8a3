//! 检查状态机
//!
//! 管理检查在写入结果时的状态转换。删除结果时检查无条件回到待分析，
//! 由存储层在同一事务内完成。

use retina_core::{ExamStatus, Result, RetinaError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 检查状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExamEvent {
    ResultRecorded,
}

/// 检查状态机
#[derive(Debug)]
pub struct ExamStateMachine {
    transitions: HashMap<(ExamStatus, ExamEvent), ExamStatus>,
}

impl ExamStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 只有待分析的检查可以写入结果
        transitions.insert((ExamStatus::Pending, ExamEvent::ResultRecorded), ExamStatus::Completed);

        Self { transitions }
    }

    /// 执行状态转换
    pub fn transition(&self, from: &ExamStatus, event: &ExamEvent) -> Result<ExamStatus> {
        match self.transitions.get(&(*from, *event)) {
            Some(to) => Ok(*to),
            None => Err(RetinaError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for ExamStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
