//! 严重程度分级器
//!
//! 根据推理服务给出的两个概率计算五级严重程度和兼容旧客户端的二分类诊断。
//! 两个函数相互独立，在边界附近可能给出方向不一致的结论（例如 `p_dr = 0.45`
//! 得到 `No_DR` 但分级为 `mild`），保持现状。

use crate::models::{BinaryDiagnosis, Severity};

/// 未见病变概率的短路阈值
const NO_DR_SHORT_CIRCUIT: f64 = 0.95;
/// 高风险分支阈值
const HIGH_DR: f64 = 0.8;
const MODERATE_DR: f64 = 0.6;
const MILD_DR: f64 = 0.4;
/// 二分类阈值
const BINARY_DR: f64 = 0.5;

/// 将 (p_dr, p_no_dr) 映射到五级严重程度，所有比较均为闭区间
pub fn classify(probability_dr: f64, probability_no_dr: f64) -> Severity {
    let confidence = (probability_dr - probability_no_dr).abs();

    if probability_no_dr >= NO_DR_SHORT_CIRCUIT {
        return Severity::NoDr;
    }

    if probability_dr >= HIGH_DR {
        return if confidence >= 0.7 {
            Severity::Proliferate
        } else if confidence >= 0.5 {
            Severity::Severe
        } else if confidence >= 0.3 {
            Severity::Moderate
        } else {
            Severity::Mild
        };
    }

    if probability_dr >= MODERATE_DR {
        Severity::Moderate
    } else if probability_dr >= MILD_DR {
        Severity::Mild
    } else {
        Severity::NoDr
    }
}

/// 二分类诊断：`p_dr >= 0.5` 即为 DR
pub fn binary(probability_dr: f64) -> BinaryDiagnosis {
    if probability_dr >= BINARY_DR {
        BinaryDiagnosis::Dr
    } else {
        BinaryDiagnosis::NoDr
    }
}
