//! 仪表盘诊断分布统计

use std::collections::BTreeMap;

use retina_core::{BinaryDiagnosis, ExamResult, Severity};
use serde::Serialize;

/// 各严重程度的计数
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub no_dr: usize,
    pub mild: usize,
    pub moderate: usize,
    pub severe: usize,
    pub proliferate: usize,
}

impl SeverityCounts {
    pub fn increment(&mut self, severity: Severity) {
        match severity {
            Severity::NoDr => self.no_dr += 1,
            Severity::Mild => self.mild += 1,
            Severity::Moderate => self.moderate += 1,
            Severity::Severe => self.severe += 1,
            Severity::Proliferate => self.proliferate += 1,
        }
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::NoDr => self.no_dr,
            Severity::Mild => self.mild,
            Severity::Moderate => self.moderate,
            Severity::Severe => self.severe,
            Severity::Proliferate => self.proliferate,
        }
    }

    pub fn total(&self) -> usize {
        Severity::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// 诊断分布响应
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiagnosisDistribution {
    pub distribution: SeverityCounts,
    pub total_exams: usize,
    pub labels: BTreeMap<&'static str, &'static str>,
}

/// 仪表盘统计器
#[derive(Debug, Default)]
pub struct DashboardAggregator;

impl DashboardAggregator {
    pub fn new() -> Self {
        Self
    }

    /// 尚未回填分级的历史结果只能粗略归类：`No_DR` 记为 no_dr，其余记为 mild
    pub fn bucket_for(result: &ExamResult) -> Severity {
        match result.detailed_diagnosis {
            Some(severity) => severity,
            None => match result.diagnosis {
                BinaryDiagnosis::NoDr => Severity::NoDr,
                _ => Severity::Mild,
            },
        }
    }

    pub fn aggregate(&self, results: &[ExamResult]) -> DiagnosisDistribution {
        let mut distribution = SeverityCounts::default();
        for result in results {
            distribution.increment(Self::bucket_for(result));
        }

        let labels = Severity::ALL
            .iter()
            .map(|severity| (severity.as_str(), severity.label()))
            .collect();

        DiagnosisDistribution {
            total_exams: distribution.total(),
            distribution,
            labels,
        }
    }
}
