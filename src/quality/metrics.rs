//! 传输统计聚合模块
//!
//! 把原始统计报告折叠为单调不减的累计计数器
//! 每个观众连接独占一个聚合器，连接重建时重新创建

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::transport::{StatsEntry, StatsReport};

/// 计数粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricsGranularity {
    /// 只统计传输层总量
    Aggregate,
    /// 额外统计候选对与各路 outbound-rtp
    #[default]
    PerCategory,
}

/// 计数器类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterCategory {
    CandidatePair,
    Outbound,
    Transport,
}

impl CounterCategory {
    /// 按报告类型分类，未知类型返回 None
    pub fn classify(report_type: &str) -> Option<Self> {
        match report_type {
            "candidate-pair" => Some(CounterCategory::CandidatePair),
            "outbound-rtp" => Some(CounterCategory::Outbound),
            "transport" => Some(CounterCategory::Transport),
            _ => None,
        }
    }
}

/// 累计计数快照 (字节)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// 候选对层面发送字节
    pub candidate_pair_bytes_sent: u64,
    /// 媒体层面 (outbound-rtp) 发送字节
    pub outbound_bytes_sent: u64,
    /// 传输层发送字节
    pub transport_bytes_sent: u64,
    /// 传输层接收字节
    pub transport_bytes_received: u64,
    /// 传输层发送包数
    pub packets_sent: u64,
    /// 已处理的报告数
    pub report_count: u64,
}

impl MetricsSnapshot {
    /// 传输层收发总量
    pub fn total_transport_bytes(&self) -> u64 {
        self.transport_bytes_sent + self.transport_bytes_received
    }

    /// 每个计数器都不小于 `previous`
    pub fn dominates(&self, previous: &MetricsSnapshot) -> bool {
        self.candidate_pair_bytes_sent >= previous.candidate_pair_bytes_sent
            && self.outbound_bytes_sent >= previous.outbound_bytes_sent
            && self.transport_bytes_sent >= previous.transport_bytes_sent
            && self.transport_bytes_received >= previous.transport_bytes_received
            && self.packets_sent >= previous.packets_sent
            && self.report_count >= previous.report_count
    }
}

/// 字节转 MB
pub fn as_megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// 单个统计对象的最新累计值
#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    bytes_sent: u64,
    bytes_received: u64,
    packets_sent: u64,
}

/// 统计聚合器
pub struct MetricsAggregator {
    granularity: MetricsGranularity,
    /// (类别, 统计对象 ID) -> 最新累计值
    counters: HashMap<(CounterCategory, String), Counter>,
    report_count: u64,
    regressions: u64,
}

impl MetricsAggregator {
    pub fn new(granularity: MetricsGranularity) -> Self {
        Self {
            granularity,
            counters: HashMap::new(),
            report_count: 0,
            regressions: 0,
        }
    }

    /// 折叠一次统计报告，返回最新快照
    ///
    /// 报告中的字段按累计值处理：同一统计对象只保留最新值，
    /// 若新值小于旧值则保留旧值并记录告警
    pub fn ingest(&mut self, report: &StatsReport) -> MetricsSnapshot {
        for entry in report.iter() {
            let Some(category) = CounterCategory::classify(&entry.report_type) else {
                continue;
            };
            if !self.tracks(category) {
                continue;
            }
            self.fold_entry(category, entry);
        }
        self.report_count += 1;
        self.snapshot()
    }

    fn tracks(&self, category: CounterCategory) -> bool {
        match self.granularity {
            MetricsGranularity::Aggregate => category == CounterCategory::Transport,
            MetricsGranularity::PerCategory => true,
        }
    }

    fn fold_entry(&mut self, category: CounterCategory, entry: &StatsEntry) {
        let counter = self
            .counters
            .entry((category, entry.id.clone()))
            .or_default();
        let mut regressed = false;

        fold_field(&mut counter.bytes_sent, entry.bytes_sent, &mut regressed);
        fold_field(&mut counter.bytes_received, entry.bytes_received, &mut regressed);
        fold_field(&mut counter.packets_sent, entry.packets_sent, &mut regressed);

        if regressed {
            self.regressions += 1;
            log::warn!(
                "Counter regression in {:?} stats {}, keeping previous totals",
                category,
                entry.id
            );
        }
    }

    /// 当前快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            report_count: self.report_count,
            ..Default::default()
        };
        for ((category, _), counter) in &self.counters {
            match category {
                CounterCategory::CandidatePair => {
                    snapshot.candidate_pair_bytes_sent += counter.bytes_sent;
                }
                CounterCategory::Outbound => {
                    snapshot.outbound_bytes_sent += counter.bytes_sent;
                }
                CounterCategory::Transport => {
                    snapshot.transport_bytes_sent += counter.bytes_sent;
                    snapshot.transport_bytes_received += counter.bytes_received;
                    snapshot.packets_sent += counter.packets_sent;
                }
            }
        }
        snapshot
    }

    pub fn granularity(&self) -> MetricsGranularity {
        self.granularity
    }

    /// 观测到的计数回退次数
    pub fn regressions(&self) -> u64 {
        self.regressions
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(MetricsGranularity::default())
    }
}

fn fold_field(current: &mut u64, reported: Option<u64>, regressed: &mut bool) {
    if let Some(value) = reported {
        if value >= *current {
            *current = value;
        } else {
            *regressed = true;
        }
    }
}
