use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use digest_scheduler_core::{SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
///
/// 接受标准5字段（`分 时 日 月 周`）和带秒的6字段（`秒 分 时 日 月 周`）表达式，
/// 周字段使用 0-7（0 和 7 均表示周日）。所有时间按 UTC 计算。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize_expression(cron_expr)?;
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        debug!(expr = cron_expr, normalized = %normalized, "解析CRON表达式");

        Ok(Self {
            expression: cron_expr.to_string(),
            schedule,
        })
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.schedule.after(&now).next().map(|next| next - now)
    }

    /// 获取任务的执行频率描述
    pub fn get_frequency_description(&self) -> String {
        let upcoming = self.upcoming_times(Utc::now(), 2);
        if upcoming.len() >= 2 {
            let interval = upcoming[1] - upcoming[0];
            let seconds = interval.num_seconds();

            match seconds {
                s if s < 60 => format!("每{s}秒"),
                s if s < 3600 => format!("每{}分钟", s / 60),
                s if s < 86400 => format!("每{}小时", s / 3600),
                s if s < 604800 => format!("每{}天", s / 86400),
                s => format!("每{}周", s / 604800),
            }
        } else {
            "无法确定频率".to_string()
        }
    }
}

/// 转换为 cron crate 的6字段格式：补齐秒字段，并把周字段从 0-7（周日=0/7）映射到 1-7（周日=1）
fn normalize_expression(cron_expr: &str) -> SchedulerResult<String> {
    let fields: Vec<&str> = cron_expr.split_whitespace().collect();

    let (seconds, rest) = match fields.len() {
        5 => ("0", &fields[..]),
        6 => (fields[0], &fields[1..]),
        n => {
            return Err(SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                message: format!("期望5或6个字段，实际为{n}个"),
            })
        }
    };

    let day_of_week = normalize_day_of_week(rest[4]).map_err(|message| SchedulerError::InvalidCron {
        expr: cron_expr.to_string(),
        message,
    })?;

    Ok(format!(
        "{} {} {} {} {} {}",
        seconds, rest[0], rest[1], rest[2], rest[3], day_of_week
    ))
}

fn normalize_day_of_week(field: &str) -> Result<String, String> {
    let parts: Result<Vec<String>, String> = field.split(',').map(normalize_day_part).collect();
    Ok(parts?.join(","))
}

fn normalize_day_part(part: &str) -> Result<String, String> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (part, None),
    };
    let suffix = step.map(|s| format!("/{s}")).unwrap_or_default();

    if let Some((start, end)) = range.split_once('-') {
        let (Some(start), Some(end)) = (parse_day(start)?, parse_day(end)?) else {
            return Ok(part.to_string());
        };
        if end == 7 && start <= 6 {
            return match step {
                // 带步长时先展开成具体日期，周日映射后可能出现在列表开头
                Some(step) => expand_day_range(start, end, step),
                // 跨越周日的区间拆分为两段
                None => Ok(format!("{}-7,1", start + 1)),
            };
        }
        return Ok(format!("{}-{}{}", shift_day(start), shift_day(end), suffix));
    }

    match parse_day(range)? {
        Some(day) => Ok(format!("{}{}", shift_day(day), suffix)),
        None => Ok(part.to_string()),
    }
}

fn expand_day_range(start: u32, end: u32, step: &str) -> Result<String, String> {
    let step: usize = step
        .parse()
        .ok()
        .filter(|step| *step > 0)
        .ok_or_else(|| format!("无效的星期步长: {step}"))?;

    let mut days: Vec<u32> = (start..=end).step_by(step).map(shift_day).collect();
    days.sort_unstable();
    days.dedup();
    Ok(days
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

/// 数字返回 Some，`*`/`?`/英文缩写返回 None 原样保留
fn parse_day(value: &str) -> Result<Option<u32>, String> {
    if !value.chars().all(|c| c.is_ascii_digit()) || value.is_empty() {
        return Ok(None);
    }
    let day: u32 = value
        .parse()
        .map_err(|_| format!("无效的星期值: {value}"))?;
    if day > 7 {
        return Err(format!("星期值超出范围(0-7): {day}"));
    }
    Ok(Some(day))
}

fn shift_day(day: u32) -> u32 {
    if day == 7 {
        1
    } else {
        day + 1
    }
}
