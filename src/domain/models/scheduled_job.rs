// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::domain::models::scrape_task::DomainError;

/// 执行频率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for Frequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(DomainError::ValidationError(format!(
                "unknown frequency '{}'",
                other
            ))),
        }
    }
}

/// 重复规则
///
/// 每种频率只携带它需要的字段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "snake_case")]
pub enum Recurrence {
    Daily,
    /// `day_of_week`: 0 = 周日 … 6 = 周六
    Weekly { day_of_week: u8 },
    /// `day_of_month`: 1-31，超出当月天数时取当月最后一天
    Monthly { day_of_month: u8 },
}

impl Recurrence {
    /// 由频率和可选的日期字段构建重复规则
    ///
    /// 只读取与频率一致的字段，其余字段被忽略。
    pub fn from_parts(
        frequency: Frequency,
        day_of_week: Option<u8>,
        day_of_month: Option<u8>,
    ) -> Result<Self, DomainError> {
        match frequency {
            Frequency::Daily => Ok(Recurrence::Daily),
            Frequency::Weekly => match day_of_week {
                Some(day) if day <= 6 => Ok(Recurrence::Weekly { day_of_week: day }),
                Some(day) => Err(DomainError::ValidationError(format!(
                    "day_of_week must be within 0-6, got {}",
                    day
                ))),
                None => Err(DomainError::ValidationError(
                    "weekly jobs require day_of_week".to_string(),
                )),
            },
            Frequency::Monthly => match day_of_month {
                Some(day) if (1..=31).contains(&day) => {
                    Ok(Recurrence::Monthly { day_of_month: day })
                }
                Some(day) => Err(DomainError::ValidationError(format!(
                    "day_of_month must be within 1-31, got {}",
                    day
                ))),
                None => Err(DomainError::ValidationError(
                    "monthly jobs require day_of_month".to_string(),
                )),
            },
        }
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            Recurrence::Daily => Frequency::Daily,
            Recurrence::Weekly { .. } => Frequency::Weekly,
            Recurrence::Monthly { .. } => Frequency::Monthly,
        }
    }

    pub fn day_of_week(&self) -> Option<u8> {
        match self {
            Recurrence::Weekly { day_of_week } => Some(*day_of_week),
            _ => None,
        }
    }

    pub fn day_of_month(&self) -> Option<u8> {
        match self {
            Recurrence::Monthly { day_of_month } => Some(*day_of_month),
            _ => None,
        }
    }
}

/// 每日执行时刻 (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, DomainError> {
        if hour > 23 || minute > 59 {
            return Err(DomainError::ValidationError(format!(
                "invalid time of day {:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::ValidationError(format!("invalid time of day '{}'", s));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// 计算下一次执行时间
///
/// 纯函数：结果严格晚于 `now`。
///
/// 1. 取 `now` 当天的 `time_of_day`，若已过去（含恰好相等）则顺延一天；
/// 2. 每日：即为结果；
/// 3. 每周：顺延到下一个（含当天）星期几等于 `day_of_week` 的日期；
/// 4. 每月：移动到该日期的下一个自然月，日期取 `min(day_of_month, 当月天数)`。
pub fn next_run_after(
    recurrence: &Recurrence,
    time_of_day: TimeOfDay,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let time = time_of_day.as_naive_time();
    let mut date = now.date_naive();
    if date.and_time(time).and_utc() <= now {
        date = date + Days::new(1);
    }

    let date = match recurrence {
        Recurrence::Daily => date,
        Recurrence::Weekly { day_of_week } => {
            let current = date.weekday().num_days_from_sunday();
            let ahead = (*day_of_week as u32 + 7 - current) % 7;
            date + Days::new(ahead as u64)
        }
        Recurrence::Monthly { day_of_month } => next_month_clamped(date, *day_of_month),
    };

    date.and_time(time).and_utc()
}

fn next_month_clamped(date: NaiveDate, day_of_month: u8) -> NaiveDate {
    let first_of_month = date.with_day(1).unwrap_or(date);
    let Some(first_of_next) = first_of_month.checked_add_months(Months::new(1)) else {
        return date;
    };
    let last_day = first_of_next
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28);
    let day = (day_of_month as u32).min(last_day);
    first_of_next.with_day(day).unwrap_or(first_of_next)
}

/// 新建定时作业请求
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewScheduledJob {
    #[validate(length(min = 1, message = "Platform cannot be empty"))]
    pub platform: String,
    #[validate(url)]
    pub target_url: String,
    #[validate(length(min = 1, message = "Content type cannot be empty"))]
    pub content_type: String,
    pub frequency: Frequency,
    #[validate(range(max = 6))]
    pub day_of_week: Option<u8>,
    #[validate(range(min = 1, max = 31))]
    pub day_of_month: Option<u8>,
    #[validate(range(max = 23))]
    pub hour: u8,
    #[validate(range(max = 59))]
    pub minute: u8,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// 定时作业
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub platform: String,
    pub target_url: String,
    pub content_type: String,
    pub recurrence: Recurrence,
    pub time_of_day: TimeOfDay,
    pub active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    /// 最近一次执行的失败原因，成功后清空
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// 校验请求并创建定时作业
    ///
    /// # 参数
    ///
    /// * `new_job` - 新建请求
    /// * `now` - 当前时间，用于计算首次执行时间
    ///
    /// # 返回值
    ///
    /// * `Ok(ScheduledJob)` - 创建的作业
    /// * `Err(DomainError)` - 字段不合法
    pub fn create(new_job: NewScheduledJob, now: DateTime<Utc>) -> Result<Self, DomainError> {
        new_job
            .validate()
            .map_err(|e| DomainError::ValidationError(e.to_string()))?;
        Url::parse(&new_job.target_url)
            .map_err(|e| DomainError::ValidationError(format!("invalid target url: {}", e)))?;

        let recurrence =
            Recurrence::from_parts(new_job.frequency, new_job.day_of_week, new_job.day_of_month)?;
        let time_of_day = TimeOfDay::new(new_job.hour, new_job.minute)?;

        Ok(Self {
            id: Uuid::new_v4(),
            platform: new_job.platform,
            target_url: new_job.target_url,
            content_type: new_job.content_type,
            recurrence,
            time_of_day,
            active: new_job.active,
            last_run_at: None,
            next_run_at: next_run_after(&recurrence, time_of_day, now),
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_run_after(&self.recurrence, self.time_of_day, now)
    }

    /// 记录一次执行（无论成功失败）并推进下一次执行时间
    pub fn record_run(&mut self, now: DateTime<Utc>, error: Option<String>) {
        self.last_run_at = Some(now);
        self.next_run_at = self.next_run_after(now);
        self.last_error = error;
        self.updated_at = now;
    }
}

#[cfg(test)]
#[path = "scheduled_job_test.rs"]
mod tests;
