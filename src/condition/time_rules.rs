//! 基于时间的规则匹配
//!
//! 小时格式：`9-17`、`9-11,14-17`、`8`、`9:00-11:00`（分钟部分忽略），为空表示不限制。
//! 星期格式：`Mon-Fri`、`Fri-Mon`（跨周）、`Mon,Wed,Fri`，为空表示不限制。

use chrono::Weekday;

/// 判断小时是否落在给定范围内
///
/// 无法解析的片段永不匹配。
pub fn is_in_hour_range(hour: u32, hours: &str) -> bool {
    let hours = hours.trim();
    if hours.is_empty() {
        return true;
    }

    hours.split(',').map(str::trim).any(|piece| {
        match piece.split_once('-') {
            Some((start, end)) => match (parse_hour(start), parse_hour(end)) {
                (Some(start), Some(end)) => hour >= start && hour <= end,
                _ => false,
            },
            None => parse_hour(piece) == Some(hour),
        }
    })
}

/// 解析 `9` 或 `9:30` 中的小时部分
fn parse_hour(piece: &str) -> Option<u32> {
    let piece = piece.trim();
    let hour = piece.split_once(':').map(|(h, _)| h).unwrap_or(piece);
    hour.trim().parse().ok()
}

/// 判断星期是否落在给定范围内
///
/// 未知的星期名永不匹配。
pub fn is_in_day_range(weekday: Weekday, days: &str) -> bool {
    let days = days.trim();
    if days.is_empty() {
        return true;
    }

    let day = weekday.num_days_from_sunday();
    days.split(',').map(str::trim).any(|piece| {
        match piece.split_once('-') {
            Some((start, end)) => match (parse_day(start), parse_day(end)) {
                (Some(start), Some(end)) if start <= end => day >= start && day <= end,
                // 跨周，例如 Fri-Mon
                (Some(start), Some(end)) => day >= start || day <= end,
                _ => false,
            },
            None => parse_day(piece) == Some(day),
        }
    })
}

/// 星期名 -> 距周日的天数
fn parse_day(name: &str) -> Option<u32> {
    let day = match name.trim().to_ascii_lowercase().as_str() {
        "sun" | "sunday" => Weekday::Sun,
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        _ => return None,
    };
    Some(day.num_days_from_sunday())
}
