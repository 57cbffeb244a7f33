//! Turns free-text deadline-extension requests into a concrete date.
//!
//! Parsing is local first: weekday names, "N more days", "end of week",
//! "tomorrow" and absolute dates are recognised in Ukrainian, Russian and
//! English. Only text none of those patterns match is sent to the model. The
//! day limit is always checked here, never delegated.

use crate::services::ai_client::{decode_json, AiCompleter};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, LazyLock};

/// Outcome of interpreting one extension request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedExtension {
    pub requested_date: Option<DateTime<Utc>>,
    pub additional_days: Option<i64>,
    pub is_reasonable: bool,
    pub reason: Option<String>,
}

impl ParsedExtension {
    fn unparseable() -> Self {
        Self {
            requested_date: None,
            additional_days: None,
            is_reasonable: false,
            reason: Some("unparseable".to_string()),
        }
    }

    /// Applies the day limit to a resolved date. The time of day of the
    /// current deadline is kept.
    fn evaluate(date: NaiveDate, current_deadline: DateTime<Utc>, max_days: i64) -> Self {
        let requested = date.and_time(current_deadline.time()).and_utc();
        let additional_days = (date - current_deadline.date_naive()).num_days();
        let reason = if additional_days < 1 {
            Some("not_after_current_deadline".to_string())
        } else if additional_days > max_days {
            Some("exceeds_limit".to_string())
        } else {
            None
        };
        Self {
            requested_date: Some(requested),
            additional_days: Some(additional_days),
            is_reasonable: reason.is_none(),
            reason,
        }
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("deadline pattern must compile")
}

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b"));
static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(\d{1,2})[./](\d{1,2})(?:[./](\d{2,4}))?\b"));
static DAY_MONTH: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(\d{1,2})(?:-?(?:го|е|st|nd|rd|th))?\s+(?:of\s+)?([\p{L}]+)"));
static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b")
});
static RELATIVE_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(\d+|[\p{L}']+)\s+(?:of\s+)?(?:more\s+|extra\s+|additional\s+)?(?:days?|дн[іяеи]\p{L}*|день)\b")
});
static RELATIVE_WEEK: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?:тиждень|неделю|week)\b"));
static END_OF_WEEK: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"end of (?:the |this )?week|кін(?:ця|ець) тижня|кон(?:ца|ец) недели|weekend|вихідн\p{L}*|выходн\p{L}*")
});
static DAY_AFTER_TOMORROW: LazyLock<Regex> =
    LazyLock::new(|| compile(r"післязавтра|послезавтра|day after tomorrow"));
static TOMORROW: LazyLock<Regex> = LazyLock::new(|| compile(r"\bзавтра\b|\btomorrow\b"));
static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(понеділ\p{L}*|понедельн\p{L}*|monday|вівтор\p{L}*|вторник\p{L}*|tuesday|серед[аиуі]\b|сред[аыу]\b|wednesday|четвер\p{L}*|thursday|п'?ятниц\p{L}*|friday|субот\p{L}*|суббот\p{L}*|saturday|неділ\p{L}*|воскресен\p{L}*|sunday)")
});

fn weekday_from(word: &str) -> Option<Weekday> {
    const STEMS: [(&str, Weekday); 20] = [
        ("понеділ", Weekday::Mon),
        ("понедельн", Weekday::Mon),
        ("monday", Weekday::Mon),
        ("вівтор", Weekday::Tue),
        ("вторник", Weekday::Tue),
        ("tuesday", Weekday::Tue),
        ("серед", Weekday::Wed),
        ("сред", Weekday::Wed),
        ("wednesday", Weekday::Wed),
        ("четвер", Weekday::Thu),
        ("thursday", Weekday::Thu),
        ("п'ятниц", Weekday::Fri),
        ("пятниц", Weekday::Fri),
        ("friday", Weekday::Fri),
        ("субот", Weekday::Sat),
        ("суббот", Weekday::Sat),
        ("saturday", Weekday::Sat),
        ("неділ", Weekday::Sun),
        ("воскресен", Weekday::Sun),
        ("sunday", Weekday::Sun),
    ];
    STEMS
        .iter()
        .find(|(stem, _)| word.starts_with(stem))
        .map(|(_, day)| *day)
}

fn month_from(word: &str) -> Option<u32> {
    const STEMS: [(&str, u32); 37] = [
        ("січ", 1),
        ("январ", 1),
        ("jan", 1),
        ("лют", 2),
        ("феврал", 2),
        ("feb", 2),
        ("берез", 3),
        ("март", 3),
        ("mar", 3),
        ("квіт", 4),
        ("апрел", 4),
        ("apr", 4),
        ("трав", 5),
        ("мая", 5),
        ("май", 5),
        ("may", 5),
        ("черв", 6),
        ("июн", 6),
        ("jun", 6),
        ("лип", 7),
        ("июл", 7),
        ("jul", 7),
        ("серп", 8),
        ("август", 8),
        ("aug", 8),
        ("верес", 9),
        ("сентябр", 9),
        ("sep", 9),
        ("жовт", 10),
        ("октябр", 10),
        ("oct", 10),
        ("листоп", 11),
        ("ноябр", 11),
        ("nov", 11),
        ("груд", 12),
        ("декабр", 12),
        ("dec", 12),
    ];
    STEMS
        .iter()
        .find(|(stem, _)| word.starts_with(stem))
        .map(|(_, month)| *month)
}

/// Relative day counts are capped here; anything larger is far beyond any
/// extension limit and would overflow date arithmetic.
const MAX_RELATIVE_DAYS: i64 = 36_500;

fn number_from(word: &str) -> Option<i64> {
    if !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()) {
        return Some(word.parse::<i64>().map_or(MAX_RELATIVE_DAYS, |n| n.min(MAX_RELATIVE_DAYS)));
    }
    let n = match word {
        "one" | "a" | "один" | "одного" | "одна" | "одну" => 1,
        "two" | "couple" | "два" | "дві" | "двох" | "двух" | "пару" | "пара" => 2,
        "three" | "три" | "трьох" | "трех" | "трёх" => 3,
        "four" | "чотири" | "четыре" => 4,
        "five" | "п'ять" | "пять" => 5,
        "six" | "шість" | "шесть" => 6,
        "seven" | "сім" | "семь" => 7,
        "ten" | "десять" => 10,
        _ => return None,
    };
    Some(n)
}

/// First date strictly after `anchor` falling on `weekday`.
fn next_weekday(anchor: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() as i64
        - anchor.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    anchor + Duration::days(if ahead == 0 { 7 } else { ahead })
}

fn full_year(raw: Option<&str>) -> Option<i32> {
    let year: i32 = raw?.parse().ok()?;
    Some(if year < 100 { 2000 + year } else { year })
}

/// A day/month without a year lands in the anchor's year, or the next one if
/// that date already passed.
fn date_without_year(day: u32, month: u32, anchor: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(anchor.year(), month, day)?;
    if date < today {
        NaiveDate::from_ymd_opt(anchor.year() + 1, month, day)
    } else {
        Some(date)
    }
}

fn absolute_date(text: &str, anchor: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    for caps in ISO_DATE.captures_iter(text) {
        let date = NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
        if date.is_some() {
            return date;
        }
    }

    for caps in NUMERIC_DATE.captures_iter(text) {
        let (Ok(day), Ok(month)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        let date = match full_year(caps.get(3).map(|m| m.as_str())) {
            Some(year) => NaiveDate::from_ymd_opt(year, month, day),
            None => date_without_year(day, month, anchor, today),
        };
        if date.is_some() {
            return date;
        }
    }

    for caps in DAY_MONTH.captures_iter(text) {
        let (Ok(day), Some(month)) = (caps[1].parse::<u32>(), month_from(&caps[2])) else {
            continue;
        };
        if let Some(date) = date_without_year(day, month, anchor, today) {
            return Some(date);
        }
    }

    for caps in MONTH_DAY.captures_iter(text) {
        let (Some(month), Ok(day)) = (month_from(&caps[1]), caps[2].parse::<u32>()) else {
            continue;
        };
        if let Some(date) = date_without_year(day, month, anchor, today) {
            return Some(date);
        }
    }

    None
}

/// Resolves `text` to a calendar date without the model, relative to the
/// current deadline and today.
pub fn resolve_requested_date(
    text: &str,
    current_deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<NaiveDate> {
    let text = text.to_lowercase().replace(&['’', 'ʼ', '`'][..], "'");
    let today = now.date_naive();
    let deadline = current_deadline.date_naive();
    let anchor = today.max(deadline);

    if let Some(date) = absolute_date(&text, anchor, today) {
        return Some(date);
    }
    if END_OF_WEEK.is_match(&text) {
        return Some(next_weekday(anchor, Weekday::Sun));
    }
    for caps in RELATIVE_DAYS.captures_iter(&text) {
        if let Some(days) = number_from(&caps[1]) {
            return deadline.checked_add_signed(Duration::days(days));
        }
    }
    if RELATIVE_WEEK.is_match(&text) {
        return Some(deadline + Duration::days(7));
    }
    if DAY_AFTER_TOMORROW.is_match(&text) {
        return Some(today + Duration::days(2));
    }
    if TOMORROW.is_match(&text) {
        return Some(today + Duration::days(1));
    }
    WEEKDAY
        .captures(&text)
        .and_then(|caps| weekday_from(&caps[1]))
        .map(|weekday| next_weekday(anchor, weekday))
}

/// Local-only interpretation of an extension request.
pub fn parse_extension_request(
    text: &str,
    current_deadline: DateTime<Utc>,
    now: DateTime<Utc>,
    max_days: i64,
) -> ParsedExtension {
    match resolve_requested_date(text, current_deadline, now) {
        Some(date) => ParsedExtension::evaluate(date, current_deadline, max_days),
        None => ParsedExtension::unparseable(),
    }
}

#[derive(Debug, Deserialize)]
struct AiExtension {
    #[serde(alias = "requestedDate")]
    requested_date: Option<String>,
}

#[derive(Clone)]
pub struct DeadlineNegotiator {
    ai: Arc<dyn AiCompleter>,
    max_extension_days: i64,
}

impl DeadlineNegotiator {
    pub fn new(ai: Arc<dyn AiCompleter>, max_extension_days: i64) -> Self {
        Self {
            ai,
            max_extension_days,
        }
    }

    pub async fn parse(
        &self,
        text: &str,
        current_deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ParsedExtension {
        let local = parse_extension_request(text, current_deadline, now, self.max_extension_days);
        if local.requested_date.is_some() {
            return local;
        }

        match self.ask_model(text, current_deadline, now).await {
            Some(date) => {
                tracing::debug!(%date, "Extension date resolved by model");
                ParsedExtension::evaluate(date, current_deadline, self.max_extension_days)
            }
            None => local,
        }
    }

    async fn ask_model(
        &self,
        text: &str,
        current_deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<NaiveDate> {
        let system_prompt = "You extract the date a job candidate asks to move a test-task deadline to. \
Respond with a JSON object {\"requestedDate\": \"YYYY-MM-DD\" or null, \"reason\": \"short explanation\"}.";
        let user_prompt = json!({
            "message": text,
            "today": now.date_naive().to_string(),
            "today_weekday": now.weekday().to_string(),
            "current_deadline": current_deadline.date_naive().to_string(),
        })
        .to_string();

        let raw = match self.ai.complete(system_prompt, &user_prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = ?e, "Extension parsing via model failed");
                return None;
            }
        };
        let parsed: AiExtension = decode_json(&raw)?;
        let date = parsed.requested_date?;
        NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d").ok()
    }
}
