//! Textual renderings of a calendar date or clock time.
//!
//! Date pickers and showtime lists label their items in whatever format the
//! site prefers ("Fri 12 Dec", "12/12/2025", "Dec 12th"). We render the
//! requested value every common way and accept the first label that contains
//! one of the renderings.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};

const DATE_INPUT_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];
const TIME_INPUT_FORMATS: &[&str] = &["%H:%M", "%H.%M", "%I:%M %p", "%I:%M%p", "%I %p"];
const CURRENCY_SIGNS: &[char] = &['£', '$', '€', '¥', '₹'];

/// Parse a date as written in config or at the prompt.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Parse a clock time as written in config or at the prompt.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim().to_uppercase();
    TIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&raw, fmt).ok())
}

/// Case-insensitive containment where a digit at either end of `needle`
/// must not run into another digit in `haystack`, so "6 Dec" does not
/// match "16 Dec" and "9:00" does not match "19:00".
pub fn contains_rendering(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let starts_digit = needle.starts_with(|c: char| c.is_ascii_digit());
    let ends_digit = needle.ends_with(|c: char| c.is_ascii_digit());

    haystack.match_indices(&needle).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + needle.len()..].chars().next();
        !(starts_digit && before.is_some_and(|c| c.is_ascii_digit()))
            && !(ends_digit && after.is_some_and(|c| c.is_ascii_digit()))
    })
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Every rendering of one calendar date, most specific first.
#[derive(Debug, Clone)]
pub struct DateFormatCandidates {
    date: NaiveDate,
    today: Option<NaiveDate>,
    renderings: Vec<String>,
}

impl DateFormatCandidates {
    pub fn new(date: NaiveDate) -> Self {
        let day = date.day();
        let month = date.format("%b").to_string();
        let full = date.format("%B").to_string();
        let year = date.year();
        let suffix = ordinal_suffix(day);

        let candidates = [
            date.format("%d/%m/%Y").to_string(),
            date.format("%Y-%m-%d").to_string(),
            date.format("%d.%m.%Y").to_string(),
            format!("{full} {day}, {year}"),
            format!("{day} {full} {year}"),
            format!("{month} {day}, {year}"),
            format!("{day} {month} {year}"),
            format!("{day}{suffix} {full}"),
            format!("{full} {day}{suffix}"),
            format!("{day}{suffix} {month}"),
            format!("{month} {day}{suffix}"),
            format!("{day} {full}"),
            format!("{full} {day}"),
            format!("{day} {month}"),
            format!("{month} {day}"),
            date.format("%d/%m").to_string(),
            date.format("%d.%m.").to_string(),
        ];

        let mut renderings: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !renderings.contains(&candidate) {
                renderings.push(candidate);
            }
        }

        Self {
            date,
            today: None,
            renderings,
        }
    }

    /// Also accept "Today" / "Tomorrow" labels relative to `today`.
    pub fn relative_to(mut self, today: NaiveDate) -> Self {
        if self.date == today {
            self.renderings.push("Today".to_string());
        } else if Some(self.date) == today.checked_add_signed(Duration::days(1)) {
            self.renderings.push("Tomorrow".to_string());
        }
        self.today = Some(today);
        self
    }

    pub fn renderings(&self) -> &[String] {
        &self.renderings
    }

    /// Index of the first label containing a rendering, trying renderings in priority order.
    pub fn first_match<'a, I>(&self, labels: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: Clone,
    {
        let labels = labels.into_iter();
        self.renderings.iter().find_map(|rendering| {
            labels
                .clone()
                .position(|label| contains_rendering(label, rendering))
        })
    }

    /// Read a rendering back into a date, using this date's year for year-less forms.
    pub fn parse_rendering(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        if let Some(today) = self.today {
            if text.eq_ignore_ascii_case("today") {
                return Some(today);
            }
            if text.eq_ignore_ascii_case("tomorrow") {
                return today.checked_add_signed(Duration::days(1));
            }
        }

        let stripped = strip_ordinal(text);
        let year = self.date.year();
        const FULL: &[&str] = &[
            "%d/%m/%Y", "%Y-%m-%d", "%d.%m.%Y", "%B %d, %Y", "%d %B %Y", "%b %d, %Y", "%d %b %Y",
        ];
        const PARTIAL: &[&str] = &["%d %B", "%B %d", "%d %b", "%b %d", "%d/%m", "%d.%m."];

        FULL.iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&stripped, fmt).ok())
            .or_else(|| {
                PARTIAL.iter().find_map(|fmt| {
                    NaiveDate::parse_from_str(&format!("{stripped} {year}"), &format!("{fmt} %Y")).ok()
                })
            })
    }
}

fn strip_ordinal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut prev_digit = false;
    while let Some(c) = chars.next() {
        if prev_digit && c.is_ascii_alphabetic() {
            let next = chars.peek().copied();
            let pair: String = [Some(c), next].into_iter().flatten().collect();
            if matches!(pair.to_lowercase().as_str(), "st" | "nd" | "rd" | "th") {
                chars.next();
                prev_digit = false;
                continue;
            }
        }
        prev_digit = c.is_ascii_digit();
        out.push(c);
    }
    out
}

fn without_amounts(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_amount = false;
    let mut after_sign = false;
    for c in text.chars() {
        if CURRENCY_SIGNS.contains(&c) {
            in_amount = true;
            after_sign = true;
            out.push(' ');
            continue;
        }
        if in_amount {
            if c.is_ascii_digit() || c == '.' || c == ',' || (after_sign && c.is_whitespace()) {
                after_sign = after_sign && c.is_whitespace();
                continue;
            }
            in_amount = false;
            after_sign = false;
        }
        out.push(c);
    }
    out
}

/// Every rendering of one clock time, 24-hour forms first.
#[derive(Debug, Clone)]
pub struct TimeFormatCandidates {
    renderings: Vec<String>,
}

impl TimeFormatCandidates {
    pub fn new(time: NaiveTime) -> Self {
        let hour = time.hour();
        let minute = time.minute();
        let (is_pm, hour12) = time.hour12();
        let meridiem = if is_pm { "pm" } else { "am" };

        let mut candidates = vec![
            format!("{hour:02}:{minute:02}"),
            format!("{hour:02}.{minute:02}"),
            format!("{hour12}:{minute:02} {meridiem}"),
            format!("{hour12}:{minute:02}{meridiem}"),
            format!("{hour:02}h{minute:02}"),
        ];
        if hour < 10 {
            candidates.push(format!("{hour}:{minute:02}"));
        }
        if minute == 0 {
            candidates.push(format!("{hour12} {meridiem}"));
            candidates.push(format!("{hour12}{meridiem}"));
        }

        let mut renderings: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !renderings.contains(&candidate) {
                renderings.push(candidate);
            }
        }
        Self { renderings }
    }

    pub fn renderings(&self) -> &[String] {
        &self.renderings
    }

    pub fn matches(&self, text: &str) -> bool {
        self.renderings.iter().any(|r| contains_rendering(text, r))
    }

    /// `matches` for free text that may also carry prices: amounts after a
    /// currency sign are dropped and dotted forms like "19.00" are not tried.
    pub fn matches_in_prose(&self, text: &str) -> bool {
        let text = without_amounts(text);
        self.renderings
            .iter()
            .filter(|r| !r.contains('.'))
            .any(|r| contains_rendering(&text, r))
    }

    pub fn first_match<'a, I>(&self, labels: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: Clone,
    {
        let labels = labels.into_iter();
        self.renderings.iter().find_map(|rendering| {
            labels
                .clone()
                .position(|label| contains_rendering(label, rendering))
        })
    }
}
