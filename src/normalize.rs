//! Field-level normalizers.
//!
//! Each normalizer takes the raw cell text and reports whether the value was
//! already acceptable, was rewritten into the archive's accepted form, or
//! cannot be interpreted. Normalizers never invent data: an uninterpretable
//! value is reported, not replaced.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::domain::{LibraryLayout, SampleSource};

/// Values the archive accepts in place of a measurement.
pub const MISSING_VALUE_TERMS: &[&str] = &[
    "not collected",
    "not provided",
    "not applicable",
    "missing",
    "restricted access",
    "unknown",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Normalized {
    Unchanged {
        value: String,
    },
    Rewritten {
        value: String,
        note: Option<String>,
    },
    Invalid {
        reason: String,
    },
}

impl Normalized {
    /// The value to store in the table, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            Normalized::Unchanged { value } | Normalized::Rewritten { value, .. } => Some(value),
            Normalized::Invalid { .. } => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Normalized::Invalid { .. })
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Normalized::Invalid {
            reason: reason.into(),
        }
    }

    /// Compares against the raw input so callers only see real rewrites.
    fn from_candidate(raw: &str, value: String, note: Option<String>) -> Self {
        if value == raw && note.is_none() {
            Normalized::Unchanged { value }
        } else {
            Normalized::Rewritten { value, note }
        }
    }
}

pub fn is_missing_value_term(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    MISSING_VALUE_TERMS.contains(&lowered.as_str())
}

static ISO_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})Z$").expect("datetime regex")
});
static SPREADSHEET_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})[ T]\d{2}:\d{2}(:\d{2}(\.\d+)?)?$")
        .expect("spreadsheet datetime regex")
});
static ISO_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("iso day regex"));
static ISO_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("iso month regex"));
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}$").expect("year regex"));
static NUMERIC_DMY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})([-/.])(\d{1,2})([-/.])(\d{4})$").expect("numeric date regex")
});
static YEAR_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").expect("year-first date regex")
});
static DAY_MONTH_NAME_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[-/\s]+([A-Za-z]{3,9})\.?[-/\s,]+(\d{4})$").expect("dd-mmm-yyyy regex")
});
static MONTH_NAME_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{3,9})\.?[-/\s,]+(\d{4})$").expect("mmm-yyyy regex")
});

/// Normalizes a `collection_date` value to ISO 8601.
pub fn collection_date(raw: &str) -> Normalized {
    let value = raw.trim();
    if value.is_empty() {
        return Normalized::invalid("empty date");
    }
    if is_missing_value_term(value) {
        return Normalized::from_candidate(raw, value.to_string(), None);
    }
    match parse_single_date(value) {
        Ok((date, note)) => return Normalized::from_candidate(raw, date, note),
        Err(DateError::Impossible(reason)) => return Normalized::invalid(reason),
        Err(DateError::Unrecognized) => {}
    }

    if let Some((start, end)) = value.split_once('/') {
        if end.contains('/') {
            return Normalized::invalid(format!("unrecognized date format: {value}"));
        }
        return match (parse_single_date(start.trim()), parse_single_date(end.trim())) {
            (Ok((start, start_note)), Ok((end, end_note))) => {
                if start > end && start.len() == end.len() {
                    return Normalized::invalid(format!("date range ends before it starts: {value}"));
                }
                let note = match (start_note, end_note) {
                    (None, None) => None,
                    (a, b) => Some(a.into_iter().chain(b).collect::<Vec<_>>().join("; ")),
                };
                Normalized::from_candidate(raw, format!("{start}/{end}"), note)
            }
            (Err(DateError::Impossible(reason)), _) | (_, Err(DateError::Impossible(reason))) => {
                Normalized::invalid(reason)
            }
            _ => Normalized::invalid(format!("unrecognized date format: {value}")),
        };
    }
    Normalized::invalid(format!("unrecognized date format: {value}"))
}

#[derive(Debug)]
enum DateError {
    Unrecognized,
    Impossible(String),
}

fn parse_single_date(value: &str) -> Result<(String, Option<String>), DateError> {
    if let Some(caps) = ISO_DATETIME.captures(value) {
        check_day(&caps[1], &caps[2], &caps[3], value)?;
        let (h, m, s) = (num(&caps[4]), num(&caps[5]), num(&caps[6]));
        if h > 23 || m > 59 || s > 59 {
            return Err(DateError::Impossible(format!("invalid time of day: {value}")));
        }
        return Ok((value.to_string(), None));
    }
    if let Some(caps) = SPREADSHEET_DATETIME.captures(value) {
        let day = check_day(&caps[1], &caps[2], &caps[3], value)?;
        return Ok((day, Some("time of day dropped".to_string())));
    }
    if let Some(caps) = ISO_DAY.captures(value) {
        return Ok((check_day(&caps[1], &caps[2], &caps[3], value)?, None));
    }
    if let Some(caps) = ISO_MONTH.captures(value) {
        return Ok((check_month(&caps[1], &caps[2], value)?, None));
    }
    if YEAR.is_match(value) {
        return Ok((value.to_string(), None));
    }
    if let Some(caps) = NUMERIC_DMY.captures(value) {
        if caps[2] != caps[4] {
            return Err(DateError::Unrecognized);
        }
        let (first, second) = (num(&caps[1]), num(&caps[3]));
        let year = &caps[5];
        // US month-first unless the first number cannot be a month.
        let (month, day, note) = if first > 12 {
            (second, first, None)
        } else if second > 12 || first == second {
            (first, second, None)
        } else {
            (
                first,
                second,
                Some(format!(
                    "ambiguous day/month in {value}; read as month-first (MM/DD/YYYY)"
                )),
            )
        };
        let day = check_day(year, &month.to_string(), &day.to_string(), value)?;
        return Ok((day, note));
    }
    if let Some(caps) = YEAR_FIRST.captures(value) {
        return Ok((check_day(&caps[1], &caps[2], &caps[3], value)?, None));
    }
    if let Some(caps) = DAY_MONTH_NAME_YEAR.captures(value) {
        let month = month_number(&caps[2]).ok_or(DateError::Unrecognized)?;
        return Ok((
            check_day(&caps[3], &month.to_string(), &caps[1], value)?,
            None,
        ));
    }
    if let Some(caps) = MONTH_NAME_YEAR.captures(value) {
        let month = month_number(&caps[1]).ok_or(DateError::Unrecognized)?;
        return Ok((check_month(&caps[2], &month.to_string(), value)?, None));
    }
    Err(DateError::Unrecognized)
}

fn num(value: &str) -> u32 {
    value.parse().unwrap_or(0)
}

fn check_day(year: &str, month: &str, day: &str, original: &str) -> Result<String, DateError> {
    let (y, m, d) = (num(year) as i32, num(month), num(day));
    NaiveDate::from_ymd_opt(y, m, d)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| DateError::Impossible(format!("not a calendar date: {original}")))
}

fn check_month(year: &str, month: &str, original: &str) -> Result<String, DateError> {
    let m = num(month);
    if !(1..=12).contains(&m) {
        return Err(DateError::Impossible(format!("month out of range: {original}")));
    }
    Ok(format!("{year}-{m:02}"))
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lowered = name.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| {
            *month == lowered || (lowered.len() == 3 && month.starts_with(lowered.as_str()))
        })
        .map(|idx| idx as u32 + 1)
        .or_else(|| (lowered == "sept").then_some(9))
}

static HEMISPHERE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,3}(?:\.\d+)?)\s*([NS])[\s,;]*(\d{1,3}(?:\.\d+)?)\s*([EW])$")
        .expect("hemisphere lat_lon regex")
});
static DECIMAL_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([-+]?\d{1,3}(?:\.\d+)?)\s*[,;\s]\s*([-+]?\d{1,3}(?:\.\d+)?)$")
        .expect("decimal lat_lon regex")
});

/// Normalizes `lat_lon` to `d[.dddd] N|S d[.dddd] E|W`.
pub fn lat_lon(raw: &str) -> Normalized {
    let value = raw.trim();
    if value.is_empty() {
        return Normalized::invalid("empty coordinates");
    }
    if is_missing_value_term(value) {
        return Normalized::from_candidate(raw, value.to_string(), None);
    }

    let (lat, lat_dir, lon, lon_dir) = if let Some(caps) = HEMISPHERE_PAIR.captures(value) {
        (
            caps[1].to_string(),
            caps[2].to_ascii_uppercase(),
            caps[3].to_string(),
            caps[4].to_ascii_uppercase(),
        )
    } else if let Some(caps) = DECIMAL_PAIR.captures(value) {
        let (lat, lat_negative) = split_sign(&caps[1]);
        let (lon, lon_negative) = split_sign(&caps[2]);
        (
            lat,
            if lat_negative { "S" } else { "N" }.to_string(),
            lon,
            if lon_negative { "W" } else { "E" }.to_string(),
        )
    } else {
        return Normalized::invalid(format!("unrecognized coordinate format: {value}"));
    };

    let lat_abs = lat.parse::<f64>().unwrap_or(f64::MAX);
    let lon_abs = lon.parse::<f64>().unwrap_or(f64::MAX);
    if lat_abs > 90.0 {
        return Normalized::invalid(format!("latitude out of range: {value}"));
    }
    if lon_abs > 180.0 {
        return Normalized::invalid(format!("longitude out of range: {value}"));
    }
    Normalized::from_candidate(raw, format!("{lat} {lat_dir} {lon} {lon_dir}"), None)
}

fn split_sign(value: &str) -> (String, bool) {
    match value.strip_prefix('-') {
        Some(rest) => (rest.to_string(), true),
        None => (value.trim_start_matches('+').to_string(), false),
    }
}

static GEO_ALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{N} ,:'.()\-]+$").expect("geo_loc_name regex"));

/// Normalizes `geo_loc_name` to `Country` or `Country: region, locality`.
pub fn geo_loc_name(raw: &str) -> Normalized {
    let value = collapse_spaces(raw.trim());
    if value.is_empty() {
        return Normalized::invalid("empty geographic location");
    }
    if is_missing_value_term(&value) {
        return Normalized::from_candidate(raw, value, None);
    }
    if !GEO_ALLOWED.is_match(&value) {
        return Normalized::invalid(format!("unexpected characters in location: {value}"));
    }

    let Some((country, rest)) = value.split_once(':') else {
        return Normalized::from_candidate(raw, value, None);
    };
    let country = country.trim();
    if country.is_empty() {
        return Normalized::invalid(format!("missing country in location: {value}"));
    }
    let parts = rest
        .split([':', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return Normalized::from_candidate(raw, country.to_string(), None);
    }
    Normalized::from_candidate(raw, format!("{country}: {}", parts.join(", ")), None)
}

fn collapse_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn library_layout(raw: &str) -> Normalized {
    match raw.parse::<LibraryLayout>() {
        Ok(layout) => Normalized::from_candidate(raw, layout.as_str().to_string(), None),
        Err(_) => Normalized::invalid(format!(
            "library_layout must be paired or single, got '{}'",
            raw.trim()
        )),
    }
}

pub fn sample_source(raw: &str) -> Normalized {
    match raw.parse::<SampleSource>() {
        Ok(source) => Normalized::from_candidate(raw, source.as_str().to_string(), None),
        Err(_) => Normalized::invalid(format!(
            "sample_source must be environmental or host-associated, got '{}'",
            raw.trim()
        )),
    }
}

/// Matches a controlled-vocabulary value, fixing case and spacing only.
pub fn vocabulary<S: AsRef<str>>(raw: &str, allowed: &[S]) -> Normalized {
    let value = collapse_spaces(raw.trim());
    if let Some(exact) = allowed.iter().find(|term| term.as_ref() == value) {
        return Normalized::from_candidate(raw, exact.as_ref().to_string(), None);
    }
    match allowed
        .iter()
        .find(|term| term.as_ref().eq_ignore_ascii_case(&value))
    {
        Some(term) => Normalized::from_candidate(raw, term.as_ref().to_string(), None),
        None => Normalized::invalid(format!("'{value}' is not an accepted value")),
    }
}
