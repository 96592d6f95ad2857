use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};

/// One CSV row as exported by the contact-center platform. Every field is
/// optional at this level; which columns are actually required is decided per
/// dimension against the header set.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) interaction_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) datetime_start: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) queue_skill: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) channel: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) duration_talk: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) hold_time: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) wrap_up_time: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) agent_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) transfer_flag: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) is_resolved: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) fcr_real_flag: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) is_abandoned: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) abandoned_flag: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) abandoned: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) customer_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) caller_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) logged_time: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) aht: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) csat_score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) nps_score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) ces_score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) record_status: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) repeat_call_7d: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) repeat_7d: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) is_repeat_7d: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Tolerant numeric coercion: unparseable values become `None` rather than
/// failing the row.
pub(crate) fn parse_f64(value: Option<&str>) -> Option<f64> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Truthy flag parsing shared by transfer/resolution/abandonment columns.
/// Accepts boolean words in several spellings plus positive numbers.
pub(crate) fn parse_flag(value: Option<&str>) -> Option<bool> {
    let raw = value?.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }
    match raw.as_str() {
        "true" | "t" | "1" | "yes" | "y" | "si" | "sí" => return Some(true),
        "false" | "f" | "0" | "no" | "n" => return Some(false),
        _ => {}
    }
    raw.parse::<f64>().ok().map(|v| v > 0.0)
}

pub(crate) fn parse_datetime(value: Option<&str>) -> Option<NaiveDateTime> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    None
}

pub(crate) fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parse_datetime_supports_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();

        assert_eq!(parse_datetime(Some("2024-03-05T14:30:00Z")), Some(expected));
        assert_eq!(parse_datetime(Some("2024-03-05 14:30:00")), Some(expected));
        assert_eq!(parse_datetime(Some("2024-03-05T14:30:00")), Some(expected));
        assert_eq!(
            parse_datetime(Some("2024-03-05")),
            NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_datetime(Some("not-a-date")), None);
        assert_eq!(parse_datetime(Some("  ")), None);
    }

    #[test]
    fn parse_flag_accepts_truthy_spellings() {
        for raw in ["true", "T", "1", "yes", "Y", "si", "sí", "2"] {
            assert_eq!(parse_flag(Some(raw)), Some(true), "raw = {raw}");
        }
        for raw in ["false", "F", "0", "no", "n", "-1"] {
            assert_eq!(parse_flag(Some(raw)), Some(false), "raw = {raw}");
        }
        assert_eq!(parse_flag(Some("maybe")), None);
        assert_eq!(parse_flag(None), None);
    }

    #[test]
    fn parse_f64_coerces_garbage_to_none() {
        assert_eq!(parse_f64(Some("12.5")), Some(12.5));
        assert_eq!(parse_f64(Some(" 300 ")), Some(300.0));
        assert_eq!(parse_f64(Some("n/a")), None);
        assert_eq!(parse_f64(None), None);
    }
}
