use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::artwork::Artwork;

/// Shown when an artwork has neither a usable date nor a duration.
pub const UNKNOWN_DATE_LABEL: &str = "日期未知";

const LABEL_SEPARATOR: &str = " • ";

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaOptions {
    pub show_date: bool,
    pub show_duration: bool,
}

impl Default for MetaOptions {
    fn default() -> Self {
        Self {
            show_date: true,
            show_duration: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaLabels {
    pub timestamp_label: String,
    pub date_label: Option<String>,
    pub duration_label: Option<String>,
}

/// Parses the date formats artworks arrive with. Offsets are kept as
/// written: the wall-clock time in the string is what gets displayed.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.naive_local());
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    if raw.contains('年') {
        return parse_cjk_date(raw);
    }

    None
}

/// Handles `2024年3月1日 14时30分` and its shorter variants.
fn parse_cjk_date(raw: &str) -> Option<NaiveDateTime> {
    let normalized: String = raw
        .chars()
        .map(|c| match c {
            '年' | '月' => '-',
            '日' | '秒' => ' ',
            '时' | '時' | '点' | '點' | '分' => ':',
            c => c,
        })
        .collect();

    let mut parts = normalized.split_whitespace();
    let date = parts.next()?;
    let time = parts.next().unwrap_or("");

    let mut ymd = date.split('-').filter(|s| !s.is_empty());
    let year = ymd.next()?.parse().ok()?;
    let month = ymd.next()?.parse().ok()?;
    let day = ymd.next()?.parse().ok()?;

    let mut hms = time
        .split(':')
        .filter(|s| !s.is_empty())
        .map(str::parse::<u32>);
    let hour = hms.next().unwrap_or(Ok(0)).ok()?;
    let minute = hms.next().unwrap_or(Ok(0)).ok()?;
    let second = hms.next().unwrap_or(Ok(0)).ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// First of `uploadedAt`, `uploadedDate`, `date` that parses.
pub fn resolve_date(artwork: &Artwork) -> Option<NaiveDateTime> {
    [&artwork.uploaded_at, &artwork.uploaded_date, &artwork.date]
        .into_iter()
        .flatten()
        .find_map(|raw| parse_date(raw))
}

/// On-screen duration: `45m`, `2h`, `1h 30m`.
pub fn format_duration_compact(minutes: u32) -> Option<String> {
    if minutes < 1 {
        return None;
    }

    let (hours, rest) = (minutes / 60, minutes % 60);

    Some(match (hours, rest) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    })
}

/// Duration as drawn on exported templates: `45 min`, `2 h`, `1 h 30 min`.
pub fn format_duration_long(minutes: u32) -> Option<String> {
    if minutes < 1 {
        return None;
    }

    let (hours, rest) = (minutes / 60, minutes % 60);

    Some(match (hours, rest) {
        (0, m) => format!("{m} min"),
        (h, 0) => format!("{h} h"),
        (h, m) => format!("{h} h {m} min"),
    })
}

pub fn format_date_label(date: &NaiveDateTime) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Joins the non-empty labels, or falls back to [`UNKNOWN_DATE_LABEL`].
pub fn join_labels<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    let parts: Vec<_> = parts.into_iter().flatten().filter(|s| !s.is_empty()).collect();

    if parts.is_empty() {
        UNKNOWN_DATE_LABEL.to_owned()
    } else {
        parts.join(LABEL_SEPARATOR)
    }
}

pub fn compose_meta_labels(artwork: &Artwork, options: MetaOptions) -> MetaLabels {
    let date_label = options
        .show_date
        .then(|| resolve_date(artwork))
        .flatten()
        .map(|date| format_date_label(&date));

    let duration_label = options
        .show_duration
        .then(|| artwork.duration())
        .flatten()
        .and_then(format_duration_compact);

    MetaLabels {
        timestamp_label: join_labels([date_label.as_deref(), duration_label.as_deref()]),
        date_label,
        duration_label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artwork() -> Artwork {
        Artwork::new("a1", "data:,")
    }

    #[test]
    fn compact_durations() {
        assert_eq!(format_duration_compact(0), None);
        assert_eq!(format_duration_compact(45).as_deref(), Some("45m"));
        assert_eq!(format_duration_compact(90).as_deref(), Some("1h 30m"));
        assert_eq!(format_duration_compact(120).as_deref(), Some("2h"));
    }

    #[test]
    fn long_durations() {
        assert_eq!(format_duration_long(0), None);
        assert_eq!(format_duration_long(45).as_deref(), Some("45 min"));
        assert_eq!(format_duration_long(90).as_deref(), Some("1 h 30 min"));
        assert_eq!(format_duration_long(180).as_deref(), Some("3 h"));
    }

    #[test]
    fn parses_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();

        for raw in [
            "2024-03-01T14:30:00Z",
            "2024-03-01T14:30:00.000+08:00",
            "2024-03-01 14:30:00",
            "2024-03-01 14:30",
            "2024/03/01 14:30",
            "2024年3月1日 14时30分",
            "2024年03月01日14时30分00秒",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "{raw}");
        }

        assert_eq!(
            parse_date("2024年3月1日"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "   ", "yesterday", "2024年13月40日", "2024-02-30"] {
            assert_eq!(parse_date(raw), None, "{raw}");
        }
    }

    #[test]
    fn date_fields_are_tried_in_order() {
        let mut art = artwork();
        art.uploaded_at = Some("not a date".into());
        art.uploaded_date = Some("2023-12-24".into());
        art.date = Some("2020-01-01".into());

        assert_eq!(
            resolve_date(&art).map(|d| format_date_label(&d)).as_deref(),
            Some("2023-12-24")
        );
    }

    #[test]
    fn labels_join_with_bullet() {
        let mut art = artwork();
        art.uploaded_at = Some("2024-05-06T08:00:00Z".into());
        art.duration_minutes = Some(95.0);

        let labels = compose_meta_labels(&art, MetaOptions::default());
        assert_eq!(labels.timestamp_label, "2024-05-06 • 1h 35m");

        let labels = compose_meta_labels(
            &art,
            MetaOptions {
                show_date: false,
                show_duration: true,
            },
        );
        assert_eq!(labels.timestamp_label, "1h 35m");
        assert_eq!(labels.date_label, None);
    }

    #[test]
    fn unknown_when_nothing_resolves() {
        let mut art = artwork();
        art.duration_minutes = Some(0.4);

        let labels = compose_meta_labels(&art, MetaOptions::default());
        assert_eq!(labels.timestamp_label, UNKNOWN_DATE_LABEL);
        assert_eq!(labels.duration_label, None);
    }
}
