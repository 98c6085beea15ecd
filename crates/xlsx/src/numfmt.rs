//! Number formats from `xl/styles.xml`, and rendering of date serials.
//!
//! A numeric cell whose style carries a date or time format is rendered the
//! way a spreadsheet library hands it to a script: `2024-05-01 00:00:00` for
//! dates, `13:30:00` for a bare time of day, `1 day, 2:00:00` for elapsed
//! `[h]:mm:ss` durations.

use crate::reader::{attr_value, local_name};
use certgen_core::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

const MS_PER_DAY: i64 = 86_400_000;

/// Quoted literals, escaped characters, fill/padding directives and
/// bracketed sections (colors, locales, conditions, elapsed units).
static LITERAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|\\.|[_*].|\[[^\]]*\]"#).unwrap());

/// Bracketed elapsed-time units, which still count as date tokens.
static ELAPSED_UNIT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[(hh?|mm?|ss?)\]$").unwrap());

static ELAPSED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[hh?\](:mm(:ss)?)?").unwrap());

/// How a numeric cell value is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NumberKind {
    /// Stored text as is.
    #[default]
    Plain,
    /// Calendar date and time.
    DateTime,
    /// Elapsed duration (`[h]:mm:ss`).
    Elapsed,
}

impl NumberKind {
    /// Kind of a built-in format id.
    pub fn builtin(id: u32) -> Self {
        match id {
            14..=22 | 45 | 47 => NumberKind::DateTime,
            46 => NumberKind::Elapsed,
            _ => NumberKind::Plain,
        }
    }

    /// Kind of a custom format code.
    pub fn from_code(code: &str) -> Self {
        let section = code.split(';').next().unwrap_or_default();
        if !is_date_format(section) {
            NumberKind::Plain
        } else if ELAPSED_REGEX.is_match(section) {
            NumberKind::Elapsed
        } else {
            NumberKind::DateTime
        }
    }
}

/// Whether the first section of a format code contains date or time tokens.
fn is_date_format(section: &str) -> bool {
    let stripped = LITERAL_REGEX.replace_all(section, |caps: &Captures| {
        let token = &caps[0];
        if ELAPSED_UNIT_REGEX.is_match(token) {
            token.to_string()
        } else {
            String::new()
        }
    });
    stripped.chars().any(|c| "dmhysDMHYS".contains(c))
}

/// Per-style number kinds plus the workbook's date system.
#[derive(Debug, Clone, Default)]
pub struct NumberFormats {
    /// Indexed by the cell's `s` attribute (position in `cellXfs`).
    kinds: Vec<NumberKind>,
    date1904: bool,
}

impl NumberFormats {
    pub fn new(kinds: Vec<NumberKind>, date1904: bool) -> Self {
        Self { kinds, date1904 }
    }

    pub fn kind(&self, style: usize) -> NumberKind {
        self.kinds.get(style).copied().unwrap_or_default()
    }

    /// Render a numeric cell for `style`, or `None` when the style is not a
    /// date style or `raw` is not a number the calendar can hold.
    pub fn render(&self, style: usize, raw: &str) -> Option<String> {
        match self.kind(style) {
            NumberKind::Plain => None,
            NumberKind::DateTime => render_serial(raw.trim().parse().ok()?, self.date1904),
            NumberKind::Elapsed => render_elapsed(raw.trim().parse().ok()?),
        }
    }
}

/// Number kinds of every `cellXfs` entry in `xl/styles.xml`.
pub fn parse_styles(xml: &str) -> Result<Vec<NumberKind>> {
    let mut reader = Reader::from_str(xml);
    let mut custom: HashMap<u32, NumberKind> = HashMap::new();
    let mut xf_formats: Vec<u32> = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::XmlError(format!("Error parsing styles: {}", e)))?;
        match event {
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => in_cell_xfs = true,
            Event::End(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => in_cell_xfs = false,
            Event::Start(ref e) | Event::Empty(ref e) => match local_name(e.name().as_ref()) {
                b"numFmt" => {
                    let id = attr_value(e, b"numFmtId").and_then(|v| v.parse().ok());
                    if let (Some(id), Some(code)) = (id, attr_value(e, b"formatCode")) {
                        custom.insert(id, NumberKind::from_code(&code));
                    }
                }
                b"xf" if in_cell_xfs => {
                    let id = attr_value(e, b"numFmtId")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    xf_formats.push(id);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(xf_formats
        .into_iter()
        .map(|id| custom.get(&id).copied().unwrap_or_else(|| NumberKind::builtin(id)))
        .collect())
}

/// A date serial as `YYYY-MM-DD HH:MM:SS`, or `HH:MM:SS` for a time of day
/// below one.
fn render_serial(serial: f64, date1904: bool) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let mut day = serial.floor();
    let ms = ((serial - day) * MS_PER_DAY as f64).round_ties_even() as i64;

    if (0.0..1.0).contains(&serial) && ms < MS_PER_DAY {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(
            (ms / 1000) as u32,
            (ms % 1000) as u32 * 1_000_000,
        )?;
        return Some(with_micros(time.format("%H:%M:%S").to_string(), time.nanosecond()));
    }

    // Serials below 60 predate the phantom 1900-02-29.
    if !date1904 && serial > 0.0 && serial < 60.0 {
        day += 1.0;
    }

    let epoch = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let moment: NaiveDateTime = epoch
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::try_days(day as i64)?)?
        .checked_add_signed(TimeDelta::try_milliseconds(ms)?)?;

    Some(with_micros(
        moment.format("%Y-%m-%d %H:%M:%S").to_string(),
        moment.nanosecond(),
    ))
}

/// A day count as `[N day[s], ]H:MM:SS[.ffffff]`.
fn render_elapsed(days: f64) -> Option<String> {
    let total = days * MS_PER_DAY as f64;
    if !total.is_finite() || total.abs() >= i64::MAX as f64 {
        return None;
    }
    let total = total.round_ties_even() as i64;
    let whole_days = total.div_euclid(MS_PER_DAY);
    let rem = total.rem_euclid(MS_PER_DAY);

    let mut out = String::new();
    if whole_days != 0 {
        let unit = if whole_days.abs() == 1 { "day" } else { "days" };
        out.push_str(&format!("{} {}, ", whole_days, unit));
    }
    out.push_str(&format!(
        "{}:{:02}:{:02}",
        rem / 3_600_000,
        rem / 60_000 % 60,
        rem / 1000 % 60
    ));
    if rem % 1000 != 0 {
        out.push_str(&format!(".{:06}", rem % 1000 * 1000));
    }
    Some(out)
}

fn with_micros(mut text: String, nanos: u32) -> String {
    let micros = nanos / 1000;
    if micros != 0 {
        text.push_str(&format!(".{:06}", micros));
    }
    text
}

/// An ISO 8601 `t="d"` cell value in the same form as a date serial.
pub fn render_iso(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(moment) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(with_micros(
            moment.format("%Y-%m-%d %H:%M:%S").to_string(),
            moment.nanosecond(),
        ));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d 00:00:00").to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_format_detection() {
        assert_eq!(NumberKind::from_code("yyyy-mm-dd"), NumberKind::DateTime);
        assert_eq!(NumberKind::from_code(r"dd\.mm\.yyyy"), NumberKind::DateTime);
        assert_eq!(NumberKind::from_code("[$-409]d-mmm-yy;@"), NumberKind::DateTime);
        assert_eq!(NumberKind::from_code("h:mm AM/PM"), NumberKind::DateTime);
        assert_eq!(NumberKind::from_code("[h]:mm:ss"), NumberKind::Elapsed);

        assert_eq!(NumberKind::from_code("General"), NumberKind::Plain);
        assert_eq!(NumberKind::from_code("0.00"), NumberKind::Plain);
        assert_eq!(NumberKind::from_code("[Red]#,##0;[Blue]-#,##0"), NumberKind::Plain);
        assert_eq!(NumberKind::from_code(r#""Days: "0"#), NumberKind::Plain);
        assert_eq!(NumberKind::from_code("0_);(0)"), NumberKind::Plain);
    }

    #[test]
    fn test_builtin_kinds() {
        assert_eq!(NumberKind::builtin(0), NumberKind::Plain);
        assert_eq!(NumberKind::builtin(14), NumberKind::DateTime);
        assert_eq!(NumberKind::builtin(22), NumberKind::DateTime);
        assert_eq!(NumberKind::builtin(46), NumberKind::Elapsed);
        assert_eq!(NumberKind::builtin(49), NumberKind::Plain);
    }

    #[test]
    fn test_render_serial() {
        assert_eq!(render_serial(45413.0, false).as_deref(), Some("2024-05-01 00:00:00"));
        assert_eq!(render_serial(45413.5625, false).as_deref(), Some("2024-05-01 13:30:00"));
        assert_eq!(render_serial(0.75, false).as_deref(), Some("18:00:00"));
        assert_eq!(render_serial(1.0, false).as_deref(), Some("1900-01-01 00:00:00"));
        assert_eq!(render_serial(61.0, false).as_deref(), Some("1900-03-01 00:00:00"));
        assert_eq!(render_serial(1.0, true).as_deref(), Some("1904-01-02 00:00:00"));
        assert_eq!(render_serial(f64::NAN, false), None);
    }

    #[test]
    fn test_render_elapsed() {
        assert_eq!(render_elapsed(0.0625).as_deref(), Some("1:30:00"));
        assert_eq!(render_elapsed(1.5).as_deref(), Some("1 day, 12:00:00"));
        assert_eq!(render_elapsed(2.0).as_deref(), Some("2 days, 0:00:00"));
    }

    #[test]
    fn test_render_iso() {
        assert_eq!(render_iso("2024-05-01T09:15:00").as_deref(), Some("2024-05-01 09:15:00"));
        assert_eq!(render_iso("2024-05-01").as_deref(), Some("2024-05-01 00:00:00"));
        assert_eq!(render_iso("soon"), None);
    }

    #[test]
    fn test_parse_styles() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="2"><numFmt numFmtId="164" formatCode="dd\.mm\.yyyy"/><numFmt numFmtId="165" formatCode="&quot;Score: &quot;0"/></numFmts>
<cellStyleXfs count="1"><xf numFmtId="14" fontId="0"/></cellStyleXfs>
<cellXfs count="5"><xf numFmtId="0" fontId="0" xfId="0"/><xf numFmtId="14" fontId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="164" xfId="0"><alignment horizontal="center"/></xf><xf numFmtId="46" xfId="0"/><xf numFmtId="165" xfId="0"/></cellXfs>
</styleSheet>"#;
        let kinds = parse_styles(xml).unwrap();
        assert_eq!(
            kinds,
            vec![
                NumberKind::Plain,
                NumberKind::DateTime,
                NumberKind::DateTime,
                NumberKind::Elapsed,
                NumberKind::Plain,
            ]
        );

        let formats = NumberFormats::new(kinds, false);
        assert_eq!(formats.render(1, "45413").as_deref(), Some("2024-05-01 00:00:00"));
        assert_eq!(formats.render(0, "45413"), None);
        assert_eq!(formats.render(9, "45413"), None);
        assert_eq!(formats.render(1, "#VALUE!"), None);
    }
}
