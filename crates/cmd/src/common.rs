// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use clap::Args;
use fluxport::{ExportWindow, FluxportConfig};

/// Time window flags shared by `query` and `export`
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Window start (RFC3339 or YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// Window end (RFC3339 or YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Lookback from now, e.g. 30m, 6h, 7d (conflicts with --start)
    #[arg(long, conflicts_with = "start")]
    pub last: Option<String>,
}

impl WindowArgs {
    pub fn window(&self) -> Result<ExportWindow> {
        let end = self.end.as_deref().map(parse_time).transpose()?;
        match (&self.last, &self.start) {
            (Some(last), _) => {
                let lookback = parse_lookback(last)?;
                let window = ExportWindow::last_before(end.unwrap_or_else(Utc::now), lookback)
                    .with_context(|| format!("Lookback '{}' reaches too far back", last))?;
                Ok(window)
            }
            (None, Some(start)) => Ok(ExportWindow::new(Some(parse_time(start)?), end)),
            (None, None) => Ok(ExportWindow::new(None, end)),
        }
    }
}

/// Load the configuration file, with environment overrides applied
pub fn load_config(path: &Path) -> Result<FluxportConfig> {
    fluxport::load_config(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// RFC3339 instant, or a date meaning its UTC midnight
pub fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| anyhow!("Invalid time '{}': expected RFC3339 or YYYY-MM-DD", text))
}

/// `<n>s|m|h|d|w`
pub fn parse_lookback(text: &str) -> Result<TimeDelta> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("Lookback '{}' has no unit (s, m, h, d, w)", text))?;
    let (amount, unit) = text.split_at(split);
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("Invalid lookback amount in '{}'", text))?;
    let delta = match unit {
        "s" => TimeDelta::try_seconds(amount),
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        "d" => TimeDelta::try_days(amount),
        "w" => TimeDelta::try_weeks(amount),
        _ => return Err(anyhow!("Unknown lookback unit '{}' in '{}'", unit, text)),
    };
    delta
        .filter(|d| *d > TimeDelta::zero())
        .ok_or_else(|| anyhow!("Lookback '{}' is out of range", text))
}

/// `key=value`
pub fn parse_tag(text: &str) -> Result<(String, String)> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| anyhow!("Tag filter '{}' must look like key=value", text))?;
    if key.trim().is_empty() {
        return Err(anyhow!("Tag filter '{}' has an empty key", text));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_time_forms() {
        let t = parse_time("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        let d = parse_time("2024-05-01").unwrap();
        assert_eq!(d, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_parse_lookback() {
        assert_eq!(parse_lookback("30m").unwrap(), TimeDelta::minutes(30));
        assert_eq!(parse_lookback("2w").unwrap(), TimeDelta::days(14));
        assert!(parse_lookback("0h").is_err());
        assert!(parse_lookback("12").is_err());
        assert!(parse_lookback("5y").is_err());
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(
            parse_tag("entity_id=sensor.a=b").unwrap(),
            ("entity_id".to_string(), "sensor.a=b".to_string())
        );
        assert!(parse_tag("no-equals").is_err());
        assert!(parse_tag("=x").is_err());
    }

    #[test]
    fn test_window_from_last() {
        let args = WindowArgs {
            start: None,
            end: Some("2024-05-02".into()),
            last: Some("1d".into()),
        };
        let window = args.window().unwrap();
        assert_eq!(window.start, Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert_eq!(window.end, Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_huge_lookback_is_an_error() {
        let args = WindowArgs {
            start: None,
            end: Some("2024-05-02".into()),
            last: Some("20000000w".into()),
        };
        assert!(parse_lookback("20000000w").is_ok());
        let err = args.window().unwrap_err();
        assert!(err.to_string().contains("reaches too far back"), "{err}");
    }
}
