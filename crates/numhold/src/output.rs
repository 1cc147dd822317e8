//! Rendering command outcomes for people and for `--json`.

use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use numhold_core::{Page, Record, RecordId, Resolution};
use serde::Serialize;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl OutputFormat {
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Human
        }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Enqueued { id: RecordId, number: String },
    Held { record: Record },
    Resolved { resolution: Resolution },
    Removed { number: String },
    Found { record: Record },
    Listed { page: Page },
    Owned { records: Vec<Record> },
    Counted { count: u64 },
    Cleared { removed: u64 },
    Stopped,
}

#[derive(Debug, Serialize)]
struct SuccessEnvelope<'a> {
    success: bool,
    data: &'a Outcome,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: &'a str,
}

/// Render an outcome in `format`.
pub fn render(outcome: &Outcome, format: OutputFormat) -> anyhow::Result<String> {
    if format.is_json() {
        return Ok(serde_json::to_string(&SuccessEnvelope {
            success: true,
            data: outcome,
        })?);
    }
    Ok(render_human(outcome))
}

/// Render an error envelope for `--json`.
pub fn render_error_json(code: &str, message: &str) -> String {
    let envelope = ErrorEnvelope {
        success: false,
        error: ErrorDetail { code, message },
    };
    serde_json::to_string(&envelope).unwrap_or_else(|_| {
        format!(
            "{{\"success\":false,\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
            code.replace('"', "\\\""),
            message.replace('"', "\\\"")
        )
    })
}

fn render_human(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Enqueued { id, number } => format!("Enqueued {number} (id {id})"),
        Outcome::Held { record } => {
            let until = record.hold_end.map_or_else(
                || "indefinitely".to_string(),
                |end| format!("until {}", timestamp(end)),
            );
            format!("Holding {} {until}", record.number)
        }
        Outcome::Resolved { resolution } => format!(
            "{} -> {} after {}",
            resolution.number,
            resolution.status,
            elapsed(resolution.elapsed_hold_time)
        ),
        Outcome::Removed { number } => format!("Removed {number}"),
        Outcome::Found { record } => record_detail(record),
        Outcome::Listed { page } => {
            let mut out = record_table(&page.records);
            let _ = write!(
                out,
                "page {}/{} ({} total)",
                page.page,
                page.total_pages().max(1),
                page.total
            );
            out
        }
        Outcome::Owned { records } => {
            let mut out = record_table(records);
            let _ = write!(out, "{} total", records.len());
            out
        }
        Outcome::Counted { count } => count.to_string(),
        Outcome::Cleared { removed } => format!("Cleared {removed} numbers"),
        Outcome::Stopped => "Stopped".to_string(),
    }
}

fn record_table(records: &[Record]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{:<24} {:<8} {:<16} {}",
            record.number,
            record.status,
            record.owner_id,
            timestamp(record.created_at)
        );
    }
    out
}

fn record_detail(record: &Record) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "number:     {}", record.number);
    let _ = writeln!(out, "status:     {}", record.status);
    let _ = writeln!(out, "owner:      {}", record.owner_id);
    let _ = write!(out, "created:    {}", timestamp(record.created_at));
    if let Some(start) = record.hold_start {
        let _ = write!(out, "\nhold start: {}", timestamp(start));
    }
    if let Some(end) = record.hold_end {
        let _ = write!(out, "\nhold end:   {}", timestamp(end));
    }
    if let Some(by) = &record.hold_set_by {
        let _ = write!(out, "\nheld by:    {by}");
    }
    if let Some(spent) = record.elapsed_hold_time {
        let _ = write!(out, "\nheld for:   {}", elapsed(spent));
    }
    out
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn elapsed(d: Duration) -> String {
    let total = d.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_formatting() {
        assert_eq!(elapsed(Duration::seconds(42)), "42s");
        assert_eq!(elapsed(Duration::seconds(125)), "2m 5s");
        assert_eq!(elapsed(Duration::minutes(135)), "2h 15m");
    }

    #[test]
    fn test_json_envelope_tags_outcome() -> anyhow::Result<()> {
        let json = render(&Outcome::Counted { count: 3 }, OutputFormat::Json)?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["kind"], "counted");
        assert_eq!(value["data"]["count"], 3);
        Ok(())
    }

    #[test]
    fn test_error_envelope() -> anyhow::Result<()> {
        let value: serde_json::Value =
            serde_json::from_str(&render_error_json("NOT_FOUND", "number '1' not found"))?;
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "NOT_FOUND");
        Ok(())
    }
}
