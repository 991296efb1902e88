//! Read-only views over the execution ledger: filtering, search and
//! rendering. Nothing here writes records.

use crate::fuzzy_matcher::FzfMatcher;
use crate::i18n::I18n;
use crate::storage::CommandExecution;
use chrono::{DateTime, Datelike, Local, TimeZone};
use colored::*;
use std::fmt;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const NAME_COLUMN_WIDTH: usize = 40;
const PREVIEW_WIDTH: usize = 60;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Filters for listing records. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub command_name: Option<String>,
    pub success: Option<bool>,
    pub run_once: Option<bool>,
    /// `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `MM-DD`, a month name, or a
    /// substring of the formatted timestamp. Compared in local time, the
    /// same way records are displayed.
    pub date: Option<String>,
    /// Searched in command name, output and error message.
    pub search: Option<String>,
    pub fuzzy: bool,
}

impl ExecutionFilter {
    pub fn matches(&self, record: &CommandExecution, matcher: &FzfMatcher) -> bool {
        if let Some(name) = &self.command_name {
            if &record.command_name != name {
                return false;
            }
        }
        if let Some(success) = self.success {
            if record.success != success {
                return false;
            }
        }
        if let Some(run_once) = self.run_once {
            if record.run_once != run_once {
                return false;
            }
        }
        if let Some(date) = &self.date {
            if !matches_date_filter(&record.executed_at.with_timezone(&Local), date) {
                return false;
            }
        }
        if let Some(query) = &self.search {
            let fields = [
                record.command_name.as_str(),
                record.output.as_str(),
                record.error_message.as_str(),
            ];
            if matcher.best_match(query.trim(), &fields, self.fuzzy).is_none() {
                return false;
            }
        }
        true
    }

    /// Matching records, newest first.
    pub fn apply(&self, records: Vec<CommandExecution>) -> Vec<CommandExecution> {
        let matcher = FzfMatcher::new();
        let mut selected: Vec<CommandExecution> = records
            .into_iter()
            .filter(|record| self.matches(record, &matcher))
            .collect();
        selected.sort_by(|a, b| {
            b.executed_at
                .cmp(&a.executed_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        selected
    }
}

pub fn matches_date_filter<Tz: TimeZone>(timestamp: &DateTime<Tz>, filter: &str) -> bool
where
    Tz::Offset: fmt::Display,
{
    let filter = filter.trim();
    let lower_filter = filter.to_lowercase();
    let numbers: Option<Vec<u32>> = filter.split('-').map(|p| p.parse::<u32>().ok()).collect();

    if let Some(numbers) = numbers {
        let parts: Vec<&str> = filter.split('-').collect();
        match (parts.as_slice(), numbers.as_slice()) {
            // YYYY
            ([y], [year]) if y.len() == 4 => return timestamp.year() == *year as i32,
            // YYYY-MM
            ([y, _], [year, month]) if y.len() == 4 => {
                return timestamp.year() == *year as i32 && timestamp.month() == *month
            }
            // MM-DD
            ([m, _], [month, day]) if m.len() <= 2 => {
                return timestamp.month() == *month && timestamp.day() == *day
            }
            // YYYY-MM-DD
            ([y, _, _], [year, month, day]) if y.len() == 4 => {
                return timestamp.year() == *year as i32
                    && timestamp.month() == *month
                    && timestamp.day() == *day
            }
            _ => {}
        }
    }

    for (i, month_name) in MONTH_NAMES.iter().enumerate() {
        if lower_filter.starts_with(month_name) {
            return timestamp.month() == (i + 1) as u32;
        }
    }

    timestamp
        .format(TIME_FORMAT)
        .to_string()
        .contains(&lower_filter)
}

/// Cut `text` to at most `width` display columns, marking the cut with `…`.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let single_line = text.lines().next().unwrap_or("");
    if single_line.width() <= width && !text.contains('\n') {
        return single_line.to_string();
    }

    let mut result = String::new();
    let mut used = 0;
    for c in single_line.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        result.push(c);
        used += w;
    }
    result.push('…');
    result
}

fn pad_to_width(text: &str, width: usize) -> String {
    let pad = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(pad))
}

fn format_duration(duration: Option<f64>) -> String {
    duration
        .map(|d| format!("{:.2}s", d))
        .unwrap_or_else(|| "-".to_string())
}

fn status_text(record: &CommandExecution, i18n: &I18n) -> ColoredString {
    if record.success {
        i18n.t("status_success").green()
    } else {
        i18n.t("status_failed").red()
    }
}

/// One line per record under a header row.
pub fn render_table(records: &[CommandExecution], i18n: &I18n) -> String {
    let mut output = String::new();
    if records.is_empty() {
        output.push_str(&format!("{}\n", i18n.t("no_records").yellow()));
        return output;
    }

    let id_width = records
        .iter()
        .map(|r| r.id.to_string().len())
        .max()
        .unwrap_or(2)
        .max(i18n.t("col_id").width());
    let name_width = records
        .iter()
        .map(|r| r.command_name.width().min(NAME_COLUMN_WIDTH))
        .max()
        .unwrap_or(0)
        .max(i18n.t("col_name").width());
    let time_width = 19usize.max(i18n.t("col_executed_at").width());
    let status_width = i18n
        .t("status_success")
        .width()
        .max(i18n.t("status_failed").width())
        .max(i18n.t("col_status").width());

    let header = format!(
        "{}  {}  {}  {}  {}",
        pad_to_width(&i18n.t("col_id"), id_width),
        pad_to_width(&i18n.t("col_name"), name_width),
        pad_to_width(&i18n.t("col_executed_at"), time_width),
        pad_to_width(&i18n.t("col_status"), status_width),
        i18n.t("col_duration"),
    );
    output.push_str(&format!("{}\n", header.bold()));

    for record in records {
        let local = record.executed_at.with_timezone(&Local);
        let status_plain = if record.success {
            i18n.t("status_success")
        } else {
            i18n.t("status_failed")
        };
        let status_pad = " ".repeat(status_width.saturating_sub(status_plain.width()));
        output.push_str(&format!(
            "{:>id_width$}  {}  {}  {}{}  {}\n",
            record.id,
            pad_to_width(&truncate_to_width(&record.command_name, NAME_COLUMN_WIDTH), name_width).cyan(),
            pad_to_width(&local.format(TIME_FORMAT).to_string(), time_width),
            status_text(record, i18n),
            status_pad,
            format_duration(record.duration),
            id_width = id_width,
        ));
    }
    output.push_str(&format!(
        "{}\n",
        i18n.t_format("listing_count", &[&records.len().to_string()]).dimmed()
    ));
    output
}

/// Every field of one record.
pub fn render_detail(record: &CommandExecution, i18n: &I18n) -> String {
    let local = record.executed_at.with_timezone(&Local);
    let mut output = String::new();
    output.push_str(&format!("{}\n", format!("#{} {}", record.id, record.command_name).bold().cyan()));
    output.push_str(&format!("{}: {}\n", i18n.t("col_executed_at").yellow(), local.format(TIME_FORMAT)));
    output.push_str(&format!("{}: {}\n", i18n.t("col_status").yellow(), status_text(record, i18n)));
    output.push_str(&format!("{}: {}\n", i18n.t("col_duration").yellow(), format_duration(record.duration)));
    output.push_str(&format!("{}: {}\n", i18n.t("detail_run_once").yellow(), record.run_once));

    let parameters = record
        .parameters
        .as_ref()
        .and_then(|p| serde_json::to_string_pretty(p).ok())
        .unwrap_or_else(|| "-".to_string());
    output.push_str(&format!("{}: {}\n", i18n.t("detail_parameters").yellow(), parameters));

    if !record.output.is_empty() {
        output.push_str(&format!("{}:\n{}\n", i18n.t("detail_output").cyan().bold(), record.output));
    }
    if !record.error_message.is_empty() {
        output.push_str(&format!("{}:\n{}\n", i18n.t("detail_error").red().bold(), record.error_message.red()));
    }
    output
}

/// Short preview of a record, used by history listings.
pub fn render_summary(record: &CommandExecution, i18n: &I18n) -> String {
    let local = record.executed_at.with_timezone(&Local);
    let detail = if record.success {
        &record.output
    } else {
        &record.error_message
    };
    let mut line = format!(
        "#{} {} {} {}",
        record.id,
        local.format(TIME_FORMAT),
        status_text(record, i18n),
        format_duration(record.duration).dimmed(),
    );
    if !detail.is_empty() {
        line.push_str(&format!("  {}", truncate_to_width(detail, PREVIEW_WIDTH)));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewExecution;
    use chrono::Utc;

    fn local(year: i32, month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(year, month, day, hour, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sample() -> Vec<CommandExecution> {
        vec![
            NewExecution::new("jobs.import")
                .run_once(true)
                .into_record(1, local(2024, 1, 15, 8, 0)),
            NewExecution::new("jobs.cleanup")
                .success(false)
                .error_message("ValueError: bad row 12")
                .into_record(2, local(2024, 3, 2, 9, 30)),
            NewExecution::new("jobs.import")
                .output("imported 40 rows")
                .into_record(3, local(2024, 3, 20, 23, 59)),
            NewExecution::new("billing.sync")
                .run_once(true)
                .into_record(4, local(2025, 3, 20, 10, 0)),
        ]
    }

    fn ids(records: &[CommandExecution]) -> Vec<u64> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_no_filter_sorts_newest_first() {
        let filtered = ExecutionFilter::default().apply(sample());
        assert_eq!(ids(&filtered), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_filter_by_name_and_success() {
        let by_name = ExecutionFilter {
            command_name: Some("jobs.import".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&by_name.apply(sample())), vec![3, 1]);

        let failed = ExecutionFilter {
            success: Some(false),
            ..Default::default()
        };
        assert_eq!(ids(&failed.apply(sample())), vec![2]);
    }

    #[test]
    fn test_filter_by_run_once() {
        let one_shot = ExecutionFilter {
            run_once: Some(true),
            ..Default::default()
        };
        assert_eq!(ids(&one_shot.apply(sample())), vec![4, 1]);

        let repeatable = ExecutionFilter {
            run_once: Some(false),
            success: Some(true),
            ..Default::default()
        };
        assert_eq!(ids(&repeatable.apply(sample())), vec![3]);
    }

    #[test]
    fn test_date_filter_uses_displayed_local_date() {
        let late = NewExecution::new("jobs.nightly").into_record(1, local(2024, 3, 21, 0, 30));
        let early = NewExecution::new("jobs.nightly").into_record(2, local(2024, 3, 20, 23, 30));
        let filter = ExecutionFilter {
            date: Some("03-21".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(vec![late, early])), vec![1]);
    }

    #[test]
    fn test_filter_by_date() {
        let year = ExecutionFilter {
            date: Some("2024".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&year.apply(sample())), vec![3, 2, 1]);

        let month = ExecutionFilter {
            date: Some("2024-03".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&month.apply(sample())), vec![3, 2]);

        let day = ExecutionFilter {
            date: Some("03-20".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&day.apply(sample())), vec![4, 3]);

        let full = ExecutionFilter {
            date: Some("2024-03-02".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&full.apply(sample())), vec![2]);
    }

    #[test]
    fn test_date_filter_month_name_and_substring() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 2, 9, 30, 0).unwrap();
        assert!(matches_date_filter(&ts, "March"));
        assert!(matches_date_filter(&ts, "mar"));
        assert!(!matches_date_filter(&ts, "jan"));
        assert!(matches_date_filter(&ts, "09:30"));
        assert!(!matches_date_filter(&ts, "10:30"));
    }

    #[test]
    fn test_search_across_fields() {
        let in_error = ExecutionFilter {
            search: Some("bad row".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&in_error.apply(sample())), vec![2]);

        let in_output = ExecutionFilter {
            search: Some("IMPORTED".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&in_output.apply(sample())), vec![3]);

        let fuzzy = ExecutionFilter {
            search: Some("bsyn".to_string()),
            fuzzy: true,
            ..Default::default()
        };
        assert_eq!(ids(&fuzzy.apply(sample())), vec![4]);
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_to_width("first\nsecond", 20), "first…");
        assert_eq!(truncate_to_width("执行执行执行", 5), "执行…");
    }

    #[test]
    fn test_render_table_lists_every_record() {
        colored::control::set_override(false);
        let i18n = I18n::default();
        let records = ExecutionFilter::default().apply(sample());
        let table = render_table(&records, &i18n);
        assert!(table.starts_with("ID"));
        assert!(table.contains("jobs.cleanup"));
        assert!(table.contains("Failed"));
        assert!(table.contains("(4 records)"));
        assert_eq!(table.lines().count(), 6);
    }

    #[test]
    fn test_render_empty_table() {
        colored::control::set_override(false);
        let table = render_table(&[], &I18n::default());
        assert_eq!(table.trim(), "No records found");
    }

    #[test]
    fn test_render_detail_shows_error() {
        colored::control::set_override(false);
        let records = sample();
        let detail = render_detail(&records[1], &I18n::default());
        assert!(detail.starts_with("#2 jobs.cleanup"));
        assert!(detail.contains("ValueError: bad row 12"));
        assert!(detail.contains("Parameters: -"));
    }

    #[test]
    fn test_render_summary_previews_output() {
        colored::control::set_override(false);
        let records = sample();
        let line = render_summary(&records[2], &I18n::default());
        assert!(line.starts_with("#3 "));
        assert!(line.contains("imported 40 rows"));
    }
}
