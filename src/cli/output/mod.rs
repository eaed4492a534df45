//! Text rendering of recorded days.

use std::{fmt::Write, path::PathBuf, sync::Arc};

use chrono::NaiveDate;

use crate::{
    timeline::{category::Category, Chunk, UsageTimeline, IDLE_LABEL},
    utils::{
        percentage::minutes_percentage,
        time::{format_minute, format_minutes_duration},
    },
};

/// Splits the recorded part of the day into consecutive chunks, each labeled with its main app
/// or [IDLE_LABEL].
pub fn split_into_chunks(timeline: &UsageTimeline) -> Vec<(Chunk, Arc<str>)> {
    let (Some(begin), Some(end)) = (timeline.begin_index(), timeline.end_index()) else {
        return vec![];
    };

    let mut chunks = vec![];
    let mut minute = begin;
    while minute <= end {
        let (chunk, label) = timeline.info_at(minute);
        let chunk = if timeline.is_active(minute) {
            Chunk {
                begin: minute,
                end: chunk.end,
            }
        } else {
            // Idle chunks reach up to the next recorded minute.
            Chunk {
                begin: minute,
                end: chunk.end.saturating_sub(1).max(minute),
            }
        };
        minute = chunk.end + 1;
        chunks.push((chunk, label));
    }
    chunks
}

/// Keeps the executable name of a command path.
pub fn clean_process_name(value: &str) -> String {
    PathBuf::from(value)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| value.to_string())
}

pub fn render_chunks(timeline: &UsageTimeline) -> String {
    let mut out = String::new();
    for (chunk, label) in split_into_chunks(timeline) {
        let command = timeline
            .app(&label)
            .map(|app| clean_process_name(&app.command))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{} - {}\t{}\t{}\t{}",
            format_minute(chunk.begin),
            format_minute(chunk.end),
            format_minutes_duration(chunk.span() + 1),
            command,
            label
        );
    }
    out
}

/// Minutes per category with their share of the active minutes.
pub fn render_category_totals(timeline: &UsageTimeline) -> String {
    let active = timeline.active_minutes() as u32;
    let mut out = String::new();
    for category in Category::ALL {
        let minutes = timeline.minutes_in_category(category) as u32;
        if minutes == 0 {
            continue;
        }
        let _ = writeln!(
            out,
            "{category}\t{}\t{}",
            format_minutes_duration(minutes),
            minutes_percentage(minutes, active)
        );
    }
    let total = match (timeline.begin_index(), timeline.end_index()) {
        (Some(begin), Some(end)) => end - begin + 1,
        _ => 0,
    };
    let _ = writeln!(
        out,
        "{IDLE_LABEL}\t{}\t{}",
        format_minutes_duration(total - active),
        minutes_percentage(total - active, total)
    );
    out
}

/// One line per stored day: date, first and last minute, span and the first line of the note.
pub fn render_day_line(date: NaiveDate, timeline: &UsageTimeline, note: Option<&str>) -> String {
    let note = note.and_then(|note| note.lines().next()).unwrap_or("");
    match (timeline.begin_index(), timeline.end_index()) {
        (Some(begin), Some(end)) => format!(
            "{date}\t{}\t{}\t{}\t{note}",
            format_minute(begin),
            format_minute(end),
            format_minutes_duration(end - begin + 1)
        ),
        _ => format!("{date}\t-\t-\t-\t{note}"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        clean_process_name, render_category_totals, render_chunks, render_day_line,
        split_into_chunks,
    };
    use crate::timeline::{
        app_info::AppInfo,
        category::{Category, Rule},
        Chunk, UsageTimeline,
    };

    fn timeline() -> UsageTimeline {
        let mut timeline = UsageTimeline::new();
        for minute in [600, 601, 603] {
            timeline.update(minute, AppInfo::new("vim", "/usr/bin/vim"));
        }
        for minute in [610, 611] {
            timeline.update(minute, AppInfo::new("Slack | general", "/opt/slack/slack"));
        }
        timeline.recategorize(&[Rule::new("^Slack", Category::Work).unwrap()]);
        timeline
    }

    fn labels(chunks: &[(Chunk, std::sync::Arc<str>)]) -> Vec<(u32, u32, &str)> {
        chunks
            .iter()
            .map(|(chunk, label)| (chunk.begin, chunk.end, &**label))
            .collect()
    }

    #[test]
    fn test_chunks_cover_the_day() {
        let chunks = split_into_chunks(&timeline());
        assert_eq!(
            labels(&chunks),
            vec![
                (600, 603, "vim"),
                (604, 609, "idle"),
                (610, 611, "Slack | general")
            ]
        );
        assert!(split_into_chunks(&UsageTimeline::new()).is_empty());
    }

    #[test]
    fn test_render_chunks() {
        let rendered = render_chunks(&timeline());
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "10:00 - 10:03\t4m\tvim\tvim");
        assert_eq!(lines[1], "10:04 - 10:09\t6m\t\tidle");
        assert_eq!(lines[2], "10:10 - 10:11\t2m\tslack\tSlack | general");
    }

    #[test]
    fn test_render_category_totals() {
        let rendered = render_category_totals(&timeline());
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines, vec!["unassigned\t3m\t60%", "work\t2m\t40%", "idle\t7m\t58%"]);
    }

    #[test]
    fn test_day_line() {
        let date = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        assert_eq!(
            render_day_line(date, &timeline(), Some("standup\nretro")),
            "2018-07-04\t10:00\t10:11\t12m\tstandup"
        );
        assert_eq!(
            render_day_line(date, &UsageTimeline::new(), None),
            "2018-07-04\t-\t-\t-\t"
        );
    }

    #[test]
    fn test_clean_process_name() {
        assert_eq!(clean_process_name("/usr/bin/vim"), "vim");
        assert_eq!(clean_process_name("Process not found"), "Process not found");
    }
}
