//! Plain-text message rendering for both notification kinds.

use lightwatch_core::schedule::{GroupNumber, Status};

use crate::advance::NoticeLine;
use crate::changes::{DayKind, ScheduleDiff};
use crate::diff::Slot;

pub fn status_emoji(status: Status) -> &'static str {
    match status {
        Status::Off => "🔴",
        Status::Maybe => "🟡",
        Status::On => "🟢",
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Off => "No power",
        Status::Maybe => "Possible outage",
        Status::On => "Power on",
    }
}

/// Schedule-change notice covering every changed group of every changed day.
pub fn schedule_change(diff: &ScheduleDiff) -> String {
    let mut out = String::from("⚡ Outage schedule updated\n");

    for day in &diff.days {
        let label = match day.kind {
            DayKind::Today => "Today",
            DayKind::Tomorrow => "Tomorrow",
        };
        out.push_str(&format!("\n📅 {label}, {}\n", day.date.format("%d.%m")));

        for change in &day.groups {
            out.push_str(&format!("Group {}:\n", change.group));
            if change.slots.is_empty() {
                out.push_str("  ✅ Nothing left for today\n");
                continue;
            }
            for status in Status::all() {
                let ranges = ranges_with_status(&change.slots, status);
                if !ranges.is_empty() {
                    out.push_str(&format!(
                        "  {} {}: {}\n",
                        status_emoji(status),
                        status_label(status),
                        ranges.join(", ")
                    ));
                }
            }
        }
    }

    out.trim_end().to_string()
}

fn ranges_with_status(slots: &[Slot], status: Status) -> Vec<String> {
    slots
        .iter()
        .filter(|slot| slot.status == status)
        .map(|slot| format!("{}–{}", slot.period.from, slot.period.to))
        .collect()
}

/// Advance notice; `lines` are already ordered.
pub fn advance_notice(lines: &[NoticeLine], lookahead_minutes: u32) -> String {
    let mut out = format!("⏰ Coming up in about {lookahead_minutes} minutes:\n");
    for line in lines {
        out.push_str(&format!(
            "{} {} {} for {}\n",
            status_emoji(line.status),
            line.start_time,
            status_label(line.status).to_lowercase(),
            group_list(&line.groups)
        ));
    }
    out.trim_end().to_string()
}

fn group_list(groups: &[GroupNumber]) -> String {
    let numbers: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
    if numbers.len() == 1 {
        format!("group {}", numbers[0])
    } else {
        format!("groups {}", numbers.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{DayDiff, GroupChange};
    use chrono::NaiveDate;
    use Status::{Maybe, Off, On};

    #[test]
    fn test_schedule_change_groups_by_status() {
        let diff = ScheduleDiff {
            days: vec![DayDiff {
                date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                kind: DayKind::Today,
                groups: vec![GroupChange {
                    group: 2,
                    fingerprint: "abc".into(),
                    slots: vec![
                        Slot::new("12:00", "14:00", Off),
                        Slot::new("14:00", "18:00", On),
                        Slot::new("18:00", "20:00", Off),
                        Slot::new("20:00", "24:00", Maybe),
                    ],
                }],
            }],
        };
        let text = schedule_change(&diff);
        assert!(text.contains("📅 Today, 14.03"));
        assert!(text.contains("Group 2:"));
        assert!(text.contains("🔴 No power: 12:00–14:00, 18:00–20:00"));
        assert!(text.contains("🟡 Possible outage: 20:00–24:00"));
        assert!(text.contains("🟢 Power on: 14:00–18:00"));
        let off = text.find("🔴").unwrap();
        let maybe = text.find("🟡").unwrap();
        let on = text.find("🟢").unwrap();
        assert!(off < maybe && maybe < on);
    }

    #[test]
    fn test_schedule_change_nothing_left() {
        let diff = ScheduleDiff {
            days: vec![DayDiff {
                date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                kind: DayKind::Today,
                groups: vec![GroupChange {
                    group: 1,
                    fingerprint: "abc".into(),
                    slots: vec![],
                }],
            }],
        };
        assert!(schedule_change(&diff).contains("Nothing left for today"));
    }

    #[test]
    fn test_advance_notice_lines() {
        let lines = vec![
            NoticeLine { start_time: "12:00".into(), status: Off, groups: vec![1, 4] },
            NoticeLine { start_time: "12:00".into(), status: Maybe, groups: vec![2] },
        ];
        let text = advance_notice(&lines, 10);
        assert!(text.starts_with("⏰ Coming up in about 10 minutes:"));
        assert!(text.contains("🔴 12:00 no power for groups 1, 4"));
        assert!(text.contains("🟡 12:00 possible outage for group 2"));
    }
}
