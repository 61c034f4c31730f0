//! Plain-text rendering of the leaderboard, comparisons and poll status.

use std::fmt::Write;

use chrono::Local;
use console::style;

use subtally_common::{CountSource, PairStanding, RankedChannel, Snapshot};
use subtally_engine::{columns, COLUMN_SIZE};

const TITLE_WIDTH: usize = 24;

pub fn leaderboard(rows: &[RankedChannel]) -> String {
    if rows.is_empty() {
        return "No channels tracked. Add one with `subtally add <channel-id> --title <title>`.\n"
            .to_string();
    }

    let mut out = String::new();
    for column in columns(rows, COLUMN_SIZE) {
        let first = column.first().map(|r| r.rank).unwrap_or_default();
        let last = column.last().map(|r| r.rank).unwrap_or_default();
        let _ = writeln!(out, "{}", style(format!("── #{first}–#{last} ──")).bold());
        for row in column {
            let _ = writeln!(out, "{}", leaderboard_row(row));
        }
    }
    out
}

fn leaderboard_row(row: &RankedChannel) -> String {
    let source = match row.source {
        CountSource::Live => style("live").green().to_string(),
        CountSource::Cached => style("cached").dim().to_string(),
    };
    let adjustment = if row.is_adjusted() {
        format!(" ({:+})", row.adjustment)
    } else {
        String::new()
    };
    format!(
        "{:>3}. {:<width$} {:>15} {}{}",
        row.rank,
        truncate(&row.channel.title, TITLE_WIDTH),
        group_digits(row.adjusted_total),
        source,
        adjustment,
        width = TITLE_WIDTH,
    )
}

pub fn comparisons(standings: &[PairStanding]) -> String {
    let mut out = String::new();
    for standing in standings {
        let _ = writeln!(
            out,
            "{:>width$} {:>15}  {} {:<13} {:<15} {}  {}",
            truncate(&standing.left.title, TITLE_WIDTH),
            group_digits(standing.left.adjusted_total),
            standing.lead.indicator(),
            group_digits(standing.delta.saturating_abs()),
            group_digits(standing.right.adjusted_total),
            truncate(&standing.right.title, TITLE_WIDTH),
            style(standing.pair_id).dim(),
            width = TITLE_WIDTH,
        );
    }
    out
}

/// One-line summary of the latest cycle.
pub fn status(snapshot: &Snapshot) -> String {
    let Some(published_at) = snapshot.published_at else {
        return "waiting for first poll…".to_string();
    };
    format!(
        "cycle {} · {} live / {} cached / {} failed · last fetch {}",
        snapshot.cycle,
        snapshot.stats.live,
        snapshot.stats.cached,
        snapshot.stats.failed,
        published_at.with_timezone(&Local).format("%H:%M:%S"),
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// `1234567` → `1,234,567`.
pub fn group_digits(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use subtally_common::{CycleStats, Lead, PairSide, TrackedChannel};
    use uuid::Uuid;

    fn row(rank: usize, title: &str, total: i64, adjustment: i64) -> RankedChannel {
        RankedChannel {
            rank,
            channel: TrackedChannel::new(format!("UC{rank}"), title),
            count: total.saturating_sub(adjustment).max(0) as u64,
            adjustment,
            adjusted_total: total,
            source: CountSource::Live,
        }
    }

    fn side(title: &str, total: i64) -> PairSide {
        PairSide {
            channel_id: title.to_string(),
            title: title.to_string(),
            thumbnail: String::new(),
            adjusted_total: total,
        }
    }

    #[test]
    fn digits_are_grouped() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(999), "999");
        assert_eq!(group_digits(1_000), "1,000");
        assert_eq!(group_digits(123_456_789), "123,456,789");
        assert_eq!(group_digits(-7), "-7");
        assert_eq!(group_digits(-12_345), "-12,345");
    }

    #[test]
    fn long_titles_are_truncated() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 5), "abcd…");
    }

    #[test]
    fn leaderboard_splits_into_columns_of_ten() {
        console::set_colors_enabled(false);
        let rows: Vec<_> = (1..=12).map(|i| row(i, "Chan", 100 - i as i64, 0)).collect();
        let text = leaderboard(&rows);
        assert!(text.contains("── #1–#10 ──"));
        assert!(text.contains("── #11–#12 ──"));
        assert_eq!(text.lines().count(), 14);
    }

    #[test]
    fn adjusted_rows_show_offset() {
        console::set_colors_enabled(false);
        let text = leaderboard(&[row(1, "Alpha", 1_500, -20), row(2, "Beta", 900, 0)]);
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[1].contains("1,500 live (-20)"));
        assert!(lines[2].ends_with("900 live"));
    }

    #[test]
    fn comparison_shows_leader_and_gap() {
        console::set_colors_enabled(false);
        let standing = PairStanding {
            pair_id: Uuid::nil(),
            left: side("A", 80),
            right: side("B", 90),
            delta: -10,
            lead: Lead::Right,
        };
        let text = comparisons(&[standing]);
        assert!(text.contains("▼ 10"));
        assert!(text.contains(&Uuid::nil().to_string()));
    }

    #[test]
    fn status_before_first_publish() {
        assert_eq!(status(&Snapshot::default()), "waiting for first poll…");

        let snapshot = Snapshot {
            cycle: 4,
            stats: CycleStats {
                live: 3,
                cached: 1,
                failed: 2,
            },
            published_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        assert!(status(&snapshot).starts_with("cycle 4 · 3 live / 1 cached / 2 failed"));
    }
}
