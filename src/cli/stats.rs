use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use chrono::{Local, NaiveDate};

use crate::{
    daemon::storage::{activity_storage::ActivityStorage, entities::AppAggregateEntity},
    generate::extract::{aggregates_between, TimeRange},
    utils::percentage::{count_percentage, Percentage},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub keystrokes: u64,
    pub clicks: u64,
}

impl Counts {
    fn add(&mut self, row: &AppAggregateEntity) {
        self.keystrokes += row.keystrokes;
        self.clicks += row.clicks;
    }

    pub fn total(&self) -> u64 {
        self.keystrokes + self.clicks
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppStats {
    pub app: Arc<str>,
    pub counts: Counts,
    pub share: Percentage,
}

/// Activity of a day, computed from the aggregate log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DayStats {
    pub hours: BTreeMap<u32, Counts>,
    /// Apps sorted from the most active one.
    pub apps: Vec<AppStats>,
    pub total: Counts,
}

impl DayStats {
    /// Apps with a share below `min_percentage` are left out of [DayStats::apps].
    pub fn from_rows(rows: &[AppAggregateEntity], min_percentage: Percentage) -> Self {
        let mut hours = BTreeMap::<u32, Counts>::new();
        let mut apps = BTreeMap::<Arc<str>, Counts>::new();
        let mut total = Counts::default();
        for row in rows {
            hours.entry(row.hour).or_default().add(row);
            apps.entry(row.app_name.clone()).or_default().add(row);
            total.add(row);
        }

        let mut apps = apps
            .into_iter()
            .map(|(app, counts)| AppStats {
                share: count_percentage(counts.total(), total.total()),
                app,
                counts,
            })
            .filter(|v| v.share >= min_percentage)
            .collect::<Vec<_>>();
        apps.sort_by(|a, b| b.counts.total().cmp(&a.counts.total()));

        Self { hours, apps, total }
    }

    /// Hour with the most activity, the earliest one on ties.
    pub fn most_active_hour(&self) -> Option<(u32, Counts)> {
        self.hours
            .iter()
            .filter(|(_, counts)| counts.total() > 0)
            .fold(None, |best: Option<(u32, Counts)>, (&hour, &counts)| match best {
                Some((_, top)) if top.total() >= counts.total() => best,
                _ => Some((hour, counts)),
            })
    }
}

/// Prints the statistics of the local day `date`.
pub async fn process_stats_command(
    storage: impl ActivityStorage,
    date: NaiveDate,
    min_percentage: Percentage,
) -> Result<()> {
    let rows = aggregates_between(&storage, TimeRange::day(date, &Local)).await?;
    if rows.is_empty() {
        println!("No activity recorded on {date}");
        return Ok(());
    }
    let stats = DayStats::from_rows(&rows, min_percentage);

    println!("Activity on {date}");
    println!(
        "{} keystrokes\t{} clicks",
        stats.total.keystrokes, stats.total.clicks
    );
    println!();
    println!("Hour\tKeys\tClicks");
    for (hour, counts) in &stats.hours {
        println!("{hour:02}:00\t{}\t{}", counts.keystrokes, counts.clicks);
    }
    println!();
    println!("Share\tKeys\tClicks\tApp");
    for app in &stats.apps {
        println!(
            "{}%\t{}\t{}\t{}",
            *app.share as i32, app.counts.keystrokes, app.counts.clicks, app.app
        );
    }
    if let Some((hour, counts)) = stats.most_active_hour() {
        println!();
        println!(
            "Most active hour: {hour:02}:00 with {} keystrokes and {} clicks",
            counts.keystrokes, counts.clicks
        );
    }
    Ok(())
}
