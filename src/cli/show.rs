use std::{
    fmt::Display,
    net::{Ipv4Addr, SocketAddr},
    path::Path,
};

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use tracing::{debug, warn};

use crate::{
    daemon::storage::snapshot_storage::SnapshotStorage,
    rpc::client::RpcClient,
    timeline::UsageTimeline,
};

use super::{
    output::{render_category_totals, render_chunks, render_day_line},
    Args,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ShowCommand {
    #[arg(
        long = "date",
        short,
        help = "Day to show, can be repeated. Examples are \"today\", \"yesterday\", \"3 days ago\", \"15/03/2025\""
    )]
    dates: Vec<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

fn parse_dates(
    dates: Vec<String>,
    style: DateStyle,
    now: DateTime<Local>,
) -> Result<Vec<NaiveDate>> {
    if dates.is_empty() {
        return Ok(vec![now.date_naive()]);
    }
    dates
        .into_iter()
        .map(|date| match parse_date_string(&date, now, style.into()) {
            Ok(v) => Ok(v.date_naive()),
            Err(e) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate date {date:?}: {e}"),
                )
                .into()),
        })
        .collect()
}

/// Today's data is asked from the server when one is running since the day file may lag behind.
async fn load_day(
    storage: &SnapshotStorage,
    date: NaiveDate,
    today: NaiveDate,
    port: u16,
) -> Result<Option<(UsageTimeline, Option<String>)>> {
    if date == today {
        match live_day(port).await {
            Ok(day) => return Ok(Some(day)),
            Err(e) => debug!("Server not reachable, reading the day file instead: {e}"),
        }
    }
    let Some(snapshot) = storage.load_day(date).await? else {
        return Ok(None);
    };
    let timeline = UsageTimeline::import(snapshot.tracker_data)?;
    Ok(Some((timeline, snapshot.daily_note)))
}

async fn live_day(port: u16) -> Result<(UsageTimeline, Option<String>)> {
    let mut client = RpcClient::connect(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await?;
    client.refresh().await?;
    let note = client.note().await?;
    Ok((client.timeline().clone(), note))
}

/// Prints the activity of each requested day chunk by chunk followed by the category totals.
pub async fn process_show_command(command: ShowCommand, dir: &Path, port: u16) -> Result<()> {
    let now = Local::now();
    let dates = parse_dates(command.dates, command.date_style, now)?;
    let storage = SnapshotStorage::new(dir.to_owned())?;

    for date in dates {
        let Some((timeline, note)) = load_day(&storage, date, now.date_naive(), port).await? else {
            println!("{date}: nothing recorded");
            continue;
        };
        println!("{}", render_day_line(date, &timeline, note.as_deref()));
        println!();
        print!("{}", render_chunks(&timeline));
        println!();
        print!("{}", render_category_totals(&timeline));
        if let Some(note) = note.filter(|note| !note.is_empty()) {
            println!();
            println!("{note}");
        }
        println!();
    }
    Ok(())
}

/// Prints one line per stored day.
pub async fn process_list_command(dir: &Path) -> Result<()> {
    let storage = SnapshotStorage::new(dir.to_owned())?;
    for (date, path) in storage.list_days(None)? {
        let snapshot = match SnapshotStorage::load_snapshot(&path).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping {path:?}: {e}");
                continue;
            }
        };
        match UsageTimeline::import(snapshot.tracker_data) {
            Ok(timeline) => println!(
                "{}",
                render_day_line(date, &timeline, snapshot.daily_note.as_deref())
            ),
            Err(e) => warn!("Skipping {path:?}: {e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Local, NaiveDate, TimeZone};

    use super::{parse_dates, DateStyle};

    #[test]
    fn test_parse_dates() -> Result<()> {
        let now = Local.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        let today = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

        assert_eq!(parse_dates(vec![], DateStyle::Uk, now)?, vec![today]);
        assert_eq!(
            parse_dates(vec!["yesterday".into()], DateStyle::Uk, now)?,
            vec![today.pred_opt().unwrap()]
        );
        assert_eq!(
            parse_dates(vec!["02/03/2018".into()], DateStyle::Us, now)?,
            vec![NaiveDate::from_ymd_opt(2018, 2, 3).unwrap()]
        );
        assert!(parse_dates(vec!["whenever".into()], DateStyle::Uk, now).is_err());
        Ok(())
    }
}
