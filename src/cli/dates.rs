use std::fmt::Display;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
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

#[derive(Debug, clap::Args)]
pub struct DayParams {
    #[arg(
        long,
        short,
        help = "Day to use. Examples are \"today\", \"yesterday\", \"15/03/2025\". Defaults to today"
    )]
    pub date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    pub date_style: DateStyle,
}

impl DayParams {
    /// The local calendar day the user asked for.
    pub fn resolve(&self) -> Result<NaiveDate> {
        let now = Local::now();
        match &self.date {
            None => Ok(now.date_naive()),
            Some(date) => match parse_date_string(date, now, self.date_style.into()) {
                Ok(v) => Ok(v.with_timezone(&Local).date_naive()),
                Err(e) => Err(Args::command()
                    .error(
                        clap::error::ErrorKind::ValueValidation,
                        format!("Failed to validate date {date}: {e}"),
                    )
                    .into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;

    use super::{DateStyle, DayParams};

    #[test]
    fn dialects_order_day_and_month() -> Result<()> {
        let uk = DayParams {
            date: Some("03/04/2025".into()),
            date_style: DateStyle::Uk,
        };
        let us = DayParams {
            date: Some("03/04/2025".into()),
            date_style: DateStyle::Us,
        };
        assert_eq!(uk.resolve()?, NaiveDate::from_ymd_opt(2025, 4, 3).unwrap());
        assert_eq!(us.resolve()?, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        Ok(())
    }

    #[test]
    fn nonsense_is_rejected() {
        let params = DayParams {
            date: Some("the day after never".into()),
            date_style: DateStyle::Uk,
        };
        assert!(params.resolve().is_err());
    }
}
