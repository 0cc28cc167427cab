//! Per-ticket estimate statistics
//!
//! Estimates are whole hours. A week is 40 hours and a day is 8, so an
//! hour count prints as `{w}w {d}d {h}h`. Only user-authored estimates
//! feed the statistics; an oracle recommendation is stored alongside them
//! but never moves the numbers.

use std::collections::HashSet;

use serde::Serialize;

use crate::registry::{RoomId, TicketId};

use super::ticket::{Author, Estimate};

/// Hours in a working week
pub const HOURS_PER_WEEK: i64 = 40;

/// Hours in a working day
pub const HOURS_PER_DAY: i64 = 8;

/// Placeholder printed when a ticket has no estimates
pub const NO_ESTIMATE: &str = "No estimate";

/// Combine a `{weeks, days, hours}` entry into hours
///
/// Returns `None` if the total does not fit in an `i64`.
pub fn hours_from_parts(weeks: i64, days: i64, hours: i64) -> Option<i64> {
    weeks
        .checked_mul(HOURS_PER_WEEK)?
        .checked_add(days.checked_mul(HOURS_PER_DAY)?)?
        .checked_add(hours)
}

/// Format an hour count as `{w}w {d}d {h}h`
pub fn pretty_hours(hours: Option<i64>) -> String {
    match hours {
        Some(e) => format!(
            "{}w {}d {}h",
            e / HOURS_PER_WEEK,
            (e % HOURS_PER_WEEK) / HOURS_PER_DAY,
            e % HOURS_PER_DAY
        ),
        None => NO_ESTIMATE.to_string(),
    }
}

/// Format a fractional hour count, truncating toward zero
pub fn pretty_fractional(hours: Option<f64>) -> String {
    pretty_hours(hours.map(|h| h.trunc() as i64))
}

/// Format a standard deviation as `{:.3}h`
pub fn pretty_stddev(stddev: Option<f64>) -> String {
    format!("{:.3}h", stddev.unwrap_or(0.0))
}

/// Derived statistics for one ticket
#[derive(Debug, Clone, PartialEq)]
pub struct TicketAggregate {
    pub ticket_id: TicketId,
    pub room_id: RoomId,
    pub external_key: Option<String>,
    pub average: Option<f64>,
    pub median: Option<f64>,
    pub stddev: Option<f64>,
    /// Distinct users that estimated
    pub respondents: usize,
    /// Users in the room
    pub participants: usize,
}

impl TicketAggregate {
    /// Compute statistics over a ticket's estimates
    pub fn compute(
        ticket_id: TicketId,
        room_id: RoomId,
        external_key: Option<String>,
        estimates: &[Estimate],
        participants: usize,
    ) -> Self {
        let mut respondents = HashSet::new();
        let mut values: Vec<f64> = Vec::with_capacity(estimates.len());

        for estimate in estimates {
            if let Author::User(user) = estimate.author {
                respondents.insert(user);
                values.push(estimate.hours as f64);
            }
        }

        let (average, median, stddev) = if values.is_empty() {
            (None, None, None)
        } else {
            let mean = mean(&values);
            (Some(mean), Some(median(&mut values)), Some(population_stddev(&values, mean)))
        };

        Self {
            ticket_id,
            room_id,
            external_key,
            average,
            median,
            stddev,
            respondents: respondents.len(),
            participants,
        }
    }

    /// Printable form
    pub fn summary(&self) -> EstimateSummary {
        EstimateSummary {
            ticket_id: self.ticket_id,
            room_id: self.room_id,
            external_key: self.external_key.clone(),
            average: pretty_fractional(self.average),
            median: pretty_fractional(self.median),
            stddev: pretty_stddev(self.stddev),
            estimated_by: format!("{}/{}", self.respondents, self.participants),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// 50th percentile with linear interpolation between closest ranks
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let rank = (values.len() - 1) as f64 * 0.5;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    values[lower] + (values[upper] - values[lower]) * (rank - lower as f64)
}

fn population_stddev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Ticket statistics formatted for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EstimateSummary {
    pub ticket_id: TicketId,
    pub room_id: RoomId,
    pub external_key: Option<String>,
    pub average: String,
    pub median: String,
    pub stddev: String,
    /// `respondents/participants`
    pub estimated_by: String,
}
