//! Estimate statistics and room notifications

pub mod aggregate;
pub mod notifier;
pub mod ticket;

pub use aggregate::{
    hours_from_parts, pretty_fractional, pretty_hours, pretty_stddev, EstimateSummary,
    TicketAggregate, NO_ESTIMATE,
};
pub use notifier::Notifier;
pub use ticket::{Author, Estimate, Ticket, UserId};
