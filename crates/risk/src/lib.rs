//! Event risk: economic-calendar lookups merged into scan results as a
//! read-only annotation.

pub mod calendar;

pub use calendar::{implied_currencies, EconomicCalendar, EconomicEvent, Impact};
