//! Energy profile module.
//!
//! An hourly productivity curve, optionally scaled per weekday, that biases
//! slot selection toward high-focus hours. Updated from user feedback
//! between scheduling passes and read-only during one.

mod profile;

pub use profile::{EnergyProfile, SessionFeedback};
