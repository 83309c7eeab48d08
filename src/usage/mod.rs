//! Monthly token metering
//!
//! Usage is summed over the calendar month in the server's local time zone
//! and compared against the free allowance; paid accounts are never gated.

pub mod handlers;
mod meter;
mod window;

pub use meter::{MonthlyUsage, QuotaStatus, RecordedUsage, UsageMeter};
pub use window::MonthWindow;
