pub mod control_driver;
pub mod failure_writer;
pub mod report_writer;
pub mod wait;
pub mod window_locator;

pub use control_driver::ControlDriver;
pub use failure_writer::FailureWriter;
pub use report_writer::ReportWriter;
pub use wait::{poll_until, Attempt, WaitError, WaitPolicy};
pub use window_locator::WindowLocator;
