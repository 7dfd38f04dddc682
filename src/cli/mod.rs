pub mod convert;
pub mod display;
pub mod history;
pub mod setup;
pub mod ui;
pub mod watch;
