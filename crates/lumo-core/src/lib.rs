//! Core domain types shared across the entire Lumo workspace.
//!
//! Lumo models a lamp as a small state machine: named behaviors render RGB
//! output, rules move between behaviors when events fire, and sensor
//! runtimes feed a shared key-value store that rendered code can read.
//! This crate holds the types every other crate agrees on:
//!
//! - [`Rgb`] / [`Frame`]: color values and rendered output frames
//! - [`DataStore`]: the shared, lock-protected JSON-value map
//! - [`OutputDevice`]: the hardware seam (LED strip, COB driver, test double)
//! - [`ClockTime`]: a wall-clock snapshot for time-of-day logic

mod clock;
mod color;
mod data;
mod device;

pub use clock::ClockTime;
pub use color::{Frame, Rgb};
pub use data::DataStore;
pub use device::{NullDevice, OutputDevice, RecordingDevice};
