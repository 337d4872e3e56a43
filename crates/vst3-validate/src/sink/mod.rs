//! Reporting sinks.
//!
//! The driver hands every [`Event`] to exactly one sink. [`HumanSink`] renders
//! line-oriented text, [`JsonSink`] writes one JSON object per line and
//! [`MemorySink`] keeps the events for programmatic inspection.

mod human;
mod json;
mod memory;

use std::io;

use crate::event::Event;

pub use human::HumanSink;
pub use json::JsonSink;
pub use memory::MemorySink;

pub trait Sink {
    fn emit(&mut self, event: &Event) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn emit(&mut self, event: &Event) -> io::Result<()> {
        (**self).emit(event)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}
