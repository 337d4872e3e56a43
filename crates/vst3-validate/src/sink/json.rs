use std::io::{self, Write};

use super::Sink;
use crate::event::Event;

/// JSON lines: one self-describing object per event.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for JsonSink<W> {
    fn emit(&mut self, event: &Event) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        if matches!(event, Event::RunEnded { .. }) {
            self.out.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ClassSummary;

    #[test]
    fn writes_one_object_per_line() {
        let mut sink = JsonSink::new(Vec::new());
        sink.emit(&Event::Info {
            message: "class 2 repeats identifier".into(),
        })
        .unwrap();
        sink.emit(&Event::RunEnded {
            summary: "passed".into(),
            exit_code: 0,
            totals: ClassSummary::default(),
        })
        .unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let last: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(last["event"], "runEnded");
    }
}
