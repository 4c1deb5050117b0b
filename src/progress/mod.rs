pub mod console;
pub mod transcript;

pub use console::ConsoleSink;
pub use transcript::TranscriptSink;

/// Where the updater reports what it is doing.
///
/// The log written through this trait is the only place an operator sees
/// errors, so implementations should not drop lines.
pub trait ProgressSink {
    fn heading(&mut self, text: &str);
    fn line(&mut self, text: &str);
    fn blank(&mut self);

    /// A problem the sink ran into on its own, handed out once so another
    /// sink can show it to the operator.
    fn take_warning(&mut self) -> Option<String> {
        None
    }
}

/// Fans every event out to several sinks, in order.
#[derive(Default)]
pub struct TeeSink {
    sinks: Vec<Box<dyn ProgressSink>>,
}

impl TeeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    fn forward_warnings(&mut self) {
        for from in 0..self.sinks.len() {
            let Some(warning) = self.sinks[from].take_warning() else {
                continue;
            };
            for (index, sink) in self.sinks.iter_mut().enumerate() {
                if index != from {
                    sink.line(&warning);
                }
            }
        }
    }
}

impl ProgressSink for TeeSink {
    fn heading(&mut self, text: &str) {
        for sink in &mut self.sinks {
            sink.heading(text);
        }
        self.forward_warnings();
    }

    fn line(&mut self, text: &str) {
        for sink in &mut self.sinks {
            sink.line(text);
        }
        self.forward_warnings();
    }

    fn blank(&mut self) {
        for sink in &mut self.sinks {
            sink.blank();
        }
        self.forward_warnings();
    }
}

/// Format a labelled value the way every stage prints its facts.
pub fn detail(label: &str, value: impl std::fmt::Display) -> String {
    format!("{}:\n   -> {}", label, value)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ProgressSink;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Heading(String),
        Line(String),
        Blank,
    }

    /// Records events so tests can assert on the transcript.
    #[derive(Debug, Default, Clone)]
    pub struct MemorySink {
        pub events: Vec<Event>,
    }

    impl MemorySink {
        pub fn headings(&self) -> Vec<&str> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Heading(h) => Some(h.as_str()),
                    _ => None,
                })
                .collect()
        }

        pub fn contains(&self, needle: &str) -> bool {
            self.events.iter().any(|e| match e {
                Event::Line(l) | Event::Heading(l) => l.contains(needle),
                Event::Blank => false,
            })
        }
    }

    impl ProgressSink for MemorySink {
        fn heading(&mut self, text: &str) {
            self.events.push(Event::Heading(text.to_string()));
        }

        fn line(&mut self, text: &str) {
            self.events.push(Event::Line(text.to_string()));
        }

        fn blank(&mut self) {
            self.events.push(Event::Blank);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_format() {
        assert_eq!(detail("Temp folder", "/tmp"), "Temp folder:\n   -> /tmp");
    }
}
