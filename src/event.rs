use std::fmt;

/// Something a task did, reported to the caller's sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Produced { value: u32 },
    Consumed { value: u32, sum: u64 },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Produced { value } => write!(f, "Produced: {value}"),
            Event::Consumed { value, sum } => write!(f, "Consumed: {value}, Sum: {sum}"),
        }
    }
}

#[test]
fn display_matches_output_lines() {
    assert_eq!(Event::Produced { value: 42 }.to_string(), "Produced: 42");
    assert_eq!(
        Event::Consumed { value: 7, sum: 49 }.to_string(),
        "Consumed: 7, Sum: 49"
    );
}
