//! Progress messages to the caller.

use std::time::{Duration, Instant};

use tessera_world::entity::EntityId;

/// Where restore progress text goes.
pub trait NotificationSink {
    fn notify(&mut self, recipient: EntityId, text: &str);
}

/// Collects messages in order; handy for hosts that batch delivery.
impl NotificationSink for Vec<(EntityId, String)> {
    fn notify(&mut self, recipient: EntityId, text: &str) {
        self.push((recipient, text.to_owned()));
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&mut self, _recipient: EntityId, _text: &str) {}
}

/// Rate limiting and chunking in front of a [`NotificationSink`].
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    recipient: EntityId,
    interval: Duration,
    chunk_chars: usize,
    last: Instant,
}

impl Notifier {
    pub(crate) fn new(recipient: EntityId, interval: Duration, chunk_chars: usize) -> Self {
        Self {
            recipient,
            interval,
            chunk_chars: chunk_chars.max(1),
            last: Instant::now(),
        }
    }

    /// Send `text` unless a message went out within the interval. Returns
    /// whether it was sent.
    pub(crate) fn maybe(&mut self, sink: &mut dyn NotificationSink, text: &str) -> bool {
        if self.last.elapsed() <= self.interval {
            return false;
        }
        self.always(sink, text);
        true
    }

    /// Send `text` now, split into chunks if it is too long.
    pub(crate) fn always(&mut self, sink: &mut dyn NotificationSink, text: &str) {
        for chunk in split_chunks(text, self.chunk_chars) {
            sink.notify(self.recipient, chunk);
        }
        self.last = Instant::now();
    }

    /// Send `header` followed by one line per entry, packing lines into
    /// messages no longer than the chunk size.
    pub(crate) fn listing(
        &mut self,
        sink: &mut dyn NotificationSink,
        header: &str,
        lines: impl IntoIterator<Item = impl AsRef<str>>,
    ) {
        let mut message = format!("{header}\n");
        for line in lines {
            let line = line.as_ref();
            if message.len() + line.len() + 1 > self.chunk_chars && !message.is_empty() {
                self.always(sink, message.trim_end());
                message.clear();
            }
            message.push_str(line);
            message.push('\n');
        }
        if !message.is_empty() {
            self.always(sink, message.trim_end());
        }
    }
}

/// Split `text` into pieces of at most `max` bytes on char boundaries.
fn split_chunks(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single char wider than `max`; send it whole.
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
