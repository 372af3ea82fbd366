//! Stream reassembly
//!
//! Collects the fragments of a streamed reply until it is finalized, either
//! by an explicit end frame or, for raw text streams, after the stream has
//! been idle for the configured window.

use crate::state::MessageId;
use std::time::Duration;
use tokio::time::Instant;

/// How the active stream was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    /// `stream_start` / `stream_chunk` frames
    Structured,
    /// Raw text fragments
    Raw,
}

/// Text accumulated for one streamed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBuffer {
    /// Id the committed message will carry
    pub message_id: MessageId,
    /// Accumulated text
    pub text: String,
    /// How the stream started
    pub origin: StreamOrigin,
}

/// Result of appending a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Id of the stream the fragment joined
    pub message_id: MessageId,
    /// The fragment opened a new stream
    pub started: bool,
    /// Text accumulated so far, fragment included
    pub text: String,
}

/// At most one in-progress stream plus its idle deadline
#[derive(Debug)]
pub struct StreamAssembler {
    buffer: Option<StreamBuffer>,
    idle_deadline: Option<Instant>,
    idle_timeout: Duration,
}

impl StreamAssembler {
    /// Assembler finalizing raw streams after `idle_timeout` of silence
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            buffer: None,
            idle_deadline: None,
            idle_timeout,
        }
    }

    /// Open a structured stream, discarding any active one
    pub fn start(&mut self, message_id: MessageId) -> Option<StreamBuffer> {
        self.idle_deadline = None;
        self.buffer.replace(StreamBuffer {
            message_id,
            text: String::new(),
            origin: StreamOrigin::Structured,
        })
    }

    /// Append a fragment, opening a stream with `new_id()` if none is active
    ///
    /// Fragments joining a raw stream (re)arm the idle deadline.
    pub fn append<F>(&mut self, fragment: &str, origin: StreamOrigin, new_id: F) -> Appended
    where
        F: FnOnce() -> MessageId,
    {
        let started = self.buffer.is_none();
        let buffer = self.buffer.get_or_insert_with(|| StreamBuffer {
            message_id: new_id(),
            text: String::new(),
            origin,
        });
        buffer.text.push_str(fragment);

        if buffer.origin == StreamOrigin::Raw {
            self.idle_deadline = Some(Instant::now() + self.idle_timeout);
        }

        Appended {
            message_id: buffer.message_id,
            started,
            text: buffer.text.clone(),
        }
    }

    /// Close the active stream and hand back its contents
    pub fn finish(&mut self) -> Option<StreamBuffer> {
        self.idle_deadline = None;
        self.buffer.take()
    }

    /// Drop the active stream without committing it
    pub fn discard(&mut self) -> Option<MessageId> {
        self.finish().map(|buffer| buffer.message_id)
    }

    /// Active stream, if any
    pub fn current(&self) -> Option<&StreamBuffer> {
        self.buffer.as_ref()
    }

    /// When the active raw stream should be finalized
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> impl FnOnce() -> MessageId {
        move || MessageId(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_fragments_arm_deadline() {
        let mut assembler = StreamAssembler::new(Duration::from_millis(500));
        let first = assembler.append("Hola", StreamOrigin::Raw, id(1));
        assert!(first.started);

        tokio::time::advance(Duration::from_millis(300)).await;
        let second = assembler.append(" mundo", StreamOrigin::Raw, id(2));
        assert!(!second.started);
        assert_eq!(second.message_id, MessageId(1));
        assert_eq!(second.text, "Hola mundo");
        assert_eq!(
            assembler.idle_deadline(),
            Some(Instant::now() + Duration::from_millis(500))
        );
    }

    #[test]
    fn test_structured_stream_has_no_deadline() {
        let mut assembler = StreamAssembler::new(Duration::from_millis(500));
        assembler.start(MessageId(7));
        let appended = assembler.append("chunk", StreamOrigin::Structured, id(99));
        assert_eq!(appended.message_id, MessageId(7));
        assert!(assembler.idle_deadline().is_none());
    }

    #[test]
    fn test_raw_text_joining_structured_stream_keeps_no_deadline() {
        let mut assembler = StreamAssembler::new(Duration::from_millis(500));
        assembler.start(MessageId(1));
        assembler.append("Hola", StreamOrigin::Structured, id(9));
        assembler.append("noise", StreamOrigin::Raw, id(9));
        assert!(assembler.idle_deadline().is_none());
        assert_eq!(assembler.current().unwrap().origin, StreamOrigin::Structured);
    }

    #[test]
    fn test_start_replaces_active_stream() {
        let mut assembler = StreamAssembler::new(Duration::from_millis(500));
        assembler.start(MessageId(1));
        assembler.append("stale", StreamOrigin::Structured, id(0));
        let previous = assembler.start(MessageId(2)).unwrap();
        assert_eq!(previous.text, "stale");
        assert_eq!(assembler.current().unwrap().message_id, MessageId(2));
        assert_eq!(assembler.current().unwrap().text, "");
    }

    #[test]
    fn test_finish_clears_everything() {
        let mut assembler = StreamAssembler::new(Duration::from_millis(500));
        assembler.append("x", StreamOrigin::Raw, id(3));
        let buffer = assembler.finish().unwrap();
        assert_eq!(buffer.origin, StreamOrigin::Raw);
        assert!(assembler.current().is_none());
        assert!(assembler.idle_deadline().is_none());
        assert!(assembler.discard().is_none());
    }
}
