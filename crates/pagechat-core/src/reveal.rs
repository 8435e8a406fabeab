//! Typing effect for answers that arrive whole.
//!
//! [`Reveal`] is the pure part: the growing prefixes of a string, one
//! character at a time. [`RevealTask`] drives a `Reveal` off a timer and owns
//! the task handle, so dropping it stops the timer.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Lazy sequence of growing prefixes: for an N-character string it yields N
/// items, the k-th being the first k characters.
#[derive(Debug, Clone)]
pub struct Reveal {
    text: String,
    byte_end: usize,
}

impl Reveal {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), byte_end: 0 }
    }

    /// First `k` characters of `text`, or all of it when `k` is past the end.
    pub fn prefix(text: &str, k: usize) -> &str {
        let end = text
            .char_indices()
            .nth(k)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        &text[..end]
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl Iterator for Reveal {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let next_char = self.text[self.byte_end..].chars().next()?;
        self.byte_end += next_char.len_utf8();
        Some(self.text[..self.byte_end].to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealFrame {
    /// `shown` characters are visible; the text is `Reveal::prefix(text, shown)`
    Progress { shown: usize },
    Complete,
}

/// Handle to a running reveal. Dropping it cancels the pending tick.
pub struct RevealTask {
    handle: JoinHandle<()>,
}

impl RevealTask {
    /// Emit one `Progress` frame per `delay`, then `Complete` exactly once.
    pub fn spawn<F>(text: impl Into<String>, delay: Duration, mut sink: F) -> Self
    where
        F: FnMut(RevealFrame) + Send + 'static,
    {
        let total = Reveal::new(text).char_len();

        let handle = tokio::spawn(async move {
            for shown in 1..=total {
                tokio::time::sleep(delay).await;
                sink(RevealFrame::Progress { shown });
            }
            sink(RevealFrame::Complete);
        });

        Self { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RevealTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    #[test]
    fn test_prefixes_grow_one_char_at_a_time() {
        let prefixes: Vec<String> = Reveal::new("Hi!").collect();
        assert_eq!(prefixes, vec!["H", "Hi", "Hi!"]);
    }

    #[test]
    fn test_prefixes_respect_multibyte_chars() {
        let text = "née 🦀";
        let prefixes: Vec<String> = Reveal::new(text).collect();
        assert_eq!(prefixes.len(), Reveal::new(text).char_len());
        assert_eq!(prefixes[1], "né");
        assert_eq!(prefixes.last().map(String::as_str), Some(text));
    }

    #[test]
    fn test_prefix_matches_first_k_chars_for_every_k() {
        let text = "Hi there";
        let n = text.chars().count();
        for k in 0..=n {
            let expected: String = text.chars().take(k).collect();
            assert_eq!(Reveal::prefix(text, k), expected);
        }
        assert_eq!(Reveal::prefix(text, n + 5), text);
    }

    #[test]
    fn test_each_reveal_restarts_from_empty() {
        let mut first = Reveal::new("ab");
        first.next();
        let second: Vec<String> = Reveal::new("ab").collect();
        assert_eq!(second, vec!["a", "ab"]);
        assert_eq!(first.next().as_deref(), Some("ab"));
        assert_eq!(first.next(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_completes_once_after_n_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();
        let delay = Duration::from_millis(10);

        let _task = RevealTask::spawn("Hi there", delay, move |frame| {
            let _ = tx.send((frame, Instant::now()));
        });

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }

        assert_eq!(frames.len(), 9);
        for (k, (frame, at)) in frames[..8].iter().enumerate() {
            assert_eq!(frame, &RevealFrame::Progress { shown: k + 1 });
            assert!(*at - start >= delay * (k as u32 + 1));
        }
        assert_eq!(frames[8].0, RevealFrame::Complete);
        assert!(frames[8].1 - start >= delay * 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_completes_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _task = RevealTask::spawn("", Duration::from_millis(10), move |frame| {
            let _ = tx.send(frame);
        });

        assert_eq!(rx.recv().await, Some(RevealFrame::Complete));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_tick() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = RevealTask::spawn("abcdef", Duration::from_millis(10), move |frame| {
            let _ = tx.send(frame);
        });

        assert_eq!(
            rx.recv().await,
            Some(RevealFrame::Progress { shown: 1 })
        );
        drop(task);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let mut rest = Vec::new();
        while let Some(frame) = rx.recv().await {
            rest.push(frame);
        }
        assert!(!rest.contains(&RevealFrame::Complete));
    }
}
