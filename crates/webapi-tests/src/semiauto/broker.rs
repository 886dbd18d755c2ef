//! Hand-off between blocking test code and the async WebSocket handlers.
//!
//! At most one prompt is outstanding at a time. It is published through a
//! `watch` channel, so an operator page that connects late still sees it.
//! Replies come back on a std channel the test thread blocks on. Closing
//! the broker releases a blocked [`PromptBroker::ask`] and fails every
//! later one.

use super::Prompt;
use crate::result::{WebApiError, WebApiResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// The prompt currently shown to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPrompt {
    /// Prompt id, echoed back in the reply
    pub id: u64,
    /// The prompt itself
    pub prompt: Prompt,
}

/// An operator's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptReply {
    /// Id of the prompt being answered
    pub id: u64,
    /// OK / yes
    pub accepted: bool,
}

#[derive(Debug)]
enum BrokerEvent {
    Reply(PromptReply),
    Closed,
}

/// Single-slot prompt exchange
#[derive(Debug)]
pub struct PromptBroker {
    current: watch::Sender<Option<PendingPrompt>>,
    events_tx: mpsc::Sender<BrokerEvent>,
    events_rx: Mutex<mpsc::Receiver<BrokerEvent>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Default for PromptBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBroker {
    /// Create an idle broker
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            current,
            events_tx,
            events_rx: Mutex::new(events_rx),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Follow the outstanding prompt
    pub fn subscribe(&self) -> watch::Receiver<Option<PendingPrompt>> {
        self.current.subscribe()
    }

    /// The outstanding prompt, if any
    pub fn pending(&self) -> Option<PendingPrompt> {
        self.current.borrow().clone()
    }

    /// Deliver an operator reply
    pub fn reply(&self, reply: PromptReply) {
        // the receiver lives as long as the broker
        let _ = self.events_tx.send(BrokerEvent::Reply(reply));
    }

    /// Stop accepting prompts; a blocked `ask` fails right away
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("prompt broker closed");
            let _ = self.events_tx.send(BrokerEvent::Closed);
        }
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Publish `prompt` and block until it is answered.
    ///
    /// Replies carrying another prompt's id are discarded. With a
    /// `deadline`, an unanswered prompt fails with
    /// [`WebApiError::Prompt`], as does asking a closed broker.
    pub fn ask(&self, prompt: &Prompt, deadline: Option<Duration>) -> WebApiResult<bool> {
        let events = self
            .events_rx
            .lock()
            .map_err(|_| WebApiError::prompt("prompt channel poisoned"))?;
        if self.is_closed() {
            return Err(stopped());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let until = deadline.map(|d| Instant::now() + d);

        self.current.send_replace(Some(PendingPrompt {
            id,
            prompt: prompt.clone(),
        }));
        debug!(id, "prompt published");

        let answer = loop {
            let received = match until {
                Some(until) => {
                    let remaining = until.saturating_duration_since(Instant::now());
                    events.recv_timeout(remaining).map_err(|e| match e {
                        mpsc::RecvTimeoutError::Timeout => WebApiError::prompt(format!(
                            "no answer to {:?} within {}ms",
                            prompt.message,
                            deadline.unwrap_or_default().as_millis()
                        )),
                        mpsc::RecvTimeoutError::Disconnected => stopped(),
                    })
                }
                None => events.recv().map_err(|_| stopped()),
            };

            match received {
                Ok(BrokerEvent::Reply(reply)) if reply.id == id => break Ok(reply.accepted),
                Ok(BrokerEvent::Reply(reply)) => {
                    debug!(expected = id, got = reply.id, "discarding stale reply");
                }
                Ok(BrokerEvent::Closed) => break Err(stopped()),
                Err(e) => break Err(e),
            }
        };

        self.current.send_replace(None);
        answer
    }
}

fn stopped() -> WebApiError {
    WebApiError::prompt("coordination server stopped")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn answer_when_published(broker: &Arc<PromptBroker>, replies: Vec<(i64, bool)>) {
        let broker = Arc::clone(broker);
        std::thread::spawn(move || {
            let mut rx = broker.subscribe();
            let pending = loop {
                if let Some(p) = rx.borrow_and_update().clone() {
                    break p;
                }
                std::thread::sleep(Duration::from_millis(2));
            };
            for (offset, accepted) in replies {
                let id = (pending.id as i64 + offset) as u64;
                broker.reply(PromptReply { id, accepted });
            }
        });
    }

    #[test]
    fn test_pending_prompt_visible_then_cleared() {
        let broker = Arc::new(PromptBroker::new());
        assert!(broker.pending().is_none());
        answer_when_published(&broker, vec![(0, false)]);
        let accepted = broker
            .ask(&Prompt::confirm("Did it beep?"), Some(Duration::from_secs(5)))
            .unwrap();
        assert!(!accepted);
        assert!(broker.pending().is_none());
    }

    #[test]
    fn test_stale_reply_ignored() {
        let broker = Arc::new(PromptBroker::new());
        answer_when_published(&broker, vec![(-1, false), (0, true)]);
        let accepted = broker
            .ask(&Prompt::instruct("Press OK"), Some(Duration::from_secs(5)))
            .unwrap();
        assert!(accepted);
    }

    #[test]
    fn test_deadline_expires() {
        let broker = PromptBroker::new();
        let err = broker
            .ask(&Prompt::instruct("nobody home"), Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, WebApiError::Prompt { .. }));
        assert!(err.to_string().contains("nobody home"));
        assert!(broker.pending().is_none());
    }

    #[test]
    fn test_close_releases_blocked_ask() {
        let broker = Arc::new(PromptBroker::new());
        let closer = Arc::clone(&broker);
        std::thread::spawn(move || {
            let mut rx = closer.subscribe();
            while rx.borrow_and_update().is_none() {
                std::thread::sleep(Duration::from_millis(2));
            }
            closer.close();
        });
        let err = broker.ask(&Prompt::instruct("Press OK"), None).unwrap_err();
        assert!(err.to_string().contains("coordination server stopped"));
        assert!(broker.pending().is_none());
    }

    #[test]
    fn test_ask_after_close_fails_without_publishing() {
        let broker = PromptBroker::new();
        broker.close();
        broker.close();
        assert!(broker.is_closed());
        let mut rx = broker.subscribe();
        assert!(broker.ask(&Prompt::confirm("Still there?"), None).is_err());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_ids_increase() {
        let broker = Arc::new(PromptBroker::new());
        let mut rx = broker.subscribe();
        answer_when_published(&broker, vec![(0, true)]);
        broker.ask(&Prompt::instruct("a"), Some(Duration::from_secs(5))).unwrap();
        answer_when_published(&broker, vec![(0, true)]);
        broker.ask(&Prompt::instruct("b"), Some(Duration::from_secs(5))).unwrap();
        rx.mark_changed();
        assert!(rx.borrow_and_update().is_none());
    }
}
