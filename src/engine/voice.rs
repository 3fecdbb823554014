//! Turn-by-turn phrase queue in front of a speech engine.
//!
//! At most `max_pending` phrases wait at a time and the same text is not
//! queued twice within `repeat_window`. A drain task is spawned when the first
//! phrase arrives and exits once the queue is empty.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::time::{Duration, Instant};
use tracing::debug;

pub trait SpeechEngine: Send + Sync + 'static {
    /// Resolves once the utterance has finished.
    fn speak(&self, phrase: String) -> impl Future<Output = ()> + Send;

    /// Stops the utterance in flight, if any.
    fn cancel(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct VoicePolicy {
    pub max_pending: usize,
    pub repeat_window: Duration,
}

impl Default for VoicePolicy {
    fn default() -> Self {
        Self {
            max_pending: 3,
            repeat_window: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Announcement {
    Queued,
    Duplicate,
    Dropped,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<String>,
    recent: HashMap<String, Instant>,
    draining: bool,
}

pub struct VoiceNavigator<S> {
    engine: Arc<S>,
    policy: VoicePolicy,
    inner: Arc<Mutex<Inner>>,
}

impl<S: SpeechEngine> VoiceNavigator<S> {
    pub fn new(engine: S, policy: VoicePolicy) -> Self {
        Self {
            engine: Arc::new(engine),
            policy,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called from within a tokio runtime.
    pub fn announce(&self, text: &str) -> Announcement {
        let phrase = text.trim();
        if phrase.is_empty() {
            return Announcement::Dropped;
        }

        let now = Instant::now();
        let window = self.policy.repeat_window;
        let mut inner = self.lock();

        inner
            .recent
            .retain(|_, announced_at| now.duration_since(*announced_at) < window);

        if inner.recent.contains_key(phrase) {
            return Announcement::Duplicate;
        }

        if inner.queue.len() >= self.policy.max_pending {
            debug!(phrase, "voice queue full; phrase dropped");
            return Announcement::Dropped;
        }

        inner.queue.push_back(phrase.to_string());
        inner.recent.insert(phrase.to_string(), now);

        if !inner.draining {
            inner.draining = true;
            tokio::spawn(drain(self.engine.clone(), self.inner.clone()));
        }

        Announcement::Queued
    }

    /// Drops every waiting phrase and cuts off the current one.
    pub fn clear(&self) {
        self.lock().queue.clear();
        self.engine.cancel();
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }
}

async fn drain<S: SpeechEngine>(engine: Arc<S>, inner: Arc<Mutex<Inner>>) {
    loop {
        let next = {
            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.queue.pop_front() {
                Some(phrase) => phrase,
                None => {
                    guard.draining = false;
                    break;
                }
            }
        };

        engine.speak(next).await;
    }
}
