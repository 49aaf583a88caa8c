//! External responder channels for clarification questions.
//!
//! The coordinator never talks to a human or a vision-language model
//! directly. It hands a [`ClarificationQuestion`] to a [`ResponderChannel`]
//! and awaits free text back.
//!
//! - [`ScriptedResponder`] – replays a fixed queue of answers (tests,
//!   offline evaluation).
//! - [`ChannelResponder`] – forwards questions over a tokio `mpsc` channel
//!   to whatever task serves them (a console prompt, a model oracle) and
//!   awaits the answer on a `oneshot`.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// A question put to the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub episode_id: String,
    /// Human-readable question text.
    pub text: String,
    /// Machine-parseable answers the coordinator understands
    /// (candidate numbers, direction words, landmark names).
    pub answer_tokens: Vec<String>,
    /// 1-based turn number within the episode.
    pub turn: u32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponderError {
    #[error("Responder channel closed")]
    Closed,

    #[error("Responder failed: {0}")]
    Failed(String),
}

/// Anything that can answer a clarification question.
#[async_trait]
pub trait ResponderChannel: Send + Sync {
    /// Deliver `question` and wait for the reply text.
    ///
    /// The coordinator bounds this call with its own deadline; implementors
    /// need not time out themselves.
    async fn ask_and_wait(&self, question: &ClarificationQuestion) -> Result<String, ResponderError>;
}

// ────────────────────────────────────────────────────────────────────────────
// ScriptedResponder
// ────────────────────────────────────────────────────────────────────────────

/// Replays queued answers in order; fails with [`ResponderError::Closed`]
/// once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<ClarificationQuestion>>,
}

impl ScriptedResponder {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Every question received so far.
    pub fn questions(&self) -> Vec<ClarificationQuestion> {
        self.asked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ResponderChannel for ScriptedResponder {
    async fn ask_and_wait(&self, question: &ClarificationQuestion) -> Result<String, ResponderError> {
        self.asked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(question.clone());
        let answer = self
            .answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        debug!(turn = question.turn, answer = ?answer, "scripted answer");
        answer.ok_or(ResponderError::Closed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ChannelResponder
// ────────────────────────────────────────────────────────────────────────────

/// A question in flight, as seen by the serving task.
#[derive(Debug)]
pub struct PendingQuestion {
    pub question: ClarificationQuestion,
    reply: oneshot::Sender<String>,
}

impl PendingQuestion {
    /// Send the answer back. Returns `false` if the asker has gone away
    /// (e.g. the episode timed out).
    pub fn answer(self, text: impl Into<String>) -> bool {
        self.reply.send(text.into()).is_ok()
    }
}

/// Forwards questions to a serving task over `mpsc`.
#[derive(Debug, Clone)]
pub struct ChannelResponder {
    tx: mpsc::Sender<PendingQuestion>,
}

impl ChannelResponder {
    /// Create a responder and the receiver the serving task reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PendingQuestion>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ResponderChannel for ChannelResponder {
    async fn ask_and_wait(&self, question: &ClarificationQuestion) -> Result<String, ResponderError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(PendingQuestion {
                question: question.clone(),
                reply,
            })
            .await
            .map_err(|_| ResponderError::Closed)?;
        answer.await.map_err(|_| ResponderError::Closed)
    }
}
