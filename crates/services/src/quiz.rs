use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use prep_core::model::CurriculumNode;
use prep_core::quiz::{QuizAttempt, QuizScore};

use crate::error::QuizError;
use crate::sync::SyncController;

/// Time limit of a running quiz.
///
/// Fires its receiver once when time is up. Cancelling (or dropping) the
/// countdown closes the receiver without firing.
#[derive(Debug)]
pub struct QuizCountdown {
    deadline: Instant,
    handle: Option<JoinHandle<()>>,
}

impl QuizCountdown {
    #[must_use]
    pub fn start(limit: Duration) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            let _ = tx.send(());
        });
        let countdown = Self {
            deadline: Instant::now() + limit,
            handle: Some(handle),
        };
        (countdown, rx)
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        if self.is_running() {
            self.deadline.saturating_duration_since(Instant::now())
        } else {
            Duration::ZERO
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the countdown. Returns whether it was still running.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }
}

impl Drop for QuizCountdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One attempt at a topic or lesson test, tied to the subject's progress.
///
/// Submitting, by hand or when the countdown expires, marks the assessment
/// complete regardless of score.
pub struct QuizSession {
    controller: SyncController,
    topic_index: usize,
    progress_name: String,
    attempt: QuizAttempt,
    countdown: Option<QuizCountdown>,
    expiry: Option<oneshot::Receiver<()>>,
    score: Option<QuizScore>,
}

impl QuizSession {
    /// Open the test attached to `owner`, a node of topic `topic_index`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoTest` if `owner` carries no test.
    pub fn start(
        controller: SyncController,
        topic_index: usize,
        owner: &CurriculumNode,
        time_limit: Option<Duration>,
    ) -> Result<Self, QuizError> {
        let test = owner
            .attached_test()
            .ok_or_else(|| QuizError::NoTest(owner.unit_name.clone()))?;
        let (countdown, expiry) = match time_limit {
            Some(limit) => {
                let (countdown, expiry) = QuizCountdown::start(limit);
                (Some(countdown), Some(expiry))
            }
            None => (None, None),
        };
        tracing::debug!(test = %test.test_name, owner = %owner.unit_name, ?time_limit, "quiz started");
        Ok(Self {
            controller,
            topic_index,
            progress_name: owner.assessment_key(),
            attempt: QuizAttempt::new(test.clone()),
            countdown,
            expiry,
            score: None,
        })
    }

    #[must_use]
    pub fn attempt(&self) -> &QuizAttempt {
        &self.attempt
    }

    /// Name the completion is recorded under.
    #[must_use]
    pub fn progress_name(&self) -> &str {
        &self.progress_name
    }

    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.countdown.as_ref().map(QuizCountdown::remaining)
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.score.is_some()
    }

    /// Select `option` for question `index`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AlreadySubmitted` after submission, or
    /// `QuizError::Attempt` for an unknown question or option.
    pub fn answer(&mut self, index: usize, option: u8) -> Result<(), QuizError> {
        if self.is_submitted() {
            return Err(QuizError::AlreadySubmitted);
        }
        self.attempt.answer(index, option)?;
        Ok(())
    }

    /// Grade the attempt and record the assessment as complete.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AlreadySubmitted` on a second call, or
    /// `QuizError::Sync` if the completion cannot be recorded.
    pub async fn submit(&mut self) -> Result<QuizScore, QuizError> {
        if let Some(score) = self.score {
            tracing::debug!(?score, "ignoring repeated submit");
            return Err(QuizError::AlreadySubmitted);
        }
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.cancel();
        }
        self.expiry = None;

        let score = self.attempt.score();
        self.score = Some(score);
        self.controller
            .mark_leaf_complete(self.topic_index, &self.progress_name)
            .await?;
        tracing::info!(
            test = %self.attempt.test().test_name,
            correct = score.correct,
            total = score.total,
            "quiz submitted"
        );
        Ok(score)
    }

    /// Wait for the countdown and auto-submit when it fires.
    ///
    /// Returns `Ok(None)` straight away for an untimed or already submitted
    /// quiz.
    ///
    /// # Errors
    ///
    /// Same as `submit`.
    pub async fn run_until_expired(&mut self) -> Result<Option<QuizScore>, QuizError> {
        let Some(expiry) = self.expiry.as_mut() else {
            return Ok(None);
        };
        if expiry.await.is_err() {
            return Ok(None);
        }
        tracing::info!(leaf = %self.progress_name, "time is up, auto-submitting");
        self.submit().await.map(Some)
    }

    /// Leave without submitting. Nothing is recorded.
    pub fn abandon(mut self) {
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.cancel();
        }
        tracing::debug!(leaf = %self.progress_name, "quiz abandoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn countdown_fires_once() {
        let (countdown, rx) = QuizCountdown::start(Duration::from_secs(60));
        assert!(countdown.is_running());
        assert_eq!(countdown.remaining(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(countdown.remaining(), Duration::from_secs(40));

        assert!(rx.await.is_ok());
        tokio::task::yield_now().await;
        assert!(!countdown.is_running());
        assert_eq!(countdown.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_fires() {
        let (mut countdown, rx) = QuizCountdown::start(Duration::from_secs(60));
        assert!(countdown.cancel());
        assert!(rx.await.is_err());
        assert!(!countdown.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_countdown_closes_receiver() {
        let (countdown, rx) = QuizCountdown::start(Duration::from_secs(5));
        drop(countdown);
        assert!(rx.await.is_err());
    }
}
