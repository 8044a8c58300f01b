//! Lifecycle of a training day.
//!
//! The state is derived on every request from stored facts (the mesocycle's
//! state, what the calendar resolves for the requested date, and the day's
//! completion flags). The flags the views need (`completed`, `read_only`,
//! `is_future_session`) are projections of [`SessionState`], never stored
//! independently.

use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, Result};

/// Where a single training day is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingDayState {
    /// Sets exist, none completed.
    Planned,
    /// Some sets completed, not all.
    InProgress,
    /// Every set completed; the session can be finished.
    ReadyToFinish,
    /// Finished by the user.
    Completed,
    /// Finished, then reopened for edits.
    CompletedEditable,
}

/// Completion counts over every set of every exercise of a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SetProgress {
    pub total: usize,
    pub completed: usize,
}

impl SetProgress {
    pub fn new(total: usize, completed: usize) -> Self {
        assert!(completed <= total, "completed sets ({completed}) exceed total ({total})");
        Self { total, completed }
    }

    /// Guard for finishing: every set is completed. Vacuously true for a day
    /// without sets.
    pub fn all_completed(&self) -> bool {
        self.completed == self.total
    }
}

impl TrainingDayState {
    pub fn derive(progress: SetProgress, completed: bool, reopened: bool) -> Self {
        match (completed, reopened) {
            (true, true) => Self::CompletedEditable,
            (true, false) => Self::Completed,
            (false, _) if progress.all_completed() => Self::ReadyToFinish,
            (false, _) if progress.completed == 0 => Self::Planned,
            (false, _) => Self::InProgress,
        }
    }
}

/// State of "the day" a request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No active mesocycle, or the requested date is outside the plan.
    NotStarted,
    RestDay { is_future_session: bool },
    TrainingDay {
        day: TrainingDayState,
        is_future_session: bool,
    },
    /// The mesocycle was stopped or ran out; everything is read-only.
    MesocycleCompleted,
}

/// Writes a request may perform against a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    AddSet,
    RemoveSet,
    /// Rep range, RIR or weight.
    UpdateTargets,
    /// Completion flag and reps performed.
    LogSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Finish (or re-finish) the session with the day's current progress.
    Finish(SetProgress),
    Reopen,
    /// Stop action, or the plan ran past its last day.
    MesocycleEnded,
}

/// What a successful finish did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishKind {
    Finished,
    Updated,
}

impl SessionState {
    pub fn training_day(&self) -> Option<TrainingDayState> {
        match self {
            Self::TrainingDay { day, .. } => Some(*day),
            _ => None,
        }
    }

    pub fn is_future_session(&self) -> bool {
        matches!(
            self,
            Self::RestDay { is_future_session: true } | Self::TrainingDay { is_future_session: true, .. }
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self.training_day(),
            Some(TrainingDayState::Completed | TrainingDayState::CompletedEditable)
        )
    }

    /// Nothing about the day may change.
    pub fn is_read_only(&self) -> bool {
        match self {
            Self::NotStarted | Self::RestDay { .. } | Self::MesocycleCompleted => true,
            Self::TrainingDay { day, .. } => *day == TrainingDayState::Completed,
        }
    }

    pub fn can_finish(&self, progress: SetProgress) -> bool {
        self.finish(progress).is_ok()
    }

    /// Rejects `mutation` unless the state allows it.
    pub fn permits(&self, mutation: Mutation) -> Result<()> {
        let refusal = match self {
            Self::NotStarted => Some("There is no active training day for that date."),
            Self::MesocycleCompleted => Some("The mesocycle is completed and can no longer be edited."),
            Self::RestDay { .. } => Some("Rest days have nothing to log."),
            Self::TrainingDay { day, is_future_session } => match (day, mutation) {
                (TrainingDayState::Completed, _) => {
                    Some("The training session is finished; reopen it to make changes.")
                }
                (_, Mutation::LogSet) if *is_future_session => {
                    Some("Sets of a future session cannot be completed yet.")
                }
                _ => None,
            },
        };

        match refusal {
            None => Ok(()),
            Some(msg) => {
                warn!(state = ?self, ?mutation, "mutation rejected");
                Err(AppError::invalid_state(msg))
            }
        }
    }

    /// Applies `event`. Every (state, event) pair is handled: illegal ones
    /// return an invalid-state error and leave the caller's state untouched.
    pub fn on(self, event: SessionEvent) -> Result<Self> {
        match event {
            SessionEvent::MesocycleEnded => Ok(Self::MesocycleCompleted),
            SessionEvent::Finish(progress) => self.finish(progress).map(|(next, _)| next),
            SessionEvent::Reopen => self.reopen(),
        }
    }

    /// Finishing from `ReadyToFinish` stamps the day; from
    /// `CompletedEditable` it is an update. Either way every set must be
    /// completed.
    pub fn finish(&self, progress: SetProgress) -> Result<(Self, FinishKind)> {
        let kind = match self {
            Self::TrainingDay { is_future_session: true, .. } => {
                return Err(AppError::invalid_state("A future session cannot be finished."));
            }
            Self::TrainingDay { day: TrainingDayState::ReadyToFinish, .. } => FinishKind::Finished,
            Self::TrainingDay { day: TrainingDayState::CompletedEditable, .. } if !progress.all_completed() => {
                return Err(AppError::invalid_state(
                    "Every set must be completed before the session can be updated.",
                ));
            }
            Self::TrainingDay { day: TrainingDayState::CompletedEditable, .. } => FinishKind::Updated,
            Self::TrainingDay { day: TrainingDayState::Planned | TrainingDayState::InProgress, .. } => {
                return Err(AppError::invalid_state(
                    "Every set must be completed before the session can be finished.",
                ));
            }
            Self::TrainingDay { day: TrainingDayState::Completed, .. } => {
                return Err(AppError::invalid_state("The training session is already finished."));
            }
            _ => return Err(self.permits(Mutation::LogSet).err().unwrap_or_else(no_training_day)),
        };

        Ok((
            Self::TrainingDay {
                day: TrainingDayState::Completed,
                is_future_session: false,
            },
            kind,
        ))
    }

    pub fn reopen(&self) -> Result<Self> {
        match self {
            Self::TrainingDay { day: TrainingDayState::Completed, is_future_session } => Ok(Self::TrainingDay {
                day: TrainingDayState::CompletedEditable,
                is_future_session: *is_future_session,
            }),
            Self::TrainingDay { .. } => Err(AppError::invalid_state(
                "Only a finished training session can be reopened.",
            )),
            _ => Err(self.permits(Mutation::UpdateTargets).err().unwrap_or_else(no_training_day)),
        }
    }
}

fn no_training_day() -> AppError {
    AppError::invalid_state("There is no training day to act on.")
}
