use std::fmt;

use thesis_types::Slug;
use thiserror::Error;

use crate::errors::{FlowStoreError, GuardError, StepError};
use crate::flow::FlowError;
use crate::performance::{Event, Step};

/// Error carried by a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Store(#[from] FlowStoreError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("{0}")]
    Other(String),
}

/// Caller-facing rendering of a run's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub event: Event,
    pub slug: Option<Slug>,
    pub error: Option<MessageError>,
}

impl Message {
    pub fn from_step(step: &Step) -> Self {
        Self {
            text: step.to_string(),
            event: step.event(),
            slug: Some(step.slug().clone()),
            error: step.error().cloned().map(MessageError::from),
        }
    }

    pub fn from_error(text: impl Into<String>, error: impl Into<MessageError>) -> Self {
        Self {
            text: text.into(),
            event: Event::NoEvent,
            slug: None,
            error: Some(error.into()),
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            event: Event::NoEvent,
            slug: None,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        match &self.error {
            Some(error) if self.event == Event::NoEvent => write!(f, ": {error}"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performer::PerformerType;

    #[test]
    fn step_messages_keep_slug_and_error() {
        let step = Step::new(
            Slug::new_thesis("s", "c", "t"),
            PerformerType::Http,
            Event::FiredCrash,
            Some(StepError::Crashed("connection refused".into())),
        )
        .expect("valid step");

        let message = Message::from_step(&step);
        assert_eq!(message.text, "s.c.t crash: crashed: connection refused");
        assert_eq!(message.slug, Some(Slug::new_thesis("s", "c", "t")));
        assert_eq!(message.error, Some(MessageError::Step(StepError::Crashed("connection refused".into()))));
        assert_eq!(message.to_string(), message.text);
    }

    #[test]
    fn error_messages_render_their_error() {
        let message = Message::from_error("releasing performance lock", GuardError::NotHeld { id: "p".into() });

        assert!(message.is_error());
        assert_eq!(message.to_string(), "releasing performance lock: performance `p` is not held");
    }
}
