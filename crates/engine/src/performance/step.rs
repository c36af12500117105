use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thesis_types::{Slug, SlugKind};
use thiserror::Error;

use crate::errors::StepError;
use crate::performer::PerformerType;

/// Kind of transition a step reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    #[default]
    NoEvent,
    FiredPerform,
    FiredPass,
    FiredFail,
    FiredCrash,
    FiredCancel,
}

impl Event {
    pub const ALL: [Event; 6] = [
        Event::NoEvent,
        Event::FiredPerform,
        Event::FiredPass,
        Event::FiredFail,
        Event::FiredCrash,
        Event::FiredCancel,
    ];

    /// Whether this event ends the life of a slug within a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Event::FiredPass | Event::FiredFail | Event::FiredCrash | Event::FiredCancel
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Event::NoEvent => "none",
            Event::FiredPerform => "perform",
            Event::FiredPass => "pass",
            Event::FiredFail => "fail",
            Event::FiredCrash => "crash",
            Event::FiredCancel => "cancel",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("steps are emitted for scenarios and theses only, got `{slug}`")]
pub struct InvalidStepSlug {
    pub slug: Slug,
}

/// One progress record emitted while a performance runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    slug: Slug,
    performer_type: PerformerType,
    event: Event,
    error: Option<StepError>,
    occurred_at: DateTime<Utc>,
}

impl Step {
    /// Step for a thesis or a scenario. Any other slug kind is rejected.
    pub fn new(
        slug: Slug,
        performer_type: PerformerType,
        event: Event,
        error: Option<StepError>,
    ) -> Result<Self, InvalidStepSlug> {
        match slug.kind() {
            SlugKind::Thesis | SlugKind::Scenario => Ok(Self {
                slug,
                performer_type,
                event,
                error,
                occurred_at: Utc::now(),
            }),
            SlugKind::Story | SlugKind::NoSlug => Err(InvalidStepSlug { slug }),
        }
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    pub fn performer_type(&self) -> PerformerType {
        self.performer_type
    }

    pub fn event(&self) -> Event {
        self.event
    }

    pub fn error(&self) -> Option<&StepError> {
        self.error.as_ref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.slug, self.event)?;
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}
