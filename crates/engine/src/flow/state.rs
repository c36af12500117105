use std::fmt;

use serde::{Deserialize, Serialize};

use crate::performance::Event;

/// Progress of one scenario or thesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Sentinel for a transition the table does not define.
    #[default]
    NoState,
    NotPerformed,
    Performing,
    Passed,
    Failed,
    Crashed,
    Canceled,
}

impl State {
    pub const ALL: [State; 7] = [
        State::NoState,
        State::NotPerformed,
        State::Performing,
        State::Passed,
        State::Failed,
        State::Crashed,
        State::Canceled,
    ];

    /// Applies `event` to this state.
    ///
    /// States only escalate: crashed absorbs everything, failed yields only
    /// to crashed, and cancellation never overwrites a pass. Pairs outside
    /// the table, including anything involving [`State::NoState`] or
    /// [`Event::NoEvent`], yield [`State::NoState`].
    pub fn next(self, event: Event) -> State {
        use Event::*;
        use State::*;

        match (self, event) {
            (NotPerformed | Performing, FiredPerform) => Performing,
            (NotPerformed | Performing, FiredPass) => Passed,
            (NotPerformed | Performing, FiredFail) => Failed,
            (NotPerformed | Performing, FiredCrash) => Crashed,
            (NotPerformed | Performing, FiredCancel) => Canceled,

            (Passed, FiredPerform | FiredPass | FiredCancel) => Passed,
            (Passed, FiredFail) => Failed,
            (Passed, FiredCrash) => Crashed,

            (Failed, FiredPerform | FiredPass | FiredFail | FiredCancel) => Failed,
            (Failed, FiredCrash) => Crashed,

            (Crashed, FiredPerform | FiredPass | FiredFail | FiredCrash | FiredCancel) => Crashed,

            (Canceled, FiredPerform | FiredPass | FiredCancel) => Canceled,
            (Canceled, FiredFail) => Failed,
            (Canceled, FiredCrash) => Crashed,

            (NoState, _) | (_, NoEvent) => NoState,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::NoState => "no_state",
            State::NotPerformed => "not_performed",
            State::Performing => "performing",
            State::Passed => "passed",
            State::Failed => "failed",
            State::Crashed => "crashed",
            State::Canceled => "canceled",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
