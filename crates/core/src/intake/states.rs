use serde::{Deserialize, Serialize};

/// Ordered questions of the intake conversation. Linear, no branching
/// except the optional free-text tail after `ExtraInfoChoice`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntakeStep {
    Origin,
    Destination,
    PropertyType,
    Elevator,
    Packing,
    Name,
    Email,
    MoveDate,
    ExtraInfoChoice,
    ExtraInfoText,
}

impl IntakeStep {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Origin => Some(Self::Destination),
            Self::Destination => Some(Self::PropertyType),
            Self::PropertyType => Some(Self::Elevator),
            Self::Elevator => Some(Self::Packing),
            Self::Packing => Some(Self::Name),
            Self::Name => Some(Self::Email),
            Self::Email => Some(Self::MoveDate),
            Self::MoveDate => Some(Self::ExtraInfoChoice),
            Self::ExtraInfoChoice => Some(Self::ExtraInfoText),
            Self::ExtraInfoText => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Destination => "destination",
            Self::PropertyType => "property_type",
            Self::Elevator => "elevator",
            Self::Packing => "packing",
            Self::Name => "name",
            Self::Email => "email",
            Self::MoveDate => "move_date",
            Self::ExtraInfoChoice => "extra_info_choice",
            Self::ExtraInfoText => "extra_info_text",
        }
    }
}

/// One inbound answer: free text or a constrained option id from a
/// button/list reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnswerInput {
    Text(String),
    Option(String),
}

impl AnswerInput {
    pub fn raw(&self) -> &str {
        match self {
            Self::Text(text) | Self::Option(text) => text,
        }
    }
}

/// Result of applying one answer to a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Answer accepted, session advanced to the next question.
    Advanced { to: IntakeStep },
    /// Answer rejected; ask the same question again.
    Reprompt { hint: String },
    /// All answers collected; the session is ready to finalize.
    Completed,
}

#[cfg(test)]
mod tests {
    use super::IntakeStep;

    #[test]
    fn steps_form_a_single_linear_chain() {
        let mut step = IntakeStep::Origin;
        let mut visited = vec![step];
        while let Some(next) = step.next() {
            step = next;
            visited.push(step);
        }

        assert_eq!(visited.len(), 10);
        assert_eq!(visited.last(), Some(&IntakeStep::ExtraInfoText));
    }
}
