//! Operator confirmation policies

use inquire::Text;

use crate::error::TriageError;
use crate::health::triage::Confirm;

/// Returns true for the accepted affirmative answers, `y` and `yes`
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// How destructive actions are confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPolicy {
    /// Ask on the terminal; anything but y/yes declines
    Prompt,
    /// Proceed without asking
    AlwaysAllow,
    /// Decline without asking
    AlwaysDeny,
}

impl Confirm for ConfirmPolicy {
    fn confirm(&self, question: &str) -> Result<bool, TriageError> {
        match self {
            ConfirmPolicy::AlwaysAllow => Ok(true),
            ConfirmPolicy::AlwaysDeny => Ok(false),
            ConfirmPolicy::Prompt => {
                let answer = Text::new(question)
                    .with_placeholder("y/N")
                    .prompt()
                    .map_err(|e| TriageError::Prompt(e.to_string()))?;
                Ok(is_affirmative(&answer))
            }
        }
    }
}
