//! Model aliases users can pick per chat.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Short names accepted in place of a full model id.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ModelAlias {
    Opus,
    Sonnet,
    Haiku,
}

impl ModelAlias {
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Opus => "claude-opus-4-6",
            Self::Sonnet => "claude-sonnet-4-5-20250929",
            Self::Haiku => "claude-haiku-4-5-20251001",
        }
    }

    /// Reverse lookup from a full model id.
    pub fn from_model_id(model_id: &str) -> Option<Self> {
        Self::iter().find(|alias| alias.model_id() == model_id)
    }
}

/// Resolve an alias (`opus`, `Sonnet`, ...) to its model id; anything else is
/// treated as a literal model id.
pub fn resolve_model(input: &str) -> String {
    let trimmed = input.trim();
    match trimmed.parse::<ModelAlias>() {
        Ok(alias) => alias.model_id().to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Human-readable listing of the aliases, e.g. for a `/model` reply.
pub fn describe_aliases(current: &str) -> String {
    ModelAlias::iter()
        .map(|alias| {
            let marker = if alias.model_id() == current { " (current)" } else { "" };
            format!("{alias}: {}{marker}", alias.model_id())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_case_insensitively() {
        assert_eq!(resolve_model("OPUS"), "claude-opus-4-6");
        assert_eq!(resolve_model(" haiku "), "claude-haiku-4-5-20251001");
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(resolve_model("claude-custom-1"), "claude-custom-1");
    }

    #[test]
    fn describe_marks_current_model() {
        let listing = describe_aliases(ModelAlias::Sonnet.model_id());
        assert!(listing.contains("sonnet: claude-sonnet-4-5-20250929 (current)"));
        assert!(listing.contains("opus: claude-opus-4-6\n"));
        assert_eq!(ModelAlias::from_model_id("claude-opus-4-6"), Some(ModelAlias::Opus));
    }
}
