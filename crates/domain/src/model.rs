use serde::{Deserialize, Serialize};

/// Which model tier a turn is routed to.
///
/// `Fast` handles short conversational requests; `Full` handles anything that
/// may need tools or multi-step reasoning. The selector defaults to `Full` on
/// any classification error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTag {
    Fast,
    #[default]
    Full,
}

impl std::fmt::Display for ModelTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTag::Fast => write!(f, "fast"),
            ModelTag::Full => write!(f, "full"),
        }
    }
}
