use serde::Deserialize;

/// Input/output moderation settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardrailsConfig {
    /// Moderation mode. Overridden by `GUARDRAIL_MODE`.
    pub mode: GuardrailMode,
}

/// Whether moderation runs, and what happens when the moderation call
/// itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailMode {
    /// No moderation calls are made.
    #[default]
    Off,
    /// Moderation runs; an unavailable moderation provider lets the
    /// request proceed with a warning.
    Open,
    /// Moderation runs; an unavailable moderation provider blocks the
    /// request.
    Closed,
}

impl GuardrailMode {
    /// Whether moderation calls are made at all.
    pub fn enabled(self) -> bool {
        !matches!(self, GuardrailMode::Off)
    }

    /// Parse the `GUARDRAIL_MODE` environment value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}
