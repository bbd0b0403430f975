use std::fmt;

use serde::{Deserialize, Serialize};

/// Value the brand vibe field starts with.
pub const DEFAULT_BRAND_VIBE: &str = "Minimalist Wine Bar";

/// Keywords appended to the vibe before it is sent to image search.
pub const SEARCH_KEYWORDS: &str = "branding packaging";

/// Free-text description of the brand aesthetic driving both search and generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrandQuery(String);

impl BrandQuery {
    /// Returns `None` when the text is empty after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn search_text(&self) -> String {
        format!("{} {}", self.0, SEARCH_KEYWORDS)
    }
}

impl Default for BrandQuery {
    fn default() -> Self {
        Self(DEFAULT_BRAND_VIBE.to_string())
    }
}

impl fmt::Display for BrandQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Linear lifecycle of one auto-design run.
///
/// `Idle -> Scouting -> Generating -> Branding -> Done`, with `Failed`
/// absorbing runs that end without a final image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    Scouting,
    Generating,
    Branding,
    Done,
    Failed,
}

impl PipelinePhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Scouting => "Scouting…",
            Self::Generating => "Generating 4K Mockup…",
            Self::Branding => "Branding…",
            Self::Done => "Done!",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: PipelinePhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Scouting)
                | (Self::Scouting, Self::Generating)
                | (Self::Generating, Self::Branding)
                | (Self::Generating, Self::Failed)
                | (Self::Branding, Self::Done)
                | (Self::Branding, Self::Failed)
        )
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::{BrandQuery, PipelinePhase, DEFAULT_BRAND_VIBE};

    #[test]
    fn brand_query_rejects_blank_text() {
        assert!(BrandQuery::parse("").is_none());
        assert!(BrandQuery::parse("   \t").is_none());
    }

    #[test]
    fn brand_query_trims_and_builds_search_text() {
        let query = BrandQuery::parse("  Minimalist Wine Bar ").unwrap();
        assert_eq!(query.as_str(), "Minimalist Wine Bar");
        assert_eq!(query.search_text(), "Minimalist Wine Bar branding packaging");
    }

    #[test]
    fn brand_query_default_matches_form_default() {
        assert_eq!(BrandQuery::default().as_str(), DEFAULT_BRAND_VIBE);
    }

    #[test]
    fn phase_labels_follow_progress_log() {
        assert_eq!(PipelinePhase::Scouting.label(), "Scouting…");
        assert_eq!(PipelinePhase::Generating.label(), "Generating 4K Mockup…");
        assert_eq!(PipelinePhase::Branding.label(), "Branding…");
        assert_eq!(PipelinePhase::Done.label(), "Done!");
    }

    #[test]
    fn phase_transitions_are_linear() {
        use PipelinePhase::*;
        assert!(Idle.can_advance_to(Scouting));
        assert!(Scouting.can_advance_to(Generating));
        assert!(Generating.can_advance_to(Failed));
        assert!(!Scouting.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Branding));
        assert!(!Done.can_advance_to(Scouting));
        assert!(Failed.is_terminal());
        assert!(!Branding.is_terminal());
    }
}
