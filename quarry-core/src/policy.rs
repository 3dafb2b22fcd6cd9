//! Tier/mode policy resolver.
//!
//! Maps a (subscription tier, research mode) pair to the concrete limits that
//! parameterize every pipeline stage. The mode table drives numeric limits;
//! the tier independently gates feature flags. Pure and lock-free.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::PolicyError;
use crate::types::{CitationStyle, ExportFormat, Mode, Tier};

/// Static description of a research mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub mode: Mode,
    pub name: &'static str,
    pub max_sources: usize,
    pub max_words: usize,
    pub search_rounds: usize,
    pub fact_checking_level: &'static str,
    pub citation_detail: &'static str,
    pub estimated_time: &'static str,
    pub description: &'static str,
    pub premium_only: bool,
}

const QUICK: ModeProfile = ModeProfile {
    mode: Mode::Quick,
    name: "Quick Summary",
    max_sources: 2,
    max_words: 500,
    search_rounds: 1,
    fact_checking_level: "basic",
    citation_detail: "minimal",
    estimated_time: "30-60 seconds",
    description: "Fast overview with 1-2 sources.",
    premium_only: false,
};

const STANDARD: ModeProfile = ModeProfile {
    mode: Mode::Standard,
    name: "Standard Research",
    max_sources: 5,
    max_words: 2000,
    search_rounds: 1,
    fact_checking_level: "standard",
    citation_detail: "standard",
    estimated_time: "2-3 minutes",
    description: "Balanced research with 3-5 sources and a concise multi-section answer.",
    premium_only: false,
};

const DEEP: ModeProfile = ModeProfile {
    mode: Mode::Deep,
    name: "Deep Research",
    max_sources: 15,
    max_words: 5000,
    search_rounds: 3,
    fact_checking_level: "advanced",
    citation_detail: "comprehensive",
    estimated_time: "5-10 minutes",
    description: "Comprehensive research with 10-15 sources and multi-round validation.",
    premium_only: true,
};

impl ModeProfile {
    pub fn for_mode(mode: Mode) -> &'static ModeProfile {
        match mode {
            Mode::Quick => &QUICK,
            Mode::Standard => &STANDARD,
            Mode::Deep => &DEEP,
        }
    }
}

/// Resolved limits for one research session. Immutable once derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub tier: Tier,
    pub mode: Mode,
    pub max_sources: usize,
    pub word_limit: usize,
    pub max_search_rounds: usize,
    pub advanced_fact_checking: bool,
    pub multi_round_search: bool,
    pub citation_styles: BTreeSet<CitationStyle>,
    pub export_formats: BTreeSet<ExportFormat>,
    /// Whether the requested mode itself is gated to premium.
    pub premium_only: bool,
    /// Tasks allowed per day; `None` means unlimited.
    pub daily_tasks: Option<u32>,
}

impl TierLimits {
    /// Number of search rounds the controller will actually run.
    pub fn effective_rounds(&self) -> usize {
        if self.multi_round_search {
            self.max_search_rounds.max(1)
        } else {
            1
        }
    }

    pub fn allows_citation(&self, style: CitationStyle) -> bool {
        self.citation_styles.contains(&style)
    }
}

/// Daily task allowance for a tier; `None` is unlimited.
pub fn daily_task_limit(tier: Tier) -> Option<u32> {
    match tier {
        Tier::Free => Some(5),
        Tier::Premium => None,
    }
}

/// Resolve the limits for a tier and mode.
///
/// Fails with [`PolicyError::ModeNotPermitted`] when a premium-only mode is
/// requested on the free tier. Never downgrades the mode.
pub fn resolve(tier: Tier, mode: Mode) -> Result<TierLimits, PolicyError> {
    let profile = ModeProfile::for_mode(mode);
    if profile.premium_only && !tier.is_premium() {
        return Err(PolicyError::ModeNotPermitted { tier, mode });
    }

    let (advanced_fact_checking, multi_round_search, citation_styles, export_formats) = match tier
    {
        Tier::Free => (
            false,
            false,
            BTreeSet::from([CitationStyle::Basic]),
            BTreeSet::from([ExportFormat::Pdf, ExportFormat::Markdown]),
        ),
        Tier::Premium => (
            true,
            true,
            BTreeSet::from([
                CitationStyle::Basic,
                CitationStyle::Apa,
                CitationStyle::Mla,
                CitationStyle::Ieee,
            ]),
            BTreeSet::from([ExportFormat::Pdf, ExportFormat::Docx, ExportFormat::Markdown]),
        ),
    };

    Ok(TierLimits {
        tier,
        mode,
        max_sources: profile.max_sources,
        word_limit: profile.max_words,
        max_search_rounds: profile.search_rounds,
        advanced_fact_checking,
        multi_round_search,
        citation_styles,
        export_formats,
        premium_only: profile.premium_only,
        daily_tasks: daily_task_limit(tier),
    })
}

/// A mode as presented to a user of a given tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeAvailability {
    pub profile: &'static ModeProfile,
    pub unlocked: bool,
}

/// All modes with their availability for `tier`, in catalogue order.
pub fn available_modes(tier: Tier) -> Vec<ModeAvailability> {
    Mode::ALL
        .iter()
        .map(|&mode| ModeAvailability {
            profile: ModeProfile::for_mode(mode),
            unlocked: resolve(tier, mode).is_ok(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_free_deep_is_not_permitted() {
        let err = resolve(Tier::Free, Mode::Deep).unwrap_err();
        assert_eq!(
            err,
            PolicyError::ModeNotPermitted {
                tier: Tier::Free,
                mode: Mode::Deep
            }
        );
    }

    #[test]
    fn test_premium_deep_resolves() {
        let limits = resolve(Tier::Premium, Mode::Deep).unwrap();
        assert_eq!(limits.max_sources, 15);
        assert_eq!(limits.word_limit, 5000);
        assert_eq!(limits.max_search_rounds, 3);
        assert!(limits.premium_only);
        assert!(limits.advanced_fact_checking);
        assert!(limits.multi_round_search);
        assert_eq!(limits.effective_rounds(), 3);
        assert_eq!(limits.daily_tasks, None);
    }

    #[test]
    fn test_free_standard_limits() {
        let limits = resolve(Tier::Free, Mode::Standard).unwrap();
        assert_eq!(limits.max_sources, 5);
        assert_eq!(limits.word_limit, 2000);
        assert_eq!(limits.max_search_rounds, 1);
        assert!(!limits.advanced_fact_checking);
        assert!(!limits.multi_round_search);
        assert!(!limits.premium_only);
        assert_eq!(
            limits.export_formats,
            BTreeSet::from([ExportFormat::Pdf, ExportFormat::Markdown])
        );
        assert_eq!(limits.citation_styles, BTreeSet::from([CitationStyle::Basic]));
        assert_eq!(limits.daily_tasks, Some(5));
    }

    #[test]
    fn test_numeric_limits_follow_mode_not_tier() {
        let free = resolve(Tier::Free, Mode::Quick).unwrap();
        let premium = resolve(Tier::Premium, Mode::Quick).unwrap();
        assert_eq!(free.max_sources, premium.max_sources);
        assert_eq!(free.word_limit, premium.word_limit);
        assert_eq!(free.max_search_rounds, premium.max_search_rounds);
        assert_ne!(free.advanced_fact_checking, premium.advanced_fact_checking);
    }

    #[test]
    fn test_effective_rounds_without_multi_round() {
        let mut limits = resolve(Tier::Premium, Mode::Deep).unwrap();
        limits.multi_round_search = false;
        assert_eq!(limits.effective_rounds(), 1);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for tier in [Tier::Free, Tier::Premium] {
            for mode in Mode::ALL {
                assert_eq!(resolve(tier, mode), resolve(tier, mode));
            }
        }
    }

    #[test]
    fn test_available_modes() {
        let free = available_modes(Tier::Free);
        assert_eq!(free.len(), 3);
        assert!(free[0].unlocked);
        assert!(free[1].unlocked);
        assert!(!free[2].unlocked);
        assert!(available_modes(Tier::Premium).iter().all(|m| m.unlocked));
    }
}
