use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::catalog::CatalogEntry;
use super::domain::FollowUpTimeframe;
use super::error::AssessmentError;

/// Label reported when no band contains the score.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Urgency classification driving guidance and resource attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    Medium,
    High,
    Critical,
}

impl Tier {
    pub const fn ordered() -> [Self; 4] {
        [Self::Low, Self::Medium, Self::High, Self::Critical]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub const fn requires_resources(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    pub const fn follow_up_timeframe(self) -> Option<FollowUpTimeframe> {
        match self {
            Self::Critical => Some(FollowUpTimeframe::Immediately),
            Self::High => Some(FollowUpTimeframe::WithinWeek),
            Self::Low | Self::Medium => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed guidance payload for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guidance {
    pub title: &'static str,
    pub message: &'static str,
    pub recommendations: &'static [&'static str],
    pub color: &'static str,
}

impl Guidance {
    pub const fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Low => Self {
                title: "Minimal Symptoms",
                message: "Your responses suggest minimal symptoms. Continue maintaining your mental wellness!",
                recommendations: &[
                    "Continue with regular self-care practices",
                    "Maintain social connections",
                    "Keep up with physical exercise",
                    "Practice stress management techniques",
                ],
                color: "green",
            },
            Tier::Medium => Self {
                title: "Mild Symptoms",
                message: "Your responses suggest mild symptoms that may benefit from attention and care.",
                recommendations: &[
                    "Consider talking to a mental health professional",
                    "Practice mindfulness and relaxation techniques",
                    "Maintain regular sleep schedule",
                    "Engage in enjoyable activities",
                    "Consider joining support groups",
                ],
                color: "yellow",
            },
            Tier::High => Self {
                title: "Moderate Symptoms",
                message: "Your responses suggest moderate symptoms. Professional support is recommended.",
                recommendations: &[
                    "Schedule an appointment with a mental health professional",
                    "Consider therapy or counseling",
                    "Talk to your primary care doctor",
                    "Reach out to trusted friends or family",
                    "Use crisis resources if needed",
                ],
                color: "orange",
            },
            Tier::Critical => Self {
                title: "Severe Symptoms",
                message: "Your responses suggest severe symptoms. Immediate professional help is strongly recommended.",
                recommendations: &[
                    "Seek immediate professional help",
                    "Contact a mental health crisis line",
                    "Consider emergency services if in immediate danger",
                    "Inform a trusted person about your situation",
                    "Do not wait - help is available",
                ],
                color: "red",
            },
        }
    }
}

/// What to do with a severity label that maps to no tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedLabelPolicy {
    /// Fail with `InvalidDefinition`.
    Reject,
    /// Use the lowest tier and log a warning.
    FallbackToMinimal,
}

/// Label-to-tier mapping handed to the resolver at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidanceConfig {
    /// Keys are normalized labels.
    pub aliases: BTreeMap<String, Tier>,
    pub unmapped: UnmappedLabelPolicy,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        let aliases = [
            ("minimal", Tier::Low),
            ("mild", Tier::Medium),
            ("moderate", Tier::High),
            ("moderately_severe", Tier::High),
            ("severe", Tier::Critical),
        ]
        .into_iter()
        .map(|(label, tier)| (label.to_string(), tier))
        .collect();

        Self {
            aliases,
            unmapped: UnmappedLabelPolicy::Reject,
        }
    }
}

impl GuidanceConfig {
    pub fn with_alias(mut self, label: &str, tier: Tier) -> Self {
        self.aliases.insert(normalize_label(label), tier);
        self
    }
}

/// Classified outcome for a total score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityOutcome {
    pub label: String,
    pub tier: Tier,
    pub title: String,
    pub message: String,
    pub recommendations: Vec<String>,
    pub color: String,
}

/// Lower-case and replace spaces with underscores: `"Moderately Severe"` → `"moderately_severe"`.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

pub struct GuidanceResolver {
    config: GuidanceConfig,
}

impl GuidanceResolver {
    pub fn new(config: GuidanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn resolve(
        &self,
        entry: &CatalogEntry,
        total_score: i32,
    ) -> Result<SeverityOutcome, AssessmentError> {
        let label = entry
            .band_for(total_score)
            .map(|band| band.label.clone())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        let tier = self.tier_for(entry, &label, total_score)?;
        let guidance = Guidance::for_tier(tier);

        Ok(SeverityOutcome {
            label,
            tier,
            title: guidance.title.to_string(),
            message: guidance.message.to_string(),
            recommendations: guidance
                .recommendations
                .iter()
                .map(|item| item.to_string())
                .collect(),
            color: guidance.color.to_string(),
        })
    }

    fn tier_for(
        &self,
        entry: &CatalogEntry,
        label: &str,
        total_score: i32,
    ) -> Result<Tier, AssessmentError> {
        if let Some(tier) = self.config.aliases.get(&normalize_label(label)) {
            return Ok(*tier);
        }

        match self.config.unmapped {
            UnmappedLabelPolicy::Reject => Err(AssessmentError::InvalidDefinition(format!(
                "{}: severity label '{label}' for score {total_score} maps to no guidance tier",
                entry.code
            ))),
            UnmappedLabelPolicy::FallbackToMinimal => {
                warn!(
                    assessment = %entry.code,
                    label,
                    total_score,
                    "unmapped severity label; falling back to minimal guidance"
                );
                Ok(Tier::Low)
            }
        }
    }
}
