use serde::{Deserialize, Serialize};

use super::domain::ResourceSummary;
use super::error::ResourceError;

/// Outbound lookup for emergency resources (crisis lines, helplines).
pub trait ResourceProvider: Send + Sync {
    /// Return at most `limit` active resources ordered by provider priority.
    fn emergency_resources(
        &self,
        limit: usize,
        crisis_only: bool,
    ) -> Result<Vec<ResourceSummary>, ResourceError>;
}

/// Directory record for an emergency resource as kept by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyResource {
    pub name: String,
    pub contact: String,
    pub description: String,
    pub availability: String,
    pub country: String,
    pub is_crisis_line: bool,
    pub is_active: bool,
    /// Lower numbers are listed first.
    pub priority: u32,
}

impl EmergencyResource {
    pub fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            name: self.name.clone(),
            contact: self.contact.clone(),
            availability: self.availability.clone(),
        }
    }
}

/// Active resources ordered by `(priority, name)`, optionally crisis lines only,
/// truncated to `limit`.
pub fn select_emergency_resources(
    records: &[EmergencyResource],
    limit: usize,
    crisis_only: bool,
) -> Vec<ResourceSummary> {
    let mut eligible: Vec<&EmergencyResource> = records
        .iter()
        .filter(|record| record.is_active)
        .filter(|record| !crisis_only || record.is_crisis_line)
        .collect();
    eligible.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    eligible
        .into_iter()
        .take(limit)
        .map(EmergencyResource::summary)
        .collect()
}
