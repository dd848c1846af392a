//! Read-only reference data the engine consumes: departments, the
//! tier/designation seniority hierarchy, technologies, interviewer profiles
//! and candidates.
//!
//! Records reference each other by id only. Interviewer → technology is an
//! assignment list of ids, never an embedded object, so lookups stay explicit.

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::CandidateStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    pub id: Ulid,
    pub name: String,
}

/// Lower `order` = more senior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub id: Ulid,
    pub name: String,
    pub order: u32,
}

/// `level_order` ranks designations within their tier; lower = more senior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Designation {
    pub id: Ulid,
    pub name: String,
    pub tier_id: Option<Ulid>,
    pub level_order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Technology {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TechnologyAssignment {
    pub technology_id: Ulid,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewerProfile {
    pub id: Ulid,
    pub full_name: String,
    pub email: String,
    pub department_id: Option<Ulid>,
    pub designation_id: Option<Ulid>,
    pub years_of_experience: Option<u32>,
    pub technologies: Vec<TechnologyAssignment>,
}

impl InterviewerProfile {
    pub fn active_technology_ids(&self) -> impl Iterator<Item = Ulid> + '_ {
        self.technologies
            .iter()
            .filter(|a| a.active)
            .map(|a| a.technology_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    /// Status as known to the owning system. The engine keeps its own
    /// ledger once it has touched a candidate.
    pub status: CandidateStatus,
}

/// Lookup-by-id over reference data owned elsewhere.
pub trait Directory: Send + Sync {
    fn interviewer(&self, id: &Ulid) -> Option<InterviewerProfile>;
    fn department(&self, id: &Ulid) -> Option<Department>;
    fn designation(&self, id: &Ulid) -> Option<Designation>;
    fn tier(&self, id: &Ulid) -> Option<Tier>;
    fn technology(&self, id: &Ulid) -> Option<Technology>;
    fn candidate(&self, id: &Ulid) -> Option<Candidate>;
}

/// `Directory` backed by in-process maps. Used by embedding hosts that
/// mirror their reference tables, and by tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    interviewers: DashMap<Ulid, InterviewerProfile>,
    departments: DashMap<Ulid, Department>,
    designations: DashMap<Ulid, Designation>,
    tiers: DashMap<Ulid, Tier>,
    technologies: DashMap<Ulid, Technology>,
    candidates: DashMap<Ulid, Candidate>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_interviewer(&self, profile: InterviewerProfile) {
        self.interviewers.insert(profile.id, profile);
    }

    pub fn insert_department(&self, department: Department) {
        self.departments.insert(department.id, department);
    }

    pub fn insert_designation(&self, designation: Designation) {
        self.designations.insert(designation.id, designation);
    }

    pub fn insert_tier(&self, tier: Tier) {
        self.tiers.insert(tier.id, tier);
    }

    pub fn insert_technology(&self, technology: Technology) {
        self.technologies.insert(technology.id, technology);
    }

    pub fn insert_candidate(&self, candidate: Candidate) {
        self.candidates.insert(candidate.id, candidate);
    }
}

impl Directory for InMemoryDirectory {
    fn interviewer(&self, id: &Ulid) -> Option<InterviewerProfile> {
        self.interviewers.get(id).map(|e| e.value().clone())
    }

    fn department(&self, id: &Ulid) -> Option<Department> {
        self.departments.get(id).map(|e| e.value().clone())
    }

    fn designation(&self, id: &Ulid) -> Option<Designation> {
        self.designations.get(id).map(|e| e.value().clone())
    }

    fn tier(&self, id: &Ulid) -> Option<Tier> {
        self.tiers.get(id).map(|e| e.value().clone())
    }

    fn technology(&self, id: &Ulid) -> Option<Technology> {
        self.technologies.get(id).map(|e| e.value().clone())
    }

    fn candidate(&self, id: &Ulid) -> Option<Candidate> {
        self.candidates.get(id).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_by_id() {
        let dir = InMemoryDirectory::new();
        let dept = Department {
            id: Ulid::new(),
            name: "Engineering".into(),
        };
        dir.insert_department(dept.clone());
        assert_eq!(dir.department(&dept.id), Some(dept));
        assert_eq!(dir.department(&Ulid::new()), None);
    }

    #[test]
    fn only_active_assignments_count() {
        let rust = Ulid::new();
        let java = Ulid::new();
        let profile = InterviewerProfile {
            id: Ulid::new(),
            full_name: "Ada Byron".into(),
            email: "ada@example.com".into(),
            department_id: None,
            designation_id: None,
            years_of_experience: Some(7),
            technologies: vec![
                TechnologyAssignment {
                    technology_id: rust,
                    active: true,
                },
                TechnologyAssignment {
                    technology_id: java,
                    active: false,
                },
            ],
        };
        let ids: Vec<Ulid> = profile.active_technology_ids().collect();
        assert_eq!(ids, vec![rust]);
    }
}
