use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::limits::*;

/// One time window of a stage's capacity. `capacity: None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRule {
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Weekdays this rule applies to, 0 = Monday.
    pub days: Vec<u8>,
    pub start_hour: u8,
    /// Exclusive.
    pub end_hour: u8,
}

impl CapacityRule {
    pub fn limited(capacity: u32, days: &[u8], start_hour: u8, end_hour: u8) -> Self {
        Self {
            capacity: Some(capacity),
            days: days.to_vec(),
            start_hour,
            end_hour,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            days: ALL_DAYS.to_vec(),
            start_hour: 0,
            end_hour: 24,
        }
    }

    pub fn matches(&self, weekday: u8, hour: u8) -> bool {
        self.days.contains(&weekday) && self.start_hour <= hour && hour < self.end_hour
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    /// Evaluated in order, first match wins.
    pub capacity: Vec<CapacityRule>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Static description of the stages, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub entry_stage: String,
    /// Entities whose patient type contains this tag are urgent.
    pub urgent_tag: String,
    /// A request's patient type must contain one of these.
    pub patient_types: Vec<String>,
    pub stages: Vec<StageConfig>,
}

pub const ALL_DAYS: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];
pub const WORKDAYS: [u8; 5] = [0, 1, 2, 3, 4];

impl DomainConfig {
    /// The hospital model the simulation was built around.
    pub fn healthcare() -> Self {
        let stage = |name: &str, capacity: Vec<CapacityRule>, deps: &[&str]| StageConfig {
            name: name.to_string(),
            capacity,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        };
        Self {
            entry_stage: "Admission".into(),
            urgent_tag: "EM".into(),
            patient_types: ["A1", "A2", "A3", "A4", "B1", "B2", "B3", "B4", "EM"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            stages: vec![
                stage("Admission", vec![CapacityRule::unbounded()], &[]),
                stage(
                    "Intake",
                    vec![
                        CapacityRule::limited(4, &WORKDAYS, 8, 17),
                        CapacityRule::limited(0, &ALL_DAYS, 0, 24),
                    ],
                    &["Admission"],
                ),
                stage(
                    "ER_Treatment",
                    vec![CapacityRule::limited(9, &ALL_DAYS, 0, 24)],
                    &["Admission"],
                ),
                stage(
                    "Surgery",
                    vec![
                        CapacityRule::limited(5, &WORKDAYS, 8, 17),
                        CapacityRule::limited(1, &ALL_DAYS, 0, 24),
                    ],
                    &["Admission", "Intake", "ER_Treatment"],
                ),
                stage(
                    "Nursing_A",
                    vec![CapacityRule::limited(30, &ALL_DAYS, 0, 24)],
                    &["Admission", "Intake", "ER_Treatment", "Surgery"],
                ),
                stage(
                    "Nursing_B",
                    vec![CapacityRule::limited(40, &ALL_DAYS, 0, 24)],
                    &["Admission", "Intake", "ER_Treatment", "Surgery"],
                ),
                stage("Releasing", vec![CapacityRule::unbounded()], &[]),
            ],
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::InvalidDomain(format!("{}: {e}", path.display())))?;
        let domain: DomainConfig =
            serde_json::from_str(&raw).map_err(|e| EngineError::InvalidDomain(e.to_string()))?;
        domain.validate()?;
        Ok(domain)
    }

    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn is_known_patient_type(&self, patient_type: &str) -> bool {
        self.patient_types.iter().any(|t| patient_type.contains(t.as_str()))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let mut names = HashSet::new();
        for stage in &self.stages {
            if stage.name.is_empty() || stage.name.len() > MAX_STAGE_NAME_LEN {
                return Err(EngineError::InvalidDomain(format!(
                    "bad stage name {:?}",
                    stage.name
                )));
            }
            if !names.insert(stage.name.as_str()) {
                return Err(EngineError::InvalidDomain(format!(
                    "duplicate stage {}",
                    stage.name
                )));
            }
            for rule in &stage.capacity {
                if rule.start_hour > rule.end_hour || rule.end_hour > 24 {
                    return Err(EngineError::InvalidDomain(format!(
                        "stage {}: hour range {}..{} out of bounds",
                        stage.name, rule.start_hour, rule.end_hour
                    )));
                }
                if let Some(day) = rule.days.iter().find(|d| **d > 6) {
                    return Err(EngineError::InvalidDomain(format!(
                        "stage {}: weekday {day} out of bounds",
                        stage.name
                    )));
                }
            }
        }
        if !names.contains(self.entry_stage.as_str()) {
            return Err(EngineError::InvalidDomain(format!(
                "entry stage {} is not defined",
                self.entry_stage
            )));
        }
        for stage in &self.stages {
            for dep in &stage.dependencies {
                if !names.contains(dep.as_str()) {
                    return Err(EngineError::InvalidDomain(format!(
                        "stage {} depends on unknown stage {dep}",
                        stage.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthcare_is_valid() {
        let domain = DomainConfig::healthcare();
        domain.validate().unwrap();
        assert_eq!(domain.stages.len(), 7);
        assert_eq!(domain.stage("Surgery").unwrap().dependencies.len(), 3);
        assert!(domain.stage("Releasing").unwrap().dependencies.is_empty());
    }

    #[test]
    fn patient_type_matching() {
        let domain = DomainConfig::healthcare();
        assert!(domain.is_known_patient_type("A3"));
        assert!(domain.is_known_patient_type("EM-B2"));
        assert!(!domain.is_known_patient_type("C1"));
    }

    #[test]
    fn rule_matching_half_open_hours() {
        let rule = CapacityRule::limited(4, &WORKDAYS, 8, 17);
        assert!(rule.matches(0, 8));
        assert!(rule.matches(4, 16));
        assert!(!rule.matches(4, 17));
        assert!(!rule.matches(5, 10));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let mut domain = DomainConfig::healthcare();
        domain.stages[1].dependencies.push("Pharmacy".into());
        let err = domain.validate().unwrap_err();
        assert!(err.to_string().contains("Pharmacy"));
    }

    #[test]
    fn missing_entry_stage_rejected() {
        let mut domain = DomainConfig::healthcare();
        domain.entry_stage = "Lobby".into();
        assert!(matches!(domain.validate(), Err(EngineError::InvalidDomain(_))));
    }

    #[test]
    fn bad_hour_range_rejected() {
        let mut domain = DomainConfig::healthcare();
        domain.stages[2].capacity[0].end_hour = 25;
        assert!(domain.validate().is_err());
    }

    #[test]
    fn json_roundtrip_with_unbounded_capacity() {
        let domain = DomainConfig::healthcare();
        let json = serde_json::to_string(&domain).unwrap();
        let parsed: DomainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, domain);
        assert_eq!(parsed.stage("Admission").unwrap().capacity[0].capacity, None);
    }

    #[test]
    fn load_from_file() {
        let dir = std::env::temp_dir().join("stagegate_test_domain");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("domain.json");
        std::fs::write(&path, serde_json::to_string(&DomainConfig::healthcare()).unwrap())
            .unwrap();
        let loaded = DomainConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.entry_stage, "Admission");

        let missing = DomainConfig::from_json_file(&dir.join("nope.json"));
        assert!(missing.is_err());
    }
}
