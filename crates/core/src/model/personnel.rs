//! Team personnel (coaches, managers, support staff).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersonnelRole {
    HeadCoach,
    AssistantCoach,
    GoalkeeperCoach,
    TeamManager,
    Physio,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonnelMember {
    pub id: String,
    pub name: String,
    pub role: PersonnelRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPersonnelMember {
    pub name: String,
    pub role: PersonnelRole,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonnelPatch {
    pub name: Option<String>,
    pub role: Option<PersonnelRole>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub certifications: Option<Vec<String>>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serialization_matches_wire_contract() {
        assert_eq!(
            serde_json::to_string(&PersonnelRole::HeadCoach).unwrap(),
            "\"headCoach\""
        );
        assert_eq!(
            serde_json::to_string(&PersonnelRole::GoalkeeperCoach).unwrap(),
            "\"goalkeeperCoach\""
        );
    }
}
