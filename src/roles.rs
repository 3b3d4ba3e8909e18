//! Fixed role vocabulary.
//!
//! The vocabulary only drives the edit dialog: it is the pool of
//! "available" choices offered next to a record's assigned roles. A
//! record may carry roles outside this list; those are kept and
//! round-trip through load/save untouched.

use strum::IntoEnumIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString)]
pub enum Role {
    #[strum(serialize = "AM")]
    Am,
    #[strum(serialize = "Battery")]
    Battery,
    #[strum(serialize = "CSD_PR")]
    CsdPr,
    #[strum(serialize = "CSD_T")]
    CsdT,
    #[strum(serialize = "Charger")]
    Charger,
    #[strum(serialize = "Derailleur")]
    Derailleur,
    #[strum(serialize = "Engineering")]
    Engineering,
    #[strum(serialize = "FAE")]
    Fae,
    #[strum(serialize = "FW")]
    Fw,
    #[strum(serialize = "HW")]
    Hw,
    #[strum(serialize = "ME")]
    Me,
    #[strum(serialize = "Motor")]
    Motor,
    #[strum(serialize = "PM")]
    Pm,
    #[strum(serialize = "Production_Line")]
    ProductionLine,
    #[strum(serialize = "Q")]
    Q,
    #[strum(serialize = "SW")]
    Sw,
    #[strum(serialize = "Sales")]
    Sales,
}

/// Assigned/available split handed to an edit dialog.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoleChoices {
    pub assigned: Vec<String>,
    pub available: Vec<String>,
}

/// Every known role identifier, in vocabulary order.
pub fn vocabulary() -> Vec<String> {
    Role::iter().map(|role| role.to_string()).collect()
}

/// Vocabulary roles not currently assigned.
pub fn available_roles(assigned: &[String]) -> Vec<String> {
    vocabulary()
        .into_iter()
        .filter(|role| !assigned.contains(role))
        .collect()
}

pub fn partition(assigned: &[String]) -> RoleChoices {
    RoleChoices {
        assigned: assigned.to_vec(),
        available: available_roles(assigned),
    }
}

pub fn is_known(role: &str) -> bool {
    role.parse::<Role>().is_ok()
}
