use serde::{Deserialize, Serialize};
use uuid::Uuid;

use txoutbox::IntegrationEvent;

#[derive(Clone, Debug, PartialEq)]
pub enum EmployeeEvent {
    Hired { id: Uuid, name: String },
    Promoted { id: Uuid, role: String },
    Renamed { id: Uuid, name: String },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmployeeSnapshot {
    pub name: String,
    pub role: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, IntegrationEvent)]
#[integration_event(name = "hr.employee_hired")]
pub struct EmployeeHired {
    pub employee_id: Uuid,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, IntegrationEvent)]
#[integration_event(name = "hr.employee_promoted")]
pub struct EmployeePromoted {
    pub employee_id: Uuid,
    pub role: String,
}

/// Every integration event published by the hr module.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub enum HrEvent {
    Hired(EmployeeHired),
    Promoted(EmployeePromoted),
}

impl From<EmployeeHired> for HrEvent {
    fn from(value: EmployeeHired) -> Self {
        Self::Hired(value)
    }
}

impl From<EmployeePromoted> for HrEvent {
    fn from(value: EmployeePromoted) -> Self {
        Self::Promoted(value)
    }
}
