use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateAssignmentRequest {
    pub(crate) title: String,
    pub(crate) description: String,
    #[serde(default = "default_true")]
    pub(crate) is_active: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) assignment_public_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) is_active: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListAssignmentsQuery {
    #[serde(default = "default_true")]
    pub(crate) active_only: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListAssignmentsResponse {
    pub(crate) items: Vec<AssignmentResponse>,
}
