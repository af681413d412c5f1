/// Maps resolution outcomes onto what the page and the status endpoint show
use crate::identity::{IdentityRecord, ResolutionOutcome};
use serde::Serialize;

/// Data handed to the page template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayProjection {
    pub record: Option<IdentityRecord>,
    pub initial: Option<String>,
}

/// Body of `GET /api/user`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Project an outcome for the page. Failure reasons are not shown.
pub fn compose(outcome: &ResolutionOutcome) -> DisplayProjection {
    match outcome.record() {
        Some(record) => DisplayProjection {
            initial: Some(record.initial()),
            record: Some(record.clone()),
        },
        None => DisplayProjection {
            record: None,
            initial: None,
        },
    }
}

/// Project an outcome for the JSON status endpoint
pub fn status(outcome: &ResolutionOutcome) -> UserStatus {
    match outcome {
        ResolutionOutcome::Resolved(record) => UserStatus {
            connected: true,
            login_name: Some(record.login_name().to_string()),
            display_name: Some(record.display_name().to_string()),
            initial: Some(record.initial()),
            profile_pic_url: record.profile_pic_url().map(str::to_string),
            error: None,
        },
        ResolutionOutcome::Rejected(reason) | ResolutionOutcome::Unavailable(reason) => {
            UserStatus {
                connected: false,
                login_name: None,
                display_name: None,
                initial: None,
                profile_pic_url: None,
                error: Some(reason.clone()),
            }
        }
    }
}
