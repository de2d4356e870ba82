//! Explicit session context passed into redemption and sync calls.

use serde::{Deserialize, Serialize};

use crate::catalog::CheckInList;

/// The event and check-in list a device is currently scanning for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub organizer: String,
    pub event_slug: String,
    pub checkin_list: CheckInList,
}

impl SessionContext {
    pub fn new(
        organizer: impl Into<String>,
        event_slug: impl Into<String>,
        checkin_list: CheckInList,
    ) -> Self {
        Self {
            organizer: organizer.into(),
            event_slug: event_slug.into(),
            checkin_list,
        }
    }

    pub fn list_id(&self) -> i64 {
        self.checkin_list.id
    }
}
