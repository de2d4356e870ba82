//! Wire types that exist only on the HTTP boundary. Shared entities
//! (positions, redeem bodies, device info) come from `checkin_core`.

use serde::{Deserialize, Serialize};

use checkin_core::catalog::{CheckInListStatus, CheckInType, OrderPosition, SearchResult};

/// Envelope of every paged list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PagedResponse<T> {
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// Error body of a refused request.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListStatusResponse {
    #[serde(default)]
    pub checkin_count: i64,
    #[serde(default)]
    pub position_count: i64,
    #[serde(default)]
    pub inside_count: i64,
}

impl ListStatusResponse {
    pub fn into_status(self, list_id: i64) -> CheckInListStatus {
        CheckInListStatus {
            list_id,
            position_count: self.position_count,
            checkin_count: self.checkin_count,
            inside_count: self.inside_count,
        }
    }
}

/// Search hit built from a remote position. Item names and order status are
/// not part of the position body.
pub fn search_result(position: OrderPosition, list_id: i64) -> SearchResult {
    let checked_in = position
        .checkins
        .iter()
        .any(|c| c.list_id == list_id && c.checkin_type == CheckInType::Entry);
    SearchResult {
        secret: position.secret,
        order_code: position.order_code,
        attendee_name: position.attendee_name,
        item_id: position.item_id,
        item_name: None,
        order_status: None,
        checked_in,
    }
}
