//! Row types for the catalog tables and their conversions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use checkin_core::catalog::{
    CheckIn, CheckInList, CheckInSource, CheckInType, Item, Order, OrderPosition, OrderStatus,
    Question,
};
use checkin_core::sync::{ResourceKind, SyncCursor};
use checkin_core::Result;

use crate::errors::{parse_optional_timestamp, parse_timestamp, StorageError};

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::event_info)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EventInfoDB {
    pub id: i32,
    pub slug: String,
    pub name: String,
    pub valid_keys: String,
    pub keys_version: i64,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ItemDB {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub admission: bool,
}

impl From<ItemDB> for Item {
    fn from(row: ItemDB) -> Self {
        Item {
            id: row.id,
            name: row.name,
            active: row.active,
            admission: row.admission,
        }
    }
}

impl From<&Item> for ItemDB {
    fn from(item: &Item) -> Self {
        ItemDB {
            id: item.id,
            name: item.name.clone(),
            active: item.active,
            admission: item.admission,
        }
    }
}

/// Questions are stored whole; they are few and always read per item.
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::questions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QuestionDB {
    pub id: i64,
    pub payload: String,
}

impl QuestionDB {
    pub fn from_question(question: &Question) -> Result<Self> {
        Ok(QuestionDB {
            id: question.id,
            payload: serde_json::to_string(question)?,
        })
    }

    pub fn into_question(self) -> Result<Question> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::checkin_lists)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct CheckInListDB {
    pub id: i64,
    pub name: String,
    pub all_products: bool,
    pub limit_products: String,
    pub subevent: Option<i64>,
    pub include_pending: bool,
    pub allow_multiple_entries: bool,
    pub allow_entry_after_exit: bool,
}

impl CheckInListDB {
    pub fn from_list(list: &CheckInList) -> Result<Self> {
        Ok(CheckInListDB {
            id: list.id,
            name: list.name.clone(),
            all_products: list.all_products,
            limit_products: serde_json::to_string(&list.limit_products)?,
            subevent: list.subevent,
            include_pending: list.include_pending,
            allow_multiple_entries: list.allow_multiple_entries,
            allow_entry_after_exit: list.allow_entry_after_exit,
        })
    }

    pub fn into_list(self) -> Result<CheckInList> {
        Ok(CheckInList {
            id: self.id,
            name: self.name,
            all_products: self.all_products,
            limit_products: serde_json::from_str(&self.limit_products)?,
            subevent: self.subevent,
            include_pending: self.include_pending,
            allow_multiple_entries: self.allow_multiple_entries,
            allow_entry_after_exit: self.allow_entry_after_exit,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct OrderDB {
    pub code: String,
    pub status: String,
    pub valid_if_pending: bool,
    pub last_modified: Option<String>,
}

impl From<&Order> for OrderDB {
    fn from(order: &Order) -> Self {
        OrderDB {
            code: order.code.clone(),
            status: order.status.as_str().to_string(),
            valid_if_pending: order.valid_if_pending,
            last_modified: order.last_modified.map(|at| at.to_rfc3339()),
        }
    }
}

impl OrderDB {
    /// Order header; positions are stored and read separately.
    pub fn into_order(self) -> Result<Order> {
        Ok(Order {
            code: self.code,
            status: OrderStatus::from(self.status),
            valid_if_pending: self.valid_if_pending,
            positions: Vec::new(),
            last_modified: parse_optional_timestamp(self.last_modified.as_deref())?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::positions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct PositionDB {
    pub id: i64,
    pub order_code: String,
    pub secret: String,
    pub item_id: i64,
    pub variation_id: Option<i64>,
    pub subevent_id: Option<i64>,
    pub attendee_name: Option<String>,
    pub seat: Option<String>,
    pub addon_to: Option<i64>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub blocked: bool,
    pub answers: String,
}

impl PositionDB {
    pub fn from_position(position: &OrderPosition) -> Result<Self> {
        Ok(PositionDB {
            id: position.id,
            order_code: position.order_code.clone(),
            secret: position.secret.clone(),
            item_id: position.item_id,
            variation_id: position.variation_id,
            subevent_id: position.subevent_id,
            attendee_name: position.attendee_name.clone(),
            seat: position.seat.clone(),
            addon_to: position.addon_to,
            valid_from: position.valid_from.map(|at| at.to_rfc3339()),
            valid_until: position.valid_until.map(|at| at.to_rfc3339()),
            blocked: position.blocked,
            answers: serde_json::to_string(&position.answers)?,
        })
    }

    /// Position without its check-in history; history lives in `checkins`.
    pub fn into_position(self) -> Result<OrderPosition> {
        Ok(OrderPosition {
            id: self.id,
            order_code: self.order_code,
            secret: self.secret,
            item_id: self.item_id,
            variation_id: self.variation_id,
            subevent_id: self.subevent_id,
            attendee_name: self.attendee_name,
            seat: self.seat,
            addon_to: self.addon_to,
            valid_from: parse_optional_timestamp(self.valid_from.as_deref())?,
            valid_until: parse_optional_timestamp(self.valid_until.as_deref())?,
            blocked: self.blocked,
            answers: serde_json::from_str(&self.answers)?,
            checkins: Vec::new(),
        })
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::checkins)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CheckInDB {
    pub id: i64,
    pub position_secret: String,
    pub list_id: i64,
    pub checkin_type: String,
    pub timestamp: String,
    pub source: String,
    pub nonce: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::checkins)]
pub struct NewCheckInDB {
    pub position_secret: String,
    pub list_id: i64,
    pub checkin_type: String,
    pub timestamp: String,
    pub source: String,
    pub nonce: Option<String>,
}

pub const SOURCE_SYNCED: &str = "synced";
pub const SOURCE_QUEUED: &str = "queued";

/// Timestamps in `checkins` are written in one fixed format so that the
/// unique index and ordering compare them correctly as text.
pub fn checkin_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

impl From<&CheckIn> for NewCheckInDB {
    fn from(checkin: &CheckIn) -> Self {
        NewCheckInDB {
            position_secret: checkin.position_secret.clone(),
            list_id: checkin.list_id,
            checkin_type: checkin.checkin_type.as_str().to_string(),
            timestamp: checkin_timestamp(&checkin.timestamp),
            source: match checkin.source {
                CheckInSource::Synced => SOURCE_SYNCED,
                CheckInSource::Queued => SOURCE_QUEUED,
            }
            .to_string(),
            nonce: checkin.nonce.clone(),
        }
    }
}

impl CheckInDB {
    pub fn into_checkin(self) -> Result<CheckIn> {
        let source = match self.source.as_str() {
            SOURCE_SYNCED => CheckInSource::Synced,
            SOURCE_QUEUED => CheckInSource::Queued,
            other => {
                return Err(StorageError::Corrupt(format!("unknown check-in source {other:?}")).into())
            }
        };
        Ok(CheckIn {
            position_secret: self.position_secret,
            list_id: self.list_id,
            checkin_type: CheckInType::from(self.checkin_type),
            timestamp: parse_timestamp(&self.timestamp)?,
            source,
            nonce: self.nonce,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_cursors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct SyncCursorDB {
    pub resource: String,
    pub last_modified_token: Option<String>,
    pub page_generation_timestamp: Option<String>,
    pub next_page: Option<i32>,
    pub in_progress_since: Option<String>,
}

impl From<&SyncCursor> for SyncCursorDB {
    fn from(cursor: &SyncCursor) -> Self {
        SyncCursorDB {
            resource: cursor.resource.as_str().to_string(),
            last_modified_token: cursor.last_modified_token.clone(),
            page_generation_timestamp: cursor.page_generation_timestamp.clone(),
            next_page: cursor.next_page.map(|page| page as i32),
            in_progress_since: cursor.in_progress_since.clone(),
        }
    }
}

impl SyncCursorDB {
    pub fn into_cursor(self) -> Result<SyncCursor> {
        let resource = ResourceKind::parse(&self.resource).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown cursor resource {:?}", self.resource))
        })?;
        Ok(SyncCursor {
            resource,
            last_modified_token: self.last_modified_token,
            page_generation_timestamp: self.page_generation_timestamp,
            next_page: self.next_page.map(|page| page.max(1) as u32),
            in_progress_since: self.in_progress_since,
        })
    }
}
