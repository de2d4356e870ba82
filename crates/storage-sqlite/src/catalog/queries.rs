//! Catalog queries shared by the read repository (pooled connections) and
//! the redemption ledger (writer connection).

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;

use checkin_core::catalog::{
    CatalogRecords, CheckIn, CheckInList, CheckInListStatus, CheckInType, EventInfo, Item, Order,
    OrderPosition, Question, SearchResult,
};
use checkin_core::sync::{ResourceKind, SyncCursor};
use checkin_core::tickets::SignedKeySet;
use checkin_core::Result;

use super::model::{
    checkin_timestamp, CheckInDB, CheckInListDB, EventInfoDB, ItemDB, NewCheckInDB, OrderDB,
    PositionDB, QuestionDB, SyncCursorDB, SOURCE_QUEUED, SOURCE_SYNCED,
};
use crate::errors::StorageError;
use crate::schema::{
    blocked_secrets, checkin_lists, checkins, event_info, items, orders, positions, queued_redemptions,
    questions, revoked_secrets, sync_cursors,
};

pub(crate) fn position_by_secret(
    conn: &mut SqliteConnection,
    secret: &str,
) -> Result<Option<OrderPosition>> {
    positions::table
        .filter(positions::secret.eq(secret))
        .select(PositionDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(PositionDB::into_position)
        .transpose()
}

pub(crate) fn order(conn: &mut SqliteConnection, code: &str) -> Result<Option<Order>> {
    orders::table
        .find(code)
        .select(OrderDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(OrderDB::into_order)
        .transpose()
}

pub(crate) fn item(conn: &mut SqliteConnection, item_id: i64) -> Result<Option<Item>> {
    Ok(items::table
        .find(item_id)
        .select(ItemDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(Item::from))
}

pub(crate) fn list_items(conn: &mut SqliteConnection) -> Result<Vec<Item>> {
    Ok(items::table
        .order(items::id.asc())
        .select(ItemDB::as_select())
        .load(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .map(Item::from)
        .collect())
}

pub(crate) fn questions_for_item(conn: &mut SqliteConnection, item_id: i64) -> Result<Vec<Question>> {
    let rows = questions::table
        .order(questions::id.asc())
        .select(QuestionDB::as_select())
        .load(conn)
        .map_err(StorageError::from)?;
    let mut found = Vec::new();
    for row in rows {
        let question = row.into_question()?;
        if question.applies_to(item_id) {
            found.push(question);
        }
    }
    Ok(found)
}

pub(crate) fn checkin_list(conn: &mut SqliteConnection, list_id: i64) -> Result<Option<CheckInList>> {
    checkin_lists::table
        .find(list_id)
        .select(CheckInListDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(CheckInListDB::into_list)
        .transpose()
}

pub(crate) fn list_checkin_lists(conn: &mut SqliteConnection) -> Result<Vec<CheckInList>> {
    checkin_lists::table
        .order(checkin_lists::id.asc())
        .select(CheckInListDB::as_select())
        .load(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .map(CheckInListDB::into_list)
        .collect()
}

/// History for one secret, oldest first.
pub(crate) fn checkins_for_secret(conn: &mut SqliteConnection, secret: &str) -> Result<Vec<CheckIn>> {
    checkins::table
        .filter(checkins::position_secret.eq(secret))
        .order((checkins::timestamp.asc(), checkins::id.asc()))
        .select(CheckInDB::as_select())
        .load(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .map(CheckInDB::into_checkin)
        .collect()
}

/// Inserts a history row; an identical row already present is kept as is.
pub(crate) fn append_checkin(conn: &mut SqliteConnection, checkin: &CheckIn) -> Result<()> {
    diesel::insert_or_ignore_into(checkins::table)
        .values(NewCheckInDB::from(checkin))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

pub(crate) fn signing_keys(conn: &mut SqliteConnection) -> Result<SignedKeySet> {
    let row = event_info::table
        .find(1)
        .select(EventInfoDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?;
    match row {
        Some(row) => Ok(SignedKeySet {
            version: row.keys_version,
            valid_keys: serde_json::from_str(&row.valid_keys)?,
        }),
        None => Ok(SignedKeySet::default()),
    }
}

pub(crate) fn is_secret_revoked(conn: &mut SqliteConnection, secret: &str) -> Result<bool> {
    let found = revoked_secrets::table
        .find(secret)
        .select(revoked_secrets::secret)
        .first::<String>(conn)
        .optional()
        .map_err(StorageError::from)?;
    Ok(found.is_some())
}

pub(crate) fn is_secret_blocked(conn: &mut SqliteConnection, secret: &str) -> Result<bool> {
    let found = blocked_secrets::table
        .find(secret)
        .select(blocked_secrets::blocked)
        .first::<bool>(conn)
        .optional()
        .map_err(StorageError::from)?;
    Ok(found.unwrap_or(false))
}

pub(crate) fn search_positions(
    conn: &mut SqliteConnection,
    query: &str,
    list: &CheckInList,
    limit: i64,
) -> Result<Vec<SearchResult>> {
    let needle = query.trim();
    if needle.is_empty() {
        return Ok(Vec::new());
    }
    let prefix = format!("{}%", needle);
    let contains = format!("%{}%", needle);

    let mut select = positions::table
        .filter(
            positions::secret
                .like(prefix)
                .or(positions::order_code.like(contains.clone()))
                .or(positions::attendee_name.like(contains)),
        )
        .into_boxed();
    if !list.all_products {
        select = select.filter(positions::item_id.eq_any(list.limit_products.clone()));
    }
    let rows = select
        .order(positions::id.asc())
        .limit(limit)
        .select(PositionDB::as_select())
        .load(conn)
        .map_err(StorageError::from)?;

    let item_names: HashMap<i64, String> = items::table
        .select((items::id, items::name))
        .load::<(i64, String)>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .collect();

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let status = orders::table
            .find(&row.order_code)
            .select(orders::status)
            .first::<String>(conn)
            .optional()
            .map_err(StorageError::from)?;
        let checked_in = checkins::table
            .filter(checkins::position_secret.eq(&row.secret))
            .filter(checkins::list_id.eq(list.id))
            .filter(checkins::checkin_type.eq(CheckInType::Entry.as_str()))
            .count()
            .get_result::<i64>(conn)
            .map_err(StorageError::from)?
            > 0;
        results.push(SearchResult {
            item_name: item_names.get(&row.item_id).cloned(),
            order_status: status.map(Into::into),
            checked_in,
            secret: row.secret,
            order_code: row.order_code,
            attendee_name: row.attendee_name,
            item_id: row.item_id,
        });
    }
    Ok(results)
}

/// Positions eligible for the list, how many ever entered, and how many are
/// inside right now (last event on the list is an entry).
pub(crate) fn checkin_list_status(
    conn: &mut SqliteConnection,
    list: &CheckInList,
) -> Result<CheckInListStatus> {
    let mut select = positions::table
        .select((positions::secret, positions::subevent_id))
        .into_boxed();
    if !list.all_products {
        select = select.filter(positions::item_id.eq_any(list.limit_products.clone()));
    }
    let eligible: HashSet<String> = select
        .load::<(String, Option<i64>)>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .filter(|(_, subevent)| list.admits_subevent(*subevent))
        .map(|(secret, _)| secret)
        .collect();

    let history = checkins::table
        .filter(checkins::list_id.eq(list.id))
        .order((checkins::timestamp.asc(), checkins::id.asc()))
        .select((checkins::position_secret, checkins::checkin_type))
        .load::<(String, String)>(conn)
        .map_err(StorageError::from)?;

    let entry = CheckInType::Entry.as_str();
    let mut entered = HashSet::new();
    let mut last: HashMap<String, bool> = HashMap::new();
    for (secret, kind) in history {
        if !eligible.contains(&secret) {
            continue;
        }
        let is_entry = kind == entry;
        if is_entry {
            entered.insert(secret.clone());
        }
        last.insert(secret, is_entry);
    }

    Ok(CheckInListStatus {
        list_id: list.id,
        position_count: eligible.len() as i64,
        checkin_count: entered.len() as i64,
        inside_count: last.values().filter(|inside| **inside).count() as i64,
    })
}

pub(crate) fn cursor(conn: &mut SqliteConnection, resource: ResourceKind) -> Result<Option<SyncCursor>> {
    sync_cursors::table
        .find(resource.as_str())
        .select(SyncCursorDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(SyncCursorDB::into_cursor)
        .transpose()
}

pub(crate) fn save_cursor(conn: &mut SqliteConnection, cursor: &SyncCursor) -> Result<()> {
    let row = SyncCursorDB::from(cursor);
    diesel::insert_into(sync_cursors::table)
        .values(&row)
        .on_conflict(sync_cursors::resource)
        .do_update()
        .set(&row)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

/// Applies one page of records. Returns the number of records merged.
pub(crate) fn apply_records(conn: &mut SqliteConnection, records: CatalogRecords) -> Result<usize> {
    let count = records.len();
    match records {
        CatalogRecords::Event(event) => apply_event(conn, &event)?,
        CatalogRecords::Items(rows) => {
            for item in &rows {
                let row = ItemDB::from(item);
                diesel::insert_into(items::table)
                    .values(&row)
                    .on_conflict(items::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
            }
        }
        CatalogRecords::Questions(rows) => {
            for question in &rows {
                let row = QuestionDB::from_question(question)?;
                diesel::insert_into(questions::table)
                    .values(&row)
                    .on_conflict(questions::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
            }
        }
        CatalogRecords::CheckInLists(rows) => {
            for list in &rows {
                let row = CheckInListDB::from_list(list)?;
                diesel::insert_into(checkin_lists::table)
                    .values(&row)
                    .on_conflict(checkin_lists::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
            }
        }
        CatalogRecords::Orders(rows) => {
            let live_nonces: HashSet<String> = queued_redemptions::table
                .select(queued_redemptions::nonce)
                .load::<String>(conn)
                .map_err(StorageError::from)?
                .into_iter()
                .collect();
            for order in &rows {
                apply_order(conn, order, &live_nonces)?;
            }
        }
        CatalogRecords::RevokedSecrets(rows) => {
            for revoked in &rows {
                diesel::insert_or_ignore_into(revoked_secrets::table)
                    .values((
                        revoked_secrets::secret.eq(&revoked.secret),
                        revoked_secrets::created.eq(revoked.created.map(|at| at.to_rfc3339())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
            }
        }
        CatalogRecords::BlockedSecrets(rows) => {
            for blocked in &rows {
                let updated = blocked.updated.map(|at| at.to_rfc3339());
                diesel::insert_into(blocked_secrets::table)
                    .values((
                        blocked_secrets::secret.eq(&blocked.secret),
                        blocked_secrets::blocked.eq(blocked.blocked),
                        blocked_secrets::updated.eq(&updated),
                    ))
                    .on_conflict(blocked_secrets::secret)
                    .do_update()
                    .set((
                        blocked_secrets::blocked.eq(blocked.blocked),
                        blocked_secrets::updated.eq(&updated),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
            }
        }
    }
    Ok(count)
}

/// Stores the event's key list, bumping the key version when it changed.
fn apply_event(conn: &mut SqliteConnection, event: &EventInfo) -> Result<()> {
    let current = signing_keys(conn)?;
    let version = if current.valid_keys == event.valid_keys {
        current.version
    } else {
        current.version + 1
    };
    let row = EventInfoDB {
        id: 1,
        slug: event.slug.clone(),
        name: event.name.clone(),
        valid_keys: serde_json::to_string(&event.valid_keys)?,
        keys_version: version,
        updated_at: Utc::now().to_rfc3339(),
    };
    diesel::insert_into(event_info::table)
        .values(&row)
        .on_conflict(event_info::id)
        .do_update()
        .set(&row)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

/// Replaces the order, its positions and their synced history. Locally
/// queued history survives only while its request is still in the queue.
/// Queued check-ins whose request is no longer in the upload queue.
fn delete_stale_queued(
    conn: &mut SqliteConnection,
    secret: &str,
    live_nonces: &HashSet<String>,
) -> Result<()> {
    let stale: Vec<i64> = checkins::table
        .filter(checkins::position_secret.eq(secret))
        .filter(checkins::source.eq(SOURCE_QUEUED))
        .select((checkins::id, checkins::nonce))
        .load::<(i64, Option<String>)>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .filter(|(_, nonce)| !nonce.as_ref().is_some_and(|n| live_nonces.contains(n)))
        .map(|(id, _)| id)
        .collect();
    if !stale.is_empty() {
        diesel::delete(checkins::table.filter(checkins::id.eq_any(stale)))
            .execute(conn)
            .map_err(StorageError::from)?;
    }
    Ok(())
}

/// The server payload carries every position of an order. Stored positions
/// missing from it were removed upstream and must stop validating.
fn prune_dropped_positions(
    conn: &mut SqliteConnection,
    order_code: &str,
    incoming: &[OrderPosition],
    live_nonces: &HashSet<String>,
) -> Result<()> {
    let kept_ids: Vec<i64> = incoming.iter().map(|p| p.id).collect();
    let dropped: Vec<(i64, String)> = positions::table
        .filter(positions::order_code.eq(order_code))
        .filter(positions::id.ne_all(kept_ids))
        .select((positions::id, positions::secret))
        .load::<(i64, String)>(conn)
        .map_err(StorageError::from)?;
    if dropped.is_empty() {
        return Ok(());
    }

    for (_, secret) in &dropped {
        if incoming.iter().any(|p| &p.secret == secret) {
            continue;
        }
        diesel::delete(
            checkins::table
                .filter(checkins::position_secret.eq(secret))
                .filter(checkins::source.eq(SOURCE_SYNCED)),
        )
        .execute(conn)
        .map_err(StorageError::from)?;
        delete_stale_queued(conn, secret, live_nonces)?;
    }

    let ids: Vec<i64> = dropped.iter().map(|(id, _)| *id).collect();
    let removed = diesel::delete(positions::table.filter(positions::id.eq_any(ids)))
        .execute(conn)
        .map_err(StorageError::from)?;
    debug!("[Catalog] Order {} dropped {} positions", order_code, removed);
    Ok(())
}

fn apply_order(conn: &mut SqliteConnection, order: &Order, live_nonces: &HashSet<String>) -> Result<()> {
    let header = OrderDB::from(order);
    diesel::insert_into(orders::table)
        .values(&header)
        .on_conflict(orders::code)
        .do_update()
        .set(&header)
        .execute(conn)
        .map_err(StorageError::from)?;

    let incoming = order.normalized_positions();
    prune_dropped_positions(conn, &order.code, &incoming, live_nonces)?;

    for position in incoming {
        let row = PositionDB::from_position(&position)?;
        diesel::insert_into(positions::table)
            .values(&row)
            .on_conflict(positions::id)
            .do_update()
            .set(&row)
            .execute(conn)
            .map_err(StorageError::from)?;

        diesel::delete(
            checkins::table
                .filter(checkins::position_secret.eq(&position.secret))
                .filter(checkins::source.eq(SOURCE_SYNCED)),
        )
        .execute(conn)
        .map_err(StorageError::from)?;

        delete_stale_queued(conn, &position.secret, live_nonces)?;

        for synced in &position.checkins {
            let checkin = CheckIn::synced(&position.secret, synced);
            // A live queued row for the same event is replaced by the synced one.
            diesel::delete(
                checkins::table
                    .filter(checkins::position_secret.eq(&checkin.position_secret))
                    .filter(checkins::list_id.eq(checkin.list_id))
                    .filter(checkins::checkin_type.eq(checkin.checkin_type.as_str()))
                    .filter(checkins::timestamp.eq(checkin_timestamp(&checkin.timestamp))),
            )
            .execute(conn)
            .map_err(StorageError::from)?;
            append_checkin(conn, &checkin)?;
        }
    }
    Ok(())
}
