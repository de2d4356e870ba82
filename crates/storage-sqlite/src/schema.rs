// Catalog tables live in the main database (one file per event). Upload
// tables live in the per-device database attached as `uploads`.

diesel::table! {
    event_info (id) {
        id -> Integer,
        slug -> Text,
        name -> Text,
        valid_keys -> Text,
        keys_version -> BigInt,
        updated_at -> Text,
    }
}

diesel::table! {
    items (id) {
        id -> BigInt,
        name -> Text,
        active -> Bool,
        admission -> Bool,
    }
}

diesel::table! {
    questions (id) {
        id -> BigInt,
        payload -> Text,
    }
}

diesel::table! {
    checkin_lists (id) {
        id -> BigInt,
        name -> Text,
        all_products -> Bool,
        limit_products -> Text,
        subevent -> Nullable<BigInt>,
        include_pending -> Bool,
        allow_multiple_entries -> Bool,
        allow_entry_after_exit -> Bool,
    }
}

diesel::table! {
    orders (code) {
        code -> Text,
        status -> Text,
        valid_if_pending -> Bool,
        last_modified -> Nullable<Text>,
    }
}

diesel::table! {
    positions (id) {
        id -> BigInt,
        order_code -> Text,
        secret -> Text,
        item_id -> BigInt,
        variation_id -> Nullable<BigInt>,
        subevent_id -> Nullable<BigInt>,
        attendee_name -> Nullable<Text>,
        seat -> Nullable<Text>,
        addon_to -> Nullable<BigInt>,
        valid_from -> Nullable<Text>,
        valid_until -> Nullable<Text>,
        blocked -> Bool,
        answers -> Text,
    }
}

diesel::table! {
    checkins (id) {
        id -> BigInt,
        position_secret -> Text,
        list_id -> BigInt,
        checkin_type -> Text,
        timestamp -> Text,
        source -> Text,
        nonce -> Nullable<Text>,
    }
}

diesel::table! {
    revoked_secrets (secret) {
        secret -> Text,
        created -> Nullable<Text>,
    }
}

diesel::table! {
    blocked_secrets (secret) {
        secret -> Text,
        blocked -> Bool,
        updated -> Nullable<Text>,
    }
}

diesel::table! {
    sync_cursors (resource) {
        resource -> Text,
        last_modified_token -> Nullable<Text>,
        page_generation_timestamp -> Nullable<Text>,
        next_page -> Nullable<Integer>,
        in_progress_since -> Nullable<Text>,
    }
}

diesel::table! {
    uploads.queued_redemptions (id) {
        id -> BigInt,
        secret -> Text,
        nonce -> Text,
        event_slug -> Text,
        checkin_list_id -> BigInt,
        body -> Text,
        enqueued_at -> Text,
        retry_count -> Integer,
        next_retry_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        checkin_type -> Text,
    }
}

diesel::table! {
    uploads.upload_outcomes (id) {
        id -> BigInt,
        secret -> Text,
        nonce -> Text,
        status -> Text,
        reason -> Nullable<Text>,
        recorded_at -> Text,
    }
}

diesel::table! {
    uploads.failed_checkins (id) {
        id -> BigInt,
        event_slug -> Text,
        checkin_list_id -> BigInt,
        raw_barcode -> Text,
        error_reason -> Text,
        checkin_type -> Text,
        datetime -> Text,
        position_id -> Nullable<BigInt>,
        item_id -> Nullable<BigInt>,
        variation_id -> Nullable<BigInt>,
        subevent_id -> Nullable<BigInt>,
        enqueued_at -> Text,
        retry_count -> Integer,
        next_retry_at -> Nullable<Text>,
    }
}

diesel::table! {
    uploads.sync_engine_state (id) {
        id -> Integer,
        last_push_at -> Nullable<Text>,
        last_pull_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        consecutive_failures -> Integer,
        next_retry_at -> Nullable<Text>,
        paused_until -> Nullable<Text>,
        last_cycle_status -> Nullable<Text>,
        last_cycle_duration_ms -> Nullable<BigInt>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    event_info,
    items,
    questions,
    checkin_lists,
    orders,
    positions,
    checkins,
    revoked_secrets,
    blocked_secrets,
    sync_cursors,
);
