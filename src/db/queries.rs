pub const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS shuttles (
    shuttle_id   TEXT PRIMARY KEY,
    code         TEXT NOT NULL,
    name         TEXT NOT NULL,
    driver_name  TEXT NOT NULL,
    capacity     INT4 NOT NULL CHECK (capacity > 0),
    occupied     INT4 NOT NULL DEFAULT 0 CHECK (occupied >= 0 AND occupied <= capacity),
    status       TEXT NOT NULL DEFAULT 'not_started',
    latitude     FLOAT8 NULL,
    longitude    FLOAT8 NULL,
    last_updated TIMESTAMPTZ NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS shuttle_positions (
    position_id BIGSERIAL PRIMARY KEY,
    shuttle_id  TEXT NOT NULL REFERENCES shuttles (shuttle_id),
    latitude    FLOAT8 NOT NULL,
    longitude   FLOAT8 NOT NULL,
    captured_at TIMESTAMPTZ NOT NULL
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS shuttle_positions_latest
    ON shuttle_positions (shuttle_id, captured_at DESC);
"#,
    r#"
CREATE TABLE IF NOT EXISTS shuttle_alerts (
    alert_id     UUID PRIMARY KEY,
    shuttle_id   TEXT NOT NULL REFERENCES shuttles (shuttle_id),
    message      TEXT NOT NULL,
    shuttle_name TEXT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS shuttle_alerts_latest
    ON shuttle_alerts (shuttle_id, created_at DESC);
"#,
    r#"
CREATE TABLE IF NOT EXISTS users (
    uid        TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    email      TEXT NOT NULL,
    role       TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#,
    r#"
CREATE OR REPLACE FUNCTION notify_shuttle_change() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify(TG_ARGV[0], NEW.shuttle_id);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;
"#,
    "DROP TRIGGER IF EXISTS shuttles_notify ON shuttles;",
    r#"
CREATE TRIGGER shuttles_notify AFTER INSERT OR UPDATE ON shuttles
    FOR EACH ROW EXECUTE FUNCTION notify_shuttle_change('shuttle_changes');
"#,
    "DROP TRIGGER IF EXISTS shuttle_alerts_notify ON shuttle_alerts;",
    r#"
CREATE TRIGGER shuttle_alerts_notify AFTER INSERT ON shuttle_alerts
    FOR EACH ROW EXECUTE FUNCTION notify_shuttle_change('alert_changes');
"#,
];

pub const SHUTTLE_CHANNEL: &str = "shuttle_changes";
pub const ALERT_CHANNEL: &str = "alert_changes";

pub const SELECT_SHUTTLE: &str = r#"
SELECT shuttle_id, code, name, driver_name, capacity, occupied, status, latitude, longitude, last_updated
FROM shuttles WHERE shuttle_id = $1;
"#;

pub const SELECT_SHUTTLES_BY_STATUS: &str = r#"
SELECT shuttle_id, code, name, driver_name, capacity, occupied, status, latitude, longitude, last_updated
FROM shuttles WHERE status = $1 ORDER BY shuttle_id;
"#;

// Re-registration replaces the whole record, position included.
pub const UPSERT_SHUTTLE: &str = r#"
INSERT INTO shuttles (shuttle_id, code, name, driver_name, capacity, occupied, status, latitude, longitude, last_updated)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (shuttle_id) DO UPDATE
SET code = $2,
    name = $3,
    driver_name = $4,
    capacity = $5,
    occupied = $6,
    status = $7,
    latitude = $8,
    longitude = $9,
    last_updated = $10;
"#;

pub const UPDATE_TRIP_STATE: &str = r#"
UPDATE shuttles
SET status = $2,
    occupied = $3
WHERE shuttle_id = $1;
"#;

pub const UPDATE_OCCUPIED: &str = r#"
UPDATE shuttles SET occupied = $2 WHERE shuttle_id = $1;
"#;

pub const UPDATE_CURRENT_POSITION: &str = r#"
UPDATE shuttles
SET latitude = $2,
    longitude = $3,
    last_updated = NOW()
WHERE shuttle_id = $1
  AND status = 'in_progress'
RETURNING last_updated;
"#;

pub const INSERT_POSITION: &str = r#"
INSERT INTO shuttle_positions (shuttle_id, latitude, longitude, captured_at)
VALUES ($1, $2, $3, $4)
RETURNING position_id, shuttle_id, latitude, longitude, captured_at;
"#;

pub const SELECT_LATEST_POSITIONS: &str = r#"
SELECT position_id, shuttle_id, latitude, longitude, captured_at
FROM shuttle_positions WHERE shuttle_id = $1
ORDER BY captured_at DESC, position_id DESC LIMIT $2;
"#;

pub const INSERT_ALERT: &str = r#"
INSERT INTO shuttle_alerts (alert_id, shuttle_id, message, shuttle_name)
VALUES ($1, $2, $3, $4)
RETURNING alert_id, shuttle_id, message, shuttle_name, created_at;
"#;

pub const SELECT_RECENT_ALERTS: &str = r#"
SELECT alert_id, shuttle_id, message, shuttle_name, created_at
FROM shuttle_alerts WHERE shuttle_id = $1
ORDER BY created_at DESC LIMIT $2;
"#;

pub const UPSERT_USER: &str = r#"
INSERT INTO users (uid, name, email, role, created_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (uid) DO UPDATE
SET name = $2,
    email = $3,
    role = $4;
"#;

pub const SELECT_USER: &str = r#"
SELECT uid, name, email, role, created_at FROM users WHERE uid = $1;
"#;
