//! SQL schema for the SWHIT SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id             TEXT PRIMARY KEY,
    display_name   TEXT,
    language_code  TEXT,
    points         INTEGER NOT NULL CHECK (points >= 0),
    referral_code  TEXT NOT NULL UNIQUE,
    referred_by    TEXT REFERENCES users(id),
    created_at     TEXT NOT NULL,   -- RFC 3339 UTC, fixed microsecond width
    last_login     TEXT NOT NULL,
    CHECK (referred_by IS NULL OR referred_by != id)
);

-- Insertion-only set of completed task ids per user.
CREATE TABLE IF NOT EXISTS user_tasks (
    user_id      TEXT NOT NULL REFERENCES users(id),
    task_id      TEXT NOT NULL,
    PRIMARY KEY (user_id, task_id)
);

-- One row per credited referral edge; a user can be referred only once.
CREATE TABLE IF NOT EXISTS referrals (
    referred_id     TEXT PRIMARY KEY REFERENCES users(id),
    referrer_id     TEXT NOT NULL REFERENCES users(id),
    points_awarded  INTEGER NOT NULL,
    timestamp       TEXT NOT NULL,
    CHECK (referrer_id != referred_id)
);

-- Reward ledger. Strictly append-only.
CREATE TABLE IF NOT EXISTS rewards (
    reward_id    TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(id),
    amount       INTEGER NOT NULL,
    kind         TEXT NOT NULL,   -- 'referral' | 'welcome' | 'task'
    description  TEXT NOT NULL,
    task_id      TEXT,
    date         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id  TEXT PRIMARY KEY,
    name     TEXT NOT NULL,
    reward   INTEGER NOT NULL CHECK (reward > 0),
    kind     TEXT NOT NULL,       -- 'limited' | 'in_game' | 'partners'
    link     TEXT,
    active   INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS users_board_idx      ON users(points DESC, created_at, id);
CREATE INDEX IF NOT EXISTS referrals_referrer_idx ON referrals(referrer_id);
CREATE INDEX IF NOT EXISTS rewards_user_idx     ON rewards(user_id, date);

PRAGMA user_version = 1;
";
