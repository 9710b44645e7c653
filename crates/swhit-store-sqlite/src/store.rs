//! [`SqliteStore`]: the SQLite implementation of [`AirdropStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use swhit_core::{
  ledger::{ReferralRecord, RewardRecord},
  store::{
    AirdropStore, CommitOutcome, Conflict, InsertOutcome, Mutation, Precondition,
    WriteBatch,
  },
  task::Task,
  user::{Identity, UserId, UserRecord},
};

use crate::{
  Result,
  encode::{
    RawReferral, RawReward, RawTask, RawUser, decode_points, encode_dt, encode_points,
    encode_uuid,
  },
  schema::SCHEMA,
};

const USER_COLUMNS: &str = "id, display_name, language_code, points, referral_code,
   referred_by, created_at, last_login";

const REWARD_COLUMNS: &str =
  "reward_id, user_id, amount, kind, description, task_id, date";

const TASK_COLUMNS: &str = "task_id, name, reward, kind, link, active";

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
  Ok(RawUser {
    id:              row.get(0)?,
    display_name:    row.get(1)?,
    language_code:   row.get(2)?,
    points:          row.get(3)?,
    referral_code:   row.get(4)?,
    referred_by:     row.get(5)?,
    created_at:      row.get(6)?,
    last_login:      row.get(7)?,
    completed_tasks: Vec::new(),
  })
}

fn reward_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawReward> {
  Ok(RawReward {
    reward_id:   row.get(0)?,
    user_id:     row.get(1)?,
    amount:      row.get(2)?,
    kind:        row.get(3)?,
    description: row.get(4)?,
    task_id:     row.get(5)?,
    date:        row.get(6)?,
  })
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTask> {
  Ok(RawTask {
    task_id: row.get(0)?,
    name:    row.get(1)?,
    reward:  row.get(2)?,
    kind:    row.get(3)?,
    link:    row.get(4)?,
    active:  row.get(5)?,
  })
}

/// Fill in the completed-task set of a user row.
fn attach_tasks(
  conn: &rusqlite::Connection,
  mut raw: RawUser,
) -> rusqlite::Result<RawUser> {
  let mut stmt = conn
    .prepare_cached("SELECT task_id FROM user_tasks WHERE user_id = ?1 ORDER BY task_id")?;
  raw.completed_tasks = stmt
    .query_map(rusqlite::params![raw.id], |r| r.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(raw)
}

fn select_user(
  conn: &rusqlite::Connection,
  column: &str,
  value: &str,
) -> rusqlite::Result<Option<RawUser>> {
  let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
  let raw = conn
    .query_row(&sql, rusqlite::params![value], user_from_row)
    .optional()?;
  raw.map(|raw| attach_tasks(conn, raw)).transpose()
}

fn user_exists(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM users WHERE id = ?1", rusqlite::params![id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

// ─── Write batch ─────────────────────────────────────────────────────────────

fn holds(conn: &rusqlite::Connection, precondition: &Precondition) -> rusqlite::Result<bool> {
  match precondition {
    Precondition::UserExists(id) => user_exists(conn, id.as_str()),
    Precondition::NotReferred(id) => Ok(
      conn
        .query_row(
          "SELECT 1 FROM users WHERE id = ?1 AND referred_by IS NULL",
          rusqlite::params![id.as_str()],
          |_| Ok(()),
        )
        .optional()?
        .is_some(),
    ),
    Precondition::TaskNotCompleted { user_id, task_id } => {
      if !user_exists(conn, user_id.as_str())? {
        return Ok(false);
      }
      let done = conn
        .query_row(
          "SELECT 1 FROM user_tasks WHERE user_id = ?1 AND task_id = ?2",
          rusqlite::params![user_id.as_str(), task_id],
          |_| Ok(()),
        )
        .optional()?
        .is_some();
      Ok(!done)
    }
  }
}

/// Apply one mutation. `Ok(Some(_))` means the batch must be abandoned.
fn apply(
  conn: &rusqlite::Connection,
  mutation: &Mutation,
) -> rusqlite::Result<Option<Conflict>> {
  match mutation {
    Mutation::Reward(reward) => {
      let user_id = reward.user_id.as_str();
      let changed = conn.execute(
        "UPDATE users SET points = points + ?2 WHERE id = ?1 AND points + ?2 >= 0",
        rusqlite::params![user_id, reward.amount],
      )?;
      if changed == 0 {
        return Ok(Some(if user_exists(conn, user_id)? {
          Conflict::NegativeBalance(reward.user_id.clone())
        } else {
          Conflict::MissingUser(reward.user_id.clone())
        }));
      }
      conn.execute(
        &format!("INSERT INTO rewards ({REWARD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        rusqlite::params![
          encode_uuid(reward.reward_id),
          user_id,
          reward.amount,
          reward.kind.as_ref(),
          reward.description,
          reward.task_id,
          encode_dt(reward.date),
        ],
      )?;
    }
    Mutation::SetReferredBy { user_id, referrer_id } => {
      let changed = conn.execute(
        "UPDATE users SET referred_by = ?2 WHERE id = ?1 AND referred_by IS NULL",
        rusqlite::params![user_id.as_str(), referrer_id.as_str()],
      )?;
      if changed == 0 {
        return Ok(Some(if user_exists(conn, user_id.as_str())? {
          Conflict::AlreadyReferred(user_id.clone())
        } else {
          Conflict::MissingUser(user_id.clone())
        }));
      }
    }
    Mutation::CompleteTask { user_id, task_id } => {
      if !user_exists(conn, user_id.as_str())? {
        return Ok(Some(Conflict::MissingUser(user_id.clone())));
      }
      conn.execute(
        "INSERT OR IGNORE INTO user_tasks (user_id, task_id) VALUES (?1, ?2)",
        rusqlite::params![user_id.as_str(), task_id],
      )?;
    }
    Mutation::Referral(record) => {
      let inserted = conn.execute(
        "INSERT INTO referrals (referred_id, referrer_id, points_awarded, timestamp)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (referred_id) DO NOTHING",
        rusqlite::params![
          record.referred_id.as_str(),
          record.referrer_id.as_str(),
          encode_points(record.points_awarded),
          encode_dt(record.timestamp),
        ],
      )?;
      if inserted == 0 {
        return Ok(Some(Conflict::AlreadyReferred(record.referred_id.clone())));
      }
    }
  }
  Ok(None)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An airdrop store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn user_where(&self, column: &'static str, value: String) -> Result<Option<UserRecord>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_user(conn, column, &value)?))
      .await?;
    raw.map(RawUser::into_user).transpose()
  }
}

// ─── AirdropStore impl ───────────────────────────────────────────────────────

impl AirdropStore for SqliteStore {
  type Error = crate::Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>> {
    self.user_where("id", id.as_str().to_owned()).await
  }

  async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>> {
    self.user_where("referral_code", code.to_owned()).await
  }

  async fn insert_user(&self, user: UserRecord) -> Result<InsertOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if user_exists(&tx, user.id.as_str())? {
          return Ok(InsertOutcome::IdTaken);
        }
        let code_taken = tx
          .query_row(
            "SELECT 1 FROM users WHERE referral_code = ?1",
            rusqlite::params![user.referral_code],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if code_taken {
          return Ok(InsertOutcome::CodeTaken);
        }

        tx.execute(
          &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
          rusqlite::params![
            user.id.as_str(),
            user.display_name,
            user.language_code,
            encode_points(user.points),
            user.referral_code,
            user.referred_by.as_ref().map(UserId::as_str),
            encode_dt(user.created_at),
            encode_dt(user.last_login),
          ],
        )?;
        for task_id in &user.completed_tasks {
          tx.execute(
            "INSERT INTO user_tasks (user_id, task_id) VALUES (?1, ?2)",
            rusqlite::params![user.id.as_str(), task_id],
          )?;
        }
        tx.commit()?;
        Ok(InsertOutcome::Inserted)
      })
      .await?;
    Ok(outcome)
  }

  async fn touch_session(
    &self,
    identity: &Identity,
    at: DateTime<Utc>,
  ) -> Result<Option<UserRecord>> {
    let id = identity.id.as_str().to_owned();
    let name = identity.display_name.clone();
    let lang = identity.language_code.clone();
    let at_str = encode_dt(at);

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE users
             SET last_login    = ?2,
                 display_name  = COALESCE(?3, display_name),
                 language_code = COALESCE(?4, language_code)
           WHERE id = ?1",
          rusqlite::params![id, at_str, name, lang],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(select_user(conn, "id", &id)?)
      })
      .await?;
    raw.map(RawUser::into_user).transpose()
  }

  // ── Atomic write ──────────────────────────────────────────────────────────

  async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        // Dropping `tx` without committing rolls every statement back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for precondition in &batch.preconditions {
          if !holds(&tx, precondition)? {
            return Ok(CommitOutcome::Rejected(Conflict::Precondition(
              precondition.clone(),
            )));
          }
        }
        for mutation in &batch.mutations {
          if let Some(conflict) = apply(&tx, mutation)? {
            return Ok(CommitOutcome::Rejected(conflict));
          }
        }
        tx.commit()?;
        Ok(CommitOutcome::Applied)
      })
      .await?;
    Ok(outcome)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn top_users(&self, limit: usize) -> Result<Vec<UserRecord>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawUser> = self
      .conn
      .call(move |conn| {
        let conn: &rusqlite::Connection = conn;
        let mut stmt = conn.prepare(&format!(
          "SELECT {USER_COLUMNS} FROM users
           ORDER BY points DESC, created_at ASC, id ASC
           LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], user_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let rows = rows
          .into_iter()
          .map(|raw| attach_tasks(conn, raw))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUser::into_user).collect()
  }

  async fn count_users(&self) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
      .await?;
    decode_points("count(users)", n)
  }

  async fn rewards_for(&self, user_id: &UserId) -> Result<Vec<RewardRecord>> {
    let id = user_id.as_str().to_owned();

    let raws: Vec<RawReward> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REWARD_COLUMNS} FROM rewards
           WHERE user_id = ?1
           ORDER BY date DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id], reward_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReward::into_reward).collect()
  }

  async fn referrals_by(&self, referrer_id: &UserId) -> Result<Vec<ReferralRecord>> {
    let id = referrer_id.as_str().to_owned();

    let raws: Vec<RawReferral> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT referrer_id, referred_id, points_awarded, timestamp
           FROM referrals
           WHERE referrer_id = ?1
           ORDER BY timestamp ASC, rowid ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(RawReferral {
              referrer_id:    row.get(0)?,
              referred_id:    row.get(1)?,
              points_awarded: row.get(2)?,
              timestamp:      row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReferral::into_referral).collect()
  }

  // ── Task catalog ──────────────────────────────────────────────────────────

  async fn put_task(&self, task: Task) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (task_id) DO UPDATE SET
               name   = excluded.name,
               reward = excluded.reward,
               kind   = excluded.kind,
               link   = excluded.link,
               active = excluded.active"
          ),
          rusqlite::params![
            task.task_id,
            task.name,
            encode_points(task.reward),
            task.kind.as_ref(),
            task.link,
            task.active,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
    let id = task_id.to_owned();

    let raw: Option<RawTask> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
              rusqlite::params![id],
              task_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTask::into_task).transpose()
  }

  async fn list_tasks(&self, active_only: bool) -> Result<Vec<Task>> {
    let raws: Vec<RawTask> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TASK_COLUMNS} FROM tasks
           WHERE ?1 = 0 OR active = 1
           ORDER BY task_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![active_only], task_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTask::into_task).collect()
  }
}
