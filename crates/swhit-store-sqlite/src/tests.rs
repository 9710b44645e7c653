//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use swhit_core::{
  Error as CoreError,
  config::CreditPolicy,
  identity::HostSession,
  ledger::{ReferralRecord, RewardKind, RewardRecord},
  service::AirdropService,
  store::{
    AirdropStore, CommitOutcome, Conflict, InsertOutcome, Mutation, Precondition,
    WriteBatch,
  },
  task::{Task, TaskKind},
  user::{Identity, UserId, UserRecord},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn identity(id: &str) -> Identity {
  Identity {
    id:            UserId::from(id),
    display_name:  Some(format!("user {id}")),
    language_code: Some("en".to_owned()),
  }
}

fn user(id: &str, points: u64) -> UserRecord {
  let at = Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap();
  UserRecord::new(&identity(id), format!("REF{id:0>8}"), points, at)
}

fn task(id: &str, reward: u64) -> Task {
  Task {
    task_id: id.to_owned(),
    name:    format!("Task {id}"),
    reward,
    kind:    TaskKind::Limited,
    link:    Some("https://t.me/swhit".to_owned()),
    active:  true,
  }
}

fn reward(id: &str, amount: i64) -> RewardRecord {
  RewardRecord::new(UserId::from(id), amount, RewardKind::Task, "test", Utc::now())
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_user() {
  let s = store().await;
  let alice = user("100", 1_500);

  assert_eq!(s.insert_user(alice.clone()).await.unwrap(), InsertOutcome::Inserted);

  let fetched = s.get_user(&alice.id).await.unwrap().unwrap();
  assert_eq!(fetched, alice);
  let by_code = s.find_by_referral_code(&alice.referral_code).await.unwrap();
  assert_eq!(by_code.map(|u| u.id), Some(alice.id));
}

#[tokio::test]
async fn get_user_missing_returns_none() {
  let s = store().await;
  assert!(s.get_user(&UserId::from("nobody")).await.unwrap().is_none());
  assert!(s.find_by_referral_code("REF00000000").await.unwrap().is_none());
}

#[tokio::test]
async fn insert_reports_taken_id_and_code() {
  let s = store().await;
  s.insert_user(user("100", 0)).await.unwrap();

  let same_id = UserRecord { referral_code: "REFFFFFFFF".into(), ..user("100", 0) };
  assert_eq!(s.insert_user(same_id).await.unwrap(), InsertOutcome::IdTaken);

  let same_code = UserRecord { referral_code: user("100", 0).referral_code, ..user("200", 0) };
  assert_eq!(s.insert_user(same_code).await.unwrap(), InsertOutcome::CodeTaken);

  assert_eq!(s.count_users().await.unwrap(), 1);
}

#[tokio::test]
async fn touch_session_keeps_fields_the_host_omits() {
  let s = store().await;
  s.insert_user(user("100", 0)).await.unwrap();

  let later = Utc::now();
  let partial = Identity { display_name: None, ..identity("100") };
  let touched = s.touch_session(&partial, later).await.unwrap().unwrap();
  assert_eq!(touched.display_name.as_deref(), Some("user 100"));
  assert_eq!(touched.last_login.timestamp_micros(), later.timestamp_micros());

  let renamed = Identity { display_name: Some("Alice".into()), ..identity("100") };
  let touched = s.touch_session(&renamed, later).await.unwrap().unwrap();
  assert_eq!(touched.display_name.as_deref(), Some("Alice"));

  assert!(s.touch_session(&identity("999"), later).await.unwrap().is_none());
}

// ─── Commit ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_applies_every_mutation() {
  let s = store().await;
  s.insert_user(user("1", 1_500)).await.unwrap();
  s.insert_user(user("2", 1_500)).await.unwrap();
  let (a, b) = (UserId::from("1"), UserId::from("2"));

  let batch = WriteBatch::new()
    .require(Precondition::UserExists(a.clone()))
    .require(Precondition::NotReferred(b.clone()))
    .push(Mutation::Reward(reward("1", 2_500)))
    .push(Mutation::Reward(reward("2", 1_500)))
    .push(Mutation::SetReferredBy { user_id: b.clone(), referrer_id: a.clone() })
    .push(Mutation::Referral(ReferralRecord {
      referrer_id:    a.clone(),
      referred_id:    b.clone(),
      points_awarded: 2_500,
      timestamp:      Utc::now(),
    }));

  assert_eq!(s.commit(batch).await.unwrap(), CommitOutcome::Applied);

  assert_eq!(s.get_user(&a).await.unwrap().unwrap().points, 4_000);
  let b_user = s.get_user(&b).await.unwrap().unwrap();
  assert_eq!(b_user.points, 3_000);
  assert_eq!(b_user.referred_by, Some(a.clone()));
  assert_eq!(s.referrals_by(&a).await.unwrap().len(), 1);
  assert_eq!(s.rewards_for(&b).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_precondition_writes_nothing() {
  let s = store().await;
  s.insert_user(user("1", 100)).await.unwrap();

  let batch = WriteBatch::new()
    .require(Precondition::UserExists(UserId::from("ghost")))
    .push(Mutation::Reward(reward("1", 50)));

  assert_eq!(
    s.commit(batch).await.unwrap(),
    CommitOutcome::Rejected(Conflict::Precondition(Precondition::UserExists(
      UserId::from("ghost")
    )))
  );
  assert_eq!(s.get_user(&UserId::from("1")).await.unwrap().unwrap().points, 100);
  assert!(s.rewards_for(&UserId::from("1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn late_conflict_rolls_back_earlier_mutations() {
  let s = store().await;
  s.insert_user(user("1", 100)).await.unwrap();
  s.insert_user(user("2", 100)).await.unwrap();

  let batch = WriteBatch::new()
    .push(Mutation::Reward(reward("1", 50)))
    .push(Mutation::Reward(reward("2", -500)));

  assert_eq!(
    s.commit(batch).await.unwrap(),
    CommitOutcome::Rejected(Conflict::NegativeBalance(UserId::from("2")))
  );
  assert_eq!(s.get_user(&UserId::from("1")).await.unwrap().unwrap().points, 100);
  assert!(s.rewards_for(&UserId::from("1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn second_referral_edge_conflicts() {
  let s = store().await;
  for id in ["1", "2", "3"] {
    s.insert_user(user(id, 0)).await.unwrap();
  }
  let edge = |referrer: &str| {
    WriteBatch::new().push(Mutation::Referral(ReferralRecord {
      referrer_id:    UserId::from(referrer),
      referred_id:    UserId::from("3"),
      points_awarded: 2_500,
      timestamp:      Utc::now(),
    }))
  };

  assert_eq!(s.commit(edge("1")).await.unwrap(), CommitOutcome::Applied);
  assert_eq!(
    s.commit(edge("2")).await.unwrap(),
    CommitOutcome::Rejected(Conflict::AlreadyReferred(UserId::from("3")))
  );
}

#[tokio::test]
async fn set_referred_by_only_once() {
  let s = store().await;
  for id in ["1", "2", "3"] {
    s.insert_user(user(id, 0)).await.unwrap();
  }
  let link = |referrer: &str| {
    WriteBatch::new().push(Mutation::SetReferredBy {
      user_id:     UserId::from("3"),
      referrer_id: UserId::from(referrer),
    })
  };

  assert_eq!(s.commit(link("1")).await.unwrap(), CommitOutcome::Applied);
  assert_eq!(
    s.commit(link("2")).await.unwrap(),
    CommitOutcome::Rejected(Conflict::AlreadyReferred(UserId::from("3")))
  );
  let missing = WriteBatch::new().push(Mutation::SetReferredBy {
    user_id:     UserId::from("ghost"),
    referrer_id: UserId::from("1"),
  });
  assert_eq!(
    s.commit(missing).await.unwrap(),
    CommitOutcome::Rejected(Conflict::MissingUser(UserId::from("ghost")))
  );
}

#[tokio::test]
async fn task_completion_precondition() {
  let s = store().await;
  s.insert_user(user("1", 0)).await.unwrap();
  let complete = || {
    WriteBatch::new()
      .require(Precondition::TaskNotCompleted {
        user_id: UserId::from("1"),
        task_id: "follow".into(),
      })
      .push(Mutation::Reward(reward("1", 500).with_task("follow")))
      .push(Mutation::CompleteTask { user_id: UserId::from("1"), task_id: "follow".into() })
  };

  assert_eq!(s.commit(complete()).await.unwrap(), CommitOutcome::Applied);
  assert!(matches!(
    s.commit(complete()).await.unwrap(),
    CommitOutcome::Rejected(Conflict::Precondition(_))
  ));

  let u = s.get_user(&UserId::from("1")).await.unwrap().unwrap();
  assert_eq!(u.points, 500);
  assert!(u.has_completed("follow"));
  let history = s.rewards_for(&u.id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].task_id.as_deref(), Some("follow"));
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn top_users_breaks_ties_by_creation_then_id() {
  let s = store().await;
  let base = Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap();
  let at = |id: &str, points: u64, offset: i64| UserRecord {
    created_at: base + Duration::milliseconds(offset),
    ..user(id, points)
  };
  s.insert_user(at("c", 500, 0)).await.unwrap();
  s.insert_user(at("b", 900, 5)).await.unwrap();
  s.insert_user(at("a", 900, 5)).await.unwrap();
  s.insert_user(at("d", 900, 1)).await.unwrap();

  let order: Vec<String> = s
    .top_users(10)
    .await
    .unwrap()
    .into_iter()
    .map(|u| u.id.to_string())
    .collect();
  assert_eq!(order, ["d", "a", "b", "c"]);
  assert_eq!(s.top_users(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn rewards_are_listed_newest_first() {
  let s = store().await;
  s.insert_user(user("1", 0)).await.unwrap();
  let base = Utc::now();
  for (i, amount) in [10, 20, 30].into_iter().enumerate() {
    let mut r = reward("1", amount);
    r.date = base + Duration::seconds(i as i64);
    s.commit(WriteBatch::new().push(Mutation::Reward(r))).await.unwrap();
  }

  let amounts: Vec<i64> = s
    .rewards_for(&UserId::from("1"))
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.amount)
    .collect();
  assert_eq!(amounts, [30, 20, 10]);
}

// ─── Task catalog ────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_task_upserts() {
  let s = store().await;
  s.put_task(task("follow", 500)).await.unwrap();
  s.put_task(Task { reward: 750, ..task("follow", 500) }).await.unwrap();
  s.put_task(Task { active: false, ..task("retired", 100) }).await.unwrap();

  let follow = s.get_task("follow").await.unwrap().unwrap();
  assert_eq!(follow.reward, 750);
  assert_eq!(follow.kind, TaskKind::Limited);
  assert!(s.get_task("nope").await.unwrap().is_none());

  assert_eq!(s.list_tasks(false).await.unwrap().len(), 2);
  let active = s.list_tasks(true).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].task_id, "follow");
}

// ─── Workflows ───────────────────────────────────────────────────────────────

fn service(store: SqliteStore) -> AirdropService<SqliteStore> {
  let policy = CreditPolicy { backoff_step_ms: 1, ..CreditPolicy::default() };
  AirdropService::new(Arc::new(store), policy)
}

fn session(id: &str) -> HostSession {
  HostSession { identity: identity(id), start_param: None }
}

async fn assert_ledger_consistent(s: &SqliteStore, start_grant: u64) {
  for u in s.top_users(usize::MAX).await.unwrap() {
    let credited: i64 = s.rewards_for(&u.id).await.unwrap().iter().map(|r| r.amount).sum();
    assert_eq!(u.points as i64, start_grant as i64 + credited, "ledger mismatch for {}", u.id);
  }
}

#[tokio::test]
async fn referral_signup_end_to_end() {
  let svc = service(store().await);
  let a = svc.upsert_session(&session("A"), None).await.unwrap().user;

  let outcome = svc
    .upsert_session(&session("B"), Some(&a.referral_code.to_lowercase()))
    .await
    .unwrap();
  assert!(outcome.created);
  let receipt = outcome.referral.unwrap().unwrap();
  assert_eq!(receipt.referrer.points, 4_000);
  assert_eq!(receipt.referee.points, 3_000);

  let b = svc.get_user(&UserId::from("B")).await.unwrap().unwrap();
  assert_eq!(b.referred_by, Some(a.id.clone()));

  let again = svc.apply_referral(&b.id, &a.referral_code).await;
  assert!(matches!(again, Err(CoreError::AlreadyReferred(_))));

  let stats = svc.referral_stats(&a.id).await.unwrap();
  assert_eq!(stats.total_referrals, 1);
  assert_eq!(stats.total_points, 2_500);
  assert_ledger_consistent(svc.store(), 1_500).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_referrals_credit_once() {
  let svc = Arc::new(service(store().await));
  let mut codes = Vec::new();
  for id in ["R1", "R2", "R3", "R4"] {
    codes.push(svc.upsert_session(&session(id), None).await.unwrap().user.referral_code);
  }
  svc.upsert_session(&session("N"), None).await.unwrap();

  let handles: Vec<_> = (0..12)
    .map(|i| {
      let svc = svc.clone();
      let code = codes[i % codes.len()].clone();
      tokio::spawn(async move { svc.apply_referral(&UserId::from("N"), &code).await })
    })
    .collect();

  let mut credited = 0;
  for handle in handles {
    match handle.await.unwrap() {
      Ok(_) => credited += 1,
      Err(CoreError::AlreadyReferred(_)) => {}
      Err(other) => panic!("unexpected error: {other}"),
    }
  }
  assert_eq!(credited, 1);

  let n = svc.get_user(&UserId::from("N")).await.unwrap().unwrap();
  assert_eq!(n.points, 3_000);
  let referrer = n.referred_by.unwrap();
  assert_eq!(svc.get_user(&referrer).await.unwrap().unwrap().points, 4_000);
  assert_ledger_consistent(svc.store(), 1_500).await;
}

#[tokio::test]
async fn task_claim_is_idempotent() {
  let svc = service(store().await);
  svc.seed_tasks([task("follow", 500)]).await.unwrap();
  let u = svc.upsert_session(&session("1"), None).await.unwrap().user;

  let receipt = svc.complete_task(&u.id, "follow").await.unwrap();
  assert_eq!(receipt.user.points, 2_000);
  assert_eq!(receipt.reward.description, "Completed: Task follow");

  let again = svc.complete_task(&u.id, "follow").await;
  assert!(matches!(again, Err(CoreError::AlreadyCompleted { .. })));

  let board = svc.task_board(&u.id).await.unwrap();
  assert_eq!(board.len(), 1);
  assert!(board[0].completed);
  assert_ledger_consistent(svc.store(), 1_500).await;
}

#[tokio::test]
async fn reopening_a_file_keeps_data() {
  let dir = std::env::temp_dir().join(format!("swhit-{}", uuid::Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("swhit.sqlite");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.insert_user(user("1", 1_500)).await.unwrap();
  }
  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(s.count_users().await.unwrap(), 1);

  drop(s);
  let _ = std::fs::remove_dir_all(&dir);
}
