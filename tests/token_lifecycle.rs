mod common;

use chrono::{Duration, Utc};
use sqlx::Row;

use common::{test_auth_settings, test_lifecycle};
use workout_tracker::auth::refresh_token;
use workout_tracker::auth::{fingerprint, OriginHint, TokenLifecycle};
use workout_tracker::error::{AccessTokenError, AuthError, StoreError};

fn origin() -> OriginHint {
    OriginHint::new("lifecycle-test/1.0", "192.0.2.10")
}

#[tokio::test]
async fn login_rotate_replay_scenario() {
    let (_pool, lifecycle) = test_lifecycle().await;

    let first = lifecycle.issue_login(42, origin()).await.expect("Login failed");
    assert_eq!(lifecycle.verify_access(&first.access_token).unwrap(), 42);

    let second = lifecycle.rotate(&first.refresh_token).await.expect("Rotation failed");
    assert_ne!(second.access_token, first.access_token);
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(lifecycle.verify_access(&second.access_token).unwrap(), 42);

    let replay = lifecycle.rotate(&first.refresh_token).await;
    assert!(matches!(replay, Err(AuthError::TokenNotFound)));

    let third = lifecycle.rotate(&second.refresh_token).await.expect("Rotation of R2 failed");
    assert_eq!(lifecycle.verify_access(&third.access_token).unwrap(), 42);
}

#[tokio::test]
async fn logout_scenario_is_idempotent() {
    let (_pool, lifecycle) = test_lifecycle().await;
    let login = lifecycle.issue_login(42, origin()).await.unwrap();
    let rotated = lifecycle.rotate(&login.refresh_token).await.unwrap();

    lifecycle.logout(&rotated.refresh_token).await;
    assert!(matches!(
        lifecycle.rotate(&rotated.refresh_token).await,
        Err(AuthError::TokenNotFound)
    ));

    // Logging out again, or with garbage, is still fine
    lifecycle.logout(&rotated.refresh_token).await;
    lifecycle.logout("not-a-token-we-ever-issued").await;
}

#[tokio::test]
async fn rotating_unknown_token_fails_without_side_effects() {
    let (pool, lifecycle) = test_lifecycle().await;

    let result = lifecycle.rotate("definitely_not_a_valid_token").await;

    assert!(matches!(result, Err(AuthError::TokenNotFound)));
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM refresh_tokens")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn concurrent_rotations_of_one_token_succeed_exactly_once() {
    let (_pool, lifecycle) = test_lifecycle().await;
    let login = lifecycle.issue_login(42, origin()).await.unwrap();

    for _ in 0..5 {
        let pair = lifecycle.issue_login(42, origin()).await.unwrap();
        let (a, b) = tokio::join!(
            lifecycle.rotate(&pair.refresh_token),
            lifecycle.rotate(&pair.refresh_token)
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one concurrent rotation must win");

        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(AuthError::TokenNotFound)));
    }

    // The unrelated login is untouched
    assert!(lifecycle.rotate(&login.refresh_token).await.is_ok());
}

#[tokio::test]
async fn raw_secrets_are_never_persisted() {
    let (pool, lifecycle) = test_lifecycle().await;
    let login = lifecycle.issue_login(42, origin()).await.unwrap();
    let rotated = lifecycle.rotate(&login.refresh_token).await.unwrap();

    let rows = sqlx::query("SELECT fingerprint, user_agent, ip FROM refresh_tokens")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let raw = [&login.refresh_token, &rotated.refresh_token];
    for row in &rows {
        for column in ["fingerprint", "user_agent", "ip"] {
            let value: String = row.get(column);
            for secret in raw {
                assert!(!value.contains(secret.as_str()), "raw secret found in {}", column);
            }
        }
    }

    let stored: Vec<String> = rows.iter().map(|r| r.get("fingerprint")).collect();
    assert!(stored.contains(&fingerprint(&login.refresh_token).as_str().to_string()));
    assert!(stored.contains(&fingerprint(&rotated.refresh_token).as_str().to_string()));
}

#[tokio::test]
async fn rotation_carries_subject_and_origin_forward() {
    let (pool, lifecycle) = test_lifecycle().await;
    let login = lifecycle.issue_login(99, origin()).await.unwrap();
    let rotated = lifecycle.rotate(&login.refresh_token).await.unwrap();

    let old = refresh_token::find_by_fingerprint(&pool, &fingerprint(&login.refresh_token))
        .await
        .unwrap()
        .unwrap();
    let new = refresh_token::find_active(&pool, &fingerprint(&rotated.refresh_token))
        .await
        .unwrap()
        .expect("Successor should be active");

    assert!(old.is_revoked());
    assert_eq!(new.subject_id, 99);
    assert_eq!(new.origin, origin());
    assert!(new.expires_at > Utc::now() + Duration::days(29));
    assert_eq!(new.expires_at - new.issued_at, lifecycle.refresh_ttl());
}

#[tokio::test]
async fn expired_refresh_token_cannot_be_rotated() {
    let (pool, lifecycle) = test_lifecycle().await;
    let login = lifecycle.issue_login(42, origin()).await.unwrap();

    sqlx::query("UPDATE refresh_tokens SET expires_at = NOW() - INTERVAL '1 second'")
        .execute(&pool)
        .await
        .unwrap();

    assert!(matches!(
        lifecycle.rotate(&login.refresh_token).await,
        Err(AuthError::TokenNotFound)
    ));
}

#[tokio::test]
async fn contended_lock_times_out_and_leaves_state_unchanged() {
    let (pool, _) = test_lifecycle().await;
    let mut settings = test_auth_settings();
    settings.lock_timeout_ms = 100;
    let lifecycle = TokenLifecycle::new(pool.clone(), &settings);

    let login = lifecycle.issue_login(42, origin()).await.unwrap();
    let fp = fingerprint(&login.refresh_token);

    let mut holder = pool.begin().await.unwrap();
    refresh_token::find_active_for_update(&mut *holder, &fp)
        .await
        .unwrap()
        .expect("Row should be lockable");

    let blocked = lifecycle.rotate(&login.refresh_token).await;
    assert!(matches!(blocked, Err(AuthError::Store(StoreError::LockTimeout))));

    holder.rollback().await.unwrap();

    // Nothing was revoked, so the same secret still rotates
    assert!(lifecycle.rotate(&login.refresh_token).await.is_ok());
}

#[tokio::test]
async fn access_verification_never_touches_the_store() {
    let (pool, lifecycle) = test_lifecycle().await;
    let login = lifecycle.issue_login(42, origin()).await.unwrap();

    pool.close().await;

    assert_eq!(lifecycle.verify_access(&login.access_token).unwrap(), 42);
    assert!(matches!(
        lifecycle.rotate(&login.refresh_token).await,
        Err(AuthError::Store(StoreError::Unavailable(_)))
    ));
}

#[tokio::test]
async fn access_token_from_six_minutes_ago_is_expired() {
    let (_pool, lifecycle) = test_lifecycle().await;
    let stale = lifecycle
        .codec()
        .sign_at(42, Utc::now() - Duration::minutes(6))
        .unwrap();

    assert!(matches!(
        lifecycle.verify_access(&stale),
        Err(AuthError::AccessToken(AccessTokenError::Expired))
    ));
}

#[tokio::test]
async fn revoke_all_ends_every_session_of_a_subject() {
    let (_pool, lifecycle) = test_lifecycle().await;
    let phone = lifecycle.issue_login(42, origin()).await.unwrap();
    let laptop = lifecycle.issue_login(42, origin()).await.unwrap();
    let other = lifecycle.issue_login(43, origin()).await.unwrap();

    assert_eq!(lifecycle.revoke_all(42).await.unwrap(), 2);

    assert!(matches!(lifecycle.rotate(&phone.refresh_token).await, Err(AuthError::TokenNotFound)));
    assert!(matches!(lifecycle.rotate(&laptop.refresh_token).await, Err(AuthError::TokenNotFound)));
    assert!(lifecycle.rotate(&other.refresh_token).await.is_ok());
}

#[tokio::test]
async fn sweep_removes_rotated_rows_once_expired() {
    let (pool, lifecycle) = test_lifecycle().await;
    let login = lifecycle.issue_login(42, origin()).await.unwrap();
    lifecycle.rotate(&login.refresh_token).await.unwrap();

    assert_eq!(lifecycle.sweep_expired().await.unwrap(), 0);

    sqlx::query("UPDATE refresh_tokens SET expires_at = NOW() - INTERVAL '1 minute'")
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(workout_tracker::sweeper::run_sweep(&lifecycle).await, 2);
}
