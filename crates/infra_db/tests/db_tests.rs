//! Integration tests for infra_db
//!
//! These run against a PostgreSQL testcontainer and are ignored by default.

use std::sync::Arc;

use chrono::Utc;
use core_kernel::{ExpenseId, HealthCheckable};
use domain_expense::{
    ApprovalAuthority, ApprovalConfig, ExpenseQuery, ExpenseStatus, ExpenseStore, UserDirectory,
};
use infra_db::{PgExpenseStore, PgUserDirectory};
use test_utils::{
    assert_awaiting_export, assert_exported, assert_pending, assert_reviewed, db_test,
    ExpenseBuilder, Team,
};

async fn seed(pool: &sqlx::PgPool) -> (Team, PgExpenseStore, PgUserDirectory) {
    let team = Team::new();
    let users = PgUserDirectory::new(pool.clone());
    for user in team.all() {
        users.insert(&user).await.unwrap();
    }
    (team, PgExpenseStore::new(pool.clone()), users)
}

mod store_tests {
    use super::*;

    db_test!(test_insert_and_get_round_trip, |pool| {
        let (team, store, _) = seed(&pool).await;
        let expense = ExpenseBuilder::new(team.alice.id)
            .receipt("lunch.pdf")
            .build();

        store.insert(&expense).await.unwrap();
        let loaded = store.get(expense.id).await.unwrap();

        assert_eq!(loaded.description, expense.description);
        assert_eq!(loaded.amount, expense.amount);
        assert_eq!(loaded.receipt, expense.receipt);
        assert_pending(&loaded);
    });

    db_test!(test_get_unknown_is_not_found, |pool| {
        let (_, store, _) = seed(&pool).await;
        let err = store.get(ExpenseId::new_v7()).await.unwrap_err();
        assert!(err.is_not_found());
    });

    db_test!(test_pending_query_is_newest_first_and_scoped, |pool| {
        let (team, store, _) = seed(&pool).await;
        let first = ExpenseBuilder::new(team.alice.id).description("first").build();
        let second = ExpenseBuilder::new(team.bob.id).description("second").build();
        let outsider = ExpenseBuilder::new(team.loner.id).description("outsider").build();
        for e in [&first, &second, &outsider] {
            store.insert(e).await.unwrap();
        }

        let pending = store
            .find(ExpenseQuery::pending().for_claimants(vec![team.alice.id, team.bob.id]))
            .await
            .unwrap();

        let ids: Vec<_> = pending.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    });

    db_test!(test_transition_is_compare_and_set, |pool| {
        let (team, store, _) = seed(&pool).await;
        let expense = ExpenseBuilder::new(team.alice.id).build();
        store.insert(&expense).await.unwrap();

        let mut approved = expense.clone();
        approved.approve(team.manager.id, Some("fine"), Utc::now()).unwrap();
        let mut rejected = expense.clone();
        rejected.reject(team.finance.id, "late", Utc::now()).unwrap();

        store.transition(&approved).await.unwrap();
        let err = store.transition(&rejected).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get(expense.id).await.unwrap();
        assert_reviewed(&stored, ExpenseStatus::Approved, team.manager.id);
    });

    db_test!(test_reviewed_expense_cannot_be_edited_or_deleted, |pool| {
        let (team, store, _) = seed(&pool).await;
        let expense = ExpenseBuilder::new(team.alice.id).build();
        store.insert(&expense).await.unwrap();

        let mut rejected = expense.clone();
        rejected.reject(team.manager.id, "no receipt", Utc::now()).unwrap();
        store.transition(&rejected).await.unwrap();

        assert!(store.update_pending(&expense).await.unwrap_err().is_conflict());
        assert!(store.delete_pending(expense.id).await.unwrap_err().is_conflict());
        assert!(store.delete_pending(ExpenseId::new_v7()).await.unwrap_err().is_not_found());
    });

    db_test!(test_stage_and_mark_exported, |pool| {
        let (team, store, _) = seed(&pool).await;
        let approved = ExpenseBuilder::new(team.alice.id)
            .approved_by(team.manager.id)
            .build();
        let pending = ExpenseBuilder::new(team.alice.id).build();
        store.insert(&approved).await.unwrap();
        store.insert(&pending).await.unwrap();

        let ids = [approved.id, pending.id];
        let staged = store.stage_export_batch(&ids, "EXP-batch").await.unwrap();
        assert_eq!(staged, vec![approved.id]);
        assert!(store.stage_export_batch(&ids, "EXP-other").await.unwrap().is_empty());

        let awaiting = store.find(ExpenseQuery::awaiting_export()).await.unwrap();
        assert_eq!(awaiting.len(), 1);
        assert_awaiting_export(&awaiting[0]);
        assert_eq!(awaiting[0].export_batch.as_deref(), Some("EXP-batch"));

        let marked = store.mark_exported(&ids, "BILL-7").await.unwrap();
        assert_eq!(marked, vec![approved.id]);
        assert!(store.mark_exported(&ids, "BILL-8").await.unwrap().is_empty());

        assert_exported(&store.get(approved.id).await.unwrap(), "BILL-7");
        assert!(store.find(ExpenseQuery::awaiting_export()).await.unwrap().is_empty());
    });

    db_test!(test_health_check, |pool| {
        let (_, store, _) = seed(&pool).await;
        assert!(store.health_check().await.is_healthy());
    });
}

mod directory_tests {
    use super::*;

    db_test!(test_team_members_and_lookup, |pool| {
        let (team, _, users) = seed(&pool).await;

        let members = users.team_members(team.manager.id).await.unwrap();
        let names: Vec<_> = members.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Alice Adams", "Bob Brown"]);

        assert_eq!(users.get_user(team.loner.id).await.unwrap(), Some(team.loner.clone()));
        assert!(users.team_members(team.loner.id).await.unwrap().is_empty());
    });

    db_test!(test_concurrent_reviews_have_one_winner, |pool| {
        let (team, store, users) = seed(&pool).await;
        let expense = ExpenseBuilder::new(team.alice.id).build();
        store.insert(&expense).await.unwrap();

        let authority = ApprovalAuthority::new(
            Arc::new(store.clone()),
            Arc::new(users),
            ApprovalConfig::default(),
        );
        let manager = team.manager.as_actor();
        let finance = team.finance.as_actor();

        let (approve, reject) = tokio::join!(
            authority.approve(&manager, expense.id, None),
            authority.reject(&finance, expense.id, "duplicate"),
        );
        assert!(approve.is_ok() ^ reject.is_ok());

        let stored = store.get(expense.id).await.unwrap();
        assert_ne!(stored.status, ExpenseStatus::Pending);
    });
}
