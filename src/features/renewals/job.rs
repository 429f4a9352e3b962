use crate::features::subscriptions::models::{Subscription, SubscriptionStatus};
use crate::features::subscriptions::renewal::{advance, Advancement, SkipReason};
use crate::features::subscriptions::repository;
use crate::shared::errors::AppResult;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

/// 1件分の繰り越し結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// 更新日を繰り越した
    Advanced {
        renewal_date: NaiveDate,
        status: SubscriptionStatus,
    },
    /// 対象外のため何もしなかった
    Skipped(SkipReason),
    /// 読み取り後に別の実行が先に書き換えていた
    Conflict,
}

/// 繰り越しジョブの実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
    /// 更新日が到来していた件数
    pub due: usize,
    /// 繰り越した件数
    pub advanced: usize,
    /// 対象外だった件数
    pub skipped: usize,
    /// 競合により書き込まなかった件数
    pub conflicts: usize,
    /// 書き込みに失敗した件数
    pub failed: usize,
}

impl RenewalReport {
    fn record(&mut self, outcome: RenewalOutcome) {
        match outcome {
            RenewalOutcome::Advanced { .. } => self.advanced += 1,
            RenewalOutcome::Skipped(_) => self.skipped += 1,
            RenewalOutcome::Conflict => self.conflicts += 1,
        }
    }
}

/// 1件のサブスクリプションの更新日を繰り越す
///
/// 書き込みは読み取り時の更新日と状態が変わっていない場合のみ行う。
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - 読み取り時のサブスクリプション
/// * `today` - ジョブ実行日
pub fn renew_subscription(
    conn: &Connection,
    subscription: &Subscription,
    today: NaiveDate,
) -> AppResult<RenewalOutcome> {
    match advance(subscription, today) {
        Advancement::Skipped(reason) => Ok(RenewalOutcome::Skipped(reason)),
        Advancement::Advanced {
            renewal_date,
            status,
        } => {
            if repository::apply_renewal(conn, subscription, renewal_date, status)? {
                log::debug!(
                    "更新日を繰り越しました: id={}, {} -> {}",
                    subscription.id,
                    subscription.renewal_date,
                    renewal_date
                );
                Ok(RenewalOutcome::Advanced {
                    renewal_date,
                    status,
                })
            } else {
                log::info!(
                    "別の実行で更新済みのためスキップしました: id={}",
                    subscription.id
                );
                Ok(RenewalOutcome::Conflict)
            }
        }
    }
}

/// 更新日が到来したすべてのサブスクリプションを繰り越す
///
/// 1件の書き込み失敗はログに記録して件数に数え、残りの処理を続ける。
/// 対象の取得に失敗した場合のみ全体をエラーとする。
///
/// # 引数
/// * `conn` - データベース接続
/// * `today` - ジョブ実行日
///
/// # 戻り値
/// 実行結果の集計
pub fn run_renewal_pass(conn: &Connection, today: NaiveDate) -> AppResult<RenewalReport> {
    let due = repository::find_due(conn, today)?;

    log::info!("更新日の繰り越しを開始します: today={today}, 対象={}件", due.len());

    let mut report = RenewalReport {
        due: due.len(),
        ..Default::default()
    };

    for subscription in &due {
        match renew_subscription(conn, subscription, today) {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                log::error!(
                    "更新日の繰り越しに失敗しました: id={}, error={}",
                    subscription.id,
                    e.details()
                );
                report.failed += 1;
            }
        }
    }

    log::info!(
        "更新日の繰り越しが完了しました: 繰り越し={}件, スキップ={}件, 競合={}件, 失敗={}件",
        report.advanced,
        report.skipped,
        report.conflicts,
        report.failed
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::models::{BillingCycle, NewSubscription};
    use crate::shared::database::{create_in_memory_connection, create_tables};
    use crate::shared::errors::AppError;

    fn create_test_db() -> Connection {
        let conn = create_in_memory_connection().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn insert(
        conn: &Connection,
        owner: &str,
        service: &str,
        cycle: BillingCycle,
        status: SubscriptionStatus,
        renewal_date: NaiveDate,
    ) -> Subscription {
        repository::create(
            conn,
            owner,
            NewSubscription {
                service: service.to_string(),
                plan: None,
                amount: 10.0,
                billing_cycle: cycle,
                status,
                renewal_date,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_pass_advances_overdue_records_across_owners() {
        let conn = create_test_db();
        let today = date(2024, 4, 15);

        let monthly = insert(
            &conn,
            "alice",
            "Monthly",
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 1, 1),
        );
        let trial = insert(
            &conn,
            "bob",
            "Trial",
            BillingCycle::Weekly,
            SubscriptionStatus::Trial,
            date(2024, 4, 15),
        );
        let custom = insert(
            &conn,
            "bob",
            "Custom",
            BillingCycle::Custom,
            SubscriptionStatus::Active,
            date(2024, 1, 1),
        );
        insert(
            &conn,
            "alice",
            "Paused",
            BillingCycle::Monthly,
            SubscriptionStatus::Paused,
            date(2024, 1, 1),
        );
        insert(
            &conn,
            "alice",
            "Future",
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 4, 16),
        );

        let report = run_renewal_pass(&conn, today).unwrap();
        assert_eq!(
            report,
            RenewalReport {
                due: 3,
                advanced: 2,
                skipped: 1,
                conflicts: 0,
                failed: 0,
            }
        );

        let monthly = repository::find_by_id(&conn, "alice", &monthly.id).unwrap();
        assert_eq!(monthly.renewal_date, date(2024, 5, 1));

        let trial = repository::find_by_id(&conn, "bob", &trial.id).unwrap();
        assert_eq!(trial.renewal_date, date(2024, 4, 22));
        assert_eq!(trial.status, SubscriptionStatus::Active);

        // custom は変更されない
        let custom = repository::find_by_id(&conn, "bob", &custom.id).unwrap();
        assert_eq!(custom.renewal_date, date(2024, 1, 1));
    }

    #[test]
    fn test_second_pass_same_day_advances_nothing() {
        let conn = create_test_db();
        let today = date(2024, 4, 15);
        insert(
            &conn,
            "alice",
            "A",
            BillingCycle::Monthly,
            SubscriptionStatus::Trial,
            date(2024, 1, 1),
        );
        insert(
            &conn,
            "alice",
            "B",
            BillingCycle::Yearly,
            SubscriptionStatus::Active,
            date(2020, 2, 29),
        );

        assert_eq!(run_renewal_pass(&conn, today).unwrap().advanced, 2);

        let second = run_renewal_pass(&conn, today).unwrap();
        assert_eq!(second.due, 0);
        assert_eq!(second.advanced, 0);
    }

    #[test]
    fn test_month_end_result_is_the_same_for_daily_and_catch_up_runs() {
        let conn = create_test_db();

        // 毎月1日に実行される記録
        let stepwise = insert(
            &conn,
            "alice",
            "Stepwise",
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 1, 31),
        );
        assert_eq!(run_renewal_pass(&conn, date(2024, 2, 1)).unwrap().advanced, 1);
        assert_eq!(
            repository::find_by_id(&conn, "alice", &stepwise.id).unwrap().renewal_date,
            date(2024, 2, 29)
        );

        // 3月になって初めて実行される記録
        let catch_up = insert(
            &conn,
            "bob",
            "CatchUp",
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 1, 31),
        );
        assert_eq!(run_renewal_pass(&conn, date(2024, 3, 1)).unwrap().advanced, 2);

        let stepwise = repository::find_by_id(&conn, "alice", &stepwise.id).unwrap();
        let catch_up = repository::find_by_id(&conn, "bob", &catch_up.id).unwrap();
        assert_eq!(stepwise.renewal_date, date(2024, 3, 29));
        assert_eq!(catch_up.renewal_date, stepwise.renewal_date);
    }

    #[test]
    fn test_stale_snapshot_is_a_conflict() {
        let conn = create_test_db();
        let today = date(2024, 4, 15);
        let snapshot = insert(
            &conn,
            "alice",
            "A",
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 1, 1),
        );

        // 先行する実行が書き換える
        assert!(matches!(
            renew_subscription(&conn, &snapshot, today).unwrap(),
            RenewalOutcome::Advanced { .. }
        ));

        // 同じ読み取り値での二回目は競合となり、二重に繰り越さない
        assert_eq!(
            renew_subscription(&conn, &snapshot, today).unwrap(),
            RenewalOutcome::Conflict
        );
        let stored = repository::find_by_id(&conn, "alice", &snapshot.id).unwrap();
        assert_eq!(stored.renewal_date, date(2024, 5, 1));
    }

    #[test]
    fn test_one_failing_write_does_not_stop_the_batch() {
        let conn = create_test_db();
        let today = date(2024, 4, 15);

        let broken = insert(
            &conn,
            "alice",
            "Broken",
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 3, 1),
        );
        let healthy = insert(
            &conn,
            "alice",
            "Healthy",
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 3, 2),
        );

        conn.execute_batch(
            "CREATE TRIGGER reject_broken BEFORE UPDATE ON subscriptions
             WHEN OLD.service = 'Broken'
             BEGIN SELECT RAISE(ABORT, 'write rejected'); END;",
        )
        .unwrap();

        let report = run_renewal_pass(&conn, today).unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.failed, 1);

        assert_eq!(
            repository::find_by_id(&conn, "alice", &broken.id).unwrap().renewal_date,
            date(2024, 3, 1)
        );
        assert_eq!(
            repository::find_by_id(&conn, "alice", &healthy.id).unwrap().renewal_date,
            date(2024, 5, 2)
        );
    }

    #[test]
    fn test_selection_failure_fails_the_pass() {
        let conn = create_test_db();
        conn.execute_batch("DROP TABLE subscriptions").unwrap();

        assert!(matches!(
            run_renewal_pass(&conn, date(2024, 4, 15)),
            Err(AppError::Database(_))
        ));
    }
}
