use super::models::{BillingCycle, Subscription, SubscriptionStatus};
use chrono::{Days, Months, NaiveDate};

/// 支払いサイクル1回分の期間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePeriod {
    Days(u64),
    Months(u32),
}

impl CyclePeriod {
    /// 支払いサイクルに対応する期間を取得する（custom は期間なし）
    pub fn of(cycle: BillingCycle) -> Option<Self> {
        match cycle {
            BillingCycle::Weekly => Some(CyclePeriod::Days(7)),
            BillingCycle::Monthly => Some(CyclePeriod::Months(1)),
            BillingCycle::Quarterly => Some(CyclePeriod::Months(3)),
            BillingCycle::Yearly => Some(CyclePeriod::Months(12)),
            BillingCycle::Custom => None,
        }
    }

    /// 1期間後の日付を求める
    ///
    /// 月単位の加算は対象月に同じ日がなければ月末日に丸める。
    /// 丸めた日付が次の起点になるため、1/31 → 2/29 → 3/29 と進む。
    pub fn next(&self, from: NaiveDate) -> Option<NaiveDate> {
        match *self {
            CyclePeriod::Days(days) => from.checked_add_days(Days::new(days)),
            CyclePeriod::Months(months) => from.checked_add_months(Months::new(months)),
        }
    }
}

/// 更新処理を行わなかった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 更新日がまだ来ていない
    NotDue,
    /// paused / canceled は対象外
    IneligibleStatus(SubscriptionStatus),
    /// 周期が定義されていないサイクル
    UnsupportedCycle(BillingCycle),
    /// 日付が表現可能な範囲を超えた
    DateOverflow,
}

/// 更新日の繰り越し結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advancement {
    Advanced {
        renewal_date: NaiveDate,
        status: SubscriptionStatus,
    },
    Skipped(SkipReason),
}

/// サブスクリプションの更新日を today より後の最初の日付まで繰り越す
///
/// # 引数
/// * `subscription` - 対象のサブスクリプション
/// * `today` - ジョブ実行日
///
/// # 戻り値
/// 新しい更新日と状態、または処理しなかった理由
///
/// # 処理内容
/// 1. active / trial 以外、custom サイクル、未到来の更新日は処理しない
/// 2. 保存されている更新日から1期間ずつ進め、today より後になった日付を採用する
/// 3. trial は active に切り替える（逆方向の遷移はない）
///
/// 1期間ずつ進めるため、毎日実行しても数日分まとめて実行しても結果は同じになる。
pub fn advance(subscription: &Subscription, today: NaiveDate) -> Advancement {
    advance_renewal(
        subscription.renewal_date,
        subscription.billing_cycle,
        subscription.status,
        today,
    )
}

/// [`advance`] の本体。レコード全体を必要としない呼び出し元向け。
pub fn advance_renewal(
    renewal_date: NaiveDate,
    cycle: BillingCycle,
    status: SubscriptionStatus,
    today: NaiveDate,
) -> Advancement {
    if !status.is_billable() {
        return Advancement::Skipped(SkipReason::IneligibleStatus(status));
    }

    if renewal_date > today {
        return Advancement::Skipped(SkipReason::NotDue);
    }

    let Some(period) = CyclePeriod::of(cycle) else {
        return Advancement::Skipped(SkipReason::UnsupportedCycle(cycle));
    };

    let mut next = renewal_date;
    while next <= today {
        next = match period.next(next) {
            Some(date) => date,
            None => return Advancement::Skipped(SkipReason::DateOverflow),
        };
    }

    Advancement::Advanced {
        renewal_date: next,
        status: SubscriptionStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn advanced_date(result: Advancement) -> NaiveDate {
        match result {
            Advancement::Advanced { renewal_date, .. } => renewal_date,
            other => panic!("更新されるべきところがスキップされました: {other:?}"),
        }
    }

    #[test]
    fn test_monthly_catch_up_example() {
        // 2024-01-01 起点、2024-04-15 実行 → 2024-05-01
        let result = advance_renewal(
            date(2024, 1, 1),
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 4, 15),
        );

        assert_eq!(
            result,
            Advancement::Advanced {
                renewal_date: date(2024, 5, 1),
                status: SubscriptionStatus::Active,
            }
        );
    }

    #[test]
    fn test_due_today_moves_one_period() {
        let today = date(2024, 3, 10);
        for (cycle, expected) in [
            (BillingCycle::Weekly, date(2024, 3, 17)),
            (BillingCycle::Monthly, date(2024, 4, 10)),
            (BillingCycle::Quarterly, date(2024, 6, 10)),
            (BillingCycle::Yearly, date(2025, 3, 10)),
        ] {
            let result = advance_renewal(today, cycle, SubscriptionStatus::Active, today);
            assert_eq!(advanced_date(result), expected, "cycle={cycle}");
        }
    }

    #[test]
    fn test_weekly_many_missed_cycles() {
        // 10週以上ジョブが止まっていた場合でも一回で追いつく
        let result = advance_renewal(
            date(2024, 1, 1),
            BillingCycle::Weekly,
            SubscriptionStatus::Active,
            date(2024, 3, 15),
        );
        // 2024-01-01 + 11週 = 2024-03-18
        assert_eq!(advanced_date(result), date(2024, 3, 18));
    }

    #[test]
    fn test_quarterly_and_yearly_catch_up() {
        let quarterly = advance_renewal(
            date(2022, 11, 30),
            BillingCycle::Quarterly,
            SubscriptionStatus::Active,
            date(2024, 2, 29),
        );
        // 2022-11-30 → 2023-02-28（月末丸め）以降は28日で進む
        // 2024-02-28 は today 以前なので、さらに3か月後
        assert_eq!(advanced_date(quarterly), date(2024, 5, 28));

        let yearly = advance_renewal(
            date(2020, 2, 29),
            BillingCycle::Yearly,
            SubscriptionStatus::Active,
            date(2023, 6, 1),
        );
        // 2021-02-28 に丸められた後は28日のまま
        assert_eq!(advanced_date(yearly), date(2024, 2, 28));
    }

    #[test]
    fn test_month_end_clamping() {
        // 1/31 + 1か月 → 2/29（うるう年）
        let feb = advance_renewal(
            date(2024, 1, 31),
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 2, 15),
        );
        assert_eq!(advanced_date(feb), date(2024, 2, 29));

        // 丸めた日付から次の期間を数えるため、3月は29日
        let mar = advance_renewal(
            date(2024, 1, 31),
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 3, 5),
        );
        assert_eq!(advanced_date(mar), date(2024, 3, 29));

        // 2/29 に保存された後の実行でも同じ日付になる
        let stepwise = advance_renewal(
            advanced_date(feb),
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 3, 5),
        );
        assert_eq!(advanced_date(stepwise), date(2024, 3, 29));

        // 平年の2月
        let feb_common = advance_renewal(
            date(2023, 1, 31),
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2023, 2, 1),
        );
        assert_eq!(advanced_date(feb_common), date(2023, 2, 28));
    }

    #[test]
    fn test_trial_becomes_active() {
        let result = advance_renewal(
            date(2024, 1, 1),
            BillingCycle::Monthly,
            SubscriptionStatus::Trial,
            date(2024, 1, 1),
        );

        assert_eq!(
            result,
            Advancement::Advanced {
                renewal_date: date(2024, 2, 1),
                status: SubscriptionStatus::Active,
            }
        );
    }

    #[test]
    fn test_ineligible_statuses_are_never_advanced() {
        for status in [SubscriptionStatus::Paused, SubscriptionStatus::Canceled] {
            let result = advance_renewal(
                date(2020, 1, 1),
                BillingCycle::Monthly,
                status,
                date(2024, 1, 1),
            );
            assert_eq!(
                result,
                Advancement::Skipped(SkipReason::IneligibleStatus(status))
            );
        }
    }

    #[test]
    fn test_custom_cycle_is_never_advanced() {
        let result = advance_renewal(
            date(1990, 1, 1),
            BillingCycle::Custom,
            SubscriptionStatus::Trial,
            date(2024, 1, 1),
        );
        assert_eq!(
            result,
            Advancement::Skipped(SkipReason::UnsupportedCycle(BillingCycle::Custom))
        );
    }

    #[test]
    fn test_future_date_is_not_due() {
        let result = advance_renewal(
            date(2024, 5, 1),
            BillingCycle::Monthly,
            SubscriptionStatus::Active,
            date(2024, 4, 15),
        );
        assert_eq!(result, Advancement::Skipped(SkipReason::NotDue));
    }

    #[test]
    fn test_second_call_same_day_is_noop() {
        let today = date(2024, 4, 15);
        let first = advance_renewal(
            date(2024, 1, 1),
            BillingCycle::Monthly,
            SubscriptionStatus::Trial,
            today,
        );
        let Advancement::Advanced { renewal_date, status } = first else {
            panic!("最初の呼び出しで更新されるべきです");
        };

        let second = advance_renewal(renewal_date, BillingCycle::Monthly, status, today);
        assert_eq!(second, Advancement::Skipped(SkipReason::NotDue));
    }

    #[test]
    fn test_cycle_period_next_overflow() {
        assert_eq!(CyclePeriod::Months(12).next(NaiveDate::MAX), None);
        assert_eq!(CyclePeriod::Days(7).next(NaiveDate::MAX), None);
        assert_eq!(
            advance_renewal(
                NaiveDate::MAX,
                BillingCycle::Weekly,
                SubscriptionStatus::Active,
                NaiveDate::MAX,
            ),
            Advancement::Skipped(SkipReason::DateOverflow)
        );
    }

    #[derive(Debug, Clone)]
    struct DueCase {
        renewal_date: NaiveDate,
        today: NaiveDate,
        cycle: BillingCycle,
        status: SubscriptionStatus,
    }

    impl Arbitrary for DueCase {
        fn arbitrary(g: &mut Gen) -> Self {
            let base = date(1990, 1, 1);
            let start = base + Days::new(u64::from(u32::arbitrary(g) % 40_000));
            let today = start + Days::new(u64::from(u32::arbitrary(g) % 5_000));
            let cycle = *g
                .choose(&[
                    BillingCycle::Weekly,
                    BillingCycle::Monthly,
                    BillingCycle::Quarterly,
                    BillingCycle::Yearly,
                ])
                .unwrap();
            let status = *g
                .choose(&[SubscriptionStatus::Active, SubscriptionStatus::Trial])
                .unwrap();

            Self {
                renewal_date: start,
                today,
                cycle,
                status,
            }
        }
    }

    /// 結果は保存日から1期間ずつ進めた列の上にあり、today より後で、直前の日付は today 以前
    #[quickcheck]
    fn prop_result_is_first_chained_date_after_today(case: DueCase) -> bool {
        let period = CyclePeriod::of(case.cycle).unwrap();
        match advance_renewal(case.renewal_date, case.cycle, case.status, case.today) {
            Advancement::Advanced {
                renewal_date,
                status,
            } => {
                let mut previous = case.renewal_date;
                let mut current = period.next(previous).unwrap();
                while current < renewal_date {
                    previous = current;
                    current = period.next(current).unwrap();
                }

                current == renewal_date
                    && renewal_date > case.today
                    && previous <= case.today
                    && status == SubscriptionStatus::Active
            }
            Advancement::Skipped(_) => false,
        }
    }

    /// 途中の日に一度実行してから today に実行しても、today に一度だけ実行しても結果は同じ
    #[quickcheck]
    fn prop_result_does_not_depend_on_run_cadence(case: DueCase, offset: u16) -> bool {
        let span = (case.today - case.renewal_date).num_days() as u64;
        let midpoint = case.renewal_date + Days::new(u64::from(offset) % (span + 1));

        let direct = advance_renewal(case.renewal_date, case.cycle, case.status, case.today);

        let first = advance_renewal(case.renewal_date, case.cycle, case.status, midpoint);
        let stepwise = match first {
            Advancement::Advanced {
                renewal_date,
                status,
            } if renewal_date <= case.today => {
                advance_renewal(renewal_date, case.cycle, status, case.today)
            }
            other => other,
        };

        direct == stepwise
    }

    /// 同じ日に二度実行しても二重に繰り越さない
    #[quickcheck]
    fn prop_advance_is_idempotent(case: DueCase) -> bool {
        match advance_renewal(case.renewal_date, case.cycle, case.status, case.today) {
            Advancement::Advanced {
                renewal_date,
                status,
            } => {
                advance_renewal(renewal_date, case.cycle, status, case.today)
                    == Advancement::Skipped(SkipReason::NotDue)
            }
            Advancement::Skipped(_) => false,
        }
    }
}
