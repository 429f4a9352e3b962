use super::models::Subscription;
use super::repository;
use crate::shared::errors::{AppError, AppResult};
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

/// 更新予定一覧のデフォルト開始日数
pub const DEFAULT_FROM_DAYS: i64 = 3;

/// 更新予定一覧のデフォルト終了日数
pub const DEFAULT_TO_DAYS: i64 = 5;

/// 指定可能な最大日数
pub const MAX_WINDOW_DAYS: i64 = 366;

/// 今日から数えた更新予定の検索範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpcomingWindow {
    from_days: i64,
    to_days: i64,
}

impl Default for UpcomingWindow {
    fn default() -> Self {
        Self {
            from_days: DEFAULT_FROM_DAYS,
            to_days: DEFAULT_TO_DAYS,
        }
    }
}

impl UpcomingWindow {
    /// 検索範囲を作成する
    ///
    /// # 引数
    /// * `from_days` - 今日から何日後から（0以上）
    /// * `to_days` - 今日から何日後まで（`from_days`以上、366以下）
    pub fn new(from_days: i64, to_days: i64) -> AppResult<Self> {
        if from_days < 0 {
            return Err(AppError::validation("fromは0以上で指定してください"));
        }
        if from_days > to_days {
            return Err(AppError::validation("fromはto以下で指定してください"));
        }
        if to_days > MAX_WINDOW_DAYS {
            return Err(AppError::validation(format!(
                "toは{MAX_WINDOW_DAYS}以下で指定してください"
            )));
        }

        Ok(Self { from_days, to_days })
    }

    pub fn from_days(&self) -> i64 {
        self.from_days
    }

    pub fn to_days(&self) -> i64 {
        self.to_days
    }
}

/// 更新予定のサブスクリプション
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingRenewal {
    pub subscription: Subscription,
    /// 更新日までの日数
    pub days_away: i64,
}

/// 指定範囲内に更新日を迎える課金中のサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `owner_id` - 所有者ID
/// * `today` - 基準日
/// * `window` - 検索範囲
///
/// # 戻り値
/// 更新日順の更新予定リスト
pub fn find_upcoming(
    conn: &Connection,
    owner_id: &str,
    today: NaiveDate,
    window: UpcomingWindow,
) -> AppResult<Vec<UpcomingRenewal>> {
    let start = today + Duration::days(window.from_days);
    let end = today + Duration::days(window.to_days);

    let renewals = repository::find_renewing_between(conn, owner_id, start, end)?
        .into_iter()
        .map(|subscription| UpcomingRenewal {
            days_away: (subscription.renewal_date - today).num_days(),
            subscription,
        })
        .collect();

    Ok(renewals)
}
