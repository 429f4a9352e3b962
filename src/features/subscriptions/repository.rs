use super::models::{NewSubscription, Subscription, SubscriptionStatus, UpdateSubscriptionDto};
use crate::shared::errors::{AppError, AppResult};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SELECT_COLUMNS: &str = "SELECT id, owner_id, service, plan, amount, billing_cycle, status, renewal_date, created_at, updated_at
     FROM subscriptions";

/// 行をサブスクリプションに変換する
fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        service: row.get(2)?,
        plan: row.get(3)?,
        amount: row.get(4)?,
        billing_cycle: row.get(5)?,
        status: row.get(6)?,
        renewal_date: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn not_found(id: &str) -> AppError {
    AppError::not_found(format!("ID {id} のサブスクリプション"))
}

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `owner_id` - 所有者ID
/// * `new` - 検証済みの入力値
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create(conn: &Connection, owner_id: &str, new: NewSubscription) -> AppResult<Subscription> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO subscriptions (id, owner_id, service, plan, amount, billing_cycle, status, renewal_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id,
            owner_id,
            new.service,
            new.plan,
            new.amount,
            new.billing_cycle,
            new.status,
            new.renewal_date,
            now,
            now
        ],
    )?;

    log::info!("サブスクリプションを作成しました: id={id}, owner_id={owner_id}");
    find_by_id(conn, owner_id, &id)
}

/// IDでサブスクリプションを取得する
///
/// 他の所有者のサブスクリプションは存在しないものとして扱う。
///
/// # 引数
/// * `conn` - データベース接続
/// * `owner_id` - 所有者ID
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、または失敗時はエラー
pub fn find_by_id(conn: &Connection, owner_id: &str, id: &str) -> AppResult<Subscription> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1 AND owner_id = ?2"),
        params![id, owner_id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| not_found(id))
}

/// サブスクリプション一覧を取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `owner_id` - 所有者ID
/// * `status` - 指定した場合はその状態のみを取得
///
/// # 戻り値
/// 更新日順のサブスクリプションのリスト、または失敗時はエラー
pub fn find_all(
    conn: &Connection,
    owner_id: &str,
    status: Option<SubscriptionStatus>,
) -> AppResult<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS}
         WHERE owner_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY renewal_date, service"
    ))?;

    let subscriptions = stmt
        .query_map(params![owner_id, status], map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(subscriptions)
}

/// 指定期間内に更新日を迎える課金中のサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `owner_id` - 所有者ID
/// * `start` - 期間の開始日（この日を含む）
/// * `end` - 期間の終了日（この日を含む）
pub fn find_renewing_between(
    conn: &Connection,
    owner_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS}
         WHERE owner_id = ?1
           AND renewal_date BETWEEN ?2 AND ?3
           AND status IN ('active', 'trial')
         ORDER BY renewal_date, service"
    ))?;

    let subscriptions = stmt
        .query_map(params![owner_id, start, end], map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(subscriptions)
}

/// サブスクリプションを部分更新する
///
/// # 引数
/// * `conn` - データベース接続
/// * `owner_id` - 所有者ID
/// * `id` - サブスクリプションID
/// * `dto` - 更新するフィールド
///
/// # 戻り値
/// 更新されたサブスクリプション、または失敗時はエラー
pub fn update(
    conn: &Connection,
    owner_id: &str,
    id: &str,
    dto: UpdateSubscriptionDto,
) -> AppResult<Subscription> {
    let now = Utc::now().to_rfc3339();

    // 既存のサブスクリプションを取得（所有者が異なる場合はNotFound）
    let existing = find_by_id(conn, owner_id, id)?;

    let service = dto.service.unwrap_or(existing.service);
    let plan = dto.plan.unwrap_or(existing.plan);
    let amount = dto.amount.unwrap_or(existing.amount);
    let billing_cycle = dto.billing_cycle.unwrap_or(existing.billing_cycle);
    let status = dto.status.unwrap_or(existing.status);
    let renewal_date = dto.renewal_date.unwrap_or(existing.renewal_date);

    let rows_affected = conn.execute(
        "UPDATE subscriptions
         SET service = ?1, plan = ?2, amount = ?3, billing_cycle = ?4, status = ?5, renewal_date = ?6, updated_at = ?7
         WHERE id = ?8 AND owner_id = ?9",
        params![
            service,
            plan,
            amount,
            billing_cycle,
            status,
            renewal_date,
            now,
            id,
            owner_id
        ],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    log::info!("サブスクリプションを更新しました: id={id}, owner_id={owner_id}");
    find_by_id(conn, owner_id, id)
}

/// サブスクリプションを削除する
///
/// # 引数
/// * `conn` - データベース接続
/// * `owner_id` - 所有者ID
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// 成功時はOk(())、該当がない場合はNotFound
pub fn delete(conn: &Connection, owner_id: &str, id: &str) -> AppResult<()> {
    let rows_affected = conn.execute(
        "DELETE FROM subscriptions WHERE id = ?1 AND owner_id = ?2",
        params![id, owner_id],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    log::info!("サブスクリプションを削除しました: id={id}, owner_id={owner_id}");
    Ok(())
}

/// 更新日が到来した課金中のサブスクリプションを全所有者分取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `today` - 基準日（この日以前の更新日が対象）
pub fn find_due(conn: &Connection, today: NaiveDate) -> AppResult<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS}
         WHERE renewal_date <= ?1 AND status IN ('active', 'trial')
         ORDER BY renewal_date, id"
    ))?;

    let subscriptions = stmt
        .query_map(params![today], map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(subscriptions)
}

/// 読み取り時の値と一致する場合のみ更新日と状態を書き換える
///
/// 並行して実行された別のジョブが先に繰り越していた場合は何もしない。
///
/// # 引数
/// * `conn` - データベース接続
/// * `current` - 読み取り時のサブスクリプション
/// * `renewal_date` - 新しい更新日
/// * `status` - 新しい状態
///
/// # 戻り値
/// 書き換えた場合はtrue、競合により書き換えなかった場合はfalse
pub fn apply_renewal(
    conn: &Connection,
    current: &Subscription,
    renewal_date: NaiveDate,
    status: SubscriptionStatus,
) -> AppResult<bool> {
    let now = Utc::now().to_rfc3339();

    let rows_affected = conn.execute(
        "UPDATE subscriptions
         SET renewal_date = ?1, status = ?2, updated_at = ?3
         WHERE id = ?4 AND renewal_date = ?5 AND status = ?6",
        params![
            renewal_date,
            status,
            now,
            current.id,
            current.renewal_date,
            current.status
        ],
    )?;

    Ok(rows_affected == 1)
}
