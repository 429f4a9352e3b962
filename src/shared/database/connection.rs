use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::Path;

/// データベース接続を初期化し、テーブルを作成する
///
/// # 引数
/// * `database_path` - データベースファイルのパス
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. 親ディレクトリの確保
/// 2. データベース接続の開設
/// 3. テーブル作成の実行
pub fn initialize_database(database_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::configuration(format!("データディレクトリの作成に失敗: {e}"))
            })?;
            log::info!("データディレクトリを作成: {:?}", parent);
        }
    }

    let is_first_run = !database_path.exists();

    let conn = Connection::open(database_path)?;
    configure_connection(&conn)?;
    create_tables(&conn)?;

    if is_first_run {
        log::info!("新規データベースを作成しました: {:?}", database_path);
    } else {
        log::info!("既存データベースを使用します: {:?}", database_path);
    }

    Ok(conn)
}

/// テスト用のインメモリデータベース接続を作成する
pub fn create_in_memory_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// 接続単位のPRAGMAを設定する
fn configure_connection(conn: &Connection) -> AppResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// データベーステーブルを作成する
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    create_subscriptions_table(conn)?;
    create_sessions_table(conn)?;
    Ok(())
}

/// サブスクリプションテーブルを作成する
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            service TEXT NOT NULL CHECK(length(trim(service)) > 0),
            plan TEXT,
            amount REAL NOT NULL CHECK(amount > 0),
            billing_cycle TEXT NOT NULL DEFAULT 'monthly'
                CHECK(billing_cycle IN ('weekly', 'monthly', 'quarterly', 'yearly', 'custom')),
            status TEXT NOT NULL DEFAULT 'active'
                CHECK(status IN ('active', 'trial', 'paused', 'canceled')),
            renewal_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // 所有者ごとの一覧取得
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_owner ON subscriptions(owner_id)",
        [],
    )?;

    // 更新ジョブの対象抽出
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_renewal ON subscriptions(renewal_date, status)",
        [],
    )?;

    Ok(())
}

/// セッションテーブルを作成する
fn create_sessions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions(owner_id)",
        [],
    )?;

    Ok(())
}
