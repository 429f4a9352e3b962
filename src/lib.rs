pub mod features;
pub mod server;
pub mod shared;

use features::auth::{AuthMiddleware, SchedulerAuth, SessionManager};
use log::{error, info, warn};
use rusqlite::Connection;
use shared::config::{initialize_logging_system, load_environment_variables, AppConfig};
use shared::database::initialize_database;
use shared::errors::{AppError, AppResult};
use std::sync::{Arc, Mutex, MutexGuard};

/// アプリケーション状態（データベース接続と認証情報を保持）
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    /// 利用者向けAPIの認証
    pub auth: AuthMiddleware,
    /// スケジューラー呼び出しの認証
    pub scheduler: SchedulerAuth,
    pub config: AppConfig,
}

impl AppState {
    /// 新しいアプリケーション状態を作成する
    ///
    /// # 引数
    /// * `conn` - テーブル作成済みのデータベース接続
    /// * `config` - サーバー設定
    pub fn new(conn: Connection, config: AppConfig) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let session_manager = SessionManager::new(Arc::clone(&db), &config.session_encryption_key);

        Self {
            auth: AuthMiddleware::new(Arc::new(session_manager)),
            scheduler: SchedulerAuth::new(config.cron_secret.as_deref()),
            db,
            config,
        }
    }

    /// データベース接続のロックを取得する
    pub fn lock_db(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| AppError::concurrency(format!("データベースロックエラー: {e}")))
    }

    /// セッション管理への参照を取得する
    pub fn sessions(&self) -> &SessionManager {
        self.auth.session_manager()
    }
}

/// 環境変数とログを初期化し、設定を読み込む
///
/// 本番環境で設定の検証に失敗した場合は起動を中止する。
/// 開発環境では警告を出して続行する。
pub fn initialize_app() -> AppResult<AppConfig> {
    load_environment_variables();
    initialize_logging_system();

    info!("アプリケーション初期化を開始します...");

    let config = AppConfig::from_env()?;

    if let Err(e) = config.validate() {
        error!("設定の検証に失敗しました: {e}");
        if config.env.is_production() {
            return Err(e);
        }
        warn!("開発環境のため、設定エラーを無視して続行します");
    }

    info!("システム診断情報: {:?}", config.get_debug_info());
    Ok(config)
}

/// データベースを開いてアプリケーション状態を作成する
pub fn open_state(config: AppConfig) -> AppResult<AppState> {
    info!("データベースを初期化しています...");
    let conn = initialize_database(&config.database_path).map_err(|e| {
        error!("データベースの初期化に失敗しました: {e}");
        e
    })?;
    info!("データベースの初期化が完了しました");

    Ok(AppState::new(conn, config))
}
