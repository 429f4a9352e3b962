use crate::shared::errors::{AppError, AppResult};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::path::PathBuf;

/// 開発用のデフォルトセッション暗号化キー
const DEFAULT_SESSION_ENCRYPTION_KEY: &str = "default_32_byte_encryption_key_123";

/// デフォルトの待ち受けアドレス
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// アプリケーションデータディレクトリ名
const APP_DIR_NAME: &str = "subscription-tracker";

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 戻り値
    /// 環境設定
    pub fn from_env() -> Self {
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        Self {
            environment: format!("{environment:?}").to_lowercase(),
            debug_mode,
            log_level,
        }
    }

    /// プロダクション環境かどうかを判定
    ///
    /// # 戻り値
    /// プロダクション環境の場合はtrue
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 開発環境かどうかを判定
    ///
    /// # 戻り値
    /// 開発環境の場合はtrue
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

/// サーバー全体の設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 環境設定
    pub env: EnvironmentConfig,
    /// HTTPサーバーの待ち受けアドレス
    pub bind_address: SocketAddr,
    /// SQLiteデータベースファイルのパス
    pub database_path: PathBuf,
    /// スケジューラー（cron）用の共有シークレット
    pub cron_secret: Option<String>,
    /// セッショントークン暗号化キー
    pub session_encryption_key: String,
    /// 「今日」を判定するタイムゾーン
    pub timezone: Tz,
}

impl AppConfig {
    /// 環境変数からサーバー設定を読み込む
    ///
    /// # 戻り値
    /// サーバー設定、または値が不正な場合はエラー
    pub fn from_env() -> AppResult<Self> {
        log::debug!("AppConfig::from_env() - 環境変数の読み込みを開始");

        let env = EnvironmentConfig::from_env();

        let bind_address = std::env::var("BIND_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::configuration(format!("BIND_ADDRESS が不正です: {e}")))?;

        let database_path = match std::env::var("DATABASE_PATH") {
            Ok(path) => {
                log::debug!("実行時DATABASE_PATH が見つかりました: {path}");
                PathBuf::from(path)
            }
            Err(_) => default_database_path(&get_environment())?,
        };

        let cron_secret = std::env::var("CRON_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|val| {
                log::debug!("CRON_SECRET が見つかりました: {}", mask_secret(&val));
                val
            });

        if cron_secret.is_none() {
            log::warn!("CRON_SECRET が設定されていません。更新ジョブのHTTPトリガーはすべて拒否されます");
        }

        let session_encryption_key = std::env::var("SESSION_ENCRYPTION_KEY").unwrap_or_else(|_| {
            log::warn!("SESSION_ENCRYPTION_KEY が設定されていないため、デフォルト値を使用（本番環境では必ず設定してください）");
            DEFAULT_SESSION_ENCRYPTION_KEY.to_string()
        });

        let timezone = match std::env::var("APP_TIMEZONE") {
            Ok(name) => name
                .parse::<Tz>()
                .map_err(|e| AppError::configuration(format!("APP_TIMEZONE が不正です: {e}")))?,
            Err(_) => Tz::UTC,
        };

        log::debug!("AppConfig::from_env() - 設定の読み込みが完了しました");
        Ok(Self {
            env,
            bind_address,
            database_path,
            cron_secret,
            session_encryption_key,
            timezone,
        })
    }

    /// 設定を検証する
    ///
    /// # 戻り値
    /// 設定が有効な場合はOk(())、無効な場合はErr
    pub fn validate(&self) -> AppResult<()> {
        // セッション暗号化キーの長さをチェック（最低16バイト）
        if self.session_encryption_key.len() < 16 {
            return Err(AppError::configuration(
                "セッション暗号化キーは最低16文字以上である必要があります",
            ));
        }

        if let Some(secret) = &self.cron_secret {
            if secret.len() < 16 {
                return Err(AppError::configuration(
                    "CRON_SECRET は最低16文字以上である必要があります",
                ));
            }
        }

        if self.env.is_production() {
            if self.cron_secret.is_none() {
                return Err(AppError::configuration(
                    "本番環境では CRON_SECRET の設定が必須です",
                ));
            }
            if self.session_encryption_key == DEFAULT_SESSION_ENCRYPTION_KEY {
                return Err(AppError::configuration(
                    "本番環境ではデフォルトのセッション暗号化キーは使用できません",
                ));
            }
        }

        Ok(())
    }

    /// 設定タイムゾーンにおける今日の日付を取得する
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// デバッグ情報を取得
    ///
    /// # 戻り値
    /// デバッグ情報のマップ
    pub fn get_debug_info(&self) -> std::collections::HashMap<String, String> {
        let mut info = std::collections::HashMap::new();
        info.insert("environment".to_string(), self.env.environment.clone());
        info.insert("bind_address".to_string(), self.bind_address.to_string());
        info.insert(
            "database_path".to_string(),
            self.database_path.display().to_string(),
        );
        info.insert(
            "cron_secret".to_string(),
            self.cron_secret
                .as_deref()
                .map(mask_secret)
                .unwrap_or_else(|| "未設定".to_string()),
        );
        info.insert(
            "session_encryption_key_length".to_string(),
            self.session_encryption_key.len().to_string(),
        );
        info.insert("timezone".to_string(), self.timezone.name().to_string());
        info
    }
}

/// 現在の実行環境を判定する
///
/// # 戻り値
/// 現在の実行環境（Development または Production）
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    // フォールバック: ビルド設定に基づく判定
    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # 引数
/// * `env` - 実行環境
///
/// # 戻り値
/// データベースファイル名
///
/// # ファイル名の規則
/// - 開発環境: "dev_subscriptions.db"
/// - プロダクション環境: "subscriptions.db"
pub fn get_database_filename(env: &Environment) -> &'static str {
    match env {
        Environment::Development => "dev_subscriptions.db",
        Environment::Production => "subscriptions.db",
    }
}

/// ユーザーデータディレクトリ配下のデフォルトのデータベースパスを取得する
fn default_database_path(env: &Environment) -> AppResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        AppError::configuration("データディレクトリを特定できません。DATABASE_PATH を設定してください")
    })?;

    Ok(data_dir.join(APP_DIR_NAME).join(get_database_filename(env)))
}

/// 秘密情報をログ出力用にマスクする
fn mask_secret(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{visible}****")
}

/// 環境に応じた.envファイルを読み込む
///
/// # 処理内容
/// 1. ENVIRONMENT に応じた.envファイルを読み込み
/// 2. 見つからない場合はデフォルトの.envにフォールバック
pub fn load_environment_variables() {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    // 環境に応じた.envファイルのパスを決定
    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    log::info!("環境: {environment}, 読み込み対象: {env_file}");

    match dotenv::from_filename(env_file) {
        Ok(_) => {
            log::info!("{env_file}ファイルを読み込みました");
        }
        Err(_) => {
            if env_file != ".env" && dotenv::dotenv().is_ok() {
                log::warn!("{env_file}が見つからないため、デフォルトの.envファイルを読み込みました");
            } else {
                log::warn!(".envファイルが見つかりません。直接設定された環境変数を使用します。");
            }
        }
    }
}

/// ログシステムを初期化する
///
/// # 処理内容
/// 1. 環境設定を取得
/// 2. ログレベルを設定
/// 3. env_loggerを初期化
pub fn initialize_logging_system() {
    let env_config = EnvironmentConfig::from_env();

    let log_level = match env_config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    // 二重初期化はテストなどで起こり得るため無視する
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init();

    log::info!(
        "ログシステムを初期化しました: level={}, environment={}",
        env_config.log_level,
        env_config.environment
    );
}
