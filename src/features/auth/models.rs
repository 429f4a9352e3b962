use crate::shared::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 認証済みの利用者を表す構造体
///
/// 利用者IDは外部の認証基盤が発行する不透明な文字列として扱う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// 利用者ID
    pub id: String,
}

impl Owner {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// セッション情報を表す構造体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// セッションID
    pub id: String,
    /// 利用者ID
    pub owner_id: String,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
    /// 作成日時
    pub created_at: DateTime<Utc>,
}

/// 認証エラーの種類
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// データベースエラー
    #[error("データベースエラー: {0}")]
    DatabaseError(String),

    /// 暗号化エラー
    #[error("暗号化エラー: {0}")]
    EncryptionError(String),

    /// 無効なトークンエラー
    #[error("無効なトークン")]
    InvalidToken,

    /// セッション期限切れエラー
    #[error("セッションが期限切れです")]
    SessionExpired,

    /// 認証が必要エラー
    #[error("認証が必要です")]
    AuthenticationRequired,
}

/// セッションエラーの種類
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// 暗号化エラー
    #[error("暗号化エラー: {0}")]
    EncryptionError(String),

    /// 復号化エラー
    #[error("復号化エラー: {0}")]
    DecryptionError(String),

    /// セッション期限切れ
    #[error("セッションが期限切れです")]
    Expired,

    /// セッションが見つからない
    #[error("セッションが見つかりません")]
    NotFound,

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    DatabaseError(String),
}

impl From<rusqlite::Error> for SessionError {
    fn from(error: rusqlite::Error) -> Self {
        SessionError::DatabaseError(error.to_string())
    }
}

impl From<SessionError> for AuthError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Expired => AuthError::SessionExpired,
            SessionError::NotFound => AuthError::InvalidToken,
            // 改ざん・別キーで作られたトークンは無効なトークンとして扱う
            SessionError::DecryptionError(_) => AuthError::InvalidToken,
            SessionError::EncryptionError(msg) => AuthError::EncryptionError(msg),
            SessionError::DatabaseError(msg) => AuthError::DatabaseError(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::DatabaseError(msg) => AppError::Database(msg),
            AuthError::EncryptionError(msg) => AppError::security(msg),
            other => AppError::unauthorized(other.to_string()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(error: SessionError) -> Self {
        AuthError::from(error).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_to_auth_error() {
        assert!(matches!(
            AuthError::from(SessionError::Expired),
            AuthError::SessionExpired
        ));
        assert!(matches!(
            AuthError::from(SessionError::NotFound),
            AuthError::InvalidToken
        ));
        assert!(matches!(
            AuthError::from(SessionError::DecryptionError("bad".to_string())),
            AuthError::InvalidToken
        ));
    }

    #[test]
    fn test_auth_error_to_app_error() {
        assert!(matches!(
            AppError::from(AuthError::InvalidToken),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::AuthenticationRequired),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::DatabaseError("locked".to_string())),
            AppError::Database(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::EncryptionError("bad key".to_string())),
            AppError::Security(_)
        ));
    }
}
