use crate::features::auth::models::{AuthError, Owner};
use crate::features::auth::session::SessionManager;
use std::sync::Arc;

/// API認証ミドルウェア
///
/// 利用者向けAPIのリクエストに含まれるセッショントークンを検証し、利用者を特定する。
#[derive(Clone)]
pub struct AuthMiddleware {
    /// セッション管理
    session_manager: Arc<SessionManager>,
}

impl AuthMiddleware {
    /// 新しいAuthMiddlewareを作成する
    ///
    /// # 引数
    /// * `session_manager` - セッション管理
    ///
    /// # 戻り値
    /// AuthMiddlewareインスタンス
    pub fn new(session_manager: Arc<SessionManager>) -> Self {
        Self { session_manager }
    }

    /// セッション管理への参照を取得する
    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    /// APIリクエストの認証を検証する
    ///
    /// # 引数
    /// * `token` - 認証トークン
    /// * `request_path` - リクエストパス
    ///
    /// # 戻り値
    /// 認証された利用者
    pub fn authenticate_request(
        &self,
        token: Option<&str>,
        request_path: &str,
    ) -> Result<Owner, AuthError> {
        log::debug!("APIリクエスト認証を開始: path={request_path}");

        let token = token.ok_or_else(|| {
            log::warn!("認証トークンが提供されていません: path={request_path}");
            AuthError::AuthenticationRequired
        })?;

        if !auth_helpers::is_valid_token_format(token) {
            log::warn!("無効なトークン形式: path={request_path}");
            return Err(AuthError::InvalidToken);
        }

        match self.session_manager.validate_session(token) {
            Ok(session) => {
                log::debug!(
                    "APIリクエスト認証成功: owner_id={}, path={request_path}",
                    session.owner_id
                );
                Ok(Owner::new(session.owner_id))
            }
            Err(e) => {
                log::warn!("セッション検証失敗: {e}, path={request_path}");
                Err(e.into())
            }
        }
    }
}

/// 認証ヘルパー関数
pub mod auth_helpers {
    /// リクエストヘッダーから認証トークンを抽出する
    ///
    /// # 引数
    /// * `authorization_header` - Authorizationヘッダーの値
    ///
    /// # 戻り値
    /// 抽出されたトークン
    pub fn extract_bearer_token(authorization_header: Option<&str>) -> Option<&str> {
        authorization_header
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(|token| token.trim())
            .filter(|token| !token.is_empty())
    }

    /// セッショントークンの形式を検証する
    pub fn is_valid_token_format(token: &str) -> bool {
        !token.is_empty() && token.len() > 10 && token.is_ascii()
    }

    /// リクエストパスが認証不要かどうかを判定する
    pub fn is_public_endpoint(path: &str) -> bool {
        const PUBLIC_PATHS: &[&str] = &["/health"];

        PUBLIC_PATHS.contains(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::auth_helpers::*;
    use super::*;
    use crate::features::auth::session::DEFAULT_SESSION_DAYS;
    use crate::shared::database::{create_in_memory_connection, create_tables};
    use std::sync::Mutex;

    fn setup_test_middleware() -> AuthMiddleware {
        let conn = create_in_memory_connection().unwrap();
        create_tables(&conn).unwrap();

        let session_manager = SessionManager::new(
            Arc::new(Mutex::new(conn)),
            "test_encryption_key_32_bytes_long",
        );

        AuthMiddleware::new(Arc::new(session_manager))
    }

    #[test]
    fn test_authenticate_request_no_token() {
        let middleware = setup_test_middleware();

        let result = middleware.authenticate_request(None, "/api/subscriptions");
        assert!(matches!(result, Err(AuthError::AuthenticationRequired)));
    }

    #[test]
    fn test_authenticate_request_invalid_token() {
        let middleware = setup_test_middleware();

        assert!(matches!(
            middleware.authenticate_request(Some("short"), "/api/subscriptions"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            middleware.authenticate_request(
                Some("bm90LWEtcmVhbC10b2tlbi1hdC1hbGw="),
                "/api/subscriptions"
            ),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_authenticate_request_valid_token() {
        let middleware = setup_test_middleware();
        let (_, token) = middleware
            .session_manager()
            .issue_token("user_alice", DEFAULT_SESSION_DAYS)
            .unwrap();

        let owner = middleware
            .authenticate_request(Some(&token), "/api/subscriptions")
            .unwrap();
        assert_eq!(owner, Owner::new("user_alice"));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(
            extract_bearer_token(Some("Bearer token123")),
            Some("token123")
        );
        assert_eq!(extract_bearer_token(Some("Bearer ")), None);
        assert_eq!(extract_bearer_token(Some("token123")), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn test_is_valid_token_format() {
        assert!(is_valid_token_format("valid_token_123"));
        assert!(!is_valid_token_format(""));
        assert!(!is_valid_token_format("short"));
    }

    #[test]
    fn test_is_public_endpoint() {
        assert!(is_public_endpoint("/health"));
        assert!(!is_public_endpoint("/api/subscriptions"));
        assert!(!is_public_endpoint("/api/cron"));
    }
}
