/// 認証機能のモジュール
pub mod middleware;
pub mod models;
pub mod scheduler;
pub mod session;

pub use middleware::{auth_helpers, AuthMiddleware};
pub use models::{AuthError, Owner, Session, SessionError};
pub use scheduler::SchedulerAuth;
pub use session::{SessionManager, DEFAULT_SESSION_DAYS};
