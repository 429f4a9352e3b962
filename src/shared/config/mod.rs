/// 環境設定・ログ初期化
pub mod environment;

pub use environment::{
    get_database_filename, get_environment, initialize_logging_system,
    load_environment_variables, AppConfig, Environment, EnvironmentConfig,
};
