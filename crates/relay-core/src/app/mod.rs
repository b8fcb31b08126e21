//! App - アプリケーション層
//!
//! このモジュールは、ports と router を組み合わせてタスク配送を実装します。
//!
//! # 主要コンポーネント
//! - **TaskExecutionHandler**: メッセージを実行して ledger に記録（decode→context→PROCESSING→execute→resolve）
//! - **TaskProducer**: タスクの採番・エンコード・publish
//! - **StatusReader**: ledger のポーリング
//! - **ReaperLoop**: lease 期限切れの回収
//! - **AppBuilder**: worker pool の構築とワイヤリング

pub mod builder;
pub mod producer;
pub mod reaper_loop;
pub mod status;
pub mod task_handler;


// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::producer::{ProducerError, TaskProducer};
pub use self::reaper_loop::ReaperLoop;
pub use self::status::{StatusReader, TaskStatusView};
pub use self::task_handler::{DispatchError, TASK_QUEUE, TaskExecutionHandler};
