//! TypedOperation trait - 型付き operation の定義

use serde::Serialize;
use serde::de::DeserializeOwned;

/// TypedOperation は operation kind と引数の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Add {
///     a: i64,
///     b: i64,
/// }
///
/// impl TypedOperation for Add {
///     const KIND: &'static str = "math.add.v1";
///     type Output = i64;
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: producer 側で `Operation.args` に詰めるため
/// - `DeserializeOwned`: ワーカー側で `args` から復元するため
/// - `'static`: Arc に格納できるため
pub trait TypedOperation: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 命名規約: `{namespace}.{action}.v{major}`
    const KIND: &'static str;

    /// Stored as the record's `result` on success.
    type Output: Serialize + Send;
}
