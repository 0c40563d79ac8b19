//! Task trait - ペイロード型と task_type 名の対応

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A payload type the queue can carry. The payload is stored as JSON.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Digest {
///     user_id: u64,
/// }
///
/// impl Task for Digest {
///     const TYPE: &'static str = "courier.digest.send.v1";
/// }
/// ```
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// `{namespace}.{domain}.{action}.v{major}`. Renaming it orphans queued tasks.
    const TYPE: &'static str;
}
