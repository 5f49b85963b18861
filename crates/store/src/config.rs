use std::path::PathBuf;
use std::sync::OnceLock;

static ROOT_DIR: OnceLock<PathBuf> = OnceLock::new();

/// 设置存储层的数据根目录。
///
/// # Logic
/// 只有第一次设置生效，之后的调用被忽略。
///
/// # Returns
/// 本次设置是否生效。
pub fn set_root_dir(path: PathBuf) -> bool {
    ROOT_DIR.set(path).is_ok()
}

/// 获取数据根目录，未设置时为 `data`。
pub(crate) fn get_root_dir() -> PathBuf {
    ROOT_DIR
        .get()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("data"))
}
