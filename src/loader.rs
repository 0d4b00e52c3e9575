//! YAML 定义目录扫描
//!
//! 转向规则与 Hook 共用的文件发现逻辑，带加载期安全检查：
//! - 跳过符号链接
//! - 跳过规范化后不在根目录内的文件
//! - 跳过超过 1 MiB 的文件

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 单个定义文件的大小上限
pub const MAX_DEFINITION_FILE_SIZE: u64 = 1024 * 1024;

/// 加载硬错误（无法列出根目录等）
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("无法创建目录 {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析目录绝对路径 {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("遍历目录失败: {0}")]
    Walk(#[from] walkdir::Error),
}

/// 扫描中被跳过的文件及原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Symlink,
    OutsideRoot,
    TooLarge(u64),
}

/// 扫描结果
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// 按路径排序的 YAML 文件
    pub files: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// 确保目录存在
pub fn ensure_dir(path: &Path) -> Result<(), LoadError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|source| LoadError::CreateDir {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// 递归扫描根目录下的 YAML 文件
///
/// 根目录本身无法遍历时返回错误；子项出错只记录日志并跳过。
/// 结果按文件名排序，同优先级的定义因此保持稳定顺序。
pub fn scan_yaml_files(root: &Path, tag: &str) -> Result<ScanOutcome, LoadError> {
    let canonical_root = root
        .canonicalize()
        .map_err(|source| LoadError::Canonicalize {
            path: root.to_path_buf(),
            source,
        })?;

    let mut outcome = ScanOutcome::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(LoadError::Walk(e)),
            Err(e) => {
                warn!("[{}] 遍历目录条目失败: {}", tag, e);
                continue;
            }
        };

        let path = entry.path();
        if entry.path_is_symlink() {
            if is_yaml(path) {
                warn!("[{}] 跳过符号链接: {}", tag, path.display());
                outcome.skipped.push((path.to_path_buf(), SkipReason::Symlink));
            }
            continue;
        }
        if !entry.file_type().is_file() || !is_yaml(path) {
            continue;
        }

        match path.canonicalize() {
            Ok(resolved) if resolved.starts_with(&canonical_root) => {}
            Ok(_) => {
                warn!("[{}] 跳过根目录之外的文件: {}", tag, path.display());
                outcome
                    .skipped
                    .push((path.to_path_buf(), SkipReason::OutsideRoot));
                continue;
            }
            Err(e) => {
                warn!("[{}] 无法解析路径 {}: {}", tag, path.display(), e);
                continue;
            }
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > MAX_DEFINITION_FILE_SIZE {
            warn!(
                "[{}] 跳过过大的文件: {} ({} bytes)",
                tag,
                path.display(),
                size
            );
            outcome
                .skipped
                .push((path.to_path_buf(), SkipReason::TooLarge(size)));
            continue;
        }

        debug!("[{}] 发现定义文件: {}", tag, path.display());
        outcome.files.push(path.to_path_buf());
    }

    Ok(outcome)
}
