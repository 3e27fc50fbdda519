//! 入出力ファイルの更新日時による最新判定
//!
//! ディレクトリは配下の全ファイルを再帰的に見る。

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// 入力の中で最も新しい更新日時
///
/// 入力が一つも存在しなければ `None`。
pub fn latest_modification(paths: &[PathBuf]) -> io::Result<Option<SystemTime>> {
    let mut latest: Option<SystemTime> = None;

    for path in paths {
        for file in expand(path)? {
            let modified = std::fs::metadata(&file)?.modified()?;
            latest = Some(latest.map_or(modified, |current| current.max(modified)));
        }
    }

    Ok(latest)
}

/// 出力の中で最も古い更新日時
///
/// 出力のいずれかが存在しなければ `None`。
pub fn earliest_modification(paths: &[PathBuf]) -> io::Result<Option<SystemTime>> {
    let mut earliest: Option<SystemTime> = None;

    for path in paths {
        if !path.exists() {
            return Ok(None);
        }
        for file in expand(path)? {
            let modified = std::fs::metadata(&file)?.modified()?;
            earliest = Some(earliest.map_or(modified, |current| current.min(modified)));
        }
    }

    Ok(earliest)
}

/// 宣言された出力が入力より古くなければ最新とみなす
///
/// - 出力が宣言されていない、または一つでも欠けていれば最新ではない
/// - 入力が欠けている場合も最新ではない（実行させて正しくエラーにする）
pub fn outputs_up_to_date(inputs: &[PathBuf], outputs: &[PathBuf]) -> io::Result<bool> {
    if outputs.is_empty() {
        return Ok(false);
    }

    if inputs.iter().any(|input| !input.exists()) {
        return Ok(false);
    }

    let Some(oldest_output) = earliest_modification(outputs)? else {
        return Ok(false);
    };

    match latest_modification(inputs)? {
        Some(newest_input) => Ok(oldest_output >= newest_input),
        None => Ok(true),
    }
}

/// ファイルはそのまま、ディレクトリは配下のファイル一覧に展開
fn expand(path: &Path) -> io::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&path.to_string_lossy())
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(glob::GlobError::into_error)?;
        if entry.is_file() {
            files.push(entry);
        }
    }

    Ok(files)
}
