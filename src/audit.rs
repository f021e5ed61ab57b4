//! 監査スクリプト（zsh）のカスタマイズ
//!
//! continuously_enforceで登録する前に、同梱の監査スクリプトへ
//! アプリ名・バンドルID・最低強制バージョンなどを書き込む。
//! 変更前に.bakバックアップを作り、アップロード後に元へ戻す。

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{KappaError, Result};

/// 監査スクリプトへ書き込む値
#[derive(Debug, Default)]
pub struct AuditValues<'a> {
    pub app_name: Option<&'a str>,
    pub bundle_id: Option<&'a str>,
    pub pkg_id: Option<&'a str>,
    pub min_version: Option<&'a str>,
    /// 強制までの猶予日数（テスト/本番で異なる）
    pub enforcement_delay: Option<u32>,
}

fn backup_path(script_path: &Path) -> PathBuf {
    let mut backup = script_path.as_os_str().to_os_string();
    backup.push(".bak");
    PathBuf::from(backup)
}

/// スクリプト内の代入行を置き換える。バックアップを先に作成する
pub fn customize(script_path: &Path, values: &AuditValues) -> Result<()> {
    let original = fs::read_to_string(script_path).map_err(|e| {
        KappaError::AuditScript(format!(
            "監査スクリプト {} を読み込めません: {}",
            script_path.display(),
            e
        ))
    })?;
    fs::copy(script_path, backup_path(script_path))?;

    let epoch_now = chrono::Utc::now().timestamp();
    let rewritten: Vec<String> = original
        .lines()
        .map(|line| rewrite_line(line, values, epoch_now))
        .collect();
    fs::write(script_path, rewritten.join("\n") + "\n")?;
    Ok(())
}

fn rewrite_line(line: &str, values: &AuditValues, epoch_now: i64) -> String {
    if line.contains("APP_NAME=") {
        if let Some(app_name) = values.app_name {
            return format!("APP_NAME=\"{}\"", app_name);
        }
    } else if line.contains("BUNDLE_ID=") {
        if let Some(bundle_id) = values.bundle_id {
            return format!("BUNDLE_ID=\"{}\"", bundle_id);
        }
    } else if line.contains("PKG_ID=") {
        if let Some(pkg_id) = values.pkg_id {
            return format!("PKG_ID=\"{}\"", pkg_id);
        }
    } else if line.contains("MINIMUM_ENFORCED_VERSION=") {
        if let Some(version) = values.min_version {
            return format!("MINIMUM_ENFORCED_VERSION=\"{}\"", version);
        }
    } else if line.contains("CREATION_TIMESTAMP=") {
        return format!("CREATION_TIMESTAMP=\"{}\"", epoch_now);
    } else if line.contains("DAYS_UNTIL_ENFORCEMENT=") {
        if let Some(delay) = values.enforcement_delay {
            return format!("DAYS_UNTIL_ENFORCEMENT={}", delay);
        }
    }
    line.to_string()
}

/// バックアップからカスタマイズ前の内容へ戻す
pub fn restore(script_path: &Path) -> Result<()> {
    let backup = backup_path(script_path);
    if !backup.exists() {
        return Err(KappaError::AuditScript(format!(
            "バックアップ {} が見つかりません",
            backup.display()
        )));
    }
    fs::rename(&backup, script_path)?;
    Ok(())
}
