//! セマンティックバージョン順と同一バージョン時のタイムスタンプ判定
//!
//! バージョン降順が第一キー。最高バージョンが同点の場合は
//! `file_updated`（PKGアップロード日時）、次に`updated_at`を比較して
//! 最も古いレコードを更新対象の正とする。

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use super::version::PkgVersion;
use crate::error::{KappaError, Result};
use crate::models::CustomApp;

/// 小数秒あり
const TS_WITH_FRACTION: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
/// 小数秒なし
const TS_PLAIN: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Kandji APIのタイムスタンプ（UTC、2形式）を順に試して解析する
///
/// どちらの形式でも解析できない場合は致命的エラー。
/// 暗黙のデフォルト値にするとタイブレークの不変条件が壊れるため。
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TS_WITH_FRACTION)
        .or_else(|_| NaiveDateTime::parse_from_str(value, TS_PLAIN))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| KappaError::Timestamp(format!("'{}': {}", value, e)))
}

/// バージョン付き候補を新しい順に並べ替える
///
/// `versioned`は(PKG名, 正規化済みバージョン)の列。返り値は新しい順のPKG名で、
/// 最高バージョンが複数ある場合は最古のレコードが先頭に来る。
/// カタログに裏付けレコードがない候補はタイブレークの対象外（seed絞り込み時に起こる）。
pub fn pick_newest(versioned: &[(String, String)], catalog: &[CustomApp]) -> Result<Vec<String>> {
    let mut ordered: Vec<(String, String)> = versioned.to_vec();
    ordered.sort_by(|a, b| PkgVersion::parse(&b.1).cmp(&PkgVersion::parse(&a.1)));

    let top_version = match ordered.first() {
        Some((_, version)) => version.clone(),
        None => return Ok(Vec::new()),
    };

    let tied: Vec<&str> = ordered
        .iter()
        .filter(|(_, version)| *version == top_version)
        .map(|(name, _)| name.as_str())
        .collect();

    if tied.len() > 1 {
        let mut stamped: Vec<(String, DateTime<Utc>, DateTime<Utc>)> = Vec::new();
        for name in &tied {
            if let Some(app) = catalog.iter().find(|a| a.file_key.contains(name)) {
                stamped.push((
                    name.to_string(),
                    parse_timestamp(&app.file_updated)?,
                    parse_timestamp(&app.updated_at)?,
                ));
            }
        }

        if let Some((winner, _, _)) = stamped
            .iter()
            .min_by_key(|(_, uploaded, modified)| (*uploaded, *modified))
        {
            if let Some(pos) = ordered.iter().position(|(name, _)| name == winner) {
                let item = ordered.remove(pos);
                ordered.insert(0, item);
            }
        }
    }

    Ok(ordered.into_iter().map(|(name, _)| name).collect())
}
