//! PKGからのメタデータ読み取り
//!
//! `pkgutil --expand-full`で一時ディレクトリへ展開し、ペイロード内の
//! Info.plistからバンドルID・バージョン・.app名を取得する。
//! 複数候補がある場合は最も大きい.appバンドルを選ぶ。
//! 有効なplistがなければPackageInfo / DistributionのXMLメタデータへ
//! フォールバックする（監査強制にはPKG IDとバージョンで足りる）。

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

use crate::error::{KappaError, Result};
use crate::models::PkgInfo;

/// .app本体以外のInfo.plistを除外するディレクトリ
const NONSTANDARD_DIRS: &[&str] = &[
    "Extensions/",
    "Frameworks/",
    "Helpers/",
    "Library/",
    "MacOS/",
    "PlugIns/",
    "Resources/",
    "SharedSupport/",
    "opt/",
    "bin/",
];

lazy_static! {
    static ref PKG_REF_TAG: Regex = Regex::new(r"<pkg-ref\b[^>]*>").unwrap();
    static ref XML_ID_ATTR: Regex = Regex::new(r#"\bid(?:entifier)?="([^"]*)""#).unwrap();
    // format-version="2"に誤一致しないよう、属性名の直前は空白に限定する
    static ref XML_VERSION_ATTR: Regex = Regex::new(r#"\sversion="([^"]*)""#).unwrap();
    static ref PKG_INFO_TAG: Regex = Regex::new(r"<pkg-info\b[^>]*>").unwrap();
}

/// PKGを展開してメタデータを読み取る
pub fn inspect(pkg_path: &Path) -> Result<PkgInfo> {
    if !pkg_path.exists() {
        return Err(KappaError::FileNotFound(pkg_path.display().to_string()));
    }

    let temp_dir = tempfile::tempdir()?;
    let expanded = temp_dir.path().join("expanded");
    expand_pkg(pkg_path, &expanded)?;

    match find_app_info(&expanded)? {
        Some(info) => Ok(info),
        None => {
            eprintln!("WARNING: PKG内に有効な.app plistが見つかりません");
            eprintln!("PackageInfoからの読み取りを試みます...");
            let (pkg_id, version) = find_pkg_metadata(&expanded)?;
            Ok(PkgInfo {
                bundle_id: None,
                pkg_id: Some(pkg_id),
                version,
                app_name: None,
            })
        }
    }
}

/// pkgutilでPKGを展開する
fn expand_pkg(src: &Path, dst: &Path) -> Result<()> {
    let output = Command::new("pkgutil")
        .arg("--expand-full")
        .arg(src)
        .arg(dst)
        .output()
        .map_err(|e| KappaError::PkgExpand(format!("pkgutil実行失敗: {}", e)))?;

    if !output.status.success() {
        return Err(KappaError::PkgExpand(format!(
            "{} の展開に失敗しました: {}",
            src.display(),
            String::from_utf8_lossy(&output.stdout).trim()
        )));
    }
    Ok(())
}

/// ペイロード内の.appのInfo.plistを探して読み取る
///
/// 候補ゼロなら`None`（PackageInfoフォールバックへ）。
/// 必須キーの欠落はエラー。
fn find_app_info(expanded: &Path) -> Result<Option<PkgInfo>> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(expanded)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| {
            let path_str = p.to_string_lossy();
            path_str.ends_with("Contents/Info.plist")
                && !NONSTANDARD_DIRS.iter().any(|dir| path_str.contains(dir))
        })
        .collect();

    let likely_plist = match candidates.len() {
        0 => return Ok(None),
        1 => candidates.remove(0),
        _ => largest_entry(&candidates),
    };

    let values = plist::Value::from_file(&likely_plist)?;
    let dict = values.as_dictionary().ok_or_else(|| {
        KappaError::PkgMetadata(format!(
            "{} が辞書形式のplistではありません",
            likely_plist.display()
        ))
    })?;
    let get_string = |key: &str| {
        dict.get(key)
            .and_then(|v| v.as_string())
            .map(str::to_string)
    };

    let bundle_id = get_string("CFBundleIdentifier").ok_or_else(|| {
        KappaError::PkgMetadata("plistにCFBundleIdentifierがありません".to_string())
    })?;
    let version = get_string("CFBundleShortVersionString").ok_or_else(|| {
        KappaError::PkgMetadata("plistにCFBundleShortVersionStringがありません".to_string())
    })?;

    // CFBundleNameは実際の.app名と一致しないことがあるため、
    // Info.plistの絶対パスから.app名を取る（Contents/の2つ上）
    let likely_app_name = likely_plist
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().to_string());
    let app_name = match likely_app_name {
        Some(name) if name.ends_with(".app") => Some(name),
        _ => get_string("CFBundleName").map(|name| format!("{}.app", name)),
    };

    Ok(Some(PkgInfo {
        bundle_id: Some(bundle_id),
        pkg_id: None,
        version,
        app_name,
    }))
}

/// PackageInfo / DistributionからPKG IDとバージョンを読み取る
fn find_pkg_metadata(expanded: &Path) -> Result<(String, String)> {
    let find_named = |name: &str| -> Vec<PathBuf> {
        WalkDir::new(expanded)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == name)
            .map(|e| e.path().to_path_buf())
            .collect()
    };

    let package_infos = find_named("PackageInfo");
    let distributions = find_named("Distribution");

    let likely_pkginfo = match package_infos.len() {
        0 => {
            return Err(KappaError::PkgMetadata(
                "PKG内にPackageInfoが見つかりません".to_string(),
            ));
        }
        1 => package_infos[0].clone(),
        _ => {
            // Distributionの先頭pkg-refを正として対応するPackageInfoを探す
            if let Some(distribution) = distributions.first() {
                if let Some((distro_id, _)) = parse_pkg_xml(distribution)? {
                    for info in &package_infos {
                        if let Some((pkg_id, version)) = parse_pkg_xml(info)? {
                            if pkg_id == distro_id && !version.is_empty() {
                                return Ok((pkg_id, version));
                            }
                        }
                    }
                }
            }
            largest_entry(&package_infos)
        }
    };

    match parse_pkg_xml(&likely_pkginfo)? {
        Some((pkg_id, version)) if !pkg_id.is_empty() && !version.is_empty() => {
            Ok((pkg_id, version))
        }
        _ => Err(KappaError::PkgMetadata(format!(
            "PackageInfoにID/バージョンがありません: {}",
            likely_pkginfo.display()
        ))),
    }
}

/// Distribution（pkg-refタグ）またはPackageInfo（pkg-infoタグ）の
/// 属性からIDとバージョンを取り出す
fn parse_pkg_xml(xml_file: &Path) -> Result<Option<(String, String)>> {
    let content = std::fs::read_to_string(xml_file)?;

    let tag = PKG_REF_TAG
        .find(&content)
        .or_else(|| PKG_INFO_TAG.find(&content));
    let Some(tag) = tag else {
        return Ok(None);
    };

    let tag_str = tag.as_str();
    let id = XML_ID_ATTR
        .captures(tag_str)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let version = XML_VERSION_ATTR
        .captures(tag_str)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    Ok(Some((id, version)))
}

/// 複数候補から、親ディレクトリの合計サイズが最大のものを選ぶ
fn largest_entry(files: &[PathBuf]) -> PathBuf {
    let mut best = files[0].clone();
    let mut best_size = 0u64;

    for file in files {
        let size = file.parent().map(dir_size).unwrap_or(0);
        if size > best_size {
            best_size = size;
            best = file.clone();
        }
    }
    best
}

/// ディレクトリ配下の合計バイトサイズ（シンボリックリンクは追わない）
fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
