//! Kandji APIと照合エンジンで共有するデータモデル

use serde::{Deserialize, Serialize};

/// Custom App（ライブラリアイテム）のスナップショット
///
/// 1回の実行で取得したカタログの読み取り専用レコード。
/// 必須フィールドが欠けたレスポンスはデシリアライズ時点でエラーになる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomApp {
    pub id: String,
    pub name: String,
    /// リモートのPKGパス（アップロード時にランダムサフィックスが付与される）
    pub file_key: String,
    pub install_enforcement: Enforcement,
    #[serde(default)]
    pub show_in_self_service: bool,
    #[serde(default)]
    pub self_service_category_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// PKGの最終アップロード日時
    pub file_updated: String,
}

impl CustomApp {
    /// file_keyからパスを除いたPKG名を返す
    pub fn pkg_basename(&self) -> &str {
        self.file_key
            .rsplit('/')
            .next()
            .unwrap_or(self.file_key.as_str())
    }
}

/// Self Serviceカテゴリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfServiceCategory {
    pub id: String,
    pub name: String,
}

/// インストール強制モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Enforcement {
    /// 継続的に監査・強制（監査スクリプト必須）
    #[serde(rename = "continuously_enforce")]
    ContinuouslyEnforce,
    /// Self Service配布（強制なし）
    #[serde(rename = "no_enforcement")]
    NoEnforcement,
    /// 初回のみインストール
    #[serde(rename = "install_once")]
    InstallOnce,
}

impl Enforcement {
    /// 設定ファイルの表記からAPI値へ変換
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "audit_enforce" | "continuously_enforce" => Some(Enforcement::ContinuouslyEnforce),
            "self_service" | "no_enforcement" => Some(Enforcement::NoEnforcement),
            "install_once" => Some(Enforcement::InstallOnce),
            _ => None,
        }
    }

    /// APIに送る値
    pub fn api_value(&self) -> &'static str {
        match self {
            Enforcement::ContinuouslyEnforce => "continuously_enforce",
            Enforcement::NoEnforcement => "no_enforcement",
            Enforcement::InstallOnce => "install_once",
        }
    }

    /// 設定ファイル・通知向けの表記
    pub fn config_name(&self) -> &'static str {
        match self {
            Enforcement::ContinuouslyEnforce => "audit_enforce",
            Enforcement::NoEnforcement => "self_service",
            Enforcement::InstallOnce => "install_once",
        }
    }
}

impl std::fmt::Display for Enforcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.api_value())
    }
}

impl std::str::FromStr for Enforcement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Enforcement::from_config_name(s).ok_or_else(|| {
            format!(
                "Unknown enforcement: {}. Use audit_enforce, self_service, or install_once",
                s
            )
        })
    }
}

/// 照合エンジンの判定結果
///
/// 呼び出し側はこの値に応じて create / update / 中断を選ぶ。
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// 更新対象が一意に決まった
    Matched(CustomApp),
    /// 既存アイテムなし、新規作成へ
    CreateNew,
    /// 複数候補が残り自動処理不可（オペレータ通知が必要）
    Ambiguous(Vec<CustomApp>),
    /// 一致なし（作成も照合もできない）
    NoMatch,
}

/// 照合時のポリシーフラグ
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchPolicy {
    /// 一致なしの場合に新規作成する
    pub auto_create: bool,
    /// PKG名の類似度による動的検索を有効にする
    pub dynamic_lookup: bool,
}

/// PKGから読み取ったメタデータ
#[derive(Debug, Clone, Default)]
pub struct PkgInfo {
    /// .appのバンドルID（plistから取得できた場合）
    pub bundle_id: Option<String>,
    /// PKG ID（plistがなくPackageInfoから取得した場合）
    pub pkg_id: Option<String>,
    pub version: String,
    /// ペイロード内の.app名
    pub app_name: Option<String>,
}
