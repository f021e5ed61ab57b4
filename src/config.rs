//! 設定ファイル（config.json / recipe_map.json）の読み込みと実行時設定の解決
//!
//! 優先順位: レシピ（CLI引数） > レシピマップ > zz_defaults。
//! Self Serviceカテゴリがどこかで指定されていれば強制モードは
//! no_enforcement（Self Service配布）に切り替わる。

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{KappaError, Result};
use crate::models::Enforcement;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const RECIPE_MAP_FILE_NAME: &str = "recipe_map.json";
pub const AUDIT_SCRIPT_NAME: &str = "audit_app_and_version.zsh";

/// config.jsonの構造
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub kandji: KandjiConfig,
    pub token_keystore: KeystoreConfig,
    pub slack: SlackConfig,
    #[serde(rename = "zz_defaults", default)]
    pub defaults: Defaults,
    #[serde(rename = "li_enforcement")]
    pub enforcement: EnforcementConfig,
    #[serde(default)]
    pub use_recipe_map: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KandjiConfig {
    pub api_url: String,
    pub token_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreConfig {
    #[serde(default)]
    pub environment: bool,
    #[serde(default)]
    pub keychain: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub auto_create_app: bool,
    #[serde(default)]
    pub new_app_naming: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub dynamic_lookup: bool,
    #[serde(default)]
    pub self_service_category: Option<String>,
    #[serde(default)]
    pub test_self_service_category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnforcementConfig {
    #[serde(rename = "type", default)]
    pub enforcement_type: Option<String>,
    #[serde(default)]
    pub delays: Option<EnforcementDelays>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnforcementDelays {
    #[serde(default)]
    pub test: Option<u32>,
    #[serde(default)]
    pub prod: Option<u32>,
}

/// recipe_map.jsonのエントリ: レシピ名（部分一致）→ Custom App名とカテゴリ
pub type RecipeMap = HashMap<String, RecipeEntry>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeEntry {
    #[serde(default)]
    pub prod_name: Option<String>,
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub ss_category: Option<String>,
    #[serde(default)]
    pub test_category: Option<String>,
}

/// レシピ（CLI）から渡される上書き値
#[derive(Debug, Clone, Default)]
pub struct RecipeInput {
    /// レシピのNAME
    pub name: String,
    /// レシピ名（レシピマップ照合用。未指定ならNAMEを使う）
    pub recipe_name: Option<String>,
    pub prod_name: Option<String>,
    pub test_name: Option<String>,
    pub ss_category: Option<String>,
    pub test_category: Option<String>,
    pub create_new: bool,
    pub dry_run: bool,
}

/// 作成・更新対象のCustom App名とその系統
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTarget {
    pub name: String,
    pub kind: TargetKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Prod,
    Test,
    /// prod/test指定なしの単一ターゲット
    Default,
}

/// 解決済みの実行時設定
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    /// WebコンソールのURL（通知リンク用）
    pub tenant_url: String,
    /// `<api_url>/api/v1`
    pub api_prefix: String,
    pub token_name: String,
    pub keystore: KeystoreConfig,
    pub slack_webhook_name: Option<String>,
    pub enforcement: Enforcement,
    pub auto_create: bool,
    pub dynamic_lookup: bool,
    pub dry_run: bool,
    pub create_new: bool,
    pub test_delay: Option<u32>,
    pub prod_delay: Option<u32>,
    /// prod向けSelf Serviceカテゴリ名
    pub ss_category: Option<String>,
    /// test向けSelf Serviceカテゴリ名
    pub test_category: Option<String>,
    pub targets: Vec<AppTarget>,
}

/// JSONファイルを読み込んでデシリアライズする
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(KappaError::Config(format!(
            "{} が見つかりません",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        KappaError::Config(format!("{} が不正なJSONです: {}", path.display(), e))
    })
}

/// 実行ファイルと同じディレクトリの設定を探す（見つからなければカレント）
pub fn default_config_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Settings {
    /// 設定ファイル・レシピマップ・レシピ入力から実行時設定を組み立てる
    pub fn resolve(
        config: &FileConfig,
        recipe_map: Option<&RecipeMap>,
        input: &RecipeInput,
    ) -> Result<Settings> {
        // ENVでのURL上書きを先に適用
        let api_url =
            std::env::var("KANDJI_API_URL").unwrap_or_else(|_| config.kandji.api_url.clone());

        // セットアップ未完了のプレースホルダ検出
        if api_url.contains("TENANT") {
            return Err(KappaError::Config(
                "Kandji API URLが未設定です（TENANTプレースホルダのまま）".to_string(),
            ));
        }
        if !config.token_keystore.environment && !config.token_keystore.keychain {
            return Err(KappaError::Config(
                "token_keystoreが未定義です（environment/keychainの少なくとも一方を有効にしてください）"
                    .to_string(),
            ));
        }

        let tenant_url = api_url.replace(".api.", ".");
        let api_prefix = format!("{}/api/v1", api_url.trim_end_matches('/'));

        // レシピマップからの値
        let recipe_name = input.recipe_name.as_deref().unwrap_or(&input.name);
        let mapped = recipe_map
            .and_then(|map| {
                map.iter()
                    .find(|(recipe, _)| recipe_name.contains(recipe.as_str()))
                    .map(|(_, entry)| entry.clone())
            })
            .unwrap_or_default();

        // レシピ指定がマップ値を上書き
        let ss_category = input.ss_category.clone().or_else(|| mapped.ss_category.clone());
        let test_category = input
            .test_category
            .clone()
            .or_else(|| mapped.test_category.clone());

        // カテゴリ指定があればSelf Service配布へ切り替え
        let enforcement = if ss_category.is_some() || test_category.is_some() {
            Enforcement::NoEnforcement
        } else {
            config
                .enforcement
                .enforcement_type
                .as_deref()
                .and_then(Enforcement::from_config_name)
                .unwrap_or(Enforcement::InstallOnce)
        };

        let (test_delay, prod_delay) = match &config.enforcement.delays {
            Some(delays) => (delays.test, delays.prod),
            None => (None, None),
        };

        let targets = build_targets(config, &mapped, input);

        let slack_webhook_name = if config.slack.enabled {
            config.slack.webhook_name.clone()
        } else {
            None
        };

        Ok(Settings {
            api_url,
            tenant_url,
            api_prefix,
            token_name: config.kandji.token_name.clone(),
            keystore: config.token_keystore.clone(),
            slack_webhook_name,
            enforcement,
            auto_create: config.defaults.auto_create_app,
            dynamic_lookup: config.defaults.dynamic_lookup,
            dry_run: input.dry_run || config.defaults.dry_run,
            create_new: input.create_new,
            test_delay,
            prod_delay,
            ss_category: ss_category.or_else(|| config.defaults.self_service_category.clone()),
            test_category: test_category
                .or_else(|| config.defaults.test_self_service_category.clone()),
            targets,
        })
    }

    /// 有効なkeystoreを順に（ENV → keychain）探してトークンを返す
    pub fn retrieve_token(&self, item_name: &str) -> Result<String> {
        if self.keystore.environment {
            if let Some(token) = env_token(item_name) {
                return Ok(token);
            }
        }
        if self.keystore.keychain {
            if let Some(token) = keychain_token(item_name) {
                return Ok(token);
            }
        }
        Err(KappaError::MissingToken(item_name.to_string()))
    }
}

/// 作成・更新対象のCustom App名を決める
///
/// prod/test名の明示があればそれを使い、なければ命名テンプレート
/// （`APPNAME`置換）、それもなければ`<NAME> (AutoPkg)`。
fn build_targets(config: &FileConfig, mapped: &RecipeEntry, input: &RecipeInput) -> Vec<AppTarget> {
    let mut targets = Vec::new();

    let prod_name = input.prod_name.clone().or_else(|| mapped.prod_name.clone());
    let test_name = input.test_name.clone().or_else(|| mapped.test_name.clone());

    if let Some(name) = prod_name {
        targets.push(AppTarget {
            name,
            kind: TargetKind::Prod,
        });
    }
    if let Some(name) = test_name {
        targets.push(AppTarget {
            name,
            kind: TargetKind::Test,
        });
    }

    if targets.is_empty() {
        let name = match &config.defaults.new_app_naming {
            Some(template) => template.replace("APPNAME", &input.name),
            None => format!("{} (AutoPkg)", input.name),
        };
        targets.push(AppTarget {
            name,
            kind: TargetKind::Default,
        });
    }

    targets
}

/// ENVからトークンを探す（そのままの名前、次に大文字化した名前）
fn env_token(item_name: &str) -> Option<String> {
    std::env::var(item_name)
        .ok()
        .or_else(|| std::env::var(item_name.to_uppercase()).ok())
        .filter(|v| !v.is_empty())
}

/// macOSキーチェーンからトークンを探す
fn keychain_token(item_name: &str) -> Option<String> {
    let output = Command::new("/usr/bin/security")
        .args(["find-generic-password", "-w", "-s", item_name, "-a", "kappa"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() { None } else { Some(token) }
}

/// カテゴリ名をIDへ解決する（指定名 → デフォルト名の順）
pub fn resolve_category_id(
    categories: &[crate::models::SelfServiceCategory],
    name: Option<&str>,
    default_name: Option<&str>,
) -> Option<String> {
    let lookup = |wanted: &str| {
        categories
            .iter()
            .find(|c| c.name == wanted)
            .map(|c| c.id.clone())
    };

    if let Some(wanted) = name {
        if let Some(id) = lookup(wanted) {
            return Some(id);
        }
        eprintln!("WARNING: カテゴリ '{}' がSelf Serviceに見つかりません", wanted);
    }
    if let Some(fallback) = default_name {
        if let Some(id) = lookup(fallback) {
            return Some(id);
        }
        eprintln!(
            "WARNING: デフォルトカテゴリ '{}' がSelf Serviceに見つかりません",
            fallback
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> FileConfig {
        serde_json::from_str(
            r#"{
                "kandji": { "api_url": "https://accuhive.api.kandji.io", "token_name": "kandji-token" },
                "token_keystore": { "environment": true, "keychain": false },
                "slack": { "enabled": false },
                "zz_defaults": {
                    "auto_create_app": true,
                    "new_app_naming": "APPNAME (AutoPkg)",
                    "dynamic_lookup": true
                },
                "li_enforcement": { "type": "install_once", "delays": { "test": 3, "prod": 14 } }
            }"#,
        )
        .expect("設定のパースに失敗")
    }

    #[test]
    fn test_config_parse_and_resolve() {
        let config = base_config();
        let input = RecipeInput {
            name: "Firefox".to_string(),
            ..Default::default()
        };
        let settings = Settings::resolve(&config, None, &input).unwrap();

        assert_eq!(settings.api_prefix, "https://accuhive.api.kandji.io/api/v1");
        assert_eq!(settings.tenant_url, "https://accuhive.kandji.io");
        assert_eq!(settings.enforcement, Enforcement::InstallOnce);
        assert!(settings.auto_create);
        assert!(settings.dynamic_lookup);
        assert_eq!(settings.test_delay, Some(3));
        assert_eq!(settings.prod_delay, Some(14));
        assert_eq!(settings.targets.len(), 1);
        assert_eq!(settings.targets[0].name, "Firefox (AutoPkg)");
        assert_eq!(settings.targets[0].kind, TargetKind::Default);
    }

    #[test]
    fn test_tenant_placeholder_is_fatal() {
        let mut config = base_config();
        config.kandji.api_url = "https://TENANT.api.kandji.io".to_string();
        let input = RecipeInput {
            name: "Firefox".to_string(),
            ..Default::default()
        };
        assert!(Settings::resolve(&config, None, &input).is_err());
    }

    #[test]
    fn test_no_keystore_is_fatal() {
        let mut config = base_config();
        config.token_keystore.environment = false;
        config.token_keystore.keychain = false;
        let input = RecipeInput {
            name: "Firefox".to_string(),
            ..Default::default()
        };
        assert!(Settings::resolve(&config, None, &input).is_err());
    }

    #[test]
    fn test_category_forces_self_service() {
        let config = base_config();
        let input = RecipeInput {
            name: "Firefox".to_string(),
            ss_category: Some("Browsers".to_string()),
            ..Default::default()
        };
        let settings = Settings::resolve(&config, None, &input).unwrap();
        assert_eq!(settings.enforcement, Enforcement::NoEnforcement);
        assert_eq!(settings.ss_category.as_deref(), Some("Browsers"));
    }

    #[test]
    fn test_recipe_map_match_and_override() {
        let config = base_config();
        let mut map = RecipeMap::new();
        map.insert(
            "Firefox".to_string(),
            RecipeEntry {
                prod_name: Some("Firefox Prod".to_string()),
                test_name: Some("Firefox Test".to_string()),
                ss_category: Some("Mapped".to_string()),
                test_category: None,
            },
        );

        let input = RecipeInput {
            name: "Firefox".to_string(),
            recipe_name: Some("Firefox.pkg.recipe".to_string()),
            ss_category: Some("FromRecipe".to_string()),
            ..Default::default()
        };
        let settings = Settings::resolve(&config, Some(&map), &input).unwrap();

        // レシピ値がマップ値を上書き
        assert_eq!(settings.ss_category.as_deref(), Some("FromRecipe"));
        assert_eq!(settings.targets.len(), 2);
        assert_eq!(settings.targets[0].kind, TargetKind::Prod);
        assert_eq!(settings.targets[1].kind, TargetKind::Test);
    }

    #[test]
    fn test_recipe_map_supplies_both_categories_and_names() {
        // マップのカテゴリとprod/test名が同時に使われるケース
        let config = base_config();
        let mut map = RecipeMap::new();
        map.insert(
            "Zoom".to_string(),
            RecipeEntry {
                prod_name: Some("Zoom".to_string()),
                test_name: Some("Zoom (Test)".to_string()),
                ss_category: Some("Productivity".to_string()),
                test_category: Some("Beta".to_string()),
            },
        );

        let input = RecipeInput {
            name: "Zoom".to_string(),
            ..Default::default()
        };
        let settings = Settings::resolve(&config, Some(&map), &input).unwrap();

        assert_eq!(settings.ss_category.as_deref(), Some("Productivity"));
        assert_eq!(settings.test_category.as_deref(), Some("Beta"));
        assert_eq!(settings.enforcement, Enforcement::NoEnforcement);
        assert_eq!(settings.targets.len(), 2);
        assert_eq!(settings.targets[0].name, "Zoom");
        assert_eq!(settings.targets[1].name, "Zoom (Test)");
    }

    #[test]
    fn test_naming_template_substitution() {
        let mut config = base_config();
        config.defaults.new_app_naming = Some("[Managed] APPNAME".to_string());
        let input = RecipeInput {
            name: "GIMP".to_string(),
            ..Default::default()
        };
        let settings = Settings::resolve(&config, None, &input).unwrap();
        assert_eq!(settings.targets[0].name, "[Managed] GIMP");
    }

    #[test]
    fn test_resolve_category_id() {
        use crate::models::SelfServiceCategory;
        let categories = vec![
            SelfServiceCategory {
                id: "7".to_string(),
                name: "Productivity".to_string(),
            },
            SelfServiceCategory {
                id: "9".to_string(),
                name: "Browsers".to_string(),
            },
        ];

        assert_eq!(
            resolve_category_id(&categories, Some("Browsers"), None),
            Some("9".to_string())
        );
        // 見つからなければデフォルトへ
        assert_eq!(
            resolve_category_id(&categories, Some("Unknown"), Some("Productivity")),
            Some("7".to_string())
        );
        assert_eq!(resolve_category_id(&categories, None, None), None);
    }
}
