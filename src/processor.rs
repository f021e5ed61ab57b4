//! 実行フローの統括
//!
//! 1回の実行 = 1つのPKGアップロード + ターゲット名ごとの作成/更新。
//! 流れ: (必要なら)PKG展開 → S3アップロード → カタログ取得 →
//! 照合 → 作成/更新/スキップ。dry-runは書き込み系APIの直前で止まる。

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::api::{KandjiClient, Transport};
use crate::audit::{self, AuditValues};
use crate::config::{self, AppTarget, Settings, TargetKind};
use crate::error::{KappaError, Result};
use crate::matcher::{self, MatchRequest};
use crate::models::{CustomApp, Enforcement, MatchOutcome, MatchPolicy, PkgInfo};
use crate::notify::{Notifier, Severity};
use crate::pkginfo;

/// 解決済みのSelf ServiceカテゴリID
#[derive(Debug, Default)]
struct CategoryIds {
    prod: Option<String>,
    test: Option<String>,
}

pub struct Processor<'a, T: Transport> {
    settings: &'a Settings,
    client: KandjiClient<'a, T>,
    notifier: Notifier<'a, T>,
    audit_script_path: PathBuf,
}

impl<'a, T: Transport> Processor<'a, T> {
    pub fn new(
        settings: &'a Settings,
        client: KandjiClient<'a, T>,
        notifier: Notifier<'a, T>,
        audit_script_path: PathBuf,
    ) -> Self {
        Processor {
            settings,
            client,
            notifier,
            audit_script_path,
        }
    }

    /// PKGをアップロードし、全ターゲット名について作成/更新を行う
    ///
    /// `initial_info`はレシピから渡されたメタデータ。監査強制に必要な値が
    /// 欠けている場合のみPKGを展開して補う。
    pub fn run(&self, pkg_path: &Path, initial_info: Option<PkgInfo>) -> Result<()> {
        let pkg_name = pkg_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| KappaError::FileNotFound(pkg_path.display().to_string()))?;

        let mut pkg_info = initial_info;
        if self.settings.enforcement == Enforcement::ContinuouslyEnforce {
            self.ensure_pkg_info(&mut pkg_info, pkg_path)?;
        }

        let file_key = self.upload(&pkg_name, pkg_path)?;
        let catalog = self.client.list_custom_apps()?;
        let categories = self.resolve_categories()?;

        for target in &self.settings.targets {
            self.process_target(
                target,
                &pkg_name,
                pkg_path,
                &file_key,
                &catalog,
                &categories,
                &mut pkg_info,
            )?;
        }
        Ok(())
    }

    /// プリサインドURLを発行しPKG本体をS3へ送る。リモートのfile_keyを返す
    fn upload(&self, pkg_name: &str, pkg_path: &Path) -> Result<String> {
        let presigned = self.client.presign_upload(pkg_name)?;
        if self.settings.dry_run {
            println!(
                "DRY RUN: {} を {} へアップロードします",
                pkg_path.display(),
                presigned.post_url
            );
        } else {
            println!("{} のアップロードを開始します...", pkg_name);
            self.client.upload_package(&presigned, pkg_path)?;
            println!("アップロード完了");
        }
        Ok(presigned.file_key)
    }

    /// Self Service配布のときだけカテゴリ一覧を引いてIDへ解決する
    fn resolve_categories(&self) -> Result<CategoryIds> {
        if self.settings.enforcement != Enforcement::NoEnforcement {
            return Ok(CategoryIds::default());
        }
        let categories = self.client.list_self_service_categories()?;
        Ok(CategoryIds {
            prod: config::resolve_category_id(
                &categories,
                self.settings.ss_category.as_deref(),
                None,
            ),
            // test側が見つからなければprod側のカテゴリへ寄せる
            test: config::resolve_category_id(
                &categories,
                self.settings.test_category.as_deref(),
                self.settings.ss_category.as_deref(),
            ),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn process_target(
        &self,
        target: &AppTarget,
        pkg_name: &str,
        pkg_path: &Path,
        file_key: &str,
        catalog: &[CustomApp],
        categories: &CategoryIds,
        pkg_info: &mut Option<PkgInfo>,
    ) -> Result<()> {
        let category_id = match target.kind {
            TargetKind::Test => categories.test.as_deref(),
            _ => categories.prod.as_deref(),
        };
        let mut enforcement = self.settings.enforcement;

        let outcome = if self.settings.create_new {
            MatchOutcome::CreateNew
        } else {
            println!("Custom App一覧から {} を検索します", target.name);
            matcher::resolve(
                catalog,
                &MatchRequest {
                    target_name: &target.name,
                    pkg_name,
                    enforcement,
                    category_id,
                    policy: MatchPolicy {
                        auto_create: self.settings.auto_create,
                        dynamic_lookup: self.settings.dynamic_lookup,
                    },
                },
            )?
        };

        match outcome {
            MatchOutcome::Matched(entry) => {
                // 既存アイテムが監査強制なら、ローカル設定よりKandji側を優先する
                if entry.install_enforcement == Enforcement::ContinuouslyEnforce
                    && enforcement != Enforcement::ContinuouslyEnforce
                {
                    println!("既存アイテムの強制モードが設定と異なります... Kandji側の設定を優先します");
                    self.ensure_pkg_info(pkg_info, pkg_path)?;
                    enforcement = Enforcement::ContinuouslyEnforce;
                }
                self.update_app(&entry, target, enforcement, file_key, pkg_info.as_ref())
            }
            MatchOutcome::CreateNew => {
                self.create_app(target, enforcement, file_key, category_id, pkg_info.as_ref())
            }
            MatchOutcome::Ambiguous(entries) => {
                self.report_duplicates(&target.name, &entries);
                Ok(())
            }
            MatchOutcome::NoMatch => {
                eprintln!("ERROR: 更新対象のCustom Appが見つかりません: {}", target.name);
                eprintln!("ERROR: 自動作成が無効のため残りの処理をスキップします");
                Ok(())
            }
        }
    }

    fn create_app(
        &self,
        target: &AppTarget,
        enforcement: Enforcement,
        file_key: &str,
        category_id: Option<&str>,
        pkg_info: Option<&PkgInfo>,
    ) -> Result<()> {
        let mut fields = vec![
            ("name".to_string(), target.name.clone()),
            ("file_key".to_string(), file_key.to_string()),
            ("install_type".to_string(), "package".to_string()),
            ("install_enforcement".to_string(), enforcement.api_value().to_string()),
        ];
        match enforcement {
            Enforcement::ContinuouslyEnforce => {
                // audit_scriptフィールドはここでは埋めず、with_audit内で
                // カスタマイズ後の内容を読み込む
            }
            Enforcement::NoEnforcement => {
                let category_id = category_id.ok_or_else(|| {
                    KappaError::Config(format!(
                        "{} のSelf Serviceカテゴリが解決できません",
                        target.name
                    ))
                })?;
                fields.push(("show_in_self_service".to_string(), "true".to_string()));
                fields.push(("self_service_category_id".to_string(), category_id.to_string()));
            }
            Enforcement::InstallOnce => {}
        }

        self.with_audit(enforcement, target.kind, pkg_info, |audit_field| {
            let mut fields = fields.clone();
            if let Some(script) = audit_field {
                fields.push(("audit_script".to_string(), script));
            }
            if self.settings.dry_run {
                println!(
                    "DRY RUN: Custom App '{}' をPOSTで作成します（file_key={}）",
                    target.name, file_key
                );
                return Ok(());
            }
            let body = self.client.create_custom_app(&fields)?;
            self.report_success("Created", &target.name, &body);
            Ok(())
        })
    }

    fn update_app(
        &self,
        entry: &CustomApp,
        target: &AppTarget,
        enforcement: Enforcement,
        file_key: &str,
        pkg_info: Option<&PkgInfo>,
    ) -> Result<()> {
        self.with_audit(enforcement, target.kind, pkg_info, |audit_field| {
            let mut fields = vec![("file_key".to_string(), file_key.to_string())];
            if let Some(script) = audit_field {
                fields.push(("audit_script".to_string(), script));
            }
            if self.settings.dry_run {
                println!(
                    "DRY RUN: Custom App '{}' ({}) をPATCHで更新します（file_key={}）",
                    target.name, entry.id, file_key
                );
                return Ok(());
            }
            let body = self.client.update_custom_app(&entry.id, &fields)?;
            self.report_success("Updated", &target.name, &body);
            Ok(())
        })
    }

    /// 監査強制のときだけ監査スクリプトをカスタマイズし、操作後に必ず復元する。
    /// クロージャにはカスタマイズ済みスクリプトの内容（非監査ならNone）を渡す
    fn with_audit<F>(
        &self,
        enforcement: Enforcement,
        kind: TargetKind,
        pkg_info: Option<&PkgInfo>,
        op: F,
    ) -> Result<()>
    where
        F: FnOnce(Option<String>) -> Result<()>,
    {
        if enforcement != Enforcement::ContinuouslyEnforce {
            return op(None);
        }

        let info = pkg_info.ok_or_else(|| {
            KappaError::AuditScript("監査強制に必要なPKGメタデータがありません".to_string())
        })?;
        let values = AuditValues {
            app_name: info.app_name.as_deref(),
            bundle_id: info.bundle_id.as_deref(),
            pkg_id: info.pkg_id.as_deref(),
            min_version: (!info.version.is_empty()).then_some(info.version.as_str()),
            enforcement_delay: match kind {
                TargetKind::Test => self.settings.test_delay,
                _ => self.settings.prod_delay,
            },
        };
        audit::customize(&self.audit_script_path, &values)?;

        let result = std::fs::read_to_string(&self.audit_script_path)
            .map_err(KappaError::from)
            .and_then(|script| op(Some(script)));

        if let Err(e) = audit::restore(&self.audit_script_path) {
            eprintln!("WARNING: 監査スクリプトの復元に失敗しました: {}", e);
        }
        result
    }

    /// 監査強制に必要な値（.app名/バンドルIDとバージョン）が揃うまでPKGを展開する
    fn ensure_pkg_info(&self, slot: &mut Option<PkgInfo>, pkg_path: &Path) -> Result<()> {
        let complete = slot.as_ref().is_some_and(|info| {
            (info.app_name.is_some() || info.bundle_id.is_some()) && !info.version.is_empty()
        });
        if complete {
            println!("アプリバージョンが既知のためPKG展開をスキップします");
            return Ok(());
        }
        println!("PKGを展開してID/バージョンを取得します...");
        *slot = Some(pkginfo::inspect(pkg_path)?);
        Ok(())
    }

    fn custom_app_url(&self, app_id: &str) -> String {
        format!(
            "{}/library/custom-apps/{}",
            self.settings.tenant_url.trim_end_matches('/'),
            app_id
        )
    }

    fn report_success(&self, action: &str, target_name: &str, body: &Value) {
        let app_id = body.get("id").and_then(Value::as_str).unwrap_or("unknown");
        let name = body.get("name").and_then(Value::as_str).unwrap_or(target_name);
        let enforcement = body
            .get("install_enforcement")
            .and_then(Value::as_str)
            .and_then(Enforcement::from_config_name)
            .map(|e| e.config_name())
            .unwrap_or("unknown");
        let pkg = body
            .get("file_key")
            .and_then(Value::as_str)
            .map(|key| key.rsplit('/').next().unwrap_or(key))
            .unwrap_or("unknown");
        let url = self.custom_app_url(app_id);

        println!("SUCCESS: Custom App {}", action);
        println!("Custom App '{}' は {} で確認できます", name, url);
        self.notifier.post(
            Severity::Success,
            &format!("Custom App {}", action),
            &format!(
                "*Name*: `{}`\n*ID*: `{}`\n*PKG*: `{}`\n*Enforcement*: `{}`",
                name, app_id, pkg, enforcement
            ),
            Some(&url),
        );
    }

    /// 同名候補が複数残った場合の終端処理。各候補のメタデータを集めて通知する
    fn report_duplicates(&self, target_name: &str, entries: &[CustomApp]) {
        let mut body = String::new();
        for entry in entries {
            let url = self.custom_app_url(&entry.id);
            body.push_str(&format!(
                "*<{}|Custom App Created _{}_>*\n*PKG*: `{}` (*uploaded* _{}_)\n\n",
                url,
                entry.created_at,
                entry.pkg_basename(),
                entry.file_updated
            ));
        }
        eprintln!(
            "ERROR: {} に複数（{}件）の候補が一致したためアップロードを反映できません\n{}",
            target_name,
            entries.len(),
            body
        );
        self.notifier.post(
            Severity::Error,
            &format!("Found Duplicates of Custom App {}", target_name),
            &body,
            None,
        );
    }
}
