use clap::Parser;
use kappa::{api, cli, config, matcher, models, notify, processor};

use api::{HttpTransport, KandjiClient};
use cli::{Cli, Commands};
use config::{FileConfig, RecipeInput, RecipeMap, Settings};
use kappa::error::Result;
use matcher::MatchRequest;
use models::{CustomApp, MatchOutcome, MatchPolicy, PkgInfo};
use notify::Notifier;
use processor::Processor;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let config_dir = cli.config_dir.unwrap_or_else(config::default_config_dir);

    match cli.command {
        Commands::Run {
            pkg,
            name,
            recipe_name,
            prod_name,
            test_name,
            ss_category,
            test_category,
            app_name,
            bundle_id,
            version,
            create_new,
            dry_run,
        } => {
            println!("📦 kappa - Custom App登録\n");

            // 1. 設定読み込み
            println!("[1/3] 設定を読み込み中...");
            let file_config: FileConfig = config::read_json(&config_dir.join(config::CONFIG_FILE_NAME))?;
            let recipe_map: Option<RecipeMap> = if file_config.use_recipe_map {
                Some(config::read_json(&config_dir.join(config::RECIPE_MAP_FILE_NAME))?)
            } else {
                None
            };
            let input = RecipeInput {
                name,
                recipe_name,
                prod_name,
                test_name,
                ss_category,
                test_category,
                create_new,
                dry_run,
            };
            let settings = Settings::resolve(&file_config, recipe_map.as_ref(), &input)?;
            println!("✔ テナント: {}", settings.tenant_url);
            println!("✔ 強制モード: {}", settings.enforcement.config_name());
            if verbose {
                println!("  自動作成: {} / 動的検索: {}", settings.auto_create, settings.dynamic_lookup);
                for target in &settings.targets {
                    println!("  ターゲット: {}", target.name);
                }
            }
            println!();

            // 2. トークン取得と接続確認
            println!("[2/3] APIトークンを取得中...");
            let token = settings.retrieve_token(&settings.token_name)?;
            let slack_webhook = match &settings.slack_webhook_name {
                Some(webhook_name) => Some(settings.retrieve_token(webhook_name)?),
                None => None,
            };
            let transport = HttpTransport::new(Some(token))?;
            let client = KandjiClient::new(&transport, &settings.api_prefix);
            client.validate_tenant(&settings.api_url)?;
            println!("✔ 接続確認完了\n");

            // 3. アップロードと作成/更新
            println!("[3/3] アップロードと登録を実行中...");
            let initial_info = if app_name.is_some() || bundle_id.is_some() || version.is_some() {
                Some(PkgInfo {
                    bundle_id,
                    pkg_id: None,
                    version: version.unwrap_or_default(),
                    app_name,
                })
            } else {
                None
            };
            let notifier = Notifier::new(&transport, slack_webhook);
            let processor = Processor::new(
                &settings,
                client,
                notifier,
                config_dir.join(config::AUDIT_SCRIPT_NAME),
            );
            processor.run(&pkg, initial_info)?;

            println!("\n✅ 完了");
        }

        Commands::Match {
            catalog,
            target,
            pkg_name,
            enforcement,
            category_id,
            auto_create,
            dynamic_lookup,
        } => {
            println!("🔍 kappa - 照合プレビュー\n");

            let content = std::fs::read_to_string(&catalog)?;
            let snapshot: Vec<CustomApp> = serde_json::from_str(&content)?;
            println!("カタログ: {}件のCustom App\n", snapshot.len());

            let outcome = matcher::resolve(
                &snapshot,
                &MatchRequest {
                    target_name: &target,
                    pkg_name: &pkg_name,
                    enforcement,
                    category_id: category_id.as_deref(),
                    policy: MatchPolicy {
                        auto_create,
                        dynamic_lookup,
                    },
                },
            )?;

            match outcome {
                MatchOutcome::Matched(entry) => {
                    println!("✔ 更新対象が決定しました");
                    println!("  名前: {}", entry.name);
                    println!("  ID: {}", entry.id);
                    println!("  PKG: {}", entry.pkg_basename());
                    println!("  強制モード: {}", entry.install_enforcement.config_name());
                }
                MatchOutcome::CreateNew => {
                    println!("✔ 既存アイテムなし、新規作成の対象です");
                }
                MatchOutcome::Ambiguous(entries) => {
                    println!("⚠ {}件の候補が残り、自動では決定できません:", entries.len());
                    for entry in entries {
                        println!("  - {} ({}) PKG: {}", entry.name, entry.id, entry.pkg_basename());
                    }
                }
                MatchOutcome::NoMatch => {
                    println!("一致するCustom Appはありません");
                }
            }
        }

        Commands::Config { show } => {
            let config_path = config_dir.join(config::CONFIG_FILE_NAME);
            let file_config: FileConfig = config::read_json(&config_path)?;

            if show {
                println!("設定: {}", config_path.display());
                println!("  API URL: {}", file_config.kandji.api_url);
                println!("  トークン名: {}", file_config.kandji.token_name);
                println!(
                    "  keystore: env={} keychain={}",
                    file_config.token_keystore.environment, file_config.token_keystore.keychain
                );
                println!(
                    "  強制モード: {}",
                    file_config.enforcement.enforcement_type.as_deref().unwrap_or("install_once")
                );
                println!("  自動作成: {}", file_config.defaults.auto_create_app);
                println!("  動的検索: {}", file_config.defaults.dynamic_lookup);
                println!("  レシピマップ: {}", file_config.use_recipe_map);
                println!(
                    "  Slack通知: {}",
                    if file_config.slack.enabled { "有効" } else { "無効" }
                );
            } else {
                println!("✔ 設定ファイルは有効です: {}", config_path.display());
            }
        }
    }

    Ok(())
}
