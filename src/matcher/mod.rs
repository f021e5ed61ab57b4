//! カタログ照合エンジン
//!
//! ビルド済みPKGとKandjiカタログのスナップショットから、
//! 更新対象のCustom Appを一意に決める（または新規作成・照合不能を報告する）。
//!
//! ## 判定フロー
//! 1. 名前の完全一致検索
//! 2. 複数一致時: Self Serviceカテゴリで絞り込み
//! 3. 解決しなければ動的検索: 類似度フィルタ → バージョン順 → タイムスタンプ判定
//!
//! ネットワークや設定には依存しない純粋な判定層。カタログは実行ごとに
//! 取得した不変スナップショットとして渡される。

pub mod category;
pub mod similarity;
pub mod tiebreak;
pub mod version;

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{CustomApp, Enforcement, MatchOutcome, MatchPolicy};

/// 動的検索で候補に残すための類似度下限
///
/// バージョン差は許容しつつ、名前の違うアプリを除外できる値。
pub const RATIO_LIMIT: f64 = 0.85;

/// 1回の照合に必要な入力
#[derive(Debug, Clone)]
pub struct MatchRequest<'a> {
    /// Custom App名（完全一致検索のターゲット）
    pub target_name: &'a str,
    /// 新しくビルドしたPKGのファイル名
    pub pkg_name: &'a str,
    pub enforcement: Enforcement,
    /// 解決済みSelf ServiceカテゴリID
    pub category_id: Option<&'a str>,
    pub policy: MatchPolicy,
}

/// カタログスナップショットに対して照合を実行する
pub fn resolve(catalog: &[CustomApp], request: &MatchRequest<'_>) -> Result<MatchOutcome> {
    let hits: Vec<&CustomApp> = catalog
        .iter()
        .filter(|app| app.name == request.target_name)
        .collect();

    match hits.len() {
        0 => {
            if request.policy.auto_create {
                Ok(MatchOutcome::CreateNew)
            } else if request.policy.dynamic_lookup {
                dynamic_lookup(catalog, request.pkg_name, None)
            } else {
                Ok(MatchOutcome::NoMatch)
            }
        }
        1 => Ok(MatchOutcome::Matched(hits[0].clone())),
        _ => {
            let hit_set: Vec<CustomApp> = hits.iter().map(|app| (*app).clone()).collect();

            // カテゴリで1件に絞れた場合のみ確定
            if let Some(entry) = category::narrow_by_category(
                &hit_set,
                request.enforcement,
                request.category_id,
            ) {
                return Ok(MatchOutcome::Matched(entry));
            }

            if request.policy.dynamic_lookup {
                dynamic_lookup(catalog, request.pkg_name, Some(&hit_set))
            } else {
                // 自動では決められない。オペレータ通知が必要な終端状態
                Ok(MatchOutcome::Ambiguous(hit_set))
            }
        }
    }
}

/// PKG名の類似度による動的検索
///
/// `seed`が与えられた場合（同名複数一致からの委譲）は、seedのfile_keyに
/// 含まれるPKG名だけを対象にし、seedの名前が一意ならラベルとして記録して
/// 最終段の絞り込みに使う。どの段階で候補が尽きてもNoMatchであり、
/// エラーにはしない。
fn dynamic_lookup(
    catalog: &[CustomApp],
    pkg_name: &str,
    seed: Option<&[CustomApp]>,
) -> Result<MatchOutcome> {
    let all_pkg_names: Vec<String> = catalog
        .iter()
        .filter(|app| app.file_key.ends_with(".pkg"))
        .map(|app| app.pkg_basename().to_string())
        .collect();

    let ranked = similarity::rank(&all_pkg_names, pkg_name);
    let mut possible: Vec<String> = ranked
        .into_iter()
        .filter(|(_, score)| *score >= RATIO_LIMIT)
        .map(|(name, _)| name)
        .collect();

    let mut seed_name: Option<String> = None;
    if let Some(seed) = seed {
        // seed集合に属するPKGのみが更新対象
        possible.retain(|pkg| seed.iter().any(|app| app.file_key.contains(pkg.as_str())));

        let names: HashSet<&str> = seed.iter().map(|app| app.name.as_str()).collect();
        if names.len() == 1 {
            seed_name = names.into_iter().next().map(str::to_string);
        }
    }

    if possible.is_empty() {
        return Ok(MatchOutcome::NoMatch);
    }

    let versioned: Vec<(String, String)> = possible
        .iter()
        .map(|pkg| (pkg.clone(), version::sanitize(pkg)))
        .collect();

    let ordered = tiebreak::pick_newest(&versioned, catalog)?;
    let winner = match ordered.first() {
        Some(name) => name,
        None => return Ok(MatchOutcome::NoMatch),
    };

    let mut entries: Vec<&CustomApp> = catalog
        .iter()
        .filter(|app| app.file_key.contains(winner.as_str()))
        .collect();

    // 同じfile_keyを複数アイテムが共有する場合、seedの名前で絞る
    if entries.len() > 1 {
        if let Some(name) = &seed_name {
            entries.retain(|app| app.name.contains(name.as_str()));
        }
    }

    match entries.len() {
        0 => Ok(MatchOutcome::NoMatch),
        1 => Ok(MatchOutcome::Matched(entries[0].clone())),
        // 1件に絞り切れなければ保守的に曖昧のまま返す
        _ => Ok(MatchOutcome::Ambiguous(
            entries.into_iter().cloned().collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, name: &str, file_key: &str) -> CustomApp {
        CustomApp {
            id: id.to_string(),
            name: name.to_string(),
            file_key: file_key.to_string(),
            install_enforcement: Enforcement::InstallOnce,
            show_in_self_service: false,
            self_service_category_id: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            file_updated: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn request<'a>(target: &'a str, pkg: &'a str, policy: MatchPolicy) -> MatchRequest<'a> {
        MatchRequest {
            target_name: target,
            pkg_name: pkg,
            enforcement: Enforcement::InstallOnce,
            category_id: None,
            policy,
        }
    }

    #[test]
    fn test_exact_single_hit() {
        let catalog = vec![
            app("1", "Firefox (AutoPkg)", "lib/Firefox-121.0_aabbccdd.pkg"),
            app("2", "Chrome (AutoPkg)", "lib/Chrome-120.0_eeffgghh.pkg"),
        ];
        let outcome = resolve(
            &catalog,
            &request("Firefox (AutoPkg)", "Firefox-122.0.pkg", MatchPolicy::default()),
        )
        .unwrap();
        assert_eq!(outcome, MatchOutcome::Matched(catalog[0].clone()));
    }

    #[test]
    fn test_zero_hits_no_policies_is_no_match() {
        let catalog = vec![app("1", "Firefox (AutoPkg)", "lib/Firefox_aabbccdd.pkg")];
        let outcome = resolve(
            &catalog,
            &request("GIMP (AutoPkg)", "GIMP-2.10.pkg", MatchPolicy::default()),
        )
        .unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[test]
    fn test_zero_hits_auto_create() {
        let catalog = vec![app("1", "Firefox (AutoPkg)", "lib/Firefox_aabbccdd.pkg")];
        let policy = MatchPolicy {
            auto_create: true,
            dynamic_lookup: false,
        };
        let outcome = resolve(&catalog, &request("GIMP (AutoPkg)", "GIMP-2.10.pkg", policy)).unwrap();
        assert_eq!(outcome, MatchOutcome::CreateNew);
    }

    #[test]
    fn test_auto_create_takes_precedence_over_dynamic_lookup() {
        let catalog = vec![app("1", "Firefox (AutoPkg)", "lib/Firefox-121.0_aabbccdd.pkg")];
        let policy = MatchPolicy {
            auto_create: true,
            dynamic_lookup: true,
        };
        let outcome = resolve(
            &catalog,
            &request("Firefox", "Firefox-122.0.pkg", policy),
        )
        .unwrap();
        assert_eq!(outcome, MatchOutcome::CreateNew);
    }

    #[test]
    fn test_multi_hit_without_policies_is_ambiguous() {
        let catalog = vec![
            app("1", "Firefox (AutoPkg)", "lib/Firefox-120.0_aabbccdd.pkg"),
            app("2", "Firefox (AutoPkg)", "lib/Firefox-121.0_eeffgghh.pkg"),
        ];
        let outcome = resolve(
            &catalog,
            &request("Firefox (AutoPkg)", "Firefox-122.0.pkg", MatchPolicy::default()),
        )
        .unwrap();
        match outcome {
            MatchOutcome::Ambiguous(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_dynamic_lookup_unseeded_picks_highest_version() {
        let catalog = vec![
            app("1", "Old Name", "lib/Slack-4.35.0_aabbccdd.pkg"),
            app("2", "Older Name", "lib/Slack-4.36.0_eeffgghh.pkg"),
        ];
        let policy = MatchPolicy {
            auto_create: false,
            dynamic_lookup: true,
        };
        let outcome = resolve(
            &catalog,
            &request("Slack (AutoPkg)", "Slack-4.37.0.pkg", policy),
        )
        .unwrap();
        assert_eq!(outcome, MatchOutcome::Matched(catalog[1].clone()));
    }

    #[test]
    fn test_dynamic_lookup_below_threshold_is_no_match() {
        let catalog = vec![app("1", "Other", "lib/CompletelyDifferent_aabbccdd.pkg")];
        let policy = MatchPolicy {
            auto_create: false,
            dynamic_lookup: true,
        };
        let outcome = resolve(
            &catalog,
            &request("Slack (AutoPkg)", "Slack-4.37.0.pkg", policy),
        )
        .unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[test]
    fn test_dynamic_lookup_seeded_restricts_to_seed_file_keys() {
        // 同名2件（seed）と、より高いバージョンだが別名のアイテム
        let mut seed_a = app("1", "Slack (AutoPkg)", "lib/Slack-4.35.0_aabbccdd.pkg");
        seed_a.file_updated = "2024-01-01T00:00:00Z".to_string();
        let seed_b = app("2", "Slack (AutoPkg)", "lib/Slack-4.36.0_eeffgghh.pkg");
        let outsider = app("3", "Slack Beta", "lib/Slack-9.0.0_iijjkkll.pkg");
        let catalog = vec![seed_a, seed_b.clone(), outsider];

        let policy = MatchPolicy {
            auto_create: false,
            dynamic_lookup: true,
        };
        let outcome = resolve(
            &catalog,
            &request("Slack (AutoPkg)", "Slack-4.37.0.pkg", policy),
        )
        .unwrap();
        // seed外の9.0.0は対象にならず、seed内の最高バージョンが選ばれる
        assert_eq!(outcome, MatchOutcome::Matched(seed_b));
    }

    #[test]
    fn test_matched_entry_always_from_snapshot() {
        let catalog = vec![
            app("1", "Slack (AutoPkg)", "lib/Slack-4.35.0_aabbccdd.pkg"),
            app("2", "Slack (AutoPkg)", "lib/Slack-4.36.0_eeffgghh.pkg"),
        ];
        let policy = MatchPolicy {
            auto_create: false,
            dynamic_lookup: true,
        };
        let outcome = resolve(
            &catalog,
            &request("Slack (AutoPkg)", "Slack-4.37.0.pkg", policy),
        )
        .unwrap();
        if let MatchOutcome::Matched(entry) = outcome {
            assert!(catalog.contains(&entry));
        } else {
            panic!("expected Matched");
        }
    }

    #[test]
    fn test_non_pkg_file_keys_are_ignored() {
        let catalog = vec![app("1", "Tool", "lib/Tool-1.0.0_aabbccdd.dmg")];
        let policy = MatchPolicy {
            auto_create: false,
            dynamic_lookup: true,
        };
        let outcome = resolve(&catalog, &request("Tool (AutoPkg)", "Tool-1.1.0.pkg", policy)).unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }
}
