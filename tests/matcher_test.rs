//! 照合エンジンの結合テスト
//!
//! 判定フロー全体（完全一致 → カテゴリ絞り込み → 動的検索）を
//! カタログのスナップショットに対して検証する。

use kappa::matcher::{self, similarity, version, MatchRequest};
use kappa::models::{CustomApp, Enforcement, MatchOutcome, MatchPolicy};

fn entry(id: &str, name: &str, file_key: &str) -> CustomApp {
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

fn resolve(
    catalog: &[CustomApp],
    target: &str,
    pkg_name: &str,
    enforcement: Enforcement,
    category_id: Option<&str>,
    policy: MatchPolicy,
) -> MatchOutcome {
    matcher::resolve(
        catalog,
        &MatchRequest {
            target_name: target,
            pkg_name,
            enforcement,
            category_id,
            policy,
        },
    )
    .expect("照合がエラーになった")
}

#[test]
fn test_matched_entry_always_comes_from_snapshot() {
    let catalog = vec![
        entry("1", "Firefox (AutoPkg)", "lib/Firefox-121.0_aabbccdd.pkg"),
        entry("2", "GIMP (AutoPkg)", "lib/GIMP-2.10_eeffgghh.pkg"),
    ];
    let outcome = resolve(
        &catalog,
        "Firefox (AutoPkg)",
        "Firefox-122.0.pkg",
        Enforcement::InstallOnce,
        None,
        MatchPolicy::default(),
    );
    match outcome {
        MatchOutcome::Matched(found) => assert!(catalog.contains(&found)),
        MatchOutcome::NoMatch => {}
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_sanitizer_is_idempotent() {
    for raw in [
        "GoogleChrome-121.0.6167.184_1a2b3c4d.pkg",
        "Microsoft Teams 1.6.00.pkg",
        "NoDigitsHere.pkg",
        "",
    ] {
        let once = version::sanitize(raw);
        assert_eq!(version::sanitize(&once), once, "入力: {:?}", raw);
    }
}

#[test]
fn test_rank_sorted_descending_and_self_score_is_one() {
    let candidates = vec![
        "Firefox-121.0_1a2b3c4d.pkg".to_string(),
        "Chrome-120.0_5e6f7a8b.pkg".to_string(),
        "Firefox-122.0_9c0d1e2f.pkg".to_string(),
    ];
    let ranked = similarity::rank(&candidates, "Firefox-121.0.pkg");

    for pair in ranked.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
    // サフィックス除去後の自己一致は1.0
    assert_eq!(ranked[0].0, "Firefox-121.0_1a2b3c4d.pkg");
    assert!((ranked[0].1 - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_identical_versions_tie_break_on_earliest_upload() {
    // 同一バージョン2.1.0のPKGを2件、file_updatedだけ異なる状態で用意
    let mut candidate_a = entry("a", "Old A", "lib/App-2.1.0_11111111.pkg");
    candidate_a.file_updated = "2024-01-01T00:00:00Z".to_string();
    let mut candidate_b = entry("b", "Old B", "lib/App-2.1.0_22222222.pkg");
    candidate_b.file_updated = "2024-06-01T00:00:00Z".to_string();

    let policy = MatchPolicy {
        auto_create: false,
        dynamic_lookup: true,
    };

    // 入力順に依存せず、先にアップロードされたAが選ばれる
    for catalog in [
        vec![candidate_a.clone(), candidate_b.clone()],
        vec![candidate_b.clone(), candidate_a.clone()],
    ] {
        let outcome = resolve(
            &catalog,
            "App (AutoPkg)",
            "App-2.1.0.pkg",
            Enforcement::InstallOnce,
            None,
            policy,
        );
        assert_eq!(outcome, MatchOutcome::Matched(candidate_a.clone()));
    }
}

#[test]
fn test_category_resolves_chrome_pair() {
    // 同名2件: Self Serviceカテゴリ7の配布用と、監査強制用
    let mut self_service = entry("ss", "Chrome (AutoPkg)", "lib/Chrome-120_11111111.pkg");
    self_service.install_enforcement = Enforcement::NoEnforcement;
    self_service.show_in_self_service = true;
    self_service.self_service_category_id = Some("7".to_string());
    let mut enforced = entry("enf", "Chrome (AutoPkg)", "lib/Chrome-120_22222222.pkg");
    enforced.install_enforcement = Enforcement::ContinuouslyEnforce;

    let catalog = vec![self_service.clone(), enforced];
    let outcome = resolve(
        &catalog,
        "Chrome (AutoPkg)",
        "Chrome-121.pkg",
        Enforcement::NoEnforcement,
        Some("7"),
        MatchPolicy::default(),
    );
    assert_eq!(outcome, MatchOutcome::Matched(self_service));
}

#[test]
fn test_dynamic_lookup_selects_highest_version() {
    let older = entry("1", "App Old", "lib/App-1.2.0_1a2b3c4d.pkg");
    let newer = entry("2", "App New", "lib/App-1.3.0_9z8y7x6w.pkg");
    let catalog = vec![older, newer.clone()];

    let outcome = resolve(
        &catalog,
        "App (AutoPkg)",
        "App-1.4.0.pkg",
        Enforcement::InstallOnce,
        None,
        MatchPolicy {
            auto_create: false,
            dynamic_lookup: true,
        },
    );
    assert_eq!(outcome, MatchOutcome::Matched(newer));
}

#[test]
fn test_zero_hits_without_policies_is_no_match() {
    let catalog = vec![entry("1", "Firefox (AutoPkg)", "lib/Firefox_11111111.pkg")];
    let outcome = resolve(
        &catalog,
        "Slack (AutoPkg)",
        "Slack-4.37.0.pkg",
        Enforcement::InstallOnce,
        None,
        MatchPolicy {
            auto_create: false,
            dynamic_lookup: false,
        },
    );
    assert_eq!(outcome, MatchOutcome::NoMatch);
}

#[test]
fn test_partial_category_narrowing_keeps_all_candidates() {
    // 同名3件、カテゴリ絞り込みでは2件までしか絞れないケース
    let make = |id: &str, category: Option<&str>| {
        let mut app = entry(id, "Zoom (AutoPkg)", &format!("lib/Zoom_{}.pkg", id));
        app.install_enforcement = Enforcement::NoEnforcement;
        app.show_in_self_service = category.is_some();
        app.self_service_category_id = category.map(str::to_string);
        app
    };
    let catalog = vec![
        make("aaaaaaaa", Some("7")),
        make("bbbbbbbb", Some("7")),
        make("cccccccc", None),
    ];

    let outcome = resolve(
        &catalog,
        "Zoom (AutoPkg)",
        "Zoom-5.17.0.pkg",
        Enforcement::NoEnforcement,
        Some("7"),
        MatchPolicy {
            auto_create: false,
            dynamic_lookup: false,
        },
    );
    // 1件に絞れない絞り込みは無効、3件すべてが報告される
    match outcome {
        MatchOutcome::Ambiguous(entries) => assert_eq!(entries.len(), 3),
        other => panic!("expected Ambiguous, got {:?}", other),
    }
}
