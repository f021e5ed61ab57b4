//! Self Serviceカテゴリによる同名アイテムの絞り込み
//!
//! 強制モードがSelf Service配布（no_enforcement）でカテゴリIDが
//! 分かっている場合のみ適用する。1件に絞れたときだけ確定とし、
//! 絞れない場合は入力をそのまま返す（ベストエフォート、破壊的でない）。

use crate::models::{CustomApp, Enforcement};

/// カテゴリで1件に絞れた場合のみ`Some`を返す
pub fn narrow_by_category(
    candidates: &[CustomApp],
    enforcement: Enforcement,
    category_id: Option<&str>,
) -> Option<CustomApp> {
    if enforcement != Enforcement::NoEnforcement {
        return None;
    }
    let category_id = category_id?;

    let filtered: Vec<&CustomApp> = candidates
        .iter()
        .filter(|app| {
            app.show_in_self_service && app.self_service_category_id.as_deref() == Some(category_id)
        })
        .collect();

    if filtered.len() == 1 {
        Some(filtered[0].clone())
    } else {
        None
    }
}
