//! PKG名の類似度スコアリング
//!
//! アップロード時に付与されるランダムサフィックスを除去した上で、
//! Ratcliff/Obershelp法（最長一致ブロックの再帰分割）で
//! 0.0〜1.0の類似度を計算する。

use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;

lazy_static! {
    /// `_` + 8文字の英数字がファイル拡張子`.pkg`の直前に埋め込まれる
    static ref UPLOAD_SUFFIX: Regex = Regex::new(r"_\w{8}(\.pkg)$").unwrap();
}

/// アップロード識別子サフィックスを除去する
///
/// `Firefox-120.0_1a2b3c4d.pkg` → `Firefox-120.0.pkg`
pub fn strip_upload_suffix(name: &str) -> String {
    UPLOAD_SUFFIX.replace(name, "$1").into_owned()
}

/// 候補名の集合をターゲット名との類似度でスコアリングし、降順で返す
///
/// スコアが同点の場合は入力順を維持する（安定ソート）。
pub fn rank(candidates: &[String], target: &str) -> Vec<(String, f64)> {
    let mut scored: Vec<(String, f64)> = candidates
        .iter()
        .map(|name| {
            let stripped = strip_upload_suffix(name);
            (name.clone(), ratio(&stripped, target))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored
}

/// Ratcliff/Obershelp類似度
///
/// 2 * (一致ブロックの合計長) / (両文字列の合計長)
pub fn ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let total = a_chars.len() + b_chars.len();

    if total == 0 {
        return 1.0;
    }

    let matched = matching_total(&a_chars, &b_chars);
    2.0 * matched as f64 / total as f64
}

/// 最長一致ブロックを見つけ、その左右を再帰的に処理して一致文字数を合計する
fn matching_total(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (a_start, b_start, size) = longest_match(a, b);
    if size == 0 {
        return 0;
    }

    size + matching_total(&a[..a_start], &b[..b_start])
        + matching_total(&a[a_start + size..], &b[b_start + size..])
}

/// 最長共通部分文字列の位置と長さを返す
///
/// 同じ長さの候補が複数あれば、aの位置・bの位置の順で最も早いものを選ぶ。
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0usize, 0usize, 0usize);
    let mut prev = vec![0usize; b.len() + 1];

    for (i, &ac) in a.iter().enumerate() {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, &bc) in b.iter().enumerate() {
            if ac == bc {
                let len = prev[j] + 1;
                cur[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        prev = cur;
    }

    best
}
