//! PKG名からのバージョン抽出と比較
//!
//! ファイル名には名前・スペース・ランダムサフィックスが混ざるため、
//! 固定順の置換パイプラインでバージョン文字列だけを残す。
//! 抽出に失敗しても（空・数字なし）エラーにはせず、最低順位として扱う。

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UPLOAD_SUFFIX: Regex = Regex::new(r"_\w{8}(\.pkg)$").unwrap();
    static ref NON_VERSION_CHARS: Regex = Regex::new(r"[^0-9.]").unwrap();
    static ref DOT_RUNS: Regex = Regex::new(r"\.{2,}").unwrap();
    static ref EDGE_DOTS: Regex = Regex::new(r"^\.|\.$").unwrap();
}

/// PKG名を比較可能なバージョン文字列へ正規化する
///
/// 置換は固定順で適用される（各段は前段の出力に対して動く）:
/// 1. アップロード識別子サフィックスを除去
/// 2. スペースを`.`へ
/// 3. 数字と`.`以外を除去
/// 4. 連続する`.`を1つへ圧縮
/// 5. 先頭・末尾の`.`を除去
pub fn sanitize(name: &str) -> String {
    let step1 = UPLOAD_SUFFIX.replace(name, "$1");
    let step2 = step1.replace(' ', ".");
    let step3 = NON_VERSION_CHARS.replace_all(&step2, "");
    let step4 = DOT_RUNS.replace_all(&step3, ".");
    EDGE_DOTS.replace_all(&step4, "").into_owned()
}

/// 数値のドット区切りコンポーネントによる緩いバージョン順序
///
/// セマンティックバージョン比較のみ必要で、プレリリース等の表記は
/// 正規化段階で落ちているため扱わない。解析できない文字列は
/// 空のコンポーネント列となり、常に最小として並ぶ。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PkgVersion(Vec<u64>);

impl PkgVersion {
    pub fn parse(s: &str) -> Self {
        let components = s
            .split('.')
            .filter_map(|part| part.parse::<u64>().ok())
            .collect();
        PkgVersion(components)
    }
}
