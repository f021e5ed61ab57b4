use crate::models::Enforcement;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kappa")]
#[command(about = "Kandji Custom App自動登録ツール（AutoPkgポストプロセッサ）", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ディレクトリ（デフォルト: 実行ファイルと同じ場所）
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// PKGをアップロードしてCustom Appを作成/更新
    Run {
        /// ビルド済みPKGのパス
        #[arg(required = true)]
        pkg: PathBuf,

        /// レシピのNAME（Custom App名の元になる）
        #[arg(short, long, required = true)]
        name: String,

        /// レシピ名（レシピマップの部分一致照合用。省略時はNAME）
        #[arg(long)]
        recipe_name: Option<String>,

        /// 本番用Custom App名
        #[arg(long)]
        prod_name: Option<String>,

        /// テスト用Custom App名
        #[arg(long)]
        test_name: Option<String>,

        /// Self Serviceカテゴリ名
        #[arg(long)]
        ss_category: Option<String>,

        /// テスト用Self Serviceカテゴリ名
        #[arg(long)]
        test_category: Option<String>,

        /// ペイロード内の.app名（監査スクリプト用）
        #[arg(long)]
        app_name: Option<String>,

        /// ペイロード内の.appのバンドルID（app_name未指定時に使用）
        #[arg(long)]
        bundle_id: Option<String>,

        /// ペイロードのバージョン（監査スクリプト用）
        #[arg(long)]
        version: Option<String>,

        /// 照合せず常に新規作成する
        #[arg(long)]
        create_new: bool,

        /// 変更を適用せずプレビュー
        #[arg(long)]
        dry_run: bool,
    },

    /// カタログのスナップショットに対して照合判定のみ実行
    Match {
        /// カタログJSONファイル（Custom App一覧の配列）
        #[arg(required = true)]
        catalog: PathBuf,

        /// Custom App名（完全一致検索のターゲット）
        #[arg(short, long, required = true)]
        target: String,

        /// 新しくビルドしたPKGのファイル名
        #[arg(short, long, required = true)]
        pkg_name: String,

        /// 強制モード (audit_enforce/self_service/install_once)
        #[arg(long, default_value = "install_once")]
        enforcement: Enforcement,

        /// Self ServiceカテゴリID（絞り込み用）
        #[arg(long)]
        category_id: Option<String>,

        /// 一致なしの場合に新規作成と判定する
        #[arg(long)]
        auto_create: bool,

        /// PKG名の類似度による動的検索を有効にする
        #[arg(long)]
        dynamic_lookup: bool,
    },

    /// 設定を表示
    Config {
        /// 設定内容を表示
        #[arg(long)]
        show: bool,
    },
}
