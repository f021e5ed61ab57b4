use thiserror::Error;

#[derive(Error, Debug)]
pub enum KappaError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIトークンが見つかりません: {0}。token_keystore設定を確認してください")]
    MissingToken(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("PKG展開エラー: {0}")]
    PkgExpand(String),

    #[error("PKGメタデータ読み込みエラー: {0}")]
    PkgMetadata(String),

    #[error("タイムスタンプ解析エラー: {0}")]
    Timestamp(String),

    #[error("Custom Appレコードが不正: {0}")]
    InvalidCustomApp(String),

    #[error("API呼び出しエラー (HTTP {status}): {detail}")]
    ApiCall { status: u16, detail: String },

    #[error("監査スクリプト更新エラー: {0}")]
    AuditScript(String),

    #[error("HTTP通信エラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("plist解析エラー: {0}")]
    PlistParse(#[from] plist::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KappaError>;
