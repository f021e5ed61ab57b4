//! Kandji APIクライアントとHTTPトランスポート境界
//!
//! 照合エンジンはネットワークに触れないため、HTTP実行は`Transport`トレイトで
//! 切り出す。本番は`HttpTransport`（reqwest blocking）、テストはモック実装を使う。

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::error::{KappaError, Result};
use crate::models::{CustomApp, SelfServiceCategory};

/// HTTP実行の境界
pub trait Transport {
    /// フォームフィールド付きでリクエストを実行し、(HTTPステータス, JSONボディ)を返す
    fn execute(&self, method: &str, url: &str, form: &[(String, String)]) -> Result<(u16, Value)>;

    /// S3プリサインドアップロード（フォームフィールド + ファイル本体）
    fn upload(&self, url: &str, fields: &[(String, String)], file: &Path) -> Result<(u16, Value)>;

    /// JSONボディのPOST（Slack Webhook用）
    fn post_json(&self, url: &str, body: &Value) -> Result<(u16, Value)>;
}

/// reqwest blockingによる実装
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(HttpTransport { client, token })
    }

    fn request(&self, method: &str, url: &str) -> Result<reqwest::blocking::RequestBuilder> {
        let method: reqwest::Method = method
            .parse()
            .map_err(|_| KappaError::Config(format!("不正なHTTPメソッド: {}", method)))?;
        let mut builder = self.client.request(method, url);

        // Kandji APIに対してのみ認証ヘッダと識別クエリを付ける
        if url.to_lowercase().contains("kandji.io/api") {
            if let Some(token) = &self.token {
                builder = builder.bearer_auth(token);
            }
            builder = builder.query(&[("source", "kappa")]);
        }
        Ok(builder)
    }

    fn into_response(response: reqwest::blocking::Response) -> Result<(u16, Value)> {
        let status = response.status().as_u16();
        let text = response.text().unwrap_or_default();
        let body = serde_json::from_str(&text)
            .unwrap_or_else(|_| serde_json::json!({ "response": text }));
        Ok((status, body))
    }
}

impl Transport for HttpTransport {
    fn execute(&self, method: &str, url: &str, form: &[(String, String)]) -> Result<(u16, Value)> {
        let mut builder = self.request(method, url)?;
        if !form.is_empty() {
            let mut multipart = reqwest::blocking::multipart::Form::new();
            for (key, value) in form {
                multipart = multipart.text(key.clone(), value.clone());
            }
            builder = builder.multipart(multipart);
        }
        Self::into_response(builder.send()?)
    }

    fn upload(&self, url: &str, fields: &[(String, String)], file: &Path) -> Result<(u16, Value)> {
        let mut multipart = reqwest::blocking::multipart::Form::new();
        for (key, value) in fields {
            multipart = multipart.text(key.clone(), value.clone());
        }
        multipart = multipart.file("file", file)?;
        let builder = self.client.post(url).multipart(multipart);
        Self::into_response(builder.send()?)
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<(u16, Value)> {
        Self::into_response(self.client.post(url).json(body).send()?)
    }
}

/// S3プリサインドアップロードのレスポンス
#[derive(Debug, Clone, Deserialize)]
pub struct PresignedUpload {
    pub post_url: String,
    /// S3フォームにそのまま転送するフィールド群
    pub post_data: serde_json::Map<String, Value>,
    /// 登録時に使うリモートPKGパス
    pub file_key: String,
}

/// Kandji APIの型付き操作
pub struct KandjiClient<'a, T: Transport> {
    transport: &'a T,
    api_prefix: String,
    /// S3反映・503再試行の待機時間
    settle: Duration,
}

impl<'a, T: Transport> KandjiClient<'a, T> {
    pub fn new(transport: &'a T, api_prefix: &str) -> Self {
        KandjiClient {
            transport,
            api_prefix: api_prefix.trim_end_matches('/').to_string(),
            settle: Duration::from_secs(5),
        }
    }

    /// テスト用に待機時間を変更する
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn custom_apps_url(&self) -> String {
        format!("{}/library/custom-apps", self.api_prefix)
    }

    /// カタログのスナップショットを取得する
    pub fn list_custom_apps(&self) -> Result<Vec<CustomApp>> {
        let url = self.custom_apps_url();
        let (status, body) = self.transport.execute("GET", &url, &[])?;
        check_status(status, &body)?;

        let results = body
            .get("results")
            .cloned()
            .ok_or_else(|| KappaError::InvalidCustomApp("resultsフィールドがありません".to_string()))?;
        serde_json::from_value(results).map_err(|e| KappaError::InvalidCustomApp(e.to_string()))
    }

    pub fn list_self_service_categories(&self) -> Result<Vec<SelfServiceCategory>> {
        let url = format!("{}/self-service/categories", self.api_prefix);
        let (status, body) = self.transport.execute("GET", &url, &[])?;
        check_status(status, &body)?;
        serde_json::from_value(body).map_err(KappaError::from)
    }

    /// PKGアップロード用のプリサインドURLを発行する
    pub fn presign_upload(&self, pkg_name: &str) -> Result<PresignedUpload> {
        let url = format!("{}/upload", self.custom_apps_url());
        let form = vec![("name".to_string(), pkg_name.to_string())];
        let (status, body) = self.transport.execute("POST", &url, &form)?;
        check_status(status, &body)?;
        serde_json::from_value(body).map_err(KappaError::from)
    }

    /// S3へPKG本体をアップロードする
    pub fn upload_package(&self, presigned: &PresignedUpload, pkg_path: &Path) -> Result<()> {
        let fields: Vec<(String, String)> = presigned
            .post_data
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect();

        let (status, body) = self.transport.upload(&presigned.post_url, &fields, pkg_path)?;
        check_status(status, &body)?;

        // S3側の処理完了を待つ
        std::thread::sleep(self.settle);
        Ok(())
    }

    pub fn create_custom_app(&self, fields: &[(String, String)]) -> Result<Value> {
        self.execute_mutation("POST", &self.custom_apps_url(), fields)
    }

    pub fn update_custom_app(&self, app_id: &str, fields: &[(String, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.custom_apps_url(), app_id);
        self.execute_mutation("PATCH", &url, fields)
    }

    /// テナントURLの妥当性を確認する
    pub fn validate_tenant(&self, api_url: &str) -> Result<()> {
        let probe_url = api_url.replace(".api.", ".web-api.");
        let (_, body) = self.transport.execute("GET", &probe_url, &[])?;
        let not_found = body
            .as_object()
            .map(|map| map.values().any(|v| v.as_str() == Some("tenantNotFound")))
            .unwrap_or(false);
        if not_found {
            return Err(KappaError::Config(format!(
                "Kandji URL {} が無効です",
                api_url
            )));
        }
        Ok(())
    }

    /// 作成・更新の実行。HTTP 503はアップロード処理中なので待機して1回だけ再試行する
    fn execute_mutation(&self, method: &str, url: &str, fields: &[(String, String)]) -> Result<Value> {
        let (status, body) = self.transport.execute(method, url, fields)?;
        if status == 503 {
            eprintln!(
                "WARNING (HTTP 503): {}。{}秒後に再試行します...",
                body.get("detail").and_then(Value::as_str).unwrap_or("processing"),
                self.settle.as_secs()
            );
            std::thread::sleep(self.settle);
            let (status, body) = self.transport.execute(method, url, fields)?;
            check_status(status, &body)?;
            return Ok(body);
        }
        check_status(status, &body)?;
        Ok(body)
    }
}

/// HTTPステータスを検証し、失敗時は原因のヒント付きでエラーを返す
fn check_status(status: u16, body: &Value) -> Result<()> {
    if status <= 204 {
        return Ok(());
    }

    let mut detail = body
        .get("detail")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    match status {
        401 => detail.push_str("。トークンが設定されているか確認してください"),
        403 => detail.push_str("。トークンの権限を確認してください"),
        _ => {}
    }

    Err(KappaError::ApiCall { status, detail })
}
