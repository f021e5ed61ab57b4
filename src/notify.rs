//! Slack Webhookへの結果通知
//!
//! Webhook URLが未設定ならすべて黙ってスキップする（通知は任意機能）。
//! 通知自体の失敗は処理を止めず、警告を出すだけにする。

use serde_json::json;

use crate::api::Transport;

/// 通知の重大度。添付の色に対応する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl Severity {
    fn color(self) -> &'static str {
        match self {
            Severity::Success => "00FF00",
            Severity::Warning => "E8793B",
            Severity::Error => "FF0000",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// Slack通知の送信口
pub struct Notifier<'a, T: Transport> {
    transport: &'a T,
    webhook_url: Option<String>,
}

impl<'a, T: Transport> Notifier<'a, T> {
    pub fn new(transport: &'a T, webhook_url: Option<String>) -> Self {
        Notifier {
            transport,
            webhook_url,
        }
    }

    /// メッセージを投稿する。Webhook未設定なら何もしない
    pub fn post(&self, severity: Severity, header: &str, body: &str, title_link: Option<&str>) {
        let Some(webhook_url) = &self.webhook_url else {
            return;
        };

        let mut attachment = json!({
            "color": severity.color(),
            "title": format!("{}: {}", severity.label(), header),
            "text": body,
        });
        if let Some(link) = title_link {
            attachment["title_link"] = json!(ensure_https(link));
        }
        let payload = json!({ "attachments": [attachment] });

        match self.transport.post_json(webhook_url, &payload) {
            Ok((status, _)) if status <= 204 => {
                println!("Slackチャンネルへ通知しました");
            }
            Ok((status, response)) => {
                eprintln!("WARNING: Slack通知に失敗しました (HTTP {}): {}", status, response);
            }
            Err(e) => {
                eprintln!("WARNING: Slack通知に失敗しました: {}", e);
            }
        }
    }
}

fn ensure_https(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
