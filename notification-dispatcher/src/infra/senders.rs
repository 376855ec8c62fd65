// This file is part of xrpl-nft-monitor.
// Copyright (C) 2025 xrpl-nft-monitor contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::{
    NotificationPayload, SendOutcome, Sender, build_discord_message, build_email_message,
    build_webhook_envelope,
};
use fastrace::trace;
use log::debug;
use monitor_common::domain::{Mentions, NotificationChannel, WebhookAuth, now_unix_millis};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use uuid::Uuid;

/// Configuration for the outbound senders.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// SendGrid-compatible send endpoint.
    pub mail_api_url: String,
    pub mail_api_key: SecretString,
    pub mail_from: String,

    #[serde(with = "humantime_serde", default = "sender_timeout_default")]
    pub sender_timeout: Duration,
}

const fn sender_timeout_default() -> Duration {
    Duration::from_secs(15)
}

/// All three channel senders over one reqwest client. Channel
/// configurations are validated before any network interaction; validation
/// failures are permanent.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: Client,
    config: Arc<Config>,
}

impl HttpSender {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.sender_timeout).build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    async fn send_discord(
        &self,
        payload: &NotificationPayload,
        webhook_url: &str,
        mentions: Option<&Mentions>,
    ) -> SendOutcome {
        let message = build_discord_message(payload, mentions);

        let response = self.client.post(webhook_url).json(&message).send().await;
        match response {
            Ok(response) => outcome_from_response(response, None).await,
            Err(error) => SendOutcome::transient_failure(error.to_string()),
        }
    }

    async fn send_email(
        &self,
        payload: &NotificationPayload,
        recipients: &[String],
        subject: Option<&str>,
    ) -> SendOutcome {
        let message = build_email_message(payload, subject);

        let to = recipients
            .iter()
            .map(|recipient| json!({ "email": recipient }))
            .collect::<Vec<_>>();
        let request = json!({
            "personalizations": [{ "to": to }],
            "from": { "email": self.config.mail_from },
            "subject": message.subject,
            "content": [
                { "type": "text/plain", "value": message.text },
                { "type": "text/html", "value": message.html },
            ],
        });

        let response = self
            .client
            .post(&self.config.mail_api_url)
            .bearer_auth(self.config.mail_api_key.expose_secret())
            .json(&request)
            .send()
            .await;

        match response {
            Ok(response) => {
                let message_id = response
                    .headers()
                    .get("x-message-id")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                outcome_from_response(response, message_id).await
            }

            Err(error) => SendOutcome::transient_failure(error.to_string()),
        }
    }

    async fn send_webhook(
        &self,
        payload: &NotificationPayload,
        url: &str,
        method: &str,
        headers: Option<&HashMap<String, String>>,
        auth: Option<&WebhookAuth>,
    ) -> SendOutcome {
        let Some(method) = parse_method(method) else {
            return SendOutcome::permanent_failure(format!("Unsupported HTTP method: {method}"));
        };

        let envelope = build_webhook_envelope(payload, Uuid::new_v4(), now_unix_millis());

        let mut request = self
            .client
            .request(method, url)
            .header(header::USER_AGENT, user_agent())
            .json(&envelope);

        // Caller headers are merged over the defaults.
        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }

        request = apply_auth(request, auth);

        match request.send().await {
            Ok(response) => outcome_from_response(response, None).await,
            Err(error) => SendOutcome::transient_failure(error.to_string()),
        }
    }
}

impl Sender for HttpSender {
    #[trace(properties = { "notification_id": "{notification_id}" })]
    async fn send(
        &self,
        payload @ &NotificationPayload { notification_id, .. }: &NotificationPayload,
    ) -> SendOutcome {
        // Configuration errors fail before any network call and are not
        // retried.
        if let Err(error) = payload.channel.validate() {
            return SendOutcome::permanent_failure(error.to_string());
        }

        debug!(
            notification_id = payload.notification_id,
            channel:% = payload.channel.kind();
            "sending notification"
        );

        match &payload.channel {
            NotificationChannel::Discord {
                webhook_url,
                mentions,
            } => {
                self.send_discord(payload, webhook_url, mentions.as_ref())
                    .await
            }

            NotificationChannel::Email {
                recipients,
                subject,
            } => {
                self.send_email(payload, recipients, subject.as_deref())
                    .await
            }

            NotificationChannel::Webhook {
                url,
                method,
                headers,
                auth,
            } => {
                self.send_webhook(payload, url, method, headers.as_ref(), auth.as_ref())
                    .await
            }
        }
    }
}

fn parse_method(method: &str) -> Option<Method> {
    match method.to_ascii_uppercase().as_str() {
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        _ => None,
    }
}

fn apply_auth(request: RequestBuilder, auth: Option<&WebhookAuth>) -> RequestBuilder {
    match auth {
        Some(WebhookAuth::Bearer { token }) => request.bearer_auth(token),

        Some(WebhookAuth::Basic { username, password }) => {
            request.basic_auth(username, Some(password))
        }

        Some(WebhookAuth::ApiKey { header_name, token }) => request.header(header_name, token),

        None => request,
    }
}

fn user_agent() -> String {
    format!("xrpl-nft-monitor/{}", env!("CARGO_PKG_VERSION"))
}

/// Map a response to an outcome: 2xx is sent, 429 honors Retry-After, any
/// other status is a transient failure carrying `HTTP <status>:
/// <statusText>`.
async fn outcome_from_response(response: Response, message_id: Option<String>) -> SendOutcome {
    let status = response.status();

    if status.is_success() {
        let message_id = match message_id {
            Some(message_id) => Some(message_id),
            None => response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.get("id")
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string)
                }),
        };

        return SendOutcome::Sent { message_id };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);

        return match retry_after {
            Some(retry_after) => {
                SendOutcome::rate_limited(failure_message(status), retry_after)
            }
            None => SendOutcome::transient_failure(failure_message(status)),
        };
    }

    SendOutcome::transient_failure(failure_message(status))
}

fn failure_message(status: StatusCode) -> String {
    format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

#[cfg(test)]
mod tests {
    use crate::infra::senders::{failure_message, parse_method};
    use reqwest::{Method, StatusCode};

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("POST"), Some(Method::POST));
        assert_eq!(parse_method("put"), Some(Method::PUT));
        assert_eq!(parse_method("Patch"), Some(Method::PATCH));
        assert_eq!(parse_method("DELETE"), None);
        assert_eq!(parse_method("GET"), None);
    }

    #[test]
    fn test_failure_message() {
        assert_eq!(
            failure_message(StatusCode::BAD_GATEWAY),
            "HTTP 502: Bad Gateway"
        );
        assert_eq!(
            failure_message(StatusCode::TOO_MANY_REQUESTS),
            "HTTP 429: Too Many Requests"
        );
    }
}
