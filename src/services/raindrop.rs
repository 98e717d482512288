use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};

const RAINDROP_API_URL: &str = "https://api.raindrop.io/rest/v1/raindrop";

/// Attached to every submission in addition to the feed's configured tags.
const IMPLICIT_TAG: &str = "feed";

#[derive(Debug, Serialize)]
struct AddArticleRequest<'a> {
    link: &'a str,
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(rename = "pleaseParse", skip_serializing_if = "Option::is_none")]
    please_parse: Option<PleaseParse>,
}

#[derive(Debug, Serialize)]
struct PleaseParse {}

impl<'a> AddArticleRequest<'a> {
    /// Without a title, the `pleaseParse` marker asks Raindrop to fetch the
    /// article's metadata itself.
    fn new(link: &'a str, title: Option<&'a str>, tags: &'a [String]) -> Self {
        let mut tags: Vec<&'a str> = tags.iter().map(String::as_str).collect();
        tags.push(IMPLICIT_TAG);

        Self {
            link,
            tags,
            title,
            please_parse: title.is_none().then(|| PleaseParse {}),
        }
    }
}

pub struct RaindropClient {
    client: Client,
    access_token: String,
}

impl RaindropClient {
    pub fn new(access_token: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            access_token,
        }
    }

    /// Saves a bookmark to Raindrop.io. `Ok(false)` means the API answered
    /// but did not accept the article; transport and HTTP-level failures
    /// are errors.
    pub async fn add_article(
        &self,
        link: &str,
        title: Option<&str>,
        tags: &[String],
    ) -> Result<bool> {
        let request = AddArticleRequest::new(link, title, tags);

        let response = self
            .client
            .post(RAINDROP_API_URL)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::RaindropApi(format!("API error: {}", error_text)));
        }

        let body: serde_json::Value = response.json().await?;
        match body.get("result").and_then(serde_json::Value::as_bool) {
            Some(result) => Ok(result),
            None => {
                tracing::error!("Unexpected response from Raindrop: {}", body);
                Ok(false)
            }
        }
    }
}
