//! HTTP match store: the chat backend's `/api/Game` REST endpoints.
//!
//! `POST {base}/api/Game` persists a full match record and echoes the stored
//! record back. `GET {base}/api/Game/{user}/{opponent}` looks up the match
//! between two users; 404, 204 or an empty body means none exists yet.


use reqwest::{RequestBuilder, StatusCode, Url};

use tictacdog::{ApiSection, Match, MatchRecord, MatchStore, StoreError};

pub struct HttpMatchStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpMatchStore {
    pub fn new(api: &ApiSection, token: Option<String>) -> anyhow::Result<Self> {
        let base_url = Url::parse(&api.base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("api base url '{}' cannot be a base", api.base_url);
        }
        let client = reqwest::Client::builder()
            .timeout(api.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl MatchStore for HttpMatchStore {
    async fn submit_match(&self, game: &Match) -> Result<Match, StoreError> {
        let url = game_url(&self.base_url, &[]);
        tracing::debug!("store: POST {url} {:?}", game.cells());
        let response = self
            .authorize(self.client.post(url))
            .json(&MatchRecord::from(game.clone()))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        // Some backends answer 200/204 without echoing the record.
        Ok(decode_response(status, &body)?.unwrap_or_else(|| game.clone()))
    }

    async fn fetch_match(
        &self,
        self_id: &str,
        opponent_id: &str,
    ) -> Result<Option<Match>, StoreError> {
        let url = game_url(&self.base_url, &[self_id, opponent_id]);
        tracing::debug!("store: GET {url}");
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await.map_err(transport)?;
        decode_response(status, &body)
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// `{base}/api/Game[/segment...]`, each segment percent-encoded.
fn game_url(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().push("api").push("Game").extend(segments);
    }
    url
}

/// Interpret a store response. `Ok(None)` for a success with no record.
fn decode_response(status: StatusCode, body: &str) -> Result<Option<Match>, StoreError> {
    if !status.is_success() {
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message: body.trim().chars().take(200).collect(),
        });
    }
    let body = body.trim();
    if status == StatusCode::NO_CONTENT || body.is_empty() || body == "null" {
        return Ok(None);
    }
    let record: MatchRecord =
        serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(Some(Match::try_from(record)?))
}
