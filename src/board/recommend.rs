//! Duration suggestions from a generative-language model.
//!
//! The recommender is advisory: any failure (no key, network, bad status,
//! unparseable answer) turns into [`Recommendation::FALLBACK`] so the
//! endpoint never fails because the model did.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::models::Recommendation;
use crate::config::RecommenderSection;

pub const MIN_TITLE_LEN: usize = 3;
pub const MAX_DURATION_MINUTES: i64 = 1440;

#[async_trait]
pub trait DurationRecommender: Send + Sync {
    async fn recommend(&self, title: &str) -> Result<Recommendation>;
}

/// Ask the recommender, substituting the fallback on any error.
pub async fn recommend_or_fallback(
    recommender: &dyn DurationRecommender,
    title: &str,
) -> Recommendation {
    match recommender.recommend(title).await {
        Ok(rec) => rec,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Duration recommender failed; using fallback");
            Recommendation::FALLBACK
        }
    }
}

pub fn build_prompt(title: &str) -> String {
    format!(
        "Given the task title \"{}\", estimate the time in minutes it would take to complete. \
         Return ONLY a valid JSON object with two keys: \"duration\" (an integer, e.g., 15, 30, 45) \
         and \"confidence\" (a float between 0 and 1). Example: {{\"duration\": 45, \"confidence\": 0.8}}",
        title
    )
}

#[derive(Deserialize)]
struct RawRecommendation {
    duration: f64,
    confidence: f64,
}

/// Parse the model's answer. Markdown code fences are stripped; values are
/// clamped to 1..=1440 minutes and 0..=1 confidence.
pub fn parse_recommendation(text: &str) -> Result<Recommendation> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let raw: RawRecommendation = serde_json::from_str(cleaned.trim())
        .with_context(|| format!("Model answer is not a recommendation: {}", cleaned.trim()))?;
    if !raw.duration.is_finite() || !raw.confidence.is_finite() {
        bail!("Model answer contains a non-finite number");
    }
    Ok(Recommendation {
        duration: (raw.duration.round() as i64).clamp(1, MAX_DURATION_MINUTES),
        confidence: raw.confidence.clamp(0.0, 1.0),
    })
}

// ── Gemini ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiRecommender {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiRecommender {
    pub fn from_config(section: &RecommenderSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .context("Failed to build HTTP client for recommender")?;
        Ok(Self {
            client,
            endpoint: section.endpoint.trim_end_matches('/').to_string(),
            model: section.model.clone(),
            api_key: section.api_key.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl DurationRecommender for GeminiRecommender {
    async fn recommend(&self, title: &str) -> Result<Recommendation> {
        let Some(key) = self.api_key.as_deref() else {
            bail!("No recommender API key configured");
        };
        let prompt = build_prompt(title);
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };

        debug!(model = %self.model, "Requesting duration recommendation");
        let resp = self
            .client
            .post(self.url())
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .context("Failed to send recommendation request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Recommender returned {}: {}", status, text);
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .context("Failed to decode recommender response")?;
        let text = parsed
            .first_text()
            .context("Recommender response has no candidate text")?;
        parse_recommendation(&text)
    }
}

// ── Rate limiting ─────────────────────────────────────────────────────

/// Sliding-window limiter for a single caller.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    hits: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: VecDeque::new(),
        }
    }

    /// Record a request at `now`, or return the seconds to wait.
    pub fn try_acquire_at(&mut self, now: Instant) -> Result<(), u64> {
        while let Some(&first) = self.hits.front() {
            if now.duration_since(first) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }

        if self.hits.len() >= self.max_requests as usize {
            let retry_after_secs = match self.hits.front() {
                Some(&oldest) => self
                    .window
                    .saturating_sub(now.duration_since(oldest))
                    .as_secs()
                    .saturating_add(1),
                None => self.window.as_secs().max(1),
            };
            return Err(retry_after_secs);
        }

        self.hits.push_back(now);
        Ok(())
    }

    #[cfg(test)]
    pub fn remaining(&self) -> u32 {
        self.max_requests.saturating_sub(self.hits.len() as u32)
    }

    fn is_idle_at(&self, now: Instant) -> bool {
        self.hits
            .back()
            .is_none_or(|&last| now.duration_since(last) >= self.window)
    }
}

/// One [`RateLimiter`] per user id.
#[derive(Debug)]
pub struct UserRateLimiter {
    max_requests: u32,
    window: Duration,
    limiters: HashMap<String, RateLimiter>,
}

impl UserRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            limiters: HashMap::new(),
        }
    }

    pub fn from_config(section: &RecommenderSection) -> Self {
        Self::new(
            section.rate_limit_requests,
            Duration::from_secs(section.rate_limit_window_secs),
        )
    }

    pub fn try_acquire(&mut self, user_id: &str) -> Result<(), u64> {
        self.try_acquire_at(user_id, Instant::now())
    }

    pub fn try_acquire_at(&mut self, user_id: &str, now: Instant) -> Result<(), u64> {
        // Forget users whose windows have fully drained.
        self.limiters.retain(|_, l| !l.is_idle_at(now));
        let (max, window) = (self.max_requests, self.window);
        self.limiters
            .entry(user_id.to_string())
            .or_insert_with(|| RateLimiter::new(max, window))
            .try_acquire_at(now)
    }

    #[cfg(test)]
    pub fn tracked_users(&self) -> usize {
        self.limiters.len()
    }
}
