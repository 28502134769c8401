use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use captcha::filters::{Dots, Noise, Wave};
use captcha::Captcha;
use lru::LruCache;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why a challenge did not pass. The display text is shown on the page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChallengeFailure {
    #[error("reCAPTCHA token missing. Please complete the CAPTCHA.")]
    MissingToken,
    #[error("reCAPTCHA verification failed. Please try again.")]
    Rejected,
    #[error("reCAPTCHA verification could not be completed. Please try again.")]
    Unavailable(String),
    #[error("Please enter the text shown in the image.")]
    MissingAnswer,
    #[error("The text you entered did not match the image. A new one has been generated.")]
    Mismatch,
    #[error("No CAPTCHA was issued for this session. Please try again.")]
    NoChallenge,
}

/// What the form page has to render for the active challenge.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChallengeWidget {
    Recaptcha { site_key: String, field: &'static str },
    Image { image_url: String, field: &'static str },
}

#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    /// Name of the form field carrying the user's response.
    fn response_field(&self) -> &'static str;

    fn widget(&self, session: Uuid) -> ChallengeWidget;

    /// Fails closed: anything short of a positive answer is a failure.
    async fn verify(&self, session: Uuid, response: Option<&str>) -> Result<(), ChallengeFailure>;

    /// PNG for the session's current challenge, if this verifier draws one.
    /// Never issues a challenge.
    fn image_png(&self, _session: Uuid) -> Option<Vec<u8>> {
        None
    }

    fn refresh(&self, _session: Uuid) {}
}

pub const RECAPTCHA_FIELD: &str = "g-recaptcha-response";
pub const IMAGE_ANSWER_FIELD: &str = "captcha_answer";

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Delegates to Google's `siteverify` endpoint (or anything speaking it).
pub struct RecaptchaVerifier {
    client: Client,
    verify_url: String,
    site_key: String,
    secret_key: String,
}

impl RecaptchaVerifier {
    pub fn new(
        client: Client,
        verify_url: impl Into<String>,
        site_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            verify_url: verify_url.into(),
            site_key: site_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl ChallengeVerifier for RecaptchaVerifier {
    fn response_field(&self) -> &'static str {
        RECAPTCHA_FIELD
    }

    fn widget(&self, _session: Uuid) -> ChallengeWidget {
        ChallengeWidget::Recaptcha {
            site_key: self.site_key.clone(),
            field: RECAPTCHA_FIELD,
        }
    }

    #[instrument(skip_all, fields(%session))]
    async fn verify(&self, session: Uuid, response: Option<&str>) -> Result<(), ChallengeFailure> {
        let token = match response.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(ChallengeFailure::MissingToken),
        };

        let reply = self
            .client
            .post(&self.verify_url)
            .form(&[("secret", self.secret_key.as_str()), ("response", token)])
            .send()
            .await
            .map_err(|e| {
                warn!("reCAPTCHA verification request failed: {}", e);
                ChallengeFailure::Unavailable(e.to_string())
            })?;

        let result: SiteVerifyResponse = reply.json().await.map_err(|e| {
            warn!("reCAPTCHA verification reply was not valid JSON: {}", e);
            ChallengeFailure::Unavailable(e.to_string())
        })?;

        if result.success {
            debug!("reCAPTCHA passed");
            Ok(())
        } else {
            info!(error_codes = ?result.error_codes, "reCAPTCHA rejected");
            Err(ChallengeFailure::Rejected)
        }
    }
}

pub const CHALLENGE_LEN: u32 = 6;
const CHALLENGE_TTL: Duration = Duration::from_secs(30 * 60);
/// Sessions holding a live challenge; the least recently used one is evicted past this.
pub const DEFAULT_CHALLENGE_CAPACITY: usize = 10_000;

pub const IMAGE_WIDTH: u32 = 220;
pub const IMAGE_HEIGHT: u32 = 120;

/// One issued challenge: the expected text and the PNG showing it.
#[derive(Debug, Clone)]
pub struct ChallengeState {
    pub text: String,
    pub image: Vec<u8>,
    nonce: u32,
    issued_at: Instant,
}

impl ChallengeState {
    pub fn generate() -> Self {
        let mut captcha = Captcha::new();
        captcha
            .add_chars(CHALLENGE_LEN)
            .apply_filter(Noise::new(0.4))
            .apply_filter(Wave::new(2.0, 20.0).horizontal())
            .apply_filter(Wave::new(2.0, 20.0).vertical())
            .view(IMAGE_WIDTH, IMAGE_HEIGHT)
            .apply_filter(Dots::new(15));

        let text = captcha.chars_as_string();
        let image = captcha.as_png().unwrap_or_else(|| {
            warn!("CAPTCHA image could not be encoded");
            Vec::new()
        });
        Self {
            text,
            image,
            nonce: rand::thread_rng().gen(),
            issued_at: Instant::now(),
        }
    }

    pub fn matches(&self, answer: &str) -> bool {
        self.text.eq_ignore_ascii_case(answer.trim())
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.issued_at) > CHALLENGE_TTL
    }
}

/// Session id → issued challenge, bounded. Expired entries read as absent.
pub struct ChallengeStore {
    challenges: Mutex<LruCache<Uuid, ChallengeState>>,
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHALLENGE_CAPACITY)
    }
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            challenges: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<Uuid, ChallengeState>> {
        self.challenges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the session's challenge with a fresh one.
    pub fn issue(&self, session: Uuid) -> ChallengeState {
        // Rendering happens outside the lock.
        let state = ChallengeState::generate();
        if let Some((evicted, _)) = self.lock().push(session, state.clone()) {
            if evicted != session {
                debug!(%evicted, "Challenge store full; evicted least recent session");
            }
        }
        state
    }

    /// Current challenge, issuing one when the session has none.
    pub fn current(&self, session: Uuid) -> ChallengeState {
        if let Some(state) = self.peek(session) {
            return state;
        }
        self.issue(session)
    }

    pub fn peek(&self, session: Uuid) -> Option<ChallengeState> {
        let mut challenges = self.lock();
        if challenges.peek(&session)?.is_expired(Instant::now()) {
            challenges.pop(&session);
            return None;
        }
        challenges.get(&session).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}

/// Locally generated text challenge, held per browser session.
#[derive(Default)]
pub struct ImageChallengeVerifier {
    store: ChallengeStore,
}

impl ImageChallengeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: ChallengeStore::with_capacity(capacity),
        }
    }

    pub fn store(&self) -> &ChallengeStore {
        &self.store
    }
}

#[async_trait]
impl ChallengeVerifier for ImageChallengeVerifier {
    fn response_field(&self) -> &'static str {
        IMAGE_ANSWER_FIELD
    }

    fn widget(&self, session: Uuid) -> ChallengeWidget {
        // Issue up front so the image request and the answer agree.
        let state = self.store.current(session);
        ChallengeWidget::Image {
            // The query string only busts browser caches between challenges.
            image_url: format!("/captcha/image.png?v={}", state.nonce),
            field: IMAGE_ANSWER_FIELD,
        }
    }

    #[instrument(skip_all, fields(%session))]
    async fn verify(&self, session: Uuid, response: Option<&str>) -> Result<(), ChallengeFailure> {
        let expected = self.store.peek(session);
        // Every attempt consumes the challenge, pass or fail.
        self.store.issue(session);

        let Some(expected) = expected else {
            return Err(ChallengeFailure::NoChallenge);
        };
        let answer = match response.map(str::trim) {
            Some(answer) if !answer.is_empty() => answer,
            _ => return Err(ChallengeFailure::MissingAnswer),
        };

        if expected.matches(answer) {
            debug!("Image challenge passed");
            Ok(())
        } else {
            info!("Image challenge mismatch");
            Err(ChallengeFailure::Mismatch)
        }
    }

    fn image_png(&self, session: Uuid) -> Option<Vec<u8>> {
        self.store
            .peek(session)
            .map(|state| state.image)
            .filter(|image| !image.is_empty())
    }

    fn refresh(&self, session: Uuid) {
        self.store.issue(session);
    }
}
