use std::sync::Arc;

use reqwest::Client;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::advice::{AdviceClient, AdviceError};
use crate::archive::{FsObjectStore, HttpObjectStore, ObjectStore, ProfileArchiver};
use crate::captcha::{ChallengeFailure, ChallengeVerifier, ImageChallengeVerifier, RecaptchaVerifier};
use crate::config::{ArchiveBackend, ChallengeSettings, Settings};
use crate::profile::{ProfileError, UserProfile};

/// How one form submission ended.
#[derive(Debug)]
pub enum Outcome {
    ChallengeFailed(ChallengeFailure),
    InvalidForm(ProfileError),
    Advice {
        profile: UserProfile,
        advice: String,
    },
    /// The chat-completion API answered non-2xx.
    UpstreamError {
        profile: UserProfile,
        status: u16,
        body: String,
    },
    /// Transport failure or an unusable 2xx reply.
    RequestFailed {
        profile: UserProfile,
        message: String,
    },
}

impl Outcome {
    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Outcome::Advice { profile, .. }
            | Outcome::UpstreamError { profile, .. }
            | Outcome::RequestFailed { profile, .. } => Some(profile),
            Outcome::ChallengeFailed(_) | Outcome::InvalidForm(_) => None,
        }
    }
}

/// verify → parse → archive (optional) → request, strictly in that order.
pub struct SubmissionPipeline {
    verifier: Arc<dyn ChallengeVerifier>,
    archiver: Option<ProfileArchiver>,
    advisor: AdviceClient,
}

impl SubmissionPipeline {
    pub fn new(
        verifier: Arc<dyn ChallengeVerifier>,
        archiver: Option<ProfileArchiver>,
        advisor: AdviceClient,
    ) -> Self {
        Self {
            verifier,
            archiver,
            advisor,
        }
    }

    /// Wires the verifier, archiver and advice client described by `settings`.
    pub fn from_settings(settings: &Settings, client: Client) -> Self {
        let verifier: Arc<dyn ChallengeVerifier> = match &settings.challenge {
            ChallengeSettings::Recaptcha {
                site_key,
                secret_key,
                verify_url,
            } => Arc::new(RecaptchaVerifier::new(
                client.clone(),
                verify_url.clone(),
                site_key.clone(),
                secret_key.clone(),
            )),
            ChallengeSettings::Image => Arc::new(ImageChallengeVerifier::new()),
        };

        let archiver = settings.archive.as_ref().map(|archive| {
            let store: Arc<dyn ObjectStore> = match &archive.backend {
                ArchiveBackend::Http { endpoint, token } => {
                    Arc::new(HttpObjectStore::new(client.clone(), endpoint.clone(), token.clone()))
                }
                ArchiveBackend::Fs { root } => Arc::new(FsObjectStore::new(root.clone())),
            };
            ProfileArchiver::new(store, archive.bucket.clone())
        });

        let advisor = AdviceClient::new(
            client,
            settings.chat_endpoint.clone(),
            settings.api_key.clone(),
            settings.model.clone(),
        );

        Self::new(verifier, archiver, advisor)
    }

    pub fn is_archiving(&self) -> bool {
        self.archiver.is_some()
    }

    pub fn verifier(&self) -> &Arc<dyn ChallengeVerifier> {
        &self.verifier
    }

    #[instrument(skip_all, fields(%session))]
    pub async fn submit(&self, session: Uuid, form: &[(String, String)]) -> Outcome {
        let field = self.verifier.response_field();
        let response = form
            .iter()
            .find(|(key, _)| key == field)
            .map(|(_, value)| value.as_str());

        if let Err(failure) = self.verifier.verify(session, response).await {
            info!(%failure, "Challenge failed; submission stopped");
            return Outcome::ChallengeFailed(failure);
        }

        let profile = match UserProfile::from_form(form) {
            Ok(profile) => profile,
            Err(e) => {
                info!("Rejected profile form: {}", e);
                return Outcome::InvalidForm(e);
            }
        };

        if let Some(archiver) = &self.archiver {
            // Archive failures are logged inside and never reach the user.
            let _ = archiver.archive(&profile).await;
        }

        match self.advisor.request_advice(&profile).await {
            Ok(advice) => Outcome::Advice { profile, advice },
            Err(AdviceError::Upstream { status, body }) => Outcome::UpstreamError {
                profile,
                status: status.as_u16(),
                body,
            },
            Err(e) => {
                warn!("Advice request failed: {}", e);
                Outcome::RequestFailed {
                    profile,
                    message: e.to_string(),
                }
            }
        }
    }
}
