//! Session creation core.
//!
//! A session is created in two steps:
//!
//! 1. One transaction on the conference's entity group saves the new Session
//!    and re-saves its Conference.
//! 2. Each distinct speaker name is then linked in its own transaction.
//!
//! Speakers live outside the conference's group, so step 2 cannot be atomic
//! with step 1. Instead every link is an idempotent upsert: it brings the
//! speaker's session list up to the number of times the name appears on the
//! session and never appends past that. A link that failed can be re-run
//! through [`SessionService::link_speakers`] without creating duplicates.

use super::parse_reference;
use super::profiles::decode_all;
use crate::error::{Result, ServiceError};
use crate::metrics;
use crate::types::{Conference, Session, SessionForm, Speaker};
use conference_central_core::EntityKey;
use conference_central_core::store::{Entity, EntityStore, StoreError};
use conference_central_runtime::{RetryPolicy, TransactionError, run_transaction};
use std::sync::Arc;

/// Session and speaker service
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn EntityStore>,
    policy: RetryPolicy,
}

impl SessionService {
    /// Create a new session service
    #[must_use]
    pub const fn new(store: Arc<dyn EntityStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Create a session under the conference `reference` and link its speakers.
    ///
    /// Returns `None`, writing nothing, if the conference does not exist.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: `reference` is not a conference key
    /// - `InvalidForm`: blank session or speaker name
    /// - `Transaction`: the session transaction failed
    /// - `SpeakerLink`: the session was saved but a speaker link failed
    pub async fn create_session(
        &self,
        reference: &str,
        form: SessionForm,
    ) -> Result<Option<Session>> {
        let conference_key = parse_reference(reference, Conference::KIND)?;
        let form = form.normalized()?;

        let session_key = self
            .store
            .allocate_id(Some(&conference_key), Session::KIND)
            .await?;
        let id = session_key.id().ok_or_else(|| {
            StoreError::DatabaseError(format!("allocated key {session_key} has no numeric id"))
        })?;

        let created = run_transaction(&self.store, conference_key.root(), &self.policy, |mut tx| {
            let conference_key = conference_key.clone();
            let form = &form;
            async move {
                let Some(conference) = tx.get::<Conference>(&conference_key).await? else {
                    return Ok(None);
                };
                let session = Session::new(id, conference_key, form);
                tx.put(&session)?;
                tx.put(&conference)?;
                tx.commit().await?;
                Ok(Some(session))
            }
        })
        .await?;

        let Some(session) = created else {
            tracing::warn!(
                conference = %conference_key,
                "Session not created: conference not found"
            );
            return Ok(None);
        };

        metrics::record_session_created();
        tracing::info!(
            session = %session.key(),
            speakers = session.speakers.len(),
            "Session created"
        );

        self.link_speakers(&session).await?;
        Ok(Some(session))
    }

    /// Bring every speaker named on `session` up to date with it.
    ///
    /// Safe to repeat: speakers already linked are left as they are.
    /// Returns the speakers in order of first appearance on the session.
    ///
    /// # Errors
    ///
    /// Returns `SpeakerLink` naming the first speaker whose link failed.
    pub async fn link_speakers(&self, session: &Session) -> Result<Vec<Speaker>> {
        let session_key = session.key();
        let mut speakers = Vec::new();

        for (name, occurrences) in session.speaker_occurrences() {
            match self.link_speaker(&session_key, &name, occurrences).await {
                Ok(speaker) => speakers.push(speaker),
                Err(source) => {
                    metrics::record_speaker_link("failed");
                    tracing::error!(
                        session = %session_key,
                        speaker = %name,
                        error = %source,
                        "Speaker link failed; session needs repair"
                    );
                    return Err(ServiceError::SpeakerLink {
                        session: session_key,
                        speaker: name,
                        source,
                    });
                }
            }
        }
        Ok(speakers)
    }

    async fn link_speaker(
        &self,
        session_key: &EntityKey,
        name: &str,
        occurrences: usize,
    ) -> std::result::Result<Speaker, TransactionError> {
        let speaker_key = Speaker::key_for(name);

        let (speaker, changed) = run_transaction(&self.store, &speaker_key, &self.policy, |mut tx| {
            let speaker_key = speaker_key.clone();
            async move {
                let mut speaker = match tx.get::<Speaker>(&speaker_key).await? {
                    Some(speaker) => speaker,
                    None => {
                        let allocated = tx.allocate_id(None, Speaker::KIND).await?;
                        let id = allocated.id().ok_or_else(|| {
                            StoreError::DatabaseError(format!(
                                "allocated key {allocated} has no numeric id"
                            ))
                        })?;
                        Speaker::new(id, name)
                    }
                };
                let changed = speaker.ensure_session(session_key, occurrences);
                if changed {
                    tx.put(&speaker)?;
                }
                tx.commit().await?;
                Ok((speaker, changed))
            }
        })
        .await?;

        if changed {
            metrics::record_speaker_link("linked");
            tracing::info!(speaker = %name, session = %session_key, occurrences, "Speaker linked");
        } else {
            metrics::record_speaker_link("unchanged");
            tracing::debug!(speaker = %name, session = %session_key, "Speaker already linked");
        }
        Ok(speaker)
    }

    /// Load a session by reference.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a malformed reference or a store error.
    pub async fn get_session(&self, reference: &str) -> Result<Option<Session>> {
        let key = parse_reference(reference, Session::KIND)?;
        let record = self.store.load(&key).await?;
        Ok(record.map(|r| r.decode()).transpose()?)
    }

    /// Sessions of the conference `reference`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a malformed reference or a store error.
    pub async fn conference_sessions(&self, reference: &str) -> Result<Vec<Session>> {
        let key = parse_reference(reference, Conference::KIND)?;
        let records = self.store.load_by_parent(&key, Session::KIND).await?;
        decode_all(&records)
    }

    /// Load a speaker by display name.
    ///
    /// # Errors
    ///
    /// Returns a store error if the load fails.
    pub async fn speaker(&self, name: &str) -> Result<Option<Speaker>> {
        let record = self.store.load(&Speaker::key_for(name)).await?;
        Ok(record.map(|r| r.decode()).transpose()?)
    }
}
