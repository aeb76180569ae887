//! Participant session
//!
//! A session is the single in-process view of one participant in one round.
//! Every action is priced and validated against local state, applied
//! optimistically, and queued on the ledger. Durable storage is only touched
//! when the session opens, when the ledger is flushed, and when a rating is
//! recorded.
//!
//! Local state lives behind a synchronous mutex that is never held across an
//! `.await`. Flushes are serialized by a separate async gate; a flush that
//! finds the gate taken reports [`FlushStatus::Busy`] instead of waiting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lexis_core::{
    Asset, AssetId, AssetStatus, AssetType, Money, Participant, ParticipantId, RatingScores,
    RoundConfig, StorageError, StoryId, StoryRating, VocabId,
};
use lexis_core::{BundleId, ExperimentStore};
use lexis_market::{
    BundleQuote, StoryQuote, StoryValidation, ensure_affordable, normalize_rater_license_rate,
    quote_bundle, quote_story, stories_for_rating, validate_story,
};
use lexis_storage::RoundCatalog;
use parking_lot::Mutex;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::ledger::{Flusher, bounded};
use crate::state::ParticipantState;
use crate::transaction::{Transaction, word_count};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Shared collaborators of every session in the process
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn ExperimentStore>,
    pub catalog: Arc<RoundCatalog>,
}

impl SessionDeps {
    pub fn new(store: Arc<dyn ExperimentStore>, catalog: Arc<RoundCatalog>) -> Self {
        Self { store, catalog }
    }
}

/// Outcome of a flush request. Flushing never fails outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushStatus {
    /// Every pending entry is durable and the balance is written
    Synced { persisted: usize, skipped: usize },
    /// A store call failed or timed out; remaining work is kept for retry
    Retry {
        error: String,
        remaining: usize,
        consecutive_failures: u32,
    },
    /// Another flush is in progress
    Busy,
    /// Nothing to write
    Idle,
}

impl FlushStatus {
    pub fn is_synced(&self) -> bool {
        matches!(self, FlushStatus::Synced { .. } | FlushStatus::Idle)
    }

    pub fn needs_retry(&self) -> bool {
        matches!(self, FlushStatus::Retry { .. })
    }
}

/// A submission accepted into the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct StagedSubmission {
    /// Sentence index to the word it uses
    pub matches: BTreeMap<usize, String>,
    pub word_count: usize,
    pub license_rate: f64,
}

/// A random word draw accepted into the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnWord {
    pub vocab_id: VocabId,
    pub word: String,
    pub price: Money,
}

/// One participant's session in one round
pub struct Session {
    deps: SessionDeps,
    config: SessionConfig,
    state: Mutex<ParticipantState>,
    flush_gate: tokio::sync::Mutex<()>,
}

impl Session {
    /// Open a session, creating the participant on first login
    #[instrument(skip(participant_id, deps, config), fields(participant = %participant_id))]
    pub async fn open(
        participant_id: ParticipantId,
        round: u32,
        deps: SessionDeps,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let catalog = deps.catalog.get(round).await?;
        let store = deps.store.as_ref();
        let limit = config.store_timeout;

        let existing =
            bounded(limit, "get_participant", store.get_participant(&participant_id)).await?;
        let participant = match existing {
            Some(existing) => existing,
            None => {
                let fresh =
                    Participant::new(participant_id.clone(), round, catalog.initial_balance);
                let created = bounded(
                    limit,
                    "create_participant",
                    store.create_participant(fresh.clone()),
                )
                .await;
                match created {
                    Ok(()) => {
                        info!(balance = %fresh.balance, "Created participant");
                        fresh
                    }
                    // Another login created it first
                    Err(e) if e.is_duplicate() => {
                        bounded(limit, "get_participant", store.get_participant(&participant_id))
                            .await?
                            .ok_or_else(|| {
                                SessionError::UnknownParticipant(participant_id.clone())
                            })?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if let Err(e) = bounded(limit, "touch_login", store.touch_login(&participant_id)).await {
            warn!(error = %e, "Failed to record login");
        }

        let assets = bounded(
            limit,
            "assets_for_participant",
            store.assets_for_participant(&participant_id, None),
        )
        .await?;
        let state = ParticipantState::rebuild(&participant, round, &assets);
        info!(
            round,
            balance = %state.balance,
            owned = state.owned_vocab.len(),
            "Session opened"
        );

        Ok(Self {
            deps,
            config,
            state: Mutex::new(state),
            flush_gate: tokio::sync::Mutex::new(()),
        })
    }

    async fn round_config(&self) -> SessionResult<Arc<RoundConfig>> {
        let round = self.state.lock().round;
        Ok(self.deps.catalog.get(round).await?)
    }

    /// Price of a bundle given what the participant owns
    pub async fn price_bundle(&self, bundle_id: &BundleId) -> SessionResult<BundleQuote> {
        let catalog = self.round_config().await?;
        let state = self.state.lock();
        Ok(quote_bundle(bundle_id, &state.owned_vocab, &catalog)?)
    }

    /// Price of a bundled story given what the participant owns
    pub async fn price_story_content(
        &self,
        bundle_id: &BundleId,
        story_id: &StoryId,
    ) -> SessionResult<StoryQuote> {
        let catalog = self.round_config().await?;
        let state = self.state.lock();
        Ok(quote_story(bundle_id, story_id, &state.owned_vocab, &catalog)?)
    }

    /// Buy every word of a bundle at the full bundle price
    pub async fn purchase_bundle(&self, bundle_id: &BundleId) -> SessionResult<BundleQuote> {
        let catalog = self.round_config().await?;
        let mut state = self.state.lock();

        let quote = quote_bundle(bundle_id, &state.owned_vocab, &catalog)?;
        if quote.all_owned() {
            return Err(SessionError::AlreadyOwned(format!("all words of bundle {bundle_id}")));
        }
        ensure_affordable(quote.price, state.balance)?;
        let vocab_ids = catalog
            .bundle(bundle_id)
            .map(|b| b.vocab_ids.clone())
            .ok_or_else(|| SessionError::UnknownBundle(bundle_id.clone()))?;

        state.apply(Transaction::PurchaseBundle {
            bundle_id: bundle_id.clone(),
            vocab_ids,
            price: quote.price,
        });
        info!(
            participant = %state.participant_id,
            bundle = %bundle_id,
            price = %quote.price,
            balance = %state.balance,
            "Purchased bundle"
        );
        Ok(quote)
    }

    /// Buy a bundled story; its bundle's words become owned
    pub async fn purchase_story_content(
        &self,
        bundle_id: &BundleId,
        story_id: &StoryId,
    ) -> SessionResult<StoryQuote> {
        let catalog = self.round_config().await?;
        let mut state = self.state.lock();

        let quote = quote_story(bundle_id, story_id, &state.owned_vocab, &catalog)?;
        let (bundle, story) = catalog
            .bundle(bundle_id)
            .and_then(|b| b.story(story_id).map(|s| (b, s)))
            .ok_or_else(|| SessionError::UnknownStory {
                bundle: bundle_id.clone(),
                story: story_id.clone(),
            })?;
        if state.owned_story_contents.contains(&story.content) {
            return Err(SessionError::AlreadyOwned(format!("story {story_id}")));
        }
        ensure_affordable(quote.price, state.balance)?;

        state.apply(Transaction::PurchaseStoryContent {
            bundle_id: bundle_id.clone(),
            story_id: story_id.clone(),
            content: story.content.clone(),
            vocab_ids: bundle.vocab_ids.clone(),
            price: quote.price,
            content_price: quote.content_price,
            license_rate: quote.license_rate,
            rating: quote.rating,
        });
        info!(
            participant = %state.participant_id,
            bundle = %bundle_id,
            story = %story_id,
            price = %quote.price,
            balance = %state.balance,
            "Purchased story content"
        );
        Ok(quote)
    }

    /// Draw one unowned word uniformly at random
    pub async fn draw_random_word(&self) -> SessionResult<DrawnWord> {
        let catalog = self.round_config().await?;
        let mut rng = rand::rng();
        self.draw_from(&catalog, &mut rng)
    }

    /// Draw with a caller-supplied random source
    pub async fn draw_random_word_with<R: Rng + Send>(
        &self,
        rng: &mut R,
    ) -> SessionResult<DrawnWord> {
        let catalog = self.round_config().await?;
        self.draw_from(&catalog, rng)
    }

    fn draw_from<R: Rng>(
        &self,
        catalog: &RoundConfig,
        rng: &mut R,
    ) -> SessionResult<DrawnWord> {
        let mut state = self.state.lock();
        let price = catalog.draw_price.rounded();
        ensure_affordable(price, state.balance)?;

        let unowned: Vec<_> = catalog
            .vocabularies
            .iter()
            .filter(|v| !state.owned_vocab.contains(&v.id))
            .collect();
        if unowned.is_empty() {
            return Err(SessionError::NothingToDraw);
        }
        let entry = unowned[rng.random_range(0..unowned.len())];

        state.apply(Transaction::DrawWord {
            vocab_id: entry.id.clone(),
            word: entry.word.clone(),
            price,
        });
        info!(
            participant = %state.participant_id,
            vocab = %entry.id,
            %price,
            "Drew word"
        );
        Ok(DrawnWord {
            vocab_id: entry.id.clone(),
            word: entry.word.clone(),
            price,
        })
    }

    /// Check a story against the owned words and queue it for submission.
    ///
    /// The draft is cleared on success. Nothing changes on failure.
    pub async fn validate_and_stage_submission(
        &self,
        content: &str,
        license_rate: f64,
    ) -> SessionResult<StagedSubmission> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyStory);
        }
        if !license_rate.is_finite() || license_rate < 1.0 {
            return Err(SessionError::InvalidLicenseRate(license_rate));
        }

        let catalog = self.round_config().await?;
        let mut state = self.state.lock();
        let vocab_ids = state.sorted_vocab();
        let words = catalog.words_for(&vocab_ids);

        let matches = match validate_story(content, &words) {
            StoryValidation::Valid { matches } => matches,
            StoryValidation::Invalid(failure) => {
                debug!(participant = %state.participant_id, %failure, "Story rejected");
                return Err(SessionError::InvalidStoryStructure(failure));
            }
        };

        let staged = StagedSubmission {
            matches,
            word_count: word_count(content),
            license_rate,
        };
        state.apply(Transaction::SubmitStory {
            content: content.to_string(),
            vocab_ids,
            license_rate,
            created_at: Utc::now(),
        });
        info!(
            participant = %state.participant_id,
            words = staged.word_count,
            license_rate,
            "Staged story submission"
        );
        Ok(staged)
    }

    /// Stage a submission and flush it
    pub async fn submit(
        &self,
        content: &str,
        license_rate: f64,
    ) -> SessionResult<(StagedSubmission, FlushStatus)> {
        let staged = self.validate_and_stage_submission(content, license_rate).await?;
        let status = self.flush_pending().await;
        Ok((staged, status))
    }

    /// Queue the current text as a draft
    pub fn save_draft(&self, content: &str) -> u64 {
        let mut state = self.state.lock();
        let vocab_ids = state.sorted_vocab();
        state.apply(Transaction::SaveDraft {
            content: content.to_string(),
            vocab_ids,
            created_at: Utc::now(),
        })
    }

    /// Update the draft text without queueing it; the next flush saves it
    pub fn set_draft_text(&self, content: &str) {
        let mut state = self.state.lock();
        if state.draft != content {
            state.draft = content.to_string();
            state.draft_dirty = true;
        }
        state.touch();
    }

    /// Write pending work to durable storage.
    ///
    /// Processed entries leave the ledger even when a later entry fails. The
    /// balance is written only after every entry succeeded.
    pub async fn flush_pending(&self) -> FlushStatus {
        let Ok(_gate) = self.flush_gate.try_lock() else {
            debug!("Flush already in progress");
            return FlushStatus::Busy;
        };

        let (participant, round, pending, balance, balance_version) = {
            let mut state = self.state.lock();
            if state.draft_dirty {
                let content = state.draft.clone();
                let vocab_ids = state.sorted_vocab();
                state.apply(Transaction::SaveDraft {
                    content,
                    vocab_ids,
                    created_at: Utc::now(),
                });
            }
            if !state.has_pending_work() {
                return FlushStatus::Idle;
            }
            (
                state.participant_id.clone(),
                state.round,
                state.ledger.pending(),
                state.balance,
                state.balance_version,
            )
        };

        let store = self.deps.store.as_ref();
        let flusher = Flusher::new(
            store,
            &participant,
            round,
            self.config.store_timeout,
            self.config.draft_retention,
        );
        let outcome = flusher.flush(&pending).await;
        let persisted = outcome.persisted.len();
        let skipped = outcome.skipped;

        let error = match outcome.error {
            Some(e) => Some(e),
            None => bounded(
                self.config.store_timeout,
                "set_balance",
                store.set_balance(&participant, balance),
            )
            .await
            .err(),
        };

        let mut state = self.state.lock();
        state.ledger.remove_processed(&outcome.processed);
        match error {
            Some(e) => self.record_failure(&mut state, e),
            None => {
                state.synced_balance_version = balance_version;
                state.consecutive_failures = 0;
                state.last_sync = Some(Instant::now());
                info!(participant = %participant, persisted, skipped, %balance, "Session synced");
                FlushStatus::Synced { persisted, skipped }
            }
        }
    }

    fn record_failure(&self, state: &mut ParticipantState, error: StorageError) -> FlushStatus {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        warn!(
            participant = %state.participant_id,
            error = %error,
            remaining = state.ledger.len(),
            failures = state.consecutive_failures,
            "Flush failed, will retry"
        );
        FlushStatus::Retry {
            error: error.to_string(),
            remaining: state.ledger.len(),
            consecutive_failures: state.consecutive_failures,
        }
    }

    /// Rate another participant's submitted story
    pub async fn rate_story(
        &self,
        target: &AssetId,
        creativity: u8,
        coherence: u8,
        overall: u8,
    ) -> SessionResult<StoryRating> {
        let scores =
            RatingScores::new(creativity, coherence, overall).ok_or(SessionError::InvalidScore)?;
        let rater = self.participant_id();
        let store = self.deps.store.as_ref();
        let limit = self.config.store_timeout;

        let asset = bounded(limit, "get_asset", store.get_asset(target))
            .await?
            .ok_or(SessionError::UnknownAsset(*target))?;
        if asset.asset_type != AssetType::UserCreation
            || asset.status != AssetStatus::Submitted
            || asset.participant_id == rater
        {
            return Err(SessionError::NotRateable(*target));
        }
        if bounded(limit, "get_rating", store.get_rating(&rater, target))
            .await?
            .is_some()
        {
            return Err(SessionError::DuplicateRating(*target));
        }

        let rate = normalize_rater_license_rate(self.config.rater_license_rate);
        let rating = StoryRating::new(rater.clone(), *target, scores, rate)
            .with_original_rate(asset.content_license_rate);
        match bounded(limit, "create_rating", store.create_rating(rating.clone())).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => return Err(SessionError::DuplicateRating(*target)),
            Err(e) => return Err(e.into()),
        }

        self.state.lock().touch();
        info!(rater = %rater, target = %target, overall, "Rated story");
        Ok(rating)
    }

    /// Submitted stories in this round the participant may still rate
    pub async fn stories_to_rate(&self) -> SessionResult<Vec<Asset>> {
        let (rater, round) = {
            let state = self.state.lock();
            (state.participant_id.clone(), state.round)
        };
        let store = self.deps.store.as_ref();
        let limit = self.config.store_timeout;
        let creations = bounded(
            limit,
            "assets_in_round",
            store.assets_in_round(round, AssetType::UserCreation, Some(AssetStatus::Submitted)),
        )
        .await?;
        let existing = bounded(limit, "ratings_by_rater", store.ratings_by_rater(&rater)).await?;
        Ok(stories_for_rating(&rater, &creations, &existing)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.state.lock().participant_id.clone()
    }

    pub fn round(&self) -> u32 {
        self.state.lock().round
    }

    /// Optimistic balance including unflushed purchases
    pub fn balance(&self) -> Money {
        self.state.lock().balance
    }

    pub fn owned_vocab_ids(&self) -> Vec<VocabId> {
        self.state.lock().sorted_vocab()
    }

    /// Owned words in catalog order
    pub async fn owned_words(&self) -> SessionResult<Vec<String>> {
        let catalog = self.round_config().await?;
        let ids = self.owned_vocab_ids();
        Ok(catalog.words_for(&ids))
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().ledger.len()
    }

    pub fn draft(&self) -> String {
        self.state.lock().draft.clone()
    }

    pub fn idle_for(&self) -> Duration {
        self.state.lock().idle_for()
    }

    pub fn has_pending_work(&self) -> bool {
        self.state.lock().has_pending_work()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
