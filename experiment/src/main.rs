//! Lexis experiment driver
//!
//! Every session command opens the participant's session against the redb
//! store, performs one action, and flushes before exiting.

mod config;
mod next_round;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use lexis_core::{
    AssetId, AssetStatus, AssetType, AssetStore, BundleId, ParticipantId, RatingStore,
    RoundConfig, RoundConfigSource, StoryId,
};
use lexis_ledger::{FlushStatus, Session, SessionDeps, SessionError, transfer_story_content};
use lexis_logging::LexisSubscriberBuilder;
use lexis_market::next_round_stories;
use lexis_storage::{RedbStore, RoundCatalog};
use tracing::warn;

use crate::config::{Cli, Command, ExperimentConfig, Who};
use crate::next_round::build_next_round;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ExperimentConfig::load_or_default(cli.config.as_deref())?;

    let mut logging = LexisSubscriberBuilder::new().with_config(config.logging.clone());
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    let _log_guard = logging.init()?;

    let store = Arc::new(RedbStore::open(config.store_config())?);
    let catalog = Arc::new(RoundCatalog::new(store.clone(), config.catalog_config()));
    let deps = SessionDeps::new(store.clone(), Arc::clone(&catalog));
    let app = App {
        config,
        store,
        catalog,
        deps,
    };

    match app.run(cli.command).await {
        Ok(()) => Ok(()),
        // Expected outcomes are shown, not treated as failures
        Err(e) => match e.downcast_ref::<SessionError>() {
            Some(session_err) if session_err.is_user_facing() => {
                println!("{session_err}");
                Ok(())
            }
            _ => Err(e),
        },
    }
}

struct App {
    config: ExperimentConfig,
    store: Arc<RedbStore>,
    catalog: Arc<RoundCatalog>,
    deps: SessionDeps,
}

impl App {
    async fn open(&self, who: &Who) -> anyhow::Result<Session> {
        let session = Session::open(
            ParticipantId::new(who.participant.as_str()),
            who.round,
            self.deps.clone(),
            self.config.session_config(),
        )
        .await?;
        Ok(session)
    }

    async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Seed { file } => self.seed(&file).await?,

            Command::Status { who } => {
                let session = self.open(&who).await?;
                println!("Participant: {}", session.participant_id());
                println!("Round:       {}", session.round());
                println!("Balance:     {}", session.balance());
                println!("Words:       {}", session.owned_words().await?.join(", "));
                let draft = session.draft();
                if !draft.is_empty() {
                    println!("Draft:       {draft}");
                }
            }

            Command::Market { who } => {
                let session = self.open(&who).await?;
                let round = self.catalog.get(who.round).await?;
                for bundle in &round.bundles {
                    let quote = session.price_bundle(&bundle.id).await?;
                    let words = round.words_for(&bundle.vocab_ids).join(", ");
                    let owned = if quote.all_owned() { " (owned)" } else { "" };
                    println!("{} [{}] {}{}", bundle.id, words, quote.price, owned);
                    for story in bundle.stories_by_rating() {
                        let story_quote = session.price_story_content(&bundle.id, &story.id).await?;
                        println!(
                            "    {} rating {:.1} rate {:.2} price {}",
                            story.id, story.rating, story.content_license_rate, story_quote.price
                        );
                    }
                }
            }

            Command::BuyBundle { who, bundle } => {
                let session = self.open(&who).await?;
                let quote = session.purchase_bundle(&BundleId::new(bundle)).await?;
                println!("Bought {} for {}", quote.bundle_id, quote.price);
                finish(&session).await;
            }

            Command::BuyStory { who, bundle, story } => {
                let session = self.open(&who).await?;
                let quote = session
                    .purchase_story_content(&BundleId::new(bundle), &StoryId::new(story))
                    .await?;
                println!(
                    "Bought story {} for {} (content {}, words {})",
                    quote.story_id, quote.price, quote.content_price, quote.missing_vocab_price
                );
                finish(&session).await;
            }

            Command::Draw { who } => {
                let session = self.open(&who).await?;
                let drawn = session.draw_random_word().await?;
                println!("Drew \"{}\" for {}", drawn.word, drawn.price);
                finish(&session).await;
            }

            Command::Draft { who, content } => {
                let session = self.open(&who).await?;
                session.save_draft(&content);
                finish(&session).await;
            }

            Command::Submit {
                who,
                content,
                license_rate,
            } => {
                let session = self.open(&who).await?;
                let (staged, status) = session.submit(&content, license_rate).await?;
                println!("{}", lexis_market::validator::SUCCESS_MESSAGE);
                for (index, word) in &staged.matches {
                    println!("    sentence {}: {word}", index + 1);
                }
                report(&status);
            }

            Command::ToRate { who } => {
                let session = self.open(&who).await?;
                for story in session.stories_to_rate().await? {
                    println!("{} by {}: {}", story.asset_id, story.participant_id, story.content_str());
                }
            }

            Command::Rate {
                who,
                asset,
                creativity,
                coherence,
                overall,
            } => {
                let session = self.open(&who).await?;
                let target = parse_asset(&asset)?;
                let rating = session
                    .rate_story(&target, creativity, coherence, overall)
                    .await?;
                println!(
                    "Rated {} (license rate {:.2})",
                    rating.target_asset_id, rating.license_rate_set_by_rater
                );
            }

            Command::Transfer { from, to, asset } => {
                let receipt = transfer_story_content(
                    self.store.as_ref(),
                    &self.catalog,
                    &ParticipantId::new(from),
                    &ParticipantId::new(to),
                    &parse_asset(&asset)?,
                    self.config.session_config().store_timeout,
                )
                .await?;
                println!(
                    "Transferred for {} at rate {:.2}; new asset {}",
                    receipt.price, receipt.license_rate, receipt.asset.asset_id
                );
            }

            Command::NextRound {
                round,
                output,
                publish,
            } => self.next_round(round, output.as_deref(), publish).await?,
        }
        Ok(())
    }

    async fn seed(&self, file: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("reading round file {}", file.display()))?;
        let round: RoundConfig = serde_json::from_str(&text)?;
        let faults = round.check_integrity();
        if RoundConfig::is_fatal(&faults) {
            let faults: Vec<String> = faults.iter().map(ToString::to_string).collect();
            bail!("round {} is corrupt: {}", round.round_number, faults.join("; "));
        }
        let number = round.round_number;
        self.store.put_round_config(round).await?;
        println!("Stored round {number}");
        Ok(())
    }

    async fn next_round(
        &self,
        round: u32,
        output: Option<&Path>,
        publish: bool,
    ) -> anyhow::Result<()> {
        let base = self.catalog.get(round).await?;
        let creations = self
            .store
            .assets_in_round(round, AssetType::UserCreation, Some(AssetStatus::Submitted))
            .await?;
        let mut ratings = Vec::new();
        for creation in &creations {
            ratings.extend(self.store.ratings_for_asset(&creation.asset_id).await?);
        }

        let stories = next_round_stories(&creations, &ratings);
        println!("Carrying {} stories into round {}", stories.len(), round + 1);
        let next = build_next_round(&base, stories);
        let json = serde_json::to_string_pretty(&next)?;

        match output {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Wrote {}", path.display());
            }
            None if !publish => println!("{json}"),
            None => {}
        }
        if publish {
            self.store.put_round_config(next).await?;
            println!("Stored round {}", round + 1);
        }
        Ok(())
    }
}

fn parse_asset(id: &str) -> anyhow::Result<AssetId> {
    AssetId::parse(id).with_context(|| format!("invalid asset id {id}"))
}

async fn finish(session: &Session) {
    report(&session.flush_pending().await);
}

fn report(status: &FlushStatus) {
    match status {
        FlushStatus::Synced { .. } | FlushStatus::Idle => {}
        FlushStatus::Retry { error, remaining, .. } => {
            warn!(%error, remaining, "Changes not saved yet");
            println!("Warning: {remaining} change(s) could not be saved ({error})");
        }
        FlushStatus::Busy => println!("Warning: another save is in progress"),
    }
}
