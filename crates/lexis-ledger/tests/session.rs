//! Session behavior: pricing, purchases, draws, and submissions

mod common;

use common::{Harness, STORY};
use lexis_core::{
    AssetStatus, AssetType, BundleId, Money, Participant, ParticipantId, ParticipantRepository,
    StoryId, VocabId,
};
use lexis_ledger::{FlushStatus, SessionError};
use lexis_market::ValidationFailure;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn ca1() -> BundleId {
    BundleId::from("ca1")
}

fn sa1() -> StoryId {
    StoryId::from("sa1")
}

#[tokio::test]
async fn test_story_purchase_without_owned_words() {
    let harness = Harness::new().await;
    let session = harness.open("a1").await;

    let quote = session.price_story_content(&ca1(), &sa1()).await.unwrap();
    assert_eq!(quote.bundle_price, Money::from_major(20));
    assert_eq!(quote.content_price, Money::from_major(10));
    assert_eq!(quote.missing_vocab_price, Money::from_major(20));
    assert_eq!(quote.price, Money::from_major(30));

    session.purchase_story_content(&ca1(), &sa1()).await.unwrap();
    assert_eq!(session.balance(), Money::from_major(70));
    assert_eq!(
        session.owned_vocab_ids(),
        vec![VocabId::from("va1"), VocabId::from("va2")]
    );
    assert_eq!(session.pending_len(), 1);

    let status = session.flush_pending().await;
    assert_eq!(
        status,
        FlushStatus::Synced {
            persisted: 1,
            skipped: 0
        }
    );
    assert_eq!(session.pending_len(), 0);
    assert_eq!(harness.stored_balance("a1").await, Money::from_major(70));

    let templates = harness.assets("a1", AssetType::StoryTemplate).await;
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].content_str(), STORY);
    assert_eq!(templates[0].metadata.price_paid, Some(Money::from_major(30)));
    assert_eq!(templates[0].metadata.content_ip_rate, Some(1.5));
}

#[tokio::test]
async fn test_story_purchase_with_owned_words_charges_content_only() {
    let harness = Harness::new().await;
    let session = harness.open("a1").await;

    let bundle = session.purchase_bundle(&ca1()).await.unwrap();
    assert_eq!(bundle.price, Money::from_major(20));
    assert_eq!(session.balance(), Money::from_major(80));

    let quote = session.purchase_story_content(&ca1(), &sa1()).await.unwrap();
    assert_eq!(quote.missing_vocab_price, Money::ZERO);
    assert_eq!(quote.price, Money::from_major(10));
    assert_eq!(session.balance(), Money::from_major(70));
}

#[tokio::test]
async fn test_repeat_purchases_are_refused() {
    let harness = Harness::new().await;
    let session = harness.open("a1").await;

    session.purchase_story_content(&ca1(), &sa1()).await.unwrap();
    let err = session.purchase_bundle(&ca1()).await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyOwned(_)));
    let err = session
        .purchase_story_content(&ca1(), &sa1())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyOwned(_)));

    // Refusals leave state untouched
    assert_eq!(session.balance(), Money::from_major(70));
    assert_eq!(session.pending_len(), 1);
}

#[tokio::test]
async fn test_insufficient_balance_does_not_mutate() {
    let harness = Harness::new().await;
    harness
        .store
        .create_participant(Participant::new(
            ParticipantId::from("a1"),
            1,
            Money::from_major(25),
        ))
        .await
        .unwrap();
    let session = harness.open("a1").await;

    let err = session
        .purchase_story_content(&ca1(), &sa1())
        .await
        .unwrap_err();
    assert!(err.is_user_facing());
    assert_eq!(
        err.to_string(),
        "Insufficient balance: 30.00 required, 25.00 available"
    );
    assert_eq!(session.balance(), Money::from_major(25));
    assert_eq!(session.pending_len(), 0);
    assert!(session.owned_vocab_ids().is_empty());

    // 25 -> 5 still buys the bundle, then nothing else fits
    session.purchase_bundle(&ca1()).await.unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let err = session.draw_random_word_with(&mut rng).await.unwrap_err();
    assert!(matches!(err, SessionError::InsufficientBalance { .. }));
    assert_eq!(session.balance(), Money::from_major(5));
}

#[tokio::test]
async fn test_draw_until_nothing_left() {
    let harness = Harness::new().await;
    let session = harness.open("a1").await;
    let mut rng = StdRng::seed_from_u64(42);

    let mut drawn = Vec::new();
    for _ in 0..3 {
        drawn.push(session.draw_random_word_with(&mut rng).await.unwrap().vocab_id);
    }
    drawn.sort();
    assert_eq!(
        drawn,
        vec![VocabId::from("va1"), VocabId::from("va2"), VocabId::from("va3")]
    );
    assert_eq!(session.balance(), Money::from_major(70));

    let err = session.draw_random_word().await.unwrap_err();
    assert!(matches!(err, SessionError::NothingToDraw));
    assert_eq!(err.to_string(), "Already owns all vocabularies");

    session.flush_pending().await;
    let draws = harness.assets("a1", AssetType::VocabularyDraw).await;
    assert_eq!(draws.len(), 3);
    assert!(draws.iter().all(|d| d.content_str().starts_with("Drawn vocabulary: ")));
}

#[tokio::test]
async fn test_submission_rules() {
    let harness = Harness::new().await;
    let session = harness.open("a1").await;
    session.purchase_bundle(&ca1()).await.unwrap();

    let err = session
        .validate_and_stage_submission("   ", 1.5)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::EmptyStory));

    let err = session
        .validate_and_stage_submission(STORY, 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidLicenseRate(_)));

    let err = session
        .validate_and_stage_submission("A quantum cat.", 1.5)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidStoryStructure(ValidationFailure::MultipleMatches { .. })
    ));
    assert_eq!(session.pending_len(), 1);

    session.set_draft_text("work in progress");
    let (staged, status) = session.submit(STORY, 2.0).await.unwrap();
    assert_eq!(staged.matches.len(), 2);
    assert_eq!(staged.matches[&0], "quantum");
    assert_eq!(staged.word_count, 6);
    assert!(status.is_synced());
    assert!(session.draft().is_empty());

    let creations = harness.assets("a1", AssetType::UserCreation).await;
    assert_eq!(creations.len(), 1);
    assert_eq!(creations[0].status, AssetStatus::Submitted);
    assert_eq!(creations[0].content_license_rate, Some(2.0));
    assert_eq!(creations[0].metadata.word_count, Some(6));
}

#[tokio::test]
async fn test_reopen_restores_state() {
    let harness = Harness::new().await;
    {
        let session = harness.open("a1").await;
        session.purchase_bundle(&ca1()).await.unwrap();
        session.save_draft("The cat");
        assert!(session.flush_pending().await.is_synced());
    }

    let session = harness.open("a1").await;
    assert_eq!(session.balance(), Money::from_major(80));
    assert_eq!(session.owned_words().await.unwrap(), vec!["quantum", "cat"]);
    assert_eq!(session.draft(), "The cat");
    assert!(!session.has_pending_work());
}

#[tokio::test]
async fn test_unknown_catalog_entries() {
    let harness = Harness::new().await;
    let session = harness.open("a1").await;

    let err = session
        .purchase_bundle(&BundleId::from("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownBundle(_)));

    let err = session
        .price_story_content(&ca1(), &StoryId::from("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownStory { .. }));
}
