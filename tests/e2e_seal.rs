//! End-to-end tests for the two-party seal handshake.
//!
//! Each test exercises: submit word -> pending -> partner word -> seal ->
//! StarMemory + rewards, observed through the outbound channel.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use starbond::collab::{MemoryNotifier, MemoryProgression};
use starbond::events::drain;
use starbond::{
    Collaborators, EngineConfig, Envelope, InteractionKind, MemoryStore, Outbound, Outbox,
    ParticipantDescriptor, ParticipantId, RelationshipStore, RewardReason, SealError, SealStep,
    Starbond,
};
use tokio::sync::mpsc::UnboundedReceiver;

struct Fixture {
    bonds: Starbond<MemoryStore>,
    rx: UnboundedReceiver<Envelope>,
    progression: MemoryProgression,
}

fn fixture() -> Fixture {
    let progression = MemoryProgression::new();
    let (outbox, rx) = Outbox::channel();
    let collaborators = Collaborators {
        progression: Arc::new(progression.clone()),
        notifier: Arc::new(MemoryNotifier::new()),
    };
    let bonds = Starbond::new(MemoryStore::new(), EngineConfig::default(), collaborators, outbox)
        .unwrap();
    Fixture { bonds, rx, progression }
}

fn who(id: &str) -> ParticipantDescriptor {
    ParticipantDescriptor::new(id, id.to_uppercase(), "#88ccff")
}

/// Put the pair's Bond at exactly `strength`.
async fn set_strength(bonds: &Starbond<MemoryStore>, a: &str, b: &str, strength: f64) {
    let mut bond = bonds.create_bond(&a.into(), &b.into(), Some("meadow")).await.unwrap();
    bond.strength = strength;
    bonds.store().put_bond(&bond).await.unwrap();
}

fn events_for<'a>(events: &'a [Envelope], p: &str) -> Vec<&'a Outbound> {
    events.iter().filter(|e| e.to == ParticipantId::from(p)).map(|e| &e.event).collect()
}

// ============================================================================
// 1. Full handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_seals_bond() {
    let mut fx = fixture();
    let (ada, bo) = (who("ada"), who("bo"));
    set_strength(&fx.bonds, "ada", "bo", 95.0).await;

    let step = fx.bonds.submit_seal_word(&ada, &bo.id, "dawn", "meadow").await;
    assert_eq!(step, SealStep::Pending);
    assert_eq!(fx.bonds.pending_seal_count(), 1);

    let events = drain(&mut fx.rx);
    assert_eq!(events_for(&events, "bo"), vec![&Outbound::SealRequested { from: ada.clone() }]);
    assert_eq!(events_for(&events, "ada"), vec![&Outbound::SealPending { partner: bo.id.clone() }]);

    let SealStep::Sealed(star) = fx.bonds.submit_seal_word(&bo, &ada.id, "ember", "meadow").await else {
        panic!("expected the second word to seal");
    };
    assert_eq!(star.combined_phrase(), "dawn & ember");
    assert_eq!(star.brightness, 4.75);
    assert_eq!(star.realm, "meadow");
    assert_eq!(star.participants[0].display_name, "ADA");
    assert_eq!(fx.bonds.pending_seal_count(), 0);

    let bond = fx.bonds.bond(&ada.id, &bo.id).await.unwrap();
    assert!(bond.sealed);
    assert!(bond.sealed_at.is_some());
    assert_eq!(bond.star_memory, Some(star.id));
    let words = bond.seal_words.unwrap();
    assert_eq!((words.low.as_str(), words.high.as_str()), ("dawn", "ember"));

    assert_eq!(fx.progression.balance(&ada.id), 50);
    assert_eq!(fx.progression.balance(&bo.id), 50);

    let events = drain(&mut fx.rx);
    for p in ["ada", "bo"] {
        let mine = events_for(&events, p);
        assert!(mine.contains(&&Outbound::SealAccepted { star: star.clone() }));
        assert!(mine.contains(&&Outbound::RewardDistributed { amount: 50, reason: RewardReason::Seal }));
    }

    assert_eq!(fx.bonds.star_memories_for(&ada.id).await, vec![star.clone()]);
    assert_eq!(fx.bonds.star_memories_in_realm("meadow").await, vec![star]);
}

// ============================================================================
// 2. Words land in pair order, not submission order
// ============================================================================

#[tokio::test]
async fn test_words_stored_in_pair_order() {
    let fx = fixture();
    set_strength(&fx.bonds, "amy", "zed", 92.0).await;

    fx.bonds.submit_seal_word(&who("zed"), &"amy".into(), "ember", "meadow").await;
    let SealStep::Sealed(star) = fx.bonds.submit_seal_word(&who("amy"), &"zed".into(), "dawn", "meadow").await else {
        panic!("expected a seal");
    };

    assert_eq!(star.words, ["dawn".to_string(), "ember".to_string()]);
    assert_eq!(star.participants[0].id, ParticipantId::from("amy"));
}

// ============================================================================
// 3. Resubmission by the initiator keeps the first word
// ============================================================================

#[tokio::test]
async fn test_resubmission_keeps_first_word() {
    let mut fx = fixture();
    set_strength(&fx.bonds, "a", "b", 95.0).await;

    fx.bonds.submit_seal_word(&who("a"), &"b".into(), "first", "meadow").await;
    let step = fx.bonds.submit_seal_word(&who("a"), &"b".into(), "second", "meadow").await;
    assert_eq!(step, SealStep::AlreadyPending);
    assert_eq!(fx.bonds.pending_seal(&"b".into(), &"a".into()).unwrap().word, "first");

    let events = drain(&mut fx.rx);
    assert_eq!(events_for(&events, "b").len(), 1, "partner is only asked once");

    let SealStep::Sealed(star) = fx.bonds.submit_seal_word(&who("b"), &"a".into(), "reply", "meadow").await else {
        panic!("expected a seal");
    };
    assert_eq!(star.combined_phrase(), "first & reply");
}

// ============================================================================
// 4. Failures reach both sides
// ============================================================================

#[tokio::test]
async fn test_below_threshold_fails_for_both() {
    let mut fx = fixture();
    set_strength(&fx.bonds, "a", "b", 60.0).await;

    fx.bonds.submit_seal_word(&who("a"), &"b".into(), "hope", "meadow").await;
    drain(&mut fx.rx);
    let step = fx.bonds.submit_seal_word(&who("b"), &"a".into(), "soon", "meadow").await;
    assert_eq!(step, SealStep::Failed(SealError::BelowThreshold { strength: 60.0, required: 90.0 }));

    let events = drain(&mut fx.rx);
    for (p, partner) in [("a", "b"), ("b", "a")] {
        let mine = events_for(&events, p);
        let Outbound::SealFailed { partner: got, reason, .. } = mine[0] else {
            panic!("expected a seal failure for {p}");
        };
        assert_eq!(got, &ParticipantId::from(partner));
        assert_eq!(reason, "below-threshold");
    }

    assert!(!fx.bonds.bond(&"a".into(), &"b".into()).await.unwrap().sealed);
    assert_eq!(fx.bonds.pending_seal_count(), 0);
    assert_eq!(fx.progression.balance(&"a".into()), 0);

    // stronger now: a fresh handshake goes through
    set_strength(&fx.bonds, "a", "b", 90.0).await;
    fx.bonds.submit_seal_word(&who("b"), &"a".into(), "now", "meadow").await;
    let step = fx.bonds.submit_seal_word(&who("a"), &"b".into(), "then", "meadow").await;
    assert!(matches!(step, SealStep::Sealed(_)));
}

#[tokio::test]
async fn test_missing_bond_fails() {
    let fx = fixture();
    fx.bonds.submit_seal_word(&who("a"), &"b".into(), "who", "meadow").await;
    let step = fx.bonds.submit_seal_word(&who("b"), &"a".into(), "you", "meadow").await;
    assert_eq!(step, SealStep::Failed(SealError::NotExists));
    assert_eq!(SealError::NotExists.reason(), "not-exists");
}

#[tokio::test]
async fn test_second_seal_fails_already_sealed() {
    let fx = fixture();
    set_strength(&fx.bonds, "a", "b", 95.0).await;
    fx.bonds.submit_seal_word(&who("a"), &"b".into(), "one", "meadow").await;
    assert!(matches!(
        fx.bonds.submit_seal_word(&who("b"), &"a".into(), "two", "meadow").await,
        SealStep::Sealed(_)
    ));

    fx.bonds.submit_seal_word(&who("a"), &"b".into(), "three", "meadow").await;
    let step = fx.bonds.submit_seal_word(&who("b"), &"a".into(), "four", "meadow").await;
    assert_eq!(step, SealStep::Failed(SealError::AlreadySealed));
    assert_eq!(fx.bonds.star_memories_for(&"a".into()).await.len(), 1);
    assert_eq!(fx.progression.balance(&"a".into()), 50);
}

#[tokio::test]
async fn test_blank_word_refused_before_pending() {
    let mut fx = fixture();
    set_strength(&fx.bonds, "a", "b", 95.0).await;

    let step = fx.bonds.submit_seal_word(&who("a"), &"b".into(), "   ", "meadow").await;
    assert_eq!(step, SealStep::Failed(SealError::InvalidWord));
    assert_eq!(fx.bonds.pending_seal_count(), 0);

    let events = drain(&mut fx.rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to, ParticipantId::from("a"));
}

#[tokio::test]
async fn test_self_seal_refused() {
    let fx = fixture();
    let step = fx.bonds.submit_seal_word(&who("a"), &"a".into(), "mirror", "meadow").await;
    assert_eq!(step, SealStep::Failed(SealError::NotExists));
    assert_eq!(fx.bonds.pending_seal_count(), 0);
}

// ============================================================================
// 5. A sealed Bond no longer moves
// ============================================================================

#[tokio::test]
async fn test_sealed_bond_ignores_interactions() {
    let mut fx = fixture();
    set_strength(&fx.bonds, "a", "b", 95.0).await;
    fx.bonds.submit_seal_word(&who("a"), &"b".into(), "still", "meadow").await;
    fx.bonds.submit_seal_word(&who("b"), &"a".into(), "water", "meadow").await;
    drain(&mut fx.rx);

    let out = fx.bonds
        .record_interaction(&"a".into(), &"b".into(), &InteractionKind::Gift, None)
        .await
        .unwrap();
    assert_eq!(out.strength_delta, 0.0);
    assert_eq!(out.bond.strength, 95.0);
    assert!(!fx.bonds.add_shared_memory(&"a".into(), &"b".into(), "late").await);

    // nothing changed, so nobody is told about it
    let updates = drain(&mut fx.rx)
        .into_iter()
        .filter(|e| matches!(e.event, Outbound::BondUpdated { .. }))
        .count();
    assert_eq!(updates, 0);
}

// ============================================================================
// 6. Racing submissions seal exactly once
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_seal_once() {
    let fx = fixture();
    set_strength(&fx.bonds, "a", "b", 95.0).await;
    let bonds = Arc::new(fx.bonds);

    let mut tasks = Vec::new();
    for i in 0..20 {
        let bonds = bonds.clone();
        tasks.push(tokio::spawn(async move {
            let (from, to) = if i % 2 == 0 { ("a", "b") } else { ("b", "a") };
            bonds.submit_seal_word(&who(from), &to.into(), &format!("w{i}"), "meadow").await
        }));
    }

    let mut sealed = 0;
    for t in tasks {
        if let SealStep::Sealed(_) = t.await.unwrap() {
            sealed += 1;
        }
    }
    assert_eq!(sealed, 1);
    assert_eq!(bonds.star_memories_for(&"a".into()).await.len(), 1);
    assert_eq!(fx.progression.balance(&"b".into()), 50);
}
