//! End-to-end round behavior against mock collaborators:
//! - directed rounds (plan/assign/perform/review)
//! - the bounded retry budget
//! - abstention filtering
//! - whole-round fallback and per-character skips
//! - single-speaker rotation

use troupe_core::testing::{MockAgent, SessionHarness};
use troupe_core::{Character, ReviewVerdict, Sender, SessionConfig, TurnMode};

fn roster() -> Vec<Character> {
    vec![
        Character::new("Warrior", "brave, blunt"),
        Character::new("Mage", "careful, secretive"),
        Character::new("Rogue", "sly, watchful"),
    ]
}

#[tokio::test]
async fn test_directed_round_happy_path() {
    let agent = MockAgent::new()
        .with_plot_goal("Force the group to pick a route.")
        .with_assignment(
            r#"{"selected_characters": ["Warrior", "Mage"],
                "instructions": {"Warrior": "push for the left tunnel",
                                 "Mage": "urge caution"}}"#,
        )
        .with_character_line("Warrior", "Left tunnel. Now.")
        .with_character_line("Mage", "We should test the air first.");

    let mut harness = SessionHarness::with_agent("A forked tunnel", roster(), agent);
    let outcome = harness.round(Some("Which way?")).await;

    assert!(!outcome.via_fallback);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(
        outcome.plot_goal.as_ref().map(|g| g.as_str()),
        Some("Force the group to pick a route.")
    );
    assert!(outcome.plan.as_ref().is_some_and(|p| p.is_parsed()));
    assert!(outcome.review.as_ref().is_some_and(|r| r.passed()));

    // Only the cast characters spoke, in roster order.
    let speakers: Vec<&str> = outcome.utterances.iter().map(|u| u.speaker.as_str()).collect();
    assert_eq!(speakers, vec!["Warrior", "Mage"]);

    // Accepted lines were broadcast to every partition.
    let store = harness.session.store();
    assert_eq!(store.shared_len(), 3); // user line + two utterances
    for name in ["Warrior", "Mage", "Rogue"] {
        assert_eq!(store.partition_len(name), 3);
    }

    // The user line is recorded as a user message.
    assert_eq!(store.shared_log()[0].sender, Sender::User);
    assert_eq!(store.shared_log()[0].speaker, "User");
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let agent = MockAgent::new()
        .with_review(r#"{"pass": false, "feedback": "flat dialogue", "scores": {}}"#)
        .with_character_line("Hero", "I stand firm.");

    let config = SessionConfig::new("A duel at dawn")
        .with_character(Character::new("Hero", "stoic"))
        .with_max_retries(2);
    let mut harness = SessionHarness::from_config(config, agent);

    let outcome = harness.round(None).await;

    // One initial perform plus two retries, then the verdict is forced.
    assert_eq!(harness.agent.calls_matching("You are Hero."), 3);
    assert_eq!(harness.agent.calls_matching("drama critic"), 3);
    assert_eq!(outcome.retry_count, 2);
    assert!(matches!(outcome.review, Some(ReviewVerdict::Forced)));
    assert!(outcome.review.as_ref().is_some_and(|r| r.passed()));

    // The last generated utterances are kept.
    assert_eq!(outcome.utterances.len(), 1);
    assert_eq!(harness.session.store().shared_len(), 1);
}

#[tokio::test]
async fn test_abstention_is_filtered() {
    let agent = MockAgent::new()
        .with_character_line("Rogue", "PASS")
        .with_character_line("Warrior", "I'll take first watch.")
        .with_character_line("Mage", "pass.");

    let mut harness = SessionHarness::with_agent("Camp at night", roster(), agent);
    let outcome = harness.round(None).await;

    assert_eq!(outcome.utterances.len(), 1);
    assert_eq!(outcome.utterances[0].speaker, "Warrior");
    assert_eq!(outcome.abstained.len(), 2);
    assert!(outcome.abstained.contains(&"Rogue".to_string()));
    assert!(outcome.abstained.contains(&"Mage".to_string()));

    // Abstentions never reach the store.
    let store = harness.session.store();
    assert_eq!(store.shared_len(), 1);
    assert!(store.shared_log().iter().all(|m| !m.content.to_uppercase().contains("PASS")));
}

#[tokio::test]
async fn test_plan_failure_falls_back_to_single_pass() {
    let agent = MockAgent::new().with_failure("scriptwriter");

    let mut harness = SessionHarness::with_agent("A collapsing bridge", roster(), agent);
    let outcome = harness.round(Some("Run!")).await;

    assert!(outcome.via_fallback);
    assert!(outcome.plot_goal.is_none());
    assert!(outcome.plan.is_none());
    assert!(outcome.review.is_none());
    assert_eq!(outcome.retry_count, 0);

    // Every character still produced a line.
    assert_eq!(outcome.utterances.len(), 3);

    // Neither the director nor the reviewer was ever consulted.
    assert_eq!(harness.agent.calls_matching("stage director"), 0);
    assert_eq!(harness.agent.calls_matching("drama critic"), 0);

    // Fallback output is committed to memory like any other round.
    assert_eq!(harness.session.store().shared_len(), 4);
}

#[tokio::test]
async fn test_fallback_skips_failing_character() {
    let agent = MockAgent::new()
        .with_failure("scriptwriter")
        .with_failure("You are Mage.");

    let mut harness = SessionHarness::with_agent("A collapsing bridge", roster(), agent);
    let outcome = harness.round(None).await;

    assert!(outcome.via_fallback);
    let speakers: Vec<&str> = outcome.utterances.iter().map(|u| u.speaker.as_str()).collect();
    assert_eq!(speakers, vec!["Warrior", "Rogue"]);
    assert!(outcome.abstained.is_empty());
}

#[tokio::test]
async fn test_review_failure_falls_back_for_everyone() {
    let agent = MockAgent::new().with_failure("drama critic");

    let mut harness = SessionHarness::with_agent("A tense standoff", roster(), agent);
    let outcome = harness.round(None).await;

    assert!(outcome.via_fallback);
    assert_eq!(outcome.utterances.len(), 3);
}

#[tokio::test]
async fn test_perform_failure_abandons_the_directed_round() {
    // One character failing mid-perform drops the whole directed round;
    // the fallback then covers every candidate independently, skipping
    // only the one that still fails there.
    let agent = MockAgent::new().with_failure("You are Mage.");

    let mut harness = SessionHarness::with_agent("A tense standoff", roster(), agent);
    let outcome = harness.round(None).await;

    assert!(outcome.via_fallback);
    let speakers: Vec<&str> = outcome.utterances.iter().map(|u| u.speaker.as_str()).collect();
    assert_eq!(speakers, vec!["Warrior", "Rogue"]);
    assert!(outcome.review.is_none());
}

#[tokio::test]
async fn test_empty_selection_defaults_to_first_candidate() {
    let agent = MockAgent::new()
        .with_assignment(r#"{"selected_characters": [], "instructions": {}}"#);

    let mut harness = SessionHarness::with_agent("An empty stage", roster(), agent);
    let outcome = harness.round(None).await;

    assert!(!outcome.via_fallback);
    assert_eq!(outcome.utterances.len(), 1);
    assert_eq!(outcome.utterances[0].speaker, "Warrior");
}

#[tokio::test]
async fn test_single_speaker_rotation() {
    let config = SessionConfig::new("A campfire council")
        .with_characters(roster())
        .with_mode(TurnMode::SingleSpeaker);
    let mut harness = SessionHarness::from_config(config, MockAgent::new());

    let mut speakers = Vec::new();
    for _ in 0..4 {
        let outcome = harness.round(None).await;
        assert_eq!(outcome.utterances.len(), 1);
        speakers.push(outcome.utterances[0].speaker.clone());
    }
    assert_eq!(speakers, vec!["Warrior", "Mage", "Rogue", "Warrior"]);
}

#[tokio::test]
async fn test_rotation_survives_mid_session_join() {
    let config = SessionConfig::new("A campfire council")
        .with_characters(vec![
            Character::new("Warrior", "brave"),
            Character::new("Mage", "careful"),
        ])
        .with_mode(TurnMode::SingleSpeaker);
    let mut harness = SessionHarness::from_config(config, MockAgent::new());

    assert_eq!(harness.round(None).await.utterances[0].speaker, "Warrior");

    harness.session.add_character(Character::new("Bard", "loud"));
    assert_eq!(harness.round(None).await.utterances[0].speaker, "Mage");
    assert_eq!(harness.round(None).await.utterances[0].speaker, "Bard");
    assert_eq!(harness.round(None).await.utterances[0].speaker, "Warrior");

    // The newcomer saw only what was said after the join.
    let store = harness.session.store();
    assert_eq!(store.partition_len("Bard"), 3);
    assert_eq!(store.partition_len("Warrior"), 4);
}

#[tokio::test]
async fn test_round_with_empty_roster_completes() {
    let config = SessionConfig::new("An empty room");
    let mut harness = SessionHarness::from_config(config, MockAgent::new());

    let outcome = harness.round(Some("Hello?")).await;
    assert!(outcome.is_empty());
    assert!(!outcome.via_fallback);

    // The user's line is still recorded.
    assert_eq!(harness.session.store().shared_len(), 1);
}

#[tokio::test]
async fn test_open_scene_produces_establishing_lines() {
    let agent = MockAgent::new()
        .with_character_line("Warrior", "So this is the famous cellar.")
        .with_character_line("Mage", "Someone warded this place.");

    let mut harness = SessionHarness::with_agent(
        "A tavern cellar",
        vec![
            Character::new("Warrior", "brave"),
            Character::new("Mage", "careful"),
        ],
        agent,
    );
    let outcome = harness.session.open_scene().await;

    assert!(outcome.via_fallback);
    assert!(outcome.plot_goal.is_none());
    assert_eq!(outcome.utterances.len(), 2);
    assert_eq!(harness.session.store().shared_len(), 2);
    assert_eq!(harness.agent.calls_matching("stage director"), 0);
}

#[tokio::test]
async fn test_reset_clears_messages_and_rotation() {
    let config = SessionConfig::new("A campfire council")
        .with_characters(roster())
        .with_mode(TurnMode::SingleSpeaker);
    let mut harness = SessionHarness::from_config(config, MockAgent::new());

    harness.round(Some("Speak.")).await;
    harness.round(None).await;
    assert!(harness.session.store().shared_len() > 0);

    harness.session.reset();
    assert_eq!(harness.session.store().shared_len(), 0);
    assert_eq!(harness.session.characters().len(), 3);

    // Rotation restarts from the top of the roster.
    let outcome = harness.round(None).await;
    assert_eq!(outcome.utterances[0].speaker, "Warrior");
}
