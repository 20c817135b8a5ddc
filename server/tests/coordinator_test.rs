//! Coordinator tests over the in-memory store.
//!
//! Exercise the lobby lifecycle, PIN authentication, the action path, and
//! the timer re-entry discipline without a Redis instance.

use std::sync::Arc;

use homegame_server::coordinator::Coordinator;
use homegame_server::models::{CreateGameRequest, GameSettings, GameStatus, JoinGameRequest};
use homegame_server::registry::ConnectionRegistry;
use homegame_server::store::{GameStore, MemoryStore};
use homegame_server::timer::TimerScheduler;
use homegame_server::{unix_now, ServerError};
use homegame_shared::PlayerAction;
use homegame_table::EngineError;

fn coordinator() -> Arc<Coordinator> {
    Arc::new(Coordinator::new(
        GameStore::new(Box::new(MemoryStore::default())),
        Arc::new(ConnectionRegistry::new()),
        Arc::new(TimerScheduler::new()),
    ))
}

fn settings() -> GameSettings {
    GameSettings {
        starting_chips: 1000,
        turn_timeout: 30,
        blind_level_duration: 0,
        target_game_time: 0,
        auto_deal_enabled: false,
        ..GameSettings::default()
    }
}

const CREATOR_PIN: &str = "1234";
const JOINER_PIN: &str = "5678";

async fn create_lobby(c: &Coordinator) -> (String, String, String) {
    let (code, creator_id, _) = c
        .create_game(&CreateGameRequest {
            creator_name: "Alice".to_string(),
            creator_pin: CREATOR_PIN.to_string(),
            settings: settings(),
        })
        .await
        .unwrap();
    let (joiner_id, _) = c
        .join_game(
            &code,
            &JoinGameRequest {
                player_name: "Bob".to_string(),
                player_pin: JOINER_PIN.to_string(),
            },
        )
        .await
        .unwrap();
    (code, creator_id, joiner_id)
}

async fn start_game(c: &Coordinator, code: &str, creator_id: &str, joiner_id: &str) {
    c.toggle_ready(code, creator_id, CREATOR_PIN).await.unwrap();
    c.toggle_ready(code, joiner_id, JOINER_PIN).await.unwrap();
    c.start_game(code, creator_id, CREATOR_PIN).await.unwrap();
}

fn pin_for<'a>(player_id: &str, creator_id: &str) -> &'a str {
    if player_id == creator_id {
        CREATOR_PIN
    } else {
        JOINER_PIN
    }
}

#[tokio::test]
async fn test_create_join_and_reconnect() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;

    let state = c.lobby_state(&code).await.unwrap();
    assert_eq!(state.status, GameStatus::Lobby);
    assert_eq!(state.players.len(), 2);
    assert_eq!(state.creator_id, creator_id);

    // Joining again with the same name and PIN is a reconnect.
    let (reconnect_id, _) = c
        .join_game(
            &code,
            &JoinGameRequest {
                player_name: "bob".to_string(),
                player_pin: JOINER_PIN.to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reconnect_id, joiner_id);

    // Same name, wrong PIN: rejected.
    let err = c
        .join_game(
            &code,
            &JoinGameRequest {
                player_name: "Bob".to_string(),
                player_pin: "0000".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NameTaken));

    let err = c
        .join_game(
            "ZZZZZZ",
            &JoinGameRequest {
                player_name: "Carol".to_string(),
                player_pin: "1111".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::GameNotFound));
}

#[tokio::test]
async fn test_start_requires_creator_and_readiness() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;

    let err = c.start_game(&code, &joiner_id, JOINER_PIN).await.unwrap_err();
    assert!(matches!(err, ServerError::CreatorOnly(_)));

    let err = c
        .start_game(&code, &creator_id, CREATOR_PIN)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::PlayersNotReady(_)));

    start_game(&c, &code, &creator_id, &joiner_id).await;
    let state = c.lobby_state(&code).await.unwrap();
    assert_eq!(state.status, GameStatus::Active);

    // The first hand is dealt and persisted.
    let view = c.player_state(&code, &creator_id).await.unwrap();
    assert_eq!(view.hand_number, 1);
    assert!(view.hand_active);
    assert_eq!(view.my_cards.as_ref().unwrap().len(), 2);
    assert!(view.action_on.is_some());
}

#[tokio::test]
async fn test_invalid_pin_rejected_on_actions() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;
    start_game(&c, &code, &creator_id, &joiner_id).await;

    let err = c
        .process_action(&code, &creator_id, "9999", PlayerAction::Fold, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::InvalidPin));

    let err = c
        .process_action(&code, "nobody", CREATOR_PIN, PlayerAction::Fold, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::PlayerNotFound));
}

#[tokio::test]
async fn test_action_flow_and_deal_gating() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;
    start_game(&c, &code, &creator_id, &joiner_id).await;

    // Dealing while the hand is live is rejected.
    let err = c
        .deal_next_hand(&code, &creator_id, CREATOR_PIN)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::Engine(EngineError::HandStillActive)
    ));

    // The player on turn folds; heads-up, that ends the hand.
    let view = c.player_state(&code, &creator_id).await.unwrap();
    let actor = view.action_on.clone().unwrap();
    let view = c
        .process_action(
            &code,
            &actor,
            pin_for(&actor, &creator_id),
            PlayerAction::Fold,
            0,
        )
        .await
        .unwrap();
    assert!(!view.hand_active);
    let chips: u32 = view.players.iter().map(|p| p.chips).sum();
    assert_eq!(chips, 2000);

    // Now the creator can deal the next hand.
    let view = c
        .deal_next_hand(&code, &creator_id, CREATOR_PIN)
        .await
        .unwrap();
    assert!(view.hand_active);
    assert_eq!(view.hand_number, 2);
}

#[tokio::test]
async fn test_pause_toggle_is_creator_only() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;
    start_game(&c, &code, &creator_id, &joiner_id).await;

    // Finish the first hand.
    let view = c.player_state(&code, &creator_id).await.unwrap();
    let actor = view.action_on.clone().unwrap();
    c.process_action(
        &code,
        &actor,
        pin_for(&actor, &creator_id),
        PlayerAction::Fold,
        0,
    )
    .await
    .unwrap();

    let err = c
        .toggle_pause(&code, &joiner_id, JOINER_PIN)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::CreatorOnly(_)));

    let view = c.toggle_pause(&code, &creator_id, CREATOR_PIN).await.unwrap();
    assert!(view.paused);
    let err = c
        .deal_next_hand(&code, &creator_id, CREATOR_PIN)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Engine(EngineError::GamePaused)));

    let view = c.toggle_pause(&code, &creator_id, CREATOR_PIN).await.unwrap();
    assert!(!view.paused);
}

#[tokio::test]
async fn test_leave_game_rules() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;

    let err = c
        .leave_game(&code, &creator_id, CREATOR_PIN)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::CreatorCannotLeave));

    let state = c.leave_game(&code, &joiner_id, JOINER_PIN).await.unwrap();
    assert_eq!(state.players.len(), 1);
    assert_eq!(state.players[0].id, creator_id);
}

#[tokio::test]
async fn test_turn_timeout_auto_folds() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;
    start_game(&c, &code, &creator_id, &joiner_id).await;

    // Expire the turn deadline by hand, then fire the timer path.
    let mut engine = c.store().load_engine(&code).await.unwrap().unwrap();
    assert!(engine.action_deadline.is_some());
    engine.action_deadline = Some(unix_now() - 1.0);
    c.store().store_engine(&code, &engine).await.unwrap();

    c.handle_action_timeout(&code).await.unwrap();

    // Heads-up preflop the actor owes chips, so the timeout folds them and
    // the hand ends.
    let engine = c.store().load_engine(&code).await.unwrap().unwrap();
    assert!(!engine.hand_active);
    assert!(engine.seats.iter().any(|p| p.folded));
}

#[tokio::test]
async fn test_turn_timeout_reregisters_moved_deadline() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;
    start_game(&c, &code, &creator_id, &joiner_id).await;

    // Deadline is still in the future: the fire must be a no-op.
    c.handle_action_timeout(&code).await.unwrap();
    let engine = c.store().load_engine(&code).await.unwrap().unwrap();
    assert!(engine.hand_active);
    assert!(engine.seats.iter().all(|p| !p.folded));
}

#[tokio::test]
async fn test_auto_deal_respects_state() {
    let c = coordinator();
    let (code, creator_id, joiner_id) = create_lobby(&c).await;
    start_game(&c, &code, &creator_id, &joiner_id).await;

    // Hand active: auto-deal is a no-op.
    c.handle_auto_deal(&code).await.unwrap();
    let engine = c.store().load_engine(&code).await.unwrap().unwrap();
    assert_eq!(engine.hand_number, 1);

    // Finish the hand, plant an expired auto-deal deadline, fire it.
    let view = c.player_state(&code, &creator_id).await.unwrap();
    let actor = view.action_on.clone().unwrap();
    c.process_action(
        &code,
        &actor,
        pin_for(&actor, &creator_id),
        PlayerAction::Fold,
        0,
    )
    .await
    .unwrap();

    let mut engine = c.store().load_engine(&code).await.unwrap().unwrap();
    engine.auto_deal_deadline = Some(unix_now() - 1.0);
    c.store().store_engine(&code, &engine).await.unwrap();

    c.handle_auto_deal(&code).await.unwrap();
    let engine = c.store().load_engine(&code).await.unwrap().unwrap();
    assert_eq!(engine.hand_number, 2);
    assert!(engine.hand_active);
}
