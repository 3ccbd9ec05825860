//! End-to-end conversation flow through the ChatEngine API
//!
//! Exercises the full registration → login → first message → reply →
//! preview sync path against the in-memory gateways. No network; the
//! point is the cross-user orchestration, not the backend.

use chatsync_core::{
    ChatEngine, DerivedKey, DisplayBody, DisplayMetrics, OutgoingMessage, SessionKey,
};

async fn two_user_engine() -> ChatEngine {
    let engine = ChatEngine::in_memory();
    engine
        .register_user("Alice", "Anders", "a@x.com", None)
        .await
        .unwrap();
    engine
        .register_user("Bob", "Breck", "b@x.com", None)
        .await
        .unwrap();
    engine
}

/// Give spawned side tasks (mirror entry, avatar upload) a beat to land
async fn settle() {
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
}

#[tokio::test]
async fn test_first_message_creates_both_sides() {
    let engine = two_user_engine().await;
    engine.login("a@x.com", "Alice Anders");

    let bob = DerivedKey::from_email("b@x.com");
    let id = engine
        .ledger()
        .create_new_conversation(&bob, "Bob Breck", OutgoingMessage::text("hi", "Alice Anders"))
        .await
        .unwrap();
    settle().await;

    // Alice's list points at Bob
    let mut alice_feed = engine
        .ledger()
        .subscribe_conversations(&DerivedKey::from_email("a@x.com"))
        .await
        .unwrap();
    let entries = alice_feed.recv().await.unwrap().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id.as_str());
    assert_eq!(entries[0].other_user_email, "b-x-com");
    assert_eq!(entries[0].latest_message.text, "hi");
    assert!(!entries[0].latest_message.is_read);

    // Bob's list mirrors back at Alice
    let mut bob_feed = engine.ledger().subscribe_conversations(&bob).await.unwrap();
    let entries = bob_feed.recv().await.unwrap().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id.as_str());
    assert_eq!(entries[0].other_user_email, "a-x-com");
    assert_eq!(entries[0].name, "Alice Anders");
}

#[tokio::test]
async fn test_text_round_trip_through_projection() {
    let engine = two_user_engine().await;
    engine.login("a@x.com", "Alice Anders");

    let bob = DerivedKey::from_email("b@x.com");
    let id = engine
        .ledger()
        .create_new_conversation(&bob, "Bob Breck", OutgoingMessage::text("hi", "Alice Anders"))
        .await
        .unwrap();

    let mut messages = engine.ledger().subscribe_messages(&id).await.unwrap();
    let history = messages.recv().await.unwrap().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content(), "hi");
    assert_eq!(history[0].sender_key.as_str(), "a-x-com");
    assert!(matches!(history[0].body, DisplayBody::Text(_)));
}

#[tokio::test]
async fn test_deliver_updates_both_previews() {
    let engine = two_user_engine().await;
    engine.login("a@x.com", "Alice Anders");

    let bob = DerivedKey::from_email("b@x.com");
    let id = engine
        .ledger()
        .create_new_conversation(&bob, "Bob Breck", OutgoingMessage::text("hi", "Alice Anders"))
        .await
        .unwrap();
    settle().await;

    engine
        .ledger()
        .deliver(&id, &bob, OutgoingMessage::text("are you there?", "Alice Anders"))
        .await
        .unwrap();

    for key in ["a-x-com", "b-x-com"] {
        let mut feed = engine
            .ledger()
            .subscribe_conversations(&DerivedKey::new(key))
            .await
            .unwrap();
        let entries = feed.recv().await.unwrap().unwrap();
        assert_eq!(entries[0].latest_message.text, "are you there?", "side {}", key);
    }

    let mut messages = engine.ledger().subscribe_messages(&id).await.unwrap();
    let history = messages.recv().await.unwrap().unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_photo_message_projection() {
    let engine = two_user_engine().await;
    engine.login("a@x.com", "Alice Anders");

    let bob = DerivedKey::from_email("b@x.com");
    let id = engine
        .ledger()
        .create_new_conversation(&bob, "Bob Breck", OutgoingMessage::text("hi", "Alice Anders"))
        .await
        .unwrap();
    engine
        .ledger()
        .send_message(
            &id,
            OutgoingMessage::photo("https://cdn/x.png", "Alice Anders"),
        )
        .await
        .unwrap();

    let mut messages = engine.ledger().subscribe_messages(&id).await.unwrap();
    let history = messages.recv().await.unwrap().unwrap();
    let photo = &history[1];
    match &photo.body {
        DisplayBody::Photo { url, width, height } => {
            assert_eq!(url, "https://cdn/x.png");
            assert_eq!(*width, DisplayMetrics::default().screen_width / 3.0);
            assert_eq!(*height, chatsync_core::PHOTO_HEIGHT);
        }
        other => panic!("expected photo body, got {:?}", other),
    }
}

#[tokio::test]
async fn test_directory_excludes_current_user() {
    let engine = two_user_engine().await;
    engine.login("a@x.com", "Alice Anders");

    let users = engine.directory().get_all_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "b-x-com");
    assert!(users.iter().all(|u| u.email != "a-x-com"));
}

#[tokio::test]
async fn test_registration_uploads_avatar_in_background() {
    let engine = ChatEngine::in_memory();
    engine
        .register_user("Alice", "Anders", "a@x.com", Some(vec![0xFF; 64]))
        .await
        .unwrap();
    settle().await;

    assert_eq!(
        engine.session().get(SessionKey::PictureFileName),
        "a-x-com_profile_picture.png"
    );
}

#[tokio::test]
async fn test_messages_keep_append_order() {
    let engine = two_user_engine().await;
    engine.login("a@x.com", "Alice Anders");

    let bob = DerivedKey::from_email("b@x.com");
    let id = engine
        .ledger()
        .create_new_conversation(&bob, "Bob Breck", OutgoingMessage::text("one", "Alice Anders"))
        .await
        .unwrap();
    for text in ["two", "three", "four"] {
        engine
            .ledger()
            .send_message(&id, OutgoingMessage::text(text, "Alice Anders"))
            .await
            .unwrap();
    }

    let mut messages = engine.ledger().subscribe_messages(&id).await.unwrap();
    let history = messages.recv().await.unwrap().unwrap();
    let contents: Vec<_> = history.iter().map(|m| m.content()).collect();
    assert_eq!(contents, ["one", "two", "three", "four"]);
    assert!(history
        .iter()
        .all(|m| matches!(m.body, DisplayBody::Text(_))));
    // All sent by the logged-in identity
    assert!(history.iter().all(|m| m.sender_key.as_str() == "a-x-com"));
}
