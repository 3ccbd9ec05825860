//! Concurrency properties of the list writes
//!
//! The external store has no multi-key transactions, so every list
//! append is a read-modify-write cycle; the per-path version token turns
//! those cycles into compare-and-swap loops. These tests pin the
//! resulting property: near-simultaneous writers to the same path never
//! silently drop each other's entries.

use std::sync::Arc;

use chatsync_core::{
    ChatEngine, ChatUser, DerivedKey, LatestMessage, OutgoingMessage, SessionKey, SessionStore,
};

async fn engine_with_thread() -> (Arc<ChatEngine>, chatsync_core::ConversationId, DerivedKey) {
    let engine = Arc::new(ChatEngine::in_memory());
    engine
        .register_user("Alice", "Anders", "a@x.com", None)
        .await
        .unwrap();
    engine
        .register_user("Bob", "Breck", "b@x.com", None)
        .await
        .unwrap();
    engine.login("a@x.com", "Alice Anders");

    let bob = DerivedKey::from_email("b@x.com");
    let id = engine
        .ledger()
        .create_new_conversation(&bob, "Bob Breck", OutgoingMessage::text("hi", "Alice Anders"))
        .await
        .unwrap();
    (engine, id, bob)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_sends_keep_both_messages() {
    let (engine, id, _) = engine_with_thread().await;

    let mut tasks = Vec::new();
    for text in ["from the left", "from the right"] {
        let ledger = engine.ledger();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            ledger
                .send_message(&id, OutgoingMessage::text(text, "Alice Anders"))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut feed = engine.ledger().subscribe_messages(&id).await.unwrap();
    let history = feed.recv().await.unwrap().unwrap();
    let contents: Vec<_> = history.iter().map(|m| m.content().to_string()).collect();
    assert_eq!(history.len(), 3, "a send was lost: {:?}", contents);
    assert!(contents.contains(&"from the left".to_string()));
    assert!(contents.contains(&"from the right".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_send_burst_keeps_every_message() {
    let (engine, id, _) = engine_with_thread().await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let ledger = engine.ledger();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            ledger
                .send_message(&id, OutgoingMessage::text(format!("m{}", i), "Alice Anders"))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut feed = engine.ledger().subscribe_messages(&id).await.unwrap();
    let history = feed.recv().await.unwrap().unwrap();
    // The opening "hi" plus all sixteen burst sends
    assert_eq!(history.len(), 17);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_all_reach_directory() {
    let engine = Arc::new(ChatEngine::in_memory());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let directory = engine.directory();
        tasks.push(tokio::spawn(async move {
            directory
                .insert_user(
                    &ChatUser {
                        first_name: format!("User{}", i),
                        last_name: "Test".to_string(),
                        email: format!("u{}@x.com", i),
                    },
                    None,
                )
                .await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap());
    }

    // Nobody is logged in, so nothing is filtered out
    let users = engine.directory().get_all_users().await.unwrap();
    assert_eq!(users.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_preview_updates_converge() {
    let (engine, id, bob) = engine_with_thread().await;

    // Let the create's mirror entry land before racing preview updates
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let mut tasks = Vec::new();
    for i in 0..4 {
        let ledger = engine.ledger();
        let id = id.clone();
        let bob = bob.clone();
        tasks.push(tokio::spawn(async move {
            ledger
                .update_latest_message(
                    &bob,
                    &id,
                    LatestMessage {
                        date: "2026-01-02T00:00:00Z".to_string(),
                        text: format!("preview {}", i),
                        is_read: false,
                    },
                )
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut feed = engine.ledger().subscribe_conversations(&bob).await.unwrap();
    let entries = feed.recv().await.unwrap().unwrap();
    assert_eq!(entries.len(), 1, "preview updates must not duplicate entries");
    assert!(entries[0].latest_message.text.starts_with("preview "));
}

#[tokio::test]
async fn test_session_is_shared_read_mostly_state() {
    // Clones of the session observe each other's transition writes
    let session = SessionStore::new();
    let clone = session.clone();
    session.set(SessionKey::Email, "a@x.com");
    assert_eq!(clone.get(SessionKey::Email), "a@x.com");
    assert_eq!(clone.current_derived_key().as_str(), "a-x-com");
}
