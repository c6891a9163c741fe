use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::*;
use crate::app::controller::ControllerOptions;
use crate::backend::MockBackend;
use crate::models::{Conversation, HealthStatus, Message};
use crate::storage::MockSessionStore;

/// Answers every confirmation the same way and remembers the prompts.
struct Answer {
    accept: bool,
    prompts: Mutex<Vec<String>>,
}

impl Answer {
    fn yes() -> Self {
        Self {
            accept: true,
            prompts: Mutex::new(vec![]),
        }
    }

    fn no() -> Self {
        Self {
            accept: false,
            prompts: Mutex::new(vec![]),
        }
    }

    fn asked(&self) -> usize {
        self.prompts.lock().expect("prompts").len()
    }
}

#[async_trait]
impl Confirm for Answer {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().expect("prompts").push(prompt.to_string());
        self.accept
    }
}

fn new_controller(
    backend: MockBackend,
    store: MockSessionStore,
) -> (Arc<Controller>, UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let options = ControllerOptions {
        history_limit: 25,
        search_limit: 5,
        ..Default::default()
    };
    let controller = Controller::new(Arc::new(backend), Arc::new(store), Arc::new(tx), options);
    (Arc::new(controller), rx)
}

fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn summary(id: &str, title: &str) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        title: title.to_string(),
        ..Default::default()
    }
}

fn store_holding(id: &'static str) -> MockSessionStore {
    let mut store = MockSessionStore::new();
    store.expect_get_conversation().returning(move |_| {
        Box::pin(async move {
            Some(Conversation::new(id).with_messages(vec![Message::user("hi")]))
        })
    });
    store
}

#[test]
fn test_is_supported_file() {
    for name in [
        "notes.txt", "README.md", "main.py", "app.js", "data.json", "c.yaml", "c.yml",
        "feed.xml", "index.html", "site.css", "paper.pdf", "letter.docx", "a.jpg",
        "a.JPEG", "a.png", "a.gif", "a.webp", "a.bmp",
    ] {
        assert!(is_supported_file(Path::new(name)), "{name}");
    }
    for name in ["setup.exe", "archive.tar.gz", "Makefile", "main.rs", ".md"] {
        assert!(!is_supported_file(Path::new(name)), "{name}");
    }
}

#[test]
fn test_export_file_name() {
    assert_eq!(export_file_name("42"), "nexus_chat_42.pdf");
}

#[tokio::test]
async fn test_refresh_and_search_history() {
    let mut store = MockSessionStore::new();
    store
        .expect_list_conversations()
        .withf(|limit| *limit == 25)
        .times(2)
        .returning(|_| Box::pin(async { vec![summary("1", "hi"), summary("2", "rust")] }));
    store
        .expect_search()
        .withf(|query, limit| query == "rust" && *limit == 5)
        .times(1)
        .returning(|_, _| Box::pin(async { vec![summary("2", "rust")] }));

    let (controller, _rx) = new_controller(MockBackend::new(), store);
    assert_eq!(controller.refresh_history().await.len(), 2);
    assert_eq!(controller.search_history("  rust ").await, vec![summary("2", "rust")]);
    // A blank query falls back to the plain listing.
    assert_eq!(controller.search_history("   ").await.len(), 2);
}

#[tokio::test]
async fn test_delete_declined_is_a_no_op() {
    let mut store = MockSessionStore::new();
    store.expect_delete_conversation().never();

    let (controller, mut rx) = new_controller(MockBackend::new(), store);
    let answer = Answer::no();
    assert!(!controller.delete_conversation("1", &answer).await);
    assert_eq!(answer.asked(), 1);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_delete_active_conversation_resets_session() {
    let mut store = store_holding("1");
    store
        .expect_delete_conversation()
        .withf(|id| id == "1")
        .times(1)
        .returning(|_| Box::pin(async { true }));

    let mut backend = MockBackend::new();
    backend
        .expect_reset()
        .times(1)
        .returning(|| Box::pin(async { Ok(()) }));

    let (controller, mut rx) = new_controller(backend, store);
    assert!(controller.switch_conversation("1").await);
    drain(&mut rx);

    assert!(controller.delete_conversation("1", &Answer::yes()).await);
    assert_eq!(controller.active_conversation(), None);
    assert!(controller.transcript().is_empty());

    let events = drain(&mut rx);
    assert!(matches!(events[0], Event::SetConversation(None)));
    assert!(matches!(&events[1], Event::ConversationDeleted(id) if id == "1"));
}

#[tokio::test]
async fn test_delete_other_conversation_keeps_session() {
    let mut store = store_holding("1");
    store
        .expect_delete_conversation()
        .withf(|id| id == "2")
        .times(1)
        .returning(|_| Box::pin(async { true }));

    let mut backend = MockBackend::new();
    backend.expect_reset().never();

    let (controller, _rx) = new_controller(backend, store);
    assert!(controller.switch_conversation("1").await);
    assert!(controller.delete_conversation("2", &Answer::yes()).await);
    assert_eq!(controller.active_conversation().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_delete_failure_is_reported() {
    let mut store = MockSessionStore::new();
    store
        .expect_delete_conversation()
        .returning(|_| Box::pin(async { false }));

    let (controller, mut rx) = new_controller(MockBackend::new(), store);
    assert!(!controller.delete_conversation("1", &Answer::yes()).await);
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [Event::Notice(notice)] if notice.kind() == crate::models::NoticeKind::Error
    ));
}

#[tokio::test]
async fn test_clear_history() {
    let mut store = MockSessionStore::new();
    store
        .expect_clear_history()
        .times(1)
        .returning(|| Box::pin(async { true }));

    let mut backend = MockBackend::new();
    backend
        .expect_reset()
        .times(1)
        .returning(|| Box::pin(async { Ok(()) }));

    let (controller, mut rx) = new_controller(backend, store);
    assert!(!controller.clear_history(&Answer::no()).await);
    assert!(controller.clear_history(&Answer::yes()).await);
    assert!(matches!(
        drain(&mut rx).last(),
        Some(Event::HistoryCleared)
    ));
}

#[tokio::test]
async fn test_export_pdf() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut backend = MockBackend::new();
    backend
        .expect_export_pdf()
        .withf(|id| id == "42")
        .times(1)
        .returning(|_| Box::pin(async { Ok(b"%PDF-1.4".to_vec()) }));

    let (controller, _rx) = new_controller(backend, MockSessionStore::new());
    let path = controller
        .export_pdf(Some("42"), dir.path())
        .await
        .expect("exported");

    assert_eq!(path, dir.path().join("nexus_chat_42.pdf"));
    assert_eq!(std::fs::read(&path).expect("read"), b"%PDF-1.4");
}

#[tokio::test]
async fn test_export_pdf_uses_active_conversation() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut backend = MockBackend::new();
    backend
        .expect_export_pdf()
        .withf(|id| id == "7")
        .times(1)
        .returning(|_| Box::pin(async { Ok(vec![1, 2, 3]) }));

    let (controller, mut rx) = new_controller(backend, store_holding("7"));
    assert!(controller.export_pdf(None, dir.path()).await.is_none());
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [Event::Notice(notice)] if notice.kind() == crate::models::NoticeKind::Warning
    ));

    assert!(controller.switch_conversation("7").await);
    let path = controller.export_pdf(None, dir.path()).await;
    assert_eq!(path, Some(dir.path().join("nexus_chat_7.pdf")));
}

#[tokio::test]
async fn test_export_pdf_failure() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut backend = MockBackend::new();
    backend
        .expect_export_pdf()
        .returning(|_| Box::pin(async { Err(eyre::eyre!("Conversation not found")) }));

    let (controller, _rx) = new_controller(backend, MockSessionStore::new());
    assert!(controller.export_pdf(Some("1"), dir.path()).await.is_none());
    assert!(!dir.path().join("nexus_chat_1.pdf").exists());
}

#[tokio::test]
async fn test_upload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.md");
    std::fs::write(&path, "# Notes").expect("write");

    let mut backend = MockBackend::new();
    backend
        .expect_upload()
        .withf(|name, content| name == "notes.md" && content == b"# Notes")
        .times(1)
        .returning(|name, content| {
            Box::pin(async move {
                Ok(UploadResult {
                    success: true,
                    filename: Some(name),
                    file_type: Some("text".to_string()),
                    size: Some(content.len() as u64),
                    ..Default::default()
                })
            })
        });

    let (controller, mut rx) = new_controller(backend, MockSessionStore::new());
    let result = controller.upload(&path).await.expect("uploaded");
    assert!(result.success);
    assert_eq!(result.size, Some(7));
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [Event::Notice(notice)] if notice.message() == "Uploaded notes.md (text)"
    ));
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("setup.exe");
    std::fs::write(&path, [0u8, 1, 2]).expect("write");

    let mut backend = MockBackend::new();
    backend.expect_upload().never();

    let (controller, mut rx) = new_controller(backend, MockSessionStore::new());
    assert!(controller.upload(&path).await.is_none());
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [Event::Notice(notice)] if notice.message().contains(".exe")
    ));
}

#[tokio::test]
async fn test_upload_rejected_by_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("big.pdf");
    std::fs::write(&path, "%PDF").expect("write");

    let mut backend = MockBackend::new();
    backend.expect_upload().returning(|_, _| {
        Box::pin(async {
            Ok(UploadResult {
                success: false,
                error: Some("File too large".to_string()),
                ..Default::default()
            })
        })
    });

    let (controller, mut rx) = new_controller(backend, MockSessionStore::new());
    let result = controller.upload(&path).await.expect("result");
    assert!(!result.success);
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [Event::Notice(notice)] if notice.message() == "Upload failed: File too large"
    ));
}

#[tokio::test]
async fn test_models_and_health_pass_through() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_models()
        .times(1)
        .returning(|| Box::pin(async { Ok(vec![Model::new("auto"), Model::new("coder")]) }));
    backend
        .expect_list_models()
        .returning(|| Box::pin(async { Err(eyre::eyre!("offline")) }));
    backend.expect_health().times(1).returning(|| {
        Box::pin(async {
            Ok(HealthStatus {
                status: "healthy".to_string(),
            })
        })
    });
    backend
        .expect_health()
        .returning(|| Box::pin(async { Err(eyre::eyre!("offline")) }));

    let (controller, _rx) = new_controller(backend, MockSessionStore::new());
    assert_eq!(controller.list_models().await.len(), 2);
    assert!(controller.list_models().await.is_empty());
    assert!(controller.check_health().await);
    assert!(!controller.check_health().await);
}
