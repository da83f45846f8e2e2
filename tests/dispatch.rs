//! Dispatcher integration tests: classify, append, route, reply

use std::sync::Arc;
use std::sync::atomic::Ordering;

use thread_relay::assistant::{NewContent, NewPart, RUN_FAILED_TEXT};
use thread_relay::channels::Channel;
use thread_relay::handlers::{
    IMAGE_DOWNLOAD_FAILED, IMAGE_FAILED, MUSIC_NOT_FOUND, SUMMARY_FAILED, TRANSCRIPT_MISSING,
};
use thread_relay::integrations::SpotifyClient;
use thread_relay::intent::{AuditLog, IntentClassifier};
use thread_relay::{Dispatcher, RoutingFlags, TypingDelay};

mod common;
use common::{
    MockAssistant, MockChannel, MockCompletion, MockTranscript, conversation, image_message,
    spawn_fake_spotify, text_message,
};

struct Harness {
    backend: Arc<MockAssistant>,
    channel: Arc<MockChannel>,
    summarizer: Arc<MockCompletion>,
    transcripts: Arc<MockTranscript>,
    audit: AuditLog,
    dispatcher: Dispatcher,
    _dir: tempfile::TempDir,
}

struct Setup {
    backend: MockAssistant,
    channel: MockChannel,
    classifier: MockCompletion,
    summarizer: MockCompletion,
    transcripts: MockTranscript,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            backend: MockAssistant::completing(1, "Gezellig!"),
            channel: MockChannel::new(),
            classifier: MockCompletion::answering("ja"),
            summarizer: MockCompletion::answering("Een kat speelt piano."),
            transcripts: MockTranscript::returning("miauw miauw"),
        }
    }
}

impl Setup {
    fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::in_dir(dir.path());

        let backend = Arc::new(self.backend);
        let channel = Arc::new(self.channel);
        let summarizer = Arc::new(self.summarizer);
        let transcripts = Arc::new(self.transcripts);

        let classifier = IntentClassifier::new(
            Arc::new(self.classifier),
            "gpt-4o-mini",
            "Jeroen",
            audit.clone(),
        );
        let video = thread_relay::handlers::VideoHandler::new(
            transcripts.clone(),
            summarizer.clone(),
            "gpt-4o-mini",
        );
        let dyn_channel: Arc<dyn Channel> = channel.clone();

        let dispatcher = Dispatcher::new(
            conversation(backend.clone()),
            classifier,
            dyn_channel,
            video,
            "Jeroen",
        )
        .with_delay(TypingDelay::none());

        Harness {
            backend,
            channel,
            summarizer,
            transcripts,
            audit,
            dispatcher,
            _dir: dir,
        }
    }
}

#[tokio::test]
async fn test_generic_reply_quotes_message() {
    let h = Setup::default().build();
    let message = text_message("wamid.1", "Zin in een biertje vanavond?");

    h.dispatcher.handle(&message).await.unwrap();

    assert_eq!(
        h.backend.appended_texts().await,
        vec!["Zin in een biertje vanavond?"]
    );
    let sent = h.channel.get_sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content, "Gezellig!");
    assert_eq!(sent[0].reply_to.as_deref(), Some("wamid.1"));
    assert_eq!(sent[0].chat_id, message.chat_id);
    assert_eq!(h.channel.typing.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_negative_decision_is_marked_and_silent() {
    let h = Setup {
        classifier: MockCompletion::answering("nee"),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&text_message("wamid.2", "ok"))
        .await
        .unwrap();

    assert_eq!(h.backend.appended_texts().await, vec!["🔻🔻🔻 ok"]);
    assert!(h.channel.get_sent_messages().await.is_empty());
    assert_eq!(h.backend.runs_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_one_append_per_message() {
    let h = Setup::default().build();

    for (i, body) in ["eerste", "tweede", "derde"].iter().enumerate() {
        h.dispatcher
            .handle(&text_message(&format!("wamid.{i}"), body))
            .await
            .unwrap();
    }

    assert_eq!(
        h.backend.appended_texts().await,
        vec!["eerste", "tweede", "derde"]
    );
    assert_eq!(h.channel.get_sent_messages().await.len(), 3);
}

#[tokio::test]
async fn test_classifier_failure_fails_safe() {
    let h = Setup {
        classifier: MockCompletion::failing("rate limited"),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&text_message("wamid.3", "hallo?"))
        .await
        .unwrap();

    assert_eq!(h.backend.appended_texts().await, vec!["🔻🔻🔻 hallo?"]);
    assert!(h.channel.get_sent_messages().await.is_empty());

    let audit = std::fs::read_to_string(h.audit.path()).unwrap();
    assert_eq!(audit.lines().count(), 1);
    assert!(audit.contains("Beslissing: fout"));
}

#[tokio::test]
async fn test_video_link_appends_summary_then_replies() {
    let h = Setup::default().build();
    let message = text_message("wamid.4", "kijk dit https://youtu.be/dQw4w9WgXcQ");

    h.dispatcher.handle(&message).await.unwrap();

    assert_eq!(
        *h.transcripts.urls.lock().await,
        vec!["https://youtu.be/dQw4w9WgXcQ"]
    );
    assert_eq!(h.summarizer.calls().await, 1);
    assert_eq!(
        h.backend.appended_texts().await,
        vec![
            "kijk dit https://youtu.be/dQw4w9WgXcQ".to_string(),
            "Samenvatting van de video:\nEen kat speelt piano.\n\nReageer zoals Jeroen."
                .to_string(),
        ]
    );
    assert_eq!(h.channel.sent_texts().await, vec!["Gezellig!"]);
}

#[tokio::test]
async fn test_video_without_transcript_short_circuits() {
    let h = Setup {
        transcripts: MockTranscript::failing("no captions"),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&text_message("wamid.5", "https://youtu.be/abc"))
        .await
        .unwrap();

    assert_eq!(h.channel.sent_texts().await, vec![TRANSCRIPT_MISSING]);
    assert_eq!(h.summarizer.calls().await, 0);
    assert_eq!(h.backend.appended_texts().await.len(), 1);
    assert_eq!(h.backend.runs_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_video_summary_failure_short_circuits() {
    let h = Setup {
        summarizer: MockCompletion::failing("overloaded"),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&text_message("wamid.6", "https://youtu.be/abc"))
        .await
        .unwrap();

    assert_eq!(h.channel.sent_texts().await, vec![SUMMARY_FAILED]);
    assert_eq!(h.backend.appended_texts().await.len(), 1);
    assert_eq!(h.backend.runs_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_music_link_builds_prompt_from_metadata() {
    let spotify = spawn_fake_spotify().await;
    let client = SpotifyClient::with_endpoints(
        "id".to_string(),
        "secret".to_string().into(),
        spotify.token_url(),
        spotify.api_base(),
    )
    .unwrap();

    let mut h = Setup::default().build();
    h.dispatcher = h.dispatcher.with_spotify(Arc::new(client));

    h.dispatcher
        .handle(&text_message(
            "wamid.7",
            "luister https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC",
        ))
        .await
        .unwrap();

    let appended = h.backend.appended_texts().await;
    assert_eq!(appended.len(), 2);
    assert!(appended[1].starts_with("Je bent Jeroen."));
    assert!(appended[1].contains("Titel: Never Gonna Give You Up"));
    assert!(appended[1].contains("Artiest: Rick Astley"));
    assert_eq!(h.channel.sent_texts().await, vec!["Gezellig!"]);
}

#[tokio::test]
async fn test_music_link_not_found() {
    let spotify = spawn_fake_spotify().await;
    let client = SpotifyClient::with_endpoints(
        "id".to_string(),
        "secret".to_string().into(),
        spotify.token_url(),
        spotify.api_base(),
    )
    .unwrap();

    let mut h = Setup::default().build();
    h.dispatcher = h.dispatcher.with_spotify(Arc::new(client));

    h.dispatcher
        .handle(&text_message(
            "wamid.8",
            "https://open.spotify.com/playlist/missing",
        ))
        .await
        .unwrap();

    assert_eq!(h.channel.sent_texts().await, vec![MUSIC_NOT_FOUND]);
    assert_eq!(h.backend.runs_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_music_link_without_client_is_generic() {
    let h = Setup::default().build();

    h.dispatcher
        .handle(&text_message("wamid.9", "https://open.spotify.com/track/abc"))
        .await
        .unwrap();

    assert_eq!(h.backend.appended_texts().await.len(), 1);
    assert_eq!(h.channel.sent_texts().await, vec!["Gezellig!"]);
}

#[tokio::test]
async fn test_image_is_uploaded_and_attached() {
    let h = Setup {
        channel: MockChannel::with_media(vec![0x89, b'P', b'N', b'G']),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&image_message("wamid.10", "wat vind je hiervan"))
        .await
        .unwrap();

    let uploads = h.backend.uploads.lock().await.clone();
    assert_eq!(uploads.len(), 1);
    let (path, existed) = &uploads[0];
    let name = path.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("image_") && name.ends_with(".png"));
    assert!(existed);
    assert!(!path.exists(), "temp image left behind at {}", path.display());

    let appended = h.backend.appended.lock().await.clone();
    assert_eq!(appended.len(), 2);
    let NewContent::Parts(parts) = &appended[1].content else {
        panic!("expected multi-part message");
    };
    assert!(matches!(&parts[0], NewPart::Text { text } if text.contains("Jeroen")));
    assert!(
        matches!(&parts[1], NewPart::ImageFile { image_file } if image_file.file_id == "file_123")
    );

    assert_eq!(h.channel.sent_texts().await, vec!["Gezellig!"]);
}

#[tokio::test]
async fn test_rejected_upload_removes_temp_image() {
    let h = Setup {
        backend: MockAssistant::completing(1, "Gezellig!").rejecting_uploads(),
        channel: MockChannel::with_media(vec![0x89, b'P', b'N', b'G']),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&image_message("wamid.14", "en dit?"))
        .await
        .unwrap();

    assert_eq!(h.channel.sent_texts().await, vec![IMAGE_FAILED]);
    let uploads = h.backend.uploads.lock().await.clone();
    assert_eq!(uploads.len(), 1);
    let (path, existed) = &uploads[0];
    assert!(existed);
    assert!(!path.exists(), "temp image left behind at {}", path.display());
    assert_eq!(h.backend.runs_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_image_download_failure() {
    let h = Setup::default().build();

    h.dispatcher
        .handle(&image_message("wamid.11", ""))
        .await
        .unwrap();

    assert_eq!(h.channel.sent_texts().await, vec![IMAGE_DOWNLOAD_FAILED]);
    assert!(h.backend.uploads.lock().await.is_empty());
}

#[tokio::test]
async fn test_images_disabled_routes_generic() {
    let mut h = Setup::default().build();
    h.dispatcher = h.dispatcher.with_routing(RoutingFlags {
        music_links: true,
        images: false,
    });

    h.dispatcher
        .handle(&image_message("wamid.12", "kijk"))
        .await
        .unwrap();

    assert!(h.backend.uploads.lock().await.is_empty());
    assert_eq!(h.channel.sent_texts().await, vec!["Gezellig!"]);
}

#[tokio::test]
async fn test_append_failure_sends_nothing() {
    let h = Setup {
        backend: MockAssistant::completing(1, "Gezellig!").rejecting_appends(),
        ..Setup::default()
    }
    .build();

    let result = h.dispatcher.handle(&text_message("wamid.13", "hoi")).await;

    assert!(result.is_err());
    assert!(h.channel.get_sent_messages().await.is_empty());
    assert_eq!(h.backend.runs_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_run_drains_queue_in_order() {
    let h = Setup::default().build();
    let (tx, rx) = tokio::sync::mpsc::channel(8);

    tx.send(text_message("wamid.a", "een")).await.unwrap();
    tx.send(text_message("wamid.b", "twee")).await.unwrap();
    drop(tx);

    let backend = h.backend.clone();
    let channel = h.channel.clone();
    h.dispatcher.run(rx).await;

    assert_eq!(backend.appended_texts().await, vec!["een", "twee"]);
    let replied: Vec<_> = channel
        .get_sent_messages()
        .await
        .into_iter()
        .map(|m| m.reply_to.unwrap_or_default())
        .collect();
    assert_eq!(replied, vec!["wamid.a", "wamid.b"]);
}

#[tokio::test]
async fn test_generic_run_failure_still_replies() {
    let h = Setup {
        backend: MockAssistant::completing(1, "Gezellig!").rejecting_runs(),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&text_message("wamid.15", "hoi"))
        .await
        .unwrap();

    let sent = h.channel.get_sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content, RUN_FAILED_TEXT);
    assert_eq!(sent[0].reply_to.as_deref(), Some("wamid.15"));
}

#[tokio::test]
async fn test_video_context_append_failure_still_replies() {
    let h = Setup {
        backend: MockAssistant::completing(1, "Gezellig!").rejecting_appends_after(1),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&text_message("wamid.16", "https://youtu.be/abc"))
        .await
        .unwrap();

    assert_eq!(h.channel.sent_texts().await, vec![RUN_FAILED_TEXT]);
    assert_eq!(h.backend.appended_texts().await.len(), 1);
    assert_eq!(h.backend.runs_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_video_run_failure_still_replies() {
    let h = Setup {
        backend: MockAssistant::completing(1, "Gezellig!").rejecting_runs(),
        ..Setup::default()
    }
    .build();

    h.dispatcher
        .handle(&text_message("wamid.17", "https://youtu.be/abc"))
        .await
        .unwrap();

    assert_eq!(h.channel.sent_texts().await, vec![RUN_FAILED_TEXT]);
    assert_eq!(h.backend.appended_texts().await.len(), 2);
}

#[tokio::test]
async fn test_poll_error_does_not_block_next_message() {
    let h = Setup {
        backend: MockAssistant::completing(1, "Gezellig!").failing_first_polls(1),
        ..Setup::default()
    }
    .build();

    for (id, body) in [("wamid.18", "een"), ("wamid.19", "twee")] {
        h.dispatcher.handle(&text_message(id, body)).await.unwrap();
    }

    assert_eq!(h.backend.appended_texts().await, vec!["een", "twee"]);
    assert_eq!(h.channel.sent_texts().await, vec!["Gezellig!", "Gezellig!"]);
}
