use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rec_postproc::event::{FileCloseData, RoomData, SessionData};
use rec_postproc::live::LiveInfo;
use rec_postproc::notify::{
    EmbedImage, NotificationSender, Notifier, UPDATE_QUEUE_CAPACITY, UpdateQueue, UpdateWorker,
};
use rec_postproc::storage::GIB;
use rec_postproc::testing::mocks::{RecordingTransport, ScriptedBackend, StaticMetadata};
use rec_postproc::upload::UploadTask;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn room() -> RoomData {
    RoomData {
        room_id: 1234,
        streamer_name: "someone".into(),
        title: "late night stream".into(),
        ..Default::default()
    }
}

fn sender(
    transport: Arc<RecordingTransport>,
    capacity: usize,
) -> (NotificationSender, mpsc::Receiver<rec_postproc::notify::UpdateTask>) {
    let (updates, rx) = UpdateQueue::bounded(capacity);
    let storage = Arc::new(ScriptedBackend::new(2 * GIB));
    let sender = NotificationSender::new(transport, updates, storage);
    (sender, rx)
}

fn close_data() -> FileCloseData {
    FileCloseData {
        relative_path: "1234-someone/a.flv".into(),
        file_size: GIB,
        duration: 90.5,
        session_id: "s1".into(),
        room: room(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_record_start_schedules_one_cover_update() {
    let transport = Arc::new(RecordingTransport::default());
    let (sender, mut rx) = sender(transport.clone(), UPDATE_QUEUE_CAPACITY);

    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let data = SessionData {
        session_id: "s1".into(),
        room: room(),
    };
    sender.on_record_start(at, &data).await.expect("sent");

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let embed = &sent[0].embeds[0];
    assert_eq!(embed.title, "Recording started");
    assert_eq!(embed.timestamp, "2024-05-01T12:00:00Z");
    assert_eq!(embed.fields[0].value, "2.000 GB");

    let task = rx.try_recv().expect("one update task");
    assert_eq!(task.message_id, "msg-1");
    assert_eq!(task.room_id, 1234);
    assert_eq!(task.image, EmbedImage::Cover);
    assert!(rx.try_recv().is_err(), "exactly one task per send");
}

#[tokio::test]
async fn test_record_ready_uses_keyframe() {
    let transport = Arc::new(RecordingTransport::default());
    let (sender, mut rx) = sender(transport.clone(), UPDATE_QUEUE_CAPACITY);

    sender
        .on_record_ready(Utc::now(), &close_data())
        .await
        .expect("sent");

    let embed = &transport.sent()[0].embeds[0];
    let values: Vec<&str> = embed.fields.iter().map(|f| f.value.as_str()).collect();
    assert_eq!(values, vec!["a.flv", "1.000 GB", "1m30.500s"]);
    assert_eq!(rx.try_recv().expect("task").image, EmbedImage::Keyframe);
}

#[tokio::test]
async fn test_upload_complete_uses_avatar_only() {
    let transport = Arc::new(RecordingTransport::default());
    let (sender, mut rx) = sender(transport.clone(), UPDATE_QUEUE_CAPACITY);

    let task = UploadTask::from_event(&close_data());
    sender
        .on_upload_complete(Utc::now(), &task, Duration::from_secs(75))
        .await
        .expect("sent");

    let embed = &transport.sent()[0].embeds[0];
    assert_eq!(embed.fields[1].value, "1m15s");
    assert_eq!(rx.try_recv().expect("task").image, EmbedImage::None);
}

#[tokio::test]
async fn test_alert_schedules_no_update() {
    let transport = Arc::new(RecordingTransport::default());
    let (sender, mut rx) = sender(transport.clone(), UPDATE_QUEUE_CAPACITY);

    sender
        .alert("error uploading a.flv", &anyhow::anyhow!("quota exceeded"))
        .await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].embeds[0].fields[0].value, "quota exceeded");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_full_update_queue_does_not_fail_send() {
    let transport = Arc::new(RecordingTransport::default());
    let (sender, _rx) = sender(transport.clone(), 1);

    let data = close_data();
    sender.on_record_ready(Utc::now(), &data).await.expect("first");
    // enrichment is dropped, the message itself still goes out
    sender.on_record_ready(Utc::now(), &data).await.expect("second");

    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn test_send_failure_propagates() {
    let transport = Arc::new(RecordingTransport::failing());
    let (sender, mut rx) = sender(transport, UPDATE_QUEUE_CAPACITY);

    assert!(sender.on_record_ready(Utc::now(), &close_data()).await.is_err());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_worker_edits_message_with_live_images() {
    let transport = Arc::new(RecordingTransport::default());
    let (sender, rx) = sender(transport.clone(), UPDATE_QUEUE_CAPACITY);
    let metadata = Arc::new(StaticMetadata::new(LiveInfo {
        avatar_url: "https://i0/face.jpg".into(),
        cover_url: "https://i0/cover.jpg".into(),
        keyframe_url: "https://i0/kf.jpg".into(),
    }));

    sender
        .on_record_ready(Utc::now(), &close_data())
        .await
        .expect("sent");
    // closing the queue lets the worker finish after draining
    drop(sender);

    let worker = UpdateWorker::new("test", transport.clone(), metadata.clone());
    worker
        .spawn(rx, CancellationToken::new())
        .await
        .expect("worker exits");

    let edits = transport.edits();
    assert_eq!(edits.len(), 1);
    let (id, message) = &edits[0];
    assert_eq!(id, "msg-1");
    let embed = &message.embeds[0];
    assert_eq!(
        embed.thumbnail.as_ref().map(|t| t.url.as_str()),
        Some("https://i0/face.jpg")
    );
    assert_eq!(
        embed.image.as_ref().map(|i| i.url.as_str()),
        Some("https://i0/kf.jpg")
    );
    assert_eq!(metadata.calls(), 1);
}

#[tokio::test]
async fn test_failed_lookup_leaves_message_alone() {
    let transport = Arc::new(RecordingTransport::default());
    let (sender, rx) = sender(transport.clone(), UPDATE_QUEUE_CAPACITY);

    sender
        .on_record_ready(Utc::now(), &close_data())
        .await
        .expect("sent");
    drop(sender);

    UpdateWorker::new("test", transport.clone(), Arc::new(StaticMetadata::failing()))
        .spawn(rx, CancellationToken::new())
        .await
        .expect("worker exits");

    assert!(transport.edits().is_empty());
    assert_eq!(transport.sent().len(), 1);
}
