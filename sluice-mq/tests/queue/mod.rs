use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use sluice_mq::{ChangeType, DeadLetter, Envelope, MqError, Queue};

pub fn envelope(event_id: &str) -> Envelope {
    Envelope {
        event_id: event_id.to_owned(),
        source_collection: "results".to_owned(),
        source_document_id: "doc-1".to_owned(),
        change_type: ChangeType::Create,
        payload: json!({ "subject_id": "user-1", "score": 85 }),
        occurred_at: Utc::now(),
        attempt_count: 0,
    }
}

pub async fn test_publish_receive_ack(queue: &Queue) -> Result<()> {
    queue.publish(envelope("evt-1")).await?;
    queue.publish(envelope("evt-2")).await?;

    let deliveries = queue.receive(10).await?;
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[0].envelope.event_id, "evt-1");
    assert_eq!(deliveries[0].redelivery_count, 1);

    for delivery in &deliveries {
        queue.ack(&delivery.envelope.event_id).await?;
    }

    assert!(queue.receive(10).await?.is_empty());

    Ok(())
}

pub async fn test_nack_redelivers_with_incremented_count(queue: &Queue) -> Result<()> {
    queue.publish(envelope("evt-3")).await?;

    let deliveries = queue.receive(10).await?;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].redelivery_count, 1);

    queue.nack("evt-3").await?;

    let deliveries = queue.receive(10).await?;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].envelope.event_id, "evt-3");
    assert_eq!(deliveries[0].redelivery_count, 2);

    queue.ack("evt-3").await?;

    Ok(())
}

pub async fn test_receive_respects_batch_size(queue: &Queue) -> Result<()> {
    for i in 0..5 {
        queue.publish(envelope(&format!("evt-batch-{i}"))).await?;
    }

    let deliveries = queue.receive(3).await?;
    assert_eq!(deliveries.len(), 3);

    let rest = queue.receive(10).await?;
    assert_eq!(rest.len(), 2);

    Ok(())
}

pub async fn test_dead_letter_lifecycle(queue: &Queue) -> Result<()> {
    let mut envelope = envelope("evt-4");
    envelope.attempt_count = 2;

    queue
        .dead_letter(DeadLetter::new(envelope, "warehouse timed out"))
        .await?;

    let found = queue.find_dead_letter("evt-4").await?.unwrap();
    assert_eq!(found.failure_reason, "warehouse timed out");
    assert_eq!(found.retry_count, 2);

    let removed = queue.remove_dead_letter("evt-4").await?;
    assert!(removed.is_some());
    assert!(queue.find_dead_letter("evt-4").await?.is_none());
    assert!(queue.remove_dead_letter("evt-4").await?.is_none());

    Ok(())
}

pub async fn test_publish_rejects_invalid_envelope(queue: &Queue) -> Result<()> {
    let mut invalid = envelope("");
    invalid.source_collection = String::new();

    let err = queue.publish(invalid).await.unwrap_err();
    assert!(matches!(err, MqError::Validation(_)));

    assert!(queue.receive(10).await?.is_empty());

    Ok(())
}
