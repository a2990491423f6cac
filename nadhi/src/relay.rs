//! Relay handler feeding received records into a pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use nadhi_common::{EvaluatedRecord, incoming};
use nadhi_delivery::Enqueued;
use nadhi_relay::{RelayCommand, RelayHandler, RelayRequest, RelayResponse};
use serde_json::Value;

use crate::Pipeline;

/// Accepts `SendLog` requests and submits them to a [`Pipeline`].
///
/// Routing already happened on the sending side, so records are submitted
/// with the pipelines they arrived with and the rule set is not consulted.
#[derive(Debug)]
pub struct PipelineRelay {
    pipeline: Arc<Pipeline>,
}

impl PipelineRelay {
    pub const fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl RelayHandler for PipelineRelay {
    async fn handle_request(&self, request: RelayRequest) -> nadhi_relay::Result<RelayResponse> {
        let RelayCommand::SendLog {
            pipelines,
            json_data,
        } = request.command
        else {
            return Ok(RelayResponse::ok());
        };

        let payload: Value = match serde_json::from_str(&json_data) {
            Ok(payload) => payload,
            Err(e) => {
                incoming!(level = WARN, "Rejecting record with invalid JSON: {e}");
                return Ok(RelayResponse::error(format!("invalid json_data: {e}")));
            }
        };

        let record = EvaluatedRecord::new(payload, pipelines);
        incoming!(
            "Relayed record {} for {:?}",
            record.trace_id().unwrap_or("-"),
            record.pipelines
        );

        match self.pipeline.submit(record) {
            Enqueued::Dropped => Ok(RelayResponse::error("record dropped by relay")),
            Enqueued::Accepted | Enqueued::WrittenBack(_) => Ok(RelayResponse::ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use nadhi_common::ResolvedConfig;
    use nadhi_delivery::TransportSet;
    use nadhi_relay::ResponsePayload;
    use nadhi_rules::RuleSet;
    use nadhi_spool::{DiskStore, MemoryStore};
    use serde_json::json;

    use super::*;

    fn relay() -> (PipelineRelay, Arc<Pipeline>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(
            Pipeline::builder()
                .config(ResolvedConfig::default())
                .rules(RuleSet::empty())
                .store(Arc::clone(&store) as Arc<dyn DiskStore>)
                .transports(TransportSet::new())
                .build()
                .unwrap(),
        );

        (PipelineRelay::new(Arc::clone(&pipeline)), pipeline, store)
    }

    #[tokio::test]
    async fn test_send_log_is_submitted() {
        let (relay, pipeline, store) = relay();

        let request = RelayRequest::new(
            "key",
            RelayCommand::SendLog {
                pipelines: vec!["audit".into()],
                json_data: json!({"message": "relayed", "trace_id": "t-1"}).to_string(),
            },
        );
        let response = relay.handle_request(request).await.unwrap();
        assert_eq!(response.payload, ResponsePayload::Ok);

        pipeline.flush().await;
        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].record.payload["message"], "relayed");
        assert!(items[0].record.pipelines.contains("audit"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected() {
        let (relay, pipeline, _store) = relay();

        let request = RelayRequest::new(
            "key",
            RelayCommand::SendLog {
                pipelines: vec!["audit".into()],
                json_data: "{not json".into(),
            },
        );
        let response = relay.handle_request(request).await.unwrap();
        assert!(matches!(response.payload, ResponsePayload::Error(_)));
        assert_eq!(pipeline.flush().await.stats.persisted, 0);
    }
}
