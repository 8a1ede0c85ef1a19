//! TraceAggregatorActor - the single display-side store of a tab's traces.
//!
//! Spawned by the host frame agent when the network monitor is armed and
//! stopped when it is disarmed, so a log never outlives its tool session.
//! Only this actor mutates its [`TraceLog`].

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use shared_types::TraceRecord;
use url::Url;

use crate::actors::frame_agent::FrameAgentMsg;
use crate::config::PipelineConfig;
use crate::replay;
use crate::trace_log::{IngestOutcome, StoredTrace, TraceLog, TraceLogStats, TraceQuery};

/// Copy/replay strings for one stored trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutput {
    pub curl: String,
    pub payload: String,
    pub response: String,
}

impl ReplayOutput {
    pub fn for_trace(trace: &StoredTrace) -> Self {
        Self {
            curl: replay::curl_command(trace),
            payload: replay::copy_payload(trace),
            response: replay::copy_response(trace),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceAggregatorArguments {
    /// Page location relative URLs are resolved against
    pub base_url: Option<Url>,
    pub pipeline: PipelineConfig,
    /// Agent told once this aggregator can take records
    pub owner: Option<ActorRef<FrameAgentMsg>>,
}

#[derive(Debug)]
pub enum TraceAggregatorMsg {
    Ingest(TraceRecord),
    Clear,
    /// Most recent first, at most `limit` entries
    Query {
        query: TraceQuery,
        limit: Option<usize>,
        reply: RpcReplyPort<Vec<StoredTrace>>,
    },
    Replay {
        trace_id: String,
        reply: RpcReplyPort<Option<ReplayOutput>>,
    },
    Stats {
        reply: RpcReplyPort<TraceLogStats>,
    },
}

pub struct TraceAggregatorState {
    log: TraceLog,
    owner: Option<ActorRef<FrameAgentMsg>>,
}

#[derive(Debug, Default)]
pub struct TraceAggregatorActor;

#[async_trait]
impl Actor for TraceAggregatorActor {
    type Msg = TraceAggregatorMsg;
    type State = TraceAggregatorState;
    type Arguments = TraceAggregatorArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(TraceAggregatorState {
            log: TraceLog::new(
                args.base_url,
                args.pipeline.filters,
                args.pipeline.trace_log_capacity,
            ),
            owner: args.owner,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(owner) = &state.owner {
            let _ = owner.cast(FrameAgentMsg::AggregatorReady {
                aggregator_id: myself.get_id(),
            });
        }
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            TraceAggregatorMsg::Ingest(record) => {
                let url = record.url.clone();
                match state.log.ingest(record) {
                    IngestOutcome::Stored {
                        duplicate: true,
                        repeat_count,
                    } => {
                        tracing::debug!(url = %url, repeat_count, "Duplicate trace stored");
                    }
                    IngestOutcome::Stored { .. } => {}
                    IngestOutcome::Dropped(reason) => {
                        tracing::debug!(url = %url, ?reason, "Trace filtered");
                    }
                }
            }
            TraceAggregatorMsg::Clear => {
                state.log.clear();
                tracing::debug!("Trace log cleared");
            }
            TraceAggregatorMsg::Query {
                query,
                limit,
                reply,
            } => {
                let traces = state
                    .log
                    .search(&query)
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect();
                let _ = reply.send(traces);
            }
            TraceAggregatorMsg::Replay { trace_id, reply } => {
                let _ = reply.send(state.log.get(&trace_id).map(ReplayOutput::for_trace));
            }
            TraceAggregatorMsg::Stats { reply } => {
                let _ = reply.send(state.log.stats());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{FrameId, TraceKind};

    fn record(url: &str, started_at: i64) -> TraceRecord {
        TraceRecord {
            id: ulid::Ulid::new().to_string(),
            kind: TraceKind::Fetch,
            method: "GET".to_string(),
            url: url.to_string(),
            status: 200,
            request_headers: Vec::new(),
            payload: None,
            response: None,
            started_at,
            duration_ms: 3,
            origin_frame_id: FrameId::HOST,
        }
    }

    async fn spawn() -> ActorRef<TraceAggregatorMsg> {
        let (actor, _handle) = Actor::spawn(
            None,
            TraceAggregatorActor,
            TraceAggregatorArguments {
                base_url: Some(Url::parse("https://shop.example.com/").unwrap()),
                pipeline: PipelineConfig::default(),
                owner: None,
            },
        )
        .await
        .unwrap();
        actor
    }

    #[tokio::test]
    async fn test_query_returns_most_recent_first() {
        let actor = spawn().await;
        actor.cast(TraceAggregatorMsg::Ingest(record("/a", 1_000))).unwrap();
        actor.cast(TraceAggregatorMsg::Ingest(record("/b", 2_000))).unwrap();
        actor
            .cast(TraceAggregatorMsg::Ingest(record("/logo.svg", 2_000)))
            .unwrap();

        let traces = ractor::call!(actor, |reply| TraceAggregatorMsg::Query {
            query: TraceQuery::default(),
            limit: None,
            reply
        })
        .unwrap();
        let urls: Vec<_> = traces.iter().map(|t| t.record.url.as_str()).collect();
        assert_eq!(urls, vec!["/b", "/a"]);

        let stats = ractor::call!(actor, |reply| TraceAggregatorMsg::Stats { reply }).unwrap();
        assert_eq!(stats.stored, 2);
        assert_eq!(stats.dropped, 1);

        actor.stop(None);
    }

    #[tokio::test]
    async fn test_replay_uses_absolute_url() {
        let actor = spawn().await;
        let r = record("/api/cart", 1_000);
        let id = r.id.clone();
        actor.cast(TraceAggregatorMsg::Ingest(r)).unwrap();

        let out = ractor::call!(actor, |reply| TraceAggregatorMsg::Replay {
            trace_id: id,
            reply
        })
        .unwrap()
        .unwrap();
        assert_eq!(out.curl, "curl -X GET \"https://shop.example.com/api/cart\"");
        assert_eq!(out.response, replay::NO_RESPONSE);

        actor.cast(TraceAggregatorMsg::Clear).unwrap();
        let stats = ractor::call!(actor, |reply| TraceAggregatorMsg::Stats { reply }).unwrap();
        assert_eq!(stats.stored, 0);

        actor.stop(None);
    }
}
