//! The request job: issues one network operation, binds its event surface
//! to a pipeline and drives the continuation queue on success.

use crate::client::ClientContext;
use crate::config::RequestConfig;
use crate::error::PipelineError;
use crate::events::{EventData, EventKind, InterceptorKind};
use crate::pipeline::state::Pipeline;
use crate::pipeline::{NextStep, RequestActions};
use crate::transport::{ReadyState, TransportEvent, TransportRef};
use crate::wire::response::ResponseData;
use crate::wire::{headers, params};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;

/// Issues exactly one network operation. With `existing` the new handle is
/// appended to that pipeline (chaining); otherwise a fresh pipeline is
/// created. Must run inside a tokio runtime.
pub(crate) fn issue(
    ctx: Arc<ClientContext>,
    config: RequestConfig,
    existing: Option<Arc<Pipeline>>,
) -> Result<RequestActions, PipelineError> {
    if config.url.is_empty() {
        return Err(PipelineError::UrlRequired);
    }
    let handle = ctx.transport.create_handle();
    let pipeline = existing.unwrap_or_else(|| Pipeline::new(ctx.clone()));
    pipeline.collection().push_handle(handle.clone());

    let method = config
        .method
        .clone()
        .unwrap_or_else(|| ctx.defaults.method.clone());
    let url = params::append_query(&config.url, &config.params);
    let attributes = config.attributes.merged_over(&ctx.defaults.attributes);
    handle.apply_attributes(&attributes);
    let header_list = headers::merge(&ctx.defaults.headers, &config.headers);
    let body = config.data.as_ref().map(|payload| payload.encode());

    let Some(events) = handle.subscribe() else {
        return Err(PipelineError::Transport(
            "handle event stream already taken".to_owned(),
        ));
    };

    tracing::debug!(method = %method, url = %url, "issuing request");

    let gate = Arc::new(Notify::new());
    let gate_id = pipeline.collection().push_gate(gate.clone());
    let job_pipeline = pipeline.clone();
    tokio::spawn(run(
        job_pipeline,
        handle,
        events,
        method,
        url,
        header_list,
        body,
        gate,
        gate_id,
    ));
    Ok(RequestActions::new(pipeline))
}

#[allow(clippy::too_many_arguments)]
async fn run(
    pipeline: Arc<Pipeline>,
    handle: TransportRef,
    mut events: UnboundedReceiver<TransportEvent>,
    method: http::Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    gate: Arc<Notify>,
    gate_id: u64,
) {
    // Zero-delay deferred open: lets the caller finish wiring callbacks
    // onto the freshly returned handle, and gives an abort issued in that
    // window the chance to suppress the open entirely.
    tokio::select! {
        _ = gate.notified() => {}
        _ = tokio::time::sleep(Duration::ZERO) => {}
    }
    pipeline.collection().clear_gate(gate_id);
    if pipeline.collection().is_aborted() {
        tracing::debug!(url = %url, "collection aborted before open");
        pipeline
            .apply_callback(EventKind::Abort, EventData::None, None)
            .await;
        return;
    }
    handle.open(&method, &url);

    let mut done = pipeline.done_signal();
    let mut sent = false;
    loop {
        let event = tokio::select! {
            _ = done.wait_for(|destroyed| *destroyed) => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match event {
            TransportEvent::ReadyStateChange => {
                let state = handle.ready_state();
                pipeline
                    .apply_callback(
                        EventKind::ReadyStateChange,
                        EventData::State(state),
                        Some(handle.clone()),
                    )
                    .await;
                if state == ReadyState::Opened && !sent {
                    sent = true;
                    for (name, value) in &headers {
                        handle.set_request_header(name, value);
                    }
                    handle.send(body.clone());
                    pipeline
                        .apply_callback(
                            EventKind::Request,
                            EventData::Sent(body.clone()),
                            Some(handle.clone()),
                        )
                        .await;
                }
            }
            TransportEvent::LoadStart { loaded, total } => {
                pipeline
                    .apply_callback(
                        EventKind::LoadStart,
                        EventData::Progress { loaded, total },
                        Some(handle.clone()),
                    )
                    .await;
            }
            TransportEvent::Progress { loaded, total } => {
                pipeline
                    .apply_callback(
                        EventKind::Progress,
                        EventData::Progress { loaded, total },
                        Some(handle.clone()),
                    )
                    .await;
            }
            TransportEvent::Load { loaded, total } => {
                pipeline
                    .apply_callback(
                        EventKind::Load,
                        EventData::Progress { loaded, total },
                        Some(handle.clone()),
                    )
                    .await;
            }
            TransportEvent::Error => {
                pipeline
                    .apply_callback(EventKind::Error, EventData::None, Some(handle.clone()))
                    .await;
            }
            TransportEvent::Timeout => {
                pipeline
                    .apply_callback(EventKind::Timeout, EventData::None, Some(handle.clone()))
                    .await;
            }
            TransportEvent::Abort => {
                pipeline
                    .apply_callback(EventKind::Abort, EventData::None, Some(handle.clone()))
                    .await;
            }
            TransportEvent::LoadEnd { loaded, total } => {
                pipeline
                    .apply_callback(
                        EventKind::LoadEnd,
                        EventData::Progress { loaded, total },
                        Some(handle.clone()),
                    )
                    .await;
                finish(&pipeline, &handle).await;
            }
            TransportEvent::Relayed { kind, data } => {
                if kind == EventKind::Success {
                    // Route relayed successes through the queue walk so
                    // chains compose across the relay boundary.
                    apply_queue(pipeline.clone(), handle.clone(), data).await;
                } else {
                    pipeline
                        .apply_callback(kind, data, Some(handle.clone()))
                        .await;
                }
            }
        }
        if !pipeline.is_in_progress() {
            break;
        }
    }
}

/// Classifies a completed request by status range. Statuses outside both
/// ranges trigger neither outcome.
async fn finish(pipeline: &Arc<Pipeline>, handle: &TransportRef) {
    let status = handle.status();
    if (200..400).contains(&status) {
        let response = ResponseData::from_handle(handle);
        apply_queue(pipeline.clone(), handle.clone(), EventData::Body(response)).await;
    } else if (400..600).contains(&status) {
        let response = ResponseData::from_handle(handle);
        pipeline
            .apply_callback(
                EventKind::Error,
                EventData::Body(response),
                Some(handle.clone()),
            )
            .await;
    } else {
        tracing::debug!(status, "status outside both outcome ranges");
    }
}

/// Walks the continuation queue with the latest stage result. Boxed
/// because chained handles feed their outcomes back in recursively.
pub(crate) fn apply_queue(
    pipeline: Arc<Pipeline>,
    handle: TransportRef,
    result: EventData,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(continuation) = pipeline.next_continuation() else {
            pipeline
                .apply_callback(EventKind::Success, result, Some(handle))
                .await;
            return;
        };
        if pipeline.collection().is_aborted() {
            return;
        }
        if !pipeline
            .check_global(Some(InterceptorKind::Response), Some(&handle))
            .await
        {
            tracing::debug!("global response interceptor vetoed chain continuation");
            pipeline.destroy();
            return;
        }
        match continuation(result.clone()) {
            NextStep::Done => {
                pipeline
                    .apply_callback(EventKind::Success, result, Some(handle))
                    .await;
            }
            NextStep::Request(config) => {
                let ctx = pipeline.ctx().clone();
                if let Err(error) = issue(ctx, config, Some(pipeline.clone())) {
                    pipeline
                        .apply_callback(
                            EventKind::Error,
                            EventData::Fault(error.to_string()),
                            Some(handle),
                        )
                        .await;
                }
            }
            NextStep::Chained(actions) => {
                let success_pipeline = pipeline.clone();
                let success_handle = handle.clone();
                let error_pipeline = pipeline;
                let error_handle = handle;
                actions
                    .success(move |event| {
                        tokio::spawn(apply_queue(
                            success_pipeline.clone(),
                            success_handle.clone(),
                            event.data.clone(),
                        ));
                    })
                    .error(move |event| {
                        tokio::spawn(apply_queue(
                            error_pipeline.clone(),
                            error_handle.clone(),
                            event.data.clone(),
                        ));
                    });
            }
        }
    })
}
