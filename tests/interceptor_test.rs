//! Tests for global gates and per-pipeline transforms across single
//! requests and chains.

use pipenet::transport::fake::{ExpectedRequest, FakeTransport, ProgrammedResponse};
use pipenet::{
    Client, EventData, Interceptors, NextStep, OwnInterceptors, Rejected, RequestConfig,
    ResponseData, Transform, Verdict,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

async fn recv<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("channel closed")
}

fn body_json(data: &EventData) -> Value {
    match data {
        EventData::Body(ResponseData::Json(value)) => value.clone(),
        other => panic!("expected JSON body, got {other:?}"),
    }
}

fn fake_with(url: &str, data: Value) -> FakeTransport {
    let fake = FakeTransport::new();
    fake.expect(
        ExpectedRequest::new(url),
        ProgrammedResponse::new().data(data),
    );
    fake
}

#[tokio::test]
async fn test_global_response_veto_destroys_silently() {
    let fake = fake_with("/private", json!(1));
    let client = Client::builder()
        .transport(Arc::new(fake))
        .interceptors(Interceptors::new().response(|_| Verdict::Veto))
        .build();
    let successes = Arc::new(AtomicUsize::new(0));
    let counter = successes.clone();
    let (tx, mut rx) = unbounded_channel();
    let actions = client
        .request(RequestConfig::new("/private"))
        .expect("request issued")
        .success(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .destroy(move |_| {
            let _ = tx.send(());
        });
    recv(&mut rx).await;
    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert!(!actions.is_in_progress());
}

#[tokio::test]
async fn test_deferred_global_approval_lets_success_through() {
    let fake = fake_with("/checked", json!("payload"));
    let client = Client::builder()
        .transport(Arc::new(fake))
        .interceptors(Interceptors::new().response(|_| {
            Verdict::deferred(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                true
            })
        }))
        .build();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/checked"))
        .expect("request issued")
        .success(move |event| {
            let _ = tx.send(event.data.clone());
        });
    assert_eq!(body_json(&recv(&mut rx).await), json!("payload"));
}

#[tokio::test]
async fn test_deferred_global_refusal_destroys() {
    let fake = fake_with("/checked", json!(1));
    let client = Client::builder()
        .transport(Arc::new(fake))
        .interceptors(Interceptors::new().response(|_| Verdict::deferred(async { false })))
        .build();
    let successes = Arc::new(AtomicUsize::new(0));
    let counter = successes.clone();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/checked"))
        .expect("request issued")
        .success(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .destroy(move |_| {
            let _ = tx.send(());
        });
    recv(&mut rx).await;
    assert_eq!(successes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_silent_pipeline_bypasses_global_gate() {
    let fake = fake_with("/private", json!("let through"));
    let client = Client::builder()
        .transport(Arc::new(fake))
        .interceptors(Interceptors::new().response(|_| Verdict::Veto))
        .build();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/private"))
        .expect("request issued")
        .silent()
        .success(move |event| {
            let _ = tx.send(event.data.clone());
        });
    assert_eq!(body_json(&recv(&mut rx).await), json!("let through"));
}

#[tokio::test]
async fn test_global_gate_sees_the_handle() {
    let fake = fake_with("/inspect", json!(1));
    let client = Client::builder()
        .transport(Arc::new(fake))
        .interceptors(Interceptors::new().response(|handle| {
            let allowed = handle.map(|h| h.status() == 200).unwrap_or(false);
            Verdict::from(allowed)
        }))
        .build();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/inspect"))
        .expect("request issued")
        .success(move |_| {
            let _ = tx.send(());
        });
    recv(&mut rx).await;
}

#[tokio::test]
async fn test_own_interceptor_transforms_response() {
    let fake = fake_with("/numbers", json!(3));
    let client = Client::builder().transport(Arc::new(fake)).build();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/numbers"))
        .expect("request issued")
        .interceptors(OwnInterceptors::new().response(|data| {
            let doubled = match &data {
                EventData::Body(ResponseData::Json(Value::Number(n))) => {
                    n.as_i64().unwrap_or(0) * 2
                }
                _ => 0,
            };
            Transform::value(EventData::Body(ResponseData::Json(json!(doubled))))
        }))
        .success(move |event| {
            let _ = tx.send(event.data.clone());
        });
    assert_eq!(body_json(&recv(&mut rx).await), json!(6));
}

#[tokio::test]
async fn test_deferred_own_interceptor_transforms_response() {
    let fake = fake_with("/numbers", json!(5));
    let client = Client::builder().transport(Arc::new(fake)).build();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/numbers"))
        .expect("request issued")
        .interceptors(OwnInterceptors::new().response(|data| {
            Transform::deferred(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let value = match &data {
                    EventData::Body(ResponseData::Json(Value::Number(n))) => {
                        n.as_i64().unwrap_or(0) + 1
                    }
                    _ => 0,
                };
                Ok(EventData::Body(ResponseData::Json(json!(value))))
            })
        }))
        .success(move |event| {
            let _ = tx.send(event.data.clone());
        });
    assert_eq!(body_json(&recv(&mut rx).await), json!(6));
}

#[tokio::test]
async fn test_rejected_own_interceptor_destroys_without_outcome() {
    let fake = fake_with("/numbers", json!(1));
    let client = Client::builder().transport(Arc::new(fake)).build();
    let successes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let success_counter = successes.clone();
    let error_counter = errors.clone();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/numbers"))
        .expect("request issued")
        .interceptors(
            OwnInterceptors::new().response(|_| Transform::deferred(async { Err(Rejected) })),
        )
        .success(move |_| {
            success_counter.fetch_add(1, Ordering::SeqCst);
        })
        .error(move |_| {
            error_counter.fetch_add(1, Ordering::SeqCst);
        })
        .destroy(move |_| {
            let _ = tx.send(());
        });
    recv(&mut rx).await;
    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chained_handles_apply_their_own_interceptors() {
    let fake = FakeTransport::new();
    for url in ["/one", "/two", "/three"] {
        fake.expect(
            ExpectedRequest::new(url),
            ProgrammedResponse::new().data(json!(1)),
        );
    }
    let client = Client::builder().transport(Arc::new(fake)).build();
    let second_client = client.clone();
    let third_client = client.clone();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/one"))
        .expect("request issued")
        .then(move |data| {
            let value = body_json(&data).as_i64().unwrap_or(0);
            let actions = second_client
                .request(RequestConfig::new("/two"))
                .expect("second issued")
                .interceptors(OwnInterceptors::new().response(move |_| {
                    Transform::value(EventData::Body(ResponseData::Json(json!(value * 2))))
                }));
            NextStep::Chained(actions)
        })
        .then(move |data| {
            let value = body_json(&data).as_i64().unwrap_or(0);
            assert_eq!(value, 2);
            let actions = third_client
                .request(RequestConfig::new("/three"))
                .expect("third issued")
                .interceptors(OwnInterceptors::new().response(move |_| {
                    Transform::value(EventData::Body(ResponseData::Json(json!(value * 3))))
                }));
            NextStep::Chained(actions)
        })
        .success(move |event| {
            let _ = tx.send(event.data.clone());
        });
    assert_eq!(body_json(&recv(&mut rx).await), json!(6));
}

#[tokio::test]
async fn test_request_interceptor_gates_the_request_event() {
    let fake = fake_with("/audited", json!(1));
    let requests_seen = Arc::new(AtomicUsize::new(0));
    let seen = requests_seen.clone();
    let client = Client::builder()
        .transport(Arc::new(fake))
        .interceptors(Interceptors::new().request(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Verdict::Allow
        }))
        .build();
    let (tx, mut rx) = unbounded_channel();
    client
        .request(RequestConfig::new("/audited"))
        .expect("request issued")
        .success(move |_| {
            let _ = tx.send(());
        });
    recv(&mut rx).await;
    assert_eq!(requests_seen.load(Ordering::SeqCst), 1);
}
