//! End-to-end tests of the request/response bridge over real sockets.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use response_bridge::config::ServerConfig;
use response_bridge::http::{Cookie, Dispatcher, RequestView, ResponseError, ResponseState};
use response_bridge::lifecycle::{LoggingHooks, ServerHooks};
use response_bridge::tasks::{TaskId, TaskPool, TaskSender};

mod common;

fn values(res: &reqwest::Response, name: &str) -> Vec<String> {
    res.headers()
        .get_all(name)
        .iter()
        .map(|v| v.to_str().unwrap().trim().to_string())
        .collect()
}

#[tokio::test]
async fn test_accumulated_response_reaches_client() {
    let server = common::start_server(
        Arc::new(|_req: &RequestView, res: &mut ResponseState| {
            res.set_status(StatusCode::CREATED).unwrap();
            res.set_header("X-A", "1").unwrap();
            res.set_header("X-A", "2").unwrap();
            res.set_cookie(&Cookie::new("a", "1")).unwrap();
            res.set_cookie(&Cookie::new("b", "2").path("/")).unwrap();
            res.write("hello ").unwrap();
            res.write("world").unwrap();
        }),
        Arc::new(LoggingHooks),
    )
    .await;

    let res = common::client().get(server.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 201);
    assert_eq!(values(&res, "x-a"), vec!["1", "2"]);
    assert_eq!(values(&res, "set-cookie"), vec!["a=1;", "b=2; Path=/;"]);
    assert_eq!(res.text().await.unwrap(), "hello world");

    server.stop().await;
}

#[tokio::test]
async fn test_write_json_replaces_body() {
    let server = common::start_server(
        Arc::new(|_req: &RequestView, res: &mut ResponseState| {
            res.write("<html>half rendered").unwrap();
            res.write_json(StatusCode::NOT_FOUND, Value::Null, "not found")
                .unwrap();
        }),
        Arc::new(LoggingHooks),
    )
    .await;

    let res = common::client().get(server.url("/missing")).send().await.unwrap();

    assert_eq!(res.status(), 404);
    assert_eq!(values(&res, "content-type"), vec!["application/json;charset=utf-8"]);
    assert_eq!(
        res.text().await.unwrap(),
        r#"{"code":404,"result":null,"msg":"not found"}"#
    );

    server.stop().await;
}

#[tokio::test]
async fn test_early_end_rejects_later_writes() {
    let rejected = Arc::new(AtomicBool::new(false));
    let seen = rejected.clone();

    let server = common::start_server(
        Arc::new(move |req: &RequestView, res: &mut ResponseState| {
            if req.cookie("sid").is_none() {
                res.redirect("/login").unwrap();
                assert!(res.end());
            }
            // Downstream code keeps writing after the guard above.
            if let Err(ResponseError::AlreadyFinalized { .. }) = res.write("private data") {
                seen.store(true, Ordering::SeqCst);
            }
        }),
        Arc::new(LoggingHooks),
    )
    .await;

    let client = common::client();

    let res = client.get(server.url("/admin")).send().await.unwrap();
    assert_eq!(res.status(), 301);
    assert_eq!(values(&res, "location"), vec!["/login"]);
    assert_eq!(res.text().await.unwrap(), "");
    assert!(rejected.load(Ordering::SeqCst));

    let res = client
        .get(server.url("/admin"))
        .header("Cookie", "sid=abc123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "private data");

    server.stop().await;
}

struct SlowApp;

impl Dispatcher for SlowApp {
    fn dispatch<'a>(&'a self, req: &'a RequestView, res: &'a mut ResponseState) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            res.write("before ").unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            res.write(req.query("n").unwrap_or("?")).unwrap();
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_do_not_share_state() {
    let server = common::start_server(Arc::new(SlowApp), Arc::new(LoggingHooks)).await;
    let client = common::client();

    let requests = (0..20).map(|i| {
        let client = client.clone();
        let url = server.url(&format!("/?n={}", i));
        tokio::spawn(async move {
            let body = client.get(url).send().await.unwrap().text().await.unwrap();
            (i, body)
        })
    });

    let mut bodies = HashSet::new();
    for request in requests.collect::<Vec<_>>() {
        let (i, body) = request.await.unwrap();
        assert_eq!(body, format!("before {}", i));
        bodies.insert(body);
    }
    assert_eq!(bodies.len(), 20);

    server.stop().await;
}

#[tokio::test]
async fn test_panicking_dispatcher_does_not_stop_server() {
    let server = common::start_server(
        Arc::new(|req: &RequestView, res: &mut ResponseState| {
            if req.path() == "/boom" {
                panic!("handler bug");
            }
            res.write("still alive").unwrap();
        }),
        Arc::new(LoggingHooks),
    )
    .await;
    let client = common::client();

    let res = client.get(server.url("/boom")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(
        res.text().await.unwrap(),
        r#"{"code":500,"result":null,"msg":"internal server error"}"#
    );

    let res = client.get(server.url("/ok")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "still alive");

    server.stop().await;
}

#[derive(Default)]
struct TaskHooks {
    started: Mutex<Option<std::net::SocketAddr>>,
    finished: Mutex<Option<mpsc::UnboundedSender<(TaskId, Value)>>>,
}

impl ServerHooks for TaskHooks {
    fn on_start(&self, addr: std::net::SocketAddr) {
        *self.started.lock().unwrap() = Some(addr);
    }

    fn on_task(&self, _task_id: TaskId, _worker_id: usize, payload: Value) -> Value {
        json!({ "handled": payload["path"] })
    }

    fn on_task_finish(&self, task_id: TaskId, result: &Value) {
        if let Some(tx) = self.finished.lock().unwrap().as_ref() {
            let _ = tx.send((task_id, result.clone()));
        }
    }
}

struct TaskApp {
    tasks: TaskSender,
}

impl Dispatcher for TaskApp {
    fn dispatch<'a>(&'a self, req: &'a RequestView, res: &'a mut ResponseState) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let id = self.tasks.dispatch(json!({ "path": req.path() })).unwrap();
            res.write_json(StatusCode::ACCEPTED, json!({ "task_id": id.0 }), Value::Null)
                .unwrap();
        })
    }
}

#[tokio::test]
async fn test_background_task_completes_through_hooks() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hooks = Arc::new(TaskHooks {
        finished: Mutex::new(Some(tx)),
        ..TaskHooks::default()
    });

    let config = ServerConfig {
        task_worker_num: 1,
        ..ServerConfig::default()
    };
    let (pool, tasks) = TaskPool::start(&config, hooks.clone()).unwrap();
    let server = common::start_server(Arc::new(TaskApp { tasks }), hooks.clone()).await;

    let res = common::client().get(server.url("/send-mail")).send().await.unwrap();
    assert_eq!(res.status(), 202);
    assert_eq!(
        res.text().await.unwrap(),
        r#"{"code":202,"result":{"task_id":0},"msg":null}"#
    );

    let (task_id, result) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task_id, TaskId(0));
    assert_eq!(result, json!({ "handled": "/send-mail" }));
    assert_eq!(*hooks.started.lock().unwrap(), Some(server.addr));

    server.stop().await;
    pool.join();
}
