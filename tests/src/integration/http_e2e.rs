//! # HTTP End to End
//!
//! Full process wiring (runtime, in-memory bus, uppercase responder) behind a
//! real TCP listener, exercised with a real HTTP client.

#[cfg(test)]
mod tests {
    use bridge_runtime::{BridgeRuntime, ResponderMode, RuntimeConfig};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    struct Running {
        runtime: Arc<BridgeRuntime>,
        addr: SocketAddr,
        task: JoinHandle<Result<(), String>>,
    }

    async fn start(responder: ResponderMode, timeout: Duration) -> Running {
        let mut config = RuntimeConfig::from_lookup(|_| None).unwrap();
        config.responder = responder;
        config.bridge.timeouts.request = timeout;

        let runtime = Arc::new(BridgeRuntime::new(config).await.unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let serving = Arc::clone(&runtime);
        let task = tokio::spawn(async move {
            serving.run(listener).await.map_err(|e| e.to_string())
        });

        let bridge = runtime.service().bridge();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !bridge.is_ready() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("bridge should become ready");

        Running {
            runtime,
            addr,
            task,
        }
    }

    async fn stop(running: Running) {
        running.runtime.shutdown();
        tokio::time::timeout(Duration::from_secs(2), running.task)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_post_bridge_returns_uppercase() {
        let running = start(ResponderMode::Uppercase, Duration::from_secs(2)).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{}/bridge", running.addr))
            .json(&json!("hello"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["body"], json!("HELLO"));
        assert_eq!(body["correlation_id"].as_str().map(str::len), Some(36));

        stop(running).await;
    }

    #[tokio::test]
    async fn test_concurrent_http_callers() {
        let running = start(ResponderMode::Uppercase, Duration::from_secs(2)).await;
        let client = reqwest::Client::new();
        let url = format!("http://{}/bridge", running.addr);

        let calls = (0..20).map(|i| {
            let client = client.clone();
            let url = url.clone();
            async move {
                let body: Value = client
                    .post(&url)
                    .json(&json!({ "message": format!("msg-{i}") }))
                    .send()
                    .await
                    .unwrap()
                    .json()
                    .await
                    .unwrap();
                (i, body)
            }
        });

        for (i, body) in futures::future::join_all(calls).await {
            assert_eq!(body["body"], json!({ "message": format!("MSG-{i}") }));
        }

        stop(running).await;
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let running = start(ResponderMode::Uppercase, Duration::from_secs(2)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/bridge", running.addr))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], "DECODE_ERROR");

        stop(running).await;
    }

    #[tokio::test]
    async fn test_no_responder_is_504() {
        let running = start(ResponderMode::None, Duration::from_millis(200)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/bridge", running.addr))
            .json(&json!("hello"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 504);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], "TIMEOUT");

        let pending: Value = reqwest::get(format!("http://{}/pending", running.addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(pending["count"], 0);
        assert_eq!(pending["stats"]["timed_out"], 1);

        stop(running).await;
    }

    #[tokio::test]
    async fn test_health_ok_while_serving() {
        let running = start(ResponderMode::Uppercase, Duration::from_secs(2)).await;

        let response = reqwest::get(format!("http://{}/health", running.addr))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "status": "ok", "subscription_ready": true }));

        stop(running).await;
    }
}
