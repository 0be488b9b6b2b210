//! Client-side half of the rapace RPC protocol: the handshake, the call
//! handle and the invocation builder (§4.5).
//!
//! [`Client::connect`] drives the handshake and spawns the reader task;
//! [`Client::call`] returns an [`Invocation`] builder whose `build()`
//! produces a lazy [`CallHandle`] — nothing is sent until the handle's
//! `await_result` or `chunks` is called.

mod client;
mod config;
mod handle;

pub use client::Client;
pub use config::ClientConfig;
pub use handle::{CallHandle, CallOutcome, Invocation};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use rapace_core::CallError;
    use rapace_protocol::Value;
    use rapace_server::{Dispatcher, MethodRegistry, ServerConfig};
    use rapace_transport::MemTransport;

    use super::*;

    fn build_registry() -> MethodRegistry {
        let mut reg = MethodRegistry::new();
        reg.register_unary("div(a, b)", "", false, None, |args, _kwargs, _stream| async move {
            let a = args[0].as_f64().unwrap();
            let b = args[1].as_f64().unwrap();
            if b == 0.0 {
                Err("division by zero".to_string())
            } else {
                Ok(Value::from(a / b))
            }
        });
        reg.register_streaming(
            "repeat(s, n)",
            "",
            false,
            None,
            |args, _kwargs, _stream| {
                let s = args[0].as_str().unwrap().to_string();
                let n = args[1].as_u64().unwrap();
                futures::stream::iter((0..n).map(move |_| Ok(Value::from(s.clone()))))
            },
        );
        reg.register_unary("sum(xs)", "", true, None, |_args, _kwargs, stream| async move {
            let mut stream = stream.expect("request stream");
            let mut total = 0i64;
            while let Some(item) = stream.next().await {
                total += item.map_err(|e| e.to_string())?.as_i64().unwrap_or(0);
            }
            Ok(Value::from(total))
        });
        reg.register_streaming(
            "uppercase(words)",
            "",
            true,
            None,
            |_args, _kwargs, stream| {
                futures::stream::unfold(stream.expect("request stream"), |mut s| async move {
                    let item = s.next().await?;
                    let value = item
                        .map(|v| Value::from(v.as_str().unwrap_or_default().to_uppercase()))
                        .map_err(|e| e.to_string());
                    Some((value, s))
                })
            },
        );
        reg.register_unary(
            "delay_echo(delay_ms, message)",
            "",
            false,
            None,
            |args, _kwargs, _stream| async move {
                let delay_ms = args[0].as_u64().unwrap_or(0);
                let message = args[1].as_str().unwrap_or_default().to_string();
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(Value::from(message))
            },
        );
        reg
    }

    async fn connect_pair() -> (Client<MemTransport>, tokio::task::JoinHandle<()>) {
        let (server_t, client_t) = MemTransport::pair();
        let dispatcher = Dispatcher::new(build_registry(), ServerConfig::default(), server_t);
        let server_task = tokio::spawn(async move {
            dispatcher.serve().await.unwrap();
        });
        let client = Client::connect(client_t, ClientConfig::default()).await.unwrap();
        (client, server_task)
    }

    #[tokio::test]
    async fn catalog_round_trips_from_handshake() {
        let (client, _server) = connect_pair().await;
        let names: Vec<_> = client.catalog().iter().map(|m| m.signature.clone()).collect();
        assert!(names.contains(&"div(a, b)".to_string()));
        assert!(names.contains(&"repeat(s, n)".to_string()));
    }

    #[tokio::test]
    async fn unary_success() {
        let (client, _server) = connect_pair().await;
        let handle = client
            .call("div(a, b)")
            .args(vec![Value::from(1), Value::from(3)])
            .build()
            .unwrap();
        let result = handle.await_result().await.unwrap();
        assert!((result.as_f64().unwrap() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unary_error_surfaces_message() {
        let (client, _server) = connect_pair().await;
        let handle = client
            .call("div(a, b)")
            .args(vec![Value::from(1), Value::from(0)])
            .build()
            .unwrap();
        let err = handle.await_result().await.unwrap_err();
        match err {
            CallError::ServerReported(msg) => assert!(msg.contains("division by zero")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn response_stream_yields_chunks_in_order() {
        let (client, _server) = connect_pair().await;
        let handle = client
            .call("repeat(s, n)")
            .args(vec![Value::from("bla"), Value::from(4)])
            .build()
            .unwrap();
        let chunks: Vec<_> = handle
            .chunks()
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(
            chunks,
            vec![Value::from("bla"), Value::from("bla"), Value::from("bla"), Value::from("bla")]
        );
        assert_eq!(handle.await_result().await.unwrap(), Value::Nil);
    }

    #[tokio::test]
    async fn request_stream_is_summed() {
        let (client, _server) = connect_pair().await;
        let handle = client
            .call("sum(xs)")
            .request_stream_iter(vec![Value::from(0), Value::from(1), Value::from(2)].into_iter())
            .build()
            .unwrap();
        assert_eq!(handle.await_result().await.unwrap(), Value::from(3));
    }

    #[tokio::test]
    async fn bidi_uppercase_preserves_order() {
        let (client, _server) = connect_pair().await;
        let handle = client
            .call("uppercase(words)")
            .request_stream_iter(vec![Value::from("hello"), Value::from("rpc")].into_iter())
            .build()
            .unwrap();
        let chunks: Vec<_> = handle
            .chunks()
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![Value::from("HELLO"), Value::from("RPC")]);
    }

    #[tokio::test]
    async fn cancel_mid_call_resolves_as_cancelled() {
        let (client, _server) = connect_pair().await;
        let handle = client
            .call("delay_echo(delay_ms, message)")
            .args(vec![Value::from(1000), Value::from("echo")])
            .build()
            .unwrap();

        let awaiting = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.await_result().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), awaiting)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.unwrap_err(), CallError::Cancelled);
    }

    #[tokio::test]
    async fn unknown_method_fails_locally_without_touching_the_wire() {
        let (client, _server) = connect_pair().await;
        let err = client.call("nope").build().unwrap_err();
        assert!(matches!(err, rapace_core::ClientUsageError::UnknownMethod(_)));
    }

    #[tokio::test]
    async fn missing_request_stream_is_rejected_locally() {
        let (client, _server) = connect_pair().await;
        let err = client.call("sum(xs)").build().unwrap_err();
        assert!(matches!(
            err,
            rapace_core::ClientUsageError::MissingRequestStream(_)
        ));
    }
}
