mod common;

use htx_client::{Client, ClientConfig};
use htx_proto::Method;
use htx_server::Router;
use htx_transport::Stream;
use htx_ws::WsMessage;

#[tokio::test]
async fn websocket_upgrade_echoes_a_text_message() {
    let mut router: Router<Stream> = Router::new();
    router.route(Method::Get, "/ws", |req, res| async move {
        let mut session = match res.upgrade_websocket(req, &[]).await {
            Ok(session) => session,
            Err(_) => return,
        };
        if let Ok(WsMessage::Text(text)) = session.read_message().await {
            let _ = session.send_text(&text).await;
        }
        let _ = session.close_graceful().await;
    });

    let addr = common::spawn_server(router).await;
    let client = Client::new(ClientConfig::default());

    let mut session = client.upgrade_websocket(&format!("ws://{addr}/ws"), None).await.unwrap();
    session.send_text("hello over the wire").await.unwrap();

    match session.read_message().await.unwrap() {
        WsMessage::Text(text) => assert_eq!(text, "hello over the wire"),
        other => panic!("expected a text message, got {other:?}"),
    }
}
