mod common;

use htx_client::{Client, ClientConfig};
use htx_proto::Method;
use htx_server::Router;
use htx_transport::Stream;

#[tokio::test]
async fn simple_get_round_trips_status_and_body() {
    let mut router: Router<Stream> = Router::new();
    router.route(Method::Get, "/hello", |_req, res| async move {
        res.send("world", "text/plain").unwrap();
    });

    let addr = common::spawn_server(router).await;
    let client = Client::new(ClientConfig::default());

    let resp = client.get(&format!("http://{addr}/hello")).await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"world");
    assert_eq!(resp.headers.get("Content-Type"), Some("text/plain"));
}

#[tokio::test]
async fn missing_route_returns_404() {
    let router: Router<Stream> = Router::new();
    let addr = common::spawn_server(router).await;
    let client = Client::new(ClientConfig::default());

    let resp = client.get(&format!("http://{addr}/nope")).await.unwrap();

    assert_eq!(resp.status, 404);
}
