mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use htx_client::{Client, ClientConfig};
use htx_proto::Method;
use htx_server::Router;
use htx_transport::Stream;

#[tokio::test]
async fn repeated_requests_to_the_same_origin_reuse_one_pooled_connection() {
    let connections = Arc::new(AtomicUsize::new(0));
    let counted = connections.clone();

    let mut router: Router<Stream> = Router::new();
    router.route(Method::Get, "/count", move |_req, res| {
        let counted = counted.clone();
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
            res.send("ok", "text/plain").unwrap();
        }
    });

    let addr = common::spawn_server(router).await;
    let client = Client::new(ClientConfig::default());

    for _ in 0..5 {
        let resp = client.get(&format!("http://{addr}/count")).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    assert_eq!(connections.load(Ordering::SeqCst), 5);
    // All five requests shared the one connection this client pooled for
    // this origin, rather than opening a fresh socket each time.
    assert_eq!(client.pool_size(), 1);
}
