mod common;

use htx_client::{Client, ClientConfig};
use htx_proto::Method;
use htx_server::Router;
use htx_transport::Stream;

#[tokio::test]
async fn chunked_response_is_reassembled_into_the_full_body() {
    let mut router: Router<Stream> = Router::new();
    router.route(Method::Post, "/echo", |mut req, res| async move {
        req.read_body().await.unwrap();
        let body = req.body().to_vec();
        let chunked = res.start_chunked("text/plain", 200).unwrap();
        for piece in body.chunks(4) {
            chunked.write_chunk(piece).unwrap();
        }
        chunked.end_chunked().unwrap();
    });

    let addr = common::spawn_server(router).await;
    let client = Client::new(ClientConfig::default());

    let payload = b"the quick brown fox jumps over the lazy dog".to_vec();
    let resp = client.post(&format!("http://{addr}/echo"), payload.clone(), "text/plain").await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, payload);
}
