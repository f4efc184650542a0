mod common;

use htx_client::{Client, ClientConfig};
use htx_proto::Method;
use htx_server::Router;
use htx_transport::Stream;

#[tokio::test]
async fn client_follows_a_redirect_chain_to_the_final_resource() {
    let mut router: Router<Stream> = Router::new();
    router.route(Method::Get, "/start", |_req, res| async move {
        res.redirect("/middle", 302).unwrap();
    });
    router.route(Method::Get, "/middle", |_req, res| async move {
        res.redirect("/end", 307).unwrap();
    });
    router.route(Method::Get, "/end", |_req, res| async move {
        res.send("arrived", "text/plain").unwrap();
    });

    let addr = common::spawn_server(router).await;
    let client = Client::new(ClientConfig::default());

    let resp = client.get(&format!("http://{addr}/start")).await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"arrived");
    assert!(resp.url.path.ends_with("/end"));
}

#[tokio::test]
async fn a_303_redirect_from_a_post_becomes_a_get_with_no_body() {
    let mut router: Router<Stream> = Router::new();
    router.route(Method::Post, "/submit", |_req, res| async move {
        res.redirect("/result", 303).unwrap();
    });
    router.route(Method::Get, "/result", |_req, res| async move {
        res.send("done", "text/plain").unwrap();
    });

    let addr = common::spawn_server(router).await;
    let client = Client::new(ClientConfig::default());

    let resp = client.post(&format!("http://{addr}/submit"), b"payload".to_vec(), "text/plain").await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"done");
}

#[tokio::test]
async fn exceeding_max_redirects_returns_the_redirect_response_as_is() {
    let mut router: Router<Stream> = Router::new();
    router.route(Method::Get, "/loop", |_req, res| async move {
        res.redirect("/loop", 302).unwrap();
    });

    let addr = common::spawn_server(router).await;
    let mut config = ClientConfig::default();
    config.max_redirects = 2;
    let client = Client::new(config);

    let resp = client.get(&format!("http://{addr}/loop")).await.unwrap();
    assert_eq!(resp.status, 302);
    assert_eq!(resp.headers.get("Location"), Some("/loop"));
}
