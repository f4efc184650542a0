mod common;

use std::sync::Arc;

use htx_client::{Client, ClientConfig};
use htx_proto::Method;
use htx_server::Router;
use htx_transport::{CertificateRegistry, SniResolver, Stream};

#[tokio::test]
async fn client_accepts_a_self_signed_certificate_when_verification_is_disabled() {
    let mut router: Router<Stream> = Router::new();
    router.route(Method::Get, "/secure", |_req, res| async move {
        res.send("over tls", "text/plain").unwrap();
    });

    let registry = Arc::new(CertificateRegistry::new());
    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SniResolver(registry)));

    let addr = common::spawn_tls_server(router, Arc::new(tls_config)).await;

    let mut config = ClientConfig::default();
    config.verify_ssl = false;
    let client = Client::new(config);

    let resp = client.get(&format!("https://{addr}/secure")).await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"over tls");
}
