//! The full stack against a real local server: resource handles on top of the
//! service on top of the HTTP transport.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use pricegate::config::Config;
use pricegate::resource::ResourceClient;
use pricegate::service::ApiService;
use pricegate::transport::HttpTransport;
use serde_json::json;

use pricegate_test as test;

fn service_for(server: &test::Server) -> Arc<ApiService> {
    let mut config = Config::default();
    config.http.base_url = server.url("/");
    let transport = HttpTransport::new(&config.http).unwrap();
    ApiService::new(&config, Arc::new(transport))
}

#[tokio::test]
async fn test_reads_share_the_cache_and_mutations_invalidate_it() {
    test::setup();
    let (server, hits) = test::counting_json_server(json!({"plans": ["basic", "deluxe"]}));
    let service = service_for(&server);

    let first = ResourceClient::new(service.clone(), "plans");
    let second = ResourceClient::new(service.clone(), "plans");

    let payload = first.refetch(false).await.unwrap();
    assert_eq!(*payload, json!({"plans": ["basic", "deluxe"]}));

    // The second handle is served from the shared cache.
    second.refetch(false).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // A write invalidates, so the next read goes back to the network.
    first.create(json!({"title": "Premium"})).await.unwrap();
    second.refetch(false).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    // Distinct query parameters are a distinct cache entry.
    let filtered = ResourceClient::new(service, "plans")
        .with_params([("currency", "eur")]);
    filtered.refetch(false).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}
