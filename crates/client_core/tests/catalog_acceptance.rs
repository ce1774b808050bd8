use std::{collections::HashMap, sync::Arc};

use axum::{extract::Query, routing::get, Json, Router};
use client_core::{config::Settings, FetchOutcome, GooglePlacesClient, PlaceCatalog};
use serde_json::{json, Value};
use shared::domain::{PlaceId, VisitedSet};
use storage::{SqlitePreferenceStore, VisitedPlaces};
use tokio::net::TcpListener;

async fn text_search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let body = match params.get("pagetoken").map(String::as_str) {
        None => json!({
            "status": "OK",
            "next_page_token": "page-2",
            "results": [
                {"place_id": "p1", "name": "Stadthuys", "formatted_address": "Melaka", "rating": 4.4},
                {"place_id": "p2", "name": "Kellie's Castle", "formatted_address": "Batu Gajah",
                 "photos": [{"photo_reference": "castle"}]}
            ]
        }),
        Some(_) => json!({
            "status": "OK",
            "results": [
                {"place_id": "p2", "name": "Kellie's Castle", "formatted_address": "Batu Gajah"},
                {"place_id": "p3", "name": "Fort Cornwallis", "formatted_address": "George Town"}
            ]
        }),
    };
    Json(body)
}

async fn details(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let name = match params.get("place_id").map(String::as_str) {
        Some("p2") => "Kellie's Castle",
        _ => "Unknown",
    };
    Json(json!({"status": "OK", "result": {"name": name, "formatted_address": "Batu Gajah"}}))
}

fn ids(values: &[&str]) -> VisitedSet {
    values.iter().map(|v| PlaceId::from(*v)).collect()
}

#[tokio::test]
async fn browse_mark_and_resync_against_live_stack() {
    let app = Router::new()
        .route("/textsearch/json", get(text_search))
        .route("/details/json", get(details));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let settings = Settings {
        api_key: "acceptance-key".to_string(),
        api_base_url: format!("http://{addr}"),
        ..Settings::default()
    };
    let api = Arc::new(GooglePlacesClient::new(&settings).expect("client"));
    let store = Arc::new(
        SqlitePreferenceStore::new("sqlite::memory:")
            .await
            .expect("preferences db"),
    );
    let prefs = VisitedPlaces::new(store.clone());
    prefs.set_visited_ids(&ids(&["p1"])).await.expect("seed");

    let catalog = PlaceCatalog::new(api, store);

    assert_eq!(catalog.retry().await, FetchOutcome::Applied);
    let first = catalog.snapshot().await;
    assert_eq!(first.places.len(), 2);
    assert!(first.places[0].visited);
    assert!(!first.places[1].visited);
    assert!(first.places[1].image_url.contains("photoreference=castle"));
    assert_eq!(first.places[0].rating_label(), "4.4");

    assert_eq!(catalog.load_more().await, FetchOutcome::Applied);
    assert_eq!(catalog.load_more().await, FetchOutcome::Skipped);
    let listed: Vec<String> = catalog
        .snapshot()
        .await
        .places
        .into_iter()
        .map(|p| p.id.0)
        .collect();
    assert_eq!(listed, vec!["p1", "p2", "p2", "p3"]);

    let p2 = PlaceId::from("p2");
    assert_eq!(catalog.open_place(&p2).await, FetchOutcome::Applied);
    assert_eq!(catalog.toggle_visited(&p2).await.expect("toggle"), Some(true));
    let marked = catalog.snapshot().await;
    assert!(marked.current_place.as_ref().expect("detail").visited);
    assert_eq!(
        marked.places.iter().filter(|p| p.visited).count(),
        3,
        "p1 plus both arrivals of p2"
    );
    assert_eq!(prefs.get_visited_ids().await, ids(&["p1", "p2"]));

    prefs.set_visited_ids(&ids(&["p1"])).await.expect("reset");
    catalog.sync_visited_state().await;
    let synced = catalog.snapshot().await;
    assert!(!synced.current_place.expect("detail").visited);
    assert!(synced.places.iter().filter(|p| p.id == p2).all(|p| !p.visited));

    catalog.reset_list().await;
    let reset = catalog.snapshot().await;
    assert!(reset.places.is_empty());
    assert_eq!(reset.page_cursor, None);
}
