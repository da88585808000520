use crate::observability::{render_metrics, track_request};
use crate::query::{parse_request, select_ways, QueryError, QueryParams};
use crate::reload::ReloadCoordinator;
use actix_web::dev::{Server, Service as _};
use actix_web::{get, middleware, post, web, App, HttpResponse, HttpServer, Responder, Result};
use futures_util::future::FutureExt;
use std::net::TcpListener;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;
use tracing_actix_web::TracingLogger;

type AppState = Arc<ReloadCoordinator>;

pub struct ServiceConfig {
    pub coordinator: Arc<ReloadCoordinator>,
    pub listener: TcpListener,
}

#[post("/ways")]
pub async fn ways(
    body: web::Bytes,
    params: web::Query<QueryParams>,
    state: web::Data<AppState>,
) -> Result<impl Responder> {
    let bboxes = parse_request(&body)?;
    let dataset = state.current().ok_or(QueryError::NotReady)?;
    let full = params.is_full();
    let response = web::block(move || select_ways(&dataset, bboxes, full))
        .await
        .map_err(|_| QueryError::Internal)?;
    info!(ways = response.result.ways.len(), "ways selected");
    Ok(web::Json(response))
}

#[get("/status")]
async fn dataset_status(state: web::Data<AppState>) -> Result<impl Responder> {
    let dataset = state.current().ok_or(QueryError::NotReady)?;
    Ok(web::Json(dataset.stats()))
}

#[get("/health")]
async fn health() -> &'static str {
    "Ok"
}

#[get("/metrics")]
async fn metrics() -> String {
    render_metrics()
}

async fn not_found() -> Result<HttpResponse> {
    Err(QueryError::NotFound.into())
}

/// Route table shared by the server and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ways)
        .service(dataset_status)
        .service(health)
        .service(metrics)
        .default_service(web::to(not_found));
}

fn cors() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*"))
}

pub fn run_service(config: ServiceConfig) -> std::io::Result<Server> {
    let ServiceConfig {
        coordinator,
        listener,
    } = config;
    let state: AppState = coordinator;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors())
            .wrap(TracingLogger::default())
            .wrap_fn(|req, srv| {
                let path = String::from(req.path());
                let method = String::from(req.method().as_str());
                let offset = OffsetDateTime::now_utc();
                srv.call(req).map(move |res| {
                    let time = OffsetDateTime::now_utc() - offset;
                    if let Ok(ref res) = res {
                        let code = res.response().status();
                        track_request(code.into(), &method, &path, time.as_seconds_f64());
                    }
                    res
                })
            })
            .configure(configure)
    })
    .listen(listener)?
    .run();
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{build_dataset, DataSource};
    use crate::pbf::proto::{DenseNodes, PrimitiveBlock, PrimitiveGroup, StringTable, Way};
    use crate::pbf::BlockWriter;
    use crate::query::{ErrorResponse, WaysResponse};
    use crate::state::StateMarker;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use std::num::NonZeroU32;

    fn coordinator() -> Arc<ReloadCoordinator> {
        Arc::new(ReloadCoordinator::new(DataSource {
            data_path: "missing.pbf".into(),
            state_path: "missing.txt".into(),
            cell_size: NonZeroU32::new(10_000).unwrap(),
        }))
    }

    fn install_dataset(coordinator: &ReloadCoordinator) {
        let block = PrimitiveBlock {
            stringtable: StringTable { s: vec![vec![]] },
            primitivegroup: vec![
                PrimitiveGroup {
                    dense: Some(DenseNodes {
                        id: vec![1, 1],
                        lat: vec![100, 100],
                        lon: vec![100, 100],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                PrimitiveGroup {
                    ways: vec![Way {
                        id: 5,
                        refs: vec![1, 1],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut writer = BlockWriter::new(Vec::new());
        writer.write_data(&block).unwrap();
        let bytes = writer.into_inner();
        let marker = StateMarker {
            sequence: 1_600_000_000,
            timestamp: Some("2020-01-01T00:00:00Z".into()),
        };
        let dataset = build_dataset(bytes.as_slice(), coordinator.source().cell_size, marker).unwrap();
        coordinator.install(dataset);
    }

    macro_rules! app {
        ($coordinator:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($coordinator.clone()))
                    .wrap(cors())
                    .configure(configure),
            )
            .await
        };
    }

    const BODY: &str = r#"{"bboxes":[{"west":0,"south":0,"east":1000,"north":1000}]}"#;

    #[actix_web::test]
    async fn health_check() {
        let coordinator = coordinator();
        let app = app!(coordinator);
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
    }

    #[actix_web::test]
    async fn ways_before_first_load_is_unavailable() {
        let coordinator = coordinator();
        let app = app!(coordinator);
        let req = test::TestRequest::post()
            .uri("/ways")
            .set_payload(BODY)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "error");
    }

    #[actix_web::test]
    async fn malformed_ways_request_is_bad_request() {
        let coordinator = coordinator();
        install_dataset(&coordinator);
        let app = app!(coordinator);
        let req = test::TestRequest::post()
            .uri("/ways")
            .set_payload(r#"{"bboxes":[]}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "error");
        assert_eq!(body.message, "malformed bbox request");
    }

    #[actix_web::test]
    async fn ways_returns_matches() {
        let coordinator = coordinator();
        install_dataset(&coordinator);
        let app = app!(coordinator);
        let req = test::TestRequest::post()
            .uri("/ways?full=1")
            .set_payload(BODY)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        let body: WaysResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "success");
        assert_eq!(body.data_timestamp.as_deref(), Some("2020-01-01T00:00:00Z"));
        let way = &body.result.ways[&5];
        assert_eq!(way.id, Some(5));
        assert_eq!(way.nodes, [[0.00001, 0.00001], [0.00002, 0.00002]]);
    }

    #[actix_web::test]
    async fn status_reports_dataset() {
        let coordinator = coordinator();
        let app = app!(coordinator);
        let req = test::TestRequest::get().uri("/status").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        install_dataset(&coordinator);
        let req = test::TestRequest::get().uri("/status").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], 1_600_000_000);
        assert_eq!(body["ways"], 1);
        assert_eq!(body["nodes"], 2);
    }

    #[actix_web::test]
    async fn unknown_route_is_json_not_found() {
        let coordinator = coordinator();
        let app = app!(coordinator);
        let req = test::TestRequest::get().uri("/locate").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "error");
        assert_eq!(body.message, "not found");
    }
}
