/*
 * Integration tests for the backend client, task runner and dashboard service
 */

use arbview::{
    analytics::OpportunityFilter,
    api::{ApiClient, CancelTaskPayload, OpportunityQuery, PriceComparisonQuery, TaskListQuery},
    config::{BackendConfig, Config},
    models::{ArbviewError, Direction, LoadState},
    table::{SortField, SortOrder, SortSpec},
    tasks::{ApiTaskExecutor, TaskBoard, TaskStatus},
    DashboardService,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn client_for(server: &Server) -> ApiClient {
    ApiClient::new(&BackendConfig::new(format!("{}/api/v1", server.url()))).unwrap()
}

fn service_for(server: &Server) -> DashboardService {
    let mut config = Config::default();
    config.backend = BackendConfig::new(format!("{}/api/v1", server.url()));
    config.view.page_size = 2;
    DashboardService::new(config).unwrap()
}

fn opportunity_json(id: &str, ts: &str, dex: f64, cex: f64, gas: f64, fees: f64) -> serde_json::Value {
    let gross = (dex - cex).abs();
    json!({
        "id": id,
        "timestamp": ts,
        "dexPrice": dex,
        "cexPrice": cex,
        "direction": if dex > cex { "DEX_TO_CEX" } else { "CEX_TO_DEX" },
        "grossProfit": gross,
        "gasCost": gas,
        "totalFees": fees,
        "netProfit": gross - gas - fees,
    })
}

#[tokio::test]
async fn opportunities_request_carries_sort_and_window() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/opportunities")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("sort_by".into(), "net_profit".into()),
            Matcher::UrlEncoded("order".into(), "desc".into()),
            Matcher::UrlEncoded("startTime".into(), "1725148800".into()),
            Matcher::UrlEncoded("endTime".into(), "1727740800".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"code": 200, "message": "ok", "data": []}).to_string())
        .create_async()
        .await;

    let query = OpportunityQuery {
        sort_by: Some(SortField::NetProfit),
        order: Some(SortOrder::Desc),
        start_time: Some(1_725_148_800),
        end_time: Some(1_727_740_800),
        ..Default::default()
    };
    let response = assert_ok!(client_for(&server).get_opportunities(&query).await);

    assert_eq!(response.code, 200);
    assert_eq!(response.data, Some(json!([])));
    mock.assert_async().await;
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/tasks/missing")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(json!({"code": 404, "message": "task not found", "data": null}).to_string())
        .create_async()
        .await;

    let err = assert_err!(client_for(&server).get_task("missing").await);

    assert_eq!(err.status(), Some(404));
    assert_eq!(err.server_body().unwrap()["message"], "task not found");
    assert!(err.to_string().contains("task not found"));
}

#[tokio::test]
async fn plain_text_error_body_is_kept_as_string() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/v1/tasks/t-1/cancel")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let payload = CancelTaskPayload {
        reason: Some("stuck".to_string()),
    };
    let err = assert_err!(client_for(&server).cancel_task("t-1", Some(&payload)).await);

    match err {
        ArbviewError::ServerError { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, json!("upstream exploded"));
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn broken_error_body_is_a_network_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/tasks/t-2")
        .with_status(502)
        .with_chunked_body(|w| {
            w.write_all(br#"{"message": "bad ga"#)?;
            Err(std::io::Error::other("connection reset"))
        })
        .create_async()
        .await;

    let err = assert_err!(client_for(&server).get_task("t-2").await);

    assert!(matches!(err, ArbviewError::NetworkError(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let client = ApiClient::new(&BackendConfig::new("http://127.0.0.1:1/api/v1")).unwrap();

    let err = assert_err!(client.get_tasks(&TaskListQuery::default()).await);

    assert!(matches!(err, ArbviewError::NetworkError(_)));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn task_list_and_empty_delete_response() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/tasks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("limit".into(), "5".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": 200,
                "message": "ok",
                "data": {
                    "items": [{
                        "task_id": "0b8c",
                        "type": "collect_binance",
                        "status": "RUNNING",
                        "trigger": "manual",
                        "queued_at": "2024-09-01T00:00:00Z",
                        "started_at": null,
                        "finished_at": null
                    }],
                    "pagination": {"total": 6, "page": 2, "limit": 5}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("DELETE", "/api/v1/templates/7")
        .with_status(204)
        .create_async()
        .await;

    let client = client_for(&server);
    let list = assert_ok!(
        client
            .get_tasks(&TaskListQuery {
                page: Some(2),
                limit: Some(5),
            })
            .await
    )
    .into_data()
    .unwrap();
    assert_eq!(list.items[0].task_type, "collect_binance");
    assert_eq!(list.pagination.total, 6);

    let deleted = assert_ok!(client.delete_template(7).await);
    assert_eq!(deleted.code, 204);
    assert!(deleted.data.is_none());
}

#[tokio::test]
async fn task_board_runs_matching_template() {
    let mut server = Server::new_async().await;
    let templates = server
        .mock("GET", "/api/v1/templates")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": 200,
                "message": "ok",
                "data": [
                    {"id": 3, "name": "binance csv", "task_type": "collect_binance", "config": {}},
                    {"id": 4, "name": "analysis", "task_type": "analyse", "config": {}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let run = server
        .mock("POST", "/api/v1/templates/4/run")
        .match_body(Matcher::PartialJson(json!({
            "trigger": "dashboard",
            "overrides": {
                "overwrite": false,
                "strategy": {"time_delay": 15, "profit_threshold": 0.5}
            }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": 200,
                "message": "ok",
                "data": {"task_id": "a1", "type": "analyse", "status": "RUNNING", "trigger": "dashboard"}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let board = TaskBoard::new(Arc::new(ApiTaskExecutor::new(client_for(&server))));
    let entry = assert_ok!(board.run("analyze").await);

    assert_eq!(entry.status, TaskStatus::Success);
    assert!(entry.last_run.is_some());
    assert!(entry.duration.is_some());
    templates.assert_async().await;
    run.assert_async().await;
}

fn started_task(task_id: &str, task_type: &str) -> String {
    json!({
        "code": 200,
        "message": "ok",
        "data": {"task_id": task_id, "type": task_type, "status": "RUNNING", "trigger": "dashboard"}
    })
    .to_string()
}

#[tokio::test]
async fn pipeline_runs_against_backend_task_types() {
    let mut server = Server::new_async().await;
    let templates = server
        .mock("GET", "/api/v1/templates")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": 200,
                "message": "ok",
                "data": [
                    {"id": 1, "name": "uniswap", "task_type": "collect_uniswap", "config": {}},
                    {"id": 2, "name": "binance", "task_type": "collect_binance", "config": {}},
                    {"id": 3, "name": "analysis", "task_type": "analyse", "config": {}}
                ]
            })
            .to_string(),
        )
        .expect(3)
        .create_async()
        .await;
    let uniswap = server
        .mock("POST", "/api/v1/templates/1/run")
        .match_body(Matcher::PartialJson(json!({
            "overrides": {"start_ts": 1_725_148_800, "end_ts": 1_727_740_800}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(started_task("u1", "collect_uniswap"))
        .create_async()
        .await;
    let binance = server
        .mock("POST", "/api/v1/templates/2/run")
        .match_body(Matcher::PartialJson(json!({
            "overrides": {"import_percentage": 100, "chunk_size": 1_000_000}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(started_task("b1", "collect_binance"))
        .create_async()
        .await;
    let analyse = server
        .mock("POST", "/api/v1/templates/3/run")
        .match_body(Matcher::PartialJson(json!({
            "overrides": {"strategy": {"interval": "5m"}}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(started_task("a1", "analyse"))
        .create_async()
        .await;

    let board = TaskBoard::new(Arc::new(ApiTaskExecutor::new(client_for(&server))));
    let finished = assert_ok!(board.run_pipeline().await);

    let statuses: Vec<(&str, TaskStatus)> = finished.iter().map(|t| (t.id.as_str(), t.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("uniswap-ingest", TaskStatus::Success),
            ("binance-ingest", TaskStatus::Success),
            ("aggregate", TaskStatus::Success),
            ("analyze", TaskStatus::Success),
        ]
    );
    templates.assert_async().await;
    uniswap.assert_async().await;
    binance.assert_async().await;
    analyse.assert_async().await;
}

#[tokio::test]
async fn task_board_records_backend_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/templates")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(json!({"code": 503, "message": "database unavailable"}).to_string())
        .create_async()
        .await;

    let board = TaskBoard::new(Arc::new(ApiTaskExecutor::new(client_for(&server))));
    let entry = assert_ok!(board.run("uniswap-ingest").await);

    assert_eq!(entry.status, TaskStatus::Error);
    assert!(entry.last_error.unwrap().contains("database unavailable"));

    // Error is not terminal: the task can be started again.
    let again = assert_ok!(board.run("uniswap-ingest").await);
    assert_eq!(again.status, TaskStatus::Error);
}

#[tokio::test]
async fn service_builds_table_from_wrapped_payload() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/opportunities")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": 200,
                "message": "ok",
                "data": {
                    "items": [
                        opportunity_json("a", "2024-09-01T00:00:00Z", 2510.0, 2500.0, 2.0, 1.0),
                        opportunity_json("b", "2024-09-01T00:05:00Z", 2500.0, 2503.0, 2.0, 1.0),
                        opportunity_json("c", "2024-09-01T00:10:00Z", 2520.0, 2500.0, 2.0, 1.0)
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let service = service_for(&server);
    let state = service
        .load_opportunities(
            &OpportunityQuery::default(),
            SortSpec::new(SortField::NetProfit, SortOrder::Desc),
            OpportunityFilter {
                direction: Some(Direction::DexToCex),
                min_net_profit: None,
            },
        )
        .await;

    let table = state.loaded().unwrap();
    assert_eq!(table.total(), 2);
    assert_eq!(table.page_count(), 1);
    let ids: Vec<&str> = table.page().rows.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a"]);

    let stats = table.stats();
    assert_eq!(stats.total_opportunities, 2);
    assert!((stats.max_profit - 17.0).abs() < 1e-9);
    assert!((stats.total_potential_profit - 24.0).abs() < 1e-9);
}

#[tokio::test]
async fn service_reports_empty_and_failed_states() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/opportunities")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"code": 200, "message": "ok", "data": null}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/api/v1/price-comparison")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(json!({"code": 500, "message": "query failed"}).to_string())
        .create_async()
        .await;

    let service = service_for(&server);

    let opportunities = service
        .load_opportunities(&OpportunityQuery::default(), SortSpec::default(), OpportunityFilter::default())
        .await;
    assert!(matches!(opportunities, LoadState::Empty));

    let chart = service
        .load_price_chart(&PriceComparisonQuery {
            start_time: 1_725_148_800,
            end_time: 1_725_152_400,
            task_id: None,
        })
        .await;
    match chart {
        LoadState::Failed(err) => assert_eq!(err.status(), Some(500)),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn service_builds_chart_from_bare_array() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/price-comparison")
        .match_query(Matcher::UrlEncoded("taskId".into(), "run-9".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": 200,
                "message": "ok",
                "data": [
                    {"timestamp": 1725148860, "uniswapPrice": 2501.5, "binancePrice": 2500.0},
                    {"timestamp": 1725148800, "uniswapPrice": 2499.0, "binancePrice": 2500.5}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let service = service_for(&server);
    let chart = service
        .load_price_chart(&PriceComparisonQuery {
            start_time: 1_725_148_800,
            end_time: 1_725_152_400,
            task_id: Some("run-9".to_string()),
        })
        .await
        .loaded()
        .unwrap();

    assert_eq!(chart.len(), 2);
    let [dex, cex] = chart.series();
    assert_eq!(dex.data[0], (1_725_148_800_000, 2499.0));
    assert_eq!(cex.data[1], (1_725_148_860_000, 2500.0));
}
