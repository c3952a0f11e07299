//! Node endpoints: detail, list, history, and removal.

use std::sync::Arc;

use poem::web::{Data, Html, Json, Path, Query};
use poem::http::StatusCode;
use poem::{IntoResponse, Request, Response, handler};
use serde::Deserialize;
use tracing::info;

use crate::bridge::error::BridgeError;
use crate::bridge::handlers::AppState;
use crate::bridge::handlers::access;
use crate::bridge::handlers::view::NodeViewBuilder;
use crate::bridge::types::Projection;

const JSON_CONTENT_TYPE: &str = "application/json";

fn wants_json(req: &Request) -> bool {
    req.header("accept")
        .is_some_and(|accept| accept.trim() == JSON_CONTENT_TYPE)
}

/// `GET /nodes/:id`: JSON for admin API callers, HTML for browsers.
#[handler]
pub async fn node_detail(
    req: &Request,
    Path(id): Path<String>,
    Data(state): Data<&Arc<AppState>>,
) -> poem::Result<Response> {
    let store = state.store.as_ref();
    let id = id.trim();
    if id.is_empty() {
        return Err(BridgeError::NodeNotFound.into());
    }

    if wants_json(req) {
        access::require_api_key(req, store, true)?;
        let report = store.get_report_by_id(id).map_err(BridgeError::from)?.ok_or(BridgeError::NodeNotFound)?;
        return Ok(Json(report).into_response());
    }

    access::require_session(req, store)?;
    let report = store.get_report_by_id(id).map_err(BridgeError::from)?.ok_or(BridgeError::NodeNotFound)?;
    Ok(Html(NodeViewBuilder::new(&report).build()).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub skip: usize,
    pub limit: usize,
    /// Only nodes with this custom id; paging is ignored
    #[serde(rename = "custom-id")]
    pub custom_id: String,
    /// Only reports received within this many minutes; unparsable means all
    pub minutes: String,
    /// `id`, `list-view`, or anything else for every field
    pub projection: String,
}

impl ListParams {
    fn minutes(&self) -> u32 {
        self.minutes.trim().parse().unwrap_or(0)
    }
}

/// `GET /nodes?skip=&limit=&custom-id=&minutes=&projection=`
#[handler]
pub async fn list_nodes(
    req: &Request,
    Query(params): Query<ListParams>,
    Data(state): Data<&Arc<AppState>>,
) -> poem::Result<Response> {
    let store = state.store.as_ref();
    access::require_api_key(req, store, true)?;

    let projection = Projection::from_param(&params.projection);
    let custom_id = params.custom_id.trim();
    let reports = if custom_id.is_empty() {
        store.list_reports(params.skip, params.limit, params.minutes(), projection).map_err(BridgeError::from)?
    } else {
        store.list_reports_by_custom_id(custom_id, params.minutes(), projection).map_err(BridgeError::from)?
    };
    Ok(Json(reports).into_response())
}

/// `DELETE /nodes/:id`: forget a node's latest report, keeping its history.
#[handler]
pub async fn delete_node(
    req: &Request,
    Path(id): Path<String>,
    Data(state): Data<&Arc<AppState>>,
) -> poem::Result<Response> {
    let store = state.store.as_ref();
    access::require_api_key(req, store, true)?;

    let id = id.trim();
    if store.get_report_by_id(id).map_err(BridgeError::from)?.is_none() {
        return Err(BridgeError::NodeNotFound.into());
    }
    store.delete_report(id).map_err(BridgeError::from)?;
    info!("Deleted node {}", id);
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /nodes/:id/history`, oldest first.
#[handler]
pub async fn node_history(
    req: &Request,
    Path(id): Path<String>,
    Data(state): Data<&Arc<AppState>>,
) -> poem::Result<Response> {
    let store = state.store.as_ref();
    access::require_api_key(req, store, true)?;
    let history = store.list_history(id.trim()).map_err(BridgeError::from)?;
    Ok(Json(history).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use poem::Endpoint;
    use poem::http::Method;

    use crate::bridge::handlers::access::SESSION_COOKIE;
    use crate::bridge::handlers::test_support::{
        ADMIN_KEY, AGENT_KEY, SESSION_ID, app, seeded_store,
    };
    use crate::bridge::storage::{MemoryStore, Store};
    use crate::bridge::testing::{DialMode, RecordingDialer, ScriptedHandshaker};
    use crate::bridge::types::Report;

    async fn send(store: Arc<MemoryStore>, req: Request) -> (StatusCode, String) {
        let app = app(
            store,
            Arc::new(RecordingDialer::new(DialMode::Fail)),
            Arc::new(ScriptedHandshaker::new(Vec::new())),
        );
        let resp = app.get_response(req).await;
        let status = resp.status();
        (status, resp.into_body().into_string().await.unwrap())
    }

    fn api_get(path: &str, key: &str) -> Request {
        Request::builder()
            .uri(path.parse().unwrap())
            .header("accept", "application/json")
            .header("authorization", format!("token {}", key))
            .finish()
    }

    mod detail {
        use super::*;

        #[tokio::test]
        async fn test_json_for_admin() {
            let (status, body) = send(seeded_store(), api_get("/nodes/aa", ADMIN_KEY)).await;

            assert_eq!(status, StatusCode::OK);
            let report: Report = serde_json::from_str(&body).unwrap();
            assert_eq!(report.ssh_remote_port, 4022);
        }

        #[tokio::test]
        async fn test_json_requires_admin_key() {
            let (status, _) = send(seeded_store(), api_get("/nodes/aa", AGENT_KEY)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);

            let req = Request::builder()
                .uri("/nodes/aa".parse().unwrap())
                .header("accept", "application/json")
                .finish();
            let (status, _) = send(seeded_store(), req).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        #[tokio::test]
        async fn test_json_unknown_node() {
            let (status, _) = send(seeded_store(), api_get("/nodes/zz", ADMIN_KEY)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_html_requires_session() {
            let req = Request::builder().uri("/nodes/aa".parse().unwrap()).finish();
            let (status, _) = send(seeded_store(), req).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }

        #[tokio::test]
        async fn test_html_with_session() {
            let req = Request::builder()
                .uri("/nodes/aa".parse().unwrap())
                .header("cookie", format!("{}={}", SESSION_COOKIE, SESSION_ID))
                .finish();
            let (status, body) = send(seeded_store(), req).await;

            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("<h1>edge-7</h1>"));
        }

        #[tokio::test]
        async fn test_expired_session_is_forbidden() {
            let store = seeded_store();
            store
                .put_user_session(crate::bridge::types::UserSession {
                    id: "old".to_string(),
                    user: "ops".to_string(),
                    expires_at: 1,
                })
                .unwrap();
            let req = Request::builder()
                .uri("/nodes/aa".parse().unwrap())
                .header("cookie", format!("{}=old", SESSION_COOKIE))
                .finish();

            let (status, _) = send(store, req).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }
    }

    mod listing {
        use super::*;

        #[tokio::test]
        async fn test_list_with_paging() {
            let store = seeded_store();
            for id in ["bb", "cc"] {
                store
                    .put_report(Report {
                        id: id.to_string(),
                        ..Default::default()
                    })
                    .unwrap();
            }

            let (status, body) = send(store, api_get("/nodes?skip=1&limit=1", ADMIN_KEY)).await;

            assert_eq!(status, StatusCode::OK);
            let reports: Vec<Report> = serde_json::from_str(&body).unwrap();
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].id, "bb");
        }

        #[tokio::test]
        async fn test_history_oldest_first() {
            let store = seeded_store();
            store
                .put_report(Report {
                    id: "aa".to_string(),
                    ssh_server_host: "relay1".to_string(),
                    ssh_remote_port: 5022,
                    ..Default::default()
                })
                .unwrap();

            let (status, body) = send(store, api_get("/nodes/aa/history", ADMIN_KEY)).await;

            assert_eq!(status, StatusCode::OK);
            let history: Vec<Report> = serde_json::from_str(&body).unwrap();
            let ports: Vec<i64> = history.iter().map(|r| r.ssh_remote_port).collect();
            assert_eq!(ports, vec![4022, 5022]);
        }

        #[tokio::test]
        async fn test_list_by_custom_id() {
            let store = seeded_store();
            for (id, custom_id) in [("bb", "shop-3"), ("cc", "shop-4"), ("dd", "shop-3")] {
                store
                    .put_report(Report {
                        id: id.to_string(),
                        custom_id: custom_id.to_string(),
                        ..Default::default()
                    })
                    .unwrap();
            }

            let (status, body) =
                send(store, api_get("/nodes?custom-id=shop-3&limit=1", ADMIN_KEY)).await;

            assert_eq!(status, StatusCode::OK);
            let reports: Vec<Report> = serde_json::from_str(&body).unwrap();
            let ids: Vec<&str> = reports.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, ["bb", "dd"]);
        }

        #[tokio::test]
        async fn test_list_by_minutes() {
            let store = seeded_store();
            store
                .put_report(Report {
                    id: "fresh".to_string(),
                    server_time: chrono::Utc::now().timestamp(),
                    ..Default::default()
                })
                .unwrap();

            let (_, body) = send(store.clone(), api_get("/nodes?minutes=5", ADMIN_KEY)).await;
            let reports: Vec<Report> = serde_json::from_str(&body).unwrap();
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].id, "fresh");

            let (status, body) = send(store, api_get("/nodes?minutes=soon", ADMIN_KEY)).await;
            assert_eq!(status, StatusCode::OK);
            let reports: Vec<Report> = serde_json::from_str(&body).unwrap();
            assert_eq!(reports.len(), 2);
        }

        #[tokio::test]
        async fn test_list_with_id_projection() {
            let (status, body) =
                send(seeded_store(), api_get("/nodes?projection=id", ADMIN_KEY)).await;

            assert_eq!(status, StatusCode::OK);
            let value: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(value[0]["id"], serde_json::json!("aa"));
            assert!(value[0].get("hostname").is_none());
            assert!(value[0].get("ssh_server_host").is_none());
        }

        #[tokio::test]
        async fn test_list_requires_key() {
            let req = Request::builder().uri("/nodes".parse().unwrap()).finish();
            let (status, _) = send(seeded_store(), req).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }

    mod removal {
        use super::*;

        fn api_delete(path: &str, key: &str) -> Request {
            Request::builder()
                .method(Method::DELETE)
                .uri(path.parse().unwrap())
                .header("authorization", format!("token {}", key))
                .finish()
        }

        #[tokio::test]
        async fn test_delete_keeps_history() {
            let store = seeded_store();

            let (status, _) = send(store.clone(), api_delete("/nodes/aa", ADMIN_KEY)).await;

            assert_eq!(status, StatusCode::NO_CONTENT);
            assert!(store.get_report_by_id("aa").unwrap().is_none());
            assert_eq!(store.list_history("aa").unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_delete_unknown_node() {
            let (status, _) = send(seeded_store(), api_delete("/nodes/zz", ADMIN_KEY)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_delete_requires_admin_key() {
            let store = seeded_store();
            let (status, _) = send(store.clone(), api_delete("/nodes/aa", AGENT_KEY)).await;

            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(store.get_report_by_id("aa").unwrap().is_some());
        }
    }
}
