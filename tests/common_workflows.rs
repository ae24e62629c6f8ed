// Workflows exercised the way an application would: build, mount,
// register providers, drive requests through the test client.

use gantry::prelude::*;
use gantry::{DispatchPipeline, QueryParamSpec};
use gantry_testing::{assert_header, assert_status, TestClient};
use std::sync::Arc;

fn users_api() -> Router {
    let mut router = Router::new();
    router
        .register(
            Route::get(
                "/users/{id:int}",
                RouteHandler::from_async(|args: BoundParameters| async move {
                    let id = args.param("id").and_then(ParamValue::as_int).unwrap();
                    Ok(HttpResponse::ok()
                        .with_json(&serde_json::json!({"id": id, "name": "ada"}))
                        .unwrap())
                }),
            )
            .plan(BindingPlan::new([ParamSpec::path("id")]))
            .query_param(QueryParamSpec::new("verbose")),
        )
        .unwrap();
    router
        .register(
            Route::post(
                "/users",
                RouteHandler::from_async(|args: BoundParameters| async move {
                    let req = args.request("req").unwrap();
                    let payload: serde_json::Value = req.json()?;
                    Ok(HttpResponse::created().with_json(&payload).unwrap())
                }),
            )
            .plan(BindingPlan::new([ParamSpec::request("req")])),
        )
        .unwrap();
    router
}

fn client_for(router: Router, scopes: ScopeManager) -> TestClient {
    TestClient::new(Arc::new(DispatchPipeline::new(router, Arc::new(scopes))))
}

#[tokio::test]
async fn fetch_a_user_by_typed_id() {
    let client = client_for(users_api(), ScopeManager::new());

    let response = client.get("/users/42").await;
    assert_status(&response, 200);
    let json: serde_json::Value = response.body_json().unwrap();
    assert_eq!(json["id"], 42);
}

#[tokio::test]
async fn create_a_user_from_json_body() {
    let client = client_for(users_api(), ScopeManager::new());

    let response = client
        .post("/users", br#"{"name":"grace"}"#.to_vec())
        .await;
    assert_status(&response, 201);
    let json: serde_json::Value = response.body_json().unwrap();
    assert_eq!(json["name"], "grace");
}

#[tokio::test]
async fn invalid_id_falls_through_to_not_found() {
    let client = client_for(users_api(), ScopeManager::new());
    let response = client.get("/users/not-a-number").await;
    assert_status(&response, 404);
}

#[tokio::test]
async fn unsupported_method_reports_allowed_set() {
    let client = client_for(users_api(), ScopeManager::new());
    let response = client.delete("/users").await;
    assert_status(&response, 405);
    assert_header(&response, "Allow", "POST");
}

#[tokio::test]
async fn mounted_api_with_scoped_dependencies() {
    let mut scopes = ScopeManager::new();
    scopes.register_value(ROOT_LAYER, "service_name", "users".to_string());

    let mut inner = Router::new();
    inner
        .register(
            Route::get(
                "/whoami",
                RouteHandler::from_async(|args: BoundParameters| async move {
                    let name = args.dependency::<String>("service_name").unwrap();
                    Ok(HttpResponse::ok().with_body((*name).clone()))
                }),
            )
            .plan(BindingPlan::new([ParamSpec::dependency("service_name")])),
        )
        .unwrap();

    let mut router = Router::new();
    router.include("/api", inner).unwrap();

    let client = client_for(router, scopes);
    let response = client.get("/api/whoami").await;
    assert_status(&response, 200);
    assert_eq!(response.body_string(), Some("users".to_string()));
}

#[tokio::test]
async fn middleware_wraps_every_dispatch() {
    use async_trait::async_trait;
    use gantry::{Middleware, Next};

    struct ServerHeader;

    #[async_trait]
    impl Middleware for ServerHeader {
        async fn handle(
            &self,
            req: HttpRequest,
            next: Next,
        ) -> Result<HttpResponse, gantry::Error> {
            let mut response = next(req).await?;
            response
                .headers
                .insert("Server".to_string(), "gantry".to_string());
            Ok(response)
        }
    }

    let mut chain = MiddlewareChain::new();
    chain.use_middleware(ServerHeader);
    let pipeline = Arc::new(
        DispatchPipeline::new(users_api(), Arc::new(ScopeManager::new()))
            .with_middleware(chain),
    );
    let client = TestClient::new(pipeline);

    let response = client.get("/users/1").await;
    assert_header(&response, "Server", "gantry");
}
