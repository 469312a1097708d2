use plannerapp::config::SyncConfig;
use plannerapp::error::PlannerError;
use plannerapp::model::{FieldPatch, Goal, Note, Page, PageQuery, ProfileFields, Record, RecordId};
use plannerapp::remote::http::HttpRemote;
use plannerapp::remote::RemoteStore;
use plannerapp::session::Session;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_for(server: &MockServer) -> HttpRemote {
    let config = SyncConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    HttpRemote::new(&config, Session::authenticated("auth0|ana", Some("tok-123".into()))).unwrap()
}

#[tokio::test]
async fn test_fetch_page_sends_filters_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/counselor-goals"))
        .and(query_param("category", "Academic"))
        .and(query_param("limit", "20"))
        .and(query_param("cursor", "c1"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "goals": [
                {"id": 21, "title": "Visit campus", "category": "Academic"},
                {"id": 22, "title": "Finish FAFSA", "category": "Academic", "status": "in_progress"}
            ],
            "pagination": {"nextCursor": null, "hasMore": false, "totalGoals": 22}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = PageQuery::new()
        .with_category("Academic")
        .with_limit(20)
        .with_cursor(Some("c1".into()));
    let page: Page<Goal> = remote_for(&server).fetch_page(&query).await.unwrap();

    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].id.as_str(), "21");
    assert!(!page.has_more);
    assert_eq!(page.total, Some(22));
}

#[tokio::test]
async fn test_fetch_404_is_an_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user-profile"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Profile not found"})))
        .mount(&server)
        .await;

    let page: Page<ProfileFields> = remote_for(&server)
        .fetch_page(&PageQuery::new())
        .await
        .unwrap();
    assert!(page.is_end());
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/counselor-notes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result: Result<Page<Note>, _> = remote_for(&server).fetch_page(&PageQuery::new()).await;
    assert!(matches!(result, Err(PlannerError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_create_posts_fields_and_parses_wrapped_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/counselor-goals"))
        .and(body_json(json!({
            "title": "Finish FAFSA",
            "category": "Academic",
            "status": "not_started"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "goal": {"id": 42, "title": "Finish FAFSA", "category": "Academic"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = remote_for(&server)
        .create(&Goal::new("Finish FAFSA", "Academic"))
        .await
        .unwrap();
    assert_eq!(record.id, RecordId::new("42"));
    assert_eq!(record.fields.title, "Finish FAFSA");
}

#[tokio::test]
async fn test_update_puts_id_with_changed_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/counselor-notes"))
        .and(body_json(json!({"id": "7", "text": "Call back Friday"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7, "text": "Call back Friday", "studentId": "s-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record: Record<Note> = remote_for(&server)
        .update(
            &RecordId::new("7"),
            &FieldPatch::new().set("text", "Call back Friday"),
        )
        .await
        .unwrap();
    assert_eq!(record.fields.student_id.as_deref(), Some("s-1"));
}

#[tokio::test]
async fn test_update_of_missing_record() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/counselor-notes"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result: Result<Record<Note>, _> = remote_for(&server)
        .update(&RecordId::new("7"), &FieldPatch::new().set("text", "x"))
        .await;
    assert!(matches!(result, Err(PlannerError::RecordNotFound(id)) if id == "7"));
}

#[tokio::test]
async fn test_delete_reports_whether_record_existed() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/saved-programs"))
        .and(query_param("id", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/saved-programs"))
        .and(query_param("id", "6"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    assert!(remote
        .delete::<plannerapp::model::SavedProgram>(&RecordId::new("5"))
        .await
        .unwrap());
    assert!(!remote
        .delete::<plannerapp::model::SavedProgram>(&RecordId::new("6"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_status_classification() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/user-profile"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"error": "Service temporarily unavailable"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/user-profile"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "db down"})))
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    let unavailable: Result<Record<ProfileFields>, _> = remote
        .update(&RecordId::new("me"), &FieldPatch::new().set("school", "Lincoln High"))
        .await;
    let err = unavailable.unwrap_err();
    assert!(err.is_unavailable());
    assert!(err.is_transient());

    let failed = remote.create(&ProfileFields::default()).await;
    match failed {
        Err(PlannerError::Server { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "db down");
        }
        other => panic!("expected server error, got {:?}", other.map(|r| r.id)),
    }
}

#[tokio::test]
async fn test_anonymous_session_never_reaches_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = SyncConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let remote = HttpRemote::new(&config, Session::anonymous()).unwrap();
    let result: Result<Page<Goal>, _> = remote.fetch_page(&PageQuery::new()).await;
    assert!(matches!(result, Err(PlannerError::Unauthenticated)));
}
