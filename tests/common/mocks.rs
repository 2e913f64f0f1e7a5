//! Mocked App Store Connect endpoints

use super::config::TEST_TOKEN;
use super::fixtures::{BUILD_NUMBER, BUNDLE_ID};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// App id returned for [`BUNDLE_ID`]
pub const APP_ID: &str = "1234567890";
/// buildUploads id
pub const UPLOAD_ID: &str = "upload-1";
/// buildUploadFiles id
pub const FILE_ID: &str = "file-1";
/// builds id
pub const BUILD_ID: &str = "build-1";
/// betaBuildLocalizations id
pub const LOCALIZATION_ID: &str = "loc-1";

/// Two PUT operations splitting `artifact_len` bytes at the midpoint
pub fn two_chunk_operations(server: &MockServer, artifact_len: u64) -> Vec<Value> {
    let first = artifact_len / 2;
    vec![
        json!({
            "method": "PUT",
            "url": format!("{}/upload/part1", server.uri()),
            "offset": 0,
            "length": first,
            "requestHeaders": [{"name": "Content-Type", "value": "application/octet-stream"}]
        }),
        json!({
            "method": "PUT",
            "url": format!("{}/upload/part2", server.uri()),
            "offset": first,
            "length": artifact_len - first,
            "requestHeaders": [{"name": "Content-Type", "value": "application/octet-stream"}]
        }),
    ]
}

/// `GET /apps` answering with a single matching app
pub async fn mount_app_lookup(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .and(query_param("filter[bundleId]", BUNDLE_ID))
        .and(header("Authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": APP_ID, "type": "apps", "attributes": {"bundleId": BUNDLE_ID}}]
        })))
        .mount(server)
        .await;
}

/// Session and file creation, with the chunk plan on the file resource
pub async fn mount_session(server: &MockServer, operations: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path("/v1/buildUploads"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {"id": UPLOAD_ID, "type": "buildUploads", "attributes": {}}
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/buildUploadFiles"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {
                "id": FILE_ID,
                "type": "buildUploadFiles",
                "attributes": {"uploadOperations": operations}
            }
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Chunk targets answering `part1_status` and `part2_status`
pub async fn mount_chunk_targets(server: &MockServer, part1_status: u16, part2_status: u16) {
    Mock::given(method("PUT"))
        .and(path("/upload/part1"))
        .respond_with(ResponseTemplate::new(part1_status))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/part2"))
        .respond_with(ResponseTemplate::new(part2_status).set_body_string("chunk rejected"))
        .mount(server)
        .await;
}

/// `PATCH /buildUploadFiles/{FILE_ID}` answering `status`
pub async fn mount_finalize(server: &MockServer, status: u16) {
    Mock::given(method("PATCH"))
        .and(path(format!("/v1/buildUploadFiles/{}", FILE_ID)))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "data": {"id": FILE_ID, "type": "buildUploadFiles"}
        })))
        .mount(server)
        .await;
}

/// `GET /builds` answering the given processing states in order; the last
/// one repeats forever. `None` means the build is not listed yet.
pub async fn mount_build_states(server: &MockServer, states: &[Option<&str>]) {
    let Some((last, leading)) = states.split_last() else {
        return;
    };

    for state in leading {
        builds_mock()
            .respond_with(build_listing(*state))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    builds_mock()
        .respond_with(build_listing(*last))
        .mount(server)
        .await;
}

fn builds_mock() -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path("/v1/builds"))
        .and(query_param("filter[app]", APP_ID))
        .and(query_param("filter[version]", BUILD_NUMBER))
        .and(query_param("filter[preReleaseVersion.platform]", "IOS"))
}

fn build_listing(state: Option<&str>) -> ResponseTemplate {
    let body = match state {
        Some(state) => json!({
            "data": [{"id": BUILD_ID, "type": "builds", "attributes": {"processingState": state}}]
        }),
        None => json!({"data": []}),
    };
    ResponseTemplate::new(200).set_body_json(body)
}

/// Localization lookup plus release notes and compliance PATCH endpoints
pub async fn mount_metadata_endpoints(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/builds/{}/betaBuildLocalizations", BUILD_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": LOCALIZATION_ID, "type": "betaBuildLocalizations"}]
        })))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("/v1/betaBuildLocalizations/{}", LOCALIZATION_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("/v1/builds/{}", BUILD_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

/// Everything the server received, in arrival order
pub async fn received(server: &MockServer) -> Vec<Request> {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
}

/// Requests whose method and path match
pub async fn requests_to(server: &MockServer, http_method: &str, request_path: &str) -> Vec<Request> {
    received(server)
        .await
        .into_iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
        .collect()
}
