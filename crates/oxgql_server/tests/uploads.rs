//! Multipart upload transport behavior.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, StatusCode};
use oxgql_server::{testserver, MultipartForm, Server, WireRequest};
use serde_json::{json, Value};

const BOUNDARY: &str = "------------------------boundary";

fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> (String, String) {
    let mut body = String::new();
    for (name, filename, content) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match filename {
            Some(filename) => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                ));
                body.push_str("Content-Type: text/plain\r\n\r\n");
            }
            None => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                ));
            }
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    (
        body,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    )
}

fn upload_request(parts: &[(&str, Option<&str>, &str)]) -> WireRequest {
    let (body, content_type) = multipart_body(parts);
    WireRequest::new(Method::POST, "/graphql")
        .with_header(CONTENT_TYPE, &content_type)
        .with_body(body)
}

fn server() -> Server {
    Server::new_default(testserver::schema())
}

#[tokio::test]
async fn single_file_upload_binds_to_its_variable() {
    let operations = json!({
        "query": "mutation ($file: Upload!) { upload(file: $file) { filename size content } }",
        "variables": {"file": null},
    });
    let req = upload_request(&[
        ("operations", None, &operations.to_string()),
        ("map", None, r#"{"0": ["variables.file"]}"#),
        ("0", Some("a.txt"), "hello"),
    ]);
    let resp = server().handle(req).await;
    assert_eq!(resp.status, StatusCode::OK);
    let parsed = resp.body_json().unwrap();
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    assert_eq!(
        parsed.data["upload"],
        json!({"filename": "a.txt", "size": 5, "content": "hello"})
    );
}

#[tokio::test]
async fn one_part_can_feed_multiple_variables_spooled_to_disk() {
    let operations = json!({
        "query": "mutation ($a: Upload!, $b: Upload!) { one: upload(file: $a) { content } two: upload(file: $b) { content } }",
        "variables": {"a": null, "b": null},
    });
    let req = upload_request(&[
        ("operations", None, &operations.to_string()),
        ("map", None, r#"{"0": ["variables.a", "variables.b"]}"#),
        ("0", Some("big.txt"), "spooled bytes"),
    ]);
    // max_memory far below the part size forces the temp-file path
    let server = Server::build(testserver::schema())
        .transport(MultipartForm::new().max_memory(2))
        .finish();
    let resp = server.handle(req).await;
    assert_eq!(resp.status, StatusCode::OK);
    let parsed = resp.body_json().unwrap();
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    assert_eq!(parsed.data["one"]["content"], json!("spooled bytes"));
    assert_eq!(parsed.data["two"]["content"], json!("spooled bytes"));
}

#[tokio::test]
async fn upload_path_that_does_not_exist_is_a_422() {
    let operations = json!({
        "query": "mutation ($file: Upload!) { upload(file: $file) { content } }",
        "variables": {"file": null},
    });
    let req = upload_request(&[
        ("operations", None, &operations.to_string()),
        ("map", None, r#"{"0": ["variables.wrong"]}"#),
        ("0", Some("a.txt"), "hello"),
    ]);
    let resp = server().handle(req).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    let message = &resp.body_json().unwrap().errors[0].message;
    assert!(message.contains("variables.wrong"), "{message}");
    assert!(message.contains("does not exist"), "{message}");
}

#[tokio::test]
async fn empty_paths_list_is_a_422() {
    let operations = json!({
        "query": "mutation ($file: Upload!) { upload(file: $file) { content } }",
        "variables": {"file": null},
    });
    let req = upload_request(&[
        ("operations", None, &operations.to_string()),
        ("map", None, r#"{"0": []}"#),
        ("0", Some("a.txt"), "hello"),
    ]);
    let resp = server().handle(req).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.body_json().unwrap().errors[0].message,
        "invalid empty operations paths list for key 0"
    );
}

#[tokio::test]
async fn map_key_without_a_file_part_is_a_422() {
    let operations = json!({
        "query": "mutation ($file: Upload!) { upload(file: $file) { content } }",
        "variables": {"file": null},
    });
    let req = upload_request(&[
        ("operations", None, &operations.to_string()),
        ("map", None, r#"{"0": ["variables.file"]}"#),
    ]);
    let resp = server().handle(req).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.body_json().unwrap().errors[0].message,
        "failed to get key 0 from form"
    );
}

#[tokio::test]
async fn undecodable_operations_field_is_a_422() {
    let req = upload_request(&[
        ("operations", None, "notjson"),
        ("map", None, r#"{"0": ["variables.file"]}"#),
    ]);
    let resp = server().handle(req).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.body_json().unwrap().errors[0].message,
        "operations form field could not be decoded"
    );
}

#[tokio::test]
async fn oversized_declared_body_is_refused_before_parsing() {
    let server = Server::build(testserver::schema())
        .transport(MultipartForm::new().max_upload_size(16))
        .finish();
    let (body, content_type) = multipart_body(&[("operations", None, "{}")]);
    let req = WireRequest::new(Method::POST, "/graphql")
        .with_header(CONTENT_TYPE, &content_type)
        .with_header(CONTENT_LENGTH, "10000")
        .with_body(body);
    let resp = server.handle(req).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body_json().unwrap().errors[0].message,
        "failed to parse multipart form, request body too large"
    );
}

#[tokio::test]
async fn occupied_variable_slot_is_rejected() {
    let operations = json!({
        "query": "mutation ($file: Upload!) { upload(file: $file) { content } }",
        "variables": {"file": "already set"},
    });
    let req = upload_request(&[
        ("operations", None, &operations.to_string()),
        ("map", None, r#"{"0": ["variables.file"]}"#),
        ("0", Some("a.txt"), "hello"),
    ]);
    let resp = server().handle(req).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    let message = &resp.body_json().unwrap().errors[0].message;
    assert!(message.contains("null placeholder"), "{message}");
}

#[tokio::test]
async fn upload_value_reaches_the_resolver_as_a_marker() {
    // the substituted variable is an opaque string the resolver maps back
    // through the request's upload table
    let operations = json!({
        "query": "mutation ($files: [Upload!]!) { uploads(files: $files) { filename size content } }",
        "variables": {"files": [null, null]},
    });
    let req = upload_request(&[
        ("operations", None, &operations.to_string()),
        ("map", None, r#"{"a": ["variables.files.0"], "b": ["variables.files.1"]}"#),
        ("a", Some("one.txt"), "first"),
        ("b", Some("two.txt"), "second"),
    ]);
    let resp = server().handle(req).await;
    assert_eq!(resp.status, StatusCode::OK);
    let parsed = resp.body_json().unwrap();
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let files = parsed.data["uploads"].as_array().unwrap().clone();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["filename"], json!("one.txt"));
    assert_eq!(files[1]["content"], json!("second"));
    assert!(matches!(&files[0]["size"], Value::Number(_)));
}
