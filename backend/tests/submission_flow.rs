mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};
use common::{body_json, Part, TestApp, SIGNATURE_PNG, SUBMISSIONS};
use serde_json::{json, Value};

const PHOTO_ONE: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 10, 20, 30];
const PHOTO_TWO: &[u8] = &[0xff, 0xd8, 0xff, 0xe1, 40, 50, 60, 70];

async fn seeded_app() -> TestApp {
    let app = TestApp::new();
    let records = app.records();
    records.seed_unit("recSWI001", "SWI001", "SWI001", "abc123").await;
    records.seed_checklist("recAnnual", "Annual", 3).await;
    app
}

fn complete_parts<'a>() -> Vec<Part<'a>> {
    vec![
        Part::Text("unit_record_id", "recSWI001"),
        Part::Text("maintenance_type", "Annual"),
        Part::Text("checklist_template_id", "recAnnual"),
        Part::Text("maintained_by", "Acme Marine"),
        Part::Text("engineer_name", "Sam Rivers"),
        Part::Text("engineer_email", "sam@example.com"),
        Part::Text("date_of_maintenance", "2026-10-16"),
        Part::Text("location_lat", "50.3714"),
        Part::Text("location_lng", ""),
        Part::Text("location_town", "Plymouth"),
        Part::Text("location_what3words", ""),
        Part::Text("comments", "Seals replaced"),
        Part::Text("submission_id", "6f1c1b4e-33a1-4c55-9d0e-0c1c0d7b9a11"),
        Part::Text("q1", "Yes"),
        Part::Text("q2", "No"),
        Part::Text("q3", "Replaced"),
        Part::Text("q5", "Extra note"),
        Part::File {
            name: "photos",
            filename: "hull.jpg",
            content_type: "image/jpeg",
            data: PHOTO_ONE,
        },
        Part::File {
            name: "photos",
            filename: "seal.jpg",
            content_type: "image/jpeg",
            data: PHOTO_TWO,
        },
        Part::File {
            name: "signature",
            filename: "signature.png",
            content_type: "image/png",
            data: SIGNATURE_PNG.as_slice(),
        },
    ]
}

fn decode_cell(cell: &Value) -> Vec<u8> {
    STANDARD
        .decode(cell["data"].as_str().expect("attachment data"))
        .expect("base64 attachment")
}

#[tokio::test]
async fn stores_one_record_with_inline_attachments() -> Result<()> {
    let app = seeded_app().await;

    let response = app
        .post_multipart("/api/submissions", &complete_parts())
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["record_id"], json!("recCreated1"));

    let created = app.records().created().await;
    assert_eq!(created.len(), 1);
    let (table, fields) = &created[0];
    assert_eq!(table, SUBMISSIONS);

    assert_eq!(fields["unit"], json!(["recSWI001"]));
    assert_eq!(fields["checklist_template"], json!(["recAnnual"]));
    assert_eq!(fields["maintenance_type"], json!("Annual"));
    assert_eq!(fields["location_lat"], json!(50.3714));
    assert!(!fields.contains_key("location_lng"));
    assert!(!fields.contains_key("engineer_phone"));
    assert_eq!(
        fields["submission_id"],
        json!("6f1c1b4e-33a1-4c55-9d0e-0c1c0d7b9a11")
    );

    let photos = fields["photos"].as_array().expect("photos array");
    assert_eq!(photos.len(), 2);
    assert_eq!(photos[0]["filename"], "hull.jpg");
    assert_eq!(photos[0]["contentType"], "image/jpeg");
    assert_eq!(decode_cell(&photos[0]), PHOTO_ONE);
    assert_eq!(decode_cell(&photos[1]), PHOTO_TWO);

    let signature = fields["signature"].as_array().expect("signature array");
    assert_eq!(signature.len(), 1);
    assert_eq!(signature[0]["contentType"], "image/png");
    assert_eq!(decode_cell(&signature[0]), *SIGNATURE_PNG);

    let checklist: Value =
        serde_json::from_str(fields["checklist_json"].as_str().expect("checklist text"))?;
    assert_eq!(checklist["template_id"], "recAnnual");
    assert_eq!(checklist["comments"], "Seals replaced");
    let answers = checklist["answers"].as_array().expect("answers");
    assert_eq!(answers.len(), 4);
    assert_eq!(
        answers[0],
        json!({ "key": "q1", "question": "Check item 1?", "answer": "Yes" })
    );
    assert_eq!(answers[2]["answer"], "Replaced");
    assert_eq!(
        answers[3],
        json!({ "key": "q5", "question": null, "answer": "Extra note" })
    );
    Ok(())
}

#[tokio::test]
async fn missing_signature_is_rejected_before_any_store_call() -> Result<()> {
    let app = seeded_app().await;
    let parts: Vec<Part> = complete_parts()
        .into_iter()
        .filter(|part| !matches!(part, Part::File { name: "signature", .. }))
        .collect();

    let response = app.post_multipart("/api/submissions", &parts).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], "signature is required");
    assert!(app.records().created().await.is_empty());
    assert!(app.records().queries().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_signature_file_counts_as_missing() -> Result<()> {
    let app = seeded_app().await;
    let mut parts = complete_parts();
    parts.pop();
    parts.push(Part::File {
        name: "signature",
        filename: "signature.png",
        content_type: "image/png",
        data: &[],
    });

    let response = app.post_multipart("/api/submissions", &parts).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.records().created().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn required_identifiers_are_enforced() -> Result<()> {
    let app = seeded_app().await;

    for missing in ["unit_record_id", "maintenance_type", "checklist_template_id"] {
        let parts: Vec<Part> = complete_parts()
            .into_iter()
            .filter(|part| !matches!(part, Part::Text(name, _) if *name == missing))
            .collect();
        let response = app.post_multipart("/api/submissions", &parts).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{missing}");
        let body = body_json(response.into_body()).await?;
        assert_eq!(body["error"], format!("{missing} is required"));
    }

    assert!(app.records().created().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_template_is_rejected() -> Result<()> {
    let app = seeded_app().await;
    let parts: Vec<Part> = complete_parts()
        .into_iter()
        .map(|part| match part {
            Part::Text("checklist_template_id", _) => Part::Text("checklist_template_id", "recGone"),
            other => other,
        })
        .collect();

    let response = app.post_multipart("/api/submissions", &parts).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.records().created().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn store_rejection_is_passed_through() -> Result<()> {
    let app = seeded_app().await;
    app.records()
        .reject_writes(422, "Unknown field name: \"photos\"")
        .await;

    let response = app
        .post_multipart("/api/submissions", &complete_parts())
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response.into_body()).await?;
    assert_eq!(
        body,
        json!({ "success": false, "airtable_error": "Unknown field name: \"photos\"" })
    );
    assert_eq!(app.records().created().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn resubmitting_creates_a_second_record() -> Result<()> {
    let app = seeded_app().await;

    for _ in 0..2 {
        let response = app
            .post_multipart("/api/submissions", &complete_parts())
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let created = app.records().created().await;
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].1["submission_id"], created[1].1["submission_id"]);
    Ok(())
}

#[tokio::test]
async fn non_post_methods_are_rejected_without_processing() -> Result<()> {
    let app = seeded_app().await;

    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let response = app.request(method.clone(), "/api/submissions").await?;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        let body = body_json(response.into_body()).await?;
        assert!(body["error"].is_string());
    }

    assert!(app.records().created().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn json_body_is_not_accepted() -> Result<()> {
    let app = seeded_app().await;

    let response = app
        .post_json("/api/submissions", &json!({ "unit_record_id": "recSWI001" }))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["success"], json!(false));
    Ok(())
}

#[tokio::test]
async fn browser_form_post_lands_on_completion_page() -> Result<()> {
    let app = seeded_app().await;
    let mut parts = complete_parts();
    parts.push(Part::Text(
        "return_to",
        "/unit/abc123/annual/complete?serial=SWI001",
    ));

    let response = app.post_multipart("/api/submissions", &parts).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok()),
        Some("/unit/abc123/annual/complete?serial=SWI001")
    );
    assert_eq!(app.records().created().await.len(), 1);

    let page = app.get("/unit/abc123/annual/complete?serial=SWI001").await?;
    assert_eq!(page.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn foreign_return_target_gets_the_json_receipt() -> Result<()> {
    let app = seeded_app().await;
    let mut parts = complete_parts();
    parts.push(Part::Text("return_to", "https://evil.example/unit/x/annual/complete"));

    let response = app.post_multipart("/api/submissions", &parts).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["success"], json!(true));
    Ok(())
}
