//! Push: upload local files and objects to the appliance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::core::client::{DeviceClient, HttpResponseError};
use crate::core::config::SyncRequest;
use crate::core::filter::NameFilter;
use crate::core::json::{string_at, value_at};
use crate::core::order::sort_by_dependencies;
use crate::core::project::packages::Package;
use crate::core::project::scan::{scan_files, scan_objects, FileInfo, ObjectInfo};
use crate::core::project::select_packages;
use crate::core::transfer::{
    combine_outcomes, quiesce, ItemKind, ReportGuard, ReportLayout, TransferResult,
};

/// Pushes every matching local file and object to the appliance.
///
/// Objects are uploaded in dependency order so referenced objects exist
/// before their referrers; files have no ordering constraint. Both pipelines
/// share one concurrency gate and report failures jointly.
pub async fn push(client: &Arc<DeviceClient>, request: &SyncRequest) -> Result<()> {
    let file_filter = NameFilter::new(&request.files, &request.ignore_files)?;
    let object_filter = NameFilter::new(&request.objects, &request.ignore_objects)?;
    let packages = select_packages(request)?;

    let semaphore = Arc::new(Semaphore::new(request.parallel));
    let files = push_files(client, request, &file_filter, &packages, &semaphore).await;
    let objects = push_objects(client, request, &object_filter, &packages, &semaphore).await;
    combine_outcomes(files, objects)
}

async fn push_files(
    client: &Arc<DeviceClient>,
    request: &SyncRequest,
    filter: &NameFilter,
    packages: &[Arc<Package>],
    semaphore: &Arc<Semaphore>,
) -> Result<()> {
    let mut layout = ReportLayout::default();
    let mut matching: Vec<FileInfo> = Vec::new();
    for info in scan_files(packages)? {
        if !filter.accepts(&info.path) {
            debug!("file ignored: {}", info.path);
            continue;
        }
        layout.fit_name(&info.path);
        matching.push(info);
    }
    for pkg in packages {
        layout.fit_package(&pkg.name);
    }

    info!("files selected: {}", matching.len());

    let errors = Arc::new(AtomicU64::new(0));
    for info in matching {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("concurrency gate closed")?;
        let client = client.clone();
        let domain = request.domain.clone();
        let errors = errors.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let mut report = ReportGuard::new(
                ItemKind::File,
                info.path.clone(),
                info.package.name.clone(),
                layout,
            );
            if let Err(err) = push_file(&client, &domain, &info, &mut report).await {
                error!("{err:#}");
                errors.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    quiesce(semaphore, request.parallel as u32).await?;

    let errors = errors.load(Ordering::Relaxed);
    if errors > 0 {
        bail!("failed to push {errors} files");
    }
    Ok(())
}

async fn push_file(
    client: &DeviceClient,
    domain: &str,
    info: &FileInfo,
    report: &mut ReportGuard,
) -> Result<()> {
    let data = info.data()?;
    let response = client.put_file(domain, &info.path, data).await?;

    let result = string_at(&response, &["result".into()])
        .with_context(|| format!("missing 'result' in response for {}", info.path))?;
    report.set_result(classify(result, "File was updated", "File was created"));
    Ok(())
}

async fn push_objects(
    client: &Arc<DeviceClient>,
    request: &SyncRequest,
    filter: &NameFilter,
    packages: &[Arc<Package>],
    semaphore: &Arc<Semaphore>,
) -> Result<()> {
    let mut layout = ReportLayout::default();
    let mut matching: Vec<ObjectInfo> = Vec::new();
    for info in scan_objects(packages)? {
        let qname = info.qname();
        if !filter.accepts(&qname) {
            debug!("object ignored: {qname}");
            continue;
        }
        layout.fit_name(&qname);
        matching.push(info);
    }
    for pkg in packages {
        layout.fit_package(&pkg.name);
    }

    info!("objects selected: {}", matching.len());

    let errors = Arc::new(AtomicU64::new(0));
    for info in sort_by_dependencies(matching) {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("concurrency gate closed")?;
        let client = client.clone();
        let domain = request.domain.clone();
        let errors = errors.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let mut report = ReportGuard::new(
                ItemKind::Object,
                info.qname(),
                info.package.name.clone(),
                layout,
            );
            if let Err(err) = push_object(&client, &domain, &info, &mut report).await {
                error!("{err:#}");
                errors.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    quiesce(semaphore, request.parallel as u32).await?;

    let errors = errors.load(Ordering::Relaxed);
    if errors > 0 {
        bail!("failed to push {errors} objects");
    }
    Ok(())
}

async fn push_object(
    client: &DeviceClient,
    domain: &str,
    info: &ObjectInfo,
    report: &mut ReportGuard,
) -> Result<()> {
    let obj = info.data()?;
    validate_object_name(&info.name, obj)?;

    let response = match client.put_object(domain, &info.class, obj).await {
        Ok(response) => response,
        Err(err) => {
            // surface appliance-side detail alongside the status line
            if let Some(details) =
                HttpResponseError::body_of(&err).and_then(|body| value_at(body, &["error".into()]))
            {
                bail!("{err:#}\n       {details}");
            }
            return Err(err);
        }
    };

    // the response keys off the object name, with spaces underscored on
    // some firmware levels
    let underscored = info.name.replace(' ', "_");
    let result = string_at(&response, &[info.name.as_str().into()])
        .or_else(|| string_at(&response, &[underscored.as_str().into()]))
        .context("unknown push result")?;
    report.set_result(classify(
        result,
        "Configuration was updated",
        "Configuration was created",
    ));
    Ok(())
}

fn classify(result: &str, updated: &str, created: &str) -> TransferResult {
    if result.contains(updated) {
        TransferResult::Ok
    } else if result.contains(created) {
        TransferResult::New
    } else {
        TransferResult::Success
    }
}

fn validate_object_name(name: &str, obj: &Value) -> Result<()> {
    match string_at(obj, &["name".into()]) {
        None | Some("") => bail!("missing 'name' attribute for object: {name}"),
        Some(attr) if attr != name => {
            bail!("mismatch: object name: {attr}, file name: {name}")
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::core::config::DeviceOptions;

    fn write_package(root: &Path, name: &str, priority: u32) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("package dir");
        fs::write(
            dir.join("metadata.json"),
            serde_json::to_vec_pretty(&json!({"tags": [], "priority": priority}))
                .expect("encode"),
        )
        .expect("metadata");
    }

    fn write_object(root: &Path, pkg: &str, class: &str, name: &str, body: &serde_json::Value) {
        let dir = root.join(pkg).join("objects").join(class);
        fs::create_dir_all(&dir).expect("class dir");
        fs::write(
            dir.join(format!("{name}.json")),
            serde_json::to_vec_pretty(body).expect("encode"),
        )
        .expect("object");
    }

    fn request_for(project_dir: &Path) -> SyncRequest {
        SyncRequest {
            domain: "prod".to_string(),
            project_dir: project_dir.to_path_buf(),
            pkg_tags: Vec::new(),
            objects: vec![".*".to_string()],
            files: vec![".*".to_string()],
            ignore_objects: vec!["^.*/__.*__$".to_string()],
            ignore_files: vec!["^(config/.*|store/.*)$".to_string()],
            parallel: 1,
        }
    }

    async fn client_for(server: &MockServer) -> Arc<DeviceClient> {
        Arc::new(
            DeviceClient::new(&DeviceOptions {
                mgmt_url: server.uri(),
                user_name: "admin".to_string(),
                user_password: "secret".to_string(),
                http_timeout: Duration::from_secs(5),
            })
            .expect("client"),
        )
    }

    #[tokio::test]
    async fn pushes_objects_in_dependency_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_package(temp.path(), "pkg", 1);
        write_object(
            temp.path(),
            "pkg",
            "svc",
            "a",
            &json!({
                "name": "a",
                "next": {"href": "/mgmt/config/{domain}/svc/b", "value": "b"}
            }),
        );
        write_object(
            temp.path(),
            "pkg",
            "svc",
            "b",
            &json!({
                "name": "b",
                "next": {"href": "/mgmt/config/{domain}/svc/c", "value": "c"}
            }),
        );
        write_object(temp.path(), "pkg", "svc", "c", &json!({"name": "c"}));

        let server = MockServer::start().await;
        for name in ["a", "b", "c"] {
            Mock::given(method("PUT"))
                .and(path(format!("/mgmt/config/prod/svc/{name}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    name: "Configuration was updated."
                })))
                .mount(&server)
                .await;
        }

        let client = client_for(&server).await;
        push(&client, &request_for(temp.path())).await.expect("push");

        let order: Vec<String> = server
            .received_requests()
            .await
            .expect("recorded")
            .iter()
            .filter(|r| r.method == wiremock::http::Method::PUT)
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(
            order,
            [
                "/mgmt/config/prod/svc/c",
                "/mgmt/config/prod/svc/b",
                "/mgmt/config/prod/svc/a"
            ]
        );
    }

    #[tokio::test]
    async fn classifies_created_and_unknown_results() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_package(temp.path(), "pkg", 1);
        write_object(temp.path(), "pkg", "svc", "fresh", &json!({"name": "fresh"}));
        write_object(temp.path(), "pkg", "svc", "odd", &json!({"name": "odd"}));

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/mgmt/config/prod/svc/fresh"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "fresh": "Configuration was created."
            })))
            .mount(&server)
            .await;
        // a body keyed by something else entirely is an item failure
        Mock::given(method("PUT"))
            .and(path("/mgmt/config/prod/svc/odd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "somebody": "else"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = push(&client, &request_for(temp.path()))
            .await
            .expect_err("one unknown result");
        assert_eq!(format!("{err:#}"), "failed to push 1 objects");
    }

    #[tokio::test]
    async fn underscored_response_keys_are_recognized() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_package(temp.path(), "pkg", 1);
        write_object(
            temp.path(),
            "pkg",
            "svc",
            "my gateway",
            &json!({"name": "my gateway"}),
        );

        let server = MockServer::start().await;
        // the space is percent-encoded on the wire
        Mock::given(method("PUT"))
            .and(path("/mgmt/config/prod/svc/my%20gateway"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "my_gateway": "Configuration was updated."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        push(&client, &request_for(temp.path())).await.expect("push");
    }

    #[tokio::test]
    async fn name_mismatch_fails_only_that_item() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_package(temp.path(), "pkg", 1);
        write_object(temp.path(), "pkg", "svc", "good", &json!({"name": "good"}));
        // file is named liar.json but claims to be someone else
        write_object(temp.path(), "pkg", "svc", "liar", &json!({"name": "impostor"}));
        write_object(temp.path(), "pkg", "svc", "anon", &json!({"other": 1}));

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/mgmt/config/prod/svc/good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "good": "Configuration was updated."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = push(&client, &request_for(temp.path()))
            .await
            .expect_err("two invalid items");
        assert_eq!(format!("{err:#}"), "failed to push 2 objects");

        // only the valid object ever reached the appliance
        let puts = server
            .received_requests()
            .await
            .expect("recorded")
            .iter()
            .filter(|r| r.method == wiremock::http::Method::PUT)
            .count();
        assert_eq!(puts, 1);
    }

    #[tokio::test]
    async fn appliance_error_details_are_surfaced() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_package(temp.path(), "pkg", 1);
        write_object(temp.path(), "pkg", "svc", "bad", &json!({"name": "bad"}));

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/mgmt/config/prod/svc/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": ["invalid object configuration"]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = push(&client, &request_for(temp.path()))
            .await
            .expect_err("push fails");
        assert_eq!(format!("{err:#}"), "failed to push 1 objects");
    }

    #[tokio::test]
    async fn pushes_files_creating_remote_parents() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_package(temp.path(), "pkg", 1);
        let dir = temp.path().join("pkg/files/local/xslt");
        fs::create_dir_all(&dir).expect("files dir");
        fs::write(dir.join("t.xsl"), b"<xsl/>").expect("file");

        let server = MockServer::start().await;
        use base64::prelude::{Engine as _, BASE64_STANDARD};
        // local exists, local/xslt does not
        Mock::given(method("GET"))
            .and(path("/mgmt/filestore/prod/local"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "filestore": {"location": {"name": "local:"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/filestore/prod/local/xslt"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "x"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/mgmt/filestore/prod/local/xslt"))
            .and(body_json(json!({"directory": {"name": "xslt"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": "Directory was created."
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/mgmt/filestore/prod/local/xslt/t.xsl"))
            .and(body_json(json!({
                "file": {"name": "t.xsl", "content": BASE64_STANDARD.encode(b"<xsl/>")}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": "File was created."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        push(&client, &request_for(temp.path())).await.expect("push");
    }

    #[tokio::test]
    async fn filters_apply_to_local_paths_and_qnames() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_package(temp.path(), "pkg", 1);
        write_object(temp.path(), "pkg", "svc", "__default__", &json!({"name": "__default__"}));
        let dir = temp.path().join("pkg/files/store");
        fs::create_dir_all(&dir).expect("files dir");
        fs::write(dir.join("system.dat"), b"x").expect("file");

        let server = MockServer::start().await;
        let client = client_for(&server).await;
        // everything is filtered out, so no request is ever made
        push(&client, &request_for(temp.path())).await.expect("push");
        assert!(server.received_requests().await.expect("recorded").is_empty());
    }
}
