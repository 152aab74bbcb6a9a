//! Pull: mirror remote files and objects into the local project.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::core::client::{DeviceClient, HttpResponseError, WalkDecision};
use crate::core::config::SyncRequest;
use crate::core::filter::NameFilter;
use crate::core::json::{as_list, string_at, value_at};
use crate::core::project::packages::{
    object_qname, package_of_file, package_of_object, Package,
};
use crate::core::project::scan::{save_file, save_object, FileInfo, ObjectInfo};
use crate::core::project::select_packages;
use crate::core::refs::rewrite_links;
use crate::core::transfer::{
    combine_outcomes, quiesce, ItemKind, ReportGuard, ReportLayout, TransferResult,
};

/// Filestores that hold appliance-managed certificate material; never
/// mirrored.
const CERT_STORES: [&str; 3] = ["cert", "sharedcert", "pubcert"];

/// Pulls every matching remote file and object into the selected packages.
///
/// The two pipelines share one concurrency gate; both run even when the
/// first fails, and their failures are reported jointly.
pub async fn pull(client: &Arc<DeviceClient>, request: &SyncRequest) -> Result<()> {
    let file_filter = NameFilter::new(&request.files, &request.ignore_files)?;
    let object_filter = NameFilter::new(&request.objects, &request.ignore_objects)?;
    let packages = select_packages(request)?;

    let semaphore = Arc::new(Semaphore::new(request.parallel));
    let files = pull_files(client, request, &file_filter, &packages, &semaphore).await;
    let objects = pull_objects(client, request, &object_filter, &packages, &semaphore).await;
    combine_outcomes(files, objects)
}

async fn pull_files(
    client: &Arc<DeviceClient>,
    request: &SyncRequest,
    filter: &NameFilter,
    packages: &[Arc<Package>],
    semaphore: &Arc<Semaphore>,
) -> Result<()> {
    let mut files: Vec<FileInfo> = Vec::new();
    let mut layout = ReportLayout::default();

    let stores = client.list_stores(&request.domain).await?;
    for store in stores {
        if CERT_STORES.contains(&store.as_str()) {
            debug!("store ignored: {store}");
            continue;
        }

        let mut on_dir = |path: &str| -> Result<WalkDecision> {
            if filter.prunes_dir(path) {
                debug!("directory ignored: {path}");
                Ok(WalkDecision::Skip)
            } else {
                Ok(WalkDecision::Descend)
            }
        };
        let mut on_file = |path: &str, _modified: &str, _size: u64| -> Result<()> {
            if !filter.accepts(path) {
                debug!("file ignored: {path}");
                return Ok(());
            }
            let package = package_of_file(packages, path)?
                .unwrap_or_else(|| packages[0].clone());
            layout.fit_name(path);
            layout.fit_package(&package.name);
            files.push(FileInfo::remote(path.to_string(), package));
            Ok(())
        };

        client
            .walk_filestore(&request.domain, &store, &mut on_dir, &mut on_file)
            .await?;
    }

    info!("files selected: {}", files.len());

    let errors = Arc::new(AtomicU64::new(0));
    for info in files {
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
            if let Err(err) = pull_file(&client, &domain, &info, &mut report).await {
                error!("{err:#}");
                errors.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    quiesce(semaphore, request.parallel as u32).await?;

    let errors = errors.load(Ordering::Relaxed);
    if errors > 0 {
        bail!("failed to pull {errors} files");
    }
    Ok(())
}

async fn pull_file(
    client: &DeviceClient,
    domain: &str,
    info: &FileInfo,
    report: &mut ReportGuard,
) -> Result<()> {
    let data = client.get_file(domain, &info.path).await?;
    let (file, newly_created) = save_file(&info.package.dir, &info.path, &data)?;
    debug!("file local path: {}", file.display());
    report.set_result(if newly_created {
        TransferResult::New
    } else {
        TransferResult::Ok
    });
    Ok(())
}

async fn pull_objects(
    client: &Arc<DeviceClient>,
    request: &SyncRequest,
    filter: &NameFilter,
    packages: &[Arc<Package>],
    semaphore: &Arc<Semaphore>,
) -> Result<()> {
    let status = client.status(&request.domain, "ObjectStatus").await?;
    let entries = as_list(value_at(&status, &["ObjectStatus".into()]));

    let mut objects: Vec<ObjectInfo> = Vec::new();
    let mut layout = ReportLayout::default();
    for entry in entries {
        let name = string_at(entry, &["Name".into()])
            .context("missing 'Name' in object status")?;
        let class = string_at(entry, &["Class".into()])
            .context("missing 'Class' in object status")?;
        let qname = object_qname(class, name);

        if !filter.accepts(&qname) {
            debug!("object ignored: {qname}");
            continue;
        }

        let package = package_of_object(packages, &qname)?
            .unwrap_or_else(|| packages[0].clone());
        layout.fit_name(&qname);
        layout.fit_package(&package.name);
        objects.push(ObjectInfo::remote(class.to_string(), name.to_string(), package));
    }

    info!("objects selected: {}", objects.len());

    let errors = Arc::new(AtomicU64::new(0));
    for info in objects {
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
            if let Err(err) = pull_object(&client, &domain, info, &mut report).await {
                error!("{err:#}");
                errors.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    quiesce(semaphore, request.parallel as u32).await?;

    let errors = errors.load(Ordering::Relaxed);
    if errors > 0 {
        bail!("failed to pull {errors} objects");
    }
    Ok(())
}

async fn pull_object(
    client: &DeviceClient,
    domain: &str,
    mut info: ObjectInfo,
    report: &mut ReportGuard,
) -> Result<()> {
    let fetched = match client.get_object(domain, &info.class, &info.name).await {
        Ok(obj) => Ok(obj),
        // classes without named instances answer 404; try the singleton form
        Err(err) if HttpResponseError::status_of(&err) == Some(StatusCode::NOT_FOUND) => {
            client.get_singleton(domain, &info.class).await
        }
        Err(err) => Err(err),
    };
    let mut obj = fetched?;

    // the appliance's own idea of the name wins over the status listing
    let name = string_at(&obj, &["name".into()])
        .with_context(|| format!("missing 'name' attribute for object: {}", info.qname()))?
        .to_string();
    if info.name != name {
        info.name = name;
        report.set_name(info.qname());
    }

    rewrite_links(&mut obj, domain);

    let (file, newly_created) = save_object(&info.package.dir, &info.qname(), &obj)?;
    debug!("object local path: {}", file.display());
    report.set_result(if newly_created {
        TransferResult::New
    } else {
        TransferResult::Ok
    });
    Ok(())
}
