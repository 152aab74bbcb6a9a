// Intended public API surface for `dpsync-core`.
//
// This module exists to keep the crate root small and make it explicit which
// types/functions are part of the stable interface used by the CLI.

pub use crate::core::client::{DeviceClient, HttpResponseError, WalkDecision};
pub use crate::core::config::{DeviceOptions, SyncRequest};
pub use crate::core::filter::NameFilter;
pub use crate::core::json::{as_list, string_at, value_at, Step};
pub use crate::core::order::sort_by_dependencies;
pub use crate::core::project::packages::{
    filter_packages, load_packages, object_qname, package_of_file, package_of_object, Package,
};
pub use crate::core::project::scan::{
    is_hidden, read_json_file, save_file, save_object, scan_files, scan_objects, FileInfo,
    ObjectInfo,
};
pub use crate::core::project::select_packages;
pub use crate::core::pull::pull;
pub use crate::core::push::push;
pub use crate::core::refs::{extract_dependencies, rewrite_links};
pub use crate::core::transfer::TransferResult;
