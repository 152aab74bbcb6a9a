//! Push ordering: referenced objects before their referrers.

use std::collections::HashMap;

use crate::core::project::scan::ObjectInfo;

/// Orders `objects` so every dependency that is itself in the set appears
/// before the objects referring to it.
///
/// Roots are visited in alphabetical qname order; each visit removes the
/// object from the working map before chasing its dependencies, which both
/// breaks cycles (a cycle is cut wherever it was entered) and skips objects
/// already emitted. Dangling references and unreadable dependency lists are
/// tolerated: the former are skipped, the latter degrade to "no
/// dependencies" so the object is still emitted.
pub fn sort_by_dependencies(objects: Vec<ObjectInfo>) -> Vec<ObjectInfo> {
    let mut pending: HashMap<String, ObjectInfo> = objects
        .into_iter()
        .map(|obj| (obj.qname(), obj))
        .collect();

    let mut qnames: Vec<String> = pending.keys().cloned().collect();
    qnames.sort();

    let mut ordered = Vec::with_capacity(qnames.len());
    for qname in &qnames {
        if let Some(obj) = pending.remove(qname) {
            emit(obj, &mut pending, &mut ordered);
        }
    }
    ordered
}

fn emit(obj: ObjectInfo, pending: &mut HashMap<String, ObjectInfo>, ordered: &mut Vec<ObjectInfo>) {
    let depend: Vec<String> = obj
        .dependencies()
        .map(<[String]>::to_vec)
        .unwrap_or_default();

    for qname in depend {
        if let Some(next) = pending.remove(&qname) {
            emit(next, pending, ordered);
        }
    }

    ordered.push(obj);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::core::project::packages::Package;

    fn package(root: &Path) -> Arc<Package> {
        Arc::new(Package {
            name: "pkg".to_string(),
            dir: root.to_path_buf(),
            tags: Vec::new(),
            priority: 1,
        })
    }

    fn reference(class: &str, name: &str) -> Value {
        json!({
            "href": format!("/mgmt/config/{{domain}}/{class}/{name}"),
            "value": name
        })
    }

    fn object(root: &Path, pkg: &Arc<Package>, class: &str, name: &str, refs: &[(&str, &str)]) -> ObjectInfo {
        let mut body = json!({"name": name});
        for (i, (cls, n)) in refs.iter().enumerate() {
            body[format!("ref{i}")] = reference(cls, n);
        }
        let dir = root.join("objects").join(class);
        fs::create_dir_all(&dir).expect("class dir");
        let file = dir.join(format!("{name}.json"));
        fs::write(&file, serde_json::to_vec_pretty(&body).expect("encode")).expect("write");
        ObjectInfo::local(class.to_string(), name.to_string(), pkg.clone(), file)
    }

    fn qnames(objects: &[ObjectInfo]) -> Vec<String> {
        objects.iter().map(ObjectInfo::qname).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pkg = package(temp.path());
        let a = object(temp.path(), &pkg, "svc", "a", &[("svc", "b")]);
        let b = object(temp.path(), &pkg, "svc", "b", &[("svc", "c")]);
        let c = object(temp.path(), &pkg, "svc", "c", &[]);

        let ordered = sort_by_dependencies(vec![a, b, c]);
        assert_eq!(qnames(&ordered), ["svc/c", "svc/b", "svc/a"]);
    }

    #[test]
    fn every_dependency_precedes_its_referrer() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pkg = package(temp.path());
        let objects = vec![
            object(temp.path(), &pkg, "svc", "top", &[("mid", "m1"), ("mid", "m2")]),
            object(temp.path(), &pkg, "mid", "m1", &[("leaf", "l")]),
            object(temp.path(), &pkg, "mid", "m2", &[("leaf", "l")]),
            object(temp.path(), &pkg, "leaf", "l", &[]),
        ];

        let ordered = sort_by_dependencies(objects);
        let names = qnames(&ordered);
        let index = |qn: &str| names.iter().position(|n| n == qn).expect("present");
        assert!(index("leaf/l") < index("mid/m1"));
        assert!(index("leaf/l") < index("mid/m2"));
        assert!(index("mid/m1") < index("svc/top"));
        assert!(index("mid/m2") < index("svc/top"));
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn cycles_are_emitted_once_each() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pkg = package(temp.path());
        let a = object(temp.path(), &pkg, "svc", "a", &[("svc", "b")]);
        let b = object(temp.path(), &pkg, "svc", "b", &[("svc", "a")]);

        let ordered = sort_by_dependencies(vec![a, b]);
        // the alphabetically first object is visited first and therefore
        // emitted after its cycle partner
        assert_eq!(qnames(&ordered), ["svc/b", "svc/a"]);
    }

    #[test]
    fn dangling_references_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pkg = package(temp.path());
        let a = object(temp.path(), &pkg, "svc", "a", &[("gone", "nowhere")]);

        let ordered = sort_by_dependencies(vec![a]);
        assert_eq!(qnames(&ordered), ["svc/a"]);
    }

    #[test]
    fn unreadable_objects_are_still_emitted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pkg = package(temp.path());
        let a = object(temp.path(), &pkg, "svc", "a", &[]);
        let ghost = ObjectInfo::local(
            "svc".to_string(),
            "ghost".to_string(),
            pkg.clone(),
            temp.path().join("objects/svc/ghost.json"),
        );

        let ordered = sort_by_dependencies(vec![a, ghost]);
        assert_eq!(qnames(&ordered), ["svc/a", "svc/ghost"]);
    }
}
