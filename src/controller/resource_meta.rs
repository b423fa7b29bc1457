//! Accessors for dynamic manifest objects
//!
//! Desired and live objects flow through the comparator and sync engine as
//! raw `serde_json::Value` maps, the same shape they have on the wire. These
//! helpers read and edit the handful of metadata fields the core cares about.

use kube::core::GroupVersionKind;
use serde_json::{Map, Value};

/// Label stamped on every resource the engine applies, so live objects can be
/// enumerated per Application.
pub const APP_NAME_LABEL: &str = "applications.windlass.io/app-name";

/// Annotation holding the serialized desired state at the time of the last
/// apply. The upstream kubectl key is honored as well for objects adopted
/// from existing deployments.
pub const LAST_APPLIED_ANNOTATION: &str = "windlass.io/last-applied-configuration";
pub const KUBECTL_LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

pub fn kind_of(obj: &Value) -> &str {
    obj.get("kind").and_then(Value::as_str).unwrap_or_default()
}

pub fn api_version_of(obj: &Value) -> &str {
    obj.get("apiVersion")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Split apiVersion into (group, version); core-group objects have no slash.
pub fn group_version_of(obj: &Value) -> (&str, &str) {
    match api_version_of(obj).split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version_of(obj)),
    }
}

pub fn gvk_of(obj: &Value) -> GroupVersionKind {
    let (group, version) = group_version_of(obj);
    GroupVersionKind::gvk(group, version, kind_of(obj))
}

pub fn name_of(obj: &Value) -> &str {
    obj.pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

pub fn namespace_of(obj: &Value) -> Option<&str> {
    obj.pointer("/metadata/namespace").and_then(Value::as_str)
}

/// Identity used to pair desired and live objects.
pub fn resource_key(obj: &Value, fallback_namespace: &str) -> (String, String, String, String) {
    let (group, _) = group_version_of(obj);
    (
        group.to_string(),
        kind_of(obj).to_string(),
        namespace_of(obj).unwrap_or(fallback_namespace).to_string(),
        name_of(obj).to_string(),
    )
}

pub fn annotations_of(obj: &Value) -> Option<&Map<String, Value>> {
    obj.pointer("/metadata/annotations").and_then(Value::as_object)
}

pub fn get_annotation<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    annotations_of(obj)?.get(key)?.as_str()
}

/// The recorded last-applied snapshot, if the live object carries one.
pub fn last_applied_config(obj: &Value) -> Option<&str> {
    get_annotation(obj, LAST_APPLIED_ANNOTATION)
        .or_else(|| get_annotation(obj, KUBECTL_LAST_APPLIED_ANNOTATION))
}

pub fn set_label(obj: &mut Value, key: &str, value: &str) {
    let metadata = ensure_object(obj, "metadata");
    let labels = ensure_object(metadata, "labels");
    if let Some(map) = labels.as_object_mut() {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

pub fn set_annotation(obj: &mut Value, key: &str, value: &str) {
    let metadata = ensure_object(obj, "metadata");
    let annotations = ensure_object(metadata, "annotations");
    if let Some(map) = annotations.as_object_mut() {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn ensure_object<'a>(parent: &'a mut Value, key: &str) -> &'a mut Value {
    if parent.is_object() {
        parent
            .as_object_mut()
            .unwrap()
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
    } else {
        parent
    }
}

pub fn is_crd(obj: &Value) -> bool {
    kind_of(obj) == "CustomResourceDefinition"
}

/// True when one of the objects is a CRD that defines the given group/kind.
/// Used to defer dry-run validation for instances of a CRD introduced in the
/// same sync.
pub fn has_crd_of_group_kind(objs: &[&Value], group: &str, kind: &str) -> bool {
    objs.iter().any(|obj| {
        is_crd(obj)
            && obj.pointer("/spec/group").and_then(Value::as_str) == Some(group)
            && obj.pointer("/spec/names/kind").and_then(Value::as_str) == Some(kind)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gvk_of_core_group() {
        let obj = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "svc"}});
        let gvk = gvk_of(&obj);
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Service");
    }

    #[test]
    fn test_resource_key_defaults_namespace() {
        let obj = json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "web"}});
        let key = resource_key(&obj, "prod");
        assert_eq!(
            key,
            (
                "apps".to_string(),
                "Deployment".to_string(),
                "prod".to_string(),
                "web".to_string()
            )
        );
    }

    #[test]
    fn test_set_label_creates_metadata_path() {
        let mut obj = json!({"apiVersion": "v1", "kind": "ConfigMap"});
        set_label(&mut obj, APP_NAME_LABEL, "my-app");
        assert_eq!(
            obj.pointer("/metadata/labels")
                .and_then(|l| l.get(APP_NAME_LABEL))
                .and_then(Value::as_str),
            Some("my-app")
        );
    }

    #[test]
    fn test_has_crd_of_group_kind() {
        let crd = json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "foos.foo.io"},
            "spec": {"group": "foo.io", "names": {"kind": "Foo"}}
        });
        let other = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm"}});
        assert!(has_crd_of_group_kind(&[&other, &crd], "foo.io", "Foo"));
        assert!(!has_crd_of_group_kind(&[&other], "foo.io", "Foo"));
        assert!(!has_crd_of_group_kind(&[&crd], "foo.io", "Bar"));
    }
}
